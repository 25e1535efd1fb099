//! Dense matrices of symbolic expressions.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;

use super::{Expr, Symbol};

/// A dense, row-major matrix of [`Expr`] entries.
///
/// Sized for next-generation analysis, where the dimension is the number of
/// infected compartments; determinants use cofactor expansion that skips
/// zero entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprMatrix {
    rows: usize,
    cols: usize,
    entries: Vec<Expr>,
}

impl ExprMatrix {
    /// Creates a matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        ExprMatrix { rows, cols, entries: vec![Expr::zero(); rows * cols] }
    }

    /// Creates a column vector.
    pub fn column(entries: Vec<Expr>) -> Self {
        ExprMatrix { rows: entries.len(), cols: 1, entries }
    }

    /// Creates a matrix from rows. Returns `None` for ragged input.
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        let n_rows = rows.len();
        Some(ExprMatrix { rows: n_rows, cols, entries: rows.into_iter().flatten().collect() })
    }

    /// Jacobian `d functions[i] / d symbols[j]`.
    pub fn jacobian(functions: &[Expr], symbols: &[Symbol]) -> Self {
        let entries =
            functions.iter().flat_map(|f| symbols.iter().map(move |s| f.diff(s))).collect();
        ExprMatrix { rows: functions.len(), cols: symbols.len(), entries }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Returns true if the matrix is square.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Gets the element at position (i, j).
    pub fn get(&self, i: usize, j: usize) -> &Expr {
        &self.entries[i * self.cols + j]
    }

    /// Sets the element at position (i, j).
    pub fn set(&mut self, i: usize, j: usize, value: Expr) {
        self.entries[i * self.cols + j] = value;
    }

    /// Gets row `i` as a slice.
    pub fn row(&self, i: usize) -> &[Expr] {
        &self.entries[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns true if every entry is identically zero.
    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(Expr::is_zero)
    }

    /// Matrix product, or `None` if the dimensions do not agree.
    pub fn checked_mul(&self, rhs: &ExprMatrix) -> Option<ExprMatrix> {
        if self.cols != rhs.rows {
            return None;
        }
        let mut out = ExprMatrix::zeros(self.rows, rhs.cols);
        for i in 0..self.rows {
            for j in 0..rhs.cols {
                let value: Expr = (0..self.cols)
                    .filter(|&k| !self.get(i, k).is_zero() && !rhs.get(k, j).is_zero())
                    .map(|k| self.get(i, k) * rhs.get(k, j))
                    .sum();
                out.set(i, j, value);
            }
        }
        Some(out)
    }

    /// Determinant of a square matrix.
    pub fn determinant(&self) -> Option<Expr> {
        self.is_square().then(|| determinant_of(&self.entries, self.rows))
    }

    /// Inverse via the adjugate, or `None` if the matrix is not square or its
    /// determinant is identically zero.
    pub fn inverse(&self) -> Option<ExprMatrix> {
        let det = self.determinant()?;
        if det.is_zero() {
            return None;
        }
        let inverse_det = det.recip();
        let n = self.rows;
        let mut out = ExprMatrix::zeros(n, n);
        if n == 1 {
            out.set(0, 0, inverse_det);
            return Some(out);
        }
        for i in 0..n {
            for j in 0..n {
                let cofactor = determinant_of(&minor(&self.entries, n, j, i), n - 1);
                if cofactor.is_zero() {
                    continue;
                }
                let signed = if (i + j) % 2 == 0 { cofactor } else { -cofactor };
                out.set(i, j, signed * &inverse_det);
            }
        }
        Some(out)
    }

    /// Diagonal entries of a square matrix.
    pub fn diagonal(&self) -> Vec<Expr> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i).clone()).collect()
    }

    /// Returns true if every entry below the diagonal is zero.
    pub fn is_upper_triangular(&self) -> bool {
        self.is_square() && (0..self.rows).all(|i| (0..i).all(|j| self.get(i, j).is_zero()))
    }

    /// Returns true if every entry above the diagonal is zero.
    pub fn is_lower_triangular(&self) -> bool {
        self.is_square()
            && (0..self.rows).all(|i| (i + 1..self.cols).all(|j| self.get(i, j).is_zero()))
    }

    /// Indices of rows holding at least one non-zero entry.
    pub fn nonzero_rows(&self) -> Vec<usize> {
        (0..self.rows).filter(|&i| self.row(i).iter().any(|e| !e.is_zero())).collect()
    }

    /// Indices of columns holding at least one non-zero entry.
    pub fn nonzero_columns(&self) -> Vec<usize> {
        (0..self.cols).filter(|&j| (0..self.rows).any(|i| !self.get(i, j).is_zero())).collect()
    }

    /// Replaces symbols in every entry.
    pub fn substitute(&self, replacements: &BTreeMap<Symbol, Expr>) -> ExprMatrix {
        ExprMatrix {
            rows: self.rows,
            cols: self.cols,
            entries: self.entries.iter().map(|e| e.substitute(replacements)).collect(),
        }
    }

    /// Free symbols across all entries.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        self.entries.iter().flat_map(Expr::free_symbols).collect()
    }

    /// Converts to a numeric matrix if every entry is constant.
    pub fn to_numeric(&self) -> Option<DMatrix<f64>> {
        let values = self.entries.iter().map(Expr::as_constant).collect::<Option<Vec<_>>>()?;
        Some(DMatrix::from_row_slice(self.rows, self.cols, &values))
    }
}

/// Row-major `(n-1) x (n-1)` minor with `row` and `col` removed.
fn minor(entries: &[Expr], n: usize, row: usize, col: usize) -> Vec<Expr> {
    let mut out = Vec::with_capacity((n - 1) * (n - 1));
    for i in (0..n).filter(|&i| i != row) {
        for j in (0..n).filter(|&j| j != col) {
            out.push(entries[i * n + j].clone());
        }
    }
    out
}

fn determinant_of(entries: &[Expr], n: usize) -> Expr {
    match n {
        0 => Expr::one(),
        1 => entries[0].clone(),
        2 => &entries[0] * &entries[3] - &entries[1] * &entries[2],
        _ => {
            let mut det = Expr::zero();
            for j in 0..n {
                if entries[j].is_zero() {
                    continue;
                }
                let term = &entries[j] * determinant_of(&minor(entries, n, 0, j), n - 1);
                det = if j % 2 == 0 { det + term } else { det - term };
            }
            det
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Expr {
        Expr::symbol(name)
    }

    #[test]
    fn test_jacobian() {
        let x = Symbol::new("x");
        let y = Symbol::new("y");
        let f = vec![sym("x") * sym("x"), sym("x") * sym("y")];
        let jac = ExprMatrix::jacobian(&f, &[x, y]);

        assert_eq!(jac.get(0, 0), &(2.0 * sym("x")));
        assert!(jac.get(0, 1).is_zero());
        assert_eq!(jac.get(1, 0), &sym("y"));
        assert_eq!(jac.get(1, 1), &sym("x"));
    }

    #[test]
    fn test_determinant_3x3() {
        let m = ExprMatrix::from_rows(vec![
            vec![Expr::constant(2.0), Expr::zero(), Expr::constant(1.0)],
            vec![Expr::constant(1.0), Expr::constant(3.0), Expr::constant(2.0)],
            vec![Expr::constant(1.0), Expr::constant(1.0), Expr::constant(1.0)],
        ])
        .unwrap();
        // 2*(3-2) - 0 + 1*(1-3) = 0
        assert!(m.determinant().unwrap().is_zero());
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_symbolic_inverse() {
        let m = ExprMatrix::from_rows(vec![
            vec![sym("sigma"), Expr::zero()],
            vec![-sym("sigma"), sym("gamma")],
        ])
        .unwrap();
        let inv = m.inverse().unwrap();

        assert_eq!(inv.get(0, 0), &sym("sigma").recip());
        assert!(inv.get(0, 1).is_zero());
        assert_eq!(inv.get(1, 0), &sym("gamma").recip());
        assert_eq!(inv.get(1, 1), &sym("gamma").recip());

        let product = m.checked_mul(&inv).unwrap();
        assert_eq!(product.get(0, 0), &Expr::one());
        assert!(product.get(1, 0).is_zero());
        assert_eq!(product.get(1, 1), &Expr::one());
    }

    #[test]
    fn test_numeric_inverse_round_trip() {
        let m = ExprMatrix::from_rows(vec![
            vec![sym("a") + 1.0, sym("b")],
            vec![sym("c"), sym("d") + 2.0],
        ])
        .unwrap();
        let inv = m.inverse().unwrap();
        let product = m.checked_mul(&inv).unwrap();

        let bindings: BTreeMap<Symbol, f64> =
            [("a", 0.5), ("b", 0.25), ("c", 2.0), ("d", 1.5)]
                .into_iter()
                .map(|(n, v)| (Symbol::new(n), v))
                .collect();
        for i in 0..2 {
            for j in 0..2 {
                let value = product.get(i, j).evaluate(&bindings).unwrap();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((value - expected).abs() < 1e-12, "entry ({i}, {j}) = {value}");
            }
        }
    }

    #[test]
    fn test_triangular_and_nonzero_rows() {
        let m = ExprMatrix::from_rows(vec![
            vec![sym("a"), sym("b")],
            vec![Expr::zero(), Expr::zero()],
        ])
        .unwrap();
        assert!(m.is_upper_triangular());
        assert!(!m.is_lower_triangular());
        assert_eq!(m.nonzero_rows(), vec![0]);
        assert_eq!(m.nonzero_columns(), vec![0, 1]);
    }

    #[test]
    fn test_to_numeric() {
        let m = ExprMatrix::from_rows(vec![vec![Expr::constant(1.5), Expr::zero()]]).unwrap();
        let numeric = m.to_numeric().unwrap();
        assert_eq!(numeric[(0, 0)], 1.5);
        assert_eq!(numeric[(0, 1)], 0.0);

        let symbolic = ExprMatrix::column(vec![sym("a")]);
        assert!(symbolic.to_numeric().is_none());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(ExprMatrix::from_rows(vec![vec![sym("a")], vec![]]).is_none());
    }
}
