//! Simulation output and its row-oriented export form.

use crate::error::{ModelError, ModelResult};

/// Per-compartment time series on a shared time grid.
///
/// # Examples
///
/// ```
/// use compartmental::TimeSeriesTable;
///
/// let table = TimeSeriesTable::new(
///     vec![0.0, 1.0],
///     vec!["S".into(), "I".into()],
///     vec![vec![0.9, 0.8], vec![0.1, 0.2]],
/// )?;
///
/// assert_eq!(table.headers(), ["Time", "S", "I"]);
/// assert_eq!(table.rows()[1], [1.0, 0.8, 0.2]);
/// # Ok::<(), compartmental::ModelError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    time: Vec<f64>,
    names: Vec<String>,
    series: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    /// Creates a table. Every series must have one value per time point.
    pub fn new(time: Vec<f64>, names: Vec<String>, series: Vec<Vec<f64>>) -> ModelResult<Self> {
        if names.len() != series.len() {
            return Err(ModelError::definition(format!(
                "{} names for {} series",
                names.len(),
                series.len()
            )));
        }
        if let Some((name, values)) =
            names.iter().zip(&series).find(|(_, values)| values.len() != time.len())
        {
            return Err(ModelError::definition(format!(
                "series `{name}` has {} points, time grid has {}",
                values.len(),
                time.len()
            )));
        }
        Ok(TimeSeriesTable { time, names, series })
    }

    /// Gets the time grid.
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Gets the compartment names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of time points.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns true if the grid is empty.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Values of the compartment called `name`.
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(&self.series[index])
    }

    /// State at the last grid point.
    pub fn final_state(&self) -> Vec<f64> {
        self.series.iter().filter_map(|values| values.last().copied()).collect()
    }

    /// Export header: `"Time"` followed by the compartment names.
    pub fn headers(&self) -> Vec<String> {
        std::iter::once("Time".to_string()).chain(self.names.iter().cloned()).collect()
    }

    /// Export rows: the time point followed by each compartment value.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.time
            .iter()
            .enumerate()
            .map(|(i, t)| std::iter::once(*t).chain(self.series.iter().map(|s| s[i])).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TimeSeriesTable {
        TimeSeriesTable::new(
            vec![0.0, 0.5, 1.0],
            vec!["Susceptible".into(), "Infected".into()],
            vec![vec![0.99, 0.95, 0.9], vec![0.01, 0.05, 0.1]],
        )
        .unwrap()
    }

    #[test]
    fn test_rows_follow_declaration_order() {
        let table = table();
        assert_eq!(table.headers(), vec!["Time", "Susceptible", "Infected"]);
        assert_eq!(table.rows(), vec![vec![0.0, 0.99, 0.01], vec![0.5, 0.95, 0.05], vec![1.0, 0.9, 0.1]]);
    }

    #[test]
    fn test_series_lookup() {
        let table = table();
        assert_eq!(table.series("Infected"), Some(&[0.01, 0.05, 0.1][..]));
        assert_eq!(table.series("Recovered"), None);
        assert_eq!(table.final_state(), vec![0.9, 0.1]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = TimeSeriesTable::new(vec![0.0], vec!["S".into()], vec![vec![1.0, 2.0]]);
        assert!(matches!(err, Err(ModelError::Definition(_))));

        let err = TimeSeriesTable::new(vec![0.0], vec!["S".into(), "I".into()], vec![vec![1.0]]);
        assert!(matches!(err, Err(ModelError::Definition(_))));
    }
}
