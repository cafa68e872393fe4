//! Typed columns with per-cell missingness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Column type tag, as reported in a dataset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    /// Categorical (factor / enum) with string levels.
    Categorical,
    /// Milliseconds since the Unix epoch.
    Time,
    /// Free text, not a factor.
    Str,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Categorical => write!(f, "categorical"),
            ColumnType::Time => write!(f, "time"),
            ColumnType::Str => write!(f, "string"),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "numeric" | "real" | "int" => Ok(ColumnType::Numeric),
            "categorical" | "enum" | "factor" => Ok(ColumnType::Categorical),
            "time" => Ok(ColumnType::Time),
            "string" | "str" => Ok(ColumnType::Str),
            _ => Err(format!("unknown column type: {}", s)),
        }
    }
}

/// A single column. `None` is a missing cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
    Time(Vec<Option<i64>>),
    Str(Vec<Option<String>>),
}

/// Borrowed view of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Number(f64),
    Label(&'a str),
    Time(i64),
    Text(&'a str),
    Missing,
}

impl Cell<'_> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric value of the cell, for numeric and time cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Time(ms) => Some(*ms as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{}", format_number(*v)),
            Cell::Label(s) | Cell::Text(s) => write!(f, "{}", s),
            Cell::Time(ms) => write!(f, "{}", ms),
            Cell::Missing => write!(f, "NA"),
        }
    }
}

/// Render a number at full round-trip precision.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{}", v)
    }
}

impl Column {
    /// Numeric column from raw values; NaN becomes missing.
    pub fn from_f64(values: impl IntoIterator<Item = f64>) -> Self {
        Column::Numeric(
            values
                .into_iter()
                .map(|v| if v.is_nan() { None } else { Some(v) })
                .collect(),
        )
    }

    /// Categorical column from labels.
    pub fn from_labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        Column::Categorical(labels.into_iter().map(|s| Some(s.into())).collect())
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Numeric(_) => ColumnType::Numeric,
            Column::Categorical(_) => ColumnType::Categorical,
            Column::Time(_) => ColumnType::Time,
            Column::Str(_) => ColumnType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) | Column::Str(v) => v.len(),
            Column::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`. Out-of-range rows read as missing.
    pub fn cell(&self, row: usize) -> Cell<'_> {
        match self {
            Column::Numeric(v) => v.get(row).copied().flatten().map_or(Cell::Missing, Cell::Number),
            Column::Categorical(v) => v
                .get(row)
                .and_then(|c| c.as_deref())
                .map_or(Cell::Missing, Cell::Label),
            Column::Time(v) => v.get(row).copied().flatten().map_or(Cell::Missing, Cell::Time),
            Column::Str(v) => v
                .get(row)
                .and_then(|c| c.as_deref())
                .map_or(Cell::Missing, Cell::Text),
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        self.cell(row).is_missing()
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&r| self.is_missing(r)).count()
    }

    /// Numeric values with missing cells as NaN. Categorical and string
    /// columns yield `None`.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Column::Numeric(v) => Some(v.iter().map(|c| c.unwrap_or(f64::NAN)).collect()),
            Column::Time(v) => Some(v.iter().map(|c| c.map_or(f64::NAN, |ms| ms as f64)).collect()),
            Column::Categorical(_) | Column::Str(_) => None,
        }
    }

    /// Sorted distinct labels of a categorical column.
    pub fn levels(&self) -> Option<Vec<&str>> {
        match self {
            Column::Categorical(v) => {
                let set: BTreeSet<&str> = v.iter().filter_map(|c| c.as_deref()).collect();
                Some(set.into_iter().collect())
            }
            _ => None,
        }
    }

    /// Convert to a categorical column. Categorical columns are returned
    /// unchanged; missing cells stay missing.
    pub fn to_categorical(&self) -> Column {
        match self {
            Column::Categorical(_) => self.clone(),
            Column::Numeric(v) => {
                Column::Categorical(v.iter().map(|c| c.map(format_number)).collect())
            }
            Column::Time(v) => Column::Categorical(v.iter().map(|c| c.map(|ms| ms.to_string())).collect()),
            Column::Str(v) => Column::Categorical(v.clone()),
        }
    }

    /// Rows `indices` of this column, in that order.
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v.get(i).copied().flatten()).collect()),
            Column::Categorical(v) => {
                Column::Categorical(indices.iter().map(|&i| v.get(i).cloned().flatten()).collect())
            }
            Column::Time(v) => Column::Time(indices.iter().map(|&i| v.get(i).copied().flatten()).collect()),
            Column::Str(v) => Column::Str(indices.iter().map(|&i| v.get(i).cloned().flatten()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f64_maps_nan_to_missing() {
        let col = Column::from_f64([1.0, f64::NAN, 3.5]);
        assert_eq!(col.len(), 3);
        assert!(col.is_missing(1));
        assert_eq!(col.cell(2), Cell::Number(3.5));
        assert_eq!(col.missing_count(), 1);
        assert!(col.cell(10).is_missing());
    }

    #[test]
    fn test_to_categorical_formats_integers_without_fraction() {
        let col = Column::Numeric(vec![Some(1.0), None, Some(2.5), Some(1.0)]);
        let cat = col.to_categorical();
        assert_eq!(
            cat,
            Column::Categorical(vec![
                Some("1".into()),
                None,
                Some("2.5".into()),
                Some("1".into())
            ])
        );
        assert_eq!(cat.levels().unwrap(), vec!["1", "2.5"]);
        assert_eq!(cat.to_categorical(), cat);
    }

    #[test]
    fn test_format_number_specials() {
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(f64::INFINITY), "Inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Inf");
        let v = 0.1 + 0.2;
        assert_eq!(format_number(v).parse::<f64>().unwrap(), v);
    }

    #[test]
    fn test_column_type_parse() {
        assert_eq!("enum".parse::<ColumnType>().unwrap(), ColumnType::Categorical);
        assert_eq!(ColumnType::Str.to_string(), "string");
        assert!("blob".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_take_reorders() {
        let col = Column::from_labels(["a", "b", "c"]);
        assert_eq!(col.take(&[2, 0]), Column::from_labels(["c", "a"]));
    }
}
