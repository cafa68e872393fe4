//! Column name → typed reference resolution.
//!
//! Column roles are resolved once, when the dataset is loaded, so a
//! misspelled name fails immediately with the offending name and the
//! context it was requested for.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::column::ColumnType;
use crate::error::{FrameError, Result};

/// A resolved column: position, name and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub index: usize,
    pub name: String,
    pub kind: ColumnType,
}

/// Ordered column names and types of a dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<(String, ColumnType)>",
    into = "Vec<(String, ColumnType)>"
)]
pub struct Schema {
    columns: Vec<(String, ColumnType)>,
    index: HashMap<String, usize>,
}

impl TryFrom<Vec<(String, ColumnType)>> for Schema {
    type Error = FrameError;

    fn try_from(columns: Vec<(String, ColumnType)>) -> Result<Self> {
        Schema::new(columns)
    }
}

impl From<Schema> for Vec<(String, ColumnType)> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

impl Schema {
    pub fn new(columns: Vec<(String, ColumnType)>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, (name, _)) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { columns, index })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resolve `name`, failing with `UnknownColumn` when absent.
    pub fn resolve(&self, name: &str, context: &str) -> Result<ColumnRef> {
        let index = self
            .position(name)
            .ok_or_else(|| FrameError::UnknownColumn {
                column: name.to_string(),
                context: context.to_string(),
            })?;
        let (name, kind) = &self.columns[index];
        Ok(ColumnRef {
            index,
            name: name.clone(),
            kind: *kind,
        })
    }

    /// Resolve every name, failing on the first unknown one.
    pub fn resolve_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        context: &str,
    ) -> Result<Vec<ColumnRef>> {
        names
            .into_iter()
            .map(|name| self.resolve(name, context))
            .collect()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.position(name).map(|i| self.columns[i].1)
    }

    /// Record a type change (after coercion).
    pub fn set_type(&mut self, name: &str, kind: ColumnType) -> Result<()> {
        let i = self.resolve(name, "schema update")?.index;
        self.columns[i].1 = kind;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heart() -> Schema {
        Schema::new(vec![
            ("start".into(), ColumnType::Numeric),
            ("stop".into(), ColumnType::Numeric),
            ("event".into(), ColumnType::Numeric),
            ("C1".into(), ColumnType::Categorical),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let schema = heart();
        let stop = schema.resolve("stop", "stop column").unwrap();
        assert_eq!(stop.index, 1);
        assert_eq!(stop.kind, ColumnType::Numeric);

        let err = schema.resolve("Stop", "stop column").unwrap_err();
        match err {
            FrameError::UnknownColumn { column, context } => {
                assert_eq!(column, "Stop");
                assert_eq!(context, "stop column");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_all_stops_at_first_unknown() {
        let schema = heart();
        assert_eq!(schema.resolve_all(["C1", "event"], "x").unwrap().len(), 2);
        let err = schema.resolve_all(["C1", "C9", "C8"], "predictors").unwrap_err();
        assert!(err.to_string().contains("'C9'"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::new(vec![
            ("a".into(), ColumnType::Numeric),
            ("a".into(), ColumnType::Str),
        ])
        .unwrap_err();
        assert!(matches!(err, FrameError::DuplicateColumn(_)));
    }

    #[test]
    fn test_set_type_and_json_roundtrip() {
        let mut schema = heart();
        schema.set_type("event", ColumnType::Categorical).unwrap();
        assert_eq!(schema.column_type("event"), Some(ColumnType::Categorical));

        let json = serde_json::to_string(&schema).unwrap();
        let restored: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, schema);
        assert_eq!(restored.resolve("C1", "x").unwrap().index, 3);
        assert!(!restored.contains("C2"));
    }
}
