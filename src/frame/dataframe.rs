//! Row-oriented data frame

use super::{Column, DataType, Value};
use crate::error::{Result, SpeakSqlError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataFrame {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Build a frame, checking that every row matches the column count.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(SpeakSqlError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                index + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Build a frame from result rows, inferring each column type from its
    /// first non-null value.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let data_type = rows
                    .iter()
                    .filter_map(|row| row.get(i).and_then(Value::data_type))
                    .next()
                    .unwrap_or(DataType::Text);
                Column::new(name, data_type)
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup, exact matches first
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> DataFrame {
        DataFrame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// `name TYPE` pairs, one per column
    pub fn schema_summary(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new(
            vec![
                Column::new("Name", DataType::Text),
                Column::new("age", DataType::Integer),
            ],
            vec![
                vec![Value::from("Ada"), Value::Integer(36)],
                vec![Value::from("Linus"), Value::Integer(28)],
                vec![Value::from("Grace"), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = DataFrame::new(
            vec![Column::new("a", DataType::Integer)],
            vec![vec![Value::Integer(1), Value::Integer(2)]],
        );
        assert!(matches!(result, Err(SpeakSqlError::InvalidInput(_))));
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let df = sample();
        assert_eq!(df.column_index("name"), Some(0));
        assert_eq!(df.column_index("AGE"), Some(1));
        assert_eq!(df.column_index("salary"), None);
    }

    #[test]
    fn test_head() {
        let df = sample();
        assert_eq!(df.head(2).num_rows(), 2);
        assert_eq!(df.head(10).num_rows(), 3);
        assert_eq!(df.head(0).num_columns(), 2);
    }

    #[test]
    fn test_from_rows_infers_types_past_nulls() {
        let df = DataFrame::from_rows(
            vec!["x".into(), "y".into()],
            vec![
                vec![Value::Null, Value::from("a")],
                vec![Value::Float(1.5), Value::from("b")],
            ],
        )
        .unwrap();
        assert_eq!(df.columns[0].data_type, DataType::Float);
        assert_eq!(df.columns[1].data_type, DataType::Text);
    }

    #[test]
    fn test_schema_summary() {
        assert_eq!(sample().schema_summary(), vec!["Name TEXT", "age INTEGER"]);
    }
}
