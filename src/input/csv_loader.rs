//! CSV parsing with per-column type inference

use crate::error::{Result, SpeakSqlError};
use crate::frame::{parse_number, Column, DataFrame, DataType, Number, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use tokio::fs;

pub trait FrameReader {
    fn read(&self, path: &Path) -> impl Future<Output = Result<DataFrame>> + Send;
}

#[derive(Debug, Clone)]
pub struct CsvLoader {
    delimiter: u8,
    has_headers: bool,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
        }
    }
}

impl FrameReader for CsvLoader {
    async fn read(&self, path: &Path) -> Result<DataFrame> {
        let bytes = fs::read(path).await.map_err(SpeakSqlError::Io)?;
        self.parse(&bytes).map_err(|e| match e {
            SpeakSqlError::Csv(msg) => {
                SpeakSqlError::Csv(format!("failed to parse '{}': {}", path.display(), msg))
            }
            other => other,
        })
    }
}

impl CsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Parse CSV content into a typed frame
    pub fn parse(&self, data: &[u8]) -> Result<DataFrame> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .from_reader(data);

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            raw_rows.push(record.iter().map(str::to_string).collect());
        }

        let header_names: Vec<String> = if self.has_headers {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            let width = raw_rows.first().map(Vec::len).unwrap_or(0);
            (0..width).map(|i| i.to_string()).collect()
        };

        if header_names.is_empty() {
            return Err(SpeakSqlError::InvalidInput(
                "CSV file has no columns".to_string(),
            ));
        }

        let names = normalize_headers(&header_names);
        let types: Vec<DataType> = (0..names.len())
            .map(|i| infer_type(raw_rows.iter().map(|row| row[i].as_str())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(cell, data_type)| convert_cell(&cell, *data_type))
                    .collect()
            })
            .collect();

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, data_type)| Column::new(name, data_type))
            .collect();

        DataFrame::new(columns, rows)
    }
}

/// Trim names, fill blanks with `Unnamed: i` and suffix duplicates with `.1`, `.2`
fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());

    for (i, header) in raw.iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {}", i),
            trimmed => trimmed.to_string(),
        };

        let mut name = base.clone();
        if used.contains(&name) {
            let count = counts.entry(base.clone()).or_insert(0);
            loop {
                *count += 1;
                name = format!("{}.{}", base, count);
                if !used.contains(&name) {
                    break;
                }
            }
        }
        used.insert(name.clone());
        names.push(name);
    }

    names
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a str>) -> DataType {
    let mut all_int = true;
    let mut all_num = true;
    let mut all_bool = true;
    let mut any = false;

    for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
        any = true;
        match parse_number(cell) {
            Some(Number::Int(_)) => {}
            Some(Number::Real(_)) => all_int = false,
            None => {
                all_int = false;
                all_num = false;
            }
        }
        if parse_bool(cell).is_none() {
            all_bool = false;
        }
        if !all_num && !all_bool {
            return DataType::Text;
        }
    }

    match (any, all_int, all_num, all_bool) {
        (false, ..) => DataType::Text,
        (true, true, _, _) => DataType::Integer,
        (true, _, true, _) => DataType::Float,
        (true, _, _, true) => DataType::Boolean,
        _ => DataType::Text,
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn convert_cell(cell: &str, data_type: DataType) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match data_type {
        DataType::Integer | DataType::Float => match parse_number(trimmed) {
            Some(Number::Int(i)) if data_type == DataType::Integer => Value::Integer(i),
            Some(n) => Value::Float(n.as_f64()),
            None => Value::Null,
        },
        DataType::Boolean => parse_bool(trimmed).map(Value::Boolean).unwrap_or(Value::Null),
        DataType::Text => Value::Text(cell.to_string()),
    }
}
