//! Input manager for loading datasets from disk

use crate::error::{Result, SpeakSqlError};
use crate::frame::DataFrame;
use crate::input::csv_loader::{CsvLoader, FrameReader};
use crate::input::file_detector::FileType;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

pub struct InputManager {
    cache: HashMap<String, DataFrame>,
    delimiter: Option<u8>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            delimiter: None,
        }
    }

    /// Override the delimiter implied by the file extension
    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub async fn load_frame(&mut self, path: &Path) -> Result<DataFrame> {
        let path_str = path.to_string_lossy().to_string();

        if let Some(cached) = self.cache.get(&path_str) {
            info!("Using cached dataset for: {}", path.display());
            return Ok(cached.clone());
        }

        if !path.exists() {
            return Err(SpeakSqlError::InvalidInput(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        let file_type = self.detect_file_type(path)?;
        let delimiter = match file_type {
            FileType::Unknown => {
                return Err(SpeakSqlError::UnsupportedFormat(format!(
                    "Unsupported file type for: {} (expected .csv or .tsv)",
                    path.display()
                )));
            }
            ref known => self
                .delimiter
                .or_else(|| known.default_delimiter())
                .unwrap_or(b','),
        };

        info!("Reading {:?} file: {}", file_type, path.display());
        let frame = CsvLoader::new()
            .with_delimiter(delimiter)
            .read(path)
            .await?;
        debug!(
            "Loaded {} rows x {} columns from {}",
            frame.num_rows(),
            frame.num_columns(),
            path.display()
        );

        self.cache.insert(path_str, frame.clone());

        Ok(frame)
    }

    fn detect_file_type(&self, path: &Path) -> Result<FileType> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                SpeakSqlError::InvalidInput(format!("File has no extension: {}", path.display()))
            })?;

        Ok(FileType::from_extension(extension))
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
