//! Input processing module
//! Handles file detection, CSV parsing and dataset loading

pub mod csv_loader;
pub mod file_detector;
pub mod manager;

pub use csv_loader::CsvLoader;
pub use manager::InputManager;
