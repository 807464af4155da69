//! SpeakSQL library

pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod llm;
pub mod output;
pub mod session;
pub mod sql;

pub use config::Config;
pub use error::{Result, SpeakSqlError};
