//! SQL over in-memory data frames
//!
//! The parser lowers a single `SELECT` into a plan, the executor runs that
//! plan against the frames registered in a [`Catalog`]. Semantics follow
//! SQLite where the two could differ (NULL ordering, integer division,
//! case-insensitive `LIKE`, double-quoted strings), since that is the engine
//! generated queries are usually written for.

pub mod executor;
pub mod expr;
pub mod functions;
pub mod parser;

pub use executor::QueryExecutor;
pub use parser::{QueryParser, SelectPlan, TableRef};

use crate::frame::DataFrame;
use std::collections::HashMap;

/// Named tables available to queries. Lookups ignore case.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tables: HashMap<String, (String, DataFrame)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, frame: DataFrame) -> Self {
        self.register(name, frame);
        self
    }

    /// Register a frame, replacing any table with the same name
    pub fn register(&mut self, name: &str, frame: DataFrame) {
        self.tables
            .insert(name.to_lowercase(), (name.to_string(), frame));
    }

    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.tables.get(&name.to_lowercase()).map(|(_, frame)| frame)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }
}
