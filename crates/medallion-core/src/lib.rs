pub mod config;
pub mod error;
pub mod gold;
pub mod ingestion;
pub mod outputs;
pub mod schema;
pub mod silver;
