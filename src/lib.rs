pub mod bigquery;
pub mod db;
pub mod document;
pub mod error;
pub mod freshness;
pub mod report;
