pub mod ingest;
pub mod page;
pub mod query;
