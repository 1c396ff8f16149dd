pub mod hash;
pub mod ingest;
pub mod schema;
