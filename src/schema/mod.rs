//! Event ingest and record export schemas

pub mod export;
pub mod ingest;

pub use export::RecordWriter;
pub use ingest::RawEventAdapter;
