//! Verdict sinks driven by the sink worker.

pub mod csv;
pub mod sqlite;

pub use self::csv::CsvSink;
pub use self::sqlite::SqliteSink;
