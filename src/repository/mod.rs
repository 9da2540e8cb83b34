pub mod database;
pub mod models;
pub mod progress_repository;
pub mod verdict_repository;

pub use database::Database;
pub use models::{ScanProgress, VerdictStats};
pub use progress_repository::ProgressRepository;
pub use verdict_repository::VerdictRepository;
