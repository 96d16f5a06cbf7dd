pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, InMemoryDirectory, PgDirectory};
pub use error::{LedgerError, LedgerResult};
pub use service::{AllocationLedger, CandidateResolver, CompositionSession, SessionRegistry};
