pub mod export;
pub mod memory;
pub mod pool;
pub mod queries;
pub mod repository;

pub use export::write_csv;
pub use memory::InMemoryDirectory;
pub use pool::create_pool;
pub use repository::PgDirectory;
