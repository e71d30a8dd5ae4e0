mod config;
mod repository;
mod store;

pub use config::IdempotentConfig;
pub use repository::IdempotentStore;
pub use store::IdempotentRepository;
