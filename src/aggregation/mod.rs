mod config;
mod record;
mod repository;
mod row;
mod store;

pub use config::AggregationConfig;
pub use record::{AggregationRecord, CompletedRecord};
pub use repository::AggregationStore;
pub use store::AggregationRepository;
