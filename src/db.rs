pub mod error;
pub mod location_repository;
pub mod models;
pub mod pool;
pub mod reading_repository;

pub use error::DbError;
pub use location_repository::LocationRepository;
pub use models::*;
pub use pool::{connect, health_check};
pub use reading_repository::ReadingRepository;
