pub mod config;
pub mod db;
pub mod etl;
pub mod fetch_error;
pub mod fetcher;
pub mod metrics;
pub mod scheduler;
