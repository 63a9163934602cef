// Library for the binary and integration tests

pub mod config;
pub mod docker_repo;
pub mod error;
pub mod history;
pub mod models;
pub mod rates;
pub mod render;
pub mod scheduler;
pub mod sysinfo_repo;
pub mod thresholds;
