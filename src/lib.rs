// Library for tests to access modules

pub mod aggregator;
pub mod config;
pub mod error;
pub mod log_history;
pub mod models;
pub mod routes;
pub mod statistics;
pub mod supervisor;
