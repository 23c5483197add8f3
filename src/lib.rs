// Library for tests to access modules

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod provision;
pub mod routes;
pub mod supervisor;
pub mod version;
