pub mod config;
pub mod error;
pub mod matching;
pub mod opportunity;
pub mod output;
pub mod pricing;
pub mod server;
pub mod sources;
pub mod store;
pub mod types;
