pub mod aggregate;
pub mod config;
pub mod enrich;
pub mod fetch;
pub mod geocode;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod stats;
pub mod types;
