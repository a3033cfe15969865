pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod snapshot;
pub mod store;
