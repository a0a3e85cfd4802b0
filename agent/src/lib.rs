pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod server;
pub mod sync;
