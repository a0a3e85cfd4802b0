pub mod admin;
pub mod auth;
pub mod device_api;
pub mod ws;
