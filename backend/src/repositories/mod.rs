pub mod access_request;
pub mod common;
pub mod device;
pub mod pattern;
pub mod session;
pub mod transaction;
pub mod user;
