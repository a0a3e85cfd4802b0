pub mod access_request;
pub mod device;
pub mod expiry;
pub mod pattern;
pub mod user;
