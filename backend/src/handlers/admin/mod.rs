pub mod devices;
pub mod notifications;
pub mod patterns;
pub mod requests;
pub mod users;
