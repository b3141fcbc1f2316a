pub mod backend_client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod identity_provider;
pub mod session;
pub mod types;
pub mod views;
