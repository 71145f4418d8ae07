pub mod cache;
pub mod config;
pub mod protocol;
pub mod resolver;
pub mod response;
pub mod server;
