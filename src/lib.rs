pub mod backends;
pub mod cache;
pub mod config_loader;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod provider;
pub mod request;
pub mod service;
pub mod stdio;
pub mod supervisor;
pub mod transport;
