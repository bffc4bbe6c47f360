mod client;
mod command;
mod config;
mod prerequisites;
mod wire;

pub use client::CrictlClient;
pub use config::{CrictlConfig, DEFAULT_RUNTIME_ENDPOINTS, DEFAULT_TIMEOUT};
