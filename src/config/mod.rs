mod loader;

pub use loader::{Config, NetworkConfig, StreamConfig, DEFAULT_CONFIG_PATH};
