pub mod env;
mod loader;

pub use env::{AppConfig, CaptureConfig, DirectoryConfig, ProxyConfig, StimulusDefaults};
pub use loader::load_config;
