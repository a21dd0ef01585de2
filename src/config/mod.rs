//! Configuration loading
//!
//! Settings come from an optional TOML file, with account fields
//! overridable through `HUALAI_*` environment variables.

mod schema;
mod store;

pub use schema::{AccountConfig, AppConfig, MdnsMode, SinkConfig, WebRtcConfig};
pub use store::{apply_env_overrides, ConfigStore, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};
