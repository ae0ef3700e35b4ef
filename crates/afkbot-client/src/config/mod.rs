pub mod bot_config;
pub mod keepalive_config;
pub mod paths;
pub mod server_config;

pub use bot_config::{BotConfig, ConfigLoadError};
pub use keepalive_config::KeepaliveConfig;
pub use paths::ProjectPaths;
pub use server_config::{ReconnectConfig, ServerConfig};
