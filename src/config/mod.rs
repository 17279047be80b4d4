//! 配置管理模块
//!
//! 提供应用程序配置加载（TOML 配置文件与环境变量覆盖），
//! 以及会话引导时读取的目录配置来源。

pub mod config;
pub mod loader;

pub use config::{AppConfig, DirectoryConfig, Location, TabRef};
pub use loader::{ConfigLoader, DirectoryConfigSource, FileDirectoryConfig, StaticDirectoryConfig};
