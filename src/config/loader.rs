use crate::config::config::{AppConfig, DirectoryConfig};
use crate::error::{AppError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use std::path::{Path, PathBuf};

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 搜索路径：
    /// 1. ./dirgate.toml
    /// 2. 环境变量（DIRGATE_ 前缀，`__` 分隔层级）
    pub fn load() -> std::result::Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> std::result::Result<AppConfig, figment::Error> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::development(),
        ))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DIRGATE_").split("__"));

        figment.extract()
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> std::result::Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.directory.config_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingDirectoryConfig);
        }

        if config.directory.backend != "memory" {
            return Err(ConfigValidationError::UnsupportedBackend(
                config.directory.backend.clone(),
            ));
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("目录配置文件路径未配置")]
    MissingDirectoryConfig,

    #[error("不支持的目录后端: {0}")]
    UnsupportedBackend(String),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("dirgate.toml")
}

/// 会话引导时读取的目录配置来源
#[cfg_attr(test, mockall::automock)]
pub trait DirectoryConfigSource: Send + Sync {
    /// 读取配置，任何失败都是致命错误
    fn load(&self) -> Result<DirectoryConfig>;
}

/// 从 TOML 文件读取目录配置
#[derive(Debug, Clone)]
pub struct FileDirectoryConfig {
    path: PathBuf,
}

impl FileDirectoryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DirectoryConfigSource for FileDirectoryConfig {
    fn load(&self) -> Result<DirectoryConfig> {
        // figment treats a missing file as empty, so readability is checked first
        if std::fs::File::open(&self.path).is_err() {
            return Err(AppError::Fatal(format!(
                "directory configuration {} is not readable",
                self.path.display()
            )));
        }

        let config: DirectoryConfig = Figment::new().merge(Toml::file(&self.path)).extract()?;
        if config.locations.is_empty() {
            return Err(AppError::Fatal(format!(
                "directory configuration {} declares no location",
                self.path.display()
            )));
        }
        Ok(config)
    }
}

/// 固定配置，供开发环境和测试使用
#[derive(Debug, Clone)]
pub struct StaticDirectoryConfig(pub DirectoryConfig);

impl DirectoryConfigSource for StaticDirectoryConfig {
    fn load(&self) -> Result<DirectoryConfig> {
        Ok(self.0.clone())
    }
}
