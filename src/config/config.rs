use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// Basic 认证质询使用的 realm
    pub realm: String,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
    /// 致命错误时是否终止进程
    pub abort_on_fatal: bool,
    /// 空请求体时是否输出诊断信息
    pub diagnostics_enabled: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录（按天滚动）
    pub log_dir: Option<PathBuf>,
    /// 日志文件名前缀
    pub file_prefix: String,
}

/// 目录服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DirectorySettings {
    /// 会话引导时读取的目录配置文件
    pub config_path: PathBuf,
    /// 目录后端类型，目前仅支持 "memory"
    pub backend: String,
    /// 内存后端的初始数据（JSON）
    pub seed_path: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 目录服务配置
    pub directory: DirectorySettings,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                realm: "Dirgate".into(),
                max_request_size: 1024 * 1024,
                abort_on_fatal: false,
                diagnostics_enabled: true,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
                file_prefix: "dirgate.log".into(),
            },
            directory: DirectorySettings {
                config_path: PathBuf::from("directory.toml"),
                backend: "memory".into(),
                seed_path: None,
            },
            app_name: "dirgate".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.server.host = "0.0.0.0".into();
        config.server.abort_on_fatal = true;
        config.server.diagnostics_enabled = false;
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config
    }
}

/// 命名的目录连接目标
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Location {
    /// 位置的显示名称
    pub name: String,
    /// 目录 URI，例如 `ldap://localhost:389`
    pub uri: String,
    /// 位置的根分支
    pub base: String,
    /// 每次调用建立连接所用的服务账号
    pub admin_dn: String,
    /// 服务账号密码
    pub admin_password: String,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("base", &self.base)
            .field("admin_dn", &self.admin_dn)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

/// 标签页组中的一项：标签页类及其显示名称
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabRef {
    pub class: String,
    pub name: String,
}

impl TabRef {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

/// 目录配置，每个会话在引导时读取一次
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// 已知位置，按声明顺序
    pub locations: Vec<Location>,
    /// 当前位置；未设置时取第一个
    pub default_location: Option<String>,
    /// 标签页组：组名 -> 有序标签页列表
    pub tabs: HashMap<String, Vec<TabRef>>,
}

impl DirectoryConfig {
    /// 解析当前位置
    pub fn current_location(&self) -> Option<(usize, &Location)> {
        match &self.default_location {
            Some(name) => self
                .locations
                .iter()
                .enumerate()
                .find(|(_, location)| &location.name == name),
            None => self.locations.first().map(|location| (0, location)),
        }
    }

    /// 与内置模式和示例目录匹配的配置
    pub fn development() -> Self {
        let mut tabs = HashMap::new();
        tabs.insert(
            "persontabs".to_string(),
            vec![
                TabRef::new("person", "User"),
                TabRef::new("posix", "Unix"),
                TabRef::new("mail", "Mail"),
            ],
        );
        tabs.insert("grouptabs".to_string(), vec![TabRef::new("group", "Group")]);
        tabs.insert(
            "departmenttabs".to_string(),
            vec![TabRef::new("department", "Department")],
        );

        Self {
            locations: vec![Location {
                name: "default".into(),
                uri: "memory://localhost".into(),
                base: "dc=example,dc=com".into(),
                admin_dn: "cn=admin,dc=example,dc=com".into(),
                admin_password: "admin".into(),
            }],
            default_location: None,
            tabs,
        }
    }
}
