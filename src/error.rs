//! 错误处理模块
//!
//! 定义网关的错误类型。致命错误（配置不可读、模式实现缺失、目录连接失败）
//! 与调用方错误（未知方法、类型、标签页、对象）在类型上显式区分；
//! 字段级校验失败不属于错误，而是作为数据返回。

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::directory::DirectoryError;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 缺少或无效的凭据
    #[error("认证失败: {0}")]
    Unauthorized(String),

    /// 未知的 RPC 方法
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// 参数个数或类型错误
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// 注册表中不存在的对象类型
    #[error("unknown object type: {0}")]
    UnknownType(String),

    /// 对象中不存在的标签页
    #[error("unknown tab '{tab}' for type '{object_type}'")]
    UnknownTab { object_type: String, tab: String },

    /// 目录中不存在的对象
    #[error("object not found: {0}")]
    NotFound(String),

    /// 标签页中不存在或不可见的属性
    #[error("unknown attribute '{attribute}' in tab '{tab}'")]
    UnknownAttribute { tab: String, attribute: String },

    /// 基础设施错误，终止请求（按策略终止进程）
    #[error("fatal: {0}")]
    Fatal(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 是否为面向运维的错误，不能作为数据返回给调用方
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Fatal(_))
    }

    /// 调用方错误对应的 JSON-RPC 错误码
    pub fn rpc_code(&self) -> i64 {
        match self {
            AppError::MethodNotFound(_) => -32601,
            AppError::InvalidParams(_) => -32602,
            AppError::UnknownType(_) => -32001,
            AppError::UnknownTab { .. } => -32002,
            AppError::NotFound(_) => -32003,
            AppError::UnknownAttribute { .. } => -32004,
            _ => -32603,
        }
    }

    /// 携带 `realm` Basic 质询的 401 响应
    pub fn challenge(realm: &str, message: &str) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, format!("{}\n", message)).into_response();
        let value = format!("Basic realm=\"{}\"", realm.replace('"', ""));
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Fatal(format!("IO 错误: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Fatal(format!("配置错误: {}", e))
    }
}

impl From<DirectoryError> for AppError {
    fn from(e: DirectoryError) -> Self {
        AppError::Fatal(format!("directory error: {}", e))
    }
}

/// Axum 响应实现
///
/// 调用方错误通常由 RPC 处理器渲染为 JSON-RPC 错误对象，
/// 这里只负责传输层的纯文本响应。
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.is_fatal() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, format!("{}\n", self)).into_response()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
