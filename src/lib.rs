//! Dirgate - 目录对象 JSON-RPC 网关
//!
//! 将层次化目录服务中的对象以少量动词（ls、cat、infos、fields、update）
//! 暴露给调用方。对象模型由模式驱动：类型 → 标签页 → 属性。

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod observability;
pub mod rpc;
pub mod schema;
pub mod security;
pub mod services;
