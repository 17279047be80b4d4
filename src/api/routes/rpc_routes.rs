//! RPC 路由
//!
//! 定义 JSON-RPC 端点路由。

use crate::api::handlers::rpc_handler::handle_rpc;
use axum::{Router, routing::post};

use crate::api::app_state::AppState;

/// 创建 RPC 路由器；GET 与空请求体返回诊断信息
pub fn create_rpc_router() -> Router<AppState> {
    Router::new().route("/jsonrpc", post(handle_rpc).get(handle_rpc))
}
