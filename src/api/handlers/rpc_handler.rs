use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::fmt::Write;
use tracing::{debug, error, warn};

use crate::{
    api::app_state::AppState,
    error::AppError,
    models::rpc::{INVALID_REQUEST, PARSE_ERROR, RpcError, RpcRequest, RpcResponse},
    security::auth::Credentials,
};

/// 携带响应会话标识的头
pub const SESSION_HEADER: &str = "x-session-id";

/// JSON-RPC 端点
///
/// `params[0]` 为会话标识，其余参数按位置转发给分发器。
pub async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.iter().all(u8::is_ascii_whitespace) {
        return diagnostics(&state, &headers);
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Malformed JSON-RPC body: {}", e);
            return rpc_error(&state, Value::Null, RpcError::new(PARSE_ERROR, "parse error"));
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let mut request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(
                &state,
                id,
                RpcError::new(INVALID_REQUEST, format!("invalid request: {}", e)),
            );
        }
    };

    let session_id = match take_session_id(&mut request.params) {
        Ok(session_id) => session_id,
        Err(e) => return call_failed(&state, &request, e),
    };
    let credentials = Credentials::from_authorization_header(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );

    let mut session = state.session_store.acquire(session_id.as_deref()).await;
    let bootstrapped = match state.bootstrap.ensure(&mut session, credentials.as_ref()).await {
        Ok(bootstrapped) => bootstrapped,
        Err(e) => {
            let id = session.id.clone();
            let anonymous = !session.is_authenticated();
            drop(session);
            if anonymous {
                state.session_store.discard_anonymous(&id).await;
            }
            let response = match e {
                AppError::Unauthorized(message) => {
                    warn!("会话 {} 未通过认证: {}", id, message);
                    state.metrics.record_unauthorized();
                    AppError::challenge(&state.realm, &message)
                }
                e => call_failed(&state, &request, e),
            };
            return with_session(response, &id);
        }
    };
    if bootstrapped.fresh {
        state.metrics.record_config_build();
    }

    state.metrics.record_rpc_call();
    let params = std::mem::take(&mut request.params);
    let result = state
        .dispatcher
        .dispatch(&session.id, &bootstrapped.config, &request.method, params)
        .await;

    let response = match result {
        Ok(_) if request.is_notification() => StatusCode::NO_CONTENT.into_response(),
        Ok(value) => Json(RpcResponse::success(id, value)).into_response(),
        Err(e) => call_failed(&state, &request, e),
    };
    with_session(response, &session.id)
}

/// 从参数中取出开头的会话标识
fn take_session_id(params: &mut Vec<Value>) -> Result<Option<String>, AppError> {
    if params.is_empty() {
        return Ok(None);
    }
    match params.remove(0) {
        Value::Null => Ok(None),
        Value::String(id) if id.is_empty() => Ok(None),
        Value::String(id) => Ok(Some(id)),
        other => Err(AppError::InvalidParams(format!(
            "session identifier must be a string, got {}",
            other
        ))),
    }
}

fn call_failed(state: &AppState, request: &RpcRequest, err: AppError) -> Response {
    if err.is_fatal() {
        error!("致命错误，调用 {} 中止: {}", request.method, err);
        state.metrics.record_fatal();
        if state.abort_on_fatal {
            state.fatal.trigger(&err.to_string());
        }
        return err.into_response();
    }
    if request.is_notification() {
        state.metrics.record_rpc_error();
        return StatusCode::NO_CONTENT.into_response();
    }
    let id = request.id.clone().unwrap_or(Value::Null);
    rpc_error(state, id, RpcError::from(&err))
}

fn rpc_error(state: &AppState, id: Value, error: RpcError) -> Response {
    state.metrics.record_rpc_error();
    Json(RpcResponse::failure(id, error)).into_response()
}

fn with_session(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// 无请求体时返回的纯文本回显
fn diagnostics(state: &AppState, headers: &HeaderMap) -> Response {
    if !state.diagnostics_enabled {
        return (StatusCode::BAD_REQUEST, "no request\n").into_response();
    }

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    let mut body = format!("no request\n{}\n", session_id);
    let _ = writeln!(body, "APP_NAME: {}", state.app_name);
    let _ = writeln!(body, "APP_VERSION: {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(body, "ENVIRONMENT: {}", state.environment);
    for (name, value) in headers {
        if name == header::AUTHORIZATION {
            continue;
        }
        let _ = writeln!(
            body,
            "HTTP_{}: {}",
            name.as_str().to_uppercase().replace('-', "_"),
            value.to_str().unwrap_or("<binary>")
        );
    }

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
