//! 可观测性模块
//!
//! 提供 Prometheus 指标、结构化日志、健康检查以及致命错误信号。

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::config::LoggingConfig;

// ===== Simple Metrics (using atomics for zero-dep implementation) =====

/// 简单应用指标
#[derive(Clone, Default)]
pub struct AppMetrics {
    pub http_requests_total: Arc<AtomicU64>,
    pub http_request_duration_sum: Arc<AtomicU64>,
    pub rpc_calls_total: Arc<AtomicU64>,
    pub rpc_errors_total: Arc<AtomicU64>,
    pub unauthorized_total: Arc<AtomicU64>,
    pub config_builds_total: Arc<AtomicU64>,
    pub fatal_total: Arc<AtomicU64>,
}

impl AppMetrics {
    /// 记录 HTTP 请求
    pub fn record_http_request(&self, duration_ms: u64) {
        self.http_requests_total.fetch_add(1, Ordering::SeqCst);
        self.http_request_duration_sum
            .fetch_add(duration_ms, Ordering::SeqCst);
    }

    /// 记录 RPC 调用
    pub fn record_rpc_call(&self) {
        self.rpc_calls_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录返回给调用方的 RPC 错误
    pub fn record_rpc_error(&self) {
        self.rpc_errors_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录会话配置缓存构建
    pub fn record_config_build(&self) {
        self.config_builds_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_fatal(&self) {
        self.fatal_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self, sessions: usize) -> String {
        format!(
            r#"# HELP http_requests_total Total HTTP requests
# TYPE http_requests_total counter
http_requests_total {}
# HELP http_request_duration_seconds HTTP request duration in seconds
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_sum {}
http_request_duration_seconds_count {}
# HELP rpc_calls_total Total JSON-RPC calls
# TYPE rpc_calls_total counter
rpc_calls_total {}
# HELP rpc_errors_total JSON-RPC calls answered with an error object
# TYPE rpc_errors_total counter
rpc_errors_total {}
# HELP unauthorized_total Requests answered with an authentication challenge
# TYPE unauthorized_total counter
unauthorized_total {}
# HELP config_builds_total Session configuration builds
# TYPE config_builds_total counter
config_builds_total {}
# HELP fatal_total Requests aborted by a fatal error
# TYPE fatal_total counter
fatal_total {}
# HELP sessions Known sessions
# TYPE sessions gauge
sessions {}
"#,
            self.http_requests_total.load(Ordering::SeqCst),
            self.http_request_duration_sum.load(Ordering::SeqCst) as f64 / 1000.0,
            self.http_requests_total.load(Ordering::SeqCst),
            self.rpc_calls_total.load(Ordering::SeqCst),
            self.rpc_errors_total.load(Ordering::SeqCst),
            self.unauthorized_total.load(Ordering::SeqCst),
            self.config_builds_total.load(Ordering::SeqCst),
            self.fatal_total.load(Ordering::SeqCst),
            sessions,
        )
    }
}

// ===== Fatal Signal =====

/// 致命错误信号：触发后服务器停止接受请求
#[derive(Clone)]
pub struct FatalSignal {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 记录第一次致命错误的原因，之后的触发保持不变
    pub fn trigger(&self, reason: &str) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.to_string());
            true
        });
    }

    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 信号触发后返回
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

/// 可观测性状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub fatal: FatalSignal,
    pub sessions: Arc<dyn Fn() -> usize + Send + Sync>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(
        version: String,
        metrics: Arc<AppMetrics>,
        fatal: FatalSignal,
        sessions: Arc<dyn Fn() -> usize + Send + Sync>,
    ) -> Self {
        Self {
            metrics,
            fatal,
            sessions,
            start_time: Utc::now(),
            version,
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

// ===== Health Check Handlers =====

/// 获取完整健康状态
pub async fn health_check(
    state: axum::extract::State<Arc<ObservabilityState>>,
) -> impl IntoResponse {
    let fatal = state.fatal.reason();
    let health_status = HealthStatus {
        status: if fatal.is_none() {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        fatal: fatal.clone(),
    };

    let status_code = if fatal.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_status))
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// Prometheus 指标端点
pub async fn metrics(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let output = state.metrics.gather((state.sessions)());
    (StatusCode::OK, output)
}

/// 版本信息端点
pub async fn version(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// `RUST_LOG` 优先于配置的级别。配置了日志目录时按天滚动写入文件，
/// 返回的 guard 需在进程结束前保持存活。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_line_number(true);

    let result = if config.structured {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }

    guard
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    axum::extract::State(metrics): axum::extract::State<Arc<AppMetrics>>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    metrics.record_http_request(start.elapsed().as_millis() as u64);
    response
}
