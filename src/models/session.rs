use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::config_cache::ConfigCache;

/// 会话
///
/// 保存认证状态和会话级配置缓存。`authenticated` 只能由 false 变为 true。
#[derive(Debug, Clone)]
pub struct Session {
    /// 会话唯一标识
    pub id: String,

    authenticated: bool,

    /// 会话配置缓存，首次认证后构建
    pub config: Option<Arc<ConfigCache>>,

    /// 会话创建时间
    pub created_at: DateTime<Utc>,

    /// 最后活跃时间
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// 创建带新随机标识的会话
    pub fn new() -> Self {
        Self::with_id(&Uuid::new_v4().to_string())
    }

    pub fn with_id(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            authenticated: false,
            config: None,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
