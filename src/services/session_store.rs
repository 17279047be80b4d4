//! 会话存储
//!
//! 以会话标识为键保存会话。`acquire` 返回持有会话锁的租约，在整个调用期间持有，
//! 同一会话的调用因此不会交错执行；不同会话互不阻塞。

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::session::Session;

/// 调用期间对单个会话的独占访问
pub type SessionLease = OwnedMutexGuard<Session>;

/// 会话存储 trait
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 锁定标识为 `id` 的会话；不存在时创建（使用该标识，未提供时生成新标识）
    async fn acquire(&self, id: Option<&str>) -> SessionLease;

    /// 已存储会话的快照
    async fn get(&self, id: &str) -> Option<Session>;

    /// 插入或替换会话
    async fn put(&self, session: Session);

    async fn remove(&self, id: &str) -> bool;

    /// 删除从未认证且没有其他调用占用的会话，返回是否已删除。须在释放租约后调用
    async fn discard_anonymous(&self, id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 内存会话存储
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::with_id(id))))
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, id: Option<&str>) -> SessionLease {
        let slot = match id {
            Some(id) if !id.is_empty() => self.slot(id),
            _ => {
                let session = Session::new();
                let slot = Arc::new(Mutex::new(session.clone()));
                self.sessions.insert(session.id, slot.clone());
                slot
            }
        };
        let mut lease = slot.lock_owned().await;
        lease.touch();
        lease
    }

    async fn get(&self, id: &str) -> Option<Session> {
        let slot = self.sessions.get(id).map(|entry| entry.value().clone())?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    async fn put(&self, session: Session) {
        let slot = self.slot(&session.id);
        *slot.lock().await = session;
    }

    async fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    async fn discard_anonymous(&self, id: &str) -> bool {
        self.sessions
            .remove_if(id, |_, slot| {
                Arc::strong_count(slot) == 1
                    && slot
                        .try_lock()
                        .map(|session| !session.is_authenticated())
                        .unwrap_or(false)
            })
            .is_some()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// 创建内存会话存储
pub fn create_session_store() -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new())
}
