//! 会话引导
//!
//! 在会话的第一次调用时认证并构建配置缓存，之后的调用直接复用缓存。
//! 调用方需持有会话租约，同一会话的引导因此不会并发执行。

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DirectoryConfigSource;
use crate::directory::DirectoryConnector;
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::schema::SchemaRegistry;
use crate::security::auth::{Authenticator, Credentials};
use crate::services::config_cache::ConfigCache;

/// [`SessionBootstrap::ensure`] 的结果
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub config: Arc<ConfigCache>,
    /// 配置是否由本次调用构建
    pub fresh: bool,
}

pub struct SessionBootstrap {
    config_source: Arc<dyn DirectoryConfigSource>,
    registry: Arc<SchemaRegistry>,
    connector: Arc<dyn DirectoryConnector>,
    authenticator: Arc<dyn Authenticator>,
}

impl SessionBootstrap {
    pub fn new(
        config_source: Arc<dyn DirectoryConfigSource>,
        registry: Arc<SchemaRegistry>,
        connector: Arc<dyn DirectoryConnector>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config_source,
            registry,
            connector,
            authenticator,
        }
    }

    /// 确保会话已认证并持有配置
    pub async fn ensure(
        &self,
        session: &mut Session,
        credentials: Option<&Credentials>,
    ) -> Result<Bootstrapped> {
        if session.is_authenticated() {
            if let Some(config) = &session.config {
                return Ok(Bootstrapped {
                    config: config.clone(),
                    fresh: false,
                });
            }
            return self.rebuild(session).await;
        }

        let credentials = credentials.ok_or_else(|| {
            warn!("会话 {} 未提供凭据", session.id);
            AppError::Unauthorized("credentials required".to_string())
        })?;

        let directory_config = self.config_source.load()?;
        let location = directory_config
            .current_location()
            .map(|(_, location)| location.clone())
            .ok_or_else(|| AppError::Fatal("no usable location configured".to_string()))?;

        let mut conn = self
            .authenticator
            .authenticate(credentials, &location)
            .await?;
        session.mark_authenticated();
        info!(
            "会话 {} 已认证: user={}, location={}",
            session.id, credentials.username, location.name
        );

        let config = Arc::new(
            ConfigCache::build(directory_config, &self.registry, conn.as_mut()).await?,
        );
        session.config = Some(config.clone());
        Ok(Bootstrapped {
            config,
            fresh: true,
        })
    }

    /// 为先前构建未完成的已认证会话重建配置
    async fn rebuild(&self, session: &mut Session) -> Result<Bootstrapped> {
        let directory_config = self.config_source.load()?;
        let location = directory_config
            .current_location()
            .map(|(_, location)| location.clone())
            .ok_or_else(|| AppError::Fatal("no usable location configured".to_string()))?;

        let mut conn = self
            .connector
            .bind(&location, &location.admin_dn, &location.admin_password)
            .await?;
        let config = Arc::new(
            ConfigCache::build(directory_config, &self.registry, conn.as_mut()).await?,
        );
        info!("会话 {} 的配置缓存已重建", session.id);
        session.config = Some(config.clone());
        Ok(Bootstrapped {
            config,
            fresh: true,
        })
    }
}
