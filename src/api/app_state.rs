use crate::config::{AppConfig, DirectoryConfig, DirectoryConfigSource, StaticDirectoryConfig};
use crate::directory::DirectoryConnector;
use crate::observability::{AppMetrics, FatalSignal};
use crate::rpc::Dispatcher;
use crate::schema::{SchemaRegistry, builtin};
use crate::security::auth::{Authenticator, DirectoryAuthenticator};
use crate::services::bootstrap::SessionBootstrap;
use crate::services::session_store::{SessionStore, create_session_store};
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Sessions by identifier
    pub session_store: Arc<dyn SessionStore>,
    /// Authentication and per-session configuration
    pub bootstrap: Arc<SessionBootstrap>,
    /// Method name to handler routing
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<AppMetrics>,
    /// Raised when a fatal error should stop the server
    pub fatal: FatalSignal,
    /// Realm of the Basic authentication challenge
    pub realm: String,
    pub abort_on_fatal: bool,
    pub diagnostics_enabled: bool,
    pub max_request_size: usize,
    pub app_name: String,
    pub environment: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session_store", &"Arc<dyn SessionStore>")
            .field("bootstrap", &"Arc<SessionBootstrap>")
            .field("dispatcher", &"Arc<Dispatcher>")
            .field("realm", &self.realm)
            .field("abort_on_fatal", &self.abort_on_fatal)
            .field("diagnostics_enabled", &self.diagnostics_enabled)
            .field("app_name", &self.app_name)
            .field("environment", &self.environment)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: &AppConfig,
        config_source: Arc<dyn DirectoryConfigSource>,
        connector: Arc<dyn DirectoryConnector>,
        registry: Arc<SchemaRegistry>,
    ) -> Self {
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(DirectoryAuthenticator::new(connector.clone()));
        let bootstrap =
            SessionBootstrap::new(config_source, registry, connector.clone(), authenticator);

        Self {
            session_store: create_session_store(),
            bootstrap: Arc::new(bootstrap),
            dispatcher: Arc::new(Dispatcher::new(connector)),
            metrics: Arc::new(AppMetrics::default()),
            fatal: FatalSignal::new(),
            realm: config.server.realm.clone(),
            abort_on_fatal: config.server.abort_on_fatal,
            diagnostics_enabled: config.server.diagnostics_enabled,
            max_request_size: config.server.max_request_size,
            app_name: config.app_name.clone(),
            environment: config.environment.clone(),
        }
    }

    /// Create development application state: built-in schema and the
    /// development directory configuration.
    pub fn development(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self::new(
            &AppConfig::development(),
            Arc::new(StaticDirectoryConfig(DirectoryConfig::development())),
            connector,
            Arc::new(builtin::registry()),
        )
    }
}
