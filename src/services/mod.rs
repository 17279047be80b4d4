//! 服务模块

pub mod bootstrap;
pub mod config_cache;
pub mod objects;
pub mod session_store;

pub use bootstrap::{Bootstrapped, SessionBootstrap};
pub use config_cache::{ConfigCache, ResolvedType};
pub use objects::{LsAttrs, LsMode, ObjectAccessor, TypeInfos};
pub use session_store::{InMemorySessionStore, SessionLease, SessionStore, create_session_store};
