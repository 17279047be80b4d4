//! Security Module
//!
//! Provides the security features of the gateway:
//! - HTTP Basic credentials and the directory authentication gate
//! - Security headers middleware

pub mod auth;
pub mod middleware;

pub use auth::{Authenticator, Credentials, DirectoryAuthenticator};
