//! Authentication Module
//!
//! HTTP Basic credentials and the gate validating them against the
//! directory on the first call of a session.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Location;
use crate::directory::{
    DirectoryConnection, DirectoryConnector, DirectoryError, Filter, SearchScope,
};
use crate::error::{AppError, Result};

/// Credentials for authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name or DN
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Try to extract Basic credentials from an Authorization header
    pub fn from_authorization_header(auth_header: Option<&str>) -> Option<Self> {
        let header = auth_header?.trim();
        let (scheme, encoded) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        if username.is_empty() {
            return None;
        }
        Some(Self::new(username, password))
    }

    /// Value of an Authorization header carrying these credentials
    pub fn to_authorization_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

/// Authentication trait for the session gate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validates the credentials, returning a connection bound as the user
    async fn authenticate(
        &self,
        credentials: &Credentials,
        location: &Location,
    ) -> Result<Box<dyn DirectoryConnection>>;
}

/// Validates credentials by binding to the directory
#[derive(Clone)]
pub struct DirectoryAuthenticator {
    connector: Arc<dyn DirectoryConnector>,
}

impl DirectoryAuthenticator {
    pub fn new(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { connector }
    }

    /// Maps a login name to exactly one DN using the service account.
    async fn lookup_dn(&self, username: &str, location: &Location) -> Result<String> {
        let mut service = self
            .connector
            .bind(location, &location.admin_dn, &location.admin_password)
            .await?;
        let matches = service
            .search(
                &location.base,
                SearchScope::Subtree,
                &Filter::equal("uid", username),
                &["uid".to_string()],
            )
            .await?;
        match matches.as_slice() {
            [entry] => Ok(entry.dn.clone()),
            [] => Err(AppError::Unauthorized(format!("unknown user {}", username))),
            _ => Err(AppError::Unauthorized(format!(
                "user {} is ambiguous ({} matches)",
                username,
                matches.len()
            ))),
        }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        location: &Location,
    ) -> Result<Box<dyn DirectoryConnection>> {
        let dn = if credentials.username.contains('=') {
            credentials.username.clone()
        } else {
            self.lookup_dn(&credentials.username, location).await?
        };

        match self.connector.bind(location, &dn, &credentials.password).await {
            Ok(conn) => {
                debug!("用户 {} 已通过认证", dn);
                Ok(conn)
            }
            Err(DirectoryError::InvalidCredentials(_)) => {
                warn!("认证失败: {}", dn);
                Err(AppError::Unauthorized(format!("invalid credentials for {}", dn)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::directory::{Entry, InMemoryDirectory};
    use rstest::rstest;

    fn location() -> Location {
        DirectoryConfig::development().locations.remove(0)
    }

    #[rstest]
    #[case(Some("Basic YWxpY2U6d29uZGVybGFuZA=="), Some(("alice", "wonderland")))]
    #[case(Some("basic YWxpY2U6d29uOmRlcg=="), Some(("alice", "won:der")))]
    #[case(Some("Bearer abc"), None)]
    #[case(Some("Basic !!!"), None)]
    #[case(Some("Basic OnNlY3JldA=="), None)]
    #[case(None, None)]
    fn test_from_authorization_header(
        #[case] header: Option<&str>,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let parsed = Credentials::from_authorization_header(header);
        assert_eq!(parsed, expected.map(|(u, p)| Credentials::new(u, p)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("alice", "wonderland");
        assert!(!format!("{:?}", creds).contains("wonderland"));
        assert_eq!(
            Credentials::from_authorization_header(Some(&creds.to_authorization_header())),
            Some(creds)
        );
    }

    #[tokio::test]
    async fn test_authenticate_by_uid_and_dn() {
        let directory = Arc::new(InMemoryDirectory::example());
        let gate = DirectoryAuthenticator::new(directory.clone());
        let location = location();

        let conn = gate
            .authenticate(&Credentials::new("bob", "canwefixit"), &location)
            .await
            .unwrap();
        assert_eq!(conn.bound_dn(), "uid=bob,ou=people,ou=sales,dc=example,dc=com");

        let conn = gate
            .authenticate(
                &Credentials::new("uid=alice,ou=people,dc=example,dc=com", "wonderland"),
                &location,
            )
            .await
            .unwrap();
        assert_eq!(conn.bound_dn(), "uid=alice,ou=people,dc=example,dc=com");
    }

    #[rstest]
    #[case("alice", "wrong")]
    #[case("mallory", "secret")]
    #[case("uid=nobody,dc=example,dc=com", "x")]
    #[tokio::test]
    async fn test_rejected_credentials_are_unauthorized(
        #[case] username: &str,
        #[case] password: &str,
    ) {
        let gate = DirectoryAuthenticator::new(Arc::new(InMemoryDirectory::example()));
        let err = gate
            .authenticate(&Credentials::new(username, password), &location())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_uid_is_unauthorized() {
        let directory = InMemoryDirectory::example();
        directory.insert(
            Entry::new("uid=alice,ou=people,ou=sales,dc=example,dc=com")
                .with("objectClass", &["inetOrgPerson"])
                .with("uid", &["alice"])
                .with("userPassword", &["other"]),
        );
        let gate = DirectoryAuthenticator::new(Arc::new(directory));
        let err = gate
            .authenticate(&Credentials::new("alice", "wonderland"), &location())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_fatal() {
        let directory = InMemoryDirectory::example();
        directory.set_unreachable(true);
        let gate = DirectoryAuthenticator::new(Arc::new(directory));
        let err = gate
            .authenticate(&Credentials::new("alice", "wonderland"), &location())
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }
}
