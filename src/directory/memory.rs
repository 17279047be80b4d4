//! In-memory directory backend
//!
//! Keeps entries in a shared tree keyed by normalized DN. Binds succeed when
//! the password matches the entry's `userPassword` value.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use crate::config::Location;
use crate::directory::{
    DirectoryConnection, DirectoryConnector, DirectoryError, Entry, Filter, SearchScope,
    normalize_dn, parent_dn,
};
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
struct Tree {
    entries: RwLock<BTreeMap<String, Entry>>,
    binds: AtomicU64,
    unreachable: AtomicBool,
}

/// Shared in-memory directory; clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    tree: Arc<Tree>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let directory = Self::new();
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    /// Loads entries from a JSON array of `{dn, attributes}` objects.
    pub fn from_seed(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Fatal(format!("cannot read seed {}: {}", path.display(), e))
        })?;
        let entries: Vec<Entry> = serde_json::from_str(&content)?;
        Ok(Self::with_entries(entries))
    }

    /// Small directory under `dc=example,dc=com` matching
    /// `DirectoryConfig::development()`.
    pub fn example() -> Self {
        Self::with_entries(vec![
            Entry::new("dc=example,dc=com")
                .with("objectClass", &["top", "dcObject", "organization"])
                .with("dc", &["example"])
                .with("o", &["Example"]),
            Entry::new("cn=admin,dc=example,dc=com")
                .with("objectClass", &["top", "organizationalRole", "simpleSecurityObject"])
                .with("cn", &["admin"])
                .with("userPassword", &["admin"]),
            Entry::new("ou=people,dc=example,dc=com")
                .with("objectClass", &["top", "organizationalUnit"])
                .with("ou", &["people"]),
            Entry::new("ou=groups,dc=example,dc=com")
                .with("objectClass", &["top", "organizationalUnit"])
                .with("ou", &["groups"]),
            Entry::new("ou=sales,dc=example,dc=com")
                .with("objectClass", &["top", "organizationalUnit", "gosaDepartment"])
                .with("ou", &["sales"])
                .with("description", &["Sales department"]),
            Entry::new("ou=people,ou=sales,dc=example,dc=com")
                .with("objectClass", &["top", "organizationalUnit"])
                .with("ou", &["people"]),
            Entry::new("uid=alice,ou=people,dc=example,dc=com")
                .with(
                    "objectClass",
                    &["top", "person", "organizationalPerson", "inetOrgPerson"],
                )
                .with("uid", &["alice"])
                .with("cn", &["Alice Liddell"])
                .with("givenName", &["Alice"])
                .with("sn", &["Liddell"])
                .with("userPassword", &["wonderland"]),
            Entry::new("uid=bob,ou=people,ou=sales,dc=example,dc=com")
                .with(
                    "objectClass",
                    &[
                        "top",
                        "person",
                        "organizationalPerson",
                        "inetOrgPerson",
                        "posixAccount",
                    ],
                )
                .with("uid", &["bob"])
                .with("cn", &["Bob Builder"])
                .with("sn", &["Builder"])
                .with("uidNumber", &["1001"])
                .with("gidNumber", &["1001"])
                .with("homeDirectory", &["/home/bob"])
                .with("loginShell", &["/bin/bash"])
                .with("userPassword", &["canwefixit"]),
            Entry::new("cn=staff,ou=groups,dc=example,dc=com")
                .with("objectClass", &["top", "posixGroup"])
                .with("cn", &["staff"])
                .with("gidNumber", &["1001"])
                .with("memberUid", &["alice", "bob"]),
        ])
    }

    pub fn insert(&self, entry: Entry) {
        self.tree
            .entries
            .write()
            .insert(normalize_dn(&entry.dn), entry);
    }

    pub fn get(&self, dn: &str) -> Option<Entry> {
        self.tree.entries.read().get(&normalize_dn(dn)).cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bind attempts seen so far
    pub fn bind_count(&self) -> u64 {
        self.tree.binds.load(Ordering::SeqCst)
    }

    /// Makes every subsequent bind fail with a connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.tree.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    async fn bind(
        &self,
        location: &Location,
        bind_dn: &str,
        password: &str,
    ) -> std::result::Result<Box<dyn DirectoryConnection>, DirectoryError> {
        self.tree.binds.fetch_add(1, Ordering::SeqCst);

        if self.tree.unreachable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Connect(location.uri.clone()));
        }

        let authenticated = self
            .get(bind_dn)
            .and_then(|entry| entry.first("userPassword").map(|stored| stored == password))
            .unwrap_or(false);
        if !authenticated || password.is_empty() {
            return Err(DirectoryError::InvalidCredentials(bind_dn.to_string()));
        }

        debug!("Bound to {} as {}", location.uri, bind_dn);
        Ok(Box::new(MemoryConnection {
            tree: self.tree.clone(),
            bound_dn: bind_dn.to_string(),
        }))
    }
}

struct MemoryConnection {
    tree: Arc<Tree>,
    bound_dn: String,
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => parent_dn(dn).is_some_and(|parent| parent == base),
        SearchScope::Subtree => base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base)),
    }
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    fn bound_dn(&self) -> &str {
        &self.bound_dn
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &Filter,
        attrs: &[String],
    ) -> std::result::Result<Vec<Entry>, DirectoryError> {
        let base = normalize_dn(base);
        let entries = self.tree.entries.read();
        if !base.is_empty() && !entries.contains_key(&base) {
            return Err(DirectoryError::NoSuchObject(base));
        }

        Ok(entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| entry.project(attrs))
            .collect())
    }

    async fn read(&mut self, dn: &str) -> std::result::Result<Option<Entry>, DirectoryError> {
        Ok(self.tree.entries.read().get(&normalize_dn(dn)).cloned())
    }

    async fn write(&mut self, entry: Entry) -> std::result::Result<(), DirectoryError> {
        let key = normalize_dn(&entry.dn);
        let mut entries = self.tree.entries.write();
        if !entries.contains_key(&key) {
            if let Some(parent) = parent_dn(&key) {
                if !entries.contains_key(&parent) {
                    return Err(DirectoryError::NoSuchObject(parent));
                }
            }
        }
        debug!("Writing entry {} as {}", entry.dn, self.bound_dn);
        entries.insert(key, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;

    fn location() -> Location {
        DirectoryConfig::development().locations.remove(0)
    }

    #[tokio::test]
    async fn test_bind_checks_password() {
        let directory = InMemoryDirectory::example();
        let location = location();

        assert!(
            directory
                .bind(&location, "cn=admin,dc=example,dc=com", "admin")
                .await
                .is_ok()
        );
        assert!(matches!(
            directory
                .bind(&location, "cn=admin,dc=example,dc=com", "wrong")
                .await
                .err(),
            Some(DirectoryError::InvalidCredentials(_))
        ));
        assert!(
            directory
                .bind(&location, "uid=nobody,dc=example,dc=com", "x")
                .await
                .is_err()
        );
        assert_eq!(directory.bind_count(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let directory = InMemoryDirectory::example();
        directory.set_unreachable(true);

        let err = directory
            .bind(&location(), "cn=admin,dc=example,dc=com", "admin")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DirectoryError::Connect(_)));
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let directory = InMemoryDirectory::example();
        let mut conn = directory
            .bind(&location(), "cn=admin,dc=example,dc=com", "admin")
            .await
            .unwrap();
        let people = Filter::equal("objectClass", "inetOrgPerson");

        let subtree = conn
            .search("dc=example,dc=com", SearchScope::Subtree, &people, &[])
            .await
            .unwrap();
        assert_eq!(subtree.len(), 2);

        let one_level = conn
            .search("ou=people,dc=example,dc=com", SearchScope::OneLevel, &people, &[])
            .await
            .unwrap();
        assert_eq!(one_level.len(), 1);
        assert_eq!(one_level[0].first("uid"), Some("alice"));

        let projected = conn
            .search(
                "uid=alice,ou=people,dc=example,dc=com",
                SearchScope::Base,
                &Filter::everything(),
                &["uid".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(projected[0].attributes.len(), 1);

        assert!(matches!(
            conn.search("ou=missing,dc=example,dc=com", SearchScope::Subtree, &people, &[])
                .await,
            Err(DirectoryError::NoSuchObject(_))
        ));
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let directory = InMemoryDirectory::example();
        let mut conn = directory
            .bind(&location(), "cn=admin,dc=example,dc=com", "admin")
            .await
            .unwrap();

        let orphan = Entry::new("uid=x,ou=nowhere,dc=example,dc=com").with("uid", &["x"]);
        assert!(conn.write(orphan).await.is_err());

        let carol = Entry::new("uid=carol,ou=people,dc=example,dc=com").with("uid", &["carol"]);
        conn.write(carol).await.unwrap();
        assert!(directory.get("UID=carol,ou=people,dc=example,dc=com").is_some());
    }

    #[test]
    fn test_from_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"dn": "dc=test", "attributes": {"objectClass": ["top"]}}]"#,
        )
        .unwrap();

        let directory = InMemoryDirectory::from_seed(file.path()).unwrap();
        assert_eq!(directory.len(), 1);
        assert!(InMemoryDirectory::from_seed(Path::new("/nonexistent.json")).is_err());
    }
}
