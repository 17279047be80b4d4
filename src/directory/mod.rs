//! Directory Service Module
//!
//! Interfaces the gateway needs from a hierarchical directory service:
//! binding, searching, reading and writing entries. `memory` provides an
//! in-process implementation; `filter` the search filter language.

pub mod filter;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::Location;

pub use filter::Filter;
pub use memory::InMemoryDirectory;

/// Directory protocol errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    /// The directory could not be reached
    #[error("cannot connect to {0}")]
    Connect(String),

    /// Bind rejected
    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    /// Referenced entry does not exist
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// Any other operation failure
    #[error("operation failed: {0}")]
    Operation(String),
}

/// Search scope relative to the search base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// A directory entry: its DN and multi-valued attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entry {
    pub dn: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: &str, values: &[&str]) -> Self {
        self.set(name, values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Values of an attribute; attribute names compare case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Replaces an attribute; an empty value list removes it.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        let existing = self
            .attributes
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned();
        if let Some(key) = existing {
            self.attributes.remove(&key);
        }
        if !values.is_empty() {
            self.attributes.insert(name.to_string(), values);
        }
    }

    pub fn object_classes(&self) -> &[String] {
        self.get("objectClass").unwrap_or(&[])
    }

    pub fn has_object_class(&self, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }

    /// Keeps only the requested attributes; an empty list keeps all.
    pub fn project(&self, attrs: &[String]) -> Entry {
        if attrs.is_empty() {
            return self.clone();
        }
        Entry {
            dn: self.dn.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(key, _)| attrs.iter().any(|a| a.eq_ignore_ascii_case(key)))
                .map(|(key, values)| (key.clone(), values.clone()))
                .collect(),
        }
    }
}

/// Opens connections to a location.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Binds to `location` as `bind_dn`.
    async fn bind(
        &self,
        location: &Location,
        bind_dn: &str,
        password: &str,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// A live, request-scoped connection.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// DN this connection is bound as
    fn bound_dn(&self) -> &str;

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &Filter,
        attrs: &[String],
    ) -> Result<Vec<Entry>, DirectoryError>;

    async fn read(&mut self, dn: &str) -> Result<Option<Entry>, DirectoryError>;

    /// Adds the entry or replaces the stored one with the same DN.
    async fn write(&mut self, entry: Entry) -> Result<(), DirectoryError>;
}

/// Splits a DN into its RDN components, honouring `\` escapes.
pub fn split_dn(dn: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in dn.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == ',' {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Canonical form used for comparisons: trimmed, lowercased RDNs.
pub fn normalize_dn(dn: &str) -> String {
    split_dn(dn)
        .iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => format!(
                "{}={}",
                attr.trim().to_lowercase(),
                value.trim().to_lowercase()
            ),
            None => rdn.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parent DN, or `None` for a single-RDN DN.
pub fn parent_dn(dn: &str) -> Option<String> {
    let parts = split_dn(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Whether `dn` equals `base` or lies below it.
pub fn is_within(dn: &str, base: &str) -> bool {
    let dn = normalize_dn(dn);
    let base = normalize_dn(base);
    base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base))
}

/// Escapes a value for use in an RDN.
pub fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' | ' ' if i == 0 => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    if escaped.ends_with(' ') && !escaped.ends_with("\\ ") {
        escaped.pop();
        escaped.push_str("\\ ");
    }
    escaped
}

/// Escapes a value for use inside a search filter.
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_normalize() {
        let dn = "uid=Doe\\, John , ou=People,DC=Example,dc=com";
        let parts = split_dn(dn);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "uid=Doe\\, John");
        assert_eq!(
            normalize_dn(dn),
            "uid=doe\\, john,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_parent_and_within() {
        assert_eq!(
            parent_dn("uid=a,ou=people,dc=example,dc=com").as_deref(),
            Some("ou=people,dc=example,dc=com")
        );
        assert_eq!(parent_dn("dc=com"), None);
        assert!(is_within("uid=a,ou=People,dc=example,dc=com", "dc=example,dc=com"));
        assert!(is_within("dc=example,dc=com", "DC=example, dc=com"));
        assert!(!is_within("dc=other,dc=com", "dc=example,dc=com"));
        assert!(!is_within("uid=a,dc=xexample,dc=com", "dc=example,dc=com"));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_rdn_value("Doe, John"), "Doe\\, John");
        assert_eq!(escape_rdn_value("#tag"), "\\#tag");
        assert_eq!(escape_filter_value("a*(b)"), "a\\2a\\28b\\29");
    }

    #[test]
    fn test_entry_attribute_access() {
        let mut entry = Entry::new("uid=a,dc=example,dc=com")
            .with("objectClass", &["top", "inetOrgPerson"])
            .with("uid", &["a"]);

        assert_eq!(entry.first("UID"), Some("a"));
        assert!(entry.has_object_class("inetorgperson"));

        entry.set("Uid", vec![]);
        assert!(entry.get("uid").is_none());

        let projected = entry.project(&["objectclass".to_string()]);
        assert_eq!(projected.attributes.len(), 1);
    }
}
