//! Tab object model
//!
//! A logical entity is made of several tabs, each a group of attributes.
//! `TabObject` loads them, validates fields across all tabs and writes
//! them back to the directory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::directory::{
    DirectoryConnection, Entry, Filter, SearchScope, escape_rdn_value, normalize_dn, parent_dn,
    split_dn,
};
use crate::error::{AppError, Result};
use crate::models::attribute::{Attribute, AttributeDescriptor, AttributeKind};
use crate::models::department::DepartmentIndex;
use crate::schema::{TabClass, TypeInfo};

/// Field-level validation errors, returned to the caller as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub tab: String,
    pub attribute: String,
    pub message: String,
}

impl FieldError {
    pub fn new(tab: &str, attribute: &str, message: impl Into<String>) -> Self {
        Self {
            tab: tab.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}

/// Description of the visible attributes of one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFields {
    pub id: String,
    pub label: String,
    pub attrs: IndexMap<String, AttributeDescriptor>,
}

/// A tab
#[derive(Debug, Clone)]
pub struct Tab {
    name: String,
    class: Arc<TabClass>,
    attributes: IndexMap<String, Attribute>,
}

impl Tab {
    pub fn new(class: Arc<TabClass>, name: &str) -> Self {
        let attributes = class
            .sections
            .iter()
            .flat_map(|section| section.attrs.iter())
            .map(|def| (def.name.clone(), Attribute::new(def.clone())))
            .collect();
        Self {
            name: name.to_string(),
            class,
            attributes,
        }
    }

    /// Display name from the tab group
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|attr| attr.def().visibility.evaluate(&self.attributes))
    }

    /// Optional tabs are active once one of their visible attributes is set.
    pub fn is_active(&self) -> bool {
        !self.class.optional
            || self.attributes.values().any(|attr| {
                attr.kind() != AttributeKind::Base && attr.is_set() && self.is_visible(attr.name())
            })
    }

    /// Sets a value through the visible-attribute access layer.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        if !self.is_visible(name) {
            return Err(AppError::UnknownAttribute {
                tab: self.class.name.clone(),
                attribute: name.to_string(),
            });
        }
        if let Some(attr) = self.attributes.get_mut(name) {
            attr.set_value(value);
        }
        Ok(())
    }

    /// Loads values from an entry; `branch` feeds base attributes.
    pub fn load(&mut self, entry: &Entry, branch: &str) {
        for attr in self.attributes.values_mut() {
            let value = match attr.kind() {
                AttributeKind::Base => Value::String(branch.to_string()),
                kind => kind.decode(entry.get(attr.name()).unwrap_or(&[])),
            };
            attr.set_value(value);
        }
    }

    /// All attribute values, including invisible ones
    pub fn values(&self) -> IndexMap<String, Value> {
        self.attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.value().clone()))
            .collect()
    }

    /// Visible attribute descriptors grouped by section
    pub fn fields(&self) -> Vec<SectionFields> {
        self.class
            .sections
            .iter()
            .map(|section| SectionFields {
                id: section.id.clone(),
                label: section.label.clone(),
                attrs: section
                    .attrs
                    .iter()
                    .filter(|def| self.is_visible(&def.name))
                    .filter_map(|def| {
                        self.attributes
                            .get(&def.name)
                            .map(|attr| (def.name.clone(), attr.descriptor()))
                    })
                    .collect(),
            })
            .collect()
    }

    /// Local checks of the visible attributes of an active tab.
    pub fn check(&self) -> Vec<FieldError> {
        if !self.is_active() {
            return Vec::new();
        }
        self.attributes
            .values()
            .filter(|attr| self.is_visible(attr.name()))
            .filter_map(|attr| {
                attr.check()
                    .map(|message| FieldError::new(&self.class.name, attr.name(), message))
            })
            .collect()
    }

    fn write_into(&self, entry: &mut Entry) {
        for attr in self.attributes.values() {
            if attr.kind() == AttributeKind::Base {
                continue;
            }
            if let Some(values) = attr.kind().encode(attr.value()) {
                entry.set(attr.name(), values);
            }
        }
    }

    fn clear_from(&self, entry: &mut Entry) {
        for attr in self.attributes.values() {
            if attr.kind() != AttributeKind::Base {
                entry.set(attr.name(), Vec::new());
            }
        }
    }
}

/// Values the whole-object check needs from the session configuration.
pub struct CheckContext<'a> {
    /// Current location base
    pub base: &'a str,
    pub departments: &'a DepartmentIndex,
    /// Filter selecting objects of the same type
    pub type_filter: &'a Filter,
}

/// All tabs of one entity
#[derive(Debug, Clone)]
pub struct TabObject {
    info: TypeInfo,
    dn: Option<String>,
    tabs: IndexMap<String, Tab>,
    original: Option<Entry>,
}

impl TabObject {
    /// New, empty object. The first tab is the base tab.
    pub fn new(info: TypeInfo, tabs: Vec<Tab>) -> Result<Self> {
        if tabs.is_empty() {
            return Err(AppError::Internal(format!("type {} has no tabs", info.name)));
        }
        Ok(Self {
            info,
            dn: None,
            tabs: tabs
                .into_iter()
                .map(|tab| (tab.class_name().to_string(), tab))
                .collect(),
            original: None,
        })
    }

    /// Object loaded from an existing entry.
    pub fn open(info: TypeInfo, tabs: Vec<Tab>, entry: Entry) -> Result<Self> {
        let mut object = Self::new(info, tabs)?;
        let branch = branch_of(&entry.dn, &object.info.ou);
        for tab in object.tabs.values_mut() {
            tab.load(&entry, &branch);
        }
        object.dn = Some(entry.dn.clone());
        object.original = Some(entry);
        Ok(object)
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.info
    }

    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.dn.is_none()
    }

    pub fn base_tab(&self) -> &Tab {
        &self.tabs[0]
    }

    pub fn tabs(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.values()
    }

    /// Selected tab: the base tab when `name` is absent.
    pub fn tab(&self, name: Option<&str>) -> Result<&Tab> {
        match name {
            None => Ok(self.base_tab()),
            Some(name) => self.tabs.get(name).ok_or_else(|| self.unknown_tab(name)),
        }
    }

    pub fn tab_mut(&mut self, name: Option<&str>) -> Result<&mut Tab> {
        match name {
            None => Ok(&mut self.tabs[0]),
            Some(name) => {
                if !self.tabs.contains_key(name) {
                    return Err(self.unknown_tab(name));
                }
                self.tabs
                    .get_mut(name)
                    .ok_or_else(|| AppError::Internal(format!("tab {} vanished", name)))
            }
        }
    }

    fn unknown_tab(&self, name: &str) -> AppError {
        AppError::UnknownTab {
            object_type: self.info.name.clone(),
            tab: name.to_string(),
        }
    }

    fn main_attribute(&self) -> Option<&Attribute> {
        self.base_tab().attribute(&self.info.main_attr)
    }

    fn main_value(&self) -> Option<String> {
        self.main_attribute().and_then(|attr| match attr.value() {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Branch the object is stored under: the base attribute or `default_base`.
    pub fn branch(&self, default_base: &str) -> String {
        self.base_tab()
            .attributes()
            .find(|attr| attr.kind() == AttributeKind::Base)
            .and_then(|attr| attr.value().as_str())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_base.to_string())
    }

    /// Existing DN, or the DN a new object would get.
    pub fn target_dn(&self, default_base: &str) -> Option<String> {
        if let Some(dn) = &self.dn {
            return Some(dn.clone());
        }
        let value = self.main_value()?;
        Some(format!(
            "{}={},{}{}",
            self.info.main_attr,
            escape_rdn_value(&value),
            self.info.ou,
            self.branch(default_base)
        ))
    }

    /// Checks every tab. Field failures are returned as data; directory
    /// failures as errors.
    pub async fn check(
        &self,
        ctx: &CheckContext<'_>,
        conn: &mut dyn DirectoryConnection,
    ) -> Result<Vec<FieldError>> {
        let mut errors: Vec<FieldError> = self.tabs.values().flat_map(Tab::check).collect();
        let base_class = self.base_tab().class_name().to_string();
        let main_attr = self.info.main_attr.clone();
        let has_error = |errors: &[FieldError], attribute: &str| {
            errors.iter().any(|e| e.attribute == attribute)
        };

        if self.main_value().is_none() && !has_error(&errors, &main_attr) {
            errors.push(FieldError::new(
                &base_class,
                &main_attr,
                format!("{} must not be empty", main_attr),
            ));
        }

        let branch = self.branch(ctx.base);
        if let Some(base_attr) = self
            .base_tab()
            .attributes()
            .find(|attr| attr.kind() == AttributeKind::Base)
        {
            if !ctx.departments.contains(&branch) {
                errors.push(FieldError::new(
                    &base_class,
                    base_attr.name(),
                    format!("{} is not a known department", branch),
                ));
            }
        }

        if let Some(original) = &self.original {
            if let (Some(before), Some(after)) = (original.first(&main_attr), self.main_value()) {
                if !before.eq_ignore_ascii_case(&after) {
                    errors.push(FieldError::new(
                        &base_class,
                        &main_attr,
                        format!("{} cannot be changed on an existing object", main_attr),
                    ));
                }
            }
            let stored_branch = branch_of(&original.dn, &self.info.ou);
            if normalize_dn(&stored_branch) != normalize_dn(&branch) {
                errors.push(FieldError::new(
                    &base_class,
                    "base",
                    "moving an existing object is not supported",
                ));
            }
        }

        if !errors.is_empty() {
            return Ok(errors);
        }

        let own_dn = self.dn.as_deref().map(normalize_dn);
        for tab in self.tabs.values().filter(|tab| tab.is_active()) {
            for attr in tab.attributes().filter(|attr| attr.def().unique) {
                let value = match attr.value() {
                    Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                let filter = Filter::and(vec![
                    ctx.type_filter.clone(),
                    Filter::equal(attr.name(), &value),
                ]);
                let clashes = conn
                    .search(ctx.base, SearchScope::Subtree, &filter, &[attr.name().to_string()])
                    .await?;
                if let Some(other) = clashes
                    .iter()
                    .find(|entry| Some(normalize_dn(&entry.dn)) != own_dn)
                {
                    errors.push(FieldError::new(
                        tab.class_name(),
                        attr.name(),
                        format!("{} '{}' is already used by {}", attr.def().label, value, other.dn),
                    ));
                }
            }
        }

        if self.is_new() && errors.is_empty() {
            if let Some(dn) = self.target_dn(ctx.base) {
                if conn.read(&dn).await?.is_some() {
                    errors.push(FieldError::new(
                        &base_class,
                        &main_attr,
                        format!("an object already exists at {}", dn),
                    ));
                } else if let Some(parent) = parent_dn(&dn) {
                    if conn.read(&parent).await?.is_none() {
                        errors.push(FieldError::new(
                            &base_class,
                            "base",
                            format!("container {} does not exist", parent),
                        ));
                    }
                }
            }
        }

        Ok(errors)
    }

    /// Entry to store at `dn`: the loaded entry with every tab applied.
    pub fn to_entry(&self, dn: &str) -> Entry {
        let mut entry = self.original.clone().unwrap_or_default();
        entry.dn = dn.to_string();

        let mut classes: Vec<String> = entry.object_classes().to_vec();
        if classes.is_empty() {
            classes.push("top".to_string());
        }
        for tab in self.tabs.values() {
            if tab.is_active() {
                tab.write_into(&mut entry);
                for class in &tab.class.object_classes {
                    if !classes.iter().any(|c| c.eq_ignore_ascii_case(class)) {
                        classes.push(class.clone());
                    }
                }
            } else {
                tab.clear_from(&mut entry);
                classes.retain(|c| {
                    !tab.class
                        .object_classes
                        .iter()
                        .any(|class| class.eq_ignore_ascii_case(c))
                });
            }
        }
        entry.set("objectClass", classes);
        entry
    }

    /// Writes the object and returns its DN.
    pub async fn save(
        &mut self,
        conn: &mut dyn DirectoryConnection,
        default_base: &str,
    ) -> Result<String> {
        let dn = self.target_dn(default_base).ok_or_else(|| {
            AppError::Internal(format!("{} has no value for {}", self.info.name, self.info.main_attr))
        })?;
        let entry = self.to_entry(&dn);
        conn.write(entry.clone()).await?;
        self.dn = Some(dn.clone());
        self.original = Some(entry);
        Ok(dn)
    }
}

/// Branch of an object stored at `dn` below the container prefix `ou`.
fn branch_of(dn: &str, ou: &str) -> String {
    let parent = match parent_dn(dn) {
        Some(parent) => parent,
        None => return String::new(),
    };
    let parent_parts = split_dn(&parent);
    let ou_parts = split_dn(ou.trim_end_matches(','));
    let matches_ou = ou_parts.len() <= parent_parts.len()
        && ou_parts
            .iter()
            .zip(parent_parts.iter())
            .all(|(a, b)| normalize_dn(a) == normalize_dn(b));
    if matches_ou {
        parent_parts[ou_parts.len()..].join(",")
    } else {
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::directory::{DirectoryConnector, InMemoryDirectory};
    use crate::schema::builtin;
    use serde_json::json;

    fn person_object(entry: Option<Entry>) -> TabObject {
        let registry = builtin::registry();
        let info = registry.type_info("person").unwrap().clone();
        let tabs = vec![
            Tab::new(registry.tab_class("person").unwrap(), "User"),
            Tab::new(registry.tab_class("posix").unwrap(), "Unix"),
            Tab::new(registry.tab_class("mail").unwrap(), "Mail"),
        ];
        match entry {
            Some(entry) => TabObject::open(info, tabs, entry).unwrap(),
            None => TabObject::new(info, tabs).unwrap(),
        }
    }

    #[test]
    fn test_branch_of() {
        assert_eq!(
            branch_of("uid=a,ou=people,ou=sales,dc=example,dc=com", "ou=people,"),
            "ou=sales,dc=example,dc=com"
        );
        assert_eq!(
            branch_of("ou=sales,dc=example,dc=com", ""),
            "dc=example,dc=com"
        );
        assert_eq!(
            branch_of("uid=a,ou=staff,dc=example,dc=com", "ou=people,"),
            "ou=staff,dc=example,dc=com"
        );
    }

    #[test]
    fn test_tab_selection() {
        let object = person_object(None);
        assert_eq!(object.tab(None).unwrap().class_name(), "person");
        assert_eq!(object.tab(Some("posix")).unwrap().name(), "Unix");
        assert!(matches!(
            object.tab(Some("samba")),
            Err(AppError::UnknownTab { .. })
        ));
    }

    #[test]
    fn test_fields_omit_invisible_attributes() {
        let mut object = person_object(None);
        let posix = object.tab_mut(Some("posix")).unwrap();
        let names: Vec<String> = posix.fields()[0].attrs.keys().cloned().collect();
        assert!(!names.contains(&"loginShell".to_string()));

        assert!(matches!(
            posix.set_value("loginShell", json!("/bin/zsh")),
            Err(AppError::UnknownAttribute { .. })
        ));

        posix.set_value("homeDirectory", json!("/home/c")).unwrap();
        let names: Vec<String> = posix.fields()[0].attrs.keys().cloned().collect();
        assert!(names.contains(&"loginShell".to_string()));
    }

    #[test]
    fn test_optional_tab_activation() {
        let mut object = person_object(None);
        assert!(!object.tab(Some("posix")).unwrap().is_active());
        assert!(object.tab(Some("posix")).unwrap().check().is_empty());

        let posix = object.tab_mut(Some("posix")).unwrap();
        posix.set_value("uidNumber", json!(2000)).unwrap();
        assert!(posix.is_active());

        let errors = posix.check();
        let failing: Vec<&str> = errors.iter().map(|e| e.attribute.as_str()).collect();
        assert_eq!(failing, vec!["gidNumber", "homeDirectory"]);
    }

    #[test]
    fn test_open_loads_values_and_branch() {
        let entry = InMemoryDirectory::example()
            .get("uid=bob,ou=people,ou=sales,dc=example,dc=com")
            .unwrap();
        let object = person_object(Some(entry));

        let base = object.base_tab();
        assert_eq!(base.attribute("uid").unwrap().value(), &json!("bob"));
        assert_eq!(base.attribute("userPassword").unwrap().value(), &json!(""));
        assert_eq!(object.branch("dc=example,dc=com"), "ou=sales,dc=example,dc=com");

        let posix = object.tab(Some("posix")).unwrap();
        assert!(posix.is_active());
        assert_eq!(posix.attribute("uidNumber").unwrap().value(), &json!(1001));
        assert!(!object.tab(Some("mail")).unwrap().is_active());
    }

    #[test]
    fn test_to_entry_manages_object_classes() {
        let entry = InMemoryDirectory::example()
            .get("uid=bob,ou=people,ou=sales,dc=example,dc=com")
            .unwrap();
        let mut object = person_object(Some(entry));

        let posix = object.tab_mut(Some("posix")).unwrap();
        for name in ["uidNumber", "gidNumber", "homeDirectory"] {
            posix.set_value(name, Value::Null).unwrap();
        }
        let stored = object.to_entry(object.dn().unwrap());

        assert!(!stored.has_object_class("posixAccount"));
        assert!(stored.get("uidNumber").is_none());
        assert!(stored.get("loginShell").is_none());
        assert_eq!(stored.first("userPassword"), Some("canwefixit"));
        assert!(stored.has_object_class("inetOrgPerson"));
    }

    #[tokio::test]
    async fn test_check_and_save_new_object() {
        let directory = InMemoryDirectory::example();
        let location = DirectoryConfig::development().locations.remove(0);
        let mut conn = directory
            .bind(&location, &location.admin_dn, &location.admin_password)
            .await
            .unwrap();
        let departments = DepartmentIndex::build(conn.as_mut(), &location.base)
            .await
            .unwrap();
        let type_filter = Filter::equal("objectClass", "inetOrgPerson");
        let ctx = CheckContext {
            base: &location.base,
            departments: &departments,
            type_filter: &type_filter,
        };

        let mut object = person_object(None);
        let base = object.tab_mut(None).unwrap();
        base.set_value("base", json!(location.base)).unwrap();
        base.set_value("uid", json!("alice")).unwrap();
        base.set_value("sn", json!("Doe")).unwrap();
        base.set_value("cn", json!("Carol Doe")).unwrap();

        let errors = object.check(&ctx, conn.as_mut()).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("already used"));

        object
            .tab_mut(None)
            .unwrap()
            .set_value("uid", json!("carol"))
            .unwrap();
        assert!(object.check(&ctx, conn.as_mut()).await.unwrap().is_empty());

        let dn = object.save(conn.as_mut(), &location.base).await.unwrap();
        assert_eq!(dn, "uid=carol,ou=people,dc=example,dc=com");
        let stored = directory.get(&dn).unwrap();
        assert_eq!(stored.first("sn"), Some("Doe"));
        assert!(stored.get("base").is_none());
        assert!(!stored.has_object_class("posixAccount"));
    }

    #[tokio::test]
    async fn test_check_rejects_unknown_department() {
        let directory = InMemoryDirectory::example();
        let location = DirectoryConfig::development().locations.remove(0);
        let mut conn = directory
            .bind(&location, &location.admin_dn, &location.admin_password)
            .await
            .unwrap();
        let departments = DepartmentIndex::build(conn.as_mut(), &location.base)
            .await
            .unwrap();
        let type_filter = Filter::equal("objectClass", "inetOrgPerson");
        let ctx = CheckContext {
            base: &location.base,
            departments: &departments,
            type_filter: &type_filter,
        };

        let mut object = person_object(None);
        let base = object.tab_mut(None).unwrap();
        base.set_value("base", json!("ou=groups,dc=example,dc=com")).unwrap();
        base.set_value("uid", json!("dave")).unwrap();
        base.set_value("sn", json!("D")).unwrap();
        base.set_value("cn", json!("Dave D")).unwrap();

        let errors = object.check(&ctx, conn.as_mut()).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].attribute, "base");
    }
}
