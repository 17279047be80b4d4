//! Schema Registry Module
//!
//! Maps object type names to their metadata and tab classes to their
//! attribute layouts. The registry is the gateway's view of the plugin list;
//! `builtin` provides the stock types.

pub mod builtin;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::attribute::AttributeDef;

/// A group of attributes displayed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDef {
    pub id: String,
    pub label: String,
    pub attrs: Vec<AttributeDef>,
}

impl SectionDef {
    pub fn new(id: &str, label: &str, attrs: Vec<AttributeDef>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            attrs,
        }
    }
}

/// One facet of an object type: object classes plus attribute sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabClass {
    pub name: String,
    pub object_classes: Vec<String>,
    /// Optional tabs are only stored when one of their attributes is set.
    #[serde(default)]
    pub optional: bool,
    pub sections: Vec<SectionDef>,
}

impl TabClass {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.sections
            .iter()
            .flat_map(|section| section.attrs.iter())
            .find(|attr| attr.name == name)
    }
}

/// Static metadata describing an object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub description: String,
    /// Naming attribute, used as RDN
    pub main_attr: String,
    /// Container prefix below the branch, e.g. `ou=people,`
    pub ou: String,
    /// Filter selecting objects of this type
    pub filter: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Name of the tab group in the directory configuration
    pub tab_group: String,
    /// Aggregate implementation handling this type
    pub implementation_class: String,
}

/// Type name -> metadata, tab class name -> layout, known implementations.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, TypeInfo>,
    tab_classes: HashMap<String, Arc<TabClass>>,
    implementations: BTreeSet<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type; type names are case-insensitive.
    pub fn register_type(&mut self, info: TypeInfo) -> &mut Self {
        self.types.insert(info.name.to_lowercase(), info);
        self
    }

    pub fn register_tab_class(&mut self, class: TabClass) -> &mut Self {
        self.tab_classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    pub fn register_implementation(&mut self, name: &str) -> &mut Self {
        self.implementations.insert(name.to_string());
        self
    }

    pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(&name.to_lowercase())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values()
    }

    pub fn tab_class(&self, name: &str) -> Option<Arc<TabClass>> {
        self.tab_classes.get(name).cloned()
    }

    pub fn has_implementation(&self, name: &str) -> bool {
        self.implementations.contains(name)
    }
}
