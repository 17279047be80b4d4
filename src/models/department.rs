use serde::Serialize;
use std::collections::BTreeMap;

use crate::directory::{
    DirectoryConnection, Filter, SearchScope, normalize_dn, split_dn,
};
use crate::error::Result;
use crate::schema::builtin::DEPARTMENT_CLASS;

/// 部门
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    /// 部门 DN
    pub dn: String,
    /// 显示名称（RDN 值）
    pub name: String,
    /// 相对于根分支的路径，例如 `/sales/emea`
    pub path: String,
}

/// 部门索引：根分支以及所有部门分支，按规范化 DN 索引
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentIndex {
    departments: BTreeMap<String, Department>,
}

impl DepartmentIndex {
    /// 从目录构建索引
    pub async fn build(conn: &mut dyn DirectoryConnection, base: &str) -> Result<Self> {
        let filter = Filter::equal("objectClass", DEPARTMENT_CLASS);
        let entries = conn
            .search(base, SearchScope::Subtree, &filter, &["ou".to_string()])
            .await?;

        let mut index = Self::default();
        index.insert(base, base, "/");
        for entry in entries {
            let path = relative_path(&entry.dn, base);
            index.insert(&entry.dn, base, &path);
        }
        Ok(index)
    }

    fn insert(&mut self, dn: &str, base: &str, path: &str) {
        let name = if normalize_dn(dn) == normalize_dn(base) {
            "/".to_string()
        } else {
            rdn_value(dn)
        };
        self.departments.insert(
            normalize_dn(dn),
            Department {
                dn: dn.to_string(),
                name,
                path: path.to_string(),
            },
        );
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.departments.contains_key(&normalize_dn(dn))
    }

    pub fn get(&self, dn: &str) -> Option<&Department> {
        self.departments.get(&normalize_dn(dn))
    }

    pub fn len(&self) -> usize {
        self.departments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }

    /// 按路径排序的部门列表
    pub fn sorted(&self) -> Vec<&Department> {
        let mut departments: Vec<&Department> = self.departments.values().collect();
        departments.sort_by(|a, b| a.path.cmp(&b.path));
        departments
    }
}

fn rdn_value(dn: &str) -> String {
    split_dn(dn)
        .first()
        .and_then(|rdn| rdn.split_once('='))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

fn relative_path(dn: &str, base: &str) -> String {
    let parts = split_dn(dn);
    let depth = parts.len().saturating_sub(split_dn(base).len());
    let mut names: Vec<String> = parts[..depth]
        .iter()
        .map(|rdn| {
            rdn.split_once('=')
                .map(|(_, value)| value.trim().to_string())
                .unwrap_or_default()
        })
        .collect();
    names.reverse();
    format!("/{}", names.join("/"))
}
