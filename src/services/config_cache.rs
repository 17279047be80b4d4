//! 会话配置缓存
//!
//! 每个会话构建一次：当前位置、部门索引以及每个类型解析后的标签页类和过滤器。
//! 构建完成后不可变，通过 `Arc` 共享。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{DirectoryConfig, Location, TabRef};
use crate::directory::{DirectoryConnection, Filter};
use crate::error::{AppError, Result};
use crate::models::department::DepartmentIndex;
use crate::models::tab::{Tab, TabObject};
use crate::schema::{SchemaRegistry, TabClass, TypeInfo};

/// 标签页组和过滤器均已解析的类型
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub info: TypeInfo,
    pub filter: Filter,
    /// 标签页组条目及其布局，基础标签页在前
    pub tabs: Vec<(TabRef, Arc<TabClass>)>,
}

impl ResolvedType {
    /// 该类型的新标签页对象
    pub fn instantiate(&self) -> Result<TabObject> {
        TabObject::new(self.info.clone(), self.new_tabs())
    }

    pub fn new_tabs(&self) -> Vec<Tab> {
        self.tabs
            .iter()
            .map(|(tab_ref, class)| Tab::new(class.clone(), &tab_ref.name))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigCache {
    location: Location,
    types: HashMap<String, ResolvedType>,
    departments: DepartmentIndex,
}

impl ConfigCache {
    /// 解析所有已注册类型并为当前位置建立部门索引，任何模式不一致都是致命错误
    pub async fn build(
        config: DirectoryConfig,
        registry: &SchemaRegistry,
        conn: &mut dyn DirectoryConnection,
    ) -> Result<Self> {
        let location = config
            .current_location()
            .map(|(_, location)| location.clone())
            .ok_or_else(|| AppError::Fatal("no usable location configured".to_string()))?;

        let mut types = HashMap::new();
        for info in registry.types() {
            let resolved = resolve(info, registry, &config.tabs)?;
            types.insert(info.name.to_lowercase(), resolved);
        }

        let departments = DepartmentIndex::build(conn, &location.base).await?;
        debug!(
            "配置缓存已构建: location={}, types={}, departments={}",
            location.base,
            types.len(),
            departments.len()
        );

        Ok(Self {
            location,
            types,
            departments,
        })
    }

    pub fn current_location(&self) -> &Location {
        &self.location
    }

    pub fn base(&self) -> &str {
        &self.current_location().base
    }

    pub fn departments(&self) -> &DepartmentIndex {
        &self.departments
    }

    /// 不区分大小写的类型查找
    pub fn resolve_type(&self, name: &str) -> Result<&ResolvedType> {
        self.types
            .get(&name.to_lowercase())
            .ok_or_else(|| AppError::UnknownType(name.to_string()))
    }
}

fn resolve(
    info: &TypeInfo,
    registry: &SchemaRegistry,
    tab_groups: &HashMap<String, Vec<TabRef>>,
) -> Result<ResolvedType> {
    if !registry.has_implementation(&info.implementation_class) {
        return Err(AppError::Fatal(format!(
            "type {}: implementation {} not found",
            info.name, info.implementation_class
        )));
    }

    let group = tab_groups
        .get(&info.tab_group)
        .filter(|group| !group.is_empty())
        .ok_or_else(|| {
            AppError::Fatal(format!(
                "type {}: tab group {} is not configured",
                info.name, info.tab_group
            ))
        })?;

    let mut tabs = Vec::with_capacity(group.len());
    for tab_ref in group {
        let class = registry.tab_class(&tab_ref.class).ok_or_else(|| {
            AppError::Fatal(format!(
                "type {}: tab class {} not found",
                info.name, tab_ref.class
            ))
        })?;
        tabs.push((tab_ref.clone(), class));
    }

    if tabs[0].1.attribute(&info.main_attr).is_none() {
        return Err(AppError::Fatal(format!(
            "type {}: base tab {} lacks main attribute {}",
            info.name, tabs[0].1.name, info.main_attr
        )));
    }

    let filter = Filter::parse(&info.filter).map_err(|e| {
        AppError::Fatal(format!("type {}: invalid filter {}: {}", info.name, info.filter, e))
    })?;

    Ok(ResolvedType {
        info: info.clone(),
        filter,
        tabs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryConnector, InMemoryDirectory};
    use crate::schema::builtin;

    async fn admin_connection(
        directory: &InMemoryDirectory,
        config: &DirectoryConfig,
    ) -> Box<dyn DirectoryConnection> {
        let location = &config.locations[0];
        directory
            .bind(location, &location.admin_dn, &location.admin_password)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_resolves_builtin_types() {
        let directory = InMemoryDirectory::example();
        let config = DirectoryConfig::development();
        let mut conn = admin_connection(&directory, &config).await;

        let cache = ConfigCache::build(config, &builtin::registry(), conn.as_mut())
            .await
            .unwrap();

        assert_eq!(cache.base(), "dc=example,dc=com");
        let person = cache.resolve_type("Person").unwrap();
        assert_eq!(person.tabs.len(), 3);
        assert_eq!(person.tabs[0].1.name, "person");
        assert_eq!(person.instantiate().unwrap().base_tab().name(), "User");
        assert_eq!(cache.departments().len(), 2);
        assert!(matches!(
            cache.resolve_type("printer"),
            Err(AppError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_tab_group_is_fatal() {
        let directory = InMemoryDirectory::example();
        let mut config = DirectoryConfig::development();
        config.tabs.remove("grouptabs");
        let mut conn = admin_connection(&directory, &config).await;

        let err = ConfigCache::build(config, &builtin::registry(), conn.as_mut())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("grouptabs"));
    }

    #[tokio::test]
    async fn test_missing_tab_class_is_fatal() {
        let directory = InMemoryDirectory::example();
        let mut config = DirectoryConfig::development();
        config
            .tabs
            .insert("grouptabs".into(), vec![TabRef::new("samba", "Samba")]);
        let mut conn = admin_connection(&directory, &config).await;

        let err = ConfigCache::build(config, &builtin::registry(), conn.as_mut())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_base_tab_without_main_attribute_is_fatal() {
        let directory = InMemoryDirectory::example();
        let mut config = DirectoryConfig::development();
        config.tabs.insert(
            "persontabs".into(),
            vec![TabRef::new("posix", "Unix"), TabRef::new("person", "User")],
        );
        let mut conn = admin_connection(&directory, &config).await;

        let err = ConfigCache::build(config, &builtin::registry(), conn.as_mut())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("main attribute uid"));
    }

    #[tokio::test]
    async fn test_missing_implementation_is_fatal() {
        let directory = InMemoryDirectory::example();
        let config = DirectoryConfig::development();
        let mut conn = admin_connection(&directory, &config).await;

        let mut registry = builtin::registry();
        registry.register_type(TypeInfo {
            name: "printer".into(),
            description: "Printer".into(),
            main_attr: "cn".into(),
            ou: "ou=printers,".into(),
            filter: "(objectClass=printer)".into(),
            icon: None,
            tab_group: "persontabs".into(),
            implementation_class: "printerTabs".into(),
        });

        let err = ConfigCache::build(config, &registry, conn.as_mut())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("printerTabs"));
    }
}
