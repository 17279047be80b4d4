//! 对象访问服务
//!
//! 将（类型，可选 DN）解析为标签页对象，并提供列表和类型元数据查询。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::TabRef;
use crate::directory::{
    DirectoryConnection, DirectoryError, Entry, Filter, SearchScope, is_within,
};
use crate::error::{AppError, Result};
use crate::models::attribute::AttributeKind;
use crate::models::tab::TabObject;
use crate::services::config_cache::ConfigCache;

/// `ls` 返回单个属性的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsMode {
    /// 只取第一个值
    Single,
    /// 全部值，以列表返回
    Multi,
    /// 原样返回存储的值
    Raw,
}

impl LsMode {
    /// `1`/`single`、`*`/`multi`、`raw`，其余按 single 处理
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if s == "*" || s.eq_ignore_ascii_case("multi") => LsMode::Multi,
            Value::String(s) if s.eq_ignore_ascii_case("raw") => LsMode::Raw,
            _ => LsMode::Single,
        }
    }
}

/// `ls` 调用的属性选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsAttrs {
    /// 类型的主属性，每个 DN 一个标量
    Main,
    /// 单个属性，每个 DN 一个标量
    One(String),
    /// 多个属性，每个 DN 一个对象
    Many(IndexMap<String, LsMode>),
}

/// `infos` 返回的类型元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInfos {
    pub name: String,
    pub description: String,
    pub main_attr: String,
    pub ou: String,
    pub filter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub tabs: Vec<TabRef>,
}

/// 绑定到单个会话配置的对象访问器
pub struct ObjectAccessor<'a> {
    config: &'a ConfigCache,
}

impl<'a> ObjectAccessor<'a> {
    pub fn new(config: &'a ConfigCache) -> Self {
        Self { config }
    }

    /// 未提供 `dn` 时返回新对象，否则加载已存储的对象
    pub async fn resolve(
        &self,
        conn: &mut dyn DirectoryConnection,
        type_name: &str,
        dn: Option<&str>,
    ) -> Result<TabObject> {
        let resolved = self.config.resolve_type(type_name)?;
        let dn = match dn {
            None => {
                let mut object = resolved.instantiate()?;
                let base_tab = object.tab_mut(None)?;
                let base_attr = base_tab
                    .attributes()
                    .find(|attr| attr.kind() == AttributeKind::Base)
                    .map(|attr| attr.name().to_string());
                if let Some(name) = base_attr {
                    base_tab.set_value(&name, Value::String(self.config.base().to_string()))?;
                }
                return Ok(object);
            }
            Some(dn) => dn,
        };

        let entry = conn
            .read(dn)
            .await?
            .filter(|entry| resolved.filter.matches(entry))
            .ok_or_else(|| AppError::NotFound(format!("{} {}", resolved.info.name, dn)))?;
        debug!("已加载 {} 对象 {}", resolved.info.name, entry.dn);
        TabObject::open(resolved.info.clone(), resolved.new_tabs(), entry)
    }

    /// 列出 `branch`（默认为位置根分支）之下某类型的对象
    pub async fn ls(
        &self,
        conn: &mut dyn DirectoryConnection,
        type_name: &str,
        attrs: &LsAttrs,
        branch: Option<&str>,
        filter: Option<&str>,
    ) -> Result<IndexMap<String, Value>> {
        let resolved = self.config.resolve_type(type_name)?;
        let mut filters = vec![resolved.filter.clone()];
        if let Some(extra) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            let parsed = Filter::parse(extra)
                .map_err(|e| AppError::InvalidParams(format!("filter {}: {}", extra, e)))?;
            filters.push(parsed);
        }
        let filter = Filter::and(filters);

        let branch = branch
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.config.base());
        if !is_within(branch, self.config.base()) {
            return Err(AppError::InvalidParams(format!(
                "branch {} is outside of {}",
                branch,
                self.config.base()
            )));
        }

        let wanted: Vec<String> = match attrs {
            LsAttrs::Main => vec![resolved.info.main_attr.clone()],
            LsAttrs::One(attr) => vec![attr.clone()],
            LsAttrs::Many(attrs) => attrs.keys().cloned().collect(),
        };
        let entries = match conn
            .search(branch, SearchScope::Subtree, &filter, &wanted)
            .await
        {
            Err(DirectoryError::NoSuchObject(_)) => {
                return Err(AppError::NotFound(format!("branch {}", branch)));
            }
            other => other?,
        };

        let mut result = IndexMap::new();
        for entry in entries {
            let value = match attrs {
                LsAttrs::Main => single_value(&entry, &resolved.info.main_attr),
                LsAttrs::One(attr) => single_value(&entry, attr),
                LsAttrs::Many(modes) => {
                    let object: serde_json::Map<String, Value> = modes
                        .iter()
                        .filter_map(|(attr, mode)| {
                            mode_value(&entry, attr, *mode).map(|v| (attr.clone(), v))
                        })
                        .collect();
                    Some(Value::Object(object))
                }
            };
            if let Some(value) = value {
                result.insert(entry.dn.clone(), value);
            }
        }
        Ok(result)
    }

    /// 类型元数据，附带标签页列表，不含实现类
    pub fn infos(&self, type_name: &str) -> Result<TypeInfos> {
        let resolved = self.config.resolve_type(type_name)?;
        let info = &resolved.info;
        Ok(TypeInfos {
            name: info.name.clone(),
            description: info.description.clone(),
            main_attr: info.main_attr.clone(),
            ou: info.ou.clone(),
            filter: info.filter.clone(),
            icon: info.icon.clone(),
            tabs: resolved.tabs.iter().map(|(tab_ref, _)| tab_ref.clone()).collect(),
        })
    }
}

fn single_value(entry: &Entry, attr: &str) -> Option<Value> {
    if attr.eq_ignore_ascii_case("dn") {
        return Some(Value::String(entry.dn.clone()));
    }
    entry.first(attr).map(|v| Value::String(v.to_string()))
}

fn mode_value(entry: &Entry, attr: &str, mode: LsMode) -> Option<Value> {
    match mode {
        LsMode::Single => single_value(entry, attr),
        LsMode::Multi | LsMode::Raw if attr.eq_ignore_ascii_case("dn") => match mode {
            LsMode::Raw => Some(Value::String(entry.dn.clone())),
            _ => Some(Value::Array(vec![Value::String(entry.dn.clone())])),
        },
        LsMode::Multi | LsMode::Raw => entry
            .get(attr)
            .map(|values| Value::Array(values.iter().cloned().map(Value::String).collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::directory::{DirectoryConnector, InMemoryDirectory};
    use crate::schema::builtin;
    use serde_json::json;

    async fn setup() -> (ConfigCache, Box<dyn DirectoryConnection>) {
        let directory = InMemoryDirectory::example();
        let config = DirectoryConfig::development();
        let location = config.locations[0].clone();
        let mut conn = directory
            .bind(&location, &location.admin_dn, &location.admin_password)
            .await
            .unwrap();
        let cache = ConfigCache::build(config, &builtin::registry(), conn.as_mut())
            .await
            .unwrap();
        (cache, conn)
    }

    #[tokio::test]
    async fn test_ls_scalar_forms() {
        let (cache, mut conn) = setup().await;
        let accessor = ObjectAccessor::new(&cache);

        let listed = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::One("uid".into()), None, None)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&listed).unwrap(),
            json!({
                "uid=alice,ou=people,dc=example,dc=com": "alice",
                "uid=bob,ou=people,ou=sales,dc=example,dc=com": "bob"
            })
        );

        let main = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::Main, None, None)
            .await
            .unwrap();
        assert_eq!(main, listed);

        let no_given_name = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::One("givenName".into()), None, None)
            .await
            .unwrap();
        assert_eq!(no_given_name.len(), 1);
    }

    #[tokio::test]
    async fn test_ls_object_form() {
        let (cache, mut conn) = setup().await;
        let accessor = ObjectAccessor::new(&cache);

        let mut modes = IndexMap::new();
        modes.insert("uid".to_string(), LsMode::Multi);
        modes.insert("givenName".to_string(), LsMode::Single);
        modes.insert("dn".to_string(), LsMode::Raw);
        let listed = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::Many(modes), None, None)
            .await
            .unwrap();

        assert_eq!(
            listed["uid=alice,ou=people,dc=example,dc=com"],
            json!({
                "uid": ["alice"],
                "givenName": "Alice",
                "dn": "uid=alice,ou=people,dc=example,dc=com"
            })
        );
        assert_eq!(
            listed["uid=bob,ou=people,ou=sales,dc=example,dc=com"],
            json!({"uid": ["bob"], "dn": "uid=bob,ou=people,ou=sales,dc=example,dc=com"})
        );
    }

    #[tokio::test]
    async fn test_ls_branch_and_filter() {
        let (cache, mut conn) = setup().await;
        let accessor = ObjectAccessor::new(&cache);

        let sales = accessor
            .ls(
                conn.as_mut(),
                "person",
                &LsAttrs::Main,
                Some("ou=sales,dc=example,dc=com"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(sales.len(), 1);

        let filtered = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::Main, None, Some("(sn=Lid*)"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("uid=alice,ou=people,dc=example,dc=com"));

        let err = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::Main, None, Some("(sn=Lid"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidParams(_)));

        let deep = format!("{}(uid=alice){}", "(!".repeat(10_000), ")".repeat(10_000));
        let err = accessor
            .ls(conn.as_mut(), "person", &LsAttrs::Main, None, Some(&deep))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidParams(_)));

        let err = accessor
            .ls(
                conn.as_mut(),
                "person",
                &LsAttrs::Main,
                Some("ou=nowhere,dc=example,dc=com"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[rstest::rstest]
    #[case(json!("*"), LsMode::Multi)]
    #[case(json!("multi"), LsMode::Multi)]
    #[case(json!("raw"), LsMode::Raw)]
    #[case(json!(1), LsMode::Single)]
    #[case(json!("single"), LsMode::Single)]
    #[case(json!("whatever"), LsMode::Single)]
    fn test_ls_mode_parse(#[case] value: Value, #[case] expected: LsMode) {
        assert_eq!(LsMode::parse(&value), expected);
    }

    #[tokio::test]
    async fn test_resolve_modes() {
        let (cache, mut conn) = setup().await;
        let accessor = ObjectAccessor::new(&cache);

        let created = accessor.resolve(conn.as_mut(), "person", None).await.unwrap();
        assert!(created.is_new());
        assert_eq!(
            created.base_tab().attribute("base").unwrap().value(),
            &json!("dc=example,dc=com")
        );

        let opened = accessor
            .resolve(
                conn.as_mut(),
                "person",
                Some("uid=alice,ou=people,dc=example,dc=com"),
            )
            .await
            .unwrap();
        assert_eq!(opened.dn(), Some("uid=alice,ou=people,dc=example,dc=com"));

        let err = accessor
            .resolve(conn.as_mut(), "group", Some("uid=alice,ou=people,dc=example,dc=com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = accessor
            .resolve(conn.as_mut(), "person", Some("uid=zed,ou=people,dc=example,dc=com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_infos_shape() {
        let (cache, _conn) = setup().await;
        let infos = ObjectAccessor::new(&cache).infos("person").unwrap();
        let value = serde_json::to_value(&infos).unwrap();
        assert_eq!(value["mainAttr"], json!("uid"));
        assert!(value.get("implementationClass").is_none());
        assert!(value.get("tabGroup").is_none());
        assert_eq!(value["tabs"][0], json!({"class": "person", "name": "User"}));
        assert_eq!(value["tabs"].as_array().unwrap().len(), 3);
    }
}
