//! RPC 分发器
//!
//! 方法名 → 动词（静态表）→ 类型化调用 → 处理函数。
//! 调用中的对象类型在任何目录访问之前解析。

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::directory::{DirectoryConnection, DirectoryConnector};
use crate::error::{AppError, Result};
use crate::rpc::handlers;
use crate::services::config_cache::ConfigCache;
use crate::services::objects::{LsAttrs, LsMode};

/// 通过 JSON-RPC 暴露的方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Ls,
    Cat,
    Infos,
    Fields,
    Update,
    GetId,
    GetBase,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Ls,
        Verb::Cat,
        Verb::Infos,
        Verb::Fields,
        Verb::Update,
        Verb::GetId,
        Verb::GetBase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ls => "ls",
            Verb::Cat => "cat",
            Verb::Infos => "infos",
            Verb::Fields => "fields",
            Verb::Update => "update",
            Verb::GetId => "get_id",
            Verb::GetBase => "get_base",
        }
    }

    /// 会话标识之后允许的最多位置参数个数
    fn max_params(&self) -> usize {
        match self {
            Verb::Ls => 4,
            Verb::Cat => 2,
            Verb::Infos => 1,
            Verb::Fields => 3,
            Verb::Update => 4,
            Verb::GetId | Verb::GetBase => 0,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| AppError::MethodNotFound(s.to_string()))
    }
}

/// 参数已检查并类型化的调用
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ls {
        object_type: String,
        attrs: LsAttrs,
        branch: Option<String>,
        filter: Option<String>,
    },
    Cat {
        dn: String,
        object_type: String,
    },
    Infos {
        object_type: String,
    },
    Fields {
        object_type: String,
        dn: Option<String>,
        tab: Option<String>,
    },
    Update {
        object_type: String,
        dn: Option<String>,
        tab: Option<String>,
        values: Map<String, Value>,
    },
    GetId,
    GetBase,
}

impl Call {
    pub fn parse(verb: Verb, params: Vec<Value>) -> Result<Self> {
        if params.len() > verb.max_params() {
            return Err(AppError::InvalidParams(format!(
                "{} takes at most {} parameters, got {}",
                verb,
                verb.max_params(),
                params.len()
            )));
        }
        let args = Params { verb, params };

        Ok(match verb {
            Verb::Ls => Call::Ls {
                object_type: args.string(0, "type")?,
                attrs: args.ls_attrs(1)?,
                branch: args.optional_string(2, "branch")?,
                filter: args.optional_string(3, "filter")?,
            },
            Verb::Cat => Call::Cat {
                dn: args.string(0, "dn")?,
                object_type: args.string(1, "type")?,
            },
            Verb::Infos => Call::Infos {
                object_type: args.string(0, "type")?,
            },
            Verb::Fields => Call::Fields {
                object_type: args.string(0, "type")?,
                dn: args.optional_string(1, "dn")?,
                tab: args.optional_string(2, "tab")?,
            },
            Verb::Update => Call::Update {
                object_type: args.string(0, "type")?,
                dn: args.optional_string(1, "dn")?,
                tab: args.optional_string(2, "tab")?,
                values: args.object(3, "values")?,
            },
            Verb::GetId => Call::GetId,
            Verb::GetBase => Call::GetBase,
        })
    }

    /// 调用指定的对象类型（如有）
    pub fn object_type(&self) -> Option<&str> {
        match self {
            Call::Ls { object_type, .. }
            | Call::Cat { object_type, .. }
            | Call::Infos { object_type }
            | Call::Fields { object_type, .. }
            | Call::Update { object_type, .. } => Some(object_type),
            Call::GetId | Call::GetBase => None,
        }
    }
}

struct Params {
    verb: Verb,
    params: Vec<Value>,
}

impl Params {
    fn get(&self, index: usize) -> Option<&Value> {
        self.params.get(index).filter(|v| !v.is_null())
    }

    fn invalid(&self, name: &str, expected: &str) -> AppError {
        AppError::InvalidParams(format!("{}: {} must be {}", self.verb, name, expected))
    }

    fn string(&self, index: usize, name: &str) -> Result<String> {
        self.optional_string(index, name)?
            .ok_or_else(|| self.invalid(name, "a string"))
    }

    fn optional_string(&self, index: usize, name: &str) -> Result<Option<String>> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(name, "a string")),
        }
    }

    fn object(&self, index: usize, name: &str) -> Result<Map<String, Value>> {
        match self.get(index) {
            Some(Value::Object(map)) => Ok(map.clone()),
            _ => Err(self.invalid(name, "an object")),
        }
    }

    fn ls_attrs(&self, index: usize) -> Result<LsAttrs> {
        match self.get(index) {
            None => Ok(LsAttrs::Main),
            Some(Value::String(attr)) if !attr.is_empty() => Ok(LsAttrs::One(attr.clone())),
            Some(Value::Object(map)) if !map.is_empty() => Ok(LsAttrs::Many(
                map.iter()
                    .map(|(attr, mode)| (attr.clone(), LsMode::parse(mode)))
                    .collect::<IndexMap<_, _>>(),
            )),
            Some(_) => Err(self.invalid("attrs", "an attribute name or an object")),
        }
    }
}

/// 处理函数可见的当前调用上下文
pub struct CallContext<'a> {
    pub session_id: &'a str,
    pub config: &'a ConfigCache,
    pub conn: &'a mut dyn DirectoryConnection,
}

/// RPC 分发器
#[derive(Clone)]
pub struct Dispatcher {
    connector: Arc<dyn DirectoryConnector>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { connector }
    }

    /// 为已认证的会话执行一次调用
    pub async fn dispatch(
        &self,
        session_id: &str,
        config: &ConfigCache,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        let verb: Verb = method.parse()?;
        let call = Call::parse(verb, params)?;
        if let Some(object_type) = call.object_type() {
            config.resolve_type(object_type)?;
        }

        let location = config.current_location();
        let mut conn = self
            .connector
            .bind(location, &location.admin_dn, &location.admin_password)
            .await
            .map_err(|e| {
                error!("无法连接目录 {}: {}", location.uri, e);
                AppError::from(e)
            })?;
        debug!("会话 {} 调用 {}", session_id, verb);

        let mut ctx = CallContext {
            session_id,
            config,
            conn: conn.as_mut(),
        };
        match call {
            Call::Ls {
                object_type,
                attrs,
                branch,
                filter,
            } => {
                handlers::ls(
                    &mut ctx,
                    &object_type,
                    &attrs,
                    branch.as_deref(),
                    filter.as_deref(),
                )
                .await
            }
            Call::Cat { dn, object_type } => handlers::cat(&mut ctx, &dn, &object_type).await,
            Call::Infos { object_type } => handlers::infos(&ctx, &object_type),
            Call::Fields {
                object_type,
                dn,
                tab,
            } => handlers::fields(&mut ctx, &object_type, dn.as_deref(), tab.as_deref()).await,
            Call::Update {
                object_type,
                dn,
                tab,
                values,
            } => {
                handlers::update(&mut ctx, &object_type, dn.as_deref(), tab.as_deref(), values)
                    .await
            }
            Call::GetId => Ok(handlers::get_id(&ctx)),
            Call::GetBase => Ok(handlers::get_base(&ctx)),
        }
    }
}
