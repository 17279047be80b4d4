//! 动词处理函数

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::tab::{CheckContext, SectionFields};
use crate::rpc::dispatcher::CallContext;
use crate::services::objects::{LsAttrs, ObjectAccessor};

/// 某类型的对象，dn -> 值的映射
pub async fn ls(
    ctx: &mut CallContext<'_>,
    object_type: &str,
    attrs: &LsAttrs,
    branch: Option<&str>,
    filter: Option<&str>,
) -> Result<Value> {
    let listed = ObjectAccessor::new(ctx.config)
        .ls(&mut *ctx.conn, object_type, attrs, branch, filter)
        .await?;
    debug!("ls {}: {} objects", object_type, listed.len());
    Ok(serde_json::to_value(listed)?)
}

/// 对象基础标签页的值
pub async fn cat(ctx: &mut CallContext<'_>, dn: &str, object_type: &str) -> Result<Value> {
    let object = ObjectAccessor::new(ctx.config)
        .resolve(&mut *ctx.conn, object_type, Some(dn))
        .await?;
    Ok(serde_json::to_value(object.base_tab().values())?)
}

pub fn infos(ctx: &CallContext<'_>, object_type: &str) -> Result<Value> {
    let infos = ObjectAccessor::new(ctx.config).infos(object_type)?;
    Ok(serde_json::to_value(infos)?)
}

/// 标签页中可见属性的描述，按分区标识索引
pub async fn fields(
    ctx: &mut CallContext<'_>,
    object_type: &str,
    dn: Option<&str>,
    tab: Option<&str>,
) -> Result<Value> {
    let object = ObjectAccessor::new(ctx.config)
        .resolve(&mut *ctx.conn, object_type, dn)
        .await?;
    let sections: IndexMap<String, SectionFields> = object
        .tab(tab)?
        .fields()
        .into_iter()
        .map(|section| (section.id.clone(), section))
        .collect();
    Ok(serde_json::to_value(sections)?)
}

/// 设置标签页的值，校验整个对象后写回目录
pub async fn update(
    ctx: &mut CallContext<'_>,
    object_type: &str,
    dn: Option<&str>,
    tab: Option<&str>,
    values: Map<String, Value>,
) -> Result<Value> {
    let config = ctx.config;
    let mut object = ObjectAccessor::new(config)
        .resolve(&mut *ctx.conn, object_type, dn)
        .await?;

    let selected = object.tab_mut(tab)?;
    for (name, value) in values {
        selected.set_value(&name, value)?;
    }

    let resolved = config.resolve_type(object_type)?;
    let check = CheckContext {
        base: config.base(),
        departments: config.departments(),
        type_filter: &resolved.filter,
    };
    let errors = object.check(&check, &mut *ctx.conn).await?;
    if !errors.is_empty() {
        debug!("update {} rejected: {} errors", object_type, errors.len());
        return Ok(json!({ "errors": errors }));
    }

    let dn = object.save(&mut *ctx.conn, config.base()).await?;
    info!("会话 {} 已保存 {}", ctx.session_id, dn);
    Ok(Value::String(dn))
}

pub fn get_id(ctx: &CallContext<'_>) -> Value {
    Value::String(ctx.session_id.to_string())
}

pub fn get_base(ctx: &CallContext<'_>) -> Value {
    Value::String(ctx.config.base().to_string())
}
