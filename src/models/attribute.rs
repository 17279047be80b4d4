//! 属性模型
//!
//! 属性定义（类型、标签、说明、必填、可见性谓词、校验规则）与属性实例（定义 + 当前值）。
//! 值在网关中以 JSON 表示，在目录中以字符串列表表示，由 `AttributeKind` 负责转换。

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static MAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid mail regex"));

/// 属性类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// 单行字符串
    String,
    /// 多行文本
    Text,
    /// 整数
    Integer,
    /// 布尔值，目录中存储为 TRUE/FALSE
    Boolean,
    /// 邮件地址
    Mail,
    /// 密码，从不回读
    Password,
    /// 多值字符串
    StringList,
    /// 对象所在分支（部门），由 DN 推导，不写入条目
    Base,
}

impl AttributeKind {
    /// 将目录值转换为网关表示
    pub fn decode(&self, values: &[String]) -> Value {
        match self {
            AttributeKind::Password => Value::String(String::new()),
            AttributeKind::Integer => values
                .first()
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or(Value::Null),
            AttributeKind::Boolean => {
                Value::Bool(values.first().is_some_and(|v| v.eq_ignore_ascii_case("TRUE")))
            }
            AttributeKind::StringList => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
            _ => Value::String(values.first().cloned().unwrap_or_default()),
        }
    }

    /// 将合法的网关值转换为目录值。`None` 表示保留已存储的属性
    pub fn encode(&self, value: &Value) -> Option<Vec<String>> {
        match (self, value) {
            (AttributeKind::Password, Value::String(s)) if s.is_empty() => None,
            (AttributeKind::Password, Value::Null) => None,
            (AttributeKind::Boolean, Value::Bool(b)) => {
                Some(vec![if *b { "TRUE" } else { "FALSE" }.to_string()])
            }
            (_, Value::Null) => Some(vec![]),
            (_, Value::String(s)) if s.is_empty() => Some(vec![]),
            (_, Value::String(s)) => Some(vec![s.clone()]),
            (_, Value::Number(n)) => Some(vec![n.to_string()]),
            (_, Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) if !s.is_empty() => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
            ),
            (_, other) => Some(vec![other.to_string()]),
        }
    }

    /// 新对象使用的值
    pub fn empty(&self) -> Value {
        match self {
            AttributeKind::Integer => Value::Null,
            AttributeKind::Boolean => Value::Bool(false),
            AttributeKind::StringList => Value::Array(vec![]),
            _ => Value::String(String::new()),
        }
    }

    pub fn is_empty(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Bool(b) => !b && *self != AttributeKind::Boolean,
            _ => false,
        }
    }

    /// 非空值的类型检查，返回错误消息
    pub fn validate(&self, value: &Value) -> Option<String> {
        match self {
            AttributeKind::Integer => match value {
                Value::Number(n) if n.is_i64() => None,
                Value::String(s) if s.trim().parse::<i64>().is_ok() => None,
                _ => Some("must be an integer".to_string()),
            },
            AttributeKind::Boolean => match value {
                Value::Bool(_) => None,
                _ => Some("must be a boolean".to_string()),
            },
            AttributeKind::StringList => match value {
                Value::Array(items) if items.iter().all(Value::is_string) => None,
                _ => Some("must be a list of strings".to_string()),
            },
            AttributeKind::Mail => match value {
                Value::String(s) if MAIL_RE.is_match(s.trim()) => None,
                Value::String(_) => Some("is not a valid mail address".to_string()),
                _ => Some("must be a string".to_string()),
            },
            _ => match value {
                Value::String(_) => None,
                _ => Some("must be a string".to_string()),
            },
        }
    }
}

/// 可见性谓词，根据同一标签页中其他属性的当前值求值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "when")]
pub enum Visibility {
    #[default]
    Always,
    Never,
    /// 另一个属性非空时可见
    Set { attribute: String },
    /// 另一个属性等于给定值时可见
    Equals { attribute: String, value: Value },
}

impl Visibility {
    pub fn evaluate(&self, values: &IndexMap<String, Attribute>) -> bool {
        match self {
            Visibility::Always => true,
            Visibility::Never => false,
            Visibility::Set { attribute } => values
                .get(attribute)
                .is_some_and(|other| !other.is_empty()),
            Visibility::Equals { attribute, value } => values
                .get(attribute)
                .is_some_and(|other| other.value() == value),
        }
    }
}

/// 校验规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ValidationRule {
    /// 字符串值必须匹配正则表达式
    Pattern { regex: String, message: String },
    /// 字符串长度范围
    Length { min: usize, max: usize },
    /// 整数范围
    Range { min: i64, max: i64 },
}

impl ValidationRule {
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            ValidationRule::Pattern { regex, message } => {
                let text = value.as_str()?;
                match Regex::new(regex) {
                    Ok(re) if re.is_match(text) => None,
                    Ok(_) => Some(message.clone()),
                    Err(_) => Some(format!("has an invalid validation pattern '{}'", regex)),
                }
            }
            ValidationRule::Length { min, max } => {
                let length = value.as_str()?.chars().count();
                (length < *min || length > *max)
                    .then(|| format!("must be between {} and {} characters", min, max))
            }
            ValidationRule::Range { min, max } => {
                let number = match value {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }?;
                (number < *min || number > *max)
                    .then(|| format!("must be between {} and {}", min, max))
            }
        }
    }
}

/// 属性定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeKind,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// 值在同类型对象中必须唯一
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

impl AttributeDef {
    pub fn new(name: &str, kind: AttributeKind, label: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            label: label.to_string(),
            description: String::new(),
            required: false,
            unique: false,
            default: None,
            visibility: Visibility::Always,
            rules: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// 属性描述，`fields` 返回给调用方的形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    pub label: String,
    pub description: String,
    pub value: Value,
    pub required: bool,
}

/// 属性实例
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    def: AttributeDef,
    value: Value,
}

impl Attribute {
    pub fn new(def: AttributeDef) -> Self {
        let value = def.default.clone().unwrap_or_else(|| def.kind.empty());
        Self { def, value }
    }

    pub fn def(&self) -> &AttributeDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.def.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub fn is_empty(&self) -> bool {
        self.def.kind.is_empty(&self.value)
    }

    /// 是否持有该类型空值以外的值
    pub fn is_set(&self) -> bool {
        !self.is_empty() && self.value != self.def.kind.empty()
    }

    pub fn descriptor(&self) -> AttributeDescriptor {
        AttributeDescriptor {
            kind: self.def.kind,
            label: self.def.label.clone(),
            description: self.def.description.clone(),
            value: self.value.clone(),
            required: self.def.required,
        }
    }

    /// 本地检查：必填、类型与规则。唯一性需要访问目录，由标签页对象检查
    pub fn check(&self) -> Option<String> {
        if self.is_empty() {
            return self
                .def
                .required
                .then(|| format!("{} is required", self.def.label));
        }
        if let Some(message) = self.def.kind.validate(&self.value) {
            return Some(format!("{} {}", self.def.label, message));
        }
        self.def
            .rules
            .iter()
            .find_map(|rule| rule.check(&self.value))
            .map(|message| format!("{} {}", self.def.label, message))
    }
}
