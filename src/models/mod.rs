//! 核心数据模型模块
//!
//! 定义网关的核心数据结构：属性、标签页对象、部门索引、会话以及 JSON-RPC 信封。

pub mod attribute;
pub mod department;
pub mod rpc;
pub mod session;
pub mod tab;

pub use attribute::{Attribute, AttributeDef, AttributeDescriptor, AttributeKind};
pub use department::{Department, DepartmentIndex};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use session::Session;
pub use tab::{CheckContext, FieldError, SectionFields, Tab, TabObject};
