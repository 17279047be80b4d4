//! JSON-RPC 方法分发与处理函数

pub mod dispatcher;
pub mod handlers;

pub use dispatcher::{Call, CallContext, Dispatcher, Verb};
