//! 配对与聊天系统核心领域模型
//!
//! 包含配对（Match）、消息、标识值对象以及错误类型。

pub mod errors;
pub mod message;
pub mod pairing;
pub mod value_objects;

pub use errors::*;
pub use message::*;
pub use pairing::*;
pub use value_objects::*;
