//! 上行状态变更：按任务串行、全局限流、发送前去重

pub mod handler;
pub mod queue;
pub mod sendable;

pub use handler::{EventDispatcher, DEFAULT_CONCURRENT_EVENT_CALLS};
pub use queue::{DrainState, EventQueue};
pub use sendable::{EntityKey, SendableEvent};
