//! 状态层：任务/容器索引、快照与持久化

pub mod saver;
pub mod snapshot;
pub mod store;

pub use saver::{JsonFileSaver, StateSaver};
pub use snapshot::SavedState;
pub use store::{ContainerIdx, StateStore, TaskAdmission};
