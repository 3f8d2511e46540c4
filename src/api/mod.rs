//! 领域模型：生命周期状态、任务与容器、状态变更事件

pub mod state_change;
pub mod status;
pub mod task;

pub use state_change::{ContainerStateChange, StateChangeEvent, TaskStateChange};
pub use status::Status;
pub use task::{Container, DockerContainer, Task};
