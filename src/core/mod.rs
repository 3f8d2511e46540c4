//! 核心：错误类型与优雅关闭

pub mod error;
pub mod shutdown;

pub use error::{
    ChannelError, DecodeError, EngineError, IngestError, StateError, TaskValidationError,
};
pub use shutdown::{
    run_with_graceful_shutdown, IngestStopCleanup, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager, ShutdownReason, StateSaveCleanup,
};
