//! 优雅关闭
//!
//! 统一监听关闭信号并执行清理：
//! - 停止载荷处理循环，不再接收新载荷
//! - 取消事件分发（未发送的事件留在队列中）
//! - 最后保存一次状态

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ingest::PayloadHandler;
use crate::state::StateSaver;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    /// 根 token；载荷处理与事件分发都从它派生
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Signal,
    /// 控制通道关闭（服务端 Close 或输入结束）
    ChannelClosed,
    /// 不可恢复的错误
    FatalError(String),
}

impl ShutdownManager {
    /// 创建新的关闭管理器
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取关闭 token（载荷处理与事件分发从它派生子 token）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭
    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    /// 是否已触发关闭
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// 订阅关闭原因
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    /// 执行清理
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：按注册顺序执行清理任务，每个任务单独超时
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    /// 创建协调器，默认每个清理任务超时 5 秒
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout_secs: 5,
        }
    }

    /// 设置清理超时时间（秒）
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// 注册清理任务
    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    /// 执行所有清理任务；失败或超时只记录日志，继续下一个
    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed successfully", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs);
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }

    /// 获取关闭管理器
    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }
}

/// 停止载荷处理循环
pub struct IngestStopCleanup {
    handler: Arc<PayloadHandler>,
}

impl IngestStopCleanup {
    pub fn new(handler: Arc<PayloadHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for IngestStopCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.handler.stop();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PayloadHandler"
    }
}

/// 退出前保存状态
pub struct StateSaveCleanup {
    saver: Arc<dyn StateSaver>,
}

impl StateSaveCleanup {
    pub fn new(saver: Arc<dyn StateSaver>) -> Self {
        Self { saver }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for StateSaveCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.saver.save().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "StateSave"
    }
}

/// 运行主应用直到其结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F, Fut>(
    shutdown_manager: Arc<ShutdownManager>,
    app: F,
    cleanup: impl FnOnce() -> Fut,
) where
    F: Future<Output = anyhow::Result<()>>,
    Fut: Future<Output = ()>,
{
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        result = app => {
            match result {
                Ok(()) => tracing::info!("Application finished normally"),
                Err(e) => tracing::error!("Application stopped with error: {:#}", e),
            }
            shutdown_manager.shutdown(ShutdownReason::ChannelClosed);
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
        }
    }

    cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::core::StateError;

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        let child = token.child_token();
        assert!(!manager.is_shutdown());
        manager.shutdown(ShutdownReason::Interrupt);
        assert!(manager.is_shutdown());
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_reason_broadcast() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        manager.shutdown(ShutdownReason::FatalError("boom".to_string()));
        assert_eq!(
            rx.recv().await.unwrap(),
            ShutdownReason::FatalError("boom".to_string())
        );
    }

    struct MockCleanup {
        called: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for MockCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.called.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "MockCleanup"
        }
    }

    struct FlakySaver {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StateSaver for FlakySaver {
        async fn save(&self) -> Result<(), StateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StateError::IncompleteSave("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_cleanup_does_not_stop_others() {
        let manager = Arc::new(ShutdownManager::new());
        let mut coordinator = ShutdownCoordinator::new(manager).with_timeout(1);

        let saver = Arc::new(FlakySaver {
            calls: AtomicUsize::new(0),
        });
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(StateSaveCleanup::new(saver.clone()));
        coordinator.register(MockCleanup {
            called: called.clone(),
        });

        coordinator.run_cleanup().await;
        assert_eq!(saver.calls.load(Ordering::SeqCst), 1);
        assert!(called.load(Ordering::SeqCst));
    }

    struct HangingCleanup;

    #[async_trait::async_trait]
    impl ShutdownCleanup for HangingCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Hanging"
        }
    }

    #[tokio::test]
    async fn test_timed_out_cleanup_does_not_block_the_next() {
        let manager = Arc::new(ShutdownManager::new());
        let mut coordinator = ShutdownCoordinator::new(manager.clone()).with_timeout(1);
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(HangingCleanup);
        coordinator.register(MockCleanup {
            called: called.clone(),
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), coordinator.run_cleanup())
            .await
            .expect("cleanup hung past its timeout");
        assert!(called.load(Ordering::SeqCst));
        assert!(Arc::ptr_eq(coordinator.manager(), &manager));
    }

    #[tokio::test]
    async fn test_app_exit_triggers_shutdown_and_cleanup() {
        let manager = Arc::new(ShutdownManager::new());
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();

        run_with_graceful_shutdown(
            manager.clone(),
            async { Ok::<(), anyhow::Error>(()) },
            || async move {
                flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

        assert!(manager.is_shutdown());
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
