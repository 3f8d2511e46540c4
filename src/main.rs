//! Berth - 主机代理
//!
//! 入口：加载配置与状态，启动载荷处理与事件分发，从 stdin 读取控制面消息，向 stdout 写出 ack 与状态变更。

use std::sync::Arc;

use anyhow::Context;
use berth::{
    channel::{serve_lines, ControlChannel, StdioChannel},
    config::{load_config, AppConfig},
    core::{
        run_with_graceful_shutdown, IngestStopCleanup, ShutdownCoordinator, ShutdownManager,
        StateSaveCleanup,
    },
    dispatch::EventDispatcher,
    engine::InMemoryTaskEngine,
    ingest::{AgentIdentity, PayloadHandler},
    observability,
    state::{JsonFileSaver, StateSaver, StateStore},
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    tracing::info!(
        "Starting agent for cluster {} as {}",
        config.agent.cluster,
        config.agent.container_instance_arn
    );

    let state = Arc::new(StateStore::new());
    let saver = Arc::new(JsonFileSaver::new(&config.state.path, state.clone()));
    match saver.load().await {
        Ok(true) => {}
        Ok(false) => tracing::info!("No saved state at {}", saver.path().display()),
        // 不可用的快照不阻止启动，从空状态开始
        Err(e) => tracing::error!(
            "Could not restore state from {}, starting empty: {}",
            saver.path().display(),
            e
        ),
    }

    let shutdown = Arc::new(ShutdownManager::new());
    let token = shutdown.token();

    let channel: Arc<dyn ControlChannel> = Arc::new(StdioChannel::stdout());
    let dispatcher = EventDispatcher::new(
        channel.clone(),
        config.dispatch.concurrent_event_calls,
        token.clone(),
    );
    let engine = Arc::new(InMemoryTaskEngine::new(state.clone()));
    let saver: Arc<dyn StateSaver> = saver;

    let handler = Arc::new(PayloadHandler::new(
        engine,
        saver.clone(),
        channel,
        dispatcher,
        AgentIdentity {
            cluster: config.agent.cluster.clone(),
            container_instance_arn: config.agent.container_instance_arn.clone(),
        },
        config.ingest.message_buffer_size,
        &token,
    ));
    handler.start().context("Failed to start payload handler")?;

    let mut coordinator = ShutdownCoordinator::new(shutdown.clone())
        .with_timeout(config.shutdown.cleanup_timeout_secs);
    coordinator.register(IngestStopCleanup::new(handler.clone()));
    coordinator.register(StateSaveCleanup::new(saver));

    let reader = BufReader::new(tokio::io::stdin());
    run_with_graceful_shutdown(
        shutdown,
        async move {
            serve_lines(reader, handler, token)
                .await
                .context("Control channel failed")
        },
        || async move { coordinator.run_cleanup().await },
    )
    .await;

    Ok(())
}
