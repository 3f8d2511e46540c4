//! 任务定义载荷的处理与确认
//!
//! 两个独立循环：
//! 1. 按入队顺序逐个处理载荷：校验任务 -> 提交引擎（先非 Stopped，后 Stopped）-> 保存状态 -> 安排 ack
//! 2. 发送 ack，与处理解耦，传输慢不会拖住处理
//!
//! 只有全部任务处理成功且状态保存成功才确认；不确认即依赖服务端重投（至少一次）。

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::{Status, Task, TaskStateChange};
use crate::channel::ControlChannel;
use crate::core::{IngestError, TaskValidationError};
use crate::dispatch::EventDispatcher;
use crate::engine::TaskEngine;
use crate::protocol::{AckRequest, AcsTask, OutboundMessage, PayloadMessage};
use crate::state::StateSaver;

/// 载荷队列与 ack 队列的默认容量
pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 10;

/// ack 中携带的本机身份
#[derive(Debug, Clone, Default)]
pub struct AgentIdentity {
    pub cluster: String,
    pub container_instance_arn: String,
}

pub struct PayloadHandler {
    message_tx: mpsc::Sender<PayloadMessage>,
    message_rx: Mutex<Option<mpsc::Receiver<PayloadMessage>>>,
    ack_tx: mpsc::Sender<String>,
    ack_rx: Mutex<Option<mpsc::Receiver<String>>>,
    engine: Arc<dyn TaskEngine>,
    saver: Arc<dyn StateSaver>,
    channel: Arc<dyn ControlChannel>,
    dispatcher: EventDispatcher,
    identity: AgentIdentity,
    /// 最近一次成功处理的载荷序列号
    sequence_number: watch::Sender<Option<i64>>,
    /// 父 token 的子 token：外部关闭或 stop() 都会让两个循环退出
    token: CancellationToken,
}

impl PayloadHandler {
    pub fn new(
        engine: Arc<dyn TaskEngine>,
        saver: Arc<dyn StateSaver>,
        channel: Arc<dyn ControlChannel>,
        dispatcher: EventDispatcher,
        identity: AgentIdentity,
        buffer_size: usize,
        parent: &CancellationToken,
    ) -> Self {
        let buffer_size = buffer_size.max(1);
        let (message_tx, message_rx) = mpsc::channel(buffer_size);
        let (ack_tx, ack_rx) = mpsc::channel(buffer_size);
        let (sequence_number, _) = watch::channel(None);
        Self {
            message_tx,
            message_rx: Mutex::new(Some(message_rx)),
            ack_tx,
            ack_rx: Mutex::new(Some(ack_rx)),
            engine,
            saver,
            channel,
            dispatcher,
            identity,
            sequence_number,
            token: parent.child_token(),
        }
    }

    /// 载荷入队；队列满时等待空位（向传输层施加背压），处理器已停止时返回 Stopped
    pub async fn submit(&self, payload: PayloadMessage) -> Result<(), IngestError> {
        self.message_tx
            .send(payload)
            .await
            .map_err(|_| IngestError::Stopped)
    }

    /// 启动处理循环与 ack 循环；只能调用一次
    pub fn start(self: &Arc<Self>) -> Result<(), IngestError> {
        let message_rx = take(&self.message_rx);
        let ack_rx = take(&self.ack_rx);
        let (Some(message_rx), Some(ack_rx)) = (message_rx, ack_rx) else {
            return Err(IngestError::AlreadyStarted);
        };

        let handler = Arc::clone(self);
        tokio::spawn(async move { handler.handle_messages(message_rx).await });
        let handler = Arc::clone(self);
        tokio::spawn(async move { handler.send_acks(ack_rx).await });
        Ok(())
    }

    /// 通知两个循环在下一个等待点退出；进行中的处理不会被打断
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn latest_sequence_number(&self) -> Option<i64> {
        *self.sequence_number.borrow()
    }

    pub fn subscribe_sequence_number(&self) -> watch::Receiver<Option<i64>> {
        self.sequence_number.subscribe()
    }

    async fn handle_messages(&self, mut rx: mpsc::Receiver<PayloadMessage>) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                payload = rx.recv() => match payload {
                    Some(payload) => {
                        if let Err(e) = self.process_one(payload).await {
                            tracing::debug!("Payload not acknowledged: {}", e);
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Payload handling loop stopped");
    }

    async fn send_acks(&self, mut rx: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                message_id = rx.recv() => match message_id {
                    Some(message_id) => self.ack_message_id(message_id).await,
                    None => break,
                },
            }
        }
        tracing::debug!("Ack loop stopped");
    }

    async fn ack_message_id(&self, message_id: String) {
        let ack = AckRequest {
            cluster: self.identity.cluster.clone(),
            container_instance: self.identity.container_instance_arn.clone(),
            message_id,
        };
        let id = ack.message_id.clone();
        if let Err(e) = self.channel.send(OutboundMessage::AckRequest(ack)).await {
            tracing::warn!("Error 'ack'ing request with messageID: {}, error: {}", id, e);
        }
    }

    /// 处理单个载荷
    ///
    /// 成功时：有效任务已提交引擎、状态已保存、ack 已安排、序列号已记录。
    pub async fn process_one(&self, payload: PayloadMessage) -> Result<(), IngestError> {
        if payload.message_id.is_empty() {
            tracing::error!("Received a payload with no message id, payload: {:?}", payload);
            return Err(IngestError::MissingMessageId);
        }

        let failed = self.add_payload_tasks(&payload).await;

        // 无论任务是否全部成功，都保存一次已交给引擎的状态
        if let Err(e) = self.saver.save().await {
            tracing::error!(
                "Error saving state for payload message! err: {}, messageId: {}",
                e,
                payload.message_id
            );
            return Err(IngestError::PersistenceFailure(payload.message_id));
        }

        if failed > 0 {
            return Err(IngestError::PartialTaskFailure {
                message_id: payload.message_id,
                failed,
            });
        }

        let ack_tx = self.ack_tx.clone();
        let message_id = payload.message_id.clone();
        tokio::spawn(async move {
            if ack_tx.send(message_id).await.is_err() {
                tracing::debug!("Ack queue closed, dropping ack");
            }
        });

        if let Some(seq_num) = payload.seq_num {
            self.sequence_number.send_replace(Some(seq_num));
        }
        Ok(())
    }

    /// 校验并提交载荷中的任务，返回失败数
    async fn add_payload_tasks(&self, payload: &PayloadMessage) -> usize {
        let mut failed = 0;
        let mut valid = Vec::with_capacity(payload.tasks.len());

        for raw in &payload.tasks {
            if raw.is_null() {
                tracing::error!("Received nil task for messageId: {}", payload.message_id);
                failed += 1;
                continue;
            }
            match Task::from_value(raw, payload) {
                Ok(task) => valid.push(task),
                Err(e) => {
                    self.handle_unrecognized_task(raw, &e, payload);
                    failed += 1;
                }
            }
        }

        // 非 Stopped 任务先提交，Stopped 任务在同一载荷的其余任务之后
        let (stopped, not_stopped): (Vec<Task>, Vec<Task>) =
            valid.into_iter().partition(Task::is_desired_stopped);
        failed += self.add_tasks(not_stopped).await;
        failed += self.add_tasks(stopped).await;
        failed
    }

    async fn add_tasks(&self, tasks: Vec<Task>) -> usize {
        let mut failed = 0;
        for task in tasks {
            let arn = task.arn.clone();
            if let Err(e) = self.engine.add_task(task).await {
                tracing::warn!(
                    "Could not add task {}; taskengine probably disabled, err: {}",
                    arn,
                    e
                );
                failed += 1;
            }
        }
        failed
    }

    /// 无法识别的任务：有 ARN 时上报 Stopped，让控制面知道它不会运行
    fn handle_unrecognized_task(
        &self,
        raw: &Value,
        err: &TaskValidationError,
        payload: &PayloadMessage,
    ) {
        let Some(arn) = AcsTask::arn_of(raw) else {
            tracing::error!(
                "Received task with no arn, messageId: {}, task: {}, err: {}",
                payload.message_id,
                raw,
                err
            );
            return;
        };

        tracing::warn!("Unrecognized task {} in message {}: {}", arn, payload.message_id, err);
        self.dispatcher.enqueue(
            TaskStateChange::new(arn, Status::Stopped)
                .with_reason(format!("UnrecognizedTaskError: {}", err)),
        );
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}
