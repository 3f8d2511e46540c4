//! 状态变更事件分发
//!
//! - 每个任务 ARN 一个 EventQueue，同一任务的事件严格按入队顺序、一次一条地发送
//! - 全局 Semaphore 限制同时在发送的 ARN 数量，与任务数量无关
//! - 发送前再做陈旧判断：事件在队列中等待期间，已发送状态可能已经前进
//! - 发送失败只记日志，继续处理同一队列的下一条，不重试

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::api::{StateChangeEvent, Status};
use crate::channel::ControlChannel;
use crate::dispatch::{DrainState, EntityKey, EventQueue, SendableEvent};

/// 默认同时发送的 ARN 数
pub const DEFAULT_CONCURRENT_EVENT_CALLS: usize = 3;

struct DispatcherInner {
    channel: Arc<dyn ControlChannel>,
    permits: Arc<Semaphore>,
    /// ARN -> 队列；只在查找/创建时加锁，各队列内容由自己的锁保护
    queues: RwLock<HashMap<String, Arc<EventQueue>>>,
    /// 各实体已成功发送的最高状态
    sent: Mutex<HashMap<EntityKey, Status>>,
    token: CancellationToken,
}

/// 事件分发器；Clone 共享同一组队列与许可
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        concurrent_event_calls: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channel,
                permits: Arc::new(Semaphore::new(concurrent_event_calls.max(1))),
                queues: RwLock::new(HashMap::new()),
                sent: Mutex::new(HashMap::new()),
                token,
            }),
        }
    }

    /// 接收一条状态变更，立即返回；必须在 tokio 运行时内调用
    pub fn enqueue(&self, event: impl Into<StateChangeEvent>) {
        let event = event.into();
        let arn = event.task_arn().to_string();
        let queue = self.inner.queue_for(&arn);

        tracing::debug!("Queueing event: {}", event);
        if queue.push(SendableEvent::new(event)) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.drain(arn, queue).await;
            });
        }
    }

    /// 某 ARN 队列的当前状态；从未收到过事件时为 None
    pub fn drain_state(&self, task_arn: &str) -> Option<DrainState> {
        self.inner.existing_queue(task_arn).map(|q| q.state())
    }

    /// 某 ARN 尚未取出的事件数
    pub fn pending(&self, task_arn: &str) -> usize {
        self.inner
            .existing_queue(task_arn)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// 任务已成功发送的最高状态
    pub fn task_sent_status(&self, task_arn: &str) -> Option<Status> {
        self.inner.recorded(&EntityKey::Task(task_arn.to_string()))
    }

    pub fn container_sent_status(&self, task_arn: &str, container_name: &str) -> Option<Status> {
        self.inner.recorded(&EntityKey::Container(
            task_arn.to_string(),
            container_name.to_string(),
        ))
    }

    /// 任务已从状态中删除后调用：丢弃其任务与容器的已发送记录，空闲的空队列一并移除
    ///
    /// 仍有事件待发的队列保留，排空后下一次 forget 再移除。
    pub fn forget(&self, task_arn: &str) {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.task_arn() != task_arn);

        let mut queues = self.inner.queues.write().unwrap_or_else(PoisonError::into_inner);
        let idle = queues
            .get(task_arn)
            .is_some_and(|q| q.state() == DrainState::Idle && q.is_empty());
        if idle {
            queues.remove(task_arn);
            tracing::debug!("Forgot event state for task {}", task_arn);
        }
    }

    /// 已记录发送状态的实体数
    pub fn tracked_entities(&self) -> usize {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

impl DispatcherInner {
    fn existing_queue(&self, task_arn: &str) -> Option<Arc<EventQueue>> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_arn)
            .cloned()
    }

    fn queue_for(&self, task_arn: &str) -> Arc<EventQueue> {
        if let Some(queue) = self.existing_queue(task_arn) {
            return queue;
        }
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            queues
                .entry(task_arn.to_string())
                .or_insert_with(|| Arc::new(EventQueue::new())),
        )
    }

    fn recorded(&self, key: &EntityKey) -> Option<Status> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn record_sent(&self, key: EntityKey, status: Status) {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = sent.entry(key).or_insert(status);
        if *entry < status {
            *entry = status;
        }
    }

    /// 单个 ARN 的发送者：拿到许可后排空队列，队列空即退出
    async fn drain(self: Arc<Self>, task_arn: String, queue: Arc<EventQueue>) {
        let permit = tokio::select! {
            _ = self.token.cancelled() => {
                queue.abandon();
                return;
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!("Event permit pool closed, abandoning events for {}", task_arn);
                    queue.abandon();
                    return;
                }
            },
        };

        loop {
            if self.token.is_cancelled() {
                tracing::debug!("Dispatcher cancelled, leaving {} events for {}", queue.len(), task_arn);
                queue.abandon();
                break;
            }
            let Some(event) = queue.next() else {
                break;
            };
            self.submit(event).await;
        }

        drop(permit);
    }

    async fn submit(&self, mut event: SendableEvent) {
        let key = event.entity_key();
        if !event.should_be_sent(self.recorded(&key)) {
            tracing::debug!("Skipping redundant event: {}", event);
            if let Some(sent) = event.event().sent_status() {
                self.record_sent(key, sent);
            }
            return;
        }

        match self.channel.send(event.to_outbound()).await {
            Ok(()) => {
                event.mark_sent();
                self.record_sent(key, event.event().status());
                tracing::info!("Sent state change: {}", event);
            }
            Err(e) => {
                tracing::warn!("Error sending state change {}: {}", event, e);
            }
        }
    }
}
