//! 单个任务 ARN 的事件队列
//!
//! 每个队列只有两个状态：Idle（无发送者）与 Draining（恰有一个发送者在排空）。
//! 状态与队列内容由同一把锁保护：
//! - Idle 时入队 -> 转 Draining，调用方负责启动发送者
//! - Draining 时发送者取到空队列 -> 转 Idle，发送者退出
//!
//! 因此同一 ARN 任意时刻至多一个发送者。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::dispatch::SendableEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
}

#[derive(Debug)]
struct QueueInner {
    state: DrainState,
    events: VecDeque<SendableEvent>,
}

#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                state: DrainState::Idle,
                events: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队；返回 true 表示由 Idle 转为 Draining，需要启动发送者
    pub fn push(&self, event: SendableEvent) -> bool {
        let mut inner = self.lock();
        inner.events.push_back(event);
        if inner.state == DrainState::Idle {
            inner.state = DrainState::Draining;
            true
        } else {
            false
        }
    }

    /// 发送者取下一条；队列为空时转回 Idle 并返回 None
    pub fn next(&self) -> Option<SendableEvent> {
        let mut inner = self.lock();
        let event = inner.events.pop_front();
        if event.is_none() {
            inner.state = DrainState::Idle;
        }
        event
    }

    /// 发送者提前退出（取消）时调用；剩余事件保留，下一次入队会重新启动发送者
    pub fn abandon(&self) {
        self.lock().state = DrainState::Idle;
    }

    pub fn state(&self) -> DrainState {
        self.lock().state
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Status, TaskStateChange};

    fn event(status: Status) -> SendableEvent {
        SendableEvent::new(TaskStateChange::new("t1", status).into())
    }

    #[test]
    fn test_only_first_push_starts_drainer() {
        let q = EventQueue::new();
        assert!(q.push(event(Status::Created)));
        assert!(!q.push(event(Status::Running)));
        assert_eq!(q.state(), DrainState::Draining);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_drain_to_idle() {
        let q = EventQueue::new();
        q.push(event(Status::Created));
        q.push(event(Status::Running));
        assert_eq!(q.next().unwrap().event().status(), Status::Created);
        assert_eq!(q.next().unwrap().event().status(), Status::Running);
        assert_eq!(q.state(), DrainState::Draining);
        assert!(q.next().is_none());
        assert_eq!(q.state(), DrainState::Idle);
        assert!(q.push(event(Status::Stopped)));
    }

    #[test]
    fn test_abandon_keeps_events() {
        let q = EventQueue::new();
        q.push(event(Status::Running));
        q.abandon();
        assert_eq!(q.state(), DrainState::Idle);
        assert_eq!(q.len(), 1);
        assert!(q.push(event(Status::Stopped)));
    }
}
