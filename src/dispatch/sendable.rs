//! 待发送事件与发送前的陈旧判断

use crate::api::{StateChangeEvent, Status};
use crate::protocol::OutboundMessage;

/// 已发送状态的记录键：任务按 ARN，容器按 ARN + 容器名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Task(String),
    Container(String, String),
}

impl EntityKey {
    pub fn task_arn(&self) -> &str {
        match self {
            EntityKey::Task(arn) | EntityKey::Container(arn, _) => arn,
        }
    }
}

/// 队列中的一条事件
#[derive(Debug, Clone)]
pub struct SendableEvent {
    event: StateChangeEvent,
    sent: bool,
}

impl SendableEvent {
    pub fn new(event: StateChangeEvent) -> Self {
        Self { event, sent: false }
    }

    pub fn event(&self) -> &StateChangeEvent {
        &self.event
    }

    pub fn task_arn(&self) -> &str {
        self.event.task_arn()
    }

    pub fn is_container_event(&self) -> bool {
        matches!(self.event, StateChangeEvent::Container(_))
    }

    pub fn entity_key(&self) -> EntityKey {
        match &self.event {
            StateChangeEvent::Task(t) => EntityKey::Task(t.task_arn.clone()),
            StateChangeEvent::Container(c) => {
                EntityKey::Container(c.task_arn.clone(), c.container_name.clone())
            }
        }
    }

    /// 发送时判断：`recorded` 为分发器记录的该实体已发送最高状态
    ///
    /// 事件自带的 sent_status 与记录取较大者；已发送状态 ≥ 当前状态即视为冗余。
    /// 任务事件额外跳过 None 占位状态。
    pub fn should_be_sent(&self, recorded: Option<Status>) -> bool {
        if self.sent {
            return false;
        }
        let status = self.event.status();
        if !self.is_container_event() && status == Status::None {
            return false;
        }
        match self.event.sent_status().max(recorded) {
            Some(sent) => sent < status,
            None => true,
        }
    }

    pub fn mark_sent(&mut self) {
        self.sent = true;
        let status = self.event.status();
        match &mut self.event {
            StateChangeEvent::Task(t) => t.sent_status = Some(status),
            StateChangeEvent::Container(c) => c.sent_status = Some(status),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn to_outbound(&self) -> OutboundMessage {
        match &self.event {
            StateChangeEvent::Task(t) => OutboundMessage::TaskStateChange(t.clone()),
            StateChangeEvent::Container(c) => OutboundMessage::ContainerStateChange(c.clone()),
        }
    }
}

impl std::fmt::Display for SendableEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.event, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContainerStateChange, TaskStateChange};

    fn task_event(status: Status) -> SendableEvent {
        SendableEvent::new(TaskStateChange::new("t1", status).into())
    }

    #[test]
    fn test_task_none_status_is_never_sent() {
        assert!(!task_event(Status::None).should_be_sent(None));
    }

    #[test]
    fn test_stale_against_event_or_record() {
        let ev = SendableEvent::new(
            TaskStateChange::new("t1", Status::Running)
                .with_sent_status(Status::Running)
                .into(),
        );
        assert!(!ev.should_be_sent(None));

        let ev = task_event(Status::Running);
        assert!(ev.should_be_sent(None));
        assert!(ev.should_be_sent(Some(Status::Created)));
        assert!(!ev.should_be_sent(Some(Status::Stopped)));
    }

    #[test]
    fn test_marked_event_is_not_resent() {
        let mut ev = SendableEvent::new(ContainerStateChange::new("t1", "web", Status::Running).into());
        assert!(ev.should_be_sent(None));
        ev.mark_sent();
        assert!(ev.is_sent());
        assert_eq!(ev.event().sent_status(), Some(Status::Running));
        assert!(!ev.should_be_sent(None));
    }

    #[test]
    fn test_entity_keys() {
        let c = SendableEvent::new(ContainerStateChange::new("t1", "web", Status::Running).into());
        assert_eq!(c.entity_key(), EntityKey::Container("t1".into(), "web".into()));
        assert_eq!(task_event(Status::Running).entity_key(), EntityKey::Task("t1".into()));
    }
}
