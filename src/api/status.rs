//! 生命周期状态：有序枚举，以终态 Stopped 结束

use serde::{Deserialize, Serialize};

/// 任务与容器共用的生命周期状态
///
/// 变体顺序即生命周期顺序，`Ord` 比较用于「已发送状态 ≥ 当前状态」的陈旧判断。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// 占位状态，尚无任何进展
    #[default]
    None,
    Pulled,
    Created,
    Running,
    /// 终态
    Stopped,
}

impl Status {
    /// 解析线上的期望状态字符串（大小写不敏感）
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "NONE" => Some(Status::None),
            "PULLED" => Some(Status::Pulled),
            "CREATED" => Some(Status::Created),
            "RUNNING" => Some(Status::Running),
            "STOPPED" => Some(Status::Stopped),
            _ => None,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == Status::Stopped
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::None => write!(f, "NONE"),
            Status::Pulled => write!(f, "PULLED"),
            Status::Created => write!(f, "CREATED"),
            Status::Running => write!(f, "RUNNING"),
            Status::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(Status::None < Status::Pulled);
        assert!(Status::Running < Status::Stopped);
        assert_eq!(Status::default(), Status::None);
    }

    #[test]
    fn test_status_from_wire() {
        assert_eq!(Status::from_wire("RUNNING"), Some(Status::Running));
        assert_eq!(Status::from_wire("stopped"), Some(Status::Stopped));
        assert_eq!(Status::from_wire("DEAD"), None);
    }
}
