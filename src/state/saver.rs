//! 状态持久化
//!
//! 载荷处理在确认前同步调用 `StateSaver::save`；保存失败则不确认，等服务端重投。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::StateError;
use crate::state::StateStore;

/// 持久化 StateStore 的后端
#[async_trait]
pub trait StateSaver: Send + Sync {
    async fn save(&self) -> Result<(), StateError>;
}

/// 单文件 JSON 持久化：先写临时文件再 rename，避免留下半截快照
#[derive(Debug)]
pub struct JsonFileSaver {
    path: PathBuf,
    store: Arc<StateStore>,
}

impl JsonFileSaver {
    pub fn new(path: impl AsRef<Path>, store: Arc<StateStore>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从文件恢复状态；文件不存在时保持空状态并返回 false
    pub async fn load(&self) -> Result<bool, StateError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.store.restore(&data).await?;
        tracing::info!(
            "Restored {} tasks and {} docker containers from {}",
            self.store.task_count().await,
            self.store.docker_container_count().await,
            self.path.display()
        );
        Ok(true)
    }
}

#[async_trait]
impl StateSaver for JsonFileSaver {
    async fn save(&self) -> Result<(), StateError> {
        let data = self.store.encode().await?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("Saved state ({} bytes) to {}", data.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Container, DockerContainer, Status, Task};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = Arc::new(StateStore::new());
        let web = Container {
            name: "web".to_string(),
            image: "nginx".to_string(),
            essential: true,
            cpu: 0,
            memory: 0,
            desired_status: Status::Running,
            known_status: Status::Running,
        };
        store
            .add_task(Task {
                arn: "t1".to_string(),
                family: "web".to_string(),
                version: "1".to_string(),
                desired_status: Status::Running,
                known_status: Status::Running,
                containers: vec![web.clone()],
                stop_sequence_number: None,
            })
            .await;
        store
            .add_container(
                DockerContainer {
                    docker_id: "d1".to_string(),
                    docker_name: "ecs-web".to_string(),
                    container: web,
                },
                "t1",
            )
            .await
            .unwrap();

        JsonFileSaver::new(&path, store).save().await.unwrap();
        assert!(path.exists());

        let fresh = Arc::new(StateStore::new());
        let loaded = JsonFileSaver::new(&path, fresh.clone()).load().await.unwrap();
        assert!(loaded);
        assert_eq!(fresh.task_by_docker_id("d1").await.unwrap().arn, "t1");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new());
        let saver = JsonFileSaver::new(dir.path().join("absent.json"), store.clone());
        assert!(!saver.load().await.unwrap());
        assert_eq!(store.task_count().await, 0);
    }
}
