//! 任务与容器的内存索引
//!
//! 容器描述只存一份：放在 arena（`containers`）里，以稳定下标 `ContainerIdx` 引用。
//! 任务条目和 docker id 索引都只保存下标，因此通过任意一方修改容器，另一方立即可见，
//! 反序列化后也无需修复别名，只需按名字把下标重新连上（见 `snapshot`）。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::api::{Container, DockerContainer, Status, Task};
use crate::core::StateError;
use crate::state::snapshot::{self, SavedState};

/// 容器在 arena 中的稳定下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerIdx(u64);

/// 任务条目：`task.containers` 恒为空，容器由 `containers` 下标指向 arena
#[derive(Debug, Clone)]
struct TaskEntry {
    task: Task,
    containers: Vec<ContainerIdx>,
}

#[derive(Debug, Clone)]
struct DockerEntry {
    docker_name: String,
    container: ContainerIdx,
}

/// 锁内数据；`restore` 在锁外构建一份新的，再整体替换
#[derive(Debug, Default)]
pub(crate) struct StateInner {
    next_idx: u64,
    containers: HashMap<ContainerIdx, Container>,
    tasks: HashMap<String, TaskEntry>,
    docker_containers: HashMap<String, DockerEntry>,
    docker_id_to_task: HashMap<String, String>,
}

impl StateInner {
    fn alloc(&mut self, container: Container) -> ContainerIdx {
        let idx = ContainerIdx(self.next_idx);
        self.next_idx += 1;
        self.containers.insert(idx, container);
        idx
    }

    /// 新增任务；已存在时按容器名原地更新，已绑定 docker id 的下标保持不变
    pub(crate) fn add_task(&mut self, mut task: Task) {
        let incoming = std::mem::take(&mut task.containers);

        let Some(existing) = self.tasks.get(&task.arn).cloned() else {
            let containers = incoming.into_iter().map(|c| self.alloc(c)).collect();
            self.tasks.insert(task.arn.clone(), TaskEntry { task, containers });
            return;
        };

        let mut by_name: HashMap<String, ContainerIdx> = existing
            .containers
            .iter()
            .filter_map(|idx| self.containers.get(idx).map(|c| (c.name.clone(), *idx)))
            .collect();

        let mut containers = Vec::with_capacity(incoming.len());
        for container in incoming {
            match by_name.remove(&container.name) {
                Some(idx) => {
                    self.containers.insert(idx, container);
                    containers.push(idx);
                }
                None => containers.push(self.alloc(container)),
            }
        }
        // 新描述里已不存在的容器：连同其 docker 绑定一并删除
        let dropped: Vec<ContainerIdx> = by_name.into_values().collect();
        self.release(&dropped);

        self.tasks.insert(task.arn.clone(), TaskEntry { task, containers });
    }

    fn release(&mut self, slots: &[ContainerIdx]) {
        if slots.is_empty() {
            return;
        }
        for idx in slots {
            self.containers.remove(idx);
        }
        let stale: Vec<String> = self
            .docker_containers
            .iter()
            .filter(|(_, entry)| slots.contains(&entry.container))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            self.docker_containers.remove(&id);
            self.docker_id_to_task.remove(&id);
        }
    }

    /// 绑定 docker id 到任务内的同名容器；返回该容器的下标
    ///
    /// 传入记录里携带的容器描述不会被保存，一律以任务内的那份为准。
    pub(crate) fn add_container(
        &mut self,
        docker: DockerContainer,
        task_arn: &str,
    ) -> Result<ContainerIdx, StateError> {
        let idx = self
            .container_index(task_arn, &docker.container.name)
            .ok_or_else(|| {
                if self.tasks.contains_key(task_arn) {
                    StateError::UnknownContainer {
                        task_arn: task_arn.to_string(),
                        name: docker.container.name.clone(),
                    }
                } else {
                    StateError::UnknownTask(task_arn.to_string())
                }
            })?;

        self.docker_containers.insert(
            docker.docker_id.clone(),
            DockerEntry {
                docker_name: docker.docker_name,
                container: idx,
            },
        );
        self.docker_id_to_task
            .insert(docker.docker_id, task_arn.to_string());
        Ok(idx)
    }

    pub(crate) fn container_index(&self, task_arn: &str, name: &str) -> Option<ContainerIdx> {
        let entry = self.tasks.get(task_arn)?;
        entry
            .containers
            .iter()
            .copied()
            .find(|idx| self.containers.get(idx).is_some_and(|c| c.name == name))
    }

    fn materialize(&self, entry: &TaskEntry) -> Task {
        let mut task = entry.task.clone();
        task.containers = entry
            .containers
            .iter()
            .filter_map(|idx| self.containers.get(idx).cloned())
            .collect();
        task
    }

    fn docker_container(&self, docker_id: &str) -> Option<DockerContainer> {
        let entry = self.docker_containers.get(docker_id)?;
        let container = self.containers.get(&entry.container)?.clone();
        Some(DockerContainer {
            docker_id: docker_id.to_string(),
            docker_name: entry.docker_name.clone(),
            container,
        })
    }

    pub(crate) fn snapshot(&self) -> SavedState {
        SavedState {
            tasks: self.tasks.values().map(|e| self.materialize(e)).collect(),
            id_to_container: self
                .docker_containers
                .keys()
                .filter_map(|id| self.docker_container(id).map(|c| (id.clone(), c)))
                .collect(),
            id_to_task: self.docker_id_to_task.clone(),
        }
    }
}

/// `add_or_advance_task` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAdmission {
    Added,
    Advanced { from: Status },
    Unchanged,
}

/// 进程内唯一的任务/容器状态；所有读写都经过同一把读写锁
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<StateInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_task(&self, task: Task) {
        self.inner.write().await.add_task(task);
    }

    /// 要求任务已存在，且任务内有同名容器
    pub async fn add_container(
        &self,
        docker: DockerContainer,
        task_arn: &str,
    ) -> Result<ContainerIdx, StateError> {
        self.inner.write().await.add_container(docker, task_arn)
    }

    /// 删除任务、其容器与相关 docker id 映射；返回是否存在
    pub async fn remove_task(&self, task_arn: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.tasks.remove(task_arn) else {
            return false;
        };
        inner.release(&entry.containers);
        inner.docker_id_to_task.retain(|_, arn| arn != task_arn);
        true
    }

    pub async fn task_by_arn(&self, task_arn: &str) -> Option<Task> {
        let inner = self.inner.read().await;
        inner.tasks.get(task_arn).map(|e| inner.materialize(e))
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        let inner = self.inner.read().await;
        inner.tasks.values().map(|e| inner.materialize(e)).collect()
    }

    pub async fn contains_task(&self, task_arn: &str) -> bool {
        self.inner.read().await.tasks.contains_key(task_arn)
    }

    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    /// 已绑定 docker id 的容器数；尚未绑定的任务内容器不计
    pub async fn docker_container_count(&self) -> usize {
        self.inner.read().await.docker_containers.len()
    }

    pub async fn container_by_docker_id(&self, docker_id: &str) -> Option<DockerContainer> {
        self.inner.read().await.docker_container(docker_id)
    }

    pub async fn container_by_name(&self, task_arn: &str, name: &str) -> Option<Container> {
        let inner = self.inner.read().await;
        let idx = inner.container_index(task_arn, name)?;
        inner.containers.get(&idx).cloned()
    }

    pub async fn task_by_docker_id(&self, docker_id: &str) -> Option<Task> {
        let inner = self.inner.read().await;
        let arn = inner.docker_id_to_task.get(docker_id)?;
        inner.tasks.get(arn).map(|e| inner.materialize(e))
    }

    /// 任务内容器的 arena 下标
    pub async fn container_index(&self, task_arn: &str, name: &str) -> Option<ContainerIdx> {
        self.inner.read().await.container_index(task_arn, name)
    }

    /// docker id 指向的 arena 下标
    pub async fn docker_container_index(&self, docker_id: &str) -> Option<ContainerIdx> {
        self.inner
            .read()
            .await
            .docker_containers
            .get(docker_id)
            .map(|e| e.container)
    }

    /// 原地修改任务内的容器；修改对 docker id 视图同样可见
    pub async fn update_container<F>(&self, task_arn: &str, name: &str, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Container),
    {
        let mut inner = self.inner.write().await;
        let idx = inner
            .container_index(task_arn, name)
            .ok_or_else(|| StateError::UnknownContainer {
                task_arn: task_arn.to_string(),
                name: name.to_string(),
            })?;
        if let Some(container) = inner.containers.get_mut(&idx) {
            f(container);
        }
        Ok(())
    }

    /// 新任务直接加入；已知任务只允许期望状态前进，不回退
    ///
    /// 判断与写入在同一次写锁内完成，并发提交同一 ARN 也不会覆盖更靠后的期望状态。
    pub async fn add_or_advance_task(&self, task: Task) -> TaskAdmission {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.tasks.get_mut(&task.arn) {
            let from = entry.task.desired_status;
            if task.desired_status <= from {
                return TaskAdmission::Unchanged;
            }
            entry.task.desired_status = task.desired_status;
            entry.task.stop_sequence_number = task.stop_sequence_number;
            return TaskAdmission::Advanced { from };
        }
        inner.add_task(task);
        TaskAdmission::Added
    }

    /// 可序列化的全量视图
    pub async fn snapshot(&self) -> SavedState {
        self.inner.read().await.snapshot()
    }

    /// 快照编码为 JSON 字节
    pub async fn encode(&self) -> Result<Vec<u8>, StateError> {
        let saved = self.snapshot().await;
        Ok(serde_json::to_vec(&saved)?)
    }

    /// 从快照字节重建；失败时现有状态保持不变
    pub async fn restore(&self, data: &[u8]) -> Result<(), StateError> {
        let saved: SavedState = serde_json::from_slice(data)?;
        let rebuilt = snapshot::rebuild(saved)?;
        *self.inner.write().await = rebuilt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            image: format!("{}:latest", name),
            essential: true,
            cpu: 0,
            memory: 0,
            desired_status: Status::Running,
            known_status: Status::None,
        }
    }

    fn task(arn: &str, names: &[&str]) -> Task {
        Task {
            arn: arn.to_string(),
            family: "fam".to_string(),
            version: "1".to_string(),
            desired_status: Status::Running,
            known_status: Status::None,
            containers: names.iter().map(|n| container(n)).collect(),
            stop_sequence_number: None,
        }
    }

    fn docker(id: &str, name: &str) -> DockerContainer {
        DockerContainer {
            docker_id: id.to_string(),
            docker_name: format!("ecs-{}", name),
            container: container(name),
        }
    }

    #[tokio::test]
    async fn test_add_container_shares_slot_with_task() {
        let store = StateStore::new();
        store.add_task(task("t1", &["web", "sidecar"])).await;
        let idx = store.add_container(docker("d1", "web"), "t1").await.unwrap();

        assert_eq!(store.container_index("t1", "web").await, Some(idx));
        assert_eq!(store.docker_container_index("d1").await, Some(idx));

        store
            .update_container("t1", "web", |c| c.known_status = Status::Running)
            .await
            .unwrap();
        let via_docker = store.container_by_docker_id("d1").await.unwrap();
        assert_eq!(via_docker.container.known_status, Status::Running);
        assert_eq!(store.task_by_docker_id("d1").await.unwrap().arn, "t1");
    }

    #[tokio::test]
    async fn test_add_container_requires_task_and_name() {
        let store = StateStore::new();
        let err = store.add_container(docker("d1", "web"), "t1").await.unwrap_err();
        assert!(matches!(err, StateError::UnknownTask(_)));

        store.add_task(task("t1", &["web"])).await;
        let err = store.add_container(docker("d2", "db"), "t1").await.unwrap_err();
        assert!(matches!(err, StateError::UnknownContainer { .. }));
        assert_eq!(store.docker_container_count().await, 0);
    }

    #[tokio::test]
    async fn test_readd_task_keeps_bound_slots() {
        let store = StateStore::new();
        store.add_task(task("t1", &["web", "old"])).await;
        let web = store.add_container(docker("d1", "web"), "t1").await.unwrap();
        store.add_container(docker("d2", "old"), "t1").await.unwrap();

        let mut updated = task("t1", &["web"]);
        updated.desired_status = Status::Stopped;
        store.add_task(updated).await;

        assert_eq!(store.docker_container_index("d1").await, Some(web));
        assert!(store.container_by_docker_id("d2").await.is_none());
        let t = store.task_by_arn("t1").await.unwrap();
        assert_eq!(t.desired_status, Status::Stopped);
        assert_eq!(t.containers.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_task_drops_mappings() {
        let store = StateStore::new();
        store.add_task(task("t1", &["web"])).await;
        store.add_task(task("t2", &["web"])).await;
        store.add_container(docker("d1", "web"), "t1").await.unwrap();
        store.add_container(docker("d2", "web"), "t2").await.unwrap();

        assert!(store.remove_task("t1").await);
        assert!(!store.remove_task("t1").await);
        assert!(store.container_by_docker_id("d1").await.is_none());
        assert!(store.task_by_docker_id("d1").await.is_none());
        assert!(store.container_by_docker_id("d2").await.is_some());
        assert_eq!(store.task_count().await, 1);
    }

    #[tokio::test]
    async fn test_all_tasks_materializes_containers() {
        let store = StateStore::new();
        store.add_task(task("t1", &["web", "db"])).await;
        store.add_task(task("t2", &["worker"])).await;

        let mut tasks = store.all_tasks().await;
        tasks.sort_by(|a, b| a.arn.cmp(&b.arn));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].arn, "t1");
        let names: Vec<&str> = tasks[0].containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);
        assert_eq!(tasks[1].containers[0].name, "worker");

        store.remove_task("t1").await;
        assert_eq!(store.all_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_or_advance_never_regresses() {
        let store = StateStore::new();
        assert_eq!(store.add_or_advance_task(task("t1", &["web"])).await, TaskAdmission::Added);
        assert_eq!(
            store.add_or_advance_task(task("t1", &["web"])).await,
            TaskAdmission::Unchanged
        );

        let mut stop = task("t1", &["web"]);
        stop.desired_status = Status::Stopped;
        stop.stop_sequence_number = Some(4);
        assert_eq!(
            store.add_or_advance_task(stop).await,
            TaskAdmission::Advanced { from: Status::Running }
        );
        assert_eq!(
            store.add_or_advance_task(task("t1", &["web"])).await,
            TaskAdmission::Unchanged
        );

        let t = store.task_by_arn("t1").await.unwrap();
        assert_eq!(t.desired_status, Status::Stopped);
        assert_eq!(t.stop_sequence_number, Some(4));
        assert_eq!(t.containers.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_keeps_latest_status() {
        let store = std::sync::Arc::new(StateStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut t = task("t1", &["web"]);
                if i % 2 == 0 {
                    t.desired_status = Status::Stopped;
                }
                store.add_or_advance_task(t).await
            }));
        }
        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap() == TaskAdmission::Added {
                added += 1;
            }
        }

        assert_eq!(added, 1);
        assert_eq!(store.task_count().await, 1);
        assert_eq!(
            store.task_by_arn("t1").await.unwrap().desired_status,
            Status::Stopped
        );
    }
}
