//! 内存注册表实现
//!
//! 以读写锁保护的内存结构保存目标、最新状态和检测日志，可选地持久化为JSON快照

use super::{
    CheckLogEntry, LatestStatus, MonitoredTarget, NewTarget, TargetId, TargetRegistry,
};
use crate::error::RegistryError;
use crate::health::{CheckOutcome, TargetStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 默认保留的检测日志条数
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;

/// 目标及其最新状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// 目标信息
    pub target: MonitoredTarget,
    /// 最新状态
    #[serde(default)]
    pub latest: LatestStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 状态分布统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// 目标总数
    pub total: usize,
    /// 在线数
    pub online: usize,
    /// 离线数
    pub offline: usize,
    /// 未检测数
    pub unknown: usize,
}

/// 快照文件格式
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistrySnapshot {
    next_target_id: TargetId,
    next_log_id: u64,
    targets: Vec<TargetRecord>,
    logs: Vec<CheckLogEntry>,
}

#[derive(Debug)]
struct RegistryState {
    targets: BTreeMap<TargetId, TargetRecord>,
    logs: VecDeque<CheckLogEntry>,
    next_target_id: TargetId,
    next_log_id: u64,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            logs: VecDeque::new(),
            next_target_id: 1,
            next_log_id: 1,
        }
    }
}

/// 内存注册表
#[derive(Debug)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
    max_log_entries: usize,
}

impl InMemoryRegistry {
    /// 创建新的内存注册表
    ///
    /// # 参数
    /// * `max_log_entries` - 检测日志最大保留条数，超出后淘汰最旧的记录
    pub fn new(max_log_entries: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            max_log_entries: max_log_entries.max(1),
        }
    }

    /// 创建目标，初始状态为 unknown
    pub async fn create_target(&self, new: NewTarget) -> Result<MonitoredTarget, RegistryError> {
        new.validate().map_err(RegistryError::Invalid)?;

        let mut state = self.state.write().await;
        let id = state.next_target_id;
        state.next_target_id += 1;

        let now = Utc::now();
        let target = MonitoredTarget {
            id,
            name: new.name.trim().to_string(),
            endpoint: new.endpoint.trim().to_string(),
            token: new.token,
            description: new.description,
        };
        state.targets.insert(
            id,
            TargetRecord {
                target: target.clone(),
                latest: LatestStatus::default(),
                created_at: now,
                updated_at: now,
            },
        );

        info!(target_id = id, name = %target.name, "已添加监控目标");
        Ok(target)
    }

    /// 更新目标信息，保留最新状态
    pub async fn update_target(
        &self,
        id: TargetId,
        new: NewTarget,
    ) -> Result<MonitoredTarget, RegistryError> {
        new.validate().map_err(RegistryError::Invalid)?;

        let mut state = self.state.write().await;
        let record = state
            .targets
            .get_mut(&id)
            .ok_or(RegistryError::TargetNotFound { id })?;

        record.target.name = new.name.trim().to_string();
        record.target.endpoint = new.endpoint.trim().to_string();
        record.target.token = new.token;
        record.target.description = new.description;
        record.updated_at = Utc::now();

        info!(target_id = id, "已更新监控目标");
        Ok(record.target.clone())
    }

    /// 删除目标，并级联删除其检测日志
    pub async fn delete_target(&self, id: TargetId) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if state.targets.remove(&id).is_none() {
            return Err(RegistryError::TargetNotFound { id });
        }
        state.logs.retain(|entry| entry.target_id != id);

        info!(target_id = id, "已删除监控目标");
        Ok(())
    }

    /// 在注册表为空时写入初始目标
    ///
    /// # 返回
    /// * `usize` - 实际写入的目标数量
    pub async fn seed_if_empty(&self, targets: &[NewTarget]) -> Result<usize, RegistryError> {
        if !self.state.read().await.targets.is_empty() {
            debug!("注册表非空，跳过初始目标写入");
            return Ok(0);
        }
        for target in targets {
            self.create_target(target.clone()).await?;
        }
        Ok(targets.len())
    }

    /// 列出目标及最新状态，按创建时间倒序
    pub async fn list_target_records(&self) -> Vec<TargetRecord> {
        let state = self.state.read().await;
        let mut records: Vec<TargetRecord> = state.targets.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.target.id.cmp(&a.target.id))
        });
        records
    }

    /// 获取单个目标的记录
    pub async fn get_target_record(&self, id: TargetId) -> Option<TargetRecord> {
        self.state.read().await.targets.get(&id).cloned()
    }

    /// 查询检测日志，按检测时间倒序
    ///
    /// # 参数
    /// * `target_id` - 仅返回该目标的日志，`None` 表示全部
    /// * `limit` - 最多返回条数
    pub async fn list_check_logs(
        &self,
        target_id: Option<TargetId>,
        limit: usize,
    ) -> Vec<CheckLogEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<CheckLogEntry> = state
            .logs
            .iter()
            .filter(|entry| target_id.is_none_or(|id| entry.target_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.checked_at
                .cmp(&a.checked_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.truncate(limit);
        entries
    }

    /// 统计状态分布
    pub async fn status_counts(&self) -> StatusCounts {
        let state = self.state.read().await;
        let mut counts = StatusCounts {
            total: state.targets.len(),
            ..Default::default()
        };
        for record in state.targets.values() {
            match record.latest.status {
                TargetStatus::Online => counts.online += 1,
                TargetStatus::Offline => counts.offline += 1,
                TargetStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// 保存快照到文件（先写临时文件再重命名）
    pub async fn save_to_file(&self, path: &Path) -> Result<(), RegistryError> {
        let snapshot = {
            let state = self.state.read().await;
            RegistrySnapshot {
                next_target_id: state.next_target_id,
                next_log_id: state.next_log_id,
                targets: state.targets.values().cloned().collect(),
                logs: state.logs.iter().cloned().collect(),
            }
        };

        let snapshot_error = |reason: String| RegistryError::Snapshot {
            path: path.display().to_string(),
            reason,
        };

        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| snapshot_error(format!("序列化失败: {e}")))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| snapshot_error(format!("创建目录失败: {e}")))?;
            }
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| snapshot_error(format!("写入失败: {e}")))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| snapshot_error(format!("重命名失败: {e}")))?;

        debug!("注册表快照已保存: {}", path.display());
        Ok(())
    }

    /// 从快照文件恢复注册表
    pub async fn load_from_file(
        path: &Path,
        max_log_entries: usize,
    ) -> Result<Self, RegistryError> {
        let snapshot_error = |reason: String| RegistryError::Snapshot {
            path: path.display().to_string(),
            reason,
        };

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| snapshot_error(format!("读取失败: {e}")))?;
        let snapshot: RegistrySnapshot = serde_json::from_slice(&content)
            .map_err(|e| snapshot_error(format!("解析失败: {e}")))?;

        let registry = Self::new(max_log_entries);
        {
            let mut state = registry.state.write().await;
            let max_target_id = snapshot.targets.iter().map(|r| r.target.id).max().unwrap_or(0);
            let max_log_id = snapshot.logs.iter().map(|e| e.id).max().unwrap_or(0);

            state.targets = snapshot
                .targets
                .into_iter()
                .map(|record| (record.target.id, record))
                .collect();
            state.logs = snapshot.logs.into_iter().collect();
            while state.logs.len() > registry.max_log_entries {
                state.logs.pop_front();
            }
            state.next_target_id = snapshot.next_target_id.max(max_target_id + 1);
            state.next_log_id = snapshot.next_log_id.max(max_log_id + 1);

            info!(
                "已从快照恢复注册表: {} 个目标, {} 条检测日志",
                state.targets.len(),
                state.logs.len()
            );
        }
        Ok(registry)
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_ENTRIES)
    }
}

#[async_trait]
impl TargetRegistry for InMemoryRegistry {
    async fn list_all_targets(&self) -> Result<Vec<MonitoredTarget>, RegistryError> {
        let state = self.state.read().await;
        Ok(state.targets.values().map(|r| r.target.clone()).collect())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<MonitoredTarget>, RegistryError> {
        let state = self.state.read().await;
        Ok(state.targets.get(&id).map(|r| r.target.clone()))
    }

    async fn write_latest_status(
        &self,
        id: TargetId,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
        connection_status: Option<&str>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let record = state
            .targets
            .get_mut(&id)
            .ok_or(RegistryError::TargetNotFound { id })?;

        record.latest = LatestStatus {
            status,
            connection_status: connection_status.map(str::to_string),
            last_checked_at: Some(checked_at),
        };
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_check_log(
        &self,
        target_id: TargetId,
        outcome: &CheckOutcome,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if !state.targets.contains_key(&target_id) {
            return Err(RegistryError::TargetNotFound { id: target_id });
        }

        let id = state.next_log_id;
        state.next_log_id += 1;
        state
            .logs
            .push_back(CheckLogEntry::from_outcome(id, target_id, outcome));
        while state.logs.len() > self.max_log_entries {
            state.logs.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProbeStage;
    use tempfile::tempdir;

    fn new_target(name: &str) -> NewTarget {
        NewTarget {
            name: name.to_string(),
            endpoint: format!("https://{name}.example.com/"),
            token: format!("{name}-token"),
            description: Some(format!("{name} gateway")),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_targets() {
        let registry = InMemoryRegistry::default();
        let a = registry.create_target(new_target("a")).await.unwrap();
        let b = registry.create_target(new_target("b")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);

        let targets = registry.list_all_targets().await.unwrap();
        assert_eq!(targets.len(), 2);

        let records = registry.list_target_records().await;
        assert_eq!(records[0].target.id, 2);
        assert_eq!(records[0].latest.status, TargetStatus::Unknown);
        assert!(records[0].latest.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_target() {
        let registry = InMemoryRegistry::default();
        let mut target = new_target("a");
        target.endpoint = "wa.example.com".to_string();

        assert!(matches!(
            registry.create_target(target.clone()).await,
            Err(RegistryError::Invalid(_))
        ));
        assert!(registry.list_all_targets().await.unwrap().is_empty());

        let existing = registry.create_target(new_target("b")).await.unwrap();
        assert!(matches!(
            registry.update_target(existing.id, target).await,
            Err(RegistryError::Invalid(_))
        ));
        let unchanged = registry.get_target(existing.id).await.unwrap().unwrap();
        assert_eq!(unchanged.endpoint, existing.endpoint);
    }

    #[tokio::test]
    async fn test_latest_status_is_overwritten() {
        let registry = InMemoryRegistry::default();
        let target = registry.create_target(new_target("a")).await.unwrap();

        let first = Utc::now();
        registry
            .write_latest_status(target.id, TargetStatus::Online, first, Some("connected"))
            .await
            .unwrap();
        let second = Utc::now();
        registry
            .write_latest_status(target.id, TargetStatus::Offline, second, None)
            .await
            .unwrap();

        let record = registry.get_target_record(target.id).await.unwrap();
        assert_eq!(record.latest.status, TargetStatus::Offline);
        assert!(record.latest.connection_status.is_none());
        assert_eq!(record.latest.last_checked_at, Some(second));
    }

    #[tokio::test]
    async fn test_writes_for_unknown_target_fail() {
        let registry = InMemoryRegistry::default();
        let outcome = CheckOutcome::online(ProbeStage::Primary);

        let err = registry
            .write_latest_status(99, TargetStatus::Online, Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::TargetNotFound { id: 99 }));

        let err = registry.append_check_log(99, &outcome).await.unwrap_err();
        assert!(matches!(err, RegistryError::TargetNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_delete_cascades_logs() {
        let registry = InMemoryRegistry::default();
        let a = registry.create_target(new_target("a")).await.unwrap();
        let b = registry.create_target(new_target("b")).await.unwrap();

        let outcome = CheckOutcome::online(ProbeStage::Primary);
        registry.append_check_log(a.id, &outcome).await.unwrap();
        registry.append_check_log(b.id, &outcome).await.unwrap();

        registry.delete_target(a.id).await.unwrap();

        let logs = registry.list_check_logs(None, 100).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].target_id, b.id);
        assert!(registry.get_target(a.id).await.unwrap().is_none());
        assert!(registry.delete_target(a.id).await.is_err());
    }

    #[tokio::test]
    async fn test_check_logs_filter_limit_and_order() {
        let registry = InMemoryRegistry::default();
        let a = registry.create_target(new_target("a")).await.unwrap();
        let b = registry.create_target(new_target("b")).await.unwrap();

        for _ in 0..3 {
            registry
                .append_check_log(a.id, &CheckOutcome::online(ProbeStage::Primary))
                .await
                .unwrap();
        }
        registry
            .append_check_log(b.id, &CheckOutcome::offline(ProbeStage::Primary, "boom"))
            .await
            .unwrap();

        let a_logs = registry.list_check_logs(Some(a.id), 2).await;
        assert_eq!(a_logs.len(), 2);
        assert!(a_logs.iter().all(|e| e.target_id == a.id));
        assert!(a_logs[0].id > a_logs[1].id);

        let all = registry.list_check_logs(None, 100).await;
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_log_retention_evicts_oldest() {
        let registry = InMemoryRegistry::new(2);
        let a = registry.create_target(new_target("a")).await.unwrap();

        for _ in 0..5 {
            registry
                .append_check_log(a.id, &CheckOutcome::online(ProbeStage::Primary))
                .await
                .unwrap();
        }

        let logs = registry.list_check_logs(None, 100).await;
        let ids: Vec<u64> = logs.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let registry = InMemoryRegistry::default();
        let seeded = registry
            .seed_if_empty(&[new_target("a"), new_target("b")])
            .await
            .unwrap();
        assert_eq!(seeded, 2);

        let seeded = registry.seed_if_empty(&[new_target("c")]).await.unwrap();
        assert_eq!(seeded, 0);
        assert_eq!(registry.list_all_targets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let registry = InMemoryRegistry::default();
        let a = registry.create_target(new_target("a")).await.unwrap();
        let b = registry.create_target(new_target("b")).await.unwrap();
        registry.create_target(new_target("c")).await.unwrap();

        registry
            .write_latest_status(a.id, TargetStatus::Online, Utc::now(), None)
            .await
            .unwrap();
        registry
            .write_latest_status(b.id, TargetStatus::Offline, Utc::now(), None)
            .await
            .unwrap();

        let counts = registry.status_counts().await;
        assert_eq!(
            counts,
            StatusCounts {
                total: 3,
                online: 1,
                offline: 1,
                unknown: 1
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("registry.json");

        let registry = InMemoryRegistry::default();
        let a = registry.create_target(new_target("a")).await.unwrap();
        registry
            .write_latest_status(a.id, TargetStatus::Online, Utc::now(), Some("connected"))
            .await
            .unwrap();
        registry
            .append_check_log(a.id, &CheckOutcome::online(ProbeStage::Primary))
            .await
            .unwrap();
        registry.save_to_file(&path).await.unwrap();

        let restored = InMemoryRegistry::load_from_file(&path, 100).await.unwrap();
        let record = restored.get_target_record(a.id).await.unwrap();
        assert_eq!(record.target, a);
        assert_eq!(record.latest.connection_status.as_deref(), Some("connected"));
        assert_eq!(restored.list_check_logs(None, 10).await.len(), 1);

        // 恢复后的ID计数器继续递增
        let b = restored.create_target(new_target("b")).await.unwrap();
        assert_eq!(b.id, a.id + 1);
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_fails() {
        let dir = tempdir().unwrap();
        let result = InMemoryRegistry::load_from_file(&dir.path().join("missing.json"), 10).await;
        assert!(matches!(result, Err(RegistryError::Snapshot { .. })));
    }
}
