//! 检测调度器模块
//!
//! 按固定间隔遍历注册表中的全部目标，在有界并发下探测每个目标，
//! 并把结果写回注册表（最新状态覆盖 + 检测日志追加）

use crate::error::{CheckError, GatewayVitalsError, RegistryError, Result};
use crate::health::probe::{Prober, FALLBACK_TIMEOUT, PRIMARY_TIMEOUT};
use crate::health::result::{CheckOutcome, ProbeStage};
use crate::registry::{MonitoredTarget, TargetId, TargetRegistry};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 默认检测间隔（分钟）
pub const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 5;

/// 默认最大并发探测数
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 16;

/// 调度器配置
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// 检测间隔
    pub check_interval: Duration,
    /// 单个周期内的最大并发探测数
    pub max_concurrent_checks: usize,
    /// 单个目标的探测期限，超过后按离线记录
    pub probe_deadline: Duration,
}

impl SchedulerConfig {
    /// 以分钟为单位的间隔创建配置
    pub fn from_minutes(interval_minutes: u64, max_concurrent_checks: usize) -> Self {
        Self {
            check_interval: Duration::from_secs(interval_minutes.saturating_mul(60)),
            max_concurrent_checks,
            ..Default::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_MINUTES * 60),
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            probe_deadline: PRIMARY_TIMEOUT + FALLBACK_TIMEOUT + Duration::from_secs(5),
        }
    }
}

/// 单个检测周期的汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// 周期ID
    pub cycle_id: Uuid,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 耗时（毫秒）
    pub duration_ms: u64,
    /// 本周期检测的目标数
    pub total_targets: usize,
    /// 在线数
    pub online: usize,
    /// 离线数
    pub offline: usize,
    /// 写入注册表失败的目标数
    pub persist_failures: usize,
}

/// 调度器状态
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 检测间隔（秒）
    pub check_interval_seconds: u64,
    /// 已完成的周期数
    pub cycles_completed: u64,
    /// 最近一个周期的汇总
    pub last_cycle: Option<CycleReport>,
}

/// 单个目标的检测与写入结果
#[derive(Debug)]
struct RecordedCheck {
    outcome: CheckOutcome,
    persisted: bool,
}

/// 检测调度器
pub struct CheckScheduler {
    /// 探测器
    prober: Arc<dyn Prober>,
    /// 注册表
    registry: Arc<dyn TargetRegistry>,
    /// 调度配置
    config: SchedulerConfig,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
    /// 周期任务句柄
    task: Mutex<Option<JoinHandle<()>>>,
    /// 停止信号
    shutdown_tx: broadcast::Sender<()>,
}

impl CheckScheduler {
    /// 创建新的检测调度器
    ///
    /// # 参数
    /// * `prober` - 探测器
    /// * `registry` - 注册表
    /// * `config` - 调度配置
    pub fn new(
        prober: Arc<dyn Prober>,
        registry: Arc<dyn TargetRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let status = SchedulerStatus {
            check_interval_seconds: config.check_interval.as_secs(),
            ..Default::default()
        };

        Self {
            prober,
            registry,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_checks.max(1))),
            config,
            status: Arc::new(RwLock::new(status)),
            task: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// 执行一个完整的检测周期
    ///
    /// 每个目标在独立任务中探测，受信号量限制并发；所有任务结束后周期才算完成。
    /// 单个目标的失败不会影响其他目标。只有读取目标列表失败时返回错误。
    pub async fn run_check_cycle(&self) -> std::result::Result<CycleReport, RegistryError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let targets = self.registry.list_all_targets().await?;
        info!(%cycle_id, targets = targets.len(), "开始检测周期");

        let mut target_ids: Vec<TargetId> = Vec::with_capacity(targets.len());
        let mut handles: Vec<JoinHandle<RecordedCheck>> = Vec::with_capacity(targets.len());

        for target in targets {
            let prober = Arc::clone(&self.prober);
            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&self.semaphore);
            let deadline = self.config.probe_deadline;
            let span = info_span!("check", %cycle_id, target_id = target.id);

            target_ids.push(target.id);
            handles.push(tokio::spawn(
                async move {
                    // 信号量不会被关闭，获取失败时也照常检测
                    let _permit = semaphore.acquire_owned().await;
                    check_and_record(prober.as_ref(), registry.as_ref(), &target, deadline).await
                }
                .instrument(span),
            ));
        }

        let results = join_all(handles).await;

        let mut report = CycleReport {
            cycle_id,
            started_at,
            duration_ms: 0,
            total_targets: target_ids.len(),
            online: 0,
            offline: 0,
            persist_failures: 0,
        };

        for (target_id, result) in target_ids.into_iter().zip(results) {
            let recorded = match result {
                Ok(recorded) => recorded,
                Err(join_error) => {
                    error!(%cycle_id, target_id, "检测任务异常终止: {}", join_error);
                    let outcome = CheckOutcome::offline(
                        ProbeStage::Primary,
                        format!("检测任务异常终止: {join_error}"),
                    );
                    let persisted = persist(self.registry.as_ref(), target_id, &outcome).await;
                    RecordedCheck { outcome, persisted }
                }
            };

            if recorded.outcome.success {
                report.online += 1;
            } else {
                report.offline += 1;
            }
            if !recorded.persisted {
                report.persist_failures += 1;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            %cycle_id,
            total = report.total_targets,
            online = report.online,
            offline = report.offline,
            persist_failures = report.persist_failures,
            duration_ms = report.duration_ms,
            "检测周期完成"
        );

        {
            let mut status = self.status.write().await;
            status.cycles_completed += 1;
            status.last_cycle = Some(report.clone());
        }

        Ok(report)
    }

    /// 检测单个目标并写回结果，不占用周期的并发许可
    pub async fn run_single_check(&self, target: &MonitoredTarget) -> CheckOutcome {
        let span = info_span!("manual_check", target_id = target.id);
        check_and_record(
            self.prober.as_ref(),
            self.registry.as_ref(),
            target,
            self.config.probe_deadline,
        )
        .instrument(span)
        .await
        .outcome
    }

    /// 按ID触发一次按需检测
    ///
    /// 目标不存在时返回 `CheckError::UnknownTarget`，不会发起网络请求或写入。
    pub async fn trigger_single_check(
        &self,
        id: TargetId,
    ) -> std::result::Result<CheckOutcome, CheckError> {
        let target = self
            .registry
            .get_target(id)
            .await?
            .ok_or(CheckError::UnknownTarget { id })?;

        info!(target_id = id, name = %target.name, "执行按需检测");
        Ok(self.run_single_check(&target).await)
    }

    /// 启动周期调度：立即执行一次，之后按间隔执行
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(GatewayVitalsError::Other(anyhow::anyhow!("检测调度器已在运行")));
        }
        if self.config.check_interval.is_zero() {
            return Err(GatewayVitalsError::Other(anyhow::anyhow!("检测间隔不能为0")));
        }

        info!(
            "启动检测调度器，间隔: {}秒，最大并发: {}",
            self.config.check_interval.as_secs(),
            self.config.max_concurrent_checks
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(self);
        self.status.write().await.is_running = true;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(scheduler.config.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("检测调度器收到停止信号");
                        break;
                    }
                    _ = ticker.tick() => {
                        // 周期一旦开始就执行到底，停止信号在周期之间检查
                        if let Err(e) = scheduler.run_check_cycle().await {
                            error!("检测周期失败: {}", e);
                        }
                    }
                }
            }

            scheduler.status.write().await.is_running = false;
            info!("检测调度器已停止");
        }));

        Ok(())
    }

    /// 停止周期调度，等待进行中的周期结束
    pub async fn stop(&self) -> Result<()> {
        let handle = self.task.lock().await.take();
        let Some(handle) = handle else {
            debug!("检测调度器未运行");
            return Ok(());
        };

        info!("停止检测调度器");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = handle.await {
            warn!("检测调度任务异常结束: {}", e);
        }
        self.status.write().await.is_running = false;
        Ok(())
    }

    /// 获取调度器状态
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }
}

/// 探测单个目标并写入注册表
async fn check_and_record(
    prober: &dyn Prober,
    registry: &dyn TargetRegistry,
    target: &MonitoredTarget,
    deadline: Duration,
) -> RecordedCheck {
    let outcome = match timeout(deadline, prober.probe(target)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(target_id = target.id, "目标无法探测: {}", e);
            CheckOutcome::offline(ProbeStage::Primary, e.to_string())
        }
        Err(_) => {
            warn!(target_id = target.id, "探测超过期限 {:?}", deadline);
            CheckOutcome::offline(ProbeStage::Primary, "Check deadline exceeded")
                .with_response_time(deadline)
        }
    };

    if outcome.success {
        debug!(
            target_id = target.id,
            connection_status = outcome.connection_status.as_deref().unwrap_or("-"),
            response_time_ms = outcome.response_time_ms(),
            "目标在线"
        );
    } else {
        warn!(
            target_id = target.id,
            endpoint = %target.endpoint,
            "目标离线: {}",
            outcome.error_message.as_deref().unwrap_or("N/A")
        );
    }

    let persisted = persist(registry, target.id, &outcome).await;
    RecordedCheck { outcome, persisted }
}

/// 写入最新状态和检测日志，两次写入互不依赖，失败只记录日志
async fn persist(registry: &dyn TargetRegistry, target_id: TargetId, outcome: &CheckOutcome) -> bool {
    let mut persisted = true;

    if let Err(e) = registry
        .write_latest_status(
            target_id,
            outcome.status,
            outcome.checked_at,
            outcome.connection_status.as_deref(),
        )
        .await
    {
        error!(target_id, "写入最新状态失败: {}", e);
        persisted = false;
    }

    if let Err(e) = registry.append_check_log(target_id, outcome).await {
        error!(target_id, "追加检测日志失败: {}", e);
        persisted = false;
    }

    persisted
}
