//! Gateway Vitals 主程序入口
//!
//! WhatsApp 网关连接状态监控

use anyhow::{Context, Result};
use clap::Parser;
use gateway_vitals::cli::args::{Args, Commands};
use gateway_vitals::cli::commands::{
    CheckCommand, Command, InitCommand, ValidateCommand, VersionCommand,
};
use gateway_vitals::config::{self, ConfigLoader, GlobalConfig, TomlConfigLoader};
use gateway_vitals::health::{CheckScheduler, HttpProbe, SchedulerConfig};
use gateway_vitals::logging::LoggingSystem;
use gateway_vitals::registry::InMemoryRegistry;
use gateway_vitals::web::{WebAppState, WebServer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 快照保存间隔
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let result = match &args.command {
        Commands::Start { .. } => run_start(&args).await,
        _ => {
            init_logging(&args, None)?;
            execute_command(&args).await
        }
    };

    if let Err(e) = result {
        error!("命令执行失败: {:#}", e);
        eprintln!("错误: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// 初始化日志，命令行参数优先于配置文件
fn init_logging(args: &Args, global: Option<&GlobalConfig>) -> Result<LoggingSystem> {
    LoggingSystem::setup_logging(args.log_config(global)).context("初始化日志系统失败")
}

/// 执行非 start 的CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
        Commands::Start { .. } => return run_start(args).await,
    };
    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}

/// 服务组件集合
struct ServiceComponents {
    /// 注册表
    registry: Arc<InMemoryRegistry>,
    /// 检测调度器
    scheduler: Arc<CheckScheduler>,
}

/// 前台运行检测服务，直到收到 Ctrl+C 或 SIGTERM
async fn run_start(args: &Args) -> Result<()> {
    // 1. 加载配置并应用命令行覆盖
    let config = load_and_validate_config(args).await?;
    let _logging = init_logging(args, Some(&config.global))?;
    info!("Gateway Vitals v{} 启动", gateway_vitals::VERSION);

    // 2. 初始化核心组件
    let components = initialize_service_components(&config).await?;

    // 3. 停止信号
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
    spawn_signal_listener(shutdown_tx.clone());

    // 4. Web API
    let web_handle = start_web_server_if_enabled(&config, &components, &shutdown_tx);

    // 5. 快照保存任务
    let snapshot_handle = config.global.state_file.clone().map(|path| {
        spawn_snapshot_task(components.registry.clone(), path, shutdown_tx.subscribe())
    });

    // 6. 启动调度器
    components
        .scheduler
        .start()
        .await
        .context("启动检测调度器失败")?;
    info!("检测服务已启动");

    // 7. 等待停止信号并清理
    if let Err(e) = shutdown_rx.recv().await {
        warn!("等待停止信号失败: {}", e);
    }
    info!("正在停止服务...");

    components
        .scheduler
        .stop()
        .await
        .context("停止检测调度器失败")?;

    if let Some(handle) = web_handle {
        if let Err(e) = handle.await {
            warn!("Web API 任务异常结束: {}", e);
        }
    }
    if let Some(handle) = snapshot_handle {
        if let Err(e) = handle.await {
            warn!("快照任务异常结束: {}", e);
        }
    }
    // 调度器停止后再保存，保证最后一个周期的结果落盘
    if let Some(path) = &config.global.state_file {
        save_snapshot(&components.registry, path).await;
        info!("注册表快照已保存: {}", path.display());
    }

    info!("服务已停止");
    Ok(())
}

/// 加载配置文件，应用命令行覆盖后重新验证
async fn load_and_validate_config(args: &Args) -> Result<config::Config> {
    let config_path = args.get_config_path();
    let loader = TomlConfigLoader::new(true);

    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "配置文件不存在: {}\n提示：请运行 'gateway-vitals init' 创建默认配置文件",
            config_path.display()
        ));
    }

    let mut config = loader
        .load_from_file(&config_path)
        .await
        .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?;

    args.apply_overrides(&mut config);
    loader.validate(&config).context("命令行参数覆盖后配置无效")?;

    Ok(config)
}

/// 恢复或创建注册表，并组装探测器和调度器
async fn initialize_service_components(config: &config::Config) -> Result<ServiceComponents> {
    let max_log_entries = config.global.max_log_entries;

    let registry = match &config.global.state_file {
        Some(path) if path.exists() => InMemoryRegistry::load_from_file(path, max_log_entries)
            .await
            .context("恢复注册表快照失败")?,
        _ => InMemoryRegistry::new(max_log_entries),
    };
    let registry = Arc::new(registry);

    let seeded = registry
        .seed_if_empty(&config.targets)
        .await
        .context("导入初始目标失败")?;
    if seeded > 0 {
        info!("已从配置文件导入 {} 个目标", seeded);
    }

    let probe = Arc::new(HttpProbe::new().context("创建HTTP探测器失败")?);
    let scheduler = Arc::new(CheckScheduler::new(
        probe,
        registry.clone(),
        SchedulerConfig::from_minutes(
            config.global.check_interval_minutes,
            config.global.max_concurrent_checks,
        ),
    ));

    Ok(ServiceComponents {
        registry,
        scheduler,
    })
}

/// 监听 Ctrl+C 和 SIGTERM
fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("监听中断信号失败: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("监听SIGTERM失败: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("收到中断信号"),
            _ = terminate => info!("收到SIGTERM信号"),
        }
        let _ = shutdown_tx.send(());
    });
}

/// 启动 Web API（如果启用）
fn start_web_server_if_enabled(
    config: &config::Config,
    components: &ServiceComponents,
    shutdown_tx: &broadcast::Sender<()>,
) -> Option<JoinHandle<()>> {
    let web_config = match &config.global.web {
        Some(web_config) if web_config.enabled => web_config.clone(),
        Some(_) => {
            info!("Web API 已禁用");
            return None;
        }
        None => {
            info!("Web API 未配置");
            return None;
        }
    };

    let state = WebAppState::new(components.registry.clone(), components.scheduler.clone());
    let server = WebServer::new(web_config, state);
    let shutdown_rx = shutdown_tx.subscribe();

    Some(tokio::spawn(async move {
        if let Err(e) = server.start(shutdown_rx).await {
            error!("Web API 启动失败: {}", e);
        }
    }))
}

/// 定期保存注册表快照，收到停止信号后退出
fn spawn_snapshot_task(
    registry: Arc<InMemoryRegistry>,
    path: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
        // 第一次 tick 立即返回
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => save_snapshot(&registry, &path).await,
                _ = shutdown_rx.recv() => break,
            }
        }

    })
}

async fn save_snapshot(registry: &InMemoryRegistry, path: &Path) {
    if let Err(e) = registry.save_to_file(path).await {
        warn!("保存注册表快照失败: {}", e);
    }
}
