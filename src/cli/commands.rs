//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, ConfigTemplate, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::error::Result;
use crate::health::{CheckOutcome, HttpProbe, Prober};
use crate::registry::MonitoredTarget;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init {
            config_path,
            force,
            template,
        } = &args.command
        {
            self.create_config_file(config_path, *force, *template).await?;
        }
        Ok(())
    }
}

impl InitCommand {
    /// 按模板创建配置文件
    ///
    /// # 返回
    /// * `Result<bool>` - 是否实际写入了文件
    pub async fn create_config_file(
        &self,
        config_path: &Path,
        force: bool,
        template: ConfigTemplate,
    ) -> Result<bool> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(false);
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, Self::template_content(template)).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加网关目标");

        Ok(true)
    }

    /// 模板内容
    pub fn template_content(template: ConfigTemplate) -> &'static str {
        match template {
            ConfigTemplate::Minimal => include_str!("../../configs/minimal_config.toml"),
            ConfigTemplate::Basic => include_str!("../../configs/basic_config.toml"),
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            self.validate_config_file(&config_file, *verbose).await?;
        }
        Ok(())
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<Config> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  检测间隔: {}分钟", config.global.check_interval_minutes);
            println!("  最大并发: {}", config.global.max_concurrent_checks);
            println!("  日志级别: {}", config.global.log_level);
            match &config.global.log_file {
                Some(path) => println!("  日志文件: {}", path.display()),
                None => println!("  日志文件: 未启用"),
            }
            println!("  日志保留: {}条", config.global.max_log_entries);
            match &config.global.state_file {
                Some(path) => println!("  快照文件: {}", path.display()),
                None => println!("  快照文件: 未启用"),
            }
            match &config.global.web {
                Some(web) if web.enabled => {
                    println!("  Web API: {}:{}", web.bind_address, web.port)
                }
                _ => println!("  Web API: 未启用"),
            }

            println!("初始目标:");
            for (i, target) in config.targets.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, target.name, target.endpoint);
                if let Some(description) = &target.description {
                    println!("     描述: {description}");
                }
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个初始目标", config.targets.len());
        }

        Ok(config)
    }
}

/// 一次性检测的单行结果
#[derive(Debug, Serialize)]
struct CheckReportRow {
    name: String,
    endpoint: String,
    #[serde(flatten)]
    outcome: CheckOutcome,
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { target, format } = &args.command {
            let loader = TomlConfigLoader::new(true);
            let config = loader.load_from_file(args.get_config_path()).await?;
            let probe = HttpProbe::new()?;
            self.run(&probe, &config, target.as_deref(), *format).await?;
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 检测配置中的目标并输出结果，不写入注册表
    async fn run(
        &self,
        prober: &dyn Prober,
        config: &Config,
        target_name: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let targets = Self::select_targets(config, target_name);

        if targets.is_empty() {
            match target_name {
                Some(name) => eprintln!("未找到名为 '{name}' 的目标"),
                None => eprintln!("配置文件中没有任何目标"),
            }
            return Ok(());
        }

        if format != OutputFormat::Json {
            println!("开始检测 {} 个目标...", targets.len());
        }

        let rows = Self::probe_all(prober, targets).await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            OutputFormat::Table => Self::print_table(&rows),
            OutputFormat::Text => Self::print_text(&rows),
        }

        Ok(())
    }

    /// 按名称筛选目标，编号按配置顺序从1开始
    fn select_targets(config: &Config, target_name: Option<&str>) -> Vec<MonitoredTarget> {
        config
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| target_name.is_none_or(|name| t.name == name))
            .map(|(index, t)| MonitoredTarget {
                id: index as i64 + 1,
                name: t.name.clone(),
                endpoint: t.endpoint.clone(),
                token: t.token.clone(),
                description: t.description.clone(),
            })
            .collect()
    }

    async fn probe_all(prober: &dyn Prober, targets: Vec<MonitoredTarget>) -> Vec<CheckReportRow> {
        let outcomes = join_all(targets.iter().map(|target| async move {
            prober.probe(target).await.unwrap_or_else(|e| {
                CheckOutcome::offline(crate::health::ProbeStage::Primary, e.to_string())
            })
        }))
        .await;

        targets
            .into_iter()
            .zip(outcomes)
            .map(|(target, outcome)| CheckReportRow {
                name: target.name,
                endpoint: target.endpoint,
                outcome,
            })
            .collect()
    }

    fn print_text(rows: &[CheckReportRow]) {
        for row in rows {
            let icon = if row.outcome.success { "✓" } else { "✗" };
            println!(
                "{} {} ({}) - {} - {}ms",
                icon,
                row.name,
                row.endpoint,
                row.outcome.status,
                row.outcome.response_time_ms()
            );
            if let Some(connection_status) = &row.outcome.connection_status {
                println!("  连接状态: {connection_status}");
            }
            if let Some(error) = &row.outcome.error_message {
                println!("  错误: {error}");
            }
        }
    }

    fn print_table(rows: &[CheckReportRow]) {
        println!(
            "{:<20} {:<10} {:<15} {:<10} {:<30}",
            "目标名称", "状态", "连接状态", "响应时间", "错误信息"
        );
        println!("{}", "-".repeat(85));

        for row in rows {
            println!(
                "{:<20} {:<10} {:<15} {:<10} {:<30}",
                row.name,
                row.outcome.status,
                row.outcome.connection_status.as_deref().unwrap_or("N/A"),
                format!("{}ms", row.outcome.response_time_ms()),
                row.outcome.error_message.as_deref().unwrap_or("")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::registry::NewTarget;

    fn config_with(names: &[&str]) -> Config {
        Config {
            global: GlobalConfig::default(),
            targets: names
                .iter()
                .map(|name| NewTarget {
                    name: name.to_string(),
                    endpoint: format!("https://{name}.example.com"),
                    token: "tok".to_string(),
                    description: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_select_targets() {
        let config = config_with(&["a", "b", "c"]);

        let all = CheckCommand::select_targets(&config, None);
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let one = CheckCommand::select_targets(&config, Some("b"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, 2);

        assert!(CheckCommand::select_targets(&config, Some("zzz")).is_empty());
    }

    #[tokio::test]
    async fn test_check_against_mock_gateway() {
        let mut server = mockito::Server::new_async().await;
        let _status = server
            .mock("GET", "/api/v1/qr/status")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"connectionStatus":"connected"}}"#)
            .create_async()
            .await;

        let config = Config {
            global: GlobalConfig::default(),
            targets: vec![NewTarget {
                name: "mock".to_string(),
                endpoint: server.url(),
                token: "tok".to_string(),
                description: None,
            }],
        };

        let probe = HttpProbe::new().unwrap();
        let targets = CheckCommand::select_targets(&config, None);
        let rows = CheckCommand::probe_all(&probe, targets).await;

        assert_eq!(rows.len(), 1);
        assert!(rows[0].outcome.success);
        assert_eq!(rows[0].outcome.connection_status.as_deref(), Some("connected"));

        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["name"], "mock");
        assert_eq!(json[0]["status"], "online");
    }

    #[tokio::test]
    async fn test_init_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = InitCommand
            .create_config_file(&path, false, ConfigTemplate::Minimal)
            .await
            .unwrap();
        assert!(written);

        let written = InitCommand
            .create_config_file(&path, false, ConfigTemplate::Basic)
            .await
            .unwrap();
        assert!(!written);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, InitCommand::template_content(ConfigTemplate::Minimal));

        let written = InitCommand
            .create_config_file(&path, true, ConfigTemplate::Basic)
            .await
            .unwrap();
        assert!(written);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("[[targets]]"));
    }

    #[tokio::test]
    async fn test_validate_reports_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, InitCommand::template_content(ConfigTemplate::Minimal))
            .await
            .unwrap();

        let config = ValidateCommand
            .validate_config_file(&path, true)
            .await
            .unwrap();
        assert!(config.targets.is_empty());
        assert_eq!(config.global.web.unwrap().port, 3000);
    }
}
