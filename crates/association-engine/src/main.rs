//! 关联生成工具
//!
//! 读取曝光池，生成关联并写出 JSON 文档或摘要。

use anyhow::Result;
use asn_engine::cli::{Cli, CommandRunner, RunOptions};
use asn_shared::config::AppConfig;
use asn_shared::observability;
use clap::Parser;
use tracing::info;

const SERVICE_NAME: &str = "asn-generate";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            ..AppConfig::default()
        }
    });

    // 命令行日志级别优先于配置
    let mut obs_config = config.observability.clone().with_service_name(&config.service_name);
    if let Some(level) = &cli.log_level {
        obs_config.log_level = level.clone();
    }
    let _guard = observability::init(&obs_config)?;

    info!(environment = %config.environment, "Starting {}", SERVICE_NAME);

    let options = RunOptions::resolve(&cli, &config)?;
    let outcome = CommandRunner::new(options).run()?;

    info!(
        associations = outcome.associations,
        failures = outcome.failures,
        written = outcome.written.len(),
        "{} finished",
        SERVICE_NAME
    );

    Ok(())
}
