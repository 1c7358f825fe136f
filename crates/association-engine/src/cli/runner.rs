//! 命令执行器
//!
//! 把命令行参数与配置合并为运行选项，执行生成并写出结果。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use asn_shared::config::{AppConfig, OutputFormat};
use chrono::Utc;
use tracing::{info, warn};

use crate::association::Association;
use crate::generator::{GenerateReport, Generator};
use crate::naming::version_stamp;
use crate::pool::load_pool;
use crate::registry::RuleRegistry;

use super::commands::Cli;

/// 合并命令行与配置后的运行选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub pool: PathBuf,
    pub rules: Option<PathBuf>,
    pub version_id: Option<String>,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub validate: bool,
    pub finalize: bool,
    pub dry_run: bool,
}

impl RunOptions {
    /// 命令行参数优先于配置
    pub fn resolve(cli: &Cli, config: &AppConfig) -> Result<Self> {
        let pool = cli
            .pool
            .clone()
            .or_else(|| config.pool.path.as_ref().map(PathBuf::from))
            .context("未指定曝光池文件（命令行参数或 pool.path 配置）")?;

        let version_id = match &cli.version_id {
            Some(Some(stamp)) => Some(stamp.clone()),
            Some(None) => Some(version_stamp(Utc::now())),
            None => config.pool.version_id.clone(),
        };

        Ok(Self {
            pool,
            rules: cli
                .rules
                .clone()
                .or_else(|| config.engine.rules_file.as_ref().map(PathBuf::from)),
            version_id,
            output_dir: cli
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.output.dir)),
            format: cli.format.map(Into::into).unwrap_or(config.output.format),
            validate: config.engine.validate && !cli.no_validate,
            finalize: config.engine.finalize && !cli.no_finalize,
            dry_run: cli.dry_run,
        })
    }
}

/// 一次运行的结果
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub associations: usize,
    pub failures: usize,
    /// 写出的关联文件
    pub written: Vec<PathBuf>,
}

/// 命令执行器
pub struct CommandRunner {
    options: RunOptions,
}

impl CommandRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// 构建规则注册表：内置 level-2b 规则，加上规则文件中的定义
    pub fn build_registry(&self) -> Result<RuleRegistry> {
        let mut registry = RuleRegistry::level2b()?;

        if let Some(path) = &self.options.rules {
            let json = fs::read_to_string(path)
                .with_context(|| format!("无法读取规则文件 {}", path.display()))?;
            let loaded = registry.load_from_json(&json)?;
            info!(rules = ?loaded, "已加载自定义规则");
        }

        Ok(registry)
    }

    /// 执行生成
    pub fn run(&self) -> Result<RunOutcome> {
        let options = &self.options;
        info!(pool = %options.pool.display(), "开始生成关联");

        let registry = self.build_registry()?;
        let records = load_pool(&options.pool)
            .with_context(|| format!("无法加载曝光池 {}", options.pool.display()))?;

        let mut generator = Generator::new(registry)
            .with_version_id(options.version_id.clone())
            .with_validation(options.validate)
            .with_finalize(options.finalize);
        let report = generator.run(&records)?;

        for failure in &report.failures {
            warn!(
                asn_name = %failure.asn_name,
                asn_type = %failure.asn_type,
                code = %failure.code,
                "{}",
                failure.reason
            );
        }

        let written = if options.dry_run {
            info!("dry-run 模式，不写出结果");
            Vec::new()
        } else {
            self.write_output(&report)?
        };

        info!(
            "生成完成: {} 条记录, {} 个关联, {} 个校验失败",
            report.records_processed,
            report.associations.len(),
            report.failures.len()
        );

        Ok(RunOutcome {
            associations: report.associations.len(),
            failures: report.failures.len(),
            written,
        })
    }

    fn write_output(&self, report: &GenerateReport) -> Result<Vec<PathBuf>> {
        match self.options.format {
            OutputFormat::Summary => {
                for asn in &report.associations {
                    println!("{}", asn.summary());
                }
                Ok(Vec::new())
            }
            OutputFormat::Json => {
                fs::create_dir_all(&self.options.output_dir).with_context(|| {
                    format!("无法创建输出目录 {}", self.options.output_dir.display())
                })?;
                report
                    .associations
                    .iter()
                    .map(|asn| write_association(&self.options.output_dir, asn))
                    .collect()
            }
        }
    }
}

/// 把关联文档写为 `<asn_name>.json`
pub fn write_association(dir: &Path, asn: &Association) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", asn.asn_name()));
    let json = serde_json::to_string_pretty(&asn.to_document())?;
    fs::write(&path, json).with_context(|| format!("无法写出 {}", path.display()))?;
    Ok(path)
}
