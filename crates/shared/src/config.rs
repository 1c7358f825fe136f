//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 曝光池配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 池文件路径，命令行参数优先
    pub path: Option<String>,
    /// 关联名中附带的版本戳
    pub version_id: Option<String>,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 每个关联写一个 JSON 文件
    #[default]
    Json,
    /// 打印人类可读的摘要
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "summary" => Ok(Self::Summary),
            other => Err(format!("未知的输出格式: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// 输出配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            format: OutputFormat::Json,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 额外的规则定义文件（JSON）
    pub rules_file: Option<String>,
    /// 收尾后是否校验关联
    pub validate: bool,
    /// 是否执行收尾（丢弃无效关联并合并同类型关联）
    pub finalize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_file: None,
            validate: true,
            finalize: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（工具特定配置）
    /// 4. 环境变量（ASN_ 前缀，层级用双下划线分隔，如 ASN_OUTPUT__DIR -> output.dir）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(service_name, Path::new(&config_dir))
    }

    /// 从指定目录加载配置
    pub fn load_from(service_name: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("ASN_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // 默认配置
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            // 加载默认配置文件
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            // 加载工具特定配置（如 asn-generate.toml）
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 环境变量覆盖（ASN_POOL__VERSION_ID -> pool.version_id）
            .add_source(
                Environment::with_prefix("ASN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
