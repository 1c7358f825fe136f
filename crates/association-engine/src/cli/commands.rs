//! CLI 参数定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use asn_shared::config::OutputFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// 关联生成工具
///
/// 读取 JSON 曝光池，按规则把曝光记录聚合为关联。
#[derive(Parser, Debug)]
#[command(name = "asn-generate")]
#[command(version, about = "曝光关联生成工具")]
pub struct Cli {
    /// 曝光池文件（JSON），缺省时使用配置中的 pool.path
    pub pool: Option<PathBuf>,

    /// 额外的规则定义文件（JSON 对象或数组）
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// 关联名中的版本戳；只给出开关时按当前 UTC 时间生成
    #[arg(long, num_args = 0..=1, value_name = "STAMP")]
    pub version_id: Option<Option<String>>,

    /// 输出目录
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// 输出格式
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// 跳过有效性和文档结构校验
    #[arg(long)]
    pub no_validate: bool,

    /// 跳过收尾（不丢弃无效关联，不合并同类型关联）
    #[arg(long)]
    pub no_finalize: bool,

    /// 只生成不写文件
    #[arg(long)]
    pub dry_run: bool,

    /// 日志级别 (trace, debug, info, warn, error)，优先于配置
    #[arg(short, long)]
    pub log_level: Option<String>,
}

/// 命令行可选的输出格式
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Summary,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Summary => OutputFormat::Summary,
        }
    }
}
