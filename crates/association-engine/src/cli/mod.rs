//! CLI 模块
//!
//! `asn-generate` 读取曝光池，按内置及自定义规则生成关联并写出结果。
//!
//! # 使用示例
//!
//! ```bash
//! # 生成关联并写入当前目录
//! asn-generate pools/jw99009_pool.json
//!
//! # 附带自动生成的版本戳，写入指定目录
//! asn-generate pools/jw99009_pool.json --version-id -o out
//!
//! # 加载额外规则，只打印摘要
//! asn-generate pools/jw99009_pool.json --rules rules.json --format summary
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, FormatArg};
pub use runner::{CommandRunner, RunOptions, RunOutcome};
