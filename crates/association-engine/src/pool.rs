//! 曝光池加载
//!
//! 池文件为 JSON，可以是记录数组，也可以是 `{"pool_file": ..., "records": [...]}`。
//! 数组形式没有声明来源时，以读取路径作为每条记录的池文件。

use crate::error::{AsnError, Result};
use crate::record::ExposureRecord;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoolDocument {
    Records(Vec<Value>),
    Tagged {
        pool_file: Option<String>,
        records: Vec<Value>,
    },
}

/// 从 JSON 文本解析曝光池
///
/// `default_pool_file` 在文档本身未声明池文件时使用。
pub fn parse_pool(json: &str, default_pool_file: Option<&str>) -> Result<Vec<ExposureRecord>> {
    let document: PoolDocument = serde_json::from_str(json)?;

    let (pool_file, values) = match document {
        PoolDocument::Records(values) => (default_pool_file.map(str::to_string), values),
        PoolDocument::Tagged { pool_file, records } => (
            pool_file.or_else(|| default_pool_file.map(str::to_string)),
            records,
        ),
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let record = ExposureRecord::from_value(value)
                .map_err(|e| AsnError::InvalidRecord(format!("池记录 #{}: {}", i, e)))?;
            Ok(match &pool_file {
                Some(path) => record.with_pool_file(path.clone()),
                None => record,
            })
        })
        .collect()
}

/// 读取池文件
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_pool(path: impl AsRef<Path>) -> Result<Vec<ExposureRecord>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let records = parse_pool(&json, Some(&path.to_string_lossy()))?;

    info!("曝光池已加载: {} 条记录", records.len());
    Ok(records)
}
