//! 曝光记录
//!
//! 从池文件解析出的单条曝光记录，字段名统一为小写。引擎只读取记录，不会修改。

use crate::error::{AsnError, Result};
use serde_json::{Map, Value};

/// 表示"未指定"的字段值（比较时忽略大小写）
pub const INVALID_VALUES: &[&str] = &["", "null", "none", "--", "n/a"];

/// 曝光记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureRecord {
    fields: Map<String, Value>,
    /// 来源池文件路径
    pool_file: Option<String>,
}

impl ExposureRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            fields,
            pool_file: None,
        }
    }

    /// 从 JSON 对象创建
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(AsnError::InvalidRecord(format!(
                "记录必须是 JSON 对象, 实际为: {}",
                other
            ))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// 设置来源池文件
    pub fn with_pool_file(mut self, pool_file: impl Into<String>) -> Self {
        self.pool_file = Some(pool_file.into());
        self
    }

    pub fn pool_file(&self) -> Option<&str> {
        self.pool_file.as_deref()
    }

    /// 获取原始字段值
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(&name.to_lowercase())
    }

    /// 获取有效的字段文本值，无效值视为不存在
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get_field(name).and_then(value_to_text)
    }

    /// 字段是否存在且为有效值
    pub fn has_valid(&self, name: &str) -> bool {
        self.get_str(name).is_some()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// 按顺序探测到的第一个有效字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundField {
    pub field: String,
    pub value: String,
}

/// 按列出的顺序探测字段，返回第一个存在且有效的字段
pub fn first_present<S: AsRef<str>>(record: &ExposureRecord, names: &[S]) -> Option<FoundField> {
    names.iter().find_map(|name| {
        let name = name.as_ref();
        record.get_str(name).map(|value| FoundField {
            field: name.to_lowercase(),
            value,
        })
    })
}

/// 判断是否为表示"未指定"的值
pub fn is_invalid_value(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    INVALID_VALUES.contains(&value.as_str())
}

/// 将 JSON 值转换为比较用的文本，null 和无效值返回 None
fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if is_invalid_value(&text) {
        None
    } else {
        Some(text)
    }
}
