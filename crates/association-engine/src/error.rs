//! 关联引擎错误类型
//!
//! 约束不匹配属于正常控制流，不在这里建模，见 `constraint::ConstraintOutcome`。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsnError {
    #[error("规则解析失败: {0}")]
    RuleParse(String),

    #[error("规则编译失败: {0}")]
    RuleCompile(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("无效的曝光记录: {0}")]
    InvalidRecord(String),

    #[error("关联无效: {asn_name} - {reason}")]
    AssociationNotValid { asn_name: String, reason: String },

    #[error("关联文档不符合 schema: {asn_name} - {reason}")]
    SchemaViolation { asn_name: String, reason: String },

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AsnError>;

impl AsnError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::RuleParse(_) => "RULE_PARSE_FAILED",
            Self::RuleCompile(_) => "RULE_COMPILE_FAILED",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::InvalidRecord(_) => "INVALID_RECORD",
            Self::AssociationNotValid { .. } => "ASSOCIATION_NOT_VALID",
            Self::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            Self::Json(_) => "JSON_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// 是否为单个关联级别的失败（不影响整批处理）
    pub fn is_association_failure(&self) -> bool {
        matches!(
            self,
            Self::AssociationNotValid { .. } | Self::SchemaViolation { .. }
        )
    }
}
