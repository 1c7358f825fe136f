//! 关联文档校验
//!
//! 生成器只依赖 `SchemaValidator` 接口，具体的文档形状由实现决定。

use crate::error::{AsnError, Result};
use crate::models::AssociationDocument;

/// 关联文档校验接口
#[cfg_attr(test, mockall::automock)]
pub trait SchemaValidator {
    /// 校验持久化文档，`asn_name` 用于错误信息
    fn validate(&self, asn_name: &str, doc: &AssociationDocument) -> Result<()>;
}

/// level-2b 关联文档的结构校验
#[derive(Debug, Clone, Copy, Default)]
pub struct Level2bSchema;

impl SchemaValidator for Level2bSchema {
    fn validate(&self, asn_name: &str, doc: &AssociationDocument) -> Result<()> {
        let violation = |reason: String| AsnError::SchemaViolation {
            asn_name: asn_name.to_string(),
            reason,
        };

        for (key, value) in [
            ("asn_type", &doc.asn_type),
            ("asn_rule", &doc.asn_rule),
            ("program", &doc.program),
        ] {
            if value.trim().is_empty() {
                return Err(violation(format!("'{}' 不能为空", key)));
            }
        }

        if doc.products.is_empty() {
            return Err(violation("至少需要一个产品".to_string()));
        }

        for (i, product) in doc.products.iter().enumerate() {
            if product.name.trim().is_empty() {
                return Err(violation(format!("products[{}] 缺少名称", i)));
            }
            if product.members.is_empty() {
                return Err(violation(format!("产品 '{}' 没有成员", product.name)));
            }
            for (j, member) in product.members.iter().enumerate() {
                if member.expname.trim().is_empty() || member.exptype.trim().is_empty() {
                    return Err(violation(format!(
                        "产品 '{}' 的 members[{}] 缺少 expname 或 exptype",
                        product.name, j
                    )));
                }
            }
        }

        Ok(())
    }
}
