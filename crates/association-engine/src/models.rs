//! 关联领域模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 关联成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub expname: String,
    pub exptype: String,
}

impl Member {
    pub fn new(expname: impl Into<String>, exptype: impl Into<String>) -> Self {
        Self {
            expname: expname.into(),
            exptype: exptype.into(),
        }
    }

    /// 成员唯一键
    pub fn key(&self) -> &str {
        &self.expname
    }
}

/// 产品：关联内的一个具名成员分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub members: Vec<Member>,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// 指定曝光类型的成员（忽略大小写）
    pub fn members_by_type(&self, member_type: &str) -> Vec<&Member> {
        let member_type = member_type.to_lowercase();
        self.members
            .iter()
            .filter(|m| m.exptype.to_lowercase() == member_type)
            .collect()
    }
}

/// 有效性检查：只需观察到一个满足条件的成员，一旦通过不再撤销
#[derive(Clone)]
pub struct ValidityCheck {
    pub validated: bool,
    pub check: fn(&Member) -> bool,
}

impl ValidityCheck {
    pub fn new(check: fn(&Member) -> bool) -> Self {
        Self {
            validated: false,
            check,
        }
    }

    /// 针对新加入的成员更新检查状态
    pub fn observe(&mut self, member: &Member) {
        if !self.validated {
            self.validated = (self.check)(member);
        }
    }
}

impl fmt::Debug for ValidityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidityCheck")
            .field("validated", &self.validated)
            .finish_non_exhaustive()
    }
}

/// has_science 检查：出现过科学成员
pub fn is_science(member: &Member) -> bool {
    member.exptype == "science"
}

/// 关联候选标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acid {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Acid {
    /// 解析 `(o001, observation)` 形式的候选值，其他值视为 discovered
    pub fn from_value(value: &str) -> Option<Self> {
        let trimmed = value.trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')')
        });
        if trimmed.is_empty() {
            return None;
        }

        let parts: Vec<String> = trimmed
            .split(',')
            .map(|p| p.trim().trim_matches(|c| c == '\'' || c == '"').to_lowercase())
            .collect();

        match parts.as_slice() {
            [id, kind] if !id.is_empty() && !kind.is_empty() => Some(Self {
                id: id.clone(),
                kind: kind.clone(),
            }),
            _ => Some(Self {
                id: trimmed.to_lowercase(),
                kind: "discovered".to_string(),
            }),
        }
    }

    /// 没有候选约束值时，按序号生成
    pub fn discovered(sequence: u32) -> Self {
        Self {
            id: format!("a{:04}", sequence),
            kind: "discovered".to_string(),
        }
    }
}

/// 关联的持久化文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDocument {
    pub asn_type: String,
    pub asn_rule: String,
    pub asn_id: String,
    pub program: String,
    pub target: String,
    pub asn_pool: String,
    pub constraints: String,
    pub products: Vec<Product>,
}
