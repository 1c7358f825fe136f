//! 曝光关联引擎
//!
//! 按声明式约束把曝光记录聚合为关联，支持：
//! - JSON 规则定义与可复用约束包
//! - 约束匹配与值固定
//! - 产品命名与有效性跟踪
//! - 同类型关联的收尾合并
//! - 关联文档的结构校验
//! - `asn-generate` 命令行工具

pub mod association;
pub mod cli;
pub mod compiler;
pub mod constraint;
pub mod error;
pub mod finalize;
pub mod generator;
pub mod models;
pub mod naming;
pub mod pool;
pub mod record;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod sequence;

#[cfg(test)]
mod test_support;

pub use association::{AddOutcome, Association, ItemsMeta, Rejection};
pub use compiler::{CompiledRule, RuleCompiler};
pub use constraint::{
    Constraint, ConstraintInputs, ConstraintOutcome, ConstraintSpec, DerivedProbe, ProbeState,
};
pub use error::{AsnError, Result};
pub use finalize::{finalize, merge_asns};
pub use generator::{GenerateReport, Generator, ValidationFailure};
pub use models::{Acid, AssociationDocument, Member, Product, ValidityCheck};
pub use naming::{rename_to_level2a, version_stamp};
pub use pool::{load_pool, parse_pool};
pub use record::{first_present, ExposureRecord, FoundField};
pub use registry::RuleRegistry;
pub use rules::{level2b_rules, RuleDefinition, RuleFamily};
pub use schema::{Level2bSchema, SchemaValidator};
pub use sequence::SequenceCounter;
