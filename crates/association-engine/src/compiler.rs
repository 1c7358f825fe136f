//! 规则编译器
//!
//! 展开规则引用的约束包，校验定义并预编译所有匹配模式。

use crate::constraint::{Constraint, ConstraintInputs, ConstraintSpec};
use crate::error::{AsnError, Result};
use crate::rules::{bundle, merge_constraint_specs, RuleDefinition, RuleFamily};

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 原始规则
    pub definition: RuleDefinition,
    /// 展开合并后的约束（尚未固定任何值）
    pub constraints: Vec<Constraint>,
    /// 合并后的标志字段
    pub check_flags: Vec<String>,
}

impl CompiledRule {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn asn_type(&self) -> &str {
        &self.definition.asn_type
    }

    pub fn family(&self) -> RuleFamily {
        self.definition.family
    }

    /// 约束名称列表（按合并后的顺序）
    pub fn constraint_names(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    pub fn new() -> Self {
        Self
    }

    /// 从 JSON 字符串编译单条规则
    pub fn compile_from_json(&self, json: &str) -> Result<CompiledRule> {
        let definition: RuleDefinition = serde_json::from_str(json)
            .map_err(|e| AsnError::RuleParse(format!("规则定义无法解析: {}", e)))?;
        self.compile(definition)
    }

    /// 编译规则
    pub fn compile(&self, definition: RuleDefinition) -> Result<CompiledRule> {
        self.validate_definition(&definition)?;

        let mut specs: Vec<ConstraintSpec> = Vec::new();
        let mut check_flags: Vec<String> = Vec::new();

        for name in &definition.bundles {
            let b = bundle(name).ok_or_else(|| {
                AsnError::RuleCompile(format!(
                    "规则 '{}' 引用了未知的约束包 '{}'",
                    definition.name, name
                ))
            })?;
            merge_constraint_specs(&mut specs, &b.constraints);
            extend_unique(&mut check_flags, &b.check_flags);
        }
        merge_constraint_specs(&mut specs, &definition.constraints);
        extend_unique(&mut check_flags, &definition.check_flags);

        if specs.is_empty() {
            return Err(AsnError::RuleCompile(format!(
                "规则 '{}' 没有任何约束",
                definition.name
            )));
        }

        let mut constraints = Vec::with_capacity(specs.len());
        for spec in &specs {
            self.validate_spec(&definition.name, spec)?;
            let compiled = Constraint::compile(spec).map_err(|e| {
                AsnError::RuleCompile(format!(
                    "规则 '{}' 的约束 '{}' 正则表达式无效: {}",
                    definition.name, spec.name, e
                ))
            })?;
            constraints.push(compiled);
        }

        Ok(CompiledRule {
            definition,
            constraints,
            check_flags,
        })
    }

    fn validate_definition(&self, definition: &RuleDefinition) -> Result<()> {
        if definition.name.is_empty() {
            return Err(AsnError::RuleParse("规则名称不能为空".to_string()));
        }

        if definition.asn_type.is_empty() {
            return Err(AsnError::RuleParse(format!(
                "规则 '{}' 的 asn_type 不能为空",
                definition.name
            )));
        }

        Ok(())
    }

    fn validate_spec(&self, rule_name: &str, spec: &ConstraintSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(AsnError::RuleParse(format!(
                "规则 '{}' 存在未命名的约束",
                rule_name
            )));
        }

        if let ConstraintInputs::Fields(names) = &spec.inputs {
            if names.is_empty() || names.iter().any(|n| n.is_empty()) {
                return Err(AsnError::RuleParse(format!(
                    "规则 '{}' 的约束 '{}' 输入字段不能为空",
                    rule_name, spec.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
