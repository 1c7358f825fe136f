//! 规则注册表
//!
//! 按加载顺序保存编译后的规则，加载顺序即匹配优先级。
//! 同名规则重新加载时原位替换，不改变优先级。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{AsnError, Result};
use crate::rules::{level2b_rules, RuleDefinition};
use serde_json::Value;
use tracing::{info, instrument, warn};

/// 规则注册表
pub struct RuleRegistry {
    rules: Vec<CompiledRule>,
    compiler: RuleCompiler,
}

impl RuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            compiler: RuleCompiler::new(),
        }
    }

    /// 加载内置 level-2b 规则集
    pub fn level2b() -> Result<Self> {
        let mut registry = Self::new();
        for definition in level2b_rules() {
            registry.load(definition)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 加载规则
    #[instrument(skip(self, definition), fields(rule = %definition.name))]
    pub fn load(&mut self, definition: RuleDefinition) -> Result<()> {
        let compiled = self.compiler.compile(definition)?;
        let name = compiled.name().to_string();

        match self.rules.iter_mut().find(|r| r.name() == name) {
            Some(existing) => {
                *existing = compiled;
                info!("规则已替换: {}", name);
            }
            None => {
                self.rules.push(compiled);
                info!("规则已加载: {}", name);
            }
        }

        Ok(())
    }

    /// 从 JSON 加载规则，接受单个规则对象或规则数组
    #[instrument(skip(self, json))]
    pub fn load_from_json(&mut self, json: &str) -> Result<Vec<String>> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| AsnError::RuleParse(format!("规则文件无法解析: {}", e)))?;

        let definitions: Vec<RuleDefinition> = match value {
            Value::Array(_) => serde_json::from_value(value),
            other => serde_json::from_value(other).map(|d: RuleDefinition| vec![d]),
        }
        .map_err(|e| AsnError::RuleParse(format!("规则定义无法解析: {}", e)))?;

        let mut loaded = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.name.clone();
            self.load(definition)?;
            loaded.push(name);
        }

        Ok(loaded)
    }

    /// 批量加载，单条失败不影响其他规则
    #[instrument(skip(self, definitions))]
    pub fn load_batch(&mut self, definitions: Vec<RuleDefinition>) -> Vec<String> {
        let mut loaded = Vec::with_capacity(definitions.len());
        let mut errors = Vec::new();

        for definition in definitions {
            let name = definition.name.clone();
            match self.load(definition) {
                Ok(()) => loaded.push(name),
                Err(e) => errors.push((name, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded.len(), errors.len());
        loaded
    }

    /// 删除规则
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.rules.len();
        self.rules.retain(|r| r.name() != name);

        if self.rules.len() == before {
            warn!("删除不存在的规则: {}", name);
            return Err(AsnError::RuleNotFound(name.to_string()));
        }
        info!("规则已删除: {}", name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 按优先级列出规则名称
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// 按优先级遍历规则
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_rule_json(name: &str) -> String {
        format!(
            r#"
            {{
                "name": "{}",
                "asn_type": "image2",
                "bundles": ["dms_base", "mode"],
                "constraints": [
                    {{"name": "exp_type", "value": "mir_image", "inputs": ["exp_type"]}}
                ]
            }}
            "#,
            name
        )
    }

    #[test]
    fn test_level2b_registry() {
        let registry = RuleRegistry::level2b().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.names(),
            vec!["Asn_Lv2Image", "Asn_Lv2Spec", "Asn_Lv2SpecBkg"]
        );
    }

    #[test]
    fn test_load_from_json_single_and_array() {
        let mut registry = RuleRegistry::new();

        let loaded = registry.load_from_json(&custom_rule_json("Asn_A")).unwrap();
        assert_eq!(loaded, vec!["Asn_A"]);

        let array = format!("[{}, {}]", custom_rule_json("Asn_B"), custom_rule_json("Asn_C"));
        let loaded = registry.load_from_json(&array).unwrap();
        assert_eq!(loaded, vec!["Asn_B", "Asn_C"]);
        assert_eq!(registry.names(), vec!["Asn_A", "Asn_B", "Asn_C"]);
    }

    #[test]
    fn test_reload_keeps_priority() {
        let mut registry = RuleRegistry::level2b().unwrap();
        let mut definition = level2b_rules().remove(0);
        definition.asn_type = "image2x".to_string();

        registry.load(definition).unwrap();

        assert_eq!(registry.names()[0], "Asn_Lv2Image");
        assert_eq!(registry.get("Asn_Lv2Image").unwrap().asn_type(), "image2x");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_load_invalid_json() {
        let mut registry = RuleRegistry::new();
        let err = registry.load_from_json("{not json").unwrap_err();
        assert_eq!(err.code(), "RULE_PARSE_FAILED");
    }

    #[test]
    fn test_load_batch_partial_failure() {
        let mut registry = RuleRegistry::new();
        let good = RuleDefinition::new("Asn_Good", "image2", &["dms_base"]);
        let bad = RuleDefinition::new("Asn_Bad", "image2", &["missing_bundle"]);

        let loaded = registry.load_batch(vec![good, bad]);
        assert_eq!(loaded, vec!["Asn_Good"]);
        assert!(!registry.contains("Asn_Bad"));
    }

    #[test]
    fn test_remove() {
        let mut registry = RuleRegistry::level2b().unwrap();
        registry.remove("Asn_Lv2Spec").unwrap();
        assert!(!registry.contains("Asn_Lv2Spec"));
        assert!(registry.remove("Asn_Lv2Spec").is_err());
    }
}
