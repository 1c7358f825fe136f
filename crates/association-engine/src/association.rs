//! 关联
//!
//! 关联由首个匹配的曝光记录创建，创建时固定约束值、执行初始化钩子并领取序号。
//! 之后满足已固定约束的记录作为成员加入当前产品，每次加入都会更新有效性检查和产品名。

use crate::compiler::CompiledRule;
use crate::constraint::{evaluate_all, pin_all, Constraint, ProbeState};
use crate::error::{AsnError, Result};
use crate::models::{is_science, Acid, AssociationDocument, Member, Product, ValidityCheck};
use crate::naming::{
    get_exposure_type, pool_name, product_name_from_expname, rename_to_level2a, EXPTYPE_SCIENCE,
    PRODUCT_NAME_DEFAULT,
};
use crate::record::ExposureRecord;
use crate::rules::RuleFamily;
use crate::sequence::SequenceCounter;
use asn_shared::observability::metrics as asn_metrics;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// 未设置时的元数据值
const META_NONE: &str = "none";

/// 记录未能创建或加入关联的原因
#[derive(Debug)]
pub enum Rejection {
    /// 约束不匹配，属于正常控制流
    Unmatched,
    /// 约束匹配但记录缺少必要信息
    Invalid(AsnError),
}

/// 成员加入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// 关联中已有同名成员，未重复加入
    Duplicate,
}

/// `add_items` 时写入的元数据，None 表示保持原值
#[derive(Debug, Clone, Default)]
pub struct ItemsMeta {
    pub asn_type: Option<String>,
    pub asn_rule: Option<String>,
    pub asn_pool: Option<String>,
    pub program: Option<String>,
    pub target: Option<String>,
}

/// 关联
#[derive(Debug, Clone)]
pub struct Association {
    pub(crate) asn_rule: String,
    pub(crate) asn_type: String,
    pub(crate) family: RuleFamily,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) check_flags: Vec<String>,
    pub(crate) products: Vec<Product>,
    /// 所有成员键，用于去重
    pub(crate) members: HashSet<String>,
    pub(crate) validity: BTreeMap<String, ValidityCheck>,
    pub(crate) sequence: Option<u32>,
    pub(crate) version_id: Option<String>,
    pub(crate) program: String,
    pub(crate) target: String,
    pub(crate) asn_pool: String,
}

impl Association {
    /// 按规则创建一个空关联（约束未固定，没有产品）
    pub fn empty(rule: &CompiledRule, version_id: Option<&str>) -> Self {
        let mut validity = BTreeMap::new();
        validity.insert("has_science".to_string(), ValidityCheck::new(is_science));

        Self {
            asn_rule: rule.name().to_string(),
            asn_type: rule.asn_type().to_string(),
            family: rule.family(),
            constraints: rule.constraints.clone(),
            check_flags: rule.check_flags.clone(),
            products: Vec::new(),
            members: HashSet::new(),
            validity,
            sequence: None,
            version_id: version_id.map(str::to_string),
            program: META_NONE.to_string(),
            target: META_NONE.to_string(),
            asn_pool: META_NONE.to_string(),
        }
    }

    /// 尝试用记录创建新关联
    ///
    /// 约束全部通过后固定约束值，执行初始化钩子，加入首个成员，最后领取序号。
    pub fn create(
        rule: &CompiledRule,
        record: &ExposureRecord,
        sequences: &mut SequenceCounter,
        version_id: Option<&str>,
    ) -> std::result::Result<Self, Rejection> {
        let mut asn = Self::empty(rule, version_id);

        let matched = evaluate_all(&asn.constraints, record, &asn).ok_or(Rejection::Unmatched)?;
        let expname = member_expname(record).map_err(Rejection::Invalid)?;

        pin_all(&mut asn.constraints, &matched);
        asn.init_hook(record).map_err(Rejection::Invalid)?;
        asn.push_member(record, expname);

        let sequence = sequences.next(&asn.asn_type);
        asn.sequence = Some(sequence);

        asn_metrics::record_association_created(&asn.asn_type);
        debug!(
            asn_rule = %asn.asn_rule,
            asn_type = %asn.asn_type,
            sequence,
            "Association created"
        );

        Ok(asn)
    }

    /// 尝试把记录加入已有关联
    pub fn add(&mut self, record: &ExposureRecord) -> std::result::Result<AddOutcome, Rejection> {
        let matched = evaluate_all(&self.constraints, record, &*self).ok_or(Rejection::Unmatched)?;
        let expname = member_expname(record).map_err(Rejection::Invalid)?;

        if self.members.contains(&expname) {
            debug!(expname = %expname, asn_rule = %self.asn_rule, "Member already in association");
            return Ok(AddOutcome::Duplicate);
        }

        pin_all(&mut self.constraints, &matched);
        self.push_member(record, expname);
        Ok(AddOutcome::Added)
    }

    /// 初始化钩子：记录目标、项目和池名，并开启首个产品
    fn init_hook(&mut self, record: &ExposureRecord) -> Result<()> {
        let target = record.get_str("targetid").ok_or_else(|| {
            AsnError::InvalidRecord("记录缺少 targetid，无法初始化关联".to_string())
        })?;
        let program = record.get_str("program").ok_or_else(|| {
            AsnError::InvalidRecord("记录缺少 program，无法初始化关联".to_string())
        })?;

        self.target = target;
        self.program = program;
        self.asn_pool = record
            .pool_file()
            .map(pool_name)
            .unwrap_or_else(|| META_NONE.to_string());

        let name = self.dms_product_name();
        self.new_product(name);
        Ok(())
    }

    fn push_member(&mut self, record: &ExposureRecord, expname: String) {
        let exptype = get_exposure_type(record, EXPTYPE_SCIENCE, &self.check_flags);
        let entry = Member::new(expname, exptype);

        self.update_validity(&entry);
        self.members.insert(entry.expname.clone());
        self.current_product_mut().members.push(entry);
        self.update_asn();

        asn_metrics::record_member_added();
    }

    /// 低层直接加入条目，绕过约束检查
    ///
    /// 每个条目单独成为一个产品，产品名优先使用 `product_name_fn(item, 序号)`，
    /// 该函数失败时保留推导出的产品名。
    pub fn add_items<F>(
        &mut self,
        items: &[&str],
        meta: ItemsMeta,
        product_name_fn: Option<F>,
        sequences: &mut SequenceCounter,
    ) where
        F: Fn(&str, usize) -> anyhow::Result<String>,
    {
        for (idx, item) in items.iter().enumerate() {
            let idx = idx + 1;
            if self.members.contains(*item) {
                debug!(item = %item, "Item already in association, skipped");
                continue;
            }

            self.new_product(PRODUCT_NAME_DEFAULT);
            let entry = Member::new(*item, EXPTYPE_SCIENCE);
            self.update_validity(&entry);
            self.members.insert(entry.expname.clone());
            self.current_product_mut().members.push(entry);
            self.update_asn();

            if let Some(name_fn) = &product_name_fn {
                match name_fn(item, idx) {
                    Ok(name) => self.current_product_mut().name = name,
                    Err(e) => debug!(
                        error = %e,
                        "Attempted use of product name function failed, default product name used"
                    ),
                }
            }
        }

        if let Some(asn_type) = meta.asn_type {
            self.asn_type = asn_type;
        }
        if let Some(asn_rule) = meta.asn_rule {
            self.asn_rule = asn_rule;
        }
        if let Some(asn_pool) = meta.asn_pool {
            self.asn_pool = asn_pool;
        }
        if let Some(program) = meta.program {
            self.program = program;
        }
        if let Some(target) = meta.target {
            self.target = target;
        }

        self.sequence = Some(sequences.next(&self.asn_type));
    }

    /// 开启新产品
    pub fn new_product(&mut self, name: impl Into<String>) {
        self.products.push(Product::new(name));
    }

    /// 当前（最后一个）产品
    pub fn current_product(&self) -> Option<&Product> {
        self.products.last()
    }

    fn current_product_mut(&mut self) -> &mut Product {
        if self.products.is_empty() {
            self.new_product(PRODUCT_NAME_DEFAULT);
        }
        let last = self.products.len() - 1;
        &mut self.products[last]
    }

    /// 当前产品中指定曝光类型的成员
    pub fn members_by_type(&self, member_type: &str) -> Vec<&Member> {
        self.current_product()
            .map(|p| p.members_by_type(member_type))
            .unwrap_or_default()
    }

    /// 由当前产品的首个科学成员推导产品名
    pub fn dms_product_name(&self) -> String {
        match self.members_by_type(EXPTYPE_SCIENCE).first() {
            Some(science) => product_name_from_expname(&science.expname),
            None => PRODUCT_NAME_DEFAULT.to_string(),
        }
    }

    /// 根据当前成员更新产品名
    fn update_asn(&mut self) {
        let name = self.dms_product_name();
        self.current_product_mut().name = name;
    }

    /// 只对新成员评估尚未通过的检查
    fn update_validity(&mut self, entry: &Member) {
        for check in self.validity.values_mut() {
            check.observe(entry);
        }
    }

    /// 所有有效性检查均已通过
    pub fn is_valid(&self) -> bool {
        self.validity.values().all(|c| c.validated)
    }

    /// 未通过的检查名
    pub fn failed_checks(&self) -> Vec<&str> {
        self.validity
            .iter()
            .filter(|(_, c)| !c.validated)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// 校验有效性，失败时返回 `AssociationNotValid`
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        Err(AsnError::AssociationNotValid {
            asn_name: self.asn_name(),
            reason: format!(
                "Validation failed validity tests: {}",
                self.failed_checks().join(", ")
            ),
        })
    }

    /// 关联候选标识
    pub fn acid(&self) -> Acid {
        self.constraints
            .iter()
            .filter(|c| c.is_acid())
            .find_map(|c| {
                if c.found_values().is_empty() {
                    None
                } else {
                    Acid::from_value(&c.found_values().join("-"))
                }
            })
            .unwrap_or_else(|| Acid::discovered(self.sequence.unwrap_or(0)))
    }

    /// 关联名 `jw{program}-{acid}[_{stamp}]_{type}_{sequence:03}_asn`（小写）
    pub fn asn_name(&self) -> String {
        let sequence = self.sequence.unwrap_or(0);
        let acid = self.acid();
        let name = match &self.version_id {
            Some(stamp) => format!(
                "jw{}-{}_{}_{}_{:03}_asn",
                self.program, acid.id, stamp, self.asn_type, sequence
            ),
            None => format!(
                "jw{}-{}_{}_{:03}_asn",
                self.program, acid.id, self.asn_type, sequence
            ),
        };
        name.to_lowercase()
    }

    /// 约束的文本描述
    pub fn constraints_to_text(&self) -> Vec<String> {
        std::iter::once("Constraints:".to_string())
            .chain(self.constraints.iter().map(|c| format!("    {}", c.to_text())))
            .collect()
    }

    /// 持久化文档
    pub fn to_document(&self) -> AssociationDocument {
        AssociationDocument {
            asn_type: self.asn_type.clone(),
            asn_rule: self.asn_rule.clone(),
            asn_id: self.acid().id,
            program: self.program.clone(),
            target: self.target.clone(),
            asn_pool: self.asn_pool.clone(),
            constraints: self.constraints_to_text().join("\n"),
            products: self.products.clone(),
        }
    }

    /// 人类可读的多行摘要
    pub fn summary(&self) -> String {
        let mut result = vec![format!("Association {}", self.asn_name())];

        result.push("    Parameters:".to_string());
        result.push(format!("        Product type: {}", self.asn_type));
        result.push(format!("        Rule:         {}", self.asn_rule));
        result.push(format!("        Program:      {}", self.program));
        result.push(format!("        Target:       {}", self.target));
        result.push(format!("        Pool:         {}", self.asn_pool));

        for line in self.constraints_to_text() {
            result.push(format!("        {}", line));
        }

        for product in &self.products {
            result.push(format!(
                "\t{} with {} members",
                product.name,
                product.members.len()
            ));
        }

        result.push(String::new());
        result.join("\n")
    }

    /// 同类型且成员集合相同即视为相等
    pub fn equals(&self, other: &Self) -> bool {
        self.asn_type == other.asn_type && self.members == other.members
    }

    pub fn asn_rule(&self) -> &str {
        &self.asn_rule
    }

    pub fn asn_type(&self) -> &str {
        &self.asn_type
    }

    pub fn family(&self) -> RuleFamily {
        self.family
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn asn_pool(&self) -> &str {
        &self.asn_pool
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains_member(&self, expname: &str) -> bool {
        self.members.contains(expname)
    }
}

impl ProbeState for Association {
    /// 当前产品已有一个科学成员，且候选记录也是科学曝光
    fn has_science(&self, record: &ExposureRecord, check_flags: &[String]) -> bool {
        let exptype = get_exposure_type(record, EXPTYPE_SCIENCE, check_flags);
        let limit_reached = !self.members_by_type(EXPTYPE_SCIENCE).is_empty();
        limit_reached && exptype == EXPTYPE_SCIENCE
    }
}

fn member_expname(record: &ExposureRecord) -> Result<String> {
    record
        .get_str("filename")
        .map(|filename| rename_to_level2a(&filename))
        .ok_or_else(|| AsnError::InvalidRecord("记录缺少 filename".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::constraint::{ConstraintInputs, ConstraintSpec};
    use crate::rules::{level2b_rules, RuleDefinition};
    use serde_json::json;

    fn rule(name: &str) -> CompiledRule {
        let definition = level2b_rules()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap();
        RuleCompiler::new().compile(definition).unwrap()
    }

    fn image_record(filename: &str) -> ExposureRecord {
        ExposureRecord::from_value(json!({
            "program": "99009",
            "instrume": "nircam",
            "detector": "nrca1",
            "filter": "f150w",
            "pupil": "clear",
            "exp_type": "nrc_image",
            "targetid": "1",
            "filename": filename
        }))
        .unwrap()
        .with_pool_file("/pools/jw99009_20171108T041457_pool.csv")
    }

    #[test]
    fn test_create_from_matching_record() {
        let mut sequences = SequenceCounter::new();
        let asn = Association::create(
            &rule("Asn_Lv2Image"),
            &image_record("jw99009001001_01101_00001_nrca1_uncal.fits"),
            &mut sequences,
            None,
        )
        .unwrap();

        assert_eq!(asn.asn_type(), "image2");
        assert_eq!(asn.sequence(), Some(1));
        assert_eq!(asn.asn_pool(), "jw99009_20171108T041457_pool");
        assert_eq!(asn.products().len(), 1);

        let product = &asn.products()[0];
        assert_eq!(product.name, "jw99009001001_01101_00001_nrca1");
        assert_eq!(
            product.members[0].expname,
            "jw99009001001_01101_00001_nrca1_rate.fits"
        );
        assert!(asn.is_valid());
    }

    #[test]
    fn test_create_rejects_unmatched() {
        let mut sequences = SequenceCounter::new();
        let result = Association::create(
            &rule("Asn_Lv2Spec"),
            &image_record("a_uncal.fits"),
            &mut sequences,
            None,
        );
        assert!(matches!(result, Err(Rejection::Unmatched)));
        // 未创建成功不消耗序号
        assert_eq!(sequences.peek("spec2"), 1);
    }

    #[test]
    fn test_create_rejects_missing_target() {
        let record = ExposureRecord::from_value(json!({
            "program": "99009",
            "instrume": "nircam",
            "detector": "nrca1",
            "filter": "f150w",
            "exp_type": "nrc_image",
            "filename": "a_uncal.fits"
        }))
        .unwrap();

        let mut sequences = SequenceCounter::new();
        let result = Association::create(&rule("Asn_Lv2Image"), &record, &mut sequences, None);
        assert!(matches!(result, Err(Rejection::Invalid(_))));
    }

    #[test]
    fn test_singleton_rejects_second_science() {
        let mut sequences = SequenceCounter::new();
        let mut asn = Association::create(
            &rule("Asn_Lv2Image"),
            &image_record("a_uncal.fits"),
            &mut sequences,
            None,
        )
        .unwrap();

        let result = asn.add(&image_record("b_uncal.fits"));
        assert!(matches!(result, Err(Rejection::Unmatched)));
        assert_eq!(asn.member_count(), 1);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let definition = RuleDefinition::new("Asn_Test", "image2", &["dms_base", "mode", "image"]);
        let compiled = RuleCompiler::new().compile(definition).unwrap();

        let mut sequences = SequenceCounter::new();
        let mut asn =
            Association::create(&compiled, &image_record("a_uncal.fits"), &mut sequences, None)
                .unwrap();

        assert_eq!(asn.add(&image_record("a_uncal.fits")).unwrap(), AddOutcome::Duplicate);
        assert_eq!(asn.add(&image_record("b_uncal.fits")).unwrap(), AddOutcome::Added);
        assert_eq!(asn.member_count(), 2);
        assert_eq!(asn.products()[0].members.len(), 2);
    }

    #[test]
    fn test_force_unique_rejects_changed_value() {
        let definition = RuleDefinition::new("Asn_Test", "image2", &["dms_base", "mode", "image"]);
        let compiled = RuleCompiler::new().compile(definition).unwrap();

        let mut sequences = SequenceCounter::new();
        let mut asn =
            Association::create(&compiled, &image_record("a_uncal.fits"), &mut sequences, None)
                .unwrap();

        let mut other = image_record("b_uncal.fits").fields().clone();
        other.insert("filter".to_string(), json!("f200w"));
        let other = ExposureRecord::new(other);

        assert!(matches!(asn.add(&other), Err(Rejection::Unmatched)));
    }

    #[test]
    fn test_product_name_without_science() {
        let asn = Association::empty(&rule("Asn_Lv2Image"), None);
        assert_eq!(asn.dms_product_name(), PRODUCT_NAME_DEFAULT);
    }

    #[test]
    fn test_asn_name() {
        let mut sequences = SequenceCounter::new();
        let asn = Association::create(
            &rule("Asn_Lv2Image"),
            &image_record("a_uncal.fits"),
            &mut sequences,
            Some("20171108T041457"),
        )
        .unwrap();

        assert_eq!(asn.asn_name(), "jw99009-a0001_20171108t041457_image2_001_asn");

        let asn = Association::create(
            &rule("Asn_Lv2Image"),
            &image_record("b_uncal.fits"),
            &mut sequences,
            None,
        )
        .unwrap();
        assert_eq!(asn.asn_name(), "jw99009-a0002_image2_002_asn");
    }

    #[test]
    fn test_acid_from_candidate_constraint() {
        let definition = RuleDefinition::new("Asn_Test", "image2", &["dms_base", "image"])
            .with_constraint(
                ConstraintSpec::new("asn_candidate", None, ConstraintInputs::fields(["asn_candidate"]))
                    .acid(true),
            );
        let compiled = RuleCompiler::new().compile(definition).unwrap();

        let mut fields = image_record("a_uncal.fits").fields().clone();
        fields.insert("asn_candidate".to_string(), json!("('o001', 'observation')"));
        let record = ExposureRecord::new(fields);

        let mut sequences = SequenceCounter::new();
        let asn = Association::create(&compiled, &record, &mut sequences, None).unwrap();
        assert_eq!(asn.acid().id, "o001");
        assert_eq!(asn.asn_name(), "jw99009-o001_image2_001_asn");
        assert_eq!(asn.to_document().asn_id, "o001");
    }

    #[test]
    fn test_validate_without_science() {
        let asn = Association::empty(&rule("Asn_Lv2Image"), None);
        let err = asn.validate().unwrap_err();
        assert_eq!(err.code(), "ASSOCIATION_NOT_VALID");
        assert!(err.to_string().contains("has_science"));
    }

    #[test]
    fn test_add_items() {
        let mut sequences = SequenceCounter::new();
        let mut asn = Association::empty(&rule("Asn_Lv2Image"), None);

        asn.add_items(
            &["a_rate.fits", "b_rate.fits"],
            ItemsMeta {
                program: Some("00001".to_string()),
                ..Default::default()
            },
            Some(|item: &str, idx: usize| -> anyhow::Result<String> {
                if idx == 2 {
                    anyhow::bail!("no name for {}", item);
                }
                Ok(format!("product_{}", idx))
            }),
            &mut sequences,
        );

        assert_eq!(asn.products().len(), 2);
        assert_eq!(asn.products()[0].name, "product_1");
        // 命名函数失败时保留推导出的名字
        assert_eq!(asn.products()[1].name, "b");
        assert_eq!(asn.program(), "00001");
        assert_eq!(asn.sequence(), Some(1));
        assert!(asn.is_valid());
    }

    #[test]
    fn test_summary() {
        let mut sequences = SequenceCounter::new();
        let asn = Association::create(
            &rule("Asn_Lv2Image"),
            &image_record("a_uncal.fits"),
            &mut sequences,
            None,
        )
        .unwrap();

        let summary = asn.summary();
        assert!(summary.starts_with("Association jw99009-a0001_image2_001_asn"));
        assert!(summary.contains("        Rule:         Asn_Lv2Image"));
        assert!(summary.contains("            exp_type: nrc_image"));
        assert!(summary.contains("\ta with 1 members"));
    }

    #[test]
    fn test_equals() {
        let mut sequences = SequenceCounter::new();
        let image = rule("Asn_Lv2Image");
        let a = Association::create(&image, &image_record("a_uncal.fits"), &mut sequences, None)
            .unwrap();
        let b = Association::create(&image, &image_record("a_uncal.fits"), &mut sequences, None)
            .unwrap();
        let c = Association::create(&image, &image_record("c_uncal.fits"), &mut sequences, None)
            .unwrap();

        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }
}
