//! 约束定义与匹配
//!
//! 约束按顺序探测记录中的字段，取第一个有效值与模式做全匹配（忽略大小写）。
//! 匹配成功后，未给定模式或 `force_unique` 的约束会把具体值固定下来，
//! 之后加入同一关联的记录必须具有完全相同的值。

use crate::record::{first_present, ExposureRecord, FoundField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 派生输入：由关联当前状态和候选记录共同计算出的值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedProbe {
    /// 当前产品已有科学成员且候选记录也是科学曝光
    HasScience,
}

impl fmt::Display for DerivedProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasScience => write!(f, "has_science"),
        }
    }
}

/// 派生输入定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedInput {
    pub derived: DerivedProbe,
    /// 额外检查的标志字段，存在有效值时改写曝光类型
    #[serde(default)]
    pub check_flags: Vec<String>,
}

/// 约束输入：字段名列表或派生输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintInputs {
    Fields(Vec<String>),
    Derived(DerivedInput),
}

impl ConstraintInputs {
    pub fn fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::Fields(names.into_iter().map(Into::into).collect())
    }

    pub fn derived(probe: DerivedProbe, check_flags: &[&str]) -> Self {
        Self::Derived(DerivedInput {
            derived: probe,
            check_flags: check_flags.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl fmt::Display for ConstraintInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(names) => write!(f, "{}", names.join("|")),
            Self::Derived(input) => write!(f, "<{}>", input.derived),
        }
    }
}

fn default_required() -> bool {
    true
}

/// 约束声明（规则定义中的原始形式）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub name: String,
    /// 匹配模式；为空时接受任意值并固定首个值
    #[serde(default)]
    pub value: Option<String>,
    pub inputs: ConstraintInputs,
    #[serde(default)]
    pub force_unique: bool,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub is_acid: bool,
}

impl ConstraintSpec {
    pub fn new(name: impl Into<String>, value: Option<&str>, inputs: ConstraintInputs) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
            inputs,
            force_unique: false,
            required: true,
            is_acid: false,
        }
    }

    pub fn force_unique(mut self) -> Self {
        self.force_unique = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn acid(mut self, is_acid: bool) -> Self {
        self.is_acid = is_acid;
        self
    }
}

/// 单条约束的评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Matched(FoundField),
    /// 记录不满足约束，当前规则拒绝该记录
    Unmatched,
    /// 非必需约束的字段缺失，不影响整体匹配
    Skipped,
}

impl ConstraintOutcome {
    pub fn is_unmatched(&self) -> bool {
        matches!(self, Self::Unmatched)
    }
}

/// 派生输入所需的关联状态
pub trait ProbeState {
    fn has_science(&self, record: &ExposureRecord, check_flags: &[String]) -> bool;
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Pattern(Regex),
    Pinned(String),
}

/// 编译好的约束，每个关联实例持有一份独立副本
#[derive(Debug, Clone)]
pub struct Constraint {
    name: String,
    source: Option<String>,
    matcher: Matcher,
    inputs: ConstraintInputs,
    force_unique: bool,
    required: bool,
    is_acid: bool,
    found_values: Vec<String>,
}

impl Constraint {
    /// 编译约束声明，模式无效时返回正则错误
    pub fn compile(spec: &ConstraintSpec) -> Result<Self, regex::Error> {
        let matcher = match &spec.value {
            Some(pattern) => Matcher::Pattern(Regex::new(&format!("(?i)^(?:{})$", pattern))?),
            None => Matcher::Any,
        };

        Ok(Self {
            name: spec.name.clone(),
            source: spec.value.clone(),
            matcher,
            inputs: spec.inputs.clone(),
            force_unique: spec.force_unique,
            required: spec.required,
            is_acid: spec.is_acid,
            found_values: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_acid(&self) -> bool {
        self.is_acid
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn inputs(&self) -> &ConstraintInputs {
        &self.inputs
    }

    /// 已固定的具体值
    pub fn pinned_value(&self) -> Option<&str> {
        match &self.matcher {
            Matcher::Pinned(value) => Some(value),
            _ => None,
        }
    }

    /// 所有成功匹配过的具体值（按首次出现顺序）
    pub fn found_values(&self) -> &[String] {
        &self.found_values
    }

    /// 评估约束
    pub fn evaluate(&self, record: &ExposureRecord, state: &dyn ProbeState) -> ConstraintOutcome {
        let found = match &self.inputs {
            ConstraintInputs::Fields(names) => first_present(record, names),
            ConstraintInputs::Derived(input) => {
                let value = match input.derived {
                    DerivedProbe::HasScience => state.has_science(record, &input.check_flags),
                };
                Some(FoundField {
                    field: input.derived.to_string(),
                    value: bool_text(value).to_string(),
                })
            }
        };

        let Some(found) = found else {
            return if self.required {
                ConstraintOutcome::Unmatched
            } else {
                ConstraintOutcome::Skipped
            };
        };

        if self.matches(&found.value) {
            ConstraintOutcome::Matched(found)
        } else {
            ConstraintOutcome::Unmatched
        }
    }

    fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Pattern(re) => re.is_match(value),
            Matcher::Pinned(pinned) => pinned.to_lowercase() == value.to_lowercase(),
        }
    }

    /// 记录匹配值；需要时固定具体值并收窄输入字段
    pub fn pin(&mut self, found: &FoundField) {
        if !self.found_values.contains(&found.value) {
            self.found_values.push(found.value.clone());
        }

        if matches!(self.matcher, Matcher::Any) || self.force_unique {
            self.matcher = Matcher::Pinned(found.value.clone());
            self.force_unique = false;

            if let ConstraintInputs::Fields(_) = self.inputs {
                self.inputs = ConstraintInputs::Fields(vec![found.field.clone()]);
            }
        }
    }

    /// 人类可读的约束描述
    pub fn to_text(&self) -> String {
        let value = match &self.matcher {
            Matcher::Pinned(value) => value.clone(),
            _ => self.source.clone().unwrap_or_else(|| "None".to_string()),
        };
        format!("{}: {}", self.name, value)
    }
}

/// 以 "True"/"False" 表示布尔值，与池文件中的写法一致
pub fn bool_text(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// 对一组约束做整体评估：任一不匹配即整体失败，全部通过时返回待固定的值
pub fn evaluate_all(
    constraints: &[Constraint],
    record: &ExposureRecord,
    state: &dyn ProbeState,
) -> Option<Vec<(usize, FoundField)>> {
    let mut matched = Vec::with_capacity(constraints.len());

    for (i, constraint) in constraints.iter().enumerate() {
        match constraint.evaluate(record, state) {
            ConstraintOutcome::Matched(found) => matched.push((i, found)),
            ConstraintOutcome::Skipped => {}
            ConstraintOutcome::Unmatched => return None,
        }
    }

    Some(matched)
}

/// 固定 `evaluate_all` 返回的匹配值
pub fn pin_all(constraints: &mut [Constraint], matched: &[(usize, FoundField)]) {
    for (i, found) in matched {
        if let Some(constraint) = constraints.get_mut(*i) {
            constraint.pin(found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoScience;

    impl ProbeState for NoScience {
        fn has_science(&self, _record: &ExposureRecord, _check_flags: &[String]) -> bool {
            false
        }
    }

    struct ScienceFull;

    impl ProbeState for ScienceFull {
        fn has_science(&self, _record: &ExposureRecord, _check_flags: &[String]) -> bool {
            true
        }
    }

    fn record(value: serde_json::Value) -> ExposureRecord {
        ExposureRecord::from_value(value).unwrap()
    }

    fn exp_type_constraint() -> Constraint {
        let spec = ConstraintSpec::new(
            "exp_type",
            Some("fgs_image|mir_image|nis_image|nrc_image"),
            ConstraintInputs::fields(["exp_type"]),
        )
        .force_unique();
        Constraint::compile(&spec).unwrap()
    }

    #[test]
    fn test_pattern_is_full_match_and_case_insensitive() {
        let c = exp_type_constraint();

        assert!(matches!(
            c.evaluate(&record(json!({"exp_type": "NRC_IMAGE"})), &NoScience),
            ConstraintOutcome::Matched(_)
        ));
        assert!(
            c.evaluate(&record(json!({"exp_type": "nrc_image_extra"})), &NoScience)
                .is_unmatched()
        );
    }

    #[test]
    fn test_missing_required_field() {
        let c = exp_type_constraint();
        assert_eq!(
            c.evaluate(&record(json!({"program": "1"})), &NoScience),
            ConstraintOutcome::Unmatched
        );
    }

    #[test]
    fn test_missing_optional_field_is_skipped() {
        let spec = ConstraintSpec::new("subarray", None, ConstraintInputs::fields(["subarray"]))
            .optional();
        let c = Constraint::compile(&spec).unwrap();
        assert_eq!(
            c.evaluate(&record(json!({"subarray": "N/A"})), &NoScience),
            ConstraintOutcome::Skipped
        );
    }

    #[test]
    fn test_force_unique_pins_first_value() {
        let mut c = exp_type_constraint();
        let first = record(json!({"exp_type": "nrc_image"}));
        let second = record(json!({"exp_type": "mir_image"}));

        let ConstraintOutcome::Matched(found) = c.evaluate(&first, &NoScience) else {
            panic!("first record should match");
        };
        c.pin(&found);

        assert_eq!(c.pinned_value(), Some("nrc_image"));
        assert!(c.evaluate(&second, &NoScience).is_unmatched());
        assert!(matches!(
            c.evaluate(&first, &NoScience),
            ConstraintOutcome::Matched(_)
        ));
    }

    #[test]
    fn test_open_value_pins_and_narrows_inputs() {
        let spec = ConstraintSpec::new("opt_elem", None, ConstraintInputs::fields(["filter", "band"]));
        let mut c = Constraint::compile(&spec).unwrap();

        let ConstraintOutcome::Matched(found) =
            c.evaluate(&record(json!({"band": "short"})), &NoScience)
        else {
            panic!("band should match");
        };
        c.pin(&found);

        assert_eq!(c.inputs(), &ConstraintInputs::fields(["band"]));
        assert!(
            c.evaluate(&record(json!({"filter": "short"})), &NoScience)
                .is_unmatched()
        );
        assert_eq!(c.to_text(), "opt_elem: short");
    }

    #[test]
    fn test_pattern_without_force_unique_stays_open() {
        let spec = ConstraintSpec::new(
            "background",
            Some(".+background.+"),
            ConstraintInputs::fields(["asn_candidate"]),
        );
        let mut c = Constraint::compile(&spec).unwrap();

        let ConstraintOutcome::Matched(found) = c.evaluate(
            &record(json!({"asn_candidate": "(c1000, background_set)"})),
            &NoScience,
        ) else {
            panic!("should match");
        };
        c.pin(&found);

        assert!(c.pinned_value().is_none());
        assert!(matches!(
            c.evaluate(
                &record(json!({"asn_candidate": "(c1001, background_set)"})),
                &NoScience
            ),
            ConstraintOutcome::Matched(_)
        ));
        assert_eq!(c.found_values().len(), 1);
    }

    #[test]
    fn test_open_pattern_keeps_all_inputs() {
        let spec = ConstraintSpec::new(
            "opt_elem",
            Some("f.*"),
            ConstraintInputs::fields(["filter", "band"]),
        );
        let mut c = Constraint::compile(&spec).unwrap();

        let ConstraintOutcome::Matched(found) =
            c.evaluate(&record(json!({"filter": "f150w"})), &NoScience)
        else {
            panic!("should match");
        };
        assert_eq!(found.field, "filter");
        c.pin(&found);

        assert_eq!(
            c.inputs(),
            &ConstraintInputs::fields(["filter", "band"])
        );
        assert!(matches!(
            c.evaluate(&record(json!({"band": "fshort"})), &NoScience),
            ConstraintOutcome::Matched(_)
        ));
    }

    #[test]
    fn test_pinned_constraint_narrows_inputs() {
        let spec = ConstraintSpec::new(
            "opt_elem",
            None,
            ConstraintInputs::fields(["filter", "band"]),
        );
        let mut c = Constraint::compile(&spec).unwrap();

        let ConstraintOutcome::Matched(found) =
            c.evaluate(&record(json!({"band": "fshort"})), &NoScience)
        else {
            panic!("should match");
        };
        c.pin(&found);

        assert_eq!(c.inputs(), &ConstraintInputs::fields(["band"]));
        assert!(matches!(
            c.evaluate(&record(json!({"filter": "fshort"})), &NoScience),
            ConstraintOutcome::Unmatched
        ));
    }

    #[test]
    fn test_derived_input() {
        let spec = ConstraintSpec::new(
            "single_science",
            Some("False"),
            ConstraintInputs::derived(DerivedProbe::HasScience, &[]),
        );
        let c = Constraint::compile(&spec).unwrap();
        let r = record(json!({"exp_type": "nrc_image"}));

        assert!(matches!(c.evaluate(&r, &NoScience), ConstraintOutcome::Matched(_)));
        assert!(c.evaluate(&r, &ScienceFull).is_unmatched());
    }

    #[test]
    fn test_evaluate_all_does_not_pin_on_failure() {
        let mut constraints = vec![
            Constraint::compile(&ConstraintSpec::new(
                "program",
                None,
                ConstraintInputs::fields(["program"]),
            ))
            .unwrap(),
            exp_type_constraint(),
        ];

        let r = record(json!({"program": "1", "exp_type": "nrs_ifu"}));
        assert!(evaluate_all(&constraints, &r, &NoScience).is_none());
        assert!(constraints[0].pinned_value().is_none());

        let r = record(json!({"program": "1", "exp_type": "nrc_image"}));
        let matched = evaluate_all(&constraints, &r, &NoScience).unwrap();
        pin_all(&mut constraints, &matched);
        assert_eq!(constraints[0].pinned_value(), Some("1"));
        assert_eq!(constraints[1].pinned_value(), Some("nrc_image"));
    }

    #[test]
    fn test_constraint_spec_deserialization() {
        let json = r#"
        {
            "name": "single_science",
            "value": "False",
            "inputs": {"derived": "has_science", "check_flags": ["background"]}
        }
        "#;
        let spec: ConstraintSpec = serde_json::from_str(json).unwrap();
        assert!(spec.required);
        assert_eq!(
            spec.inputs,
            ConstraintInputs::derived(DerivedProbe::HasScience, &["background"])
        );

        let json = r#"{"name": "program", "inputs": ["program"]}"#;
        let spec: ConstraintSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.value, None);
        assert!(!spec.force_unique);
    }

    #[test]
    fn test_invalid_pattern() {
        let spec = ConstraintSpec::new("bad", Some("[invalid"), ConstraintInputs::fields(["a"]));
        assert!(Constraint::compile(&spec).is_err());
    }
}
