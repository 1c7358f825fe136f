//! 规则定义与约束组合包
//!
//! 规则由若干具名约束包按顺序组合而成，再追加规则自身的约束。
//! 同名约束后出现者覆盖先出现者，但保留首次出现的位置。

use crate::constraint::{ConstraintInputs, ConstraintSpec, DerivedProbe};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 规则族，finalize 只处理 level-2b 族的关联
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    #[default]
    Level2b,
    Other,
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level2b => write!(f, "level2b"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub asn_type: String,
    #[serde(default)]
    pub family: RuleFamily,
    /// 引用的约束包名称，按顺序合并
    #[serde(default)]
    pub bundles: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    /// 判定曝光类型时额外检查的标志字段
    #[serde(default)]
    pub check_flags: Vec<String>,
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, asn_type: impl Into<String>, bundles: &[&str]) -> Self {
        Self {
            name: name.into(),
            asn_type: asn_type.into(),
            family: RuleFamily::Level2b,
            bundles: bundles.iter().map(|b| b.to_string()).collect(),
            constraints: Vec::new(),
            check_flags: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, spec: ConstraintSpec) -> Self {
        self.constraints.push(spec);
        self
    }

    pub fn with_family(mut self, family: RuleFamily) -> Self {
        self.family = family;
        self
    }
}

/// 约束包
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: &'static str,
    pub constraints: Vec<ConstraintSpec>,
    pub check_flags: Vec<String>,
}

const IMAGE_EXP_TYPES: &str = "fgs_image|mir_image|nis_image|nrc_image";

const SPEC_EXP_TYPES: &str = "nrc_grism\
|nrc_tsgrism\
|mir_lrs-fixedslit\
|mir_lrs-slitless\
|mir_mrs\
|nrs_fixedslit\
|nrs_ifu\
|nrs_msaspec\
|nrs_brightobj\
|nis_wfss\
|nis_soss";

/// 所有内置约束包的名称
pub const BUNDLE_NAMES: &[&str] = &["dms_base", "image", "spec", "mode", "singleton", "background"];

/// 按名称获取内置约束包
pub fn bundle(name: &str) -> Option<Bundle> {
    let fields = |names: &[&str]| ConstraintInputs::fields(names.iter().copied());

    let (name, constraints, check_flags): (&'static str, Vec<ConstraintSpec>, Vec<String>) =
        match name {
            "dms_base" => (
                "dms_base",
                vec![ConstraintSpec::new("program", None, fields(&["program"]))],
                vec![],
            ),
            "image" => (
                "image",
                vec![
                    ConstraintSpec::new("exp_type", Some(IMAGE_EXP_TYPES), fields(&["exp_type"]))
                        .force_unique(),
                ],
                vec![],
            ),
            "spec" => (
                "spec",
                vec![
                    ConstraintSpec::new("exp_type", Some(SPEC_EXP_TYPES), fields(&["exp_type"]))
                        .force_unique(),
                ],
                vec![],
            ),
            "mode" => (
                "mode",
                vec![
                    ConstraintSpec::new("program", None, fields(&["program"])),
                    ConstraintSpec::new("instrument", None, fields(&["instrume"])),
                    ConstraintSpec::new("detector", None, fields(&["detector"])),
                    ConstraintSpec::new("opt_elem", None, fields(&["filter", "band"])),
                    ConstraintSpec::new("opt_elem2", None, fields(&["pupil", "grating"]))
                        .optional(),
                    ConstraintSpec::new("subarray", None, fields(&["subarray"])).optional(),
                    ConstraintSpec::new("channel", None, fields(&["channel"])).optional(),
                ],
                vec![],
            ),
            "singleton" => (
                "singleton",
                vec![ConstraintSpec::new(
                    "single_science",
                    Some("False"),
                    ConstraintInputs::derived(DerivedProbe::HasScience, &[]),
                )],
                vec![],
            ),
            "background" => (
                "background",
                vec![
                    ConstraintSpec::new(
                        "background",
                        Some(".+background.+"),
                        fields(&["asn_candidate"]),
                    )
                    .force_unique()
                    .optional(),
                    ConstraintSpec::new(
                        "single_science",
                        Some("False"),
                        ConstraintInputs::derived(DerivedProbe::HasScience, &["background"]),
                    ),
                ],
                vec!["background".to_string()],
            ),
            _ => return None,
        };

    Some(Bundle {
        name,
        constraints,
        check_flags,
    })
}

/// 内置 level-2b 规则集，顺序即匹配优先级
pub fn level2b_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition::new(
            "Asn_Lv2Image",
            "image2",
            &["dms_base", "mode", "image", "singleton"],
        ),
        RuleDefinition::new(
            "Asn_Lv2Spec",
            "spec2",
            &["dms_base", "mode", "spec", "singleton"],
        ),
        RuleDefinition::new(
            "Asn_Lv2SpecBkg",
            "spec2",
            &["dms_base", "mode", "spec", "background"],
        ),
    ]
}

/// 按"同名覆盖、保留首位"的规则合并约束
pub fn merge_constraint_specs(target: &mut Vec<ConstraintSpec>, specs: &[ConstraintSpec]) {
    for spec in specs {
        match target.iter_mut().find(|existing| existing.name == spec.name) {
            Some(existing) => *existing = spec.clone(),
            None => target.push(spec.clone()),
        }
    }
}
