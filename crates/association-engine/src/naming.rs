//! 命名工具
//!
//! 曝光文件名转换、产品名推导、池名提取和曝光类型判定。

use crate::record::ExposureRecord;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// 默认产品名
pub const PRODUCT_NAME_DEFAULT: &str = "undefined";

/// 默认曝光类型
pub const EXPTYPE_SCIENCE: &str = "science";

/// 标志字段到曝光类型的映射
pub const FLAG_TO_EXPTYPE: &[(&str, &str)] = &[("background", "background")];

static LEVEL1B_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+)(?P<type>_uncal)(?P<extension>\..+)$").expect("level-1b 正则无效")
});

static LEVEL2A_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+)(?P<type>_rate(ints)?)$").expect("level-2a 正则无效")
});

/// 将 level-1b 曝光名 `<path>_uncal<ext>` 转为 level-2a 名 `<path>_rate<ext>`
///
/// 不符合 level-1b 命名的文件名原样返回，并记录警告。
pub fn rename_to_level2a(level1b_name: &str) -> String {
    match LEVEL1B_REGEX.captures(level1b_name) {
        Some(caps) => format!("{}_rate{}", &caps["path"], &caps["extension"]),
        None => {
            warn!(
                filename = %level1b_name,
                "Member filename is not a level-1b name, cannot transform to level-2a"
            );
            level1b_name.to_string()
        }
    }
}

/// 拆分扩展名，保留目录部分（`a/b.c.fits` -> (`a/b.c`, `.fits`)）
pub fn split_ext(name: &str) -> (&str, &str) {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base.rfind('.') {
        Some(dot) if dot >= leading_dots && dot > 0 => {
            let split = base_start + dot;
            (&name[..split], &name[split..])
        }
        _ => (name, ""),
    }
}

/// 由科学曝光文件名推导产品名：去掉扩展名和 `_rate`/`_rateints` 后缀
///
/// 无法推导时返回默认产品名。
pub fn product_name_from_expname(expname: &str) -> String {
    let (stem, _) = split_ext(expname);
    if stem.is_empty() {
        return PRODUCT_NAME_DEFAULT.to_string();
    }

    match LEVEL2A_REGEX.captures(stem) {
        Some(caps) => caps["path"].to_string(),
        None => stem.to_string(),
    }
}

/// 从池文件路径中提取池名（去掉目录和所有扩展名）
pub fn pool_name(pool_file: &str) -> String {
    let base = pool_file.rsplit('/').next().unwrap_or(pool_file);
    base.split('.').next().unwrap_or(base).to_string()
}

/// 判定记录的曝光类型
///
/// 先根据 exp_type 识别校准类曝光，然后 `check_flags` 中存在有效值的标志字段覆盖结果。
pub fn get_exposure_type(record: &ExposureRecord, default: &str, check_flags: &[String]) -> String {
    let mut exposure_type = match record.get_str("exp_type") {
        Some(exp_type) => exposure_type_from_exp_type(&exp_type).unwrap_or(default).to_string(),
        None => default.to_string(),
    };

    for flag in check_flags {
        if !record.has_valid(flag) {
            continue;
        }
        if let Some((_, exptype)) = FLAG_TO_EXPTYPE.iter().find(|(name, _)| name == flag) {
            exposure_type = exptype.to_string();
        }
    }

    exposure_type
}

fn exposure_type_from_exp_type(exp_type: &str) -> Option<&'static str> {
    let exp_type = exp_type.to_lowercase();
    if exp_type.ends_with("_tacq") || exp_type.ends_with("_taconfirm") || exp_type == "nrs_taslit"
    {
        Some("target_acquisition")
    } else if exp_type.ends_with("_dark") {
        Some("dark")
    } else if exp_type.ends_with("_flat") || exp_type.ends_with("_lamp") {
        Some("flat")
    } else {
        None
    }
}

/// 生成版本戳，格式 `YYYYmmddtHHMMSS`
pub fn version_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dt%H%M%S").to_string()
}
