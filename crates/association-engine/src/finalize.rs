//! 关联收尾
//!
//! 丢弃无效的 level-2b 关联，并把同一类型的关联合并为一个。
//! 合并时以每种类型首个出现的关联为代表，保留其产品顺序；
//! 同名产品只追加代表中尚未出现的成员，其他产品整体追加。

use crate::association::Association;
use crate::models::Product;
use crate::rules::RuleFamily;
use asn_shared::observability::metrics as asn_metrics;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// 收尾处理：非 level-2b 关联原样保留，其余先过滤无效关联再按类型合并
#[instrument(skip(associations), fields(count = associations.len()))]
pub fn finalize(associations: Vec<Association>) -> Vec<Association> {
    let mut finalized = Vec::new();
    let mut lv2_asns = Vec::new();

    for asn in associations {
        if asn.family() != RuleFamily::Level2b {
            finalized.push(asn);
            continue;
        }

        if asn.is_valid() {
            lv2_asns.push(asn);
        } else {
            warn!(
                asn_name = %asn.asn_name(),
                failed = ?asn.failed_checks(),
                "丢弃无效关联"
            );
            asn_metrics::record_association_dropped("invalid");
        }
    }

    let merged = merge_asns(lv2_asns);
    info!(
        passed_through = finalized.len(),
        merged = merged.len(),
        "Associations finalized"
    );

    finalized.extend(merged);
    finalized
}

/// 按 asn_type 合并关联，每种类型返回一个代表（按类型首次出现顺序）
pub fn merge_asns(asns: Vec<Association>) -> Vec<Association> {
    let mut merged: Vec<Association> = Vec::new();

    for asn in asns {
        match merged.iter_mut().find(|m| m.asn_type() == asn.asn_type()) {
            Some(current) => {
                asn_metrics::record_association_merged(current.asn_type());
                merge_into(current, asn);
            }
            None => merged.push(asn),
        }
    }

    merged
}

/// 把 `source` 的产品合并进 `target`
pub fn merge_into(target: &mut Association, source: Association) {
    for product in source.products {
        let mut merge_occurred = false;

        for current in target
            .products
            .iter_mut()
            .filter(|p| p.name == product.name)
        {
            let present: HashSet<&str> = current.members.iter().map(|m| m.key()).collect();
            let new_members: Vec<_> = product
                .members
                .iter()
                .filter(|m| !present.contains(m.key()))
                .cloned()
                .collect();

            current.members.extend(new_members);
            merge_occurred = true;
        }

        if !merge_occurred {
            target.products.push(product);
        }
    }

    target.members = collect_member_keys(&target.products);
}

fn collect_member_keys(products: &[Product]) -> HashSet<String> {
    products
        .iter()
        .flat_map(|p| p.members.iter().map(|m| m.expname.clone()))
        .collect()
}
