//! 指标模块
//!
//! 基于 metrics crate 记录关联生成过程中的计数和耗时。
//! 配置了 `metrics_file` 时安装 Prometheus recorder，进程结束前把快照写入文件；
//! 未安装 recorder 时所有记录函数都是空操作。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::PathBuf;
use tracing::{info, warn};

use super::ObservabilityConfig;

pub const RECORDS_PROCESSED: &str = "asn_records_processed_total";
pub const ASSOCIATIONS_CREATED: &str = "asn_associations_created_total";
pub const MEMBERS_ADDED: &str = "asn_members_added_total";
pub const ASSOCIATIONS_DROPPED: &str = "asn_associations_dropped_total";
pub const ASSOCIATIONS_MERGED: &str = "asn_associations_merged_total";
pub const GENERATE_DURATION: &str = "asn_generate_duration_seconds";

/// 指标快照句柄，drop 时写出 Prometheus 文本格式快照
pub struct MetricsHandle {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsHandle {
    /// 当前指标的 Prometheus 文本
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn write_snapshot(&self) -> std::io::Result<()> {
        std::fs::write(&self.path, self.render())
    }
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        match self.write_snapshot() {
            Ok(()) => info!("Metrics snapshot written to {}", self.path.display()),
            Err(e) => warn!("Failed to write metrics snapshot: {}", e),
        }
    }
}

/// 按配置安装 recorder，未配置快照文件时返回 None
pub fn init(config: &ObservabilityConfig) -> Result<Option<MetricsHandle>> {
    let Some(path) = &config.metrics_file else {
        describe();
        return Ok(None);
    };

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();

    Ok(Some(MetricsHandle {
        handle,
        path: PathBuf::from(path),
    }))
}

/// 注册指标描述
pub fn describe() {
    metrics::describe_counter!(RECORDS_PROCESSED, "Total number of exposure records processed");
    metrics::describe_counter!(
        ASSOCIATIONS_CREATED,
        "Total number of associations created, by asn_type"
    );
    metrics::describe_counter!(MEMBERS_ADDED, "Total number of members added to associations");
    metrics::describe_counter!(
        ASSOCIATIONS_DROPPED,
        "Total number of associations dropped at finalize, by reason"
    );
    metrics::describe_counter!(
        ASSOCIATIONS_MERGED,
        "Total number of associations merged into a sibling, by asn_type"
    );
    metrics::describe_histogram!(
        GENERATE_DURATION,
        metrics::Unit::Seconds,
        "Duration of a full generate pass in seconds"
    );
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

#[inline]
pub fn record_record_processed() {
    metrics::counter!(RECORDS_PROCESSED).increment(1);
}

#[inline]
pub fn record_association_created(asn_type: &str) {
    metrics::counter!(ASSOCIATIONS_CREATED, "asn_type" => asn_type.to_string()).increment(1);
}

#[inline]
pub fn record_member_added() {
    metrics::counter!(MEMBERS_ADDED).increment(1);
}

#[inline]
pub fn record_association_dropped(reason: &str) {
    metrics::counter!(ASSOCIATIONS_DROPPED, "reason" => reason.to_string()).increment(1);
}

#[inline]
pub fn record_association_merged(asn_type: &str) {
    metrics::counter!(ASSOCIATIONS_MERGED, "asn_type" => asn_type.to_string()).increment(1);
}

#[inline]
pub fn record_generate_duration(duration_secs: f64) {
    metrics::histogram!(GENERATE_DURATION).record(duration_secs);
}
