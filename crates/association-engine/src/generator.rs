//! 关联生成器
//!
//! 逐条处理曝光记录：先交给已有关联，再按优先级尝试由尚未认领该记录的规则创建新关联。
//! 同一记录可以同时进入多个不同规则的关联。

use crate::association::{AddOutcome, Association, Rejection};
use crate::error::Result;
use crate::finalize::finalize;
use crate::record::ExposureRecord;
use crate::registry::RuleRegistry;
use crate::schema::{Level2bSchema, SchemaValidator};
use crate::sequence::SequenceCounter;
use asn_shared::observability::metrics as asn_metrics;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 单个关联的校验失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub asn_name: String,
    pub asn_type: String,
    pub code: String,
    pub reason: String,
}

/// 一次完整生成的结果
#[derive(Debug)]
pub struct GenerateReport {
    pub associations: Vec<Association>,
    pub failures: Vec<ValidationFailure>,
    pub records_processed: usize,
    pub duration_ms: i64,
}

impl GenerateReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 关联生成器
pub struct Generator {
    registry: RuleRegistry,
    sequences: SequenceCounter,
    version_id: Option<String>,
    validate: bool,
    finalize: bool,
    schema: Box<dyn SchemaValidator>,
}

impl Generator {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            sequences: SequenceCounter::new(),
            version_id: None,
            validate: true,
            finalize: true,
            schema: Box::new(Level2bSchema),
        }
    }

    /// 关联名中附带的版本戳
    pub fn with_version_id(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_finalize(mut self, finalize: bool) -> Self {
        self.finalize = finalize;
        self
    }

    pub fn with_schema(mut self, schema: Box<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn sequences(&self) -> &SequenceCounter {
        &self.sequences
    }

    /// 所有类型的序号重新从 1 开始
    pub fn reset_sequences(&mut self) {
        self.sequences.reset();
    }

    /// 只做匹配，返回按创建顺序排列的关联
    #[instrument(skip_all, fields(records = records.len(), rules = self.registry.len()))]
    pub fn generate(&mut self, records: &[ExposureRecord]) -> Vec<Association> {
        let mut associations: Vec<Association> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let created = self.process_record(index, record, &mut associations);
            associations.extend(created);
            asn_metrics::record_record_processed();
        }

        info!(
            "关联匹配完成: {} 条记录, {} 个关联",
            records.len(),
            associations.len()
        );
        associations
    }

    /// 处理单条记录，返回新创建的关联
    fn process_record(
        &mut self,
        index: usize,
        record: &ExposureRecord,
        associations: &mut [Association],
    ) -> Vec<Association> {
        // 已有关联认领了该记录的规则不再创建新关联
        let mut claimed: HashSet<String> = HashSet::new();

        for asn in associations.iter_mut() {
            match asn.add(record) {
                Ok(AddOutcome::Added) | Ok(AddOutcome::Duplicate) => {
                    claimed.insert(asn.asn_rule().to_string());
                }
                Err(Rejection::Unmatched) => {}
                Err(Rejection::Invalid(e)) => {
                    debug!(record = index, asn_rule = %asn.asn_rule(), error = %e, "Record rejected");
                }
            }
        }

        let mut created = Vec::new();
        for rule in self.registry.iter() {
            if claimed.contains(rule.name()) {
                continue;
            }
            match Association::create(
                rule,
                record,
                &mut self.sequences,
                self.version_id.as_deref(),
            ) {
                Ok(asn) => created.push(asn),
                Err(Rejection::Unmatched) => {}
                Err(Rejection::Invalid(e)) => {
                    debug!(record = index, asn_rule = %rule.name(), error = %e, "Record rejected");
                }
            }
        }

        if claimed.is_empty() && created.is_empty() {
            debug!(record = index, "Record matched no rule");
        }
        created
    }

    /// 丢弃无效关联并合并同类型关联
    pub fn finalize(&self, associations: Vec<Association>) -> Vec<Association> {
        finalize(associations)
    }

    /// 匹配、收尾并校验，单个关联的校验失败只记录在报告中
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn run(&mut self, records: &[ExposureRecord]) -> Result<GenerateReport> {
        let start = Instant::now();

        let mut associations = self.generate(records);
        if self.finalize {
            associations = self.finalize(associations);
        }

        let failures = if self.validate {
            self.validate_all(&associations)
        } else {
            Vec::new()
        };

        let elapsed = start.elapsed();
        asn_metrics::record_generate_duration(elapsed.as_secs_f64());

        info!(
            "关联生成完成: {} 个关联, {} 个校验失败, 耗时 {}ms",
            associations.len(),
            failures.len(),
            elapsed.as_millis()
        );

        Ok(GenerateReport {
            associations,
            failures,
            records_processed: records.len(),
            duration_ms: elapsed.as_millis() as i64,
        })
    }

    fn validate_all(&self, associations: &[Association]) -> Vec<ValidationFailure> {
        associations
            .iter()
            .filter_map(|asn| {
                let asn_name = asn.asn_name();
                let result = asn
                    .validate()
                    .and_then(|_| self.schema.validate(&asn_name, &asn.to_document()));

                result.err().map(|e| {
                    warn!(asn_name = %asn_name, asn_type = %asn.asn_type(), "关联校验失败: {}", e);
                    ValidationFailure {
                        asn_name,
                        asn_type: asn.asn_type().to_string(),
                        code: e.code().to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }
}
