//! 关联序号计数器
//!
//! 每种关联类型独立计数，从 1 开始严格递增。一次处理过程中共享同一个计数器，
//! `reset` 只在测试中用于获得确定的序号。

use std::collections::HashMap;

/// 按关联类型分组的序号计数器
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    next: HashMap<String, u32>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出指定类型的下一个序号
    pub fn next(&mut self, asn_type: &str) -> u32 {
        let slot = self.next.entry(asn_type.to_string()).or_insert(1);
        let sequence = *slot;
        *slot += 1;
        sequence
    }

    /// 查看指定类型的下一个序号但不消耗
    pub fn peek(&self, asn_type: &str) -> u32 {
        self.next.get(asn_type).copied().unwrap_or(1)
    }

    /// 所有类型重新从 1 开始
    pub fn reset(&mut self) {
        self.next.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_per_type() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next("image2"), 1);
        assert_eq!(counter.next("image2"), 2);
        assert_eq!(counter.next("spec2"), 1);
        assert_eq!(counter.next("image2"), 3);
        assert_eq!(counter.peek("spec2"), 2);
    }

    #[test]
    fn test_reset_restarts_at_one() {
        let mut counter = SequenceCounter::new();
        counter.next("image2");
        counter.next("image2");

        counter.reset();

        assert_eq!(counter.peek("image2"), 1);
        assert_eq!(counter.next("image2"), 1);
    }
}
