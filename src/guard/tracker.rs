//! Per-identity violation bookkeeping
//!
//! Records are keyed by the offending MAC and live for the whole process.
//! A block resets the count but keeps the record, so a persistent attacker
//! walks through the detect/block cycle again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{MacAddr, PortNo};

#[derive(Debug, Clone)]
pub(crate) struct ViolationRecord {
    pub count: u32,
    /// Most recent offending port, overwritten on every violation
    pub last_in_port: PortNo,
    pub first_seen: DateTime<Utc>,
    /// Blocks issued for this identity so far
    pub blocks: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ViolationTracker {
    records: HashMap<MacAddr, ViolationRecord>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mismatch for `identity` seen on `in_port`, returning the updated count
    pub fn record_violation(&mut self, identity: MacAddr, in_port: PortNo) -> u32 {
        let record = self
            .records
            .entry(identity)
            .or_insert_with(|| ViolationRecord {
                count: 0,
                last_in_port: in_port,
                first_seen: Utc::now(),
                blocks: 0,
            });

        record.count += 1;
        record.last_in_port = in_port;
        record.count
    }

    /// Zero the count after a block was issued; the record itself is kept
    pub fn reset_after_block(&mut self, identity: &MacAddr) {
        if let Some(record) = self.records.get_mut(identity) {
            record.count = 0;
            record.blocks += 1;
        }
    }

    pub fn get(&self, identity: &MacAddr) -> Option<&ViolationRecord> {
        self.records.get(identity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
