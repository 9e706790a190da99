//! Mitigation engine
//!
//! Checks claims against a binding table, charges mismatches to the
//! offending MAC and pushes a permanent drop rule for the offender's port
//! once its violation count meets the threshold.
//!
//! There is no sticky "blocked" state. After a block the count returns to
//! zero and a persistent attacker triggers another (identical) block rule
//! every time the threshold is met again.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::binding::BindingTable;
use super::classifier::{Claim, ClaimIdentity};
use super::gateway::{BlockCommand, DataplaneGateway};
use super::tracker::ViolationTracker;
use super::types::MacAddr;

/// How a violation count is compared against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Block once count > threshold; the threshold is a grace count
    Exceeds,
    /// Block as soon as count >= threshold
    #[default]
    Reaches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: u32,
    pub mode: ComparisonMode,
}

impl ThresholdPolicy {
    pub fn new(threshold: u32, mode: ComparisonMode) -> Self {
        Self { threshold, mode }
    }

    pub fn is_met(&self, count: u32) -> bool {
        match self.mode {
            ComparisonMode::Exceeds => count > self.threshold,
            ComparisonMode::Reaches => count >= self.threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    ArpInspection,
    IpSourceGuard,
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKind::ArpInspection => write!(f, "ARP"),
            GuardKind::IpSourceGuard => write!(f, "IP"),
        }
    }
}

/// Outcome of evaluating one claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Primary address has no binding; fail open
    Unprotected,
    /// Claim agrees with the binding
    Conforming,
    /// Mismatch recorded, threshold not yet met
    Violation { offender: MacAddr, count: u32 },
    /// Mismatch recorded and a block rule was issued
    Blocked { offender: MacAddr, command: BlockCommand },
}

impl Verdict {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Verdict::Violation { .. } | Verdict::Blocked { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub tracked_identities: usize,
    pub violations: u64,
    pub blocks: u64,
    pub unprotected: u64,
    pub conforming: u64,
}

/// Spoofing detector for one binding direction
#[derive(Debug)]
pub struct MitigationEngine<P, S> {
    kind: GuardKind,
    bindings: Arc<BindingTable<P, S>>,
    tracker: ViolationTracker,
    policy: ThresholdPolicy,
    block_priority: u16,
    stats: GuardStats,
}

/// ARP inspection: sender IP must resolve to the bound MAC
pub type ArpInspector = MitigationEngine<std::net::Ipv4Addr, MacAddr>;

/// IP source guard: source MAC must send from the bound IP
pub type SourceGuard = MitigationEngine<MacAddr, std::net::Ipv4Addr>;

impl<P, S> MitigationEngine<P, S>
where
    P: Eq + Hash + fmt::Display,
    S: PartialEq + fmt::Display,
    Claim<P, S>: ClaimIdentity,
{
    pub fn new(
        kind: GuardKind,
        bindings: Arc<BindingTable<P, S>>,
        policy: ThresholdPolicy,
        block_priority: u16,
    ) -> Self {
        info!(
            "Starting {} spoofing guard ({} bindings, threshold {} {:?})",
            kind,
            bindings.len(),
            policy.threshold,
            policy.mode
        );
        if bindings.is_empty() {
            warn!("{} binding table is empty; no address is protected", kind);
        }
        Self {
            kind,
            bindings,
            tracker: ViolationTracker::new(),
            policy,
            block_priority,
            stats: GuardStats::default(),
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    pub fn bindings(&self) -> &BindingTable<P, S> {
        &self.bindings
    }

    /// Check a claim and, when the offender's count meets the threshold,
    /// push a block rule through `gateway` and reset the count.
    ///
    /// Gateway failures are logged and not retried.
    pub fn evaluate<G>(&mut self, claim: &Claim<P, S>, gateway: &mut G) -> Verdict
    where
        G: DataplaneGateway + ?Sized,
    {
        let Some(trusted) = self.bindings.lookup(&claim.primary) else {
            debug!("{} not under {} protection", claim.primary, self.kind);
            self.stats.unprotected += 1;
            return Verdict::Unprotected;
        };

        if *trusted == claim.secondary {
            self.stats.conforming += 1;
            return Verdict::Conforming;
        }

        let offender = claim.offender();
        let count = self.tracker.record_violation(offender, claim.in_port);
        self.stats.violations += 1;
        warn!(
            "{} spoofing detected from MAC={} forging IP={} on switch {} port {} (bound {} -> {}, count {})",
            self.kind,
            offender,
            claim.claimed_ip(),
            claim.switch,
            claim.in_port,
            claim.primary,
            trusted,
            count
        );

        if !self.policy.is_met(count) {
            return Verdict::Violation { offender, count };
        }

        let (in_port, first_seen, prior_blocks) = self
            .tracker
            .get(&offender)
            .map(|record| (record.last_in_port, record.first_seen, record.blocks))
            .unwrap_or((claim.in_port, Utc::now(), 0));
        let command = BlockCommand {
            switch: claim.switch,
            in_port,
            priority: self.block_priority,
        };

        info!(
            "{} spoofing threshold achieved. Blocking port {} on switch {} ({} offending since {}, block #{})",
            self.kind,
            in_port,
            claim.switch,
            offender,
            first_seen.format("%Y-%m-%d %H:%M:%S"),
            prior_blocks + 1
        );
        if let Err(e) = gateway.install_flow(claim.switch, command.to_flow_mod()) {
            warn!("Failed to install block rule for port {}: {}", in_port, e);
        }

        self.tracker.reset_after_block(&offender);
        self.stats.blocks += 1;

        Verdict::Blocked { offender, command }
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            tracked_identities: self.tracker.len(),
            ..self.stats
        }
    }

    /// Current count for `identity`, `None` if it never mismatched
    pub fn violation_count(&self, identity: &MacAddr) -> Option<u32> {
        self.tracker.get(identity).map(|record| record.count)
    }
}

// ============================================================================
// Tests
// ============================================================================
