//! # Spoofing guard
//!
//! ARP-reply spoofing and IP source-address spoofing detection for an
//! OpenFlow-style controller.
//!
//! - **ARP inspection**: ARP replies whose sender MAC disagrees with the
//!   static IP -> MAC binding are charged to the sender MAC.
//! - **IP source guard**: IPv4 packets whose source IP disagrees with the
//!   static MAC -> IP binding are charged to the source MAC. Everything else
//!   is flooded so the switch keeps forwarding like a hub.
//!
//! Once an offender's violation count meets the configured threshold a
//! permanent drop rule for its ingress port is pushed through the
//! [`DataplaneGateway`].
//!
//! ```rust,no_run
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use spoofguard::guard::{
//!     ArpBindings, ComparisonMode, Controller, GuardKind, MacAddr, MitigationEngine,
//!     PacketIn, RecordingGateway, SwitchEventHandler, SwitchId, ThresholdPolicy,
//! };
//!
//! let ip: Ipv4Addr = "10.0.0.1".parse().unwrap();
//! let mac: MacAddr = "00:00:00:00:00:01".parse().unwrap();
//! let bindings: ArpBindings = [(ip, mac)].into_iter().collect();
//! let engine = MitigationEngine::new(
//!     GuardKind::ArpInspection,
//!     Arc::new(bindings),
//!     ThresholdPolicy::new(1, ComparisonMode::Reaches),
//!     100,
//! );
//! let mut controller = Controller::new(RecordingGateway::new()).with_arp_inspection(engine);
//! controller.on_connection_up(SwitchId(1));
//! # let frame = vec![0u8; 42];
//! controller.on_packet_in(&PacketIn::new(SwitchId(1), 3, frame));
//! ```

pub mod binding;
pub mod classifier;
pub mod controller;
pub mod engine;
pub mod error;
pub mod gateway;
mod tracker;
pub mod types;

pub use self::binding::{ArpBindings, BindingTable, SourceBindings};
pub use self::classifier::{
    classify_arp, classify_ipv4, ArpClaim, ArpObservation, ArpOp, ArpPacket, Claim, ClaimIdentity,
    Ipv4Claim, Ipv4Observation,
};
pub use self::controller::{Controller, PacketOutcome, SwitchEventHandler};
pub use self::engine::{
    ArpInspector, ComparisonMode, GuardKind, GuardStats, MitigationEngine, SourceGuard,
    ThresholdPolicy, Verdict,
};
pub use self::error::{GuardError, Result};
pub use self::gateway::{
    Action, BlockCommand, ChannelGateway, DataplaneCommand, DataplaneGateway, FlowMatch, FlowMod,
    FlowTimeout, OutputPort, PacketOut, RecordingGateway,
};
pub use self::types::{MacAddr, PacketIn, PortNo, SwitchEvent, SwitchId};
