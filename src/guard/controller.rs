//! Switch event handling
//!
//! Wires the classifier and the two mitigation engines to the switch
//! transport. Either detector may be disabled; when both run they see the
//! same traffic.

use tracing::{debug, info, warn};

use super::classifier::{classify_arp, classify_ipv4, ArpObservation, Ipv4Observation};
use super::engine::{ArpInspector, GuardStats, SourceGuard, Verdict};
use super::gateway::{DataplaneGateway, FlowMod, PacketOut};
use super::types::{PacketIn, SwitchEvent, SwitchId};

/// Inbound side of the switch transport
pub trait SwitchEventHandler {
    fn on_connection_up(&mut self, switch: SwitchId);

    fn on_packet_in(&mut self, packet: &PacketIn);

    fn handle_event(&mut self, event: &SwitchEvent) {
        match event {
            SwitchEvent::ConnectionUp(switch) => self.on_connection_up(*switch),
            SwitchEvent::PacketIn(packet) => self.on_packet_in(packet),
        }
    }
}

/// What happened to a single PacketIn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketOutcome {
    pub arp: Option<Verdict>,
    pub ip: Option<Verdict>,
    pub flooded: bool,
}

pub struct Controller<G> {
    arp: Option<ArpInspector>,
    source_guard: Option<SourceGuard>,
    hubify_on_connect: bool,
    gateway: G,
}

impl<G: DataplaneGateway> Controller<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            arp: None,
            source_guard: None,
            hubify_on_connect: false,
            gateway,
        }
    }

    pub fn with_arp_inspection(mut self, engine: ArpInspector) -> Self {
        self.arp = Some(engine);
        self
    }

    /// Enable IP source guard; `hubify_on_connect` installs a flood-all rule on new switches
    pub fn with_source_guard(mut self, engine: SourceGuard, hubify_on_connect: bool) -> Self {
        self.source_guard = Some(engine);
        self.hubify_on_connect = hubify_on_connect;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn arp_inspector(&self) -> Option<&ArpInspector> {
        self.arp.as_ref()
    }

    pub fn source_guard(&self) -> Option<&SourceGuard> {
        self.source_guard.as_ref()
    }

    pub fn arp_stats(&self) -> Option<GuardStats> {
        self.arp.as_ref().map(|engine| engine.stats())
    }

    pub fn source_guard_stats(&self) -> Option<GuardStats> {
        self.source_guard.as_ref().map(|engine| engine.stats())
    }

    /// Run one frame through every enabled detector
    pub fn process_packet(&mut self, packet: &PacketIn) -> PacketOutcome {
        let mut outcome = PacketOutcome::default();

        if let Some(engine) = self.arp.as_mut() {
            match classify_arp(packet) {
                ArpObservation::Reply(claim) => {
                    outcome.arp = Some(engine.evaluate(&claim, &mut self.gateway));
                }
                ArpObservation::Malformed => {
                    debug!("Ignoring malformed ARP frame on port {}", packet.in_port);
                }
                ArpObservation::NotApplicable => {}
            }
        }

        if let Some(engine) = self.source_guard.as_mut() {
            let forward = match classify_ipv4(packet) {
                Ipv4Observation::Claim(claim) => {
                    let verdict = engine.evaluate(&claim, &mut self.gateway);
                    outcome.ip = Some(verdict);
                    !verdict.is_mismatch()
                }
                Ipv4Observation::PassThrough => true,
                Ipv4Observation::Malformed => false,
            };

            if forward {
                let flood = PacketOut::flood(packet.in_port, packet.data.clone());
                match self.gateway.send_packet_out(packet.switch, flood) {
                    Ok(()) => outcome.flooded = true,
                    Err(e) => warn!("Failed to flood packet from port {}: {}", packet.in_port, e),
                }
            }
        }

        outcome
    }
}

impl<G: DataplaneGateway> SwitchEventHandler for Controller<G> {
    fn on_connection_up(&mut self, switch: SwitchId) {
        info!("Switch {} connected", switch);

        if self.source_guard.is_some() && self.hubify_on_connect {
            match self.gateway.install_flow(switch, FlowMod::hub()) {
                Ok(()) => info!("Hubifying {}", switch),
                Err(e) => warn!("Failed to hubify {}: {}", switch, e),
            }
        }
    }

    fn on_packet_in(&mut self, packet: &PacketIn) {
        self.process_packet(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::binding::BindingTable;
    use crate::guard::engine::{ComparisonMode, GuardKind, MitigationEngine, ThresholdPolicy};
    use crate::guard::gateway::{DataplaneCommand, RecordingGateway};
    use crate::guard::types::MacAddr;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn source_guard(threshold: u32) -> SourceGuard {
        let bindings: BindingTable<MacAddr, Ipv4Addr> =
            [(MacAddr::new(0, 0, 0, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 1))]
                .into_iter()
                .collect();
        MitigationEngine::new(
            GuardKind::IpSourceGuard,
            Arc::new(bindings),
            ThresholdPolicy::new(threshold, ComparisonMode::Reaches),
            100,
        )
    }

    fn non_ip_frame() -> Vec<u8> {
        let mut frame = vec![0xff; 6];
        frame.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
        frame.extend_from_slice(&[0x88, 0xcc]);
        frame.extend_from_slice(&[0u8; 46]);
        frame
    }

    #[test]
    fn test_hubify_on_connect() {
        let mut controller = Controller::new(RecordingGateway::new())
            .with_source_guard(source_guard(1), true);
        controller.on_connection_up(SwitchId(7));

        assert_eq!(
            controller.gateway().commands(),
            &[DataplaneCommand::InstallFlow {
                switch: SwitchId(7),
                flow: FlowMod::hub(),
            }]
        );
    }

    #[test]
    fn test_connection_up_without_source_guard_is_silent() {
        let mut controller = Controller::new(RecordingGateway::new());
        controller.on_connection_up(SwitchId(1));
        assert!(controller.gateway().commands().is_empty());
    }

    #[test]
    fn test_non_ip_flooded_without_tracking() {
        let mut controller = Controller::new(RecordingGateway::new())
            .with_source_guard(source_guard(1), false);

        let packet = PacketIn::new(SwitchId(1), 4, non_ip_frame());
        let outcome = controller.process_packet(&packet);

        assert!(outcome.flooded);
        assert_eq!(outcome.ip, None);
        let floods: Vec<_> = controller.gateway().floods().collect();
        assert_eq!(floods.len(), 1);
        assert_eq!(floods[0].in_port, 4);
        assert_eq!(floods[0].data, packet.data);
        assert_eq!(controller.source_guard_stats().unwrap(), GuardStats::default());
    }

    #[test]
    fn test_garbage_frame_dropped_silently() {
        let mut controller = Controller::new(RecordingGateway::new())
            .with_source_guard(source_guard(1), false);

        let outcome = controller.process_packet(&PacketIn::new(SwitchId(1), 1, vec![1, 2, 3]));
        assert_eq!(outcome, PacketOutcome::default());
        assert!(controller.gateway().commands().is_empty());
    }

    #[test]
    fn test_handle_event_dispatch() {
        let mut controller = Controller::new(RecordingGateway::new())
            .with_source_guard(source_guard(1), true);

        controller.handle_event(&SwitchEvent::ConnectionUp(SwitchId(1)));
        controller.handle_event(&SwitchEvent::PacketIn(PacketIn::new(SwitchId(1), 2, non_ip_frame())));

        let commands = controller.gateway().commands();
        assert_eq!(commands.len(), 2);
        assert!(!commands[0].is_drop_rule());
        assert!(commands[1].is_flood());
    }
}
