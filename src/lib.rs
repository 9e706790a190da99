pub mod config;
pub mod daemon;
pub mod guard;
pub mod replay;

use std::sync::Arc;

use tracing::info;

use config::Config;
use guard::{
    Controller, DataplaneGateway, GuardKind, MitigationEngine, Result, ThresholdPolicy,
};

/// Build a controller with the detectors enabled in `config`
pub fn build_controller<G: DataplaneGateway>(config: &Config, gateway: G) -> Result<Controller<G>> {
    config.validate()?;

    let mut controller = Controller::new(gateway);

    let arp = &config.arp_inspection;
    if arp.enabled {
        let engine = MitigationEngine::new(
            GuardKind::ArpInspection,
            Arc::new(arp.binding_table()),
            ThresholdPolicy::new(arp.threshold, arp.mode),
            arp.block_priority,
        );
        controller = controller.with_arp_inspection(engine);
    } else {
        info!("ARP inspection is disabled");
    }

    let ipsg = &config.ip_source_guard;
    if ipsg.enabled {
        let engine = MitigationEngine::new(
            GuardKind::IpSourceGuard,
            Arc::new(ipsg.binding_table()),
            ThresholdPolicy::new(ipsg.threshold, ipsg.mode),
            ipsg.block_priority,
        );
        controller = controller.with_source_guard(engine, ipsg.hubify_on_connect);
    } else {
        info!("IP source guard is disabled");
    }

    Ok(controller)
}
