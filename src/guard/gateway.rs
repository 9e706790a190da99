//! Dataplane gateway contract
//!
//! The guard never talks to switches directly. It hands flow-mod and
//! packet-out commands to a [`DataplaneGateway`]; encoding them on the wire
//! and managing switch connections is the gateway's business.

use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{GuardError, Result};
use super::types::{PortNo, SwitchId};

// ============================================================================
// Flow rule model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTimeout {
    Permanent,
    Seconds(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    Flood,
    Port(PortNo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Output(OutputPort),
}

/// Match fields; `None` is a wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlowMatch {
    pub in_port: Option<PortNo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowMod {
    #[serde(rename = "match")]
    pub matches: FlowMatch,
    pub priority: u16,
    pub idle_timeout: FlowTimeout,
    pub hard_timeout: FlowTimeout,
    /// An empty list drops matching traffic
    pub actions: Vec<Action>,
}

impl FlowMod {
    /// Wildcard rule flooding everything, turning the switch into a hub
    pub fn hub() -> Self {
        Self {
            matches: FlowMatch::default(),
            priority: 0,
            idle_timeout: FlowTimeout::Permanent,
            hard_timeout: FlowTimeout::Permanent,
            actions: vec![Action::Output(OutputPort::Flood)],
        }
    }

    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketOut {
    pub in_port: PortNo,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub actions: Vec<Action>,
}

impl PacketOut {
    /// Re-inject a received frame to every port
    pub fn flood(in_port: PortNo, data: Vec<u8>) -> Self {
        Self {
            in_port,
            data,
            actions: vec![Action::Output(OutputPort::Flood)],
        }
    }
}

/// Instruction to stop all traffic arriving on an ingress port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockCommand {
    pub switch: SwitchId,
    pub in_port: PortNo,
    pub priority: u16,
}

impl BlockCommand {
    /// Permanent drop rule: match on the port, no actions
    pub fn to_flow_mod(&self) -> FlowMod {
        FlowMod {
            matches: FlowMatch {
                in_port: Some(self.in_port),
            },
            priority: self.priority,
            idle_timeout: FlowTimeout::Permanent,
            hard_timeout: FlowTimeout::Permanent,
            actions: Vec::new(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Outbound side of the switch transport
pub trait DataplaneGateway {
    fn install_flow(&mut self, switch: SwitchId, flow: FlowMod) -> Result<()>;

    fn send_packet_out(&mut self, switch: SwitchId, packet: PacketOut) -> Result<()>;
}

/// A command as handed to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DataplaneCommand {
    InstallFlow { switch: SwitchId, flow: FlowMod },
    PacketOut { switch: SwitchId, packet: PacketOut },
}

impl DataplaneCommand {
    pub fn is_drop_rule(&self) -> bool {
        matches!(self, DataplaneCommand::InstallFlow { flow, .. } if flow.is_drop())
    }

    pub fn is_flood(&self) -> bool {
        matches!(self, DataplaneCommand::PacketOut { .. })
    }
}

/// Gateway that keeps every command it receives
#[derive(Debug, Default)]
pub struct RecordingGateway {
    commands: Vec<DataplaneCommand>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DataplaneCommand] {
        &self.commands
    }

    pub fn drop_rules(&self) -> impl Iterator<Item = &FlowMod> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DataplaneCommand::InstallFlow { flow, .. } if flow.is_drop() => Some(flow),
            _ => None,
        })
    }

    pub fn floods(&self) -> impl Iterator<Item = &PacketOut> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DataplaneCommand::PacketOut { packet, .. } => Some(packet),
            _ => None,
        })
    }
}

impl DataplaneGateway for RecordingGateway {
    fn install_flow(&mut self, switch: SwitchId, flow: FlowMod) -> Result<()> {
        self.commands.push(DataplaneCommand::InstallFlow { switch, flow });
        Ok(())
    }

    fn send_packet_out(&mut self, switch: SwitchId, packet: PacketOut) -> Result<()> {
        self.commands.push(DataplaneCommand::PacketOut { switch, packet });
        Ok(())
    }
}

/// Gateway forwarding commands to an external transport task
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    tx: mpsc::UnboundedSender<DataplaneCommand>,
}

impl ChannelGateway {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DataplaneCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: DataplaneCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| GuardError::Gateway("transport channel closed".to_string()))
    }
}

impl DataplaneGateway for ChannelGateway {
    fn install_flow(&mut self, switch: SwitchId, flow: FlowMod) -> Result<()> {
        self.send(DataplaneCommand::InstallFlow { switch, flow })
    }

    fn send_packet_out(&mut self, switch: SwitchId, packet: PacketOut) -> Result<()> {
        self.send(DataplaneCommand::PacketOut { switch, packet })
    }
}
