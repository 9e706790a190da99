//! Offline replay of captured traffic
//!
//! Frames from a classic pcap capture are delivered to a handler as if a
//! single switch had sent them as PacketIn notifications on one port.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::daemon::EventLoop;
use crate::guard::{GuardError, PacketIn, PortNo, Result, SwitchEvent, SwitchEventHandler, SwitchId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub frames: u64,
    pub bytes: u64,
}

/// Read a capture and push its frames into `events`.
///
/// Blocking; run it off the async runtime. Stops early if the receiver
/// goes away.
pub fn read_pcap_events(
    path: &Path,
    switch: SwitchId,
    in_port: PortNo,
    events: &mpsc::Sender<SwitchEvent>,
) -> Result<ReplayStats> {
    let file = File::open(path)?;
    let mut reader = PcapReader::new(BufReader::new(file))
        .map_err(|e| GuardError::PcapError(format!("{}: {}", path.display(), e)))?;

    let datalink = reader.header().datalink;
    if datalink != DataLink::ETHERNET {
        return Err(GuardError::PcapError(format!(
            "{}: unsupported link type {:?}",
            path.display(),
            datalink
        )));
    }

    let mut stats = ReplayStats::default();
    if events.blocking_send(SwitchEvent::ConnectionUp(switch)).is_err() {
        return Ok(stats);
    }

    while let Some(packet) = reader.next_packet() {
        let packet = packet.map_err(|e| GuardError::PcapError(e.to_string()))?;
        let data = packet.data.into_owned();

        stats.frames += 1;
        stats.bytes += data.len() as u64;

        let event = SwitchEvent::PacketIn(PacketIn::new(switch, in_port, data));
        if events.blocking_send(event).is_err() {
            debug!("Replay receiver closed after {} frames", stats.frames);
            break;
        }
    }

    Ok(stats)
}

/// Replay a capture through `handler`, returning the handler afterwards
pub async fn replay_pcap<H: SwitchEventHandler>(
    path: impl AsRef<Path>,
    switch: SwitchId,
    in_port: PortNo,
    handler: H,
    shutdown: mpsc::Receiver<()>,
) -> Result<(H, ReplayStats)> {
    let path: PathBuf = path.as_ref().to_path_buf();
    info!("Replaying {} as switch {} port {}", path.display(), switch, in_port);

    let (tx, rx) = mpsc::channel(1024);
    let reader = tokio::task::spawn_blocking(move || read_pcap_events(&path, switch, in_port, &tx));

    let mut event_loop = EventLoop::new(handler);
    event_loop.run(rx, shutdown).await;

    let stats = reader
        .await
        .map_err(|e| GuardError::PcapError(format!("reader task failed: {}", e)))??;

    info!("Replayed {} frames ({} bytes)", stats.frames, stats.bytes);
    Ok((event_loop.into_handler(), stats))
}
