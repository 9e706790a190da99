//! Event dispatch
//!
//! The transport pushes [`SwitchEvent`]s into a channel; [`EventLoop`]
//! handles them one at a time, each to completion before the next.
//! Dispatchers running several worker threads share one controller through
//! [`SharedController`] instead.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::guard::{PacketIn, SwitchEvent, SwitchEventHandler, SwitchId};

/// Sequential dispatcher for switch events
pub struct EventLoop<H> {
    handler: H,
    events_processed: u64,
}

impl<H: SwitchEventHandler> EventLoop<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            events_processed: 0,
        }
    }

    /// Dispatch events until the channel closes or a shutdown signal arrives.
    /// Returns the number of events handled by this call.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<SwitchEvent>,
        mut shutdown: mpsc::Receiver<()>,
    ) -> u64 {
        let start = self.events_processed;
        info!("Event loop started");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            self.handler.handle_event(&event);
                            self.events_processed += 1;
                        }
                        None => {
                            debug!("Event channel closed");
                            break;
                        }
                    }
                }

                Some(()) = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let handled = self.events_processed - start;
        info!("Event loop stopped after {} events", handled);
        handled
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

/// Controller handle for multi-threaded dispatch.
///
/// Every event runs under one lock, so a violation's count increment,
/// threshold check and reset happen as a single step.
pub struct SharedController<H> {
    inner: Arc<Mutex<H>>,
}

impl<H> Clone for SharedController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: SwitchEventHandler> SharedController<H> {
    pub fn new(handler: H) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handler)),
        }
    }

    pub fn dispatch(&self, event: &SwitchEvent) {
        self.inner.lock().handle_event(event);
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<H: SwitchEventHandler> SwitchEventHandler for SharedController<H> {
    fn on_connection_up(&mut self, switch: SwitchId) {
        self.inner.lock().on_connection_up(switch);
    }

    fn on_packet_in(&mut self, packet: &PacketIn) {
        self.inner.lock().on_packet_in(packet);
    }
}
