//! Session-Buendel: Mikrofon-Stream + Signal-Graph zwischen Start und Stop

use std::time::Instant;

use audify_audio::{CaptureHandle, GraphContext};
use tracing::info;

/// Wird bei jedem Zustandswechsel als Ganzes ersetzt, nie teilweise veraendert
pub struct Session {
    epoch: u64,
    capture: Box<dyn CaptureHandle>,
    graph: GraphContext,
    seit: Instant,
}

impl Session {
    pub(crate) fn new(epoch: u64, capture: Box<dyn CaptureHandle>, graph: GraphContext) -> Self {
        Self {
            epoch,
            capture,
            graph,
            seit: Instant::now(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn graph(&self) -> &GraphContext {
        &self.graph
    }

    /// Baut den Graphen ab und stoppt danach die Mikrofon-Spuren
    pub(crate) fn beenden(mut self) {
        self.graph.teardown();
        self.capture.stop_tracks();
        info!(
            epoch = self.epoch,
            dauer_ms = self.seit.elapsed().as_millis() as u64,
            "Session beendet"
        );
    }
}
