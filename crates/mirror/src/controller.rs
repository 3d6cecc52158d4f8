//! Lifecycle-Controller des Mikrofon-Spiegels
//!
//! Zustandsautomat:
//!
//! ```text
//! Idle --start--> Requesting --Freigabe + Graph ok--> Active --stop--> Idle
//!                    |  \--Graph-Fehler--> Failed (Stream bleibt erhalten)
//!                    \--verweigert/Fehler--> Failed
//! Failed --start--> Requesting (nutzt behaltenen Stream ohne neue Abfrage)
//! ```
//!
//! Die Phase liegt hinter einem Mutex, der nie ueber ein `.await` gehalten
//! wird. Jeder Start erhoeht die Epoche; eine Mikrofon-Freigabe oder ein
//! fertiger Graph wird nur uebernommen, wenn die Phase noch `Requesting`
//! mit derselben Epoche ist. Verspaetete Freigaben und Graphen werden
//! sofort abgebaut.
//!
//! Der Graph-Aufbau blockiert (Ausgabegeraet oeffnen, auf den Stream
//! warten) und laeuft daher per `spawn_blocking` ausserhalb des Mutex.
//! Ein eigener asynchroner Aufbau-Mutex laesst nur einen Aufbau zur Zeit
//! zu; ein veralteter Graph ist abgebaut, bevor der naechste entsteht.
//! Der Abbau in `stop` bleibt synchron unter dem Mutex (auch aus `Drop`
//! aufrufbar); er wartet nur auf das Ende des Ausgabe-Threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audify_audio::tone::TON_DAUER_SECS;
use audify_audio::{
    play_test_tone, AudioBackend, AudioError, CaptureHandle, CaptureSource, GraphContext,
};
use audify_core::{
    MirrorError, MirrorEvent, MirrorState, ParamField, Parameter, ParameterSet, StageKind, Status,
};
use audify_observability::MirrorMetrics;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::surface::ParameterSurface;

/// Kapazitaet des Ereignis-Kanals
const EVENT_KAPAZITAET: usize = 64;

enum Phase {
    Idle,
    Requesting {
        epoch: u64,
        seit: Instant,
    },
    Active(Session),
    Failed {
        error: MirrorError,
        /// Freigegebener Stream nach fehlgeschlagenem Graph-Aufbau
        capture: Option<Box<dyn CaptureHandle>>,
    },
}

impl Phase {
    fn state(&self) -> MirrorState {
        match self {
            Phase::Idle => MirrorState::Idle,
            Phase::Requesting { .. } => MirrorState::Requesting,
            Phase::Active(_) => MirrorState::Active,
            Phase::Failed { .. } => MirrorState::Failed,
        }
    }

    fn status(&self) -> Status {
        match self {
            Phase::Active(_) => Status::Active,
            Phase::Failed { error, .. } => Status::Error(error.status_grund()),
            Phase::Idle | Phase::Requesting { .. } => Status::Inactive,
        }
    }
}

struct Inner {
    phase: Phase,
    epoch: u64,
    surface: ParameterSurface,
    last_error: Option<MirrorError>,
}

/// Steuert Start, Stop und Parameter des Mikrofon-Spiegels
pub struct MirrorController {
    source: Arc<dyn CaptureSource>,
    backend: Arc<dyn AudioBackend>,
    inner: Mutex<Inner>,
    aufbau: tokio::sync::Mutex<()>,
    events: broadcast::Sender<MirrorEvent>,
    metrics: Option<MirrorMetrics>,
}

impl MirrorController {
    pub fn new(source: Arc<dyn CaptureSource>, backend: Arc<dyn AudioBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        Self {
            source,
            backend,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                epoch: 0,
                surface: ParameterSurface::new(),
                last_error: None,
            }),
            aufbau: tokio::sync::Mutex::new(()),
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MirrorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> MirrorState {
        self.inner.lock().phase.state()
    }

    pub fn status(&self) -> Status {
        self.inner.lock().phase.status()
    }

    /// Letzter Fehler seit dem letzten erfolgreichen Start
    pub fn last_error(&self) -> Option<MirrorError> {
        self.inner.lock().last_error.clone()
    }

    /// Epoche der laufenden Session
    pub fn session_epoch(&self) -> Option<u64> {
        match &self.inner.lock().phase {
            Phase::Active(session) => Some(session.epoch()),
            _ => None,
        }
    }

    /// Ein Knopf fuer Start und Stop. Waehrend einer laufenden Anfrage
    /// bricht der Aufruf die Anfrage ab.
    pub async fn start_or_stop(&self) -> Status {
        match self.state() {
            MirrorState::Active | MirrorState::Requesting => self.stop(),
            MirrorState::Idle | MirrorState::Failed => self.start().await,
        }
    }

    /// Fordert das Mikrofon an und baut den Graphen auf. Laeuft bereits
    /// eine Session oder Anfrage, passiert nichts.
    pub async fn start(&self) -> Status {
        let (epoch, behalten) = {
            let mut inner = self.inner.lock();
            if matches!(inner.phase, Phase::Active(_) | Phase::Requesting { .. }) {
                debug!("Start ignoriert, Spiegel laeuft bereits");
                return inner.phase.status();
            }
            inner.epoch += 1;
            let epoch = inner.epoch;
            let vorher = std::mem::replace(
                &mut inner.phase,
                Phase::Requesting {
                    epoch,
                    seit: Instant::now(),
                },
            );
            let behalten = match vorher {
                Phase::Failed {
                    capture: Some(capture),
                    ..
                } if capture.is_active() => Some(capture),
                _ => None,
            };
            (epoch, behalten)
        };

        let ergebnis = match behalten {
            Some(capture) => {
                info!(epoch, "Vorhandener Mikrofon-Stream wird wiederverwendet");
                Ok(capture)
            }
            None => {
                info!(epoch, "Mikrofon-Zugriff angefragt");
                self.source.acquire().await
            }
        };
        let capture = match self.freigabe_uebernehmen(epoch, ergebnis) {
            Ok(capture) => capture,
            Err(status) => return status,
        };

        let _aufbau = self.aufbau.lock().await;
        if !self.ist_aktuell(epoch) {
            self.veraltet_verwerfen(epoch, capture, None);
            return self.status();
        }

        let backend = Arc::clone(&self.backend);
        let aufgebaut = tokio::task::spawn_blocking(move || {
            let graph = GraphContext::build(backend.as_ref(), capture.as_ref());
            (capture, graph)
        })
        .await;

        match aufgebaut {
            Ok((capture, graph)) => self.aufbau_abschliessen(epoch, capture, graph),
            Err(e) => {
                // Stream und Kontext wurden mit dem Task freigegeben
                warn!(epoch, "Aufbau-Task abgebrochen: {}", e);
                let mut inner = self.inner.lock();
                if Self::ist_aktuell_in(&inner, epoch) {
                    if let Some(m) = &self.metrics {
                        m.graph_build_errors_total.inc();
                    }
                    self.fehlschlagen(&mut inner, MirrorError::GraphBuild(e.to_string()), None);
                }
                inner.phase.status()
            }
        }
    }

    fn ist_aktuell_in(inner: &Inner, epoch: u64) -> bool {
        matches!(inner.phase, Phase::Requesting { epoch: e, .. } if e == epoch)
    }

    fn ist_aktuell(&self, epoch: u64) -> bool {
        Self::ist_aktuell_in(&self.inner.lock(), epoch)
    }

    /// Stoppt einen Stream (und baut einen Graphen ab), der zu einer
    /// abgebrochenen Anfrage gehoert. Laeuft ohne Mutex.
    fn veraltet_verwerfen(
        &self,
        epoch: u64,
        mut capture: Box<dyn CaptureHandle>,
        graph: Option<GraphContext>,
    ) {
        if let Some(mut graph) = graph {
            graph.teardown();
        }
        capture.stop_tracks();
        info!(epoch, "Verspaetete Mikrofon-Freigabe verworfen");
    }

    /// Prueft das Ergebnis der Mikrofon-Anfrage. `Err` traegt den Status,
    /// wenn kein Aufbau folgen soll.
    fn freigabe_uebernehmen(
        &self,
        epoch: u64,
        ergebnis: Result<Box<dyn CaptureHandle>, AudioError>,
    ) -> Result<Box<dyn CaptureHandle>, Status> {
        let mut inner = self.inner.lock();
        if !Self::ist_aktuell_in(&inner, epoch) {
            // Stop oder neuer Start kam dazwischen
            if let Ok(mut capture) = ergebnis {
                capture.stop_tracks();
                info!(epoch, "Verspaetete Mikrofon-Freigabe verworfen");
            }
            return Err(inner.phase.status());
        }

        match ergebnis {
            Ok(capture) => Ok(capture),
            Err(e) => {
                let error = if e.ist_verweigerung() {
                    if let Some(m) = &self.metrics {
                        m.permission_denied_total.inc();
                    }
                    warn!(epoch, "Mikrofon-Zugriff verweigert: {}", e);
                    MirrorError::PermissionDenied
                } else {
                    warn!(epoch, "Mikrofon konnte nicht geoeffnet werden: {}", e);
                    MirrorError::EngineUnavailable(e.to_string())
                };
                self.fehlschlagen(&mut inner, error, None);
                Err(inner.phase.status())
            }
        }
    }

    fn aufbau_abschliessen(
        &self,
        epoch: u64,
        capture: Box<dyn CaptureHandle>,
        graph: Result<GraphContext, AudioError>,
    ) -> Status {
        let mut inner = self.inner.lock();
        let seit = match inner.phase {
            Phase::Requesting { epoch: e, seit } if e == epoch => Some(seit),
            _ => None,
        };
        let Some(seit) = seit else {
            // Stop oder neuer Start kam waehrend des Aufbaus
            let status = inner.phase.status();
            drop(inner);
            self.veraltet_verwerfen(epoch, capture, graph.ok());
            return status;
        };

        match graph {
            Ok(graph) => {
                let uebernommen = inner.surface.apply_to(&graph);
                debug!(epoch, uebernommen, "Reglerwerte auf neuen Graphen angewendet");
                inner.phase = Phase::Active(Session::new(epoch, capture, graph));
                inner.last_error = None;
                if let Some(m) = &self.metrics {
                    m.sessions_started_total.inc();
                    m.session_active.set(1);
                    m.start_duration_seconds
                        .observe(seit.elapsed().as_secs_f64());
                }
                info!(epoch, "Audio-Spiegel aktiv");
                self.senden(MirrorEvent::Gestartet { epoch });
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.graph_build_errors_total.inc();
                }
                warn!(epoch, "Signal-Graph-Aufbau fehlgeschlagen: {}", e);
                self.fehlschlagen(&mut inner, MirrorError::GraphBuild(e.to_string()), Some(capture));
            }
        }
        inner.phase.status()
    }

    fn fehlschlagen(
        &self,
        inner: &mut Inner,
        error: MirrorError,
        capture: Option<Box<dyn CaptureHandle>>,
    ) {
        inner.last_error = Some(error.clone());
        self.senden(MirrorEvent::Fehler {
            grund: error.status_grund(),
        });
        inner.phase = Phase::Failed { error, capture };
    }

    /// Beendet die Spiegelung in jeder Phase und gibt alle Ressourcen frei
    pub fn stop(&self) -> Status {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Active(session) => {
                let epoch = session.epoch();
                session.beenden();
                if let Some(m) = &self.metrics {
                    m.session_active.set(0);
                }
                self.senden(MirrorEvent::Gestoppt { epoch });
            }
            Phase::Requesting { epoch, .. } => {
                info!(epoch, "Mikrofon-Anfrage abgebrochen");
            }
            Phase::Failed { capture, .. } => {
                if let Some(mut capture) = capture {
                    capture.stop_tracks();
                }
            }
            Phase::Idle => {}
        }
        inner.phase.status()
    }

    /// Aktuelle Reglerwerte
    pub fn parameters(&self) -> ParameterSet {
        self.inner.lock().surface.values()
    }

    pub fn volume_warning(&self) -> bool {
        self.inner.lock().surface.volume_warning()
    }

    /// Setzt einen Regler; waehrend `Active` wirkt der Wert sofort auf den
    /// laufenden Graphen. Gibt den begrenzten Wert zurueck.
    pub fn set_parameter(&self, parameter: Parameter, wert: f32) -> f32 {
        let mut inner = self.inner.lock();
        let warnung_vorher = inner.surface.volume_warning();
        if wert.is_nan() {
            return inner.surface.set(parameter, wert);
        }
        let begrenzt = inner.surface.set(parameter, wert);
        if let Phase::Active(session) = &inner.phase {
            session.graph().set(parameter, begrenzt);
        }
        if let Some(m) = &self.metrics {
            m.parameter_geschrieben(parameter.name());
        }
        debug!(%parameter, wert = begrenzt, "Regler gesetzt");

        if parameter == Parameter::Volume && !warnung_vorher && inner.surface.volume_warning() {
            warn!(wert = begrenzt, "Lautstaerke ueber Warnschwelle");
            if let Some(m) = &self.metrics {
                m.volume_warnings_total.inc();
            }
            self.senden(MirrorEvent::LautstaerkeWarnung { wert: begrenzt });
        }
        begrenzt
    }

    pub fn set_volume(&self, wert: f32) -> f32 {
        self.set_parameter(Parameter::Volume, wert)
    }

    pub fn set_bass(&self, db: f32) -> f32 {
        self.set_parameter(Parameter::Bass, db)
    }

    pub fn set_threshold(&self, db: f32) -> f32 {
        self.set_parameter(Parameter::Threshold, db)
    }

    pub fn set_high_pass(&self, hz: f32) -> f32 {
        self.set_parameter(Parameter::HighPass, hz)
    }

    pub fn set_eq_frequency(&self, hz: f32) -> f32 {
        self.set_parameter(Parameter::EqFrequency, hz)
    }

    pub fn set_eq_gain(&self, db: f32) -> f32 {
        self.set_parameter(Parameter::EqGain, db)
    }

    /// Setzt alle Regler auf Standard zurueck (auch auf dem laufenden Graphen)
    pub fn reset_parameters(&self) -> ParameterSet {
        let mut inner = self.inner.lock();
        inner.surface.reset();
        if let Phase::Active(session) = &inner.phase {
            inner.surface.apply_to(session.graph());
        }
        inner.surface.values()
    }

    /// Momentaufnahme aller Stufen des laufenden Graphen; `None` ausserhalb
    /// von `Active`
    pub fn stage_values(&self) -> Option<Vec<(StageKind, Vec<(ParamField, f32)>)>> {
        match &self.inner.lock().phase {
            Phase::Active(session) => Some(
                session
                    .graph()
                    .stages()
                    .iter()
                    .map(|n| (n.kind(), n.werte()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Spielt den Pruefton in der aktuellen Lautstaerke auf einem eigenen
    /// Kontext, der nach 0,5 s wieder geschlossen wird.
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn request_test_tone(&self) -> Result<(), MirrorError> {
        let lautstaerke = {
            let inner = self.inner.lock();
            if !matches!(inner.phase, Phase::Active(_)) {
                debug!("Pruefton ohne aktiven Spiegel angefragt");
                self.senden(MirrorEvent::NichtAktiv);
                return Err(MirrorError::NotActive);
            }
            inner.surface.get(Parameter::Volume)
        };

        let mut playback = play_test_tone(self.backend.as_ref(), lautstaerke).map_err(|e| {
            warn!("Pruefton fehlgeschlagen: {}", e);
            let error = MirrorError::EngineUnavailable(e.to_string());
            self.senden(MirrorEvent::Fehler {
                grund: error.status_grund(),
            });
            error
        })?;

        if let Some(m) = &self.metrics {
            m.test_tones_total.inc();
        }
        self.senden(MirrorEvent::TestTon { lautstaerke });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(TON_DAUER_SECS)).await;
            playback.finish();
        });
        Ok(())
    }

    fn senden(&self, event: MirrorEvent) {
        // Ohne Empfaenger schlaegt send fehl; das ist kein Fehler
        let _ = self.events.send(event);
    }
}

impl Drop for MirrorController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audify_audio::{OfflineBackend, OfflineCaptureSource};

    fn controller() -> (OfflineCaptureSource, OfflineBackend, MirrorController) {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let backend = OfflineBackend::new(48000);
        let controller =
            MirrorController::new(Arc::new(source.clone()), Arc::new(backend.clone()));
        (source, backend, controller)
    }

    #[tokio::test]
    async fn start_und_stop() {
        let (source, backend, controller) = controller();
        assert_eq!(controller.status(), Status::Inactive);

        assert_eq!(controller.start().await, Status::Active);
        assert_eq!(controller.state(), MirrorState::Active);
        assert_eq!(backend.offene_kontexte(), 1);
        assert_eq!(source.aktive_handles(), 1);

        assert_eq!(controller.stop(), Status::Inactive);
        assert_eq!(controller.state(), MirrorState::Idle);
        assert_eq!(backend.offene_kontexte(), 0);
        assert_eq!(source.aktive_handles(), 0);
    }

    #[tokio::test]
    async fn doppelter_start_ist_wirkungslos() {
        let (source, backend, controller) = controller();
        controller.start().await;
        let epoch = controller.session_epoch();
        controller.start().await;
        assert_eq!(controller.session_epoch(), epoch);
        assert_eq!(source.anfragen(), 1);
        assert_eq!(backend.geoeffnete_kontexte(), 1);
    }

    #[tokio::test]
    async fn stop_im_leerlauf_ist_harmlos() {
        let (_, _, controller) = controller();
        assert_eq!(controller.stop(), Status::Inactive);
        assert_eq!(controller.stop(), Status::Inactive);
    }

    #[tokio::test]
    async fn parameter_vor_start_wirken_nach_start() {
        let (_, _, controller) = controller();
        controller.set_eq_gain(12.0);
        controller.start().await;
        let werte = controller.stage_values().unwrap();
        let (_, eq) = werte
            .iter()
            .find(|(k, _)| *k == StageKind::PeakingEq)
            .unwrap();
        assert!(eq.contains(&(ParamField::Gain, 12.0)));
    }

    #[tokio::test]
    async fn metriken_zaehlen_sessions() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let backend = OfflineBackend::new(48000);
        let metrics = MirrorMetrics::neu().unwrap();
        let controller = MirrorController::new(Arc::new(source), Arc::new(backend))
            .with_metrics(metrics.clone());

        controller.start().await;
        assert_eq!(metrics.sessions_started_total.get(), 1);
        assert_eq!(metrics.session_active.get(), 1);
        controller.set_volume(8.0);
        assert_eq!(metrics.volume_warnings_total.get(), 1);
        controller.stop();
        assert_eq!(metrics.session_active.get(), 0);
    }

    #[tokio::test]
    async fn drop_raeumt_auf() {
        let (source, backend, controller) = controller();
        controller.start().await;
        drop(controller);
        assert_eq!(backend.offene_kontexte(), 0);
        assert_eq!(source.aktive_handles(), 0);
    }
}
