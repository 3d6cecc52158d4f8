//! Signal-Graph: Mikrofon -> Kompressor -> Hochpass -> Bass-Shelf ->
//! Peaking-EQ -> Gain -> Ausgang
//!
//! `GraphContext` besitzt den Engine-Kontext und die Live-Parameter der
//! fuenf Stufen. Die Prozessoren selbst leben im Renderer auf dem
//! Realtime-Thread und lesen die Parameter lock-frei.

use std::sync::Arc;

use audify_core::{ParamField, Parameter, StageKind};
use tracing::{debug, info, warn};

use crate::dsp::{AudioProcessor, BiquadStage, Compressor, GainStage};
use crate::error::{AudioError, AudioResult};
use crate::host::{AudioBackend, CaptureHandle, CaptureReader, EngineContext, Renderer};
use crate::params::StageParams;

/// Eine Stufe der Kette mit ihren Live-Parametern
#[derive(Debug, Clone)]
pub struct StageNode {
    params: Arc<StageParams>,
}

impl StageNode {
    fn new(kind: StageKind) -> Self {
        Self {
            params: Arc::new(StageParams::new(kind)),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.params.kind()
    }

    pub fn get(&self, field: ParamField) -> Option<f32> {
        self.params.get(field)
    }

    /// Alle Felder mit aktuellen Werten
    pub fn werte(&self) -> Vec<(ParamField, f32)> {
        self.params.schnappschuss()
    }
}

/// Renderer der Kette: liest das Mikrofon, verarbeitet, begrenzt
struct GraphRenderer {
    reader: CaptureReader,
    kette: Vec<Box<dyn AudioProcessor>>,
}

impl Renderer for GraphRenderer {
    fn render(&mut self, out: &mut [f32]) {
        self.reader.read_into(out);
        for stufe in &mut self.kette {
            stufe.process(out);
        }
        // Destination begrenzt wie ein Hardware-Ausgang
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

fn prozessor(node: &StageNode, sample_rate: f32) -> AudioResult<Box<dyn AudioProcessor>> {
    let params = Arc::clone(&node.params);
    let prozessor: Box<dyn AudioProcessor> = match node.kind() {
        StageKind::Compressor => Box::new(Compressor::new(params, sample_rate)),
        StageKind::Gain => Box::new(GainStage::new(params, sample_rate)),
        kind @ (StageKind::HighPass | StageKind::BassShelf | StageKind::PeakingEq) => {
            Box::new(BiquadStage::new(params, sample_rate).ok_or_else(|| {
                AudioError::GraphAufbau(format!("Kein Filter fuer Stufe {kind}"))
            })?)
        }
    };
    Ok(prozessor)
}

/// Laufender Signal-Graph einer Session
pub struct GraphContext {
    context: Option<Box<dyn EngineContext>>,
    stages: Vec<StageNode>,
}

impl GraphContext {
    /// Baut den Graphen auf einem frischen Kontext auf und startet die Wiedergabe.
    ///
    /// Scheitert ein Schritt nach dem Oeffnen, wird der Kontext vor der
    /// Fehlerrueckgabe geschlossen. Der Capture-Handle bleibt unberuehrt.
    /// Was vor dem Verbinden im Capture-Puffer liegt, wird verworfen; der
    /// Spiegel beginnt immer mit dem aktuellen Mikrofon-Signal.
    pub fn build(backend: &dyn AudioBackend, capture: &dyn CaptureHandle) -> AudioResult<Self> {
        if !capture.is_active() {
            return Err(AudioError::GraphAufbau(
                "Mikrofon-Stream ist nicht aktiv".into(),
            ));
        }
        let reader = capture
            .reader()
            .map_err(|e| AudioError::GraphAufbau(e.to_string()))?;
        let mut context = backend
            .open_context()
            .map_err(|e| AudioError::GraphAufbau(e.to_string()))?;

        let sample_rate = context.sample_rate();
        if capture.sample_rate() != sample_rate {
            warn!(
                capture = capture.sample_rate(),
                ausgabe = sample_rate,
                "Abtastraten unterscheiden sich, keine Umrechnung"
            );
        }

        let stages: Vec<StageNode> = StageKind::KETTE.iter().map(|k| StageNode::new(*k)).collect();
        let kette = match stages
            .iter()
            .map(|n| prozessor(n, sample_rate as f32))
            .collect::<AudioResult<Vec<_>>>()
        {
            Ok(kette) => kette,
            Err(e) => {
                context.close();
                return Err(e);
            }
        };

        reader.verwerfen();
        if let Err(e) = context.connect(Box::new(GraphRenderer { reader, kette })) {
            context.close();
            return Err(AudioError::GraphAufbau(e.to_string()));
        }

        info!(backend = backend.name(), sample_rate, "Signal-Graph aufgebaut");
        Ok(Self {
            context: Some(context),
            stages,
        })
    }

    pub fn is_open(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.context.as_ref().map(|c| c.sample_rate())
    }

    /// Gerenderte Frames seit dem Aufbau
    pub fn sample_clock(&self) -> u64 {
        self.context.as_ref().map_or(0, |c| c.sample_clock())
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageNode> {
        self.stages.iter().find(|n| n.kind() == kind)
    }

    /// Stufen in Kettenreihenfolge; leer nach dem Abbau
    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    /// Liest einen Wert; `None` wenn der Graph abgebaut ist
    pub fn read(&self, stage: StageKind, field: ParamField) -> Option<f32> {
        if !self.is_open() {
            return None;
        }
        self.stage(stage)?.get(field)
    }

    /// Schreibt einen Parameter auf den laufenden Graphen.
    ///
    /// Der Wert wird auf den erlaubten Bereich begrenzt und sofort
    /// wirksam. Gibt den geschriebenen Wert zurueck, `None` wenn der Graph
    /// nicht offen ist oder der Wert NaN ist.
    ///
    /// # Panics
    /// Bei einem Feld, das die Stufe nicht besitzt oder das fest ist.
    pub fn apply_parameter(&self, stage: StageKind, field: ParamField, value: f32) -> Option<f32> {
        let spec = match stage.feld(field) {
            Some(spec) if !spec.ist_fest() => spec,
            _ => panic!("Feld {field} ist fuer Stufe {stage} nicht einstellbar"),
        };
        if !self.is_open() {
            debug!(%stage, %field, "Graph nicht offen, Parameter verworfen");
            return None;
        }
        if value.is_nan() {
            warn!(%stage, %field, "NaN als Parameterwert ignoriert");
            return None;
        }
        let wert = spec.begrenzen(value);
        self.stage(stage)?.params.set(field, wert);
        debug!(%stage, %field, wert, "Parameter gesetzt");
        Some(wert)
    }

    /// Schreibt einen Benutzer-Parameter
    pub fn set(&self, parameter: Parameter, value: f32) -> Option<f32> {
        let (stage, field) = parameter.ziel();
        self.apply_parameter(stage, field, value)
    }

    /// Schliesst den Kontext und gibt alle Knoten frei. Mehrfacher Aufruf
    /// ist erlaubt.
    pub fn teardown(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.close();
            info!(frames = context.sample_clock(), "Signal-Graph abgebaut");
        }
        self.stages.clear();
    }
}

impl Drop for GraphContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::{OfflineBackend, OfflineCaptureSource};
    use crate::host::CaptureSource;

    /// Baut einen Graphen und speist danach `samples` ins Mikrofon ein
    async fn aufbauen(samples: Vec<f32>) -> (OfflineBackend, Box<dyn CaptureHandle>, GraphContext) {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let backend = OfflineBackend::new(48000);
        let capture = source.acquire().await.unwrap();
        let graph = GraphContext::build(&backend, capture.as_ref()).unwrap();
        source.einspeisen(&samples);
        (backend, capture, graph)
    }

    #[tokio::test]
    async fn aufbau_mit_standardwerten() {
        let (backend, _capture, graph) = aufbauen(Vec::new()).await;
        assert!(graph.is_open());
        assert_eq!(backend.offene_kontexte(), 1);
        let kinds: Vec<_> = graph.stages().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, StageKind::KETTE.to_vec());
        assert_eq!(graph.read(StageKind::Compressor, ParamField::Threshold), Some(-24.0));
        assert_eq!(graph.read(StageKind::HighPass, ParamField::Frequency), Some(80.0));
        assert_eq!(graph.read(StageKind::BassShelf, ParamField::Gain), Some(0.0));
        assert_eq!(graph.read(StageKind::PeakingEq, ParamField::Frequency), Some(1000.0));
        assert_eq!(graph.read(StageKind::Gain, ParamField::Gain), Some(3.0));
    }

    #[tokio::test]
    async fn stille_bleibt_stille() {
        let (backend, _capture, _graph) = aufbauen(Vec::new()).await;
        let block = backend.rendern(256).unwrap();
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[tokio::test]
    async fn ausgang_ist_begrenzt() {
        let (backend, _capture, graph) = aufbauen(vec![0.9; 4800]).await;
        graph.set(Parameter::Volume, 10.0);
        let block = backend.rendern(4800).unwrap();
        assert!(block.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(graph.sample_clock(), 4800);
    }

    #[tokio::test]
    async fn rueckstand_vor_dem_aufbau_wird_verworfen() {
        // 500 ms Rueckstand, z.B. aus einem gescheiterten Aufbau
        let source = OfflineCaptureSource::gewaehrend(48000).mit_samples(vec![0.5; 24000]);
        let backend = OfflineBackend::new(48000);
        let capture = source.acquire().await.unwrap();
        assert_eq!(capture.reader().unwrap().available(), 24000);

        let _graph = GraphContext::build(&backend, capture.as_ref()).unwrap();
        assert_eq!(capture.reader().unwrap().available(), 0);
        let block = backend.rendern(4800).unwrap();
        assert!(block.iter().all(|s| *s == 0.0));

        // Neues Signal kommt ohne Verzoegerung durch
        source.einspeisen(&[0.5; 480]);
        let block = backend.rendern(480).unwrap();
        assert!(block.iter().any(|s| s.abs() > 0.0));
    }

    #[tokio::test]
    async fn parameter_werden_begrenzt() {
        let (_backend, _capture, graph) = aufbauen(Vec::new()).await;
        assert_eq!(graph.set(Parameter::Bass, 99.0), Some(15.0));
        assert_eq!(graph.set(Parameter::HighPass, 5.0), Some(20.0));
        assert_eq!(graph.set(Parameter::Volume, f32::NAN), None);
        assert_eq!(graph.read(StageKind::Gain, ParamField::Gain), Some(3.0));
    }

    #[tokio::test]
    async fn abbau_ist_idempotent() {
        let (backend, _capture, mut graph) = aufbauen(Vec::new()).await;
        graph.teardown();
        graph.teardown();
        assert!(!graph.is_open());
        assert!(graph.stages().is_empty());
        assert_eq!(backend.offene_kontexte(), 0);
        assert_eq!(graph.set(Parameter::Volume, 5.0), None);
        assert_eq!(graph.read(StageKind::Gain, ParamField::Gain), None);
    }

    #[tokio::test]
    async fn verbindungsfehler_schliesst_kontext() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let backend = OfflineBackend::new(48000);
        backend.verbinden_scheitern_lassen(true);
        let capture = source.acquire().await.unwrap();
        let err = GraphContext::build(&backend, capture.as_ref()).err().unwrap();
        assert!(matches!(err, AudioError::GraphAufbau(_)));
        assert_eq!(backend.geoeffnete_kontexte(), 1);
        assert_eq!(backend.offene_kontexte(), 0);
        assert!(capture.is_active());
    }

    #[tokio::test]
    async fn gestoppter_handle_wird_abgelehnt() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let backend = OfflineBackend::new(48000);
        let mut capture = source.acquire().await.unwrap();
        capture.stop_tracks();
        assert!(GraphContext::build(&backend, capture.as_ref()).is_err());
        assert_eq!(backend.geoeffnete_kontexte(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "nicht einstellbar")]
    async fn festes_feld_ist_vertragsverletzung() {
        let (_backend, _capture, graph) = aufbauen(Vec::new()).await;
        graph.apply_parameter(StageKind::Compressor, ParamField::Ratio, 4.0);
    }
}
