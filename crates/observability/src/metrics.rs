//! Prometheus-kompatible Metriken fuer den Mikrofon-Spiegel
//!
//! Registrierte Metriken:
//! - `audify_sessions_started_total` – Counter: Erfolgreich gestartete Sessions
//! - `audify_session_active` – Gauge: 1 solange eine Session laeuft
//! - `audify_permission_denied_total` – Counter: Abgelehnte Mikrofon-Zugriffe
//! - `audify_graph_build_errors_total` – Counter: Fehlgeschlagene Graph-Aufbauten
//! - `audify_parameter_writes_total` – Counter: Parameter-Aenderungen (parameter)
//! - `audify_test_tones_total` – Counter: Abgespielte Prueftoene
//! - `audify_volume_warnings_total` – Counter: Ueberschreitungen der Warnschwelle
//! - `audify_start_duration_seconds` – Histogram: Start-Anfrage bis aktiv

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Audify-Prometheus-Metriken
#[derive(Clone)]
pub struct MirrorMetrics {
    pub registry: Arc<Registry>,

    pub sessions_started_total: IntCounter,
    pub session_active: IntGauge,
    pub permission_denied_total: IntCounter,
    pub graph_build_errors_total: IntCounter,
    pub parameter_writes_total: IntCounterVec,
    pub test_tones_total: IntCounter,
    pub volume_warnings_total: IntCounter,
    pub start_duration_seconds: Histogram,
}

impl MirrorMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_started_total = IntCounter::with_opts(Opts::new(
            "audify_sessions_started_total",
            "Anzahl erfolgreich gestarteter Spiegel-Sessions",
        ))?;
        registry.register(Box::new(sessions_started_total.clone()))?;

        let session_active = IntGauge::with_opts(Opts::new(
            "audify_session_active",
            "1 solange eine Spiegel-Session aktiv ist",
        ))?;
        registry.register(Box::new(session_active.clone()))?;

        let permission_denied_total = IntCounter::with_opts(Opts::new(
            "audify_permission_denied_total",
            "Anzahl abgelehnter Mikrofon-Zugriffe",
        ))?;
        registry.register(Box::new(permission_denied_total.clone()))?;

        let graph_build_errors_total = IntCounter::with_opts(Opts::new(
            "audify_graph_build_errors_total",
            "Anzahl fehlgeschlagener Signal-Graph-Aufbauten",
        ))?;
        registry.register(Box::new(graph_build_errors_total.clone()))?;

        let parameter_writes_total = IntCounterVec::new(
            Opts::new(
                "audify_parameter_writes_total",
                "Anzahl Parameter-Aenderungen je Regler",
            ),
            &["parameter"],
        )?;
        registry.register(Box::new(parameter_writes_total.clone()))?;

        let test_tones_total = IntCounter::with_opts(Opts::new(
            "audify_test_tones_total",
            "Anzahl abgespielter Prueftoene",
        ))?;
        registry.register(Box::new(test_tones_total.clone()))?;

        let volume_warnings_total = IntCounter::with_opts(Opts::new(
            "audify_volume_warnings_total",
            "Anzahl Ueberschreitungen der Lautstaerke-Warnschwelle",
        ))?;
        registry.register(Box::new(volume_warnings_total.clone()))?;

        let start_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "audify_start_duration_seconds",
                "Dauer von der Start-Anfrage bis zur aktiven Session",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(start_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_started_total,
            session_active,
            permission_denied_total,
            graph_build_errors_total,
            parameter_writes_total,
            test_tones_total,
            volume_warnings_total,
            start_duration_seconds,
        })
    }

    /// Zaehlt eine Parameter-Aenderung
    pub fn parameter_geschrieben(&self, parameter: &str) {
        self.parameter_writes_total
            .with_label_values(&[parameter])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
