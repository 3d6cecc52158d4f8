//! Geraete-Auswahl und -Auflistung fuer den cpal-Host

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Richtung eines Geraets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    Eingabe,
    Ausgabe,
}

/// Geraet mit den fuer die Anzeige relevanten Eigenschaften
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub richtung: Richtung,
    /// Gaengige Abtastraten, die das Geraet unterstuetzt
    pub sample_rates: Vec<u32>,
    pub channels: u16,
    pub ist_standard: bool,
}

const GAENGIGE_RATEN: [u32; 5] = [16000, 22050, 44100, 48000, 96000];

/// Listet alle Geraete einer Richtung auf
pub fn list_devices(richtung: Richtung) -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let (devices, standard): (Vec<Device>, _) = match richtung {
        Richtung::Eingabe => (
            host.input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?
                .collect(),
            host.default_input_device().and_then(|d| d.name().ok()),
        ),
        Richtung::Ausgabe => (
            host.output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?
                .collect(),
            host.default_output_device().and_then(|d| d.name().ok()),
        ),
    };

    let mut result = Vec::new();
    for device in devices {
        match beschreiben(&device, richtung) {
            Ok(mut ad) => {
                ad.ist_standard = standard.as_deref() == Some(ad.name.as_str());
                result.push(ad);
            }
            Err(e) => warn!(?richtung, "Geraet konnte nicht gelesen werden: {}", e),
        }
    }
    debug!(?richtung, anzahl = result.len(), "Geraete aufgelistet");
    Ok(result)
}

/// Laedt ein Eingabegeraet; `None` waehlt das Standardgeraet
pub fn load_cpal_input_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or(AudioError::KeinStandardEingabegeraet),
        Some(n) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            nach_name(devices, n)
        }
    }
}

/// Laedt ein Ausgabegeraet; `None` waehlt das Standardgeraet
pub fn load_cpal_output_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet),
        Some(n) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            nach_name(devices, n)
        }
    }
}

fn nach_name(mut devices: impl Iterator<Item = Device>, name: &str) -> AudioResult<Device> {
    devices
        .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
        .ok_or_else(|| AudioError::GeraetNichtGefunden(name.to_string()))
}

fn beschreiben(device: &Device, richtung: Richtung) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let bereiche: Vec<(u32, u32, u16)> = match richtung {
        Richtung::Eingabe => device
            .supported_input_configs()
            .map(|it| {
                it.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                    .collect()
            })
            .unwrap_or_default(),
        Richtung::Ausgabe => device
            .supported_output_configs()
            .map(|it| {
                it.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                    .collect()
            })
            .unwrap_or_default(),
    };

    Ok(AudioDevice {
        name,
        richtung,
        sample_rates: raten_aus_bereichen(&bereiche),
        channels: bereiche.iter().map(|b| b.2).max().unwrap_or(1),
        ist_standard: false,
    })
}

fn raten_aus_bereichen(bereiche: &[(u32, u32, u16)]) -> Vec<u32> {
    GAENGIGE_RATEN
        .iter()
        .copied()
        .filter(|r| bereiche.iter().any(|(min, max, _)| r >= min && r <= max))
        .collect()
}
