//! audify-core – Gemeinsame Typen, Parameter-Tabellen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Signal-Graph,
//! Lifecycle-Controller und Bedienoberflaeche gemeinsam nutzen.

pub mod error;
pub mod event;
pub mod params;
pub mod status;

// Re-Exporte fuer bequemen Zugriff
pub use error::{MirrorError, Result};
pub use event::MirrorEvent;
pub use params::{
    Bereich, FieldSpec, ParamField, Parameter, ParameterSet, StageKind, LAUTSTAERKE_WARNSCHWELLE,
};
pub use status::{MirrorState, Status};
