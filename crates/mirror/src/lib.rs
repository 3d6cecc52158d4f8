//! audify-mirror – Steuerung des Mikrofon-Spiegels
//!
//! - `MirrorController`: Zustandsautomat Idle -> Requesting -> Active,
//!   besitzt Mikrofon-Stream und Signal-Graph einer Session
//! - `ParameterSurface`: Sollwerte der sechs Regler, begrenzt und live
//!   auf den laufenden Graphen angewendet
//! - Pruefton-Ausloesung mit eigenem, kurzlebigem Kontext

pub mod controller;
pub mod session;
pub mod surface;

pub use controller::MirrorController;
pub use surface::ParameterSurface;
