//! Audify – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die
//! Befehlsschleife.

use anyhow::Result;
use audify::{config::AppConfig, App};
use audify_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("AUDIFY_CONFIG").unwrap_or_else(|_| "audify.toml".into());

    let config = AppConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        abtastrate = config.audio.abtastrate,
        "Audify wird initialisiert"
    );

    let app = App::neu(&config)?;
    app.laufen().await?;

    tracing::info!("Audify beendet");
    Ok(())
}
