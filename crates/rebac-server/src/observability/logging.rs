//! Structured logging setup driven by [`LoggingSettings`].
//!
//! With `logging.json` set, every event is written as one JSON object:
//!
//! ```json
//! {"timestamp":"2024-01-15T10:30:00.000Z","level":"INFO","target":"rebac_domain::listobjects","fields":{"message":"ListObjects completed","strategy":"reverse_expand","count":3}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let config = ServerConfig::load("config.yaml")?;
//! rebac_server::observability::init_logging(&config.logging);
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, fmt::MakeWriter, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Installs the global subscriber on stdout.
///
/// `RUST_LOG` takes precedence over `settings.level`. Only the first call in
/// a process has an effect.
pub fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(settings));
    let _ = tracing::subscriber::set_global_default(subscriber(settings, filter, std::io::stdout));
}

/// Filter admitting events at `settings.level` and above. Unknown levels
/// fall back to INFO; `ServerConfig::validate` rejects them earlier.
fn level_filter(settings: &LoggingSettings) -> EnvFilter {
    let level = settings
        .level
        .to_lowercase()
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    EnvFilter::new(level.as_str().to_lowercase())
}

/// JSON or pretty text, depending on `settings.json`.
fn subscriber<W>(
    settings: &LoggingSettings,
    filter: EnvFilter,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Clone + Send + Sync + 'static,
{
    let json = settings.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(writer.clone())
            .with_current_span(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
    });
    let text = (!settings.json).then(|| {
        fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
    });

    tracing_subscriber::registry().with(filter).with(json).with(text)
}
