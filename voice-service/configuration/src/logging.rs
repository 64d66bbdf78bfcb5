use tracing_subscriber::EnvFilter;

use crate::{LogFormat, VoiceConfig};

/// Installs the global fmt subscriber. `RUST_LOG` wins over `logging.level`.
pub fn setup_logging(config: &VoiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match config.logging.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    if let Err(err) = installed {
        tracing::debug!(error = %err, "logging subscriber already installed");
    }
}
