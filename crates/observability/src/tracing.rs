//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::logging::LoggingConfig;

pub fn init() {
    init_with(&LoggingConfig::default());
}

pub fn init_with(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // try_init fails once a global subscriber exists; that is the no-op path.
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_harmless() {
        init();
        init_with(&LoggingConfig {
            filter: "not a [valid filter".to_string(),
            json: false,
        });
        tracing::info!("still logging");
    }
}
