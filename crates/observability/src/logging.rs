use serde::Deserialize;

/// Filter directive and output format for the fmt subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `quoteflow_infra=debug,info`.
    pub filter: String,
    /// JSON lines when true, human-readable otherwise.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"json": false}"#).unwrap();
        assert_eq!(cfg.filter, "info");
        assert!(!cfg.json);
    }
}
