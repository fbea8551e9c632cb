use serde::Deserialize;
use std::{fs, path::PathBuf};

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_use_system_clock() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    #[serde(default = "default_port")]
    pub port: String,
    /// Stamp readings with the host clock rather than the meter's.
    #[serde(default = "default_use_system_clock")]
    pub use_system_clock: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            use_system_clock: default_use_system_clock(),
        }
    }
}

/// One output destination. Outputs receive readings in the order they are
/// listed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputConfig {
    /// Appended to, one row per reading.
    Csv { path: PathBuf },
    /// Overwritten at startup.
    Json { path: PathBuf },
    /// Overwritten at startup.
    Xml { path: PathBuf },
    /// `<database-path>:<table>`.
    Sqlite { target: String },
    Rrd { path: PathBuf },
    HttpGet { url: String },
    HttpPost { url: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub meter: MeterConfig,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from the path given as the first argument, else `CC128D_CONFIG`,
    /// else `cc128d.toml`.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::args()
            .nth(1)
            .or_else(|| env::var("CC128D_CONFIG").ok())
            .unwrap_or_else(|| "cc128d.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.meter.port, "/dev/ttyUSB0");
        assert!(cfg.meter.use_system_clock);
        assert!(cfg.outputs.is_empty());
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn outputs_keep_their_configured_order() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [meter]
            port = "/dev/ttyACM0"
            use_system_clock = false

            [metrics]
            bind_addr = "127.0.0.1:9128"

            [[outputs]]
            kind = "xml"
            path = "readings.xml"

            [[outputs]]
            kind = "csv"
            path = "readings.csv"

            [[outputs]]
            kind = "sqlite"
            target = "readings.db:readings"

            [[outputs]]
            kind = "http_get"
            url = "http://localhost/submit?key=abc"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.meter.port, "/dev/ttyACM0");
        assert!(!cfg.meter.use_system_clock);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9128");
        assert_eq!(
            cfg.outputs,
            vec![
                OutputConfig::Xml {
                    path: "readings.xml".into()
                },
                OutputConfig::Csv {
                    path: "readings.csv".into()
                },
                OutputConfig::Sqlite {
                    target: "readings.db:readings".to_string()
                },
                OutputConfig::HttpGet {
                    url: "http://localhost/submit?key=abc".to_string()
                },
            ]
        );
    }

    #[test]
    fn unknown_output_kind_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [[outputs]]
            kind = "carrier_pigeon"
            path = "coop"
            "#,
        );
        assert!(res.is_err());
    }
}
