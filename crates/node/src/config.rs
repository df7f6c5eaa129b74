use {
    crate::{connection::Timeouts, jobs::Intervals},
    domain::PortFloors,
    node_api::{Credentials, Endpoint, NodeAddr},
    serde::{de::Error as _, Deserialize},
    std::{net::SocketAddr, path::PathBuf, time::Duration},
};

/// Process configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Contact of the metadata shard used until its primary is discovered.
    pub meta_bootstrap: Endpoint,

    /// Lowest ports storage and computer instances may be assigned.
    pub port_floors: PortFloors,

    /// Address of the HTTP listener serving admin requests and metrics.
    pub http_addr: SocketAddr,

    pub intervals: Intervals,
    pub timeouts: Timeouts,
    pub logging: Logging,
}

/// Where and how the process logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Logging {
    /// `EnvFilter` directives, e.g. `info,cmgr_coordinator=debug`.
    pub level: String,

    pub format: LogFormat,

    /// Log into this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> envy::Result<Self> {
        Self::from_raw(envy::from_env()?)
    }

    pub fn from_iter<I>(iter: I) -> envy::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::from_raw(envy::from_iter(iter)?)
    }

    fn from_raw(raw: RawConfig) -> envy::Result<Self> {
        let defaults = PortFloors::default();
        let http_addr = raw.http_addr.as_deref().unwrap_or("0.0.0.0:58000");

        Ok(Self {
            meta_bootstrap: Endpoint::new(
                NodeAddr::new(raw.meta_host, raw.meta_port),
                Credentials::new(raw.meta_user, raw.meta_password),
            ),
            port_floors: PortFloors {
                storage: raw.storage_port_start.unwrap_or(defaults.storage),
                compute: raw.computer_port_start.unwrap_or(defaults.compute),
            },
            http_addr: http_addr
                .parse()
                .map_err(|_| envy::Error::custom(format!("Invalid HTTP_ADDR: {http_addr}")))?,
            intervals: Intervals {
                refresh: millis(raw.refresh_interval_ms, 5000)?,
                stats: millis(raw.stats_interval_ms, 60_000)?,
                commit_log: millis(raw.commit_log_interval_ms, 600_000)?,
            },
            timeouts: Timeouts {
                short: millis(raw.query_timeout_short_ms, 1000)?,
                normal: millis(raw.query_timeout_normal_ms, 3000)?,
                long: millis(raw.query_timeout_long_ms, 30_000)?,
            },
            logging: Logging {
                level: raw.log_level.unwrap_or_else(|| "info".to_owned()),
                format: raw.log_format.unwrap_or_default(),
                file: raw.log_file,
            },
        })
    }

    pub fn coordinator(&self) -> coordinator::Config {
        coordinator::Config {
            bootstrap: self.meta_bootstrap.clone(),
            port_floors: self.port_floors,
        }
    }
}

// Each field name in this struct corresponds to the environment variable
// (upper-cased).
#[derive(Debug, Deserialize)]
struct RawConfig {
    meta_host: String,
    meta_port: u16,
    meta_user: String,
    meta_password: String,

    storage_port_start: Option<u16>,
    computer_port_start: Option<u16>,

    http_addr: Option<String>,

    refresh_interval_ms: Option<u64>,
    stats_interval_ms: Option<u64>,
    commit_log_interval_ms: Option<u64>,

    query_timeout_short_ms: Option<u64>,
    query_timeout_normal_ms: Option<u64>,
    query_timeout_long_ms: Option<u64>,

    log_level: Option<String>,
    log_format: Option<LogFormat>,
    log_file: Option<PathBuf>,
}

/// Parses a positive number of milliseconds.
fn millis(value: Option<u64>, default: u64) -> envy::Result<Duration> {
    match value.unwrap_or(default) {
        0 => Err(envy::Error::custom("Durations must be positive")),
        ms => Ok(Duration::from_millis(ms)),
    }
}
