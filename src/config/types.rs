use serde::Deserialize;
use std::path::PathBuf;

/// Worker properties read from `strest-worker.toml` or `strest-worker.json`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub worker_id: Option<String>,
    pub script: Option<PathBuf>,
    pub threads: Option<usize>,
    pub runs: Option<u64>,
    pub duration_ms: Option<u64>,
    pub report_interval_ms: Option<u64>,
    pub wait_for_start: Option<bool>,
    pub wait_for_stop: Option<bool>,
    pub max_shutdown_wait_ms: Option<u64>,
    pub console: Option<ConsoleConfig>,
    pub control: Option<ControlConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub report: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// `host:port` for the TCP control listener.
    pub listen: Option<String>,
    pub listeners: Option<usize>,
    pub receiver_threads: Option<usize>,
}
