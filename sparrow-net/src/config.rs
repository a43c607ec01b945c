//! TOML-loadable configuration for a live deployment, with environment
//! variable overrides for the handful of values worth overriding in place
//! (container entrypoints). Grounded in `knhk-sidecar/src/config.rs`'s
//! `SidecarConfig::from_file` + section-struct shape.

use crate::error::{NetError, NetResult};
use crate::DEFAULT_DONE_PORT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    pub worker: WorkerSection,
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Address this worker's RPC listener binds to.
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// This scheduler's own IP, sent as `sched_ip` on REQUEST/ASSIGN so
    /// workers know where to dial their DONE callback.
    pub own_ip: String,
    /// Port this scheduler's DONE callback listener binds to.
    pub done_port: u16,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            worker: WorkerSection {
                listen_addr: "0.0.0.0:7000".to_string(),
            },
            scheduler: SchedulerSection {
                own_ip: "127.0.0.1".to_string(),
                done_port: DEFAULT_DONE_PORT,
            },
        }
    }
}

impl NetConfig {
    pub fn from_file(path: &str) -> NetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NetError::Config(e.to_string()))
    }

    /// Applies `SPARROW_LISTEN_ADDR` / `SPARROW_DONE_PORT` overrides on top
    /// of whatever was loaded from file or defaulted, matching
    /// `knhk-sidecar/src/main.rs`'s `env::var(...).unwrap_or_else(...)`
    /// pattern.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("SPARROW_LISTEN_ADDR") {
            self.worker.listen_addr = addr;
        }
        if let Ok(port) = std::env::var("SPARROW_DONE_PORT") {
            if let Ok(port) = port.parse() {
                self.scheduler.done_port = port;
            }
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_the_documented_done_port() {
        assert_eq!(NetConfig::default().scheduler.done_port, DEFAULT_DONE_PORT);
    }

    #[test]
    fn env_override_replaces_listen_addr() {
        std::env::set_var("SPARROW_LISTEN_ADDR", "127.0.0.1:9999");
        let cfg = NetConfig::default().with_env_overrides();
        assert_eq!(cfg.worker.listen_addr, "127.0.0.1:9999");
        std::env::remove_var("SPARROW_LISTEN_ADDR");
    }
}
