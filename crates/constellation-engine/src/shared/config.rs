use crate::shared::error::{EngineError, EngineResult};
use constellation_core::{ServiceType, DEFAULT_EVENT_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_DIR: &str = "./config";
pub const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:50061";

/// Engine settings read from `CONSTELLATION_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub config_dir: PathBuf,
    pub admin_addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    pub services: Vec<ServiceType>,
    /// Lifecycle events retained for the `events` process.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 50061)),
            metrics_addr: None,
            services: ServiceType::ALL.to_vec(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables
    /// take their defaults; malformed ones are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let config_dir = var("CONSTELLATION_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

        let admin_addr = parse_addr(
            "CONSTELLATION_ADMIN_ADDR",
            &var("CONSTELLATION_ADMIN_ADDR").unwrap_or_else(|| DEFAULT_ADMIN_ADDR.to_string()),
        )?;

        let metrics_addr = var("CONSTELLATION_METRICS_ADDR")
            .map(|raw| parse_addr("CONSTELLATION_METRICS_ADDR", &raw))
            .transpose()?;

        let services = match var("CONSTELLATION_SERVICES") {
            Some(raw) => parse_services(&raw)?,
            None => ServiceType::ALL.to_vec(),
        };

        let event_capacity = match var("CONSTELLATION_EVENT_CAPACITY") {
            Some(raw) => parse_capacity(&raw)?,
            None => DEFAULT_EVENT_CAPACITY,
        };

        Ok(Self {
            config_dir,
            admin_addr,
            metrics_addr,
            services,
            event_capacity,
        })
    }

    pub fn providers_dir(&self) -> PathBuf {
        self.config_dir.join("providers")
    }
}

fn parse_addr(name: &str, raw: &str) -> EngineResult<SocketAddr> {
    raw.trim()
        .parse()
        .map_err(|e| EngineError::InvalidRequest(format!("{name}='{raw}': {e}")))
}

fn parse_capacity(raw: &str) -> EngineResult<usize> {
    match raw.trim().parse::<usize>() {
        Ok(capacity) if capacity > 0 => Ok(capacity),
        Ok(_) => Err(EngineError::InvalidRequest(
            "CONSTELLATION_EVENT_CAPACITY must be positive".to_string(),
        )),
        Err(e) => Err(EngineError::InvalidRequest(format!(
            "CONSTELLATION_EVENT_CAPACITY='{raw}': {e}"
        ))),
    }
}

fn parse_services(raw: &str) -> EngineResult<Vec<ServiceType>> {
    let mut services = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let service: ServiceType = entry
            .parse()
            .map_err(|e| EngineError::InvalidRequest(format!("CONSTELLATION_SERVICES: {e}")))?;
        if !services.contains(&service) {
            services.push(service);
        }
    }
    Ok(services)
}
