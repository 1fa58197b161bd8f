use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::retry::{RetryPolicy, DEFAULT_RETRY_LIMIT, DEFAULT_RETRY_WAIT};

pub const DEFAULT_BALANCE_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_HOLD_TIME: Duration = Duration::from_millis(3500);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_REGISTRY_ADDR: &str = "0.0.0.0:1099";
pub const DEFAULT_REPLICA_ADDR: &str = "0.0.0.0:1100";
pub const DEFAULT_CLIENT_PUSH_PORT: u16 = 1101;

/// Cache-consistency mode of a replica, fixed for its lifetime.
///
/// - `ProxyPull`: every replica caches independently with a TTL
/// - `MasterPush`: entries live until invalidated by the writer or the master
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    #[default]
    ProxyPull,
    MasterPush,
}

impl CacheMode {
    pub fn is_master_push(&self) -> bool {
        matches!(self, Self::MasterPush)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProxyPull => "proxy-pull",
            Self::MasterPush => "master-push",
        }
    }
}

impl FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy-pull" | "proxypull" | "pull" => Ok(Self::ProxyPull),
            "master-push" | "masterpush" | "push" => Ok(Self::MasterPush),
            other => Err(Error::Config(format!(
                "CACHE_MODE must be proxy-pull or master-push, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings for the registry process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub bind_addr: SocketAddr,
    pub balance_interval: Duration,
    pub hold_time: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1099)),
            balance_interval: DEFAULT_BALANCE_INTERVAL,
            hold_time: DEFAULT_HOLD_TIME,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        Ok(Self {
            bind_addr: parse_addr(
                "BIND_ADDR",
                var("BIND_ADDR").as_deref().unwrap_or(DEFAULT_REGISTRY_ADDR),
            )?,
            balance_interval: millis(&var, "BALANCE_INTERVAL_MS", DEFAULT_BALANCE_INTERVAL)?,
            hold_time: millis(&var, "HOLD_TIME_MS", DEFAULT_HOLD_TIME)?,
        })
    }
}

/// Settings for a replica process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaConfig {
    pub mode: CacheMode,
    pub bind_addr: SocketAddr,
    /// Address other processes reach this replica on. Also decides mastership.
    pub advertise_addr: String,
    pub registry_url: String,
    /// Backend store base URL. When unset the backend is resolved through the registry.
    pub backend_url: Option<String>,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
    pub client_push_port: u16,
}

impl ReplicaConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mode = match var("CACHE_MODE") {
            Some(value) => value.parse()?,
            None => CacheMode::default(),
        };
        let bind_addr = parse_addr(
            "BIND_ADDR",
            var("BIND_ADDR").as_deref().unwrap_or(DEFAULT_REPLICA_ADDR),
        )?;
        let advertise_addr = match var("ADVERTISE_ADDR") {
            Some(addr) => addr,
            None if bind_addr.ip().is_unspecified() => {
                return Err(Error::Config(format!(
                    "ADVERTISE_ADDR must be set when binding to {}",
                    bind_addr.ip()
                )))
            }
            None => bind_addr.ip().to_string(),
        };
        let registry_url = var("REGISTRY_URL")
            .ok_or_else(|| Error::Config("REGISTRY_URL must be set".to_string()))?;
        let attempts = match var("RETRY_LIMIT") {
            Some(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("RETRY_LIMIT is not a number: {value:?}")))?,
            None => DEFAULT_RETRY_LIMIT,
        };
        let client_push_port = match var("CLIENT_PUSH_PORT") {
            Some(value) => value.parse().map_err(|_| {
                Error::Config(format!("CLIENT_PUSH_PORT is not a port: {value:?}"))
            })?,
            None => DEFAULT_CLIENT_PUSH_PORT,
        };

        Ok(Self {
            mode,
            bind_addr,
            advertise_addr,
            registry_url,
            backend_url: var("BACKEND_URL"),
            heartbeat_interval: millis(&var, "HEARTBEAT_INTERVAL_MS", DEFAULT_HEARTBEAT_INTERVAL)?,
            retry: RetryPolicy::new(
                attempts,
                millis(&var, "RETRY_WAIT_MS", DEFAULT_RETRY_WAIT)?,
            ),
            client_push_port,
        })
    }
}

fn parse_addr(name: &str, value: &str) -> Result<SocketAddr, Error> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{name} is not a socket address: {value:?}")))
}

fn millis(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, Error> {
    match var(name) {
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| Error::Config(format!("{name} is not a number of milliseconds: {value:?}"))),
        None => Ok(default),
    }
}
