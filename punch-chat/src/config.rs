//! Session configuration.
//!
//! Built once at startup and handed to every component; nothing is global.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::discovery::DISCOVERY_PORT;
use crate::listener::READ_DEADLINE;
use crate::puncher::KeepaliveConfig;

/// Environment variable holding the discovery host's IP.
pub const DISCOVERY_IP_ENV: &str = "PUNCH_DISCOVERY_IP";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} port must be greater than 0")]
    ZeroPort(&'static str),
    #[error("invalid {which} IP address: {value:?}")]
    InvalidIp { which: &'static str, value: String },
    #[error("keepalive interval {0:?} is outside 100ms..=60s")]
    KeepaliveOutOfRange(Duration),
}

/// Everything a session needs to know, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub local_port: u16,
    pub peer: SocketAddr,
    pub discovery: SocketAddr,
    pub keepalive: KeepaliveConfig,
    /// Bounded wait of one listener receive.
    pub read_deadline: Duration,
}

impl SessionConfig {
    /// Validate raw startup values.
    pub fn new(
        local_port: u16,
        peer_ip: &str,
        peer_port: u16,
        discovery_ip: &str,
        keepalive_interval: Duration,
    ) -> Result<Self, ConfigError> {
        if local_port == 0 {
            return Err(ConfigError::ZeroPort("local"));
        }
        if peer_port == 0 {
            return Err(ConfigError::ZeroPort("peer"));
        }
        let peer_ip = parse_ip("peer", peer_ip)?;
        let discovery_ip = parse_ip("discovery", discovery_ip)?;
        if !(KeepaliveConfig::MIN_INTERVAL..=KeepaliveConfig::MAX_INTERVAL)
            .contains(&keepalive_interval)
        {
            return Err(ConfigError::KeepaliveOutOfRange(keepalive_interval));
        }

        Ok(Self {
            local_port,
            peer: SocketAddr::new(peer_ip, peer_port),
            discovery: SocketAddr::new(discovery_ip, DISCOVERY_PORT),
            keepalive: KeepaliveConfig {
                interval: keepalive_interval,
            },
            read_deadline: READ_DEADLINE,
        })
    }
}

fn parse_ip(which: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidIp {
        which,
        value: value.to_string(),
    })
}
