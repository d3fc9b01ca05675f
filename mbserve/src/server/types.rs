use std::net::{Ipv4Addr, SocketAddr};

use crate::decode::DecodeLevel;
use crate::types::UnitId;

/// Controls which unit ids the server answers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UnitIdFilter {
    /// Answer requests addressed to any unit id
    #[default]
    Any,
    /// Only answer requests addressed to this unit id, others are dropped without a response
    Specific(UnitId),
}

impl UnitIdFilter {
    /// true if a request for `unit_id` should be processed
    pub fn accepts(self, unit_id: UnitId) -> bool {
        match self {
            UnitIdFilter::Any => true,
            UnitIdFilter::Specific(x) => x == unit_id,
        }
    }
}

/// What the server does once a client disconnects
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// Serve a single client, then stop the server task
    Once,
    /// Go back to accepting connections, serving one client at a time
    #[default]
    Sequential,
}

/// Configuration of a TCP server task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// address the listening socket is bound to
    pub address: SocketAddr,
    /// unit ids the server answers
    pub unit_filter: UnitIdFilter,
    /// behavior once a client disconnects
    pub policy: ConnectionPolicy,
    /// logging of the traffic on each connection
    pub decode: DecodeLevel,
}

impl ServerConfig {
    /// Configuration listening on `address` with every other option at its default
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            unit_filter: UnitIdFilter::default(),
            policy: ConnectionPolicy::default(),
            decode: DecodeLevel::default(),
        }
    }

    /// Set the unit id filter
    pub fn with_unit_filter(self, unit_filter: UnitIdFilter) -> Self {
        Self {
            unit_filter,
            ..self
        }
    }

    /// Set the connection policy
    pub fn with_policy(self, policy: ConnectionPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Set the decode level
    pub fn with_decode(self, decode: DecodeLevel) -> Self {
        Self { decode, ..self }
    }
}

/// Listens on all interfaces on port 502
impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((
            Ipv4Addr::UNSPECIFIED,
            crate::constants::DEFAULT_TCP_PORT,
        )))
    }
}
