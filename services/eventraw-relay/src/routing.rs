//! Device classes and their broker destinations.
//!
//! The first three characters of the company serial identify the hardware
//! family. Each family maps to one routing key on the shared exchange;
//! unrecognized families have no destination and their records are dropped.

use crate::config::AmqpConfig;
use std::fmt;

/// Hardware family derived from the company serial prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// `15F` units
    Series15F,
    /// `25F`, `24J` and `25X` units
    Series25F,
    /// Anything else, including an empty serial
    Unclassified,
}

impl DeviceClass {
    /// Classify a company serial by its three-character prefix
    pub fn from_company_serial(serial: &str) -> Self {
        let prefix: String = serial.chars().take(3).collect();
        match prefix.as_str() {
            "15F" => DeviceClass::Series15F,
            "25F" | "24J" | "25X" => DeviceClass::Series25F,
            _ => DeviceClass::Unclassified,
        }
    }

    pub fn destination(&self) -> Destination {
        match self {
            DeviceClass::Series15F => Destination::Backhaul,
            DeviceClass::Series25F => Destination::PersistentBackhaul,
            DeviceClass::Unclassified => Destination::Discard,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Series15F => write!(f, "15F"),
            DeviceClass::Series25F => write!(f, "25F"),
            DeviceClass::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Logical publish target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Destination A
    Backhaul,
    /// Destination B
    PersistentBackhaul,
    /// No destination; records are dropped without error
    Discard,
}

/// Exchange and routing key of a concrete destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub exchange: String,
    pub routing_key: String,
}

/// Maps destinations to broker routes
#[derive(Debug, Clone)]
pub struct RoutingTable {
    exchange: String,
    backhaul_routing_key: String,
    persistent_routing_key: String,
}

impl RoutingTable {
    pub fn new(config: &AmqpConfig) -> Self {
        Self {
            exchange: config.exchange.clone(),
            backhaul_routing_key: config.backhaul_routing_key.clone(),
            persistent_routing_key: config.persistent_routing_key.clone(),
        }
    }

    /// Route for `destination`, or `None` for [`Destination::Discard`]
    pub fn route(&self, destination: Destination) -> Option<Route> {
        let routing_key = match destination {
            Destination::Backhaul => &self.backhaul_routing_key,
            Destination::PersistentBackhaul => &self.persistent_routing_key,
            Destination::Discard => return None,
        };
        Some(Route {
            exchange: self.exchange.clone(),
            routing_key: routing_key.clone(),
        })
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(&AmqpConfig::default())
    }
}
