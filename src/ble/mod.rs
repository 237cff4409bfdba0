//! Bluetooth Low Energy central-role core.
//!
//! This module owns everything between the radio and the screen:
//!
//! 1. **Scanner** - the scan session state machine (Idle / Scanning).
//! 2. **Registry** - every peripheral seen or reported connected, keyed by
//!    identity, in first-seen order.
//! 3. **Connection coordinator** - connect/disconnect toggling with a
//!    per-identity pending guard.
//! 4. **Manager** - composes the three over a [`provider::BleProvider`]
//!    and runs the event loop.
//!
//! Communication with the presentation layer is done via Embassy channels:
//! [`Command`]s in, [`Notice`]s out. The provider feeds [`BleEvent`]s.

pub mod adv_parser;
pub mod connection;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod scanner;

#[cfg(feature = "btleplug")]
pub mod host;


use core::fmt;

use heapless::String;

use crate::config::{LABEL_LEN, PEER_ID_LEN, PEER_NAME_LEN};
use crate::error::Error;

/// Opaque, stable peripheral identity (hardware address or platform UUID).
pub type PeripheralId = String<PEER_ID_LEN>;

/// Human-readable peripheral name.
pub type PeripheralName = String<PEER_NAME_LEN>;

/// Build a [`PeripheralId`], rejecting empty or oversized identities.
///
/// Identities are never truncated: two long ids sharing a prefix would
/// otherwise collapse into one record.
pub fn peripheral_id(raw: &str) -> Result<PeripheralId, Error> {
    if raw.is_empty() {
        return Err(Error::InvalidPeripheralId);
    }
    let mut id = PeripheralId::new();
    id.push_str(raw).map_err(|_| Error::InvalidPeripheralId)?;
    Ok(id)
}

/// Build a [`PeripheralName`], truncating at a char boundary.
pub fn peripheral_name(raw: &str) -> PeripheralName {
    let mut name = PeripheralName::new();
    for c in raw.chars() {
        if name.push(c).is_err() {
            break;
        }
    }
    name
}

/// One advertisement report: who, what it calls itself, how loud.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryObservation {
    pub id: PeripheralId,
    pub name: Option<PeripheralName>,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i16,
}

impl DiscoveryObservation {
    pub fn new(id: &str, name: Option<&str>, rssi: i16) -> Result<Self, Error> {
        Ok(Self {
            id: peripheral_id(id)?,
            name: name.map(peripheral_name),
            rssi,
        })
    }

    /// Build an observation from raw advertisement data.
    pub fn from_advertisement(id: &str, rssi: i16, data: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            id: peripheral_id(id)?,
            name: adv_parser::extract_device_name(data),
            rssi,
        })
    }
}

/// A peripheral as the screen shows it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralRecord {
    pub id: PeripheralId,
    pub name: Option<PeripheralName>,
    /// RSSI at the last discovery observation (dBm).
    pub rssi: i16,
    /// Set only on a confirmed connect / disconnect.
    pub connected: bool,
}

impl PeripheralRecord {
    fn discovered(observation: DiscoveryObservation) -> Self {
        Self {
            id: observation.id,
            name: observation.name,
            rssi: observation.rssi,
            connected: false,
        }
    }

    /// Name if advertised, identity otherwise.
    pub fn label(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => self.id.as_str(),
        }
    }
}

/// Events the provider publishes for the core.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleEvent {
    /// An advertisement was received during a scan.
    Discovered(DiscoveryObservation),
    /// The scan session ended (timer elapsed or external stop).
    ScanStopped,
}

/// Commands the presentation layer can send to the core.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Start a scan session (ignored while one is running).
    StartScan,
    /// Connect if disconnected, disconnect if connected.
    Toggle(PeripheralId),
    /// Re-enumerate the peripherals the platform reports connected.
    RefreshConnected,
}

/// Notices the core publishes for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notice {
    /// Scan session started.
    ScanStarted,
    /// Scan session ended.
    ScanStopped,
    /// The registry changed; re-render the snapshot.
    RegistryChanged,
    /// Connect confirmed; carries the peripheral label.
    Connected(String<LABEL_LEN>),
    /// Disconnect confirmed; carries the peripheral label.
    Disconnected(String<LABEL_LEN>),
    /// A user-triggered action failed.
    Failed(Error),
}

impl Notice {
    pub(crate) fn connected(label: &str) -> Self {
        Notice::Connected(label_string(label))
    }

    pub(crate) fn disconnected(label: &str) -> Self {
        Notice::Disconnected(label_string(label))
    }

    /// True for notices that should pop up as a user alert.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Notice::Connected(_) | Notice::Disconnected(_) | Notice::Failed(_)
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ScanStarted => f.write_str("Scanning..."),
            Notice::ScanStopped => f.write_str("Scan is stopped"),
            Notice::RegistryChanged => f.write_str("Device list updated"),
            Notice::Connected(name) => write!(f, "Connected to {}", name),
            Notice::Disconnected(name) => write!(f, "Disconnected from {}", name),
            Notice::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// What a successful toggle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionChange {
    Connected,
    Disconnected,
}

fn label_string(raw: &str) -> String<LABEL_LEN> {
    let mut s = String::new();
    for c in raw.chars() {
        if s.push(c).is_err() {
            break;
        }
    }
    s
}
