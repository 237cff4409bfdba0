//! Crate-wide constants and runtime configuration.
//!
//! Capacities, timing parameters and queue depths live here so they can be
//! tuned in one place.

use heapless::Vec;

use crate::error::Error;

// Scanning

/// Duration of a BLE scan window (seconds).
pub const SCAN_DURATION_SECS: u64 = 5;

/// Report every advertisement, including repeats from the same peripheral.
pub const SCAN_ALLOW_DUPLICATES: bool = true;

/// Maximum number of 16-bit service UUIDs a scan can filter on.
pub const MAX_SERVICE_FILTERS: usize = 4;

// Registry

/// Maximum number of peripherals tracked by the registry.
/// Must be a power of two (`heapless::FnvIndexMap` requirement).
pub const REGISTRY_CAPACITY: usize = 32;

/// Capacity of a peripheral identity string.
/// Fits a MAC address (17) and a textual UUID (36).
pub const PEER_ID_LEN: usize = 40;

/// Capacity of a peripheral name (longer names are truncated).
pub const PEER_NAME_LEN: usize = 32;

/// Capacity of a user-visible notice label.
pub const LABEL_LEN: usize = 48;

// Queues

/// Depth of the provider → core event channel.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Depth of the presentation → core command channel.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// Commands held back while another command is in flight.
pub const COMMAND_BACKLOG: usize = 4;

/// Depth of the core → presentation notice channel.
pub const NOTICE_QUEUE_DEPTH: usize = 8;

/// Parameters handed to the provider when a scan session starts.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanConfig {
    /// 16-bit service UUIDs; empty means "any peripheral".
    pub service_filters: Vec<u16, MAX_SERVICE_FILTERS>,
    /// Session length in seconds.
    pub duration_secs: u64,
    /// Deliver repeated observations of one peripheral within a session.
    pub allow_duplicates: bool,
}

impl ScanConfig {
    /// Restrict the scan to peripherals advertising `uuid`.
    ///
    /// Fails once [`MAX_SERVICE_FILTERS`] filters are set.
    pub fn with_service(mut self, uuid: u16) -> Result<Self, Error> {
        self.service_filters
            .push(uuid)
            .map_err(|_| Error::TooManyFilters)?;
        Ok(self)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            service_filters: Vec::new(),
            duration_secs: SCAN_DURATION_SECS,
            allow_duplicates: SCAN_ALLOW_DUPLICATES,
        }
    }
}

/// One-time provider initialisation options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartOptions {
    /// Let the platform show its own "Bluetooth is off" prompt.
    pub show_alert: bool,
}
