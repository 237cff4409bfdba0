//! The BLE capability the core drives but does not implement.
//!
//! A provider wraps whatever radio stack the platform has (SoftDevice,
//! BlueZ, CoreBluetooth, a mobile binding). Commands are awaited until the
//! platform confirms them; asynchronous happenings (advertisements, end of
//! a scan window) are pushed by the provider as [`BleEvent`]s into the
//! channel the manager's event pump reads.
//!
//! All methods take `&self`: the manager may have a connect in flight for
//! one peripheral while it issues a disconnect for another.
//!
//! [`BleEvent`]: crate::ble::BleEvent

use heapless::Vec;

use crate::ble::DiscoveryObservation;
use crate::config::{StartOptions, REGISTRY_CAPACITY};
use crate::error::BleError;

/// Peripherals the platform reports as currently connected.
pub type ConnectedList = Vec<DiscoveryObservation, REGISTRY_CAPACITY>;

#[allow(async_fn_in_trait)]
pub trait BleProvider {
    /// Power the radio on (may prompt the user on some platforms).
    async fn enable_radio(&self) -> Result<(), BleError>;

    /// One-time stack initialisation.
    async fn start(&self, options: &StartOptions) -> Result<(), BleError>;

    /// Start a discovery window of `duration_secs`.
    ///
    /// Resolves once the scan is running. The provider must later emit
    /// `BleEvent::ScanStopped` exactly once for this window, and with
    /// `allow_duplicates` it reports every advertisement, not just the
    /// first per peripheral.
    async fn scan(
        &self,
        service_filters: &[u16],
        duration_secs: u64,
        allow_duplicates: bool,
    ) -> Result<(), BleError>;

    /// Connect and resolve once the link is up.
    async fn connect(&self, id: &str) -> Result<(), BleError>;

    /// Disconnect and resolve once the link is down.
    async fn disconnect(&self, id: &str) -> Result<(), BleError>;

    /// Peripherals already connected (possibly by another app).
    async fn connected_peripherals(&self, service_filters: &[u16])
        -> Result<ConnectedList, BleError>;
}
