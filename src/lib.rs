//! BLE peripheral scanning and connection core.
//!
//! Owns the scan session, a registry of every peripheral seen, and the
//! connect/disconnect toggling for each of them. The radio itself is behind
//! the [`ble::provider::BleProvider`] trait; the screen is behind the
//! [`ble::Command`] / [`ble::Notice`] channels.
//!
//! The crate is `no_std` (fixed-capacity `heapless` containers, Embassy
//! channels) so the same logic runs on an embedded central and on a host.
//! Enable `btleplug` for the host provider and the terminal front-end.
//!
//! Usage: `cargo test` runs everything on the host.
//!
//! ```no_run
//! use blescan::ble::{manager::BleManager, Notice};
//! use blescan::config::NOTICE_QUEUE_DEPTH;
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use embassy_sync::channel::Channel;
//! # use blescan::ble::provider::{BleProvider, ConnectedList};
//! # use blescan::config::StartOptions;
//! # use blescan::error::BleError;
//! # struct Radio;
//! # impl BleProvider for Radio {
//! #     async fn enable_radio(&self) -> Result<(), BleError> { Ok(()) }
//! #     async fn start(&self, _: &StartOptions) -> Result<(), BleError> { Ok(()) }
//! #     async fn scan(&self, _: &[u16], _: u64, _: bool) -> Result<(), BleError> { Ok(()) }
//! #     async fn connect(&self, _: &str) -> Result<(), BleError> { Ok(()) }
//! #     async fn disconnect(&self, _: &str) -> Result<(), BleError> { Ok(()) }
//! #     async fn connected_peripherals(&self, _: &[u16]) -> Result<ConnectedList, BleError> {
//! #         Ok(ConnectedList::new())
//! #     }
//! # }
//! # async fn demo() {
//! let notices: Channel<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH> = Channel::new();
//! let manager = BleManager::new(Radio, notices.dyn_sender());
//!
//! manager.start_scan().await.unwrap();
//! for record in manager.snapshot() {
//!     // render record.label(), record.rssi, record.connected
//! }
//! # }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;

pub use ble::manager::BleManager;
pub use error::{BleError, Error};
