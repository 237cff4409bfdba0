//! Unified error type for blescan.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (feature `defmt`) for on-target logging and
//! `core::fmt::Display` for everything else.

use core::fmt;

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Radio could not be enabled or the provider failed to start.
    RadioUnavailable(BleError),

    /// The provider refused to start a scan session.
    ScanStart(BleError),

    /// A connect command failed or was rejected.
    Connect(BleError),

    /// A disconnect command failed or was rejected.
    Disconnect(BleError),

    /// Enumerating already-connected peripherals failed.
    ListConnected(BleError),

    /// No record exists for the requested identity.
    UnknownPeripheral,

    /// A toggle for this identity is still waiting for confirmation.
    Busy,

    /// The registry has no room for another peripheral.
    RegistryFull,

    /// Identity string is empty or longer than `PEER_ID_LEN`.
    InvalidPeripheralId,

    /// The command backlog was full; the command was not run.
    CommandDropped,

    /// More than `MAX_SERVICE_FILTERS` service filters requested.
    TooManyFilters,
}

/// Provider-level failures (kept `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Raw platform error code.
    Raw(u32),
    /// No adapter, or the radio is powered off.
    Unavailable,
    /// Scan was cancelled or could not start.
    ScanFailed,
    /// Connection attempt failed.
    ConnectFailed,
    /// Disconnect attempt failed.
    DisconnectFailed,
    /// Peripheral no longer reachable.
    OutOfRange,
    /// The platform rejected the command.
    Rejected,
}

impl Error {
    /// The provider error underneath, if any.
    pub fn ble(&self) -> Option<BleError> {
        match *self {
            Error::RadioUnavailable(e)
            | Error::ScanStart(e)
            | Error::Connect(e)
            | Error::Disconnect(e)
            | Error::ListConnected(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::Raw(code) => write!(f, "platform error 0x{:x}", code),
            BleError::Unavailable => f.write_str("radio unavailable"),
            BleError::ScanFailed => f.write_str("scan failed"),
            BleError::ConnectFailed => f.write_str("connect failed"),
            BleError::DisconnectFailed => f.write_str("disconnect failed"),
            BleError::OutOfRange => f.write_str("peripheral out of range"),
            BleError::Rejected => f.write_str("command rejected"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RadioUnavailable(e) => write!(f, "bluetooth unavailable: {}", e),
            Error::ScanStart(e) => write!(f, "could not start scan: {}", e),
            Error::Connect(e) => write!(f, "could not connect: {}", e),
            Error::Disconnect(e) => write!(f, "could not disconnect: {}", e),
            Error::ListConnected(e) => write!(f, "could not list connected peripherals: {}", e),
            Error::UnknownPeripheral => f.write_str("unknown peripheral"),
            Error::Busy => f.write_str("peripheral busy"),
            Error::RegistryFull => f.write_str("device list full"),
            Error::InvalidPeripheralId => f.write_str("invalid peripheral id"),
            Error::CommandDropped => f.write_str("too many pending commands, try again"),
            Error::TooManyFilters => f.write_str("too many service filters"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BleError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
