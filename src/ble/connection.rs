//! Connection coordinator - connect/disconnect toggling per peripheral.
//!
//! A toggle is split in two halves around the provider call:
//!
//! 1. [`ConnectionCoordinator::begin`] picks the action from the current
//!    `connected` flag and marks the identity pending.
//! 2. [`ConnectionCoordinator::finish`] clears the pending mark and, only on
//!    a confirmed transition, updates the registry.
//!
//! A second toggle for an identity that is still pending is refused with
//! [`Error::Busy`]; toggles for other identities are independent.

use heapless::FnvIndexSet;

use crate::ble::registry::DeviceRegistry;
use crate::ble::{ConnectionChange, Notice, PeripheralId};
use crate::config::REGISTRY_CAPACITY;
use crate::error::{BleError, Error};

/// Command the coordinator wants issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToggleAction {
    Connect,
    Disconnect,
}

/// A toggle between `begin` and `finish`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingToggle {
    pub id: PeripheralId,
    pub action: ToggleAction,
}

pub struct ConnectionCoordinator {
    pending: FnvIndexSet<PeripheralId, REGISTRY_CAPACITY>,
}

impl ConnectionCoordinator {
    pub fn new() -> Self {
        Self {
            pending: FnvIndexSet::new(),
        }
    }

    pub fn is_pending(&self, id: &PeripheralId) -> bool {
        self.pending.contains(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Decide what to do for `id` and mark it pending.
    ///
    /// Unknown identities issue nothing and change nothing.
    pub fn begin(&mut self, registry: &DeviceRegistry, id: &str) -> Result<PendingToggle, Error> {
        let record = registry.get(id).ok_or(Error::UnknownPeripheral)?;

        if self.pending.contains(&record.id) {
            warn!("toggle for {} ignored, previous one still pending", id);
            return Err(Error::Busy);
        }

        let action = if record.connected {
            ToggleAction::Disconnect
        } else {
            ToggleAction::Connect
        };

        // Every pending id has a registry record, so this cannot overflow.
        self.pending
            .insert(record.id.clone())
            .map_err(|_| Error::Busy)?;

        Ok(PendingToggle {
            id: record.id.clone(),
            action,
        })
    }

    /// Settle a toggle with the provider's answer.
    ///
    /// On success the registry flag follows the action and the user-visible
    /// notice is returned. On failure the registry is left untouched.
    pub fn finish(
        &mut self,
        registry: &mut DeviceRegistry,
        toggle: &PendingToggle,
        outcome: Result<(), BleError>,
    ) -> Result<(ConnectionChange, Notice), Error> {
        self.pending.remove(&toggle.id);

        let id = toggle.id.as_str();
        match (toggle.action, outcome) {
            (ToggleAction::Connect, Ok(())) => {
                registry.mark_connected(id);
                let notice = Notice::connected(label(registry, id));
                info!("{}", notice);
                Ok((ConnectionChange::Connected, notice))
            }
            (ToggleAction::Disconnect, Ok(())) => {
                registry.mark_disconnected(id);
                let notice = Notice::disconnected(label(registry, id));
                info!("{}", notice);
                Ok((ConnectionChange::Disconnected, notice))
            }
            (ToggleAction::Connect, Err(e)) => {
                warn!("connect to {} failed: {}", id, e);
                Err(Error::Connect(e))
            }
            (ToggleAction::Disconnect, Err(e)) => {
                warn!("disconnect from {} failed: {}", id, e);
                Err(Error::Disconnect(e))
            }
        }
    }

    /// Drop a pending mark without touching the registry (the command's
    /// future went away before the provider answered).
    pub fn abandon(&mut self, toggle: &PendingToggle) {
        if self.pending.remove(&toggle.id) {
            debug!("toggle for {} abandoned", toggle.id.as_str());
        }
    }
}

impl Default for ConnectionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn label<'a>(registry: &'a DeviceRegistry, id: &'a str) -> &'a str {
    registry.get(id).map(|r| r.label()).unwrap_or(id)
}
