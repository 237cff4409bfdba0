//! Device registry - every peripheral seen during the manager's lifetime.
//!
//! Records are keyed by identity and enumerate in first-seen order
//! (`FnvIndexMap` keeps insertion order as long as nothing is removed, and
//! nothing ever is). The registry is the only place `connected` changes.

use heapless::FnvIndexMap;

use crate::ble::{peripheral_id, DiscoveryObservation, PeripheralId, PeripheralRecord};
use crate::config::REGISTRY_CAPACITY;
use crate::error::Error;

/// Outcome of applying one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Upsert {
    Inserted,
    /// Known peripheral, its name changed.
    Renamed,
    /// Known peripheral, only the RSSI may have changed.
    Updated,
}

pub struct DeviceRegistry {
    records: FnvIndexMap<PeripheralId, PeripheralRecord, REGISTRY_CAPACITY>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            records: FnvIndexMap::new(),
        }
    }

    /// Insert an unseen peripheral (`connected = false`) or refresh the
    /// name and RSSI of a known one, keeping its `connected` flag.
    pub fn upsert_from_discovery(
        &mut self,
        observation: DiscoveryObservation,
    ) -> Result<Upsert, Error> {
        if let Some(record) = self.records.get_mut(&observation.id) {
            let renamed = record.name != observation.name;
            record.name = observation.name;
            record.rssi = observation.rssi;
            return Ok(if renamed {
                Upsert::Renamed
            } else {
                Upsert::Updated
            });
        }

        let id = observation.id.clone();
        match self
            .records
            .insert(id, PeripheralRecord::discovered(observation))
        {
            Ok(_) => Ok(Upsert::Inserted),
            Err((id, _)) => {
                warn!("registry full, dropping {}", id.as_str());
                Err(Error::RegistryFull)
            }
        }
    }

    /// Set `connected` on a known peripheral. Returns `false` (and changes
    /// nothing) for an unknown identity.
    pub fn mark_connected(&mut self, id: &str) -> bool {
        self.set_connected(id, true)
    }

    /// Clear `connected` on a known peripheral. Returns `false` (and
    /// changes nothing) for an unknown identity.
    pub fn mark_disconnected(&mut self, id: &str) -> bool {
        self.set_connected(id, false)
    }

    fn set_connected(&mut self, id: &str, connected: bool) -> bool {
        match peripheral_id(id)
            .ok()
            .and_then(|key| self.records.get_mut(&key))
        {
            Some(record) => {
                record.connected = connected;
                true
            }
            None => {
                debug!("confirmation for unknown peripheral {} dropped", id);
                false
            }
        }
    }

    /// Apply the platform's list of currently connected peripherals:
    /// upsert each one and force `connected = true`.
    ///
    /// Returns how many were applied; peripherals that do not fit are
    /// skipped.
    pub fn refresh_connected_set<I>(&mut self, observations: I) -> usize
    where
        I: IntoIterator<Item = DiscoveryObservation>,
    {
        let mut applied = 0;
        for observation in observations {
            let id = observation.id.clone();
            if self.upsert_from_discovery(observation).is_ok() && self.mark_connected(&id) {
                applied += 1;
            }
        }
        applied
    }

    pub fn get(&self, id: &str) -> Option<&PeripheralRecord> {
        let key = peripheral_id(id).ok()?;
        self.records.get(&key)
    }

    /// All records in first-seen order.
    ///
    /// The iterator is lazy and `Clone`, so it can be restarted.
    pub fn snapshot(&self) -> impl Iterator<Item = &PeripheralRecord> + Clone + '_ {
        self.records.iter().map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.records.values().filter(|r| r.connected).count()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn obs(id: &str, name: Option<&str>, rssi: i16) -> DiscoveryObservation {
        DiscoveryObservation::new(id, name, rssi).unwrap()
    }

    #[test]
    fn repeated_discovery_keeps_one_record_with_latest_values() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.upsert_from_discovery(obs("A", Some("Foo"), -70)),
            Ok(Upsert::Inserted)
        );
        assert_eq!(
            registry.upsert_from_discovery(obs("A", Some("Foo"), -60)),
            Ok(Upsert::Updated)
        );
        assert_eq!(
            registry.upsert_from_discovery(obs("A", Some("Bar"), -45)),
            Ok(Upsert::Renamed)
        );

        assert_eq!(registry.len(), 1);
        let a = registry.get("A").unwrap();
        assert_eq!(a.rssi, -45);
        assert_eq!(a.name.as_deref(), Some("Bar"));
        assert!(!a.connected);
    }

    #[test]
    fn name_arriving_later_is_a_rename() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_discovery(obs("A", None, -70)).unwrap();
        assert_eq!(
            registry.upsert_from_discovery(obs("A", Some("Watch"), -68)),
            Ok(Upsert::Renamed)
        );
        assert_eq!(registry.get("A").unwrap().label(), "Watch");

        // Latest observation wins, even without a name.
        assert_eq!(
            registry.upsert_from_discovery(obs("A", None, -66)),
            Ok(Upsert::Renamed)
        );
        assert_eq!(registry.get("A").unwrap().label(), "A");
    }

    #[test]
    fn discovery_preserves_connected_flag() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_discovery(obs("A", None, -50)).unwrap();
        assert!(registry.mark_connected("A"));
        registry.upsert_from_discovery(obs("A", None, -40)).unwrap();
        assert!(registry.get("A").unwrap().connected);
    }

    #[test]
    fn mark_connected_then_disconnected_restores_flag() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_discovery(obs("A", None, -50)).unwrap();
        assert!(registry.mark_connected("A"));
        assert!(registry.mark_disconnected("A"));
        assert!(!registry.get("A").unwrap().connected);
    }

    #[test]
    fn marking_unknown_identity_is_a_no_op() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.mark_connected("ghost"));
        assert!(!registry.mark_disconnected("ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn refresh_on_empty_registry_creates_connected_record() {
        let mut registry = DeviceRegistry::new();
        let applied = registry.refresh_connected_set([obs("A", Some("Foo"), -40)]);
        assert_eq!(applied, 1);

        let a = registry.get("A").unwrap();
        assert!(a.connected);
        assert_eq!(a.name.as_deref(), Some("Foo"));
        assert_eq!(a.rssi, -40);
    }

    #[test]
    fn snapshot_is_first_seen_order_and_restartable() {
        let mut registry = DeviceRegistry::new();
        for id in ["C", "A", "B"] {
            registry.upsert_from_discovery(obs(id, None, -50)).unwrap();
        }
        // Later updates do not reorder.
        registry.upsert_from_discovery(obs("C", None, -10)).unwrap();
        registry.mark_connected("B");

        let snapshot = registry.snapshot();
        let first: heapless::Vec<&str, 4> = snapshot.clone().map(|r| r.id.as_str()).collect();
        let second: heapless::Vec<&str, 4> = snapshot.map(|r| r.id.as_str()).collect();
        assert_eq!(first.as_slice(), ["C", "A", "B"]);
        assert_eq!(first, second);
    }

    #[test]
    fn full_registry_rejects_new_but_updates_known() {
        let mut registry = DeviceRegistry::new();
        for i in 0..REGISTRY_CAPACITY {
            let mut id: heapless::String<8> = heapless::String::new();
            write!(id, "dev{}", i).unwrap();
            registry.upsert_from_discovery(obs(&id, None, -50)).unwrap();
        }
        assert_eq!(
            registry.upsert_from_discovery(obs("late", None, -50)),
            Err(Error::RegistryFull)
        );
        assert_eq!(
            registry.upsert_from_discovery(obs("dev0", None, -20)),
            Ok(Upsert::Updated)
        );
        assert_eq!(registry.len(), REGISTRY_CAPACITY);
    }

    #[test]
    fn connected_count_tracks_flags() {
        let mut registry = DeviceRegistry::new();
        registry.refresh_connected_set([obs("A", None, -40), obs("B", None, -41)]);
        registry.upsert_from_discovery(obs("C", None, -42)).unwrap();
        assert_eq!(registry.connected_count(), 2);
        registry.mark_disconnected("A");
        assert_eq!(registry.connected_count(), 1);
    }
}
