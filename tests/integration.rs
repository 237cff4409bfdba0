//! Integration tests for blescan host-testable logic.

use std::cell::{Cell, RefCell};

use blescan::ble::provider::{BleProvider, ConnectedList};
use blescan::ble::{BleEvent, DiscoveryObservation, Notice};
use blescan::config::{StartOptions, NOTICE_QUEUE_DEPTH};
use blescan::{BleError, BleManager, Error};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

/// Radio that confirms everything and remembers what it was asked.
#[derive(Default)]
struct Radio {
    scans: Cell<usize>,
    links: RefCell<Vec<String>>,
    already_connected: RefCell<Vec<DiscoveryObservation>>,
}

impl BleProvider for &Radio {
    async fn enable_radio(&self) -> Result<(), BleError> {
        Ok(())
    }

    async fn start(&self, _options: &StartOptions) -> Result<(), BleError> {
        Ok(())
    }

    async fn scan(&self, _filters: &[u16], _secs: u64, _dups: bool) -> Result<(), BleError> {
        self.scans.set(self.scans.get() + 1);
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<(), BleError> {
        self.links.borrow_mut().push(id.to_owned());
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), BleError> {
        self.links.borrow_mut().retain(|l| l != id);
        Ok(())
    }

    async fn connected_peripherals(&self, _filters: &[u16]) -> Result<ConnectedList, BleError> {
        Ok(self.already_connected.borrow().iter().cloned().collect())
    }
}

fn messages(notices: &Channel<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_receive() {
        out.push(notice.to_string());
    }
    out
}

#[test]
fn scan_discover_connect_session() {
    let radio = Radio::default();
    radio
        .already_connected
        .borrow_mut()
        .push(DiscoveryObservation::new("11:22:33:44:55:66", Some("Band"), -70).unwrap());
    let notices = Channel::<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH>::new();
    let manager = BleManager::new(&radio, notices.dyn_sender());

    block_on(async {
        manager.init(&StartOptions::default()).await.unwrap();
        assert!(manager.start_scan().await.unwrap());

        let watch = DiscoveryObservation::new("AA:BB:CC:DD:EE:FF", Some("Watch"), -60).unwrap();
        manager.handle_event(BleEvent::Discovered(watch)).await;
        manager.handle_event(BleEvent::ScanStopped).await;

        manager.toggle("AA:BB:CC:DD:EE:FF").await.unwrap();
    });

    assert_eq!(radio.scans.get(), 1);
    assert_eq!(*radio.links.borrow(), ["AA:BB:CC:DD:EE:FF"]);

    let snapshot = manager.snapshot();
    let labels: Vec<_> = snapshot.iter().map(|r| (r.label(), r.connected)).collect();
    assert_eq!(labels, [("Watch", true), ("Band", true)]);
    assert_eq!(manager.connection_summary().as_str(), "2 devices");

    assert_eq!(
        messages(&notices),
        [
            "Scanning...",
            "Device list updated",
            "Scan is stopped",
            "Device list updated",
            "Connected to Watch",
            "Device list updated",
        ]
    );
}

#[test]
fn unknown_peripheral_cannot_be_toggled() {
    let radio = Radio::default();
    let notices = Channel::<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH>::new();
    let manager = BleManager::new(&radio, notices.dyn_sender());

    let err = block_on(manager.toggle("nobody")).unwrap_err();
    assert_eq!(err, Error::UnknownPeripheral);
    assert_eq!(err.to_string(), "unknown peripheral");
    assert!(radio.links.borrow().is_empty());
}

#[test]
fn failure_notice_reads_like_an_alert() {
    let notice = Notice::Failed(Error::Connect(BleError::OutOfRange));
    assert!(notice.is_alert());
    assert_eq!(
        notice.to_string(),
        "could not connect: peripheral out of range"
    );
    assert!(!Notice::RegistryChanged.is_alert());
}

#[test]
fn advertisement_name_lands_in_registry() {
    let radio = Radio::default();
    let notices = Channel::<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH>::new();
    let manager = BleManager::new(&radio, notices.dyn_sender());

    // Flags, then complete local name "Mouse".
    let adv = [0x02, 0x01, 0x06, 0x06, 0x09, b'M', b'o', b'u', b's', b'e'];
    manager.on_advertisement("C0:FF:EE:00:00:01", -48, &adv).unwrap();
    manager.on_advertisement("C0:FF:EE:00:00:02", -80, &[]).unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot[0].label(), "Mouse");
    assert_eq!(snapshot[1].label(), "C0:FF:EE:00:00:02");
    assert_eq!(snapshot[1].rssi, -80);
}
