//! Host provider backed by `btleplug` (BlueZ, CoreBluetooth, WinRT).
//!
//! Peripherals are identified by their Bluetooth address string. Adapter
//! events are turned into [`BleEvent`]s by a listener task spawned in
//! [`BleProvider::start`]; each scan window gets a timer task that stops the
//! scan and reports `ScanStopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use futures::stream::StreamExt;

use crate::ble::provider::{BleProvider, ConnectedList};
use crate::ble::{BleEvent, DiscoveryObservation};
use crate::config::{StartOptions, EVENT_QUEUE_DEPTH};
use crate::error::BleError;

/// Event sink shared with the manager's event pump.
pub type EventSender = Sender<'static, CriticalSectionRawMutex, BleEvent, EVENT_QUEUE_DEPTH>;

/// HCI "RSSI not available".
const RSSI_UNKNOWN: i16 = 127;

/// Scan parameters the listener task needs to see.
#[derive(Default)]
struct ScanWindow {
    active: AtomicBool,
    duplicates: AtomicBool,
    filters: Mutex<Vec<u16>>,
}

pub struct BtleplugProvider {
    adapter: Adapter,
    events: EventSender,
    window: Arc<ScanWindow>,
    listening: AtomicBool,
}

impl BtleplugProvider {
    /// Open the first adapter the platform reports.
    pub async fn new(events: EventSender) -> Result<Self, BleError> {
        let manager = Manager::new()
            .await
            .map_err(|e| ble_error(e, BleError::Unavailable))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| ble_error(e, BleError::Unavailable))?
            .into_iter()
            .next()
            .ok_or(BleError::Unavailable)?;

        Ok(Self {
            adapter,
            events,
            window: Arc::new(ScanWindow::default()),
            listening: AtomicBool::new(false),
        })
    }

    async fn lookup(&self, id: &str) -> Result<Peripheral, BleError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| ble_error(e, BleError::Unavailable))?;
        peripherals
            .into_iter()
            .find(|p| p.address().to_string() == id)
            .ok_or(BleError::OutOfRange)
    }
}

impl BleProvider for BtleplugProvider {
    async fn enable_radio(&self) -> Result<(), BleError> {
        let info = self
            .adapter
            .adapter_info()
            .await
            .map_err(|e| ble_error(e, BleError::Unavailable))?;
        info!("using adapter {}", info);
        Ok(())
    }

    async fn start(&self, options: &StartOptions) -> Result<(), BleError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if options.show_alert {
            debug!("power prompts are left to the platform");
        }

        let stream = self.adapter.events().await.map_err(|e| {
            self.listening.store(false, Ordering::SeqCst);
            ble_error(e, BleError::Unavailable)
        })?;
        tokio::spawn(listen(
            self.adapter.clone(),
            stream,
            self.window.clone(),
            self.events.clone(),
        ));
        Ok(())
    }

    async fn scan(
        &self,
        service_filters: &[u16],
        duration_secs: u64,
        allow_duplicates: bool,
    ) -> Result<(), BleError> {
        if let Ok(mut filters) = self.window.filters.lock() {
            filters.clear();
            filters.extend_from_slice(service_filters);
        }
        self.window
            .duplicates
            .store(allow_duplicates, Ordering::SeqCst);

        let filter = ScanFilter {
            services: service_filters.iter().map(|&u| uuid_from_u16(u)).collect(),
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| ble_error(e, BleError::ScanFailed))?;
        self.window.active.store(true, Ordering::SeqCst);

        let adapter = self.adapter.clone();
        let window = self.window.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await;
            window.active.store(false, Ordering::SeqCst);
            if let Err(e) = adapter.stop_scan().await {
                warn!("stop_scan failed: {}", e);
            }
            events.send(BleEvent::ScanStopped).await;
        });
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<(), BleError> {
        let peripheral = self.lookup(id).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| ble_error(e, BleError::ConnectFailed))
    }

    async fn disconnect(&self, id: &str) -> Result<(), BleError> {
        let peripheral = self.lookup(id).await?;
        peripheral
            .disconnect()
            .await
            .map_err(|e| ble_error(e, BleError::DisconnectFailed))
    }

    async fn connected_peripherals(
        &self,
        service_filters: &[u16],
    ) -> Result<ConnectedList, BleError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| ble_error(e, BleError::Unavailable))?;

        let mut connected = ConnectedList::new();
        for peripheral in peripherals {
            if !peripheral.is_connected().await.unwrap_or(false) {
                continue;
            }
            let Some(observation) = observe(&peripheral, service_filters).await else {
                continue;
            };
            if connected.push(observation).is_err() {
                warn!("more connected peripherals than the registry holds");
                break;
            }
        }
        Ok(connected)
    }
}

/// Forward adapter discoveries while a scan window is open.
async fn listen(
    adapter: Adapter,
    mut stream: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    window: Arc<ScanWindow>,
    events: EventSender,
) {
    while let Some(event) = stream.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) => id,
            CentralEvent::DeviceUpdated(id) if window.duplicates.load(Ordering::SeqCst) => id,
            _ => continue,
        };
        if !window.active.load(Ordering::SeqCst) {
            continue;
        }
        let Ok(peripheral) = adapter.peripheral(&id).await else {
            continue;
        };
        let filters = window
            .filters
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        if let Some(observation) = observe(&peripheral, &filters).await {
            events.send(BleEvent::Discovered(observation)).await;
        }
    }
    warn!("adapter event stream ended");
}

async fn observe(peripheral: &Peripheral, filters: &[u16]) -> Option<DiscoveryObservation> {
    let props = peripheral.properties().await.ok().flatten()?;
    if !offers_any(&props, filters) {
        return None;
    }
    let id = props.address.to_string();
    DiscoveryObservation::new(
        &id,
        props.local_name.as_deref(),
        props.rssi.unwrap_or(RSSI_UNKNOWN),
    )
    .ok()
}

fn offers_any(props: &PeripheralProperties, filters: &[u16]) -> bool {
    filters.is_empty()
        || filters
            .iter()
            .any(|&f| props.services.contains(&uuid_from_u16(f)))
}

fn ble_error(e: btleplug::Error, fallback: BleError) -> BleError {
    match e {
        btleplug::Error::DeviceNotFound => BleError::OutOfRange,
        btleplug::Error::PermissionDenied => BleError::Rejected,
        btleplug::Error::NotSupported(_) => BleError::Unavailable,
        other => {
            warn!("btleplug: {}", other);
            fallback
        }
    }
}
