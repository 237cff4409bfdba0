//! BLE manager - scan session, registry and coordinator over one provider.
//!
//! Everything runs on a single cooperative executor task: the manager is
//! not `Sync` and keeps its state in a `RefCell` that is never borrowed
//! across an `.await`. That lets a connect for one peripheral be in flight
//! while advertisements keep landing in the registry and another command is
//! admitted or refused.
//!
//! Two loops drive it (see [`BleManager::run`]):
//!
//! - [`BleManager::pump_events`] applies provider [`BleEvent`]s in order.
//! - [`BleManager::serve_commands`] executes presentation [`Command`]s one
//!   at a time, refusing a toggle for a peripheral that is still pending.

use core::cell::RefCell;
use core::fmt::Write;
use core::pin::pin;

use embassy_futures::select::{select, Either};
use embassy_sync::channel::{DynamicReceiver, DynamicSender};
use heapless::{Deque, String, Vec};

use crate::ble::adv_parser;
use crate::ble::connection::{ConnectionCoordinator, PendingToggle, ToggleAction};
use crate::ble::provider::BleProvider;
use crate::ble::registry::{DeviceRegistry, Upsert};
use crate::ble::scanner::{ScanSession, ScanState};
use crate::ble::{BleEvent, Command, ConnectionChange, DiscoveryObservation, Notice, PeripheralRecord};
use crate::config::{ScanConfig, StartOptions, COMMAND_BACKLOG, LABEL_LEN, REGISTRY_CAPACITY};
use crate::error::{BleError, Error};

/// Materialised registry view, in first-seen order.
pub type Snapshot = Vec<PeripheralRecord, REGISTRY_CAPACITY>;

struct State {
    registry: DeviceRegistry,
    scan: ScanSession,
    coordinator: ConnectionCoordinator,
}

pub struct BleManager<'a, P: BleProvider> {
    provider: P,
    state: RefCell<State>,
    notices: DynamicSender<'a, Notice>,
}

impl<'a, P: BleProvider> BleManager<'a, P> {
    pub fn new(provider: P, notices: DynamicSender<'a, Notice>) -> Self {
        Self::with_config(provider, ScanConfig::default(), notices)
    }

    pub fn with_config(provider: P, config: ScanConfig, notices: DynamicSender<'a, Notice>) -> Self {
        Self {
            provider,
            state: RefCell::new(State {
                registry: DeviceRegistry::new(),
                scan: ScanSession::new(config),
                coordinator: ConnectionCoordinator::new(),
            }),
            notices,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    // ═══════════════════════════════════════════════════════════════════
    // Radio bring-up
    // ═══════════════════════════════════════════════════════════════════

    /// Power the radio on, then initialise the provider.
    pub async fn init(&self, options: &StartOptions) -> Result<(), Error> {
        self.provider
            .enable_radio()
            .await
            .map_err(Error::RadioUnavailable)?;
        info!("Bluetooth is turned on");
        self.provider
            .start(options)
            .await
            .map_err(Error::RadioUnavailable)?;
        info!("BLE manager initialised");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scan session
    // ═══════════════════════════════════════════════════════════════════

    /// Start a discovery window unless one is already running.
    ///
    /// `Ok(false)` means the call was a no-op.
    pub async fn start_scan(&self) -> Result<bool, Error> {
        let config = self.state.borrow_mut().scan.begin();
        let Some(config) = config else {
            return Ok(false);
        };

        let result = self
            .provider
            .scan(
                &config.service_filters,
                config.duration_secs,
                config.allow_duplicates,
            )
            .await;

        match result {
            Ok(()) => {
                let running = {
                    let mut state = self.state.borrow_mut();
                    state.scan.started();
                    state.scan.is_active()
                };
                // A window that already ended was reported as stopped.
                if running {
                    self.notify(Notice::ScanStarted);
                }
                Ok(true)
            }
            Err(e) => {
                self.state.borrow_mut().scan.failed();
                warn!("BLE scan could not start: {}", e);
                Err(Error::ScanStart(e))
            }
        }
    }

    /// The provider reported the end of a scan window.
    ///
    /// Goes idle, then picks up peripherals that were connected outside
    /// this session.
    pub async fn on_scan_stopped(&self) -> Result<usize, Error> {
        if self.state.borrow_mut().scan.stopped() {
            self.notify(Notice::ScanStopped);
        }
        self.refresh_connected().await
    }

    pub fn is_scanning(&self) -> bool {
        self.state.borrow().scan.is_active()
    }

    pub fn scan_state(&self) -> ScanState {
        self.state.borrow().scan.state()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registry
    // ═══════════════════════════════════════════════════════════════════

    /// Apply one advertisement report.
    ///
    /// New peripherals and name changes raise `RegistryChanged`; RSSI-only
    /// refreshes stay silent since duplicates would flood the notice queue.
    pub fn on_discovered(&self, observation: DiscoveryObservation) -> Result<Upsert, Error> {
        let result = self
            .state
            .borrow_mut()
            .registry
            .upsert_from_discovery(observation);
        if matches!(result, Ok(Upsert::Inserted | Upsert::Renamed)) {
            self.notify(Notice::RegistryChanged);
        }
        result
    }

    /// Apply a raw advertisement, skipping it if it does not carry one of
    /// the scan's service filters.
    pub fn on_advertisement(
        &self,
        id: &str,
        rssi: i16,
        data: &[u8],
    ) -> Result<Option<Upsert>, Error> {
        let wanted = adv_parser::matches_filters(
            data,
            &self.state.borrow().scan.config().service_filters,
        );
        if !wanted {
            return Ok(None);
        }
        let observation = DiscoveryObservation::from_advertisement(id, rssi, data)?;
        self.on_discovered(observation).map(Some)
    }

    /// Ask the provider which peripherals are connected right now and mark
    /// them connected, creating records as needed.
    pub async fn refresh_connected(&self) -> Result<usize, Error> {
        let filters = self.state.borrow().scan.config().service_filters.clone();
        let connected = self
            .provider
            .connected_peripherals(&filters)
            .await
            .map_err(|e| {
                warn!("listing connected peripherals failed: {}", e);
                Error::ListConnected(e)
            })?;

        if connected.is_empty() {
            debug!("No connected bluetooth devices");
            return Ok(0);
        }

        let applied = self
            .state
            .borrow_mut()
            .registry
            .refresh_connected_set(connected);
        info!("{} connected peripherals picked up", applied);
        self.notify(Notice::RegistryChanged);
        Ok(applied)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().registry.snapshot().cloned().collect()
    }

    /// Borrow the registry without copying it.
    pub fn with_registry<R>(&self, f: impl FnOnce(&DeviceRegistry) -> R) -> R {
        f(&self.state.borrow().registry)
    }

    pub fn connected_count(&self) -> usize {
        self.state.borrow().registry.connected_count()
    }

    pub fn any_connected(&self) -> bool {
        self.connected_count() > 0
    }

    /// Status line: the single connected peripheral's label, or a count.
    pub fn connection_summary(&self) -> String<LABEL_LEN> {
        let state = self.state.borrow();
        let mut connected = state.registry.snapshot().filter(|r| r.connected);
        let mut s = String::new();
        match (connected.next(), connected.count()) {
            (None, _) => {
                let _ = s.push_str("Not connected");
            }
            (Some(only), 0) => {
                for c in only.label().chars() {
                    if s.push(c).is_err() {
                        break;
                    }
                }
            }
            (Some(_), rest) => {
                let _ = write!(&mut s, "{} devices", rest + 1);
            }
        }
        s
    }

    // ═══════════════════════════════════════════════════════════════════
    // Connection coordinator
    // ═══════════════════════════════════════════════════════════════════

    /// Connect `id` if it is disconnected, disconnect it if connected.
    ///
    /// The registry only changes once the provider confirms. A second
    /// toggle for the same peripheral while this one is pending fails with
    /// [`Error::Busy`] and issues nothing.
    pub async fn toggle(&self, id: &str) -> Result<ConnectionChange, Error> {
        let toggle = {
            let mut state = self.state.borrow_mut();
            let State {
                registry,
                coordinator,
                ..
            } = &mut *state;
            coordinator.begin(registry, id)?
        };
        let peer = toggle.id.clone();
        let action = toggle.action;
        let mut in_flight = InFlight {
            state: &self.state,
            toggle: Some(toggle),
        };

        let outcome = match action {
            ToggleAction::Connect => {
                info!("connecting to {}", peer.as_str());
                self.provider.connect(&peer).await
            }
            ToggleAction::Disconnect => {
                info!("disconnecting from {}", peer.as_str());
                self.provider.disconnect(&peer).await
            }
        };

        let (change, notice) = in_flight.finish(outcome)?;
        self.notify(notice);
        self.notify(Notice::RegistryChanged);
        Ok(change)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════

    /// Apply one provider event.
    pub async fn handle_event(&self, event: BleEvent) {
        match event {
            BleEvent::Discovered(observation) => {
                let _ = self.on_discovered(observation);
            }
            BleEvent::ScanStopped => {
                if let Err(e) = self.on_scan_stopped().await {
                    warn!("post-scan refresh failed: {}", e);
                }
            }
        }
    }

    /// Apply provider events forever, in arrival order.
    pub async fn pump_events(&self, events: DynamicReceiver<'_, BleEvent>) -> ! {
        loop {
            let event = events.receive().await;
            self.handle_event(event).await;
        }
    }

    /// Execute presentation commands forever.
    ///
    /// While a command is in flight new commands are still received: a
    /// toggle for a peripheral that is pending is refused with a
    /// `Failed(Busy)` notice, everything else waits in a small backlog.
    pub async fn serve_commands(&self, commands: DynamicReceiver<'_, Command>) -> ! {
        let mut backlog: Deque<Command, COMMAND_BACKLOG> = Deque::new();

        loop {
            let command = match backlog.pop_front() {
                Some(command) => command,
                None => commands.receive().await,
            };

            let mut work = pin!(self.execute(command));
            loop {
                match select(work.as_mut(), commands.receive()).await {
                    Either::First(()) => break,
                    Either::Second(next) => self.admit(next, &mut backlog),
                }
            }
        }
    }

    /// Run the event pump and the command loop side by side.
    pub async fn run(
        &self,
        events: DynamicReceiver<'_, BleEvent>,
        commands: DynamicReceiver<'_, Command>,
    ) -> ! {
        match select(self.pump_events(events), self.serve_commands(commands)).await {
            Either::First(never) => never,
            Either::Second(never) => never,
        }
    }

    async fn execute(&self, command: Command) {
        let result = match command {
            Command::StartScan => self.start_scan().await.map(|_| ()),
            Command::Toggle(id) => self.toggle(&id).await.map(|_| ()),
            Command::RefreshConnected => self.refresh_connected().await.map(|_| ()),
        };
        if let Err(e) = result {
            self.notify(Notice::Failed(e));
        }
    }

    fn admit(&self, command: Command, backlog: &mut Deque<Command, COMMAND_BACKLOG>) {
        if let Command::Toggle(id) = &command {
            let queued = backlog
                .iter()
                .any(|c| matches!(c, Command::Toggle(other) if other == id));
            if queued || self.state.borrow().coordinator.is_pending(id) {
                warn!("toggle for {} refused, previous one still pending", id.as_str());
                self.notify(Notice::Failed(Error::Busy));
                return;
            }
        }
        if backlog.push_back(command).is_err() {
            warn!("command backlog full, command dropped");
            self.notify(Notice::Failed(Error::CommandDropped));
        }
    }

    fn notify(&self, notice: Notice) {
        let alert = notice.is_alert();
        if self.notices.try_send(notice).is_err() {
            if alert {
                warn!("notice queue full, alert dropped");
            } else {
                debug!("notice queue full, notice dropped");
            }
        }
    }
}

/// Pending toggle that is released if the owning future is dropped before
/// the provider answered.
struct InFlight<'s> {
    state: &'s RefCell<State>,
    toggle: Option<PendingToggle>,
}

impl InFlight<'_> {
    fn finish(
        &mut self,
        outcome: Result<(), BleError>,
    ) -> Result<(ConnectionChange, Notice), Error> {
        let toggle = self.toggle.take().ok_or(Error::UnknownPeripheral)?;
        let mut state = self.state.borrow_mut();
        let State {
            registry,
            coordinator,
            ..
        } = &mut *state;
        coordinator.finish(registry, &toggle, outcome)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(toggle) = self.toggle.take() {
            if let Ok(mut state) = self.state.try_borrow_mut() {
                state.coordinator.abandon(&toggle);
            }
        }
    }
}
