//! Scan session controller - Idle / Scanning state machine.
//!
//! The provider runs the actual timed discovery window; this side only
//! decides whether a new session may start and records when it ends.
//!
//! ```text
//!   Idle ──begin()──▶ (issuing) ──started()──▶ Scanning ──stopped()──▶ Idle
//!                          └──────failed()──────▶ Idle
//! ```
//!
//! While the scan command is being issued the session still reports
//! `Idle`, but a second `begin()` is refused so sessions never overlap.

use crate::config::ScanConfig;

/// Scan session state as the presentation layer sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
}

impl ScanState {
    /// Label for the scan button.
    pub fn label(self) -> &'static str {
        match self {
            ScanState::Idle => "Scan Bluetooth Devices",
            ScanState::Scanning => "Scanning...",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Scan command in flight; `stop_seen` if the provider already
    /// reported the end of the window.
    Issuing { stop_seen: bool },
    Scanning,
}

pub struct ScanSession {
    phase: Phase,
    config: ScanConfig,
}

impl ScanSession {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            phase: Phase::Idle,
            config,
        }
    }

    pub fn state(&self) -> ScanState {
        match self.phase {
            Phase::Scanning => ScanState::Scanning,
            Phase::Idle | Phase::Issuing { .. } => ScanState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Scanning
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Claim the right to issue a scan command.
    ///
    /// Returns the parameters to hand to the provider, or `None` when a
    /// session is already running or being issued.
    pub fn begin(&mut self) -> Option<ScanConfig> {
        if self.phase != Phase::Idle {
            debug!("scan already running, start ignored");
            return None;
        }
        self.phase = Phase::Issuing { stop_seen: false };
        Some(self.config.clone())
    }

    /// The provider accepted the scan command.
    pub fn started(&mut self) {
        if self.phase == (Phase::Issuing { stop_seen: true }) {
            debug!("scan window ended before start was confirmed");
            self.phase = Phase::Idle;
            return;
        }
        self.phase = Phase::Scanning;
        info!("BLE scan started ({} s window)", self.config.duration_secs);
    }

    /// The provider refused the scan command; the session stays idle.
    pub fn failed(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Record the end of a session. Returns `true` if a session was
    /// actually running.
    pub fn stopped(&mut self) -> bool {
        match self.phase {
            Phase::Scanning => {
                self.phase = Phase::Idle;
                info!("BLE scan complete");
                true
            }
            Phase::Issuing { .. } => {
                self.phase = Phase::Issuing { stop_seen: true };
                true
            }
            Phase::Idle => {
                debug!("scan stop while idle");
                false
            }
        }
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_hands_out_configured_parameters() {
        let mut session = ScanSession::default();
        let config = session.begin().unwrap();
        assert_eq!(config.duration_secs, 5);
        assert!(config.allow_duplicates);
        assert!(config.service_filters.is_empty());
    }

    #[test]
    fn second_begin_is_refused_until_stopped() {
        let mut session = ScanSession::default();
        assert!(session.begin().is_some());
        assert!(session.begin().is_none());
        session.started();
        assert!(session.is_active());
        assert!(session.begin().is_none());

        assert!(session.stopped());
        assert_eq!(session.state(), ScanState::Idle);
        assert!(session.begin().is_some());
    }

    #[test]
    fn failed_issue_stays_idle() {
        let mut session = ScanSession::default();
        session.begin().unwrap();
        session.failed();
        assert!(!session.is_active());
        assert!(session.begin().is_some());
    }

    #[test]
    fn stop_before_issue_completes_ends_idle() {
        let mut session = ScanSession::default();
        session.begin().unwrap();
        assert!(session.stopped());
        session.started();
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn stop_while_idle_is_reported() {
        let mut session = ScanSession::default();
        assert!(!session.stopped());
    }

    #[test]
    fn button_label_follows_state() {
        assert_eq!(ScanState::Idle.label(), "Scan Bluetooth Devices");
        assert_eq!(ScanState::Scanning.label(), "Scanning...");
    }
}
