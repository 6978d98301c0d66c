//! Batch subnet scanner
//!
//! Sweeps host suffixes 1-254 of each target prefix in fixed-size
//! concurrent batches. Probe failures are expected (most addresses have no
//! listener) and silently discarded. Cancellation is cooperative, checked
//! before each prefix and each batch; an in-flight batch always settles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use muster_core::{absorb, FleetEvent, FleetRegistry, ScanProgress, Transport};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, trace};
use tokio_util::sync::CancellationToken;

use crate::subnet::{detect_local_prefix, FALLBACK_PREFIXES};

/// Host suffixes swept within each prefix
const HOST_SUFFIXES: std::ops::RangeInclusive<u8> = 1..=254;

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Probes issued concurrently per batch
    pub batch_size: usize,
    /// Bound on local subnet detection in milliseconds
    pub detect_timeout_ms: u64,
    /// Whether to attempt local subnet detection before falling back
    pub use_detection: bool,
    /// Bound on a single probe in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            detect_timeout_ms: 1500,
            use_detection: true,
            probe_timeout_ms: 1000,
        }
    }
}

/// Discovery scanner; at most one sweep runs at a time
pub struct Scanner<T: Transport> {
    transport: Arc<T>,
    registry: Arc<FleetRegistry>,
    config: ScanConfig,
    active: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl<T: Transport> Scanner<T> {
    pub fn new(transport: Arc<T>, registry: Arc<FleetRegistry>, config: ScanConfig) -> Self {
        Self {
            transport,
            registry,
            config,
            active: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Spawn a sweep in the background; a no-op while one is already running
    pub fn start(self: &Arc<Self>) {
        let scanner = Arc::clone(self);
        tokio::spawn(async move {
            scanner.scan_once().await;
        });
    }

    /// Request cancellation of the current sweep; checked at batch and
    /// prefix boundaries only, so an in-flight batch settles first
    pub fn cancel(&self) {
        self.cancel.lock().expect("scanner lock poisoned").cancel();
    }

    pub fn is_scanning(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one full sweep inline; a no-op while one is already running
    pub async fn scan_once(&self) {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan already active, ignoring start");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().expect("scanner lock poisoned") = token.clone();

        self.sweep(&token).await;

        // Clear scanning state before announcing completion so a listener
        // may immediately start the next scan
        self.active.store(false, Ordering::SeqCst);
        self.registry.bus().publish(&FleetEvent::ScanComplete);
        info!(found = self.registry.len(), "Scan complete");
    }

    async fn sweep(&self, token: &CancellationToken) {
        let prefixes = self.target_prefixes().await;
        let total = prefixes.len() * HOST_SUFFIXES.count();
        let mut swept = 0usize;

        info!(prefixes = ?prefixes, total = total, "Starting scan");

        'prefixes: for prefix in &prefixes {
            if token.is_cancelled() {
                info!(prefix = %prefix, "Scan cancelled before prefix");
                break;
            }

            let addresses: Vec<String> = HOST_SUFFIXES
                .map(|suffix| format!("{}.{}", prefix, suffix))
                .collect();

            for batch in addresses.chunks(self.config.batch_size) {
                if token.is_cancelled() {
                    info!(prefix = %prefix, "Scan cancelled before batch");
                    break 'prefixes;
                }

                self.probe_batch(batch).await;

                swept += batch.len();
                let percent = ((swept as f64 / total as f64) * 100.0).round() as u8;
                self.registry
                    .bus()
                    .publish(&FleetEvent::ScanProgress(ScanProgress {
                        current_address: batch.last().cloned().unwrap_or_default(),
                        percent,
                        found: self.registry.len(),
                    }));
            }
        }
    }

    async fn target_prefixes(&self) -> Vec<String> {
        if self.config.use_detection {
            let bound = Duration::from_millis(self.config.detect_timeout_ms);
            if let Some(prefix) = detect_local_prefix(bound).await {
                info!(prefix = %prefix, "Detected local subnet");
                return vec![prefix];
            }
        }
        info!("No local subnet detected, sweeping fallback prefixes");
        FALLBACK_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    /// Probe every address in the batch concurrently and wait for all of
    /// them to settle. Failures never abort the batch.
    async fn probe_batch(&self, addresses: &[String]) {
        let mut tasks = JoinSet::new();
        let probe_bound = Duration::from_millis(self.config.probe_timeout_ms);

        for address in addresses {
            // Already registered: no redundant probe
            if self.registry.contains_address(address) {
                trace!(address = %address, "Skipping registered address");
                continue;
            }

            let transport = Arc::clone(&self.transport);
            let address = address.clone();
            tasks.spawn(async move {
                match timeout(probe_bound, transport.connect(&address)).await {
                    Ok(Ok(handle)) => Some(handle),
                    // No listener at this address is the common case
                    Ok(Err(_)) | Err(_) => None,
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Ok(Some(handle)) = result {
                info!(serial = %handle.serial, "Scan found device");
                absorb(self.registry.as_ref(), self.transport.as_ref(), &handle).await;
            }
        }
    }
}
