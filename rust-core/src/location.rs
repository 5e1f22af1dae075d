//! Position tracking.
//!
//! The platform (Android via JNI, or a test) pushes raw fixes into a
//! [`PlatformLocation`]. The navigator reads them through the
//! [`LocationSource`] trait: a one-shot fix to seed route calculation
//! and a continuous, threshold-filtered watch managed by
//! [`PositionTracker`].

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{NavError, Result};
use crate::geo::distance_meters;
use crate::model::PositionFix;

/// Capacity of the per-watch sample queue.
const WATCH_QUEUE: usize = 32;

/// Thresholds for a continuous watch. A sample is delivered only once
/// both the time and the distance since the last delivered sample are
/// reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

/// Platform geolocation capability.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// One-shot high-accuracy fix, waiting at most `timeout`.
    async fn current_position(&self, timeout: Duration) -> Result<PositionFix>;

    /// Start a continuous watch. The watch ends when the receiver is dropped.
    fn watch_position(&self, options: WatchOptions) -> Result<mpsc::Receiver<PositionFix>>;
}

/// Location source fed by the platform.
#[derive(Debug)]
pub struct PlatformLocation {
    latest: watch::Sender<Option<PositionFix>>,
}

impl Default for PlatformLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformLocation {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self { latest }
    }

    /// Publish a platform fix. Fixes with non-finite coordinates are dropped.
    pub fn push(&self, fix: PositionFix) {
        if !fix.coordinate().is_valid() {
            warn!("Dropping invalid position fix {},{}", fix.lat, fix.lng);
            return;
        }
        self.latest.send_replace(Some(fix));
    }

    pub fn latest(&self) -> Option<PositionFix> {
        *self.latest.borrow()
    }
}

#[async_trait]
impl LocationSource for PlatformLocation {
    async fn current_position(&self, timeout: Duration) -> Result<PositionFix> {
        let mut rx = self.latest.subscribe();
        if let Some(fix) = *rx.borrow_and_update() {
            return Ok(fix);
        }

        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return None;
                }
                if let Some(fix) = *rx.borrow_and_update() {
                    return Some(fix);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(fix)) => Ok(fix),
            Ok(None) => Err(NavError::LocationUnavailable("location source closed".into())),
            Err(_) => Err(NavError::LocationUnavailable(format!(
                "no fix within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    fn watch_position(&self, options: WatchOptions) -> Result<mpsc::Receiver<PositionFix>> {
        let mut rx = self.latest.subscribe();
        let (tx, out) = mpsc::channel(WATCH_QUEUE);

        tokio::spawn(async move {
            let mut last: Option<PositionFix> = None;
            while rx.changed().await.is_ok() {
                let Some(fix) = *rx.borrow_and_update() else {
                    continue;
                };
                if !passes_thresholds(last.as_ref(), &fix, &options) {
                    continue;
                }
                last = Some(fix);
                if tx.send(fix).await.is_err() {
                    break;
                }
            }
            debug!("Position watch ended");
        });

        Ok(out)
    }
}

fn passes_thresholds(
    last: Option<&PositionFix>,
    fix: &PositionFix,
    options: &WatchOptions,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    let elapsed_ms = fix.timestamp_ms.saturating_sub(last.timestamp_ms);
    let moved = distance_meters(&last.coordinate(), &fix.coordinate());
    elapsed_ms >= options.min_interval.as_millis() as u64 && moved >= options.min_distance_m
}

/// Owns at most one running position subscription.
pub struct PositionTracker {
    source: Arc<dyn LocationSource>,
    options: WatchOptions,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PositionTracker {
    pub fn new(source: Arc<dyn LocationSource>, options: WatchOptions) -> Self {
        Self {
            source,
            options,
            task: Mutex::new(None),
        }
    }

    /// Start delivering samples to `on_sample`, replacing any running
    /// subscription. Must be called inside a tokio runtime.
    pub fn start<F>(&self, on_sample: F) -> Result<()>
    where
        F: Fn(PositionFix) + Send + 'static,
    {
        self.stop();

        let mut samples = self.source.watch_position(self.options)?;
        let handle = tokio::spawn(async move {
            while let Some(fix) = samples.recv().await {
                on_sample(fix);
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = task.replace(handle) {
            // A concurrent start won the race; keep only the newest
            stale.abort();
        }
        debug!("Position tracking started");
        Ok(())
    }

    /// Cancel the subscription. Safe to call when not running.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            debug!("Position tracking stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// One-shot fix used to seed route calculation.
    pub async fn get_once(&self, timeout: Duration) -> Result<PositionFix> {
        self.source.current_position(timeout).await
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
