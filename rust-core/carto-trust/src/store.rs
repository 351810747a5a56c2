// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The trust store: the current CA certificate and its TLS configuration.
//!
//! A load fetches and verifies a certificate, builds the rustls configuration
//! from it, and only then publishes both together as one immutable
//! [`TrustSnapshot`]. Readers clone the current `Arc` and never take a lock.
//!
//! ```text
//!   start() ──► load ──► publish ──► arm watcher
//!                                        │ every check_interval
//!                                        ▼
//!                    not_after - renew_before <= now ? ──► load ──► publish
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::ClientConfig;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, warn, Dispatch};

use crate::certificate::{ca_bundle, CaCertificate};
use crate::config::TrustConfig;
use crate::error::{log_failure, Result};
use crate::source::{CertificateSource, FileSource, NetworkSource};
use crate::tls;

/// Upper bound on how long [`TrustStore::shutdown`] waits for the watcher.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// One published certificate together with the configuration derived from it.
#[derive(Debug)]
pub struct TrustSnapshot {
    certificate: CaCertificate,
    client_config: Arc<ClientConfig>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl TrustSnapshot {
    /// The trusted CA certificate.
    pub fn certificate(&self) -> &CaCertificate {
        &self.certificate
    }

    /// rustls configuration trusting [`certificate`](Self::certificate).
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Publish counter, starting at 1 for the first load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was published.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// True once `now` has reached `renew_before` ahead of `not_after`.
pub fn renewal_due(not_after: DateTime<Utc>, renew_before: Duration, now: DateTime<Utc>) -> bool {
    let margin = chrono::Duration::from_std(renew_before)
        .unwrap_or_else(|_| chrono::Duration::days(365_000));
    match not_after.checked_sub_signed(margin) {
        Some(deadline) => now >= deadline,
        None => true,
    }
}

struct Watcher {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct TrustInner {
    source: Arc<dyn CertificateSource>,
    renew_before: Duration,
    check_interval: Duration,
    include_public_roots: bool,
    bundle_cache_path: Option<PathBuf>,
    current: watch::Sender<Option<Arc<TrustSnapshot>>>,
    load_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    watcher: Mutex<Option<Watcher>>,
    dispatch: Dispatch,
}

impl Drop for TrustInner {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.handle.abort();
        }
    }
}

/// Fetches, verifies, publishes and refreshes the core's CA certificate.
///
/// Cloning is cheap; clones share one state.
#[derive(Clone)]
pub struct TrustStore {
    inner: Arc<TrustInner>,
}

impl TrustStore {
    /// Build a store from `config`: a [`FileSource`] when a custom CA path is
    /// set, otherwise a [`NetworkSource`] for the core URL.
    pub fn from_config(config: &TrustConfig) -> Result<Self> {
        let source: Arc<dyn CertificateSource> = match &config.custom_ca_cert_path {
            Some(path) => Arc::new(FileSource::new(path.clone())),
            None => Arc::new(NetworkSource::new(&config.core_url, config.psk.clone())?),
        };
        Ok(Self::with_source(source, config))
    }

    /// Build a store over an arbitrary source, logging to the current default dispatcher.
    pub fn with_source(source: Arc<dyn CertificateSource>, config: &TrustConfig) -> Self {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        Self::with_dispatch(source, config, dispatch)
    }

    /// Build a store that logs to `dispatch`, including from its watcher task.
    pub fn with_dispatch(
        source: Arc<dyn CertificateSource>,
        config: &TrustConfig,
        dispatch: Dispatch,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(TrustInner {
                source,
                renew_before: config.renew_before,
                check_interval: config.check_interval,
                include_public_roots: config.include_public_roots,
                bundle_cache_path: config.bundle_cache_path.clone(),
                current,
                load_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                watcher: Mutex::new(None),
                dispatch,
            }),
        }
    }

    /// Load the certificate if it was never loaded, then arm the refresh
    /// watcher. Calling it again is a no-op.
    ///
    /// A failure of the initial load is returned to the caller.
    pub async fn start(&self) -> Result<()> {
        self.ensure_loaded().await?;
        if self.inner.source.refreshable() {
            self.arm_watcher();
        }
        Ok(())
    }

    /// The current TLS configuration, loading the certificate first if needed.
    pub async fn verification_context(&self) -> Result<Arc<ClientConfig>> {
        Ok(self.ensure_loaded().await?.client_config())
    }

    /// The current snapshot, loading the certificate first if needed.
    pub async fn ensure_loaded(&self) -> Result<Arc<TrustSnapshot>> {
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }
        let _guard = self.inner.load_lock.lock().await;
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }
        self.load("initial").await
    }

    /// Fetch and publish a new certificate now, regardless of expiry.
    pub async fn reload(&self) -> Result<Arc<TrustSnapshot>> {
        let _guard = self.inner.load_lock.lock().await;
        self.load("reload").await
    }

    /// The published snapshot, if any. Never blocks.
    pub fn snapshot(&self) -> Option<Arc<TrustSnapshot>> {
        self.inner.current.borrow().clone()
    }

    /// The published certificate, if any.
    pub fn certificate(&self) -> Option<CaCertificate> {
        self.snapshot().map(|snapshot| snapshot.certificate.clone())
    }

    /// Whether a certificate has been published at least once.
    pub fn is_loaded(&self) -> bool {
        self.inner.current.borrow().is_some()
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// A receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<TrustSnapshot>>> {
        self.inner.current.subscribe()
    }

    /// Whether the refresh watcher is armed.
    pub fn is_watching(&self) -> bool {
        self.inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the refresh watcher and wait for it, at most [`SHUTDOWN_WAIT`].
    pub async fn shutdown(&self) {
        let watcher = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Watcher { stop, mut handle }) = watcher else {
            return;
        };
        let _ = stop.send(());
        if tokio::time::timeout(SHUTDOWN_WAIT, &mut handle).await.is_err() {
            handle.abort();
            self.in_dispatch(|| warn!("certificate watcher did not stop in time, aborted"));
        }
    }

    /// Check the expiry once and reload when it is due. Failures are logged.
    pub async fn check_renewal(&self) {
        let due = match self.snapshot() {
            Some(snapshot) => renewal_due(
                snapshot.certificate.not_after(),
                self.inner.renew_before,
                Utc::now(),
            ),
            None => true,
        };
        if !due {
            return;
        }

        let _guard = self.inner.load_lock.lock().await;
        // Someone else may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.snapshot() {
            if !renewal_due(snapshot.certificate.not_after(), self.inner.renew_before, Utc::now())
            {
                return;
            }
        }
        let _ = self.load("refresh").await;
    }

    fn arm_watcher(&self) {
        let mut slot = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let (stop, stopped) = oneshot::channel();
        let period = self.inner.check_interval;
        let task = watch_expiry(Arc::downgrade(&self.inner), stopped, period)
            .with_subscriber(self.inner.dispatch.clone());
        *slot = Some(Watcher {
            stop,
            handle: tokio::spawn(task),
        });
        self.in_dispatch(|| debug!(interval = ?period, "certificate watcher armed"));
    }

    async fn load(&self, stage: &'static str) -> Result<Arc<TrustSnapshot>> {
        let inner = Arc::clone(&self.inner);
        async move {
            let outcome = Self::fetch_snapshot(&inner).await;
            match outcome {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    inner.current.send_replace(Some(Arc::clone(&snapshot)));
                    info!(
                        stage,
                        generation = snapshot.generation,
                        source = %inner.source.describe(),
                        not_after = %snapshot.certificate.not_after(),
                        "CA certificate published"
                    );
                    Ok(snapshot)
                }
                Err(err) => {
                    log_failure(&err, stage);
                    Err(err)
                }
            }
        }
        .with_subscriber(self.inner.dispatch.clone())
        .await
    }

    async fn fetch_snapshot(inner: &TrustInner) -> Result<TrustSnapshot> {
        let certificate = inner.source.fetch().await?;
        let client_config = tls::verifying_config(&certificate, inner.include_public_roots)?;

        if inner.source.refreshable() {
            if let Some(path) = &inner.bundle_cache_path {
                if let Err(err) = write_bundle(path, &certificate).await {
                    warn!(path = %path.display(), error = %err, "could not write CA bundle cache");
                }
            }
        }

        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(TrustSnapshot {
            certificate,
            client_config,
            generation,
            loaded_at: Utc::now(),
        })
    }

    fn in_dispatch(&self, f: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.inner.dispatch, f);
    }
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore")
            .field("source", &self.inner.source)
            .field("generation", &self.generation())
            .field("watching", &self.is_watching())
            .finish()
    }
}

async fn watch_expiry(inner: Weak<TrustInner>, mut stop: oneshot::Receiver<()>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        TrustStore { inner }.check_renewal().await;
    }
    debug!("certificate watcher stopped");
}

async fn write_bundle(path: &Path, certificate: &CaCertificate) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ca-bundle.pem".to_string());
    let staging = dir.join(format!(".{file_name}.tmp"));
    tokio::fs::write(&staging, ca_bundle(certificate)).await?;
    tokio::fs::rename(&staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_renewal_due_boundaries() {
        let not_after = Utc.with_ymd_and_hms(2030, 1, 2, 0, 0, 0).unwrap();
        let day = Duration::from_secs(86_400);

        let early = Utc.with_ymd_and_hms(2029, 12, 31, 23, 59, 59).unwrap();
        assert!(!renewal_due(not_after, day, early));

        let at_margin = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(renewal_due(not_after, day, at_margin));

        let expired = Utc.with_ymd_and_hms(2030, 2, 1, 0, 0, 0).unwrap();
        assert!(renewal_due(not_after, day, expired));
    }

    #[test]
    fn test_huge_margin_is_always_due() {
        let not_after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(renewal_due(not_after, Duration::MAX, Utc::now()));
    }

    #[test]
    fn test_zero_margin_renews_at_expiry() {
        let not_after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(!renewal_due(not_after, Duration::ZERO, not_after - chrono::Duration::seconds(1)));
        assert!(renewal_due(not_after, Duration::ZERO, not_after));
    }
}
