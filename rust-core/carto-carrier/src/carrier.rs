// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The carrier thread.
//!
//! One OS thread owns a current-thread tokio runtime. Foreign threads hand it
//! boxed futures over an unbounded channel; each future carries its own
//! one-slot reply channel, so replies can never cross between callers.
//!
//! Lifecycle: `NotStarted -> Running -> Stopped`. `Stopped` is terminal.

use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Dispatch};

use crate::error::{CarrierError, Result};

/// How long `stop` lets in-flight work finish before abandoning it.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Outcome<T> = std::result::Result<T, Box<dyn Any + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
}

struct State {
    lifecycle: Lifecycle,
    jobs: Option<UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
}

/// Clears the running flag when the scheduler exits, including by unwinding.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A dedicated thread running a single-threaded async scheduler.
///
/// ```
/// use carto_carrier::Carrier;
///
/// let carrier = Carrier::new("example-carrier");
/// carrier.start().unwrap();
/// let answer = carrier.submit_and_wait(async { 6 * 7 }).unwrap();
/// assert_eq!(answer, 42);
/// carrier.stop();
/// ```
pub struct Carrier {
    name: String,
    drain_timeout: Duration,
    dispatch: Dispatch,
    running: Arc<AtomicBool>,
    state: Mutex<State>,
}

impl Carrier {
    /// A carrier whose thread is called `name`, logging to the current default dispatcher.
    pub fn new(name: impl Into<String>) -> Self {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        Self::with_dispatch(name, dispatch)
    }

    /// A carrier whose thread and scheduled work log to `dispatch`.
    pub fn with_dispatch(name: impl Into<String>, dispatch: Dispatch) -> Self {
        Self {
            name: name.into(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            dispatch,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(State {
                lifecycle: Lifecycle::NotStarted,
                jobs: None,
                thread: None,
            }),
        }
    }

    /// Set how long `stop` waits for in-flight work.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// The carrier thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the scheduler loop is live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the thread and return once its scheduler is live.
    ///
    /// Starting a running carrier is a no-op. A stopped carrier cannot be restarted.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        match state.lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => return Err(CarrierError::AlreadyStopped),
            Lifecycle::NotStarted => {}
        }

        let (jobs_tx, jobs_rx) = unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let running = Arc::clone(&self.running);
        let dispatch = self.dispatch.clone();
        let drain_timeout = self.drain_timeout;

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    run_scheduler(jobs_rx, ready_tx, running, drain_timeout)
                })
            })
            .map_err(CarrierError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                state.lifecycle = Lifecycle::Running;
                state.jobs = Some(jobs_tx);
                state.thread = Some(handle);
                self.in_dispatch(|| info!(carrier = %self.name, "carrier thread started"));
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(CarrierError::Runtime(err))
            }
            Err(_) => {
                let _ = handle.join();
                Err(CarrierError::Runtime(io::Error::other(
                    "carrier thread exited before its scheduler started",
                )))
            }
        }
    }

    /// Run `work` on the carrier thread and block until it completes.
    ///
    /// Safe to call from any number of threads at once. A panic inside
    /// `work` resumes on the calling thread with its original payload.
    pub fn submit_and_wait<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.sender()?;
        let (reply_tx, reply_rx) = mpsc::sync_channel::<Outcome<T>>(1);
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(work).catch_unwind().await;
            let _ = reply_tx.send(outcome);
        });
        jobs.send(job).map_err(|_| CarrierError::NotRunning)?;
        drop(jobs);

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            // The job was dropped unfinished: the scheduler stopped or died.
            Err(_) => Err(CarrierError::NotRunning),
        }
    }

    /// Like [`submit_and_wait`](Self::submit_and_wait) for fallible work,
    /// returning the work's own error unchanged.
    pub fn try_submit_and_wait<F, T, E>(&self, work: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<CarrierError> + Send + 'static,
    {
        self.submit_and_wait(work)?
    }

    /// Close the job queue, let in-flight work drain and join the thread.
    ///
    /// Idempotent, and safe before `start`. Called from the carrier thread
    /// itself it only closes the queue.
    pub fn stop(&self) {
        let (jobs, thread) = {
            let mut state = self.lock_state();
            let previous = state.lifecycle;
            state.lifecycle = Lifecycle::Stopped;
            if previous != Lifecycle::Running {
                return;
            }
            (state.jobs.take(), state.thread.take())
        };
        drop(jobs);

        let Some(thread) = thread else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            self.in_dispatch(|| warn!(carrier = %self.name, "stop called on the carrier thread, not joining"));
            return;
        }
        if thread.join().is_err() {
            self.in_dispatch(|| warn!(carrier = %self.name, "carrier thread panicked"));
        }
        self.running.store(false, Ordering::Release);
        self.in_dispatch(|| info!(carrier = %self.name, "carrier thread stopped"));
    }

    fn sender(&self) -> Result<UnboundedSender<Job>> {
        let state = self.lock_state();
        if state.lifecycle != Lifecycle::Running || !self.is_running() {
            return Err(CarrierError::NotRunning);
        }
        if let Some(thread) = &state.thread {
            if thread.thread().id() == thread::current().id() {
                return Err(CarrierError::Reentrant);
            }
        }
        state.jobs.clone().ok_or(CarrierError::NotRunning)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_dispatch(&self, f: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, f);
    }
}

impl Drop for Carrier {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carrier")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_scheduler(
    mut jobs: UnboundedReceiver<Job>,
    ready: mpsc::SyncSender<io::Result<()>>,
    running: Arc<AtomicBool>,
    drain_timeout: Duration,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    running.store(true, Ordering::Release);
    let _guard = RunningGuard(running);
    let _ = ready.send(Ok(()));

    runtime.block_on(async move {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => {
                        tasks.spawn(job);
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        debug!(in_flight = tasks.len(), "job queue closed, draining");
        let drained = tokio::time::timeout(drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(abandoned = tasks.len(), "drain timed out, aborting in-flight work");
            tasks.abort_all();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_carrier_is_idle() {
        let carrier = Carrier::new("idle");
        assert!(!carrier.is_running());
        assert_eq!(carrier.name(), "idle");
        assert!(matches!(
            carrier.submit_and_wait(async { 1 }),
            Err(CarrierError::NotRunning)
        ));
    }

    #[test]
    fn test_start_is_idempotent() {
        let carrier = Carrier::new("twice");
        carrier.start().unwrap();
        carrier.start().unwrap();
        assert!(carrier.is_running());
        carrier.stop();
        assert!(!carrier.is_running());
    }

    #[test]
    fn test_restart_after_stop_is_refused() {
        let carrier = Carrier::new("once");
        carrier.start().unwrap();
        carrier.stop();
        assert!(matches!(carrier.start(), Err(CarrierError::AlreadyStopped)));
    }

    #[test]
    fn test_reentrant_submit_is_refused() {
        let carrier = Arc::new(Carrier::new("reentrant"));
        carrier.start().unwrap();
        let inner = Arc::clone(&carrier);
        let nested = carrier
            .submit_and_wait(async move { inner.submit_and_wait(async { 1 }).map_err(|e| e.to_string()) })
            .unwrap();
        assert_eq!(nested.unwrap_err(), CarrierError::Reentrant.to_string());
        carrier.stop();
    }

    #[test]
    fn test_work_runs_on_the_carrier_thread() {
        let carrier = Carrier::new("named-carrier");
        carrier.start().unwrap();
        let name = carrier
            .submit_and_wait(async { thread::current().name().map(str::to_string) })
            .unwrap();
        assert_eq!(name.as_deref(), Some("named-carrier"));
    }
}
