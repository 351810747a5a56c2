// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Concurrency, failure propagation and shutdown of the carrier thread.

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use carto_carrier::{Carrier, CarrierError};
use proptest::prelude::*;

/// Log output collected from a test subscriber.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capturing_dispatch(log: &CapturedLog) -> tracing::Dispatch {
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    tracing::Dispatch::new(subscriber)
}

#[test]
fn test_many_threads_get_their_own_results() {
    let carrier = Arc::new(Carrier::new("concurrency"));
    carrier.start().unwrap();

    let workers: Vec<_> = (0..10u32)
        .map(|worker| {
            let carrier = Arc::clone(&carrier);
            thread::spawn(move || {
                (0..10u32)
                    .map(|call| {
                        let id = worker * 100 + call;
                        let got = carrier
                            .submit_and_wait(async move {
                                // Interleave with the other callers' work.
                                tokio::time::sleep(Duration::from_millis(u64::from(id % 7))).await;
                                id
                            })
                            .unwrap();
                        assert_eq!(got, id);
                        got
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for worker in workers {
        for value in worker.join().unwrap() {
            assert!(seen.insert(value), "value {value} returned twice");
        }
    }
    assert_eq!(seen.len(), 100);
    carrier.stop();
}

#[test]
fn test_work_error_reaches_caller_unchanged() {
    let carrier = Carrier::new("errors");
    carrier.start().unwrap();

    let result = carrier
        .submit_and_wait(async { Err::<u32, _>(io::Error::new(io::ErrorKind::NotFound, "no such graph")) })
        .unwrap();
    let err = result.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert_eq!(err.to_string(), "no such graph");
}

#[derive(Debug)]
enum AppError {
    Carrier(CarrierError),
    Domain(String),
}

impl From<CarrierError> for AppError {
    fn from(err: CarrierError) -> Self {
        AppError::Carrier(err)
    }
}

#[test]
fn test_try_submit_flattens_errors() {
    let carrier = Carrier::new("flatten");
    carrier.start().unwrap();

    let err = carrier
        .try_submit_and_wait(async { Err::<(), _>(AppError::Domain("rejected".into())) })
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(ref message) if message == "rejected"));

    carrier.stop();
    let err = carrier.try_submit_and_wait(async { Ok::<_, AppError>(()) }).unwrap_err();
    assert!(matches!(err, AppError::Carrier(CarrierError::NotRunning)));
}

#[test]
fn test_panic_resumes_on_caller_and_carrier_survives() {
    let carrier = Carrier::new("panics");
    carrier.start().unwrap();

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        carrier.submit_and_wait(async { panic!("boom in carrier work") })
    }))
    .unwrap_err();
    assert_eq!(caught.downcast_ref::<&str>(), Some(&"boom in carrier work"));

    assert!(carrier.is_running());
    assert_eq!(carrier.submit_and_wait(async { 7 }).unwrap(), 7);
}

#[test]
fn test_stop_is_idempotent_and_safe_before_start() {
    let never_started = Carrier::new("never-started");
    never_started.stop();
    never_started.stop();
    assert!(!never_started.is_running());

    let carrier = Carrier::new("stopped-twice");
    carrier.start().unwrap();
    carrier.stop();
    carrier.stop();
    assert!(!carrier.is_running());
}

#[test]
fn test_submit_after_stop_fails_fast() {
    let carrier = Carrier::new("after-stop");
    carrier.start().unwrap();
    carrier.stop();

    let started = Instant::now();
    assert!(matches!(
        carrier.submit_and_wait(async { 1 }),
        Err(CarrierError::NotRunning)
    ));
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_sleeping_work_returns_within_bound() {
    let carrier = Carrier::new("sleeper");
    carrier.start().unwrap();

    let started = Instant::now();
    let value = carrier
        .submit_and_wait(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            42
        })
        .unwrap();
    assert_eq!(value, 42);
    assert!(started.elapsed() < Duration::from_secs(1));

    let stopping = Instant::now();
    carrier.stop();
    assert!(stopping.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_stop_drains_in_flight_work() {
    let carrier = Arc::new(Carrier::new("drain"));
    carrier.start().unwrap();

    let submitter = {
        let carrier = Arc::clone(&carrier);
        thread::spawn(move || {
            carrier.submit_and_wait(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                "finished"
            })
        })
    };
    thread::sleep(Duration::from_millis(20));
    carrier.stop();

    assert_eq!(submitter.join().unwrap().unwrap(), "finished");
}

#[test]
fn test_stuck_work_is_abandoned_after_drain_timeout() {
    let carrier = Arc::new(Carrier::new("stuck").with_drain_timeout(Duration::from_millis(50)));
    carrier.start().unwrap();

    let submitter = {
        let carrier = Arc::clone(&carrier);
        thread::spawn(move || carrier.submit_and_wait(std::future::pending::<()>()))
    };
    thread::sleep(Duration::from_millis(20));
    carrier.stop();

    assert!(matches!(
        submitter.join().unwrap(),
        Err(CarrierError::NotRunning)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_values_round_trip_through_carrier(values in prop::collection::vec(any::<i64>(), 1..32)) {
        let carrier = Carrier::new("proptest");
        carrier.start().unwrap();
        for value in values {
            prop_assert_eq!(carrier.submit_and_wait(async move { value }).unwrap(), value);
        }
    }
}

#[test]
fn test_carrier_thread_logs_to_injected_dispatch() {
    let log = CapturedLog::default();
    let carrier = Carrier::with_dispatch("logging", capturing_dispatch(&log));
    carrier.start().unwrap();

    let thread_name = carrier
        .submit_and_wait(async {
            tracing::info!(answer = 42, "work ran on the carrier");
            thread::current().name().map(str::to_string)
        })
        .unwrap();
    carrier.stop();

    assert_eq!(thread_name.as_deref(), Some("logging"));
    let output = log.contents();
    assert!(output.contains("carrier thread started"), "{output}");
    assert!(output.contains("work ran on the carrier"), "{output}");
    assert!(output.contains("answer=42"), "{output}");
    assert!(output.contains("job queue closed, draining"), "{output}");
    assert!(output.contains("carrier thread stopped"), "{output}");
}

#[test]
fn test_default_dispatch_does_not_see_injected_logs() {
    let log = CapturedLog::default();
    let other = CapturedLog::default();
    let carrier = Carrier::with_dispatch("isolated", capturing_dispatch(&log));

    tracing::dispatcher::with_default(&capturing_dispatch(&other), || {
        carrier.start().unwrap();
        carrier.submit_and_wait(async { tracing::info!("isolated work") }).unwrap();
        carrier.stop();
    });

    assert!(log.contents().contains("isolated work"));
    assert!(other.contents().is_empty(), "{}", other.contents());
}
