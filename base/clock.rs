// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Clock interface and implementations for testability.
//!
//! The tracker's decision pipeline depends on several time-windowed rules
//! (reuse windows, relink probation, pending-track timeouts). Routing every
//! clock read through this trait lets tests drive those rules deterministically
//! instead of sleeping in real time.

use std::sync::mpsc;
use std::sync::Mutex;
use std::sync::{Arc, Condvar};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use nix::time::{clock_gettime, ClockId};
use tracing::warn;

use crate::shutdown::ShutdownError;
use crate::Error;

/// Abstract interface to the system clocks. This is for testability.
pub trait Clocks: Send + Sync + 'static {
    /// Gets the current time from `CLOCK_REALTIME`.
    fn realtime(&self) -> Timestamp;

    /// Gets the current time from a monotonic clock.
    ///
    /// On Linux, this uses `CLOCK_BOOTTIME`, which includes suspended time.
    /// On other systems, it uses `CLOCK_MONOTONIC`.
    fn monotonic(&self) -> Timestamp;

    /// Causes the current thread to sleep for the specified time.
    fn sleep(&self, how_long: Duration);

    /// Calls `rcv.recv_timeout` or substitutes a test implementation.
    fn recv_timeout<T>(
        &self,
        rcv: &mpsc::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, mpsc::RecvTimeoutError>;
}

/// Retries `f` until it succeeds or shutdown is requested, sleeping 1s between attempts.
pub fn retry<C, T, E>(
    clocks: &C,
    shutdown_rx: &crate::shutdown::Receiver,
    f: &mut dyn FnMut() -> Result<T, E>,
) -> Result<T, ShutdownError>
where
    C: Clocks,
    E: Into<Error>,
{
    loop {
        let e = match f() {
            Ok(t) => return Ok(t),
            Err(e) => e.into(),
        };
        shutdown_rx.check()?;
        warn!(exception = %e.chain(), "sleeping for 1s after error");
        clocks.sleep(Duration::from_secs(1));
    }
}

#[derive(Copy, Clone, Default)]
pub struct RealClocks {}

impl RealClocks {
    fn get(&self, clock: ClockId) -> Timestamp {
        let ts = clock_gettime(clock).expect("clock_gettime should not fail");
        Timestamp::new(ts.tv_sec(), ts.tv_nsec() as i32).expect("kernel clock out of jiff's range")
    }
}

impl Clocks for RealClocks {
    fn realtime(&self) -> Timestamp {
        self.get(ClockId::CLOCK_REALTIME)
    }

    #[cfg(target_os = "linux")]
    fn monotonic(&self) -> Timestamp {
        self.get(ClockId::CLOCK_BOOTTIME)
    }

    #[cfg(not(target_os = "linux"))]
    fn monotonic(&self) -> Timestamp {
        self.get(ClockId::CLOCK_MONOTONIC)
    }

    fn sleep(&self, how_long: Duration) {
        std::thread::sleep(how_long);
    }

    fn recv_timeout<T>(
        &self,
        rcv: &mpsc::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, mpsc::RecvTimeoutError> {
        rcv.recv_timeout(timeout)
    }
}

/// Logs a warning if the guard lives "too long", using the label created by a supplied function.
pub struct TimerGuard<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> {
    clocks: &'a C,
    label_f: Option<F>,
    start: Timestamp,
}

impl<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> TimerGuard<'a, C, S, F> {
    pub fn new(clocks: &'a C, label_f: F) -> Self {
        TimerGuard {
            clocks,
            label_f: Some(label_f),
            start: clocks.monotonic(),
        }
    }
}

impl<C, S, F> Drop for TimerGuard<'_, C, S, F>
where
    C: Clocks + ?Sized,
    S: AsRef<str>,
    F: FnOnce() -> S,
{
    fn drop(&mut self) {
        let elapsed: SignedDuration = self.clocks.monotonic().duration_since(self.start);
        if elapsed.as_secs() >= 1 {
            let label_f = self.label_f.take().unwrap();
            warn!("{} took {elapsed:?}", label_f().as_ref());
        }
    }
}

/// Simulated clock for testing: time only advances when `sleep` is called, or
/// when `recv_timeout` doesn't find data immediately available.
#[derive(Clone)]
pub struct SimulatedClocks(Arc<SimulatedClocksInner>);

struct SimulatedClocksInner {
    boot: Timestamp,
    uptime: Mutex<SignedDuration>,
    cond: Condvar,
}

impl SimulatedClocks {
    pub fn new(boot: Timestamp) -> Self {
        SimulatedClocks(Arc::new(SimulatedClocksInner {
            boot,
            uptime: Mutex::new(SignedDuration::ZERO),
            cond: Condvar::new(),
        }))
    }
}

impl Clocks for SimulatedClocks {
    fn realtime(&self) -> Timestamp {
        self.0.boot.checked_add(*self.0.uptime.lock().unwrap()).unwrap()
    }

    fn monotonic(&self) -> Timestamp {
        Timestamp::UNIX_EPOCH
            .checked_add(*self.0.uptime.lock().unwrap())
            .unwrap()
    }

    /// Advances the clock by the specified amount without actually sleeping.
    fn sleep(&self, how_long: Duration) {
        let mut l = self.0.uptime.lock().unwrap();
        *l = l.checked_add(SignedDuration::try_from(how_long).unwrap()).unwrap();
        self.0.cond.notify_all();
    }

    /// Advances the clock by the specified amount if data is not immediately available.
    fn recv_timeout<T>(
        &self,
        rcv: &mpsc::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, mpsc::RecvTimeoutError> {
        let r = rcv.recv_timeout(Duration::from_millis(0));
        if r.is_err() {
            self.sleep(timeout);
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_only_advances_on_sleep() {
        let c = SimulatedClocks::new(Timestamp::UNIX_EPOCH);
        let t0 = c.monotonic();
        c.sleep(Duration::from_secs(5));
        let t1 = c.monotonic();
        assert_eq!(t1.duration_since(t0).as_secs(), 5);
    }

    #[test]
    fn real_clock_monotonic_does_not_go_backwards() {
        let c = RealClocks {};
        let t0 = c.monotonic();
        let t1 = c.monotonic();
        assert!(t1 >= t0);
    }
}
