// SPDX-License-Identifier: GPL-3.0-only
//! Connection manager for the brightness interface
//!
//! This module owns the single [`Session`] to the display and drives its
//! lifecycle: bounded retry at startup, a slow poll while waiting for the
//! display to come back, and idempotent teardown.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Acquiring -> Connected -> Disconnected
//!                     |                          ^
//!                     +------- failure ----------+
//! ```
//!
//! - Startup retries only while the device is absent; any other failure
//!   (enumeration, open, negotiation) aborts immediately.
//! - The reconnect wait retries every failure until its budget runs out or it
//!   is cancelled.
//! - A failed input report fetch is treated as the device being unplugged.
//! - [`ConnectionManager::release`] closes the session on the caller's
//!   request. Watchers leave a released manager alone until the next
//!   explicit acquisition.
//!
//! # Thread Safety
//!
//! All operations are blocking and take `&mut self`. Callers sharing a
//! manager serialise access through a mutex, which also serialises reads and
//! writes to the device.
//!
//! # Usage
//!
//! ```no_run
//! use studio_brightness::config::RetryPolicy;
//! use studio_brightness::monitor::ConnectionManager;
//! use studio_brightness::protocols::hidapi_backend::HidapiBackend;
//!
//! let mut manager = ConnectionManager::new(Box::new(HidapiBackend::new()));
//! manager.start(&RetryPolicy::startup())?;
//! let value = manager.get()?;
//! manager.set(value)?;
//! manager.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::enumeration::find_device;
use super::session::Session;
use crate::config::RetryPolicy;
use crate::devices::apple::studio_display;
use crate::devices::HardwareMatch;
use crate::error::{AcquireError, ReadError, StartupError, WaitError, WriteError};
use crate::protocols::apple_hid::{BrightnessValue, Encoding};
use crate::protocols::HidBackend;

/// Blocking delay between acquisition attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Acquiring,
    Connected,
}

/// Poll `attempt` until it succeeds, the policy is exhausted or `stop` is set
///
/// Each attempt is preceded by one interval of sleep. `stop` is checked
/// before and after every sleep.
pub fn wait_with(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    stop: &AtomicBool,
    mut attempt: impl FnMut() -> Result<(), AcquireError>,
) -> Result<(), WaitError> {
    for n in 1..=policy.attempts {
        if stop.load(Ordering::SeqCst) {
            return Err(WaitError::Cancelled);
        }
        sleeper.sleep(policy.interval());
        if stop.load(Ordering::SeqCst) {
            return Err(WaitError::Cancelled);
        }

        match attempt() {
            Ok(()) => {
                info!("Brightness device connected after {} attempt(s)", n);
                return Ok(());
            }
            Err(e) => debug!("Reconnect attempt {}/{} failed: {}", n, policy.attempts, e),
        }
    }

    warn!(
        "Brightness device did not reconnect after {} attempts",
        policy.attempts
    );
    Err(WaitError::Exhausted {
        attempts: policy.attempts,
    })
}

/// Manager shared between the service, its watcher and preview guards
pub type SharedManager = Arc<Mutex<ConnectionManager>>;

/// Lock a shared manager, recovering it if a previous holder panicked
pub fn lock(shared: &Mutex<ConnectionManager>) -> MutexGuard<'_, ConnectionManager> {
    shared.lock().unwrap_or_else(|poisoned| {
        warn!("Connection manager lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Owner of the brightness session
pub struct ConnectionManager {
    backend: Box<dyn HidBackend>,
    criteria: HardwareMatch,
    sleeper: Arc<dyn Sleeper>,
    session: Option<Session>,
    state: ConnectionState,
    released: bool,
}

impl ConnectionManager {
    /// Create a disconnected manager looking for the Studio Display
    pub fn new(backend: Box<dyn HidBackend>) -> Self {
        Self {
            backend,
            criteria: studio_display::SPEC.hardware_match,
            sleeper: Arc::new(ThreadSleeper),
            session: None,
            state: ConnectionState::Disconnected,
            released: false,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_criteria(mut self, criteria: HardwareMatch) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether the caller closed the session and no acquisition followed
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Current session, if connected
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// One full acquisition: enumerate, open, negotiate
    ///
    /// Any prior session is torn down first.
    pub fn acquire(&mut self) -> Result<(), AcquireError> {
        self.close();
        self.released = false;
        self.state = ConnectionState::Acquiring;

        let result = find_device(self.backend.as_ref(), &self.criteria)
            .map_err(AcquireError::from)
            .and_then(|path| path.ok_or(AcquireError::NotFound))
            .and_then(|path| Session::establish(self.backend.as_ref(), path));

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Bounded startup acquisition
    ///
    /// Retries only while the device is not found, sleeping one interval
    /// between attempts.
    pub fn start(&mut self, policy: &RetryPolicy) -> Result<(), StartupError> {
        for attempt in 1..=policy.attempts {
            match self.acquire() {
                Ok(()) => return Ok(()),
                Err(AcquireError::NotFound) => {
                    info!(
                        "Brightness device not found (attempt {}/{})",
                        attempt, policy.attempts
                    );
                    if attempt < policy.attempts {
                        self.sleeper.sleep(policy.interval());
                    }
                }
                Err(e) => {
                    debug!("Brightness device initialisation failed: {}", e);
                    return Err(StartupError::Fatal(e));
                }
            }
        }

        Err(StartupError::DeviceAbsent {
            attempts: policy.attempts,
        })
    }

    /// Poll until the device is back, holding the manager for the whole wait
    pub fn wait_for_device(&mut self, policy: &RetryPolicy, stop: &AtomicBool) -> Result<(), WaitError> {
        let sleeper = self.sleeper();
        wait_with(policy, sleeper.as_ref(), stop, || self.acquire())
    }

    /// Re-enumerate and drop the session if its interface is gone
    ///
    /// Enumeration failures are not taken as evidence of loss.
    pub fn check_presence(&mut self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };

        match find_device(self.backend.as_ref(), &self.criteria) {
            Ok(Some(path)) if &path == session.path() => true,
            Ok(_) => {
                warn!("Brightness device {} is gone", session.path());
                self.close();
                false
            }
            Err(e) => {
                debug!("Presence check skipped: {}", e);
                self.is_connected()
            }
        }
    }

    /// Read the current brightness
    pub fn get(&mut self) -> Result<BrightnessValue, ReadError> {
        let channel = self
            .session
            .as_mut()
            .and_then(Session::channel);
        let Some(mut channel) = channel else {
            return Err(ReadError::NotConnected);
        };

        let result = channel.get();
        if let Err(ReadError::ReportFetch(e)) = &result {
            warn!("Input report fetch failed, treating device as lost: {}", e);
            self.close();
        }
        result
    }

    /// Write a brightness value, returning the encoding the device accepted
    pub fn set(&mut self, value: BrightnessValue) -> Result<&'static Encoding, WriteError> {
        let Some(mut channel) = self.session.as_mut().and_then(Session::channel) else {
            return Err(WriteError::NotConnected);
        };

        channel.set(value).inspect_err(|e| {
            debug!("{}", e);
        })
    }

    /// Tear the session down; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("Brightness device disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Close the session and keep it closed until the next [`acquire`](Self::acquire)
    pub fn release(&mut self) {
        self.close();
        self.released = true;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
