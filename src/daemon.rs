// SPDX-License-Identifier: GPL-3.0-only
//! Brightness service
//!
//! Async facade over the blocking [`ConnectionManager`] for collaborators
//! such as the CLI. Every device operation runs on tokio's blocking pool and
//! reports a [`Status`] code instead of an error value; a panic inside a
//! device call surfaces as [`Status::Exception`].
//!
//! The service can also run a reconnection watcher: a dedicated thread that
//! polls for the display while it is gone and reports transitions over a
//! channel. [`BrightnessService::deinit`] ends any running watcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::brightness::Levels;
use crate::config::{Config, RetryPolicy};
use crate::error::{AcquireError, Status, WaitError};
use crate::hid::Caps;
use crate::monitor::manager::wait_with;
use crate::monitor::{lock, ConnectionManager, SharedManager};
use crate::preview::PreviewGuard;
use crate::protocols::apple_hid::{BrightnessValue, DeviceCapabilities};
use crate::protocols::HidBackend;

/// Connection transitions reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Lost,
    /// The reconnect budget ran out; the watcher has stopped
    GaveUp,
}

/// Result of [`BrightnessService::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The display accepted the new level
    Applied(usize),
    /// The write failed and the tracked level fell back to the default;
    /// the display itself was not written again
    Reset { level: usize, status: Status },
}

/// Negotiated layout of the connected display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub path: String,
    pub caps: Caps,
    pub input_caps: DeviceCapabilities,
    pub feature_caps: DeviceCapabilities,
}

pub struct BrightnessService {
    manager: SharedManager,
    config: Config,
}

impl BrightnessService {
    pub fn new(backend: Box<dyn HidBackend>, config: Config) -> Self {
        Self::with_manager(ConnectionManager::new(backend), config)
    }

    pub fn with_manager(manager: ConnectionManager, config: Config) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> SharedManager {
        Arc::clone(&self.manager)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&mut ConnectionManager) -> T + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || op(&mut lock(&manager)))
            .await
            .map_err(|e| {
                tracing::error!("Brightness operation failed: {}", e);
                Status::Exception
            })
    }

    /// Connect using the startup retry policy; a live session is kept
    pub async fn init(&self) -> Status {
        let policy = self.config.startup;
        self.blocking(move |manager| {
            if manager.is_connected() {
                return Status::Success;
            }
            startup_status(manager, &policy)
        })
        .await
        .unwrap_or_else(|status| status)
    }

    /// Drop any session and connect again
    pub async fn reinit(&self) -> Status {
        let policy = self.config.startup;
        self.blocking(move |manager| {
            manager.close();
            startup_status(manager, &policy)
        })
        .await
        .unwrap_or_else(|status| status)
    }

    /// Current brightness; the value is 0 unless the status is success
    pub async fn get_brightness(&self) -> (Status, BrightnessValue) {
        match self.blocking(|manager| manager.get()).await {
            Ok(Ok(value)) => (Status::Success, value),
            Ok(Err(e)) => {
                tracing::debug!("Failed to read brightness: {}", e);
                (Status::from(&e), 0)
            }
            Err(status) => (status, 0),
        }
    }

    pub async fn set_brightness(&self, value: BrightnessValue) -> Status {
        match self.blocking(move |manager| manager.set(value)).await {
            Ok(Ok(_)) => Status::Success,
            Ok(Err(e)) => Status::from(&e),
            Err(status) => status,
        }
    }

    /// Close the session; safe to call repeatedly
    ///
    /// The session stays closed until the next `init` or `reinit`; a running
    /// watcher does not reconnect it and exits.
    pub async fn deinit(&self) {
        if let Err(status) = self.blocking(|manager| manager.release()).await {
            tracing::error!("Deinit failed with status {}", status.code());
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.blocking(|manager| manager.is_connected())
            .await
            .unwrap_or(false)
    }

    pub async fn describe(&self) -> Option<DeviceReport> {
        self.blocking(|manager| {
            let session = manager.session()?;
            Some(DeviceReport {
                path: session.path().to_string(),
                caps: session.caps()?,
                input_caps: session.input_caps(),
                feature_caps: session.feature_caps(),
            })
        })
        .await
        .ok()
        .flatten()
    }

    /// Move one level up or down from the current brightness
    ///
    /// When the display cannot be read the step starts from `last_level`, or
    /// the default level.
    pub async fn step(&self, levels: &Levels, up: bool, last_level: Option<usize>) -> StepOutcome {
        let (status, value) = self.get_brightness().await;
        let current = if status.is_success() {
            levels.level_for(value)
        } else {
            let fallback = last_level
                .filter(|&i| i < levels.len())
                .unwrap_or_else(|| levels.default_index());
            tracing::info!("{}, stepping from level {}", status, fallback + 1);
            fallback
        };

        let next = if up {
            levels.step_up(current)
        } else {
            levels.step_down(current)
        };

        match self.set_brightness(levels.value(next)).await {
            Status::Success => StepOutcome::Applied(next),
            status => StepOutcome::Reset {
                level: levels.default_index(),
                status,
            },
        }
    }

    /// Start a preview that restores the current brightness unless committed
    pub async fn begin_preview(&self) -> Result<PreviewGuard, Status> {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || PreviewGuard::begin(manager))
            .await
            .map_err(|e| {
                tracing::error!("Preview failed: {}", e);
                Status::Exception
            })?
            .map_err(|e| Status::from(&e))
    }

    /// Watch the connection with the configured reconnect policy
    pub fn spawn_watcher(&self) -> (Watcher, mpsc::Receiver<ConnectionEvent>) {
        Watcher::spawn(Arc::clone(&self.manager), self.config.reconnect)
    }
}

fn startup_status(manager: &mut ConnectionManager, policy: &RetryPolicy) -> Status {
    match manager.start(policy) {
        Ok(()) => Status::Success,
        Err(e) => {
            tracing::debug!("{}", e);
            Status::from(&e)
        }
    }
}

/// Handle to the reconnection watcher thread
///
/// Dropping the handle asks the thread to stop at its next check.
pub struct Watcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watcher {
    fn spawn(manager: SharedManager, policy: RetryPolicy) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(100);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            watch(&manager, &policy, &thread_stop, |event| {
                match tx.try_send(event) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Connection event channel full, dropping {:?}", event);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
            tracing::debug!("Connection watcher stopped");
        });

        (
            Self {
                stop,
                thread: Some(thread),
            },
            rx,
        )
    }

    /// Stop the watcher and wait for its thread to exit
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Connection watcher panicked");
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Watcher loop; `emit` returns false once nobody is listening
fn watch(
    manager: &Mutex<ConnectionManager>,
    policy: &RetryPolicy,
    stop: &AtomicBool,
    mut emit: impl FnMut(ConnectionEvent) -> bool,
) {
    let sleeper = lock(manager).sleeper();
    let mut connected = lock(manager).is_connected();

    while !stop.load(Ordering::SeqCst) {
        if connected {
            sleeper.sleep(policy.interval());
            if stop.load(Ordering::SeqCst) {
                break;
            }
            connected = {
                let mut manager = lock(manager);
                if manager.is_released() {
                    tracing::debug!("Session released, watcher exiting");
                    break;
                }
                manager.check_presence()
            };
            if !connected {
                tracing::info!("Brightness device lost, waiting for it to return");
                if !emit(ConnectionEvent::Lost) {
                    break;
                }
            }
            continue;
        }

        let result = wait_with(policy, sleeper.as_ref(), stop, || {
            let mut manager = lock(manager);
            if manager.is_released() {
                tracing::debug!("Session released, watcher exiting");
                stop.store(true, Ordering::SeqCst);
                return Err(AcquireError::NotFound);
            }
            manager.acquire()
        });

        match result {
            Ok(()) => {
                connected = true;
                if !emit(ConnectionEvent::Connected) {
                    break;
                }
            }
            Err(WaitError::Exhausted { .. }) => {
                if !stop.load(Ordering::SeqCst) {
                    emit(ConnectionEvent::GaveUp);
                }
                break;
            }
            Err(WaitError::Cancelled) => break,
        }
    }
}
