//! External control signals for a running pipeline

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Running flag, cancel token and pause gate shared between the
/// orchestrator's control loop and its callers
#[derive(Debug)]
pub struct RunControl {
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    paused: watch::Sender<bool>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            paused,
        }
    }

    /// Claim the orchestrator for one run.
    ///
    /// Each run gets a fresh cancel token, so a `cancel()` issued while idle
    /// does not leak into the next run. The pause gate is left as it is.
    pub fn begin(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyRunning)?;

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        Ok(RunGuard {
            control: self,
            token,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cancel the current run and open the pause gate
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.paused.send_replace(false);
    }

    /// Close the gate; the next stage boundary blocks until `resume()`
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait for the gate to open. Returns false when `token` is cancelled first.
    pub async fn wait_until_resumed(&self, token: &CancellationToken) -> bool {
        let mut gate = self.paused.subscribe();
        tokio::select! {
            opened = gate.wait_for(|paused| !*paused) => opened.is_ok(),
            _ = token.cancelled() => false,
        }
    }
}

/// Holds the running flag for the duration of one run
pub struct RunGuard<'a> {
    control: &'a RunControl,
    token: CancellationToken,
}

impl RunGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.control.running.store(false, Ordering::Release);
    }
}
