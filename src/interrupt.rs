//! User interrupt (Ctrl-C) handling.
//!
//! Long-running loops check [`Interrupt::is_triggered`] before each unit of
//! work and race in-flight backend calls against [`Interrupt::cancelled`],
//! so a Ctrl-C stops the run promptly and lets the caller save what it has.

use crate::error::{EvalError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Shared interrupt flag.
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    /// A handle that is never triggered unless [`Interrupt::trigger`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C handler that triggers the returned handle.
    ///
    /// Only one handler can be installed per process.
    pub fn install() -> Result<Self> {
        let interrupt = Self::new();
        let handle = interrupt.clone();
        ctrlc::set_handler(move || handle.trigger())
            .map_err(|e| EvalError::Config(format!("failed to install Ctrl-C handler: {}", e)))?;
        Ok(interrupt)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the interrupt has been triggered.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
