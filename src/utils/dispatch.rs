//! Named background thread hosting a server's I/O runtime.
//!
//! The thread is started explicitly and stopped explicitly: `stop()` cancels the
//! shared [`CancellationToken`] and joins. The hosted work is expected to observe
//! the token at every iteration.

use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{ProtocolError, Result};

pub struct DispatchThread {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DispatchThread {
    /// Spawn `work` on a new thread called `name`.
    pub fn start<F>(name: impl Into<String>, cancel: CancellationToken, work: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(work)?;
        debug!(thread = %name, "Dispatch thread started");
        Ok(Self {
            name,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until the hosted work returns.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and join. Safe to call more than once.
    pub fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            // joining ourselves would deadlock; the loop exits on the token
            return Ok(());
        }
        handle.join().map_err(|_| {
            error!(thread = %self.name, "Dispatch thread panicked");
            ProtocolError::DispatchPanicked
        })?;
        debug!(thread = %self.name, "Dispatch thread joined");
        Ok(())
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
