//! Connection readiness
//!
//! The X connection is driven from a single task, but waiting for its socket
//! uses mio on a blocking helper thread which wakes the reactor loop through
//! a `Notify`. Dropping the stream stops the helper.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};

const READY: mio::Token = mio::Token(0);

/// Readiness signal for the connection's file descriptor
pub struct EventStream {
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl EventStream {
    /// Start watching `fd` for readability. The descriptor must stay open
    /// for as long as the stream lives.
    pub fn new(fd: RawFd) -> Result<Self> {
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), READY, mio::Interest::READABLE)
            .context("Failed to register X connection with mio")?;

        // bounded so a dropped stream is noticed
        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || {
            loop {
                if guard.is_closed() {
                    tracing::debug!("Connection readiness thread shutting down");
                    return;
                }

                if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                    tracing::warn!("Connection poll failed: {:?}", err);
                    continue;
                }

                if events.iter().any(|event| event.token() == READY) {
                    task_notify.notify_one();
                }
            }
        });

        Ok(Self {
            notify,
            _task_guard: task_guard,
        })
    }

    /// Resolves once the descriptor has become readable since the last wait
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }
}
