//! Cooperative cancellation for signals and the global run deadline.
//!
//! The orchestration loops call [`ShutdownToken::check`] at iteration
//! boundaries. Agent calls already in flight run to completion.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, warn};

const NOT_CANCELLED: u8 = 0;
const SIGNAL: u8 = 1;
const TIMEOUT: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// SIGINT/SIGTERM (or Ctrl+C).
    Signal,
    /// The global run deadline passed.
    Timeout,
}

impl CancelReason {
    fn code(self) -> u8 {
        match self {
            CancelReason::Signal => SIGNAL,
            CancelReason::Timeout => TIMEOUT,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            SIGNAL => Some(CancelReason::Signal),
            TIMEOUT => Some(CancelReason::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal => f.write_str("termination signal"),
            CancelReason::Timeout => f.write_str("global timeout"),
        }
    }
}

/// Error returned from a loop boundary once the run has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub reason: CancelReason,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run cancelled by {}", self.reason)
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug)]
struct Inner {
    reason: AtomicU8,
    signals: AtomicU32,
    deadline: Option<Instant>,
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    /// Token with an optional global deadline measured from now.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                reason: AtomicU8::new(NOT_CANCELLED),
                signals: AtomicU32::new(0),
                deadline: timeout.map(|timeout| Instant::now() + timeout),
            }),
        }
    }

    /// Token that is only cancelled explicitly.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Request cancellation. The first reason recorded wins.
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.inner.reason.compare_exchange(
            NOT_CANCELLED,
            reason.code(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Count a delivered signal and cancel. Returns `true` only for the first.
    pub fn record_signal(&self) -> bool {
        let previous = self.inner.signals.fetch_add(1, Ordering::SeqCst);
        self.cancel(CancelReason::Signal);
        previous == 0
    }

    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_code(self.inner.reason.load(Ordering::SeqCst))
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Loop-boundary check; also trips the deadline once it has passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.reason().is_none()
            && let Some(deadline) = self.inner.deadline
            && Instant::now() >= deadline
        {
            self.cancel(CancelReason::Timeout);
        }
        match self.reason() {
            Some(reason) => Err(Cancelled { reason }),
            None => Ok(()),
        }
    }
}

/// Spawn a listener thread that cancels `token` on SIGINT/SIGTERM.
///
/// Handlers are registered before this returns, so a signal delivered
/// afterwards is never lost to the default disposition. A second signal
/// exits the process immediately without waiting for the in-flight agent.
pub fn install_signal_handlers(token: ShutdownToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;

    #[cfg(unix)]
    let (mut sigint, mut sigterm) = runtime.block_on(async {
        use tokio::signal::unix::{SignalKind, signal};
        Ok::<_, std::io::Error>((
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
        ))
    })
    .context("register signal handlers")?;

    thread::Builder::new()
        .name("factory-signals".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    #[cfg(unix)]
                    {
                        tokio::select! {
                            _ = sigint.recv() => warn!("SIGINT received"),
                            _ = sigterm.recv() => warn!("SIGTERM received"),
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        if let Err(err) = tokio::signal::ctrl_c().await {
                            warn!(err = %err, "ctrl-c listener failed");
                            return;
                        }
                        warn!("Ctrl+C received");
                    }
                    if token.record_signal() {
                        warn!("finishing current agent call, signal again to force quit");
                        debug!("shutdown requested");
                    } else {
                        warn!("second signal, exiting without waiting");
                        std::process::exit(crate::exit_codes::FAILURE);
                    }
                }
            });
        })
        .context("spawn signal listener")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins() {
        let token = ShutdownToken::unbounded();
        assert!(token.check().is_ok());
        token.cancel(CancelReason::Signal);
        token.cancel(CancelReason::Timeout);
        assert_eq!(
            token.check(),
            Err(Cancelled {
                reason: CancelReason::Signal
            })
        );
    }

    /// Verifies only the first delivered signal is a graceful request.
    #[test]
    fn repeated_signal_is_reported() {
        let token = ShutdownToken::unbounded();
        let listener = token.clone();
        assert!(listener.record_signal());
        assert_eq!(token.reason(), Some(CancelReason::Signal));
        assert!(!listener.record_signal());
        assert!(!token.record_signal());
        assert_eq!(token.reason(), Some(CancelReason::Signal));
    }

    #[test]
    fn timeout_then_signal_keeps_timeout() {
        let token = ShutdownToken::unbounded();
        token.cancel(CancelReason::Timeout);
        assert!(token.record_signal());
        assert_eq!(token.reason(), Some(CancelReason::Timeout));
    }

    #[test]
    fn clones_share_state() {
        let token = ShutdownToken::unbounded();
        let clone = token.clone();
        clone.cancel(CancelReason::Signal);
        assert!(token.is_cancelled());
    }

    #[test]
    fn zero_timeout_trips_on_first_check() {
        let token = ShutdownToken::new(Some(Duration::ZERO));
        assert!(!token.is_cancelled());
        assert_eq!(
            token.check().unwrap_err().reason,
            CancelReason::Timeout
        );
        assert_eq!(token.reason(), Some(CancelReason::Timeout));
    }

    #[test]
    fn distant_deadline_does_not_trip() {
        let token = ShutdownToken::new(Some(Duration::from_secs(3600)));
        assert!(token.check().is_ok());
    }
}
