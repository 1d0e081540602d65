//! Readiness checks for freshly started instances.
//!
//! An instance is ready only when its mapped port accepts TCP connections
//! *and* an application-level probe (normally `pg_isready`) succeeds. The
//! probe is never consulted while the port is closed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    net::TcpStream,
    time::{Instant, sleep, timeout, timeout_at},
};
use tracing::{debug, warn};

use crate::error::ProvisionError;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Application-level health check.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Run the probe once.
    ///
    /// `Ok(false)` means "not yet"; an error aborts provisioning immediately.
    async fn ping(&self) -> Result<bool, ProvisionError>;
}

/// Polling schedule for [`wait_until_ready`].
///
/// The timeout counts from `started`, so time already spent starting the
/// backend comes out of the same budget.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// Total time allowed from `started`.
    pub timeout: Duration,
    /// Pause between attempts.
    pub poll_interval: Duration,
    /// When the clock started.
    pub started: Instant,
}

impl ReadinessPolicy {
    /// Policy whose clock starts now.
    #[must_use]
    pub fn starting_now(timeout: Duration, poll_interval: Duration) -> Self {
        Self::since(Instant::now(), timeout, poll_interval)
    }

    /// Policy whose clock started at `started`.
    #[must_use]
    pub const fn since(started: Instant, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            started,
        }
    }

    /// Instant after which no further attempt may run.
    #[must_use]
    pub fn deadline(&self) -> Instant { self.started + self.timeout }

    /// The error reported once [`Self::deadline`] has passed.
    #[must_use]
    pub const fn expired(&self) -> ProvisionError {
        ProvisionError::ProvisioningTimeout {
            timeout: self.timeout,
        }
    }
}

/// Block until `host:port` is listening and `probe` succeeds.
///
/// Every port check and probe call runs under the policy's deadline, so a
/// hung probe cannot push provisioning past the timeout.
///
/// # Errors
///
/// Returns [`ProvisionError::ProvisioningTimeout`] when readiness is not
/// reached before the deadline, or the probe's own error when it fails
/// outright.
pub async fn wait_until_ready<P>(
    host: &str,
    port: u16,
    probe: &P,
    policy: ReadinessPolicy,
) -> Result<(), ProvisionError>
where
    P: ReadinessProbe + ?Sized,
{
    match timeout_at(policy.deadline(), poll_until_ready(host, port, probe, policy.poll_interval))
        .await
    {
        Ok(result) => result,
        Err(_) => {
            let elapsed = policy.started.elapsed();
            warn!(host, port, ?elapsed, "instance did not become ready before timeout");
            Err(policy.expired())
        }
    }
}

async fn poll_until_ready<P>(
    host: &str,
    port: u16,
    probe: &P,
    poll_interval: Duration,
) -> Result<(), ProvisionError>
where
    P: ReadinessProbe + ?Sized,
{
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        if is_listening(host, port).await {
            if probe.ping().await? {
                debug!(host, port, attempts, "instance ready");
                return Ok(());
            }
        } else {
            debug!(host, port, attempts, "port not listening yet");
        }
        sleep(poll_interval).await;
    }
}

async fn is_listening(host: &str, port: u16) -> bool {
    matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use std::{
        net::{SocketAddr, TcpListener},
        sync::atomic::{AtomicU32, Ordering},
    };

    use rstest::{fixture, rstest};

    use super::*;

    struct CountingProbe {
        answer: bool,
        calls: AtomicU32,
    }

    impl CountingProbe {
        const fn new(answer: bool) -> Self {
            Self {
                answer,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadinessProbe for CountingProbe {
        async fn ping(&self) -> Result<bool, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    struct SlowProbe(Duration);

    #[async_trait]
    impl ReadinessProbe for SlowProbe {
        async fn ping(&self) -> Result<bool, ProvisionError> {
            sleep(self.0).await;
            Ok(false)
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl ReadinessProbe for FailingProbe {
        async fn ping(&self) -> Result<bool, ProvisionError> {
            Err(ProvisionError::backend("running readiness probe", "container exited"))
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(300);
    const POLL: Duration = Duration::from_millis(50);

    fn policy() -> ReadinessPolicy { ReadinessPolicy::starting_now(TIMEOUT, POLL) }

    #[fixture]
    fn listening_socket() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").expect("listen socket should bind")
    }

    #[fixture]
    fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral socket should bind");
        let addr = listener
            .local_addr()
            .expect("ephemeral socket should provide a local address");
        drop(listener);
        addr
    }

    #[rstest]
    #[tokio::test]
    async fn ready_when_port_and_probe_succeed(listening_socket: TcpListener) {
        let addr = listening_socket.local_addr().expect("local address");
        let probe = CountingProbe::new(true);
        wait_until_ready("127.0.0.1", addr.port(), &probe, policy())
            .await
            .expect("instance should be ready");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn probe_is_not_trusted_while_port_is_closed(unused_addr: SocketAddr) {
        let probe = CountingProbe::new(true);
        let err = wait_until_ready("127.0.0.1", unused_addr.port(), &probe, policy())
            .await
            .expect_err("closed port must never be ready");
        assert!(matches!(err, ProvisionError::ProvisioningTimeout { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn open_port_is_not_enough(listening_socket: TcpListener) {
        let addr = listening_socket.local_addr().expect("local address");
        let probe = CountingProbe::new(false);
        let err = wait_until_ready("127.0.0.1", addr.port(), &probe, policy())
            .await
            .expect_err("failing probe must never be ready");
        assert!(matches!(
            err,
            ProvisionError::ProvisioningTimeout { timeout } if timeout == TIMEOUT
        ));
        assert!(probe.calls.load(Ordering::SeqCst) > 1);
    }

    #[rstest]
    #[tokio::test]
    async fn probe_errors_abort_immediately(listening_socket: TcpListener) {
        let addr = listening_socket.local_addr().expect("local address");
        let started = Instant::now();
        let err = wait_until_ready("127.0.0.1", addr.port(), &FailingProbe, policy())
            .await
            .expect_err("probe error should propagate");
        assert!(err.is_backend());
        assert!(started.elapsed() < TIMEOUT);
    }

    #[rstest]
    #[tokio::test]
    async fn slow_probe_cannot_outlive_the_deadline(listening_socket: TcpListener) {
        let addr = listening_socket.local_addr().expect("local address");
        let started = Instant::now();
        let err = wait_until_ready(
            "127.0.0.1",
            addr.port(),
            &SlowProbe(Duration::from_secs(3)),
            policy(),
        )
        .await
        .expect_err("hung probe must time out");
        assert!(matches!(err, ProvisionError::ProvisioningTimeout { timeout } if timeout == TIMEOUT));
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "timeout reported after {:?}",
            started.elapsed()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn time_spent_before_polling_counts_against_the_budget(listening_socket: TcpListener) {
        let addr = listening_socket.local_addr().expect("local address");
        let now = Instant::now();
        let earlier = now.checked_sub(Duration::from_millis(250)).unwrap_or(now);
        let policy = ReadinessPolicy::since(earlier, TIMEOUT, POLL);
        let probe = CountingProbe::new(false);
        let err = wait_until_ready("127.0.0.1", addr.port(), &probe, policy)
            .await
            .expect_err("failing probe must never be ready");
        assert!(matches!(err, ProvisionError::ProvisioningTimeout { .. }));
        assert!(
            now.elapsed() < Duration::from_millis(200),
            "budget was not shared: {:?}",
            now.elapsed()
        );
    }
}
