//! Rollout tracking: wait for a Deployment to become ready, follow its logs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use crate::cluster::{Cluster, LogLine, RolloutStatus};
use crate::error::{KubeError, Result};

/// Default interval between rollout polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default `--timeout`, in minutes
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 15;

/// Where log following starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogsSince {
    /// Only new records
    #[default]
    Now,
    /// Everything the kubelet still has
    All,
    /// This far in the past
    Ago(Duration),
}

impl LogsSince {
    /// Look-back window to request; `None` means no limit
    pub fn window(&self) -> Option<Duration> {
        match self {
            Self::Now => Some(Duration::from_secs(1)),
            Self::All => None,
            Self::Ago(duration) => Some(*duration),
        }
    }
}

impl FromStr for LogsSince {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "now" => Ok(Self::Now),
            "all" => Ok(Self::All),
            other => humantime::parse_duration(other)
                .map(Self::Ago)
                .map_err(|e| KubeError::InvalidConfig(format!("invalid logs-since '{other}': {e}"))),
        }
    }
}

impl fmt::Display for LogsSince {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str("now"),
            Self::All => f.write_str("all"),
            Self::Ago(duration) => write!(f, "{}", humantime::format_duration(*duration)),
        }
    }
}

/// Minutes to a deadline; 0 waits forever
pub fn timeout_from_minutes(minutes: u64) -> Option<Duration> {
    (minutes > 0).then(|| Duration::from_secs(minutes * 60))
}

/// Watches one namespace through a [`Cluster`]
pub struct RolloutTracker<'a> {
    cluster: &'a dyn Cluster,
    namespace: String,
    timeout: Option<Duration>,
    poll_interval: Duration,
}

impl<'a> RolloutTracker<'a> {
    pub fn new(cluster: &'a dyn Cluster, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            timeout: timeout_from_minutes(DEFAULT_TIMEOUT_MINUTES),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll the Deployment until every replica is ready
    ///
    /// A missing Deployment counts as not ready yet.
    pub async fn wait_ready(&self, deployment: &str) -> Result<RolloutStatus> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let status = self
                .cluster
                .deployment_status(&self.namespace, deployment)
                .await?;

            match &status {
                Some(status) if status.is_ready() => {
                    tracing::info!(deployment, replicas = status.desired, "rollout ready");
                    return Ok(status.clone());
                }
                Some(status) => {
                    tracing::debug!(deployment, progress = %status.progress(), "waiting for rollout");
                }
                None => tracing::debug!(deployment, "deployment not found yet"),
            }

            if let Some(deadline) = deadline
                && Instant::now() + self.poll_interval > deadline
            {
                return Err(self.timeout_error(deployment));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Stream logs of pods matching `selector` into `on_line` until the
    /// streams end or the timeout passes
    pub async fn follow<F>(&self, selector: &str, since: LogsSince, mut on_line: F) -> Result<()>
    where
        F: FnMut(&LogLine),
    {
        let mut lines = self
            .cluster
            .follow_logs(&self.namespace, selector, since.window())
            .await?;

        let drain = async {
            while let Some(line) = lines.next().await {
                on_line(&line?);
            }
            Ok::<(), KubeError>(())
        };

        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, drain).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(selector, "log follow deadline reached");
                    Ok(())
                }
            },
            None => drain.await,
        }
    }

    fn timeout_error(&self, deployment: &str) -> KubeError {
        let after = self
            .timeout
            .map(|t| humantime::format_duration(t).to_string())
            .unwrap_or_default();
        KubeError::Timeout {
            resource: format!("deployment/{deployment}"),
            after,
        }
    }
}
