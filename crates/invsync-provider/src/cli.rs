//! Provider backed by the `az` command line

use crate::parse::{parse_resources, parse_subscription};
use async_trait::async_trait;
use invsync_types::{
    Error, Heartbeat, ProviderErrorKind, RawResource, ResourceProvider, Result, Subscription,
    TimeoutConfig,
};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// JMESPath projection keeping only the fields the normalizer reads
pub const RESOURCE_QUERY: &str = "[].{id: id, name: name, type: type, location: location, \
resourceGroup: resourceGroup, tags: tags, kind: kind, managedBy: managedBy, \
createdTime: createdTime, sku: sku, properties: properties.{provisioningState: provisioningState, \
powerState: powerState, state: state, creationDate: creationDate, \
hardwareProfile: hardwareProfile.{vmSize: vmSize}}}";

const HEARTBEAT_MESSAGES: [&str; 4] = [
    "Querying the provider API...",
    "Fetching resources (this can take about a minute)...",
    "Processing response...",
    "Still working...",
];

/// Heartbeat text for the `beat`-th tick (1-based)
fn heartbeat_message(beat: u32, elapsed: Duration) -> String {
    HEARTBEAT_MESSAGES
        .get(beat.saturating_sub(1) as usize)
        .map_or_else(
            || format!("Still working ({}s)", elapsed.as_secs()),
            |message| (*message).to_string(),
        )
}

/// Runs provider CLI commands with a hard timeout.
///
/// The child process is killed when the timeout fires or the call is dropped.
#[derive(Debug, Clone)]
pub struct AzureCliProvider {
    command: String,
    base_args: Vec<String>,
    timeouts: TimeoutConfig,
}

impl AzureCliProvider {
    /// Provider running `command` (usually `az`)
    pub fn new<S: Into<String>>(command: S, timeouts: TimeoutConfig) -> Self {
        Self {
            command: command.into(),
            base_args: Vec::new(),
            timeouts,
        }
    }

    /// Arguments placed before every subcommand (wrapper scripts, `--subscription`...)
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run one command and return its stdout
    pub async fn run(&self, args: &[&str], heartbeat: Option<Heartbeat<'_>>) -> Result<String> {
        let timeout = self.timeouts.command_timeout;
        let period = self.timeouts.heartbeat_interval.max(Duration::from_millis(10));
        debug!(command = %self.command, ?args, timeout_secs = timeout.as_secs(), "Running provider command");

        let child = Command::new(&self.command)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::provider_with_kind(
                    ProviderErrorKind::Unknown,
                    format!("Failed to launch '{}': {}", self.command, e),
                )
            })?;

        let started = Instant::now();
        let output = child.wait_with_output();
        tokio::pin!(output);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ticker = interval_at(started + period, period);
        let mut beats = 0u32;

        loop {
            tokio::select! {
                result = &mut output => {
                    let output = result.map_err(|e| Error::provider(e.to_string()))?;
                    if output.status.success() {
                        return String::from_utf8(output.stdout).map_err(|e| {
                            Error::validation(format!("Provider output is not UTF-8: {e}"))
                        });
                    }
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let message = if stderr.is_empty() {
                        format!(
                            "Command failed with code {}",
                            output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
                        )
                    } else {
                        stderr
                    };
                    let error = Error::provider(message);
                    warn!(command = %self.command, ?args, error = %error, "Provider command failed");
                    return Err(error);
                }
                () = &mut deadline => {
                    warn!(command = %self.command, ?args, timeout_secs = timeout.as_secs(), "Provider command timed out, killing it");
                    return Err(Error::provider_with_kind(
                        ProviderErrorKind::Timeout,
                        format!("Command timeout after {}s", timeout.as_secs_f64()),
                    ));
                }
                _ = ticker.tick() => {
                    beats += 1;
                    if let Some(heartbeat) = heartbeat {
                        heartbeat(&heartbeat_message(beats, started.elapsed()));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ResourceProvider for AzureCliProvider {
    fn name(&self) -> &str {
        "azure-cli"
    }

    async fn get_subscription(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Subscription> {
        info!("Getting subscription");
        let stdout = self
            .run(&["account", "show", "--output", "json"], heartbeat)
            .await?;
        let subscription = parse_subscription(&stdout)?;
        info!(subscription = %subscription.name, "Subscription retrieved");
        Ok(subscription)
    }

    async fn get_resources(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Vec<RawResource>> {
        info!("Getting resources");
        let stdout = self
            .run(
                &["resource", "list", "--query", RESOURCE_QUERY, "--output", "json"],
                heartbeat,
            )
            .await?;
        let resources = parse_resources(&stdout)?;
        info!(count = resources.len(), "Resources retrieved");
        Ok(resources)
    }
}
