use crate::features::host::{HostResult, PowerState, VirtualMachine};
use crate::shared::error::{PluginError, PluginResult};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Samples VM state at a fixed interval until a condition holds.
///
/// Every transition is confirmed twice: once through the coarse running flag
/// and once through the power state bitmask, because the two settle at
/// slightly different times. Both stages together are bounded by `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct PowerStatePoller {
    interval: Duration,
    timeout: Duration,
}

impl PowerStatePoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Sleep one interval, sample, repeat until `done` accepts the sample.
    /// A failed sample or an elapsed timeout ends the wait with
    /// `PowerTransitionError`.
    pub async fn wait_until<T, F, Fut, P>(
        &self,
        condition: &str,
        sample: F,
        done: P,
    ) -> PluginResult<()>
    where
        T: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = HostResult<T>>,
        P: Fn(&T) -> bool,
    {
        self.bounded(condition, self.sample_until(condition, sample, done))
            .await
    }

    pub async fn wait_powered_on(&self, vm: &dyn VirtualMachine) -> PluginResult<()> {
        let stages = async {
            self.sample_until("running", move || vm.is_running(), |running| *running)
                .await?;
            self.sample_until(
                "powered on",
                move || vm.power_state(),
                |state: &PowerState| state.contains(PowerState::POWERED_ON),
            )
            .await
        };
        self.bounded("powered on", stages).await
    }

    pub async fn wait_powered_off(&self, vm: &dyn VirtualMachine) -> PluginResult<()> {
        let stages = async {
            self.sample_until("not running", move || vm.is_running(), |running| !*running)
                .await?;
            self.sample_until(
                "powered off",
                move || vm.power_state(),
                |state: &PowerState| state.contains(PowerState::POWERED_OFF),
            )
            .await
        };
        self.bounded("powered off", stages).await
    }

    async fn sample_until<T, F, Fut, P>(
        &self,
        condition: &str,
        mut sample: F,
        done: P,
    ) -> PluginResult<()>
    where
        T: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = HostResult<T>>,
        P: Fn(&T) -> bool,
    {
        loop {
            tokio::time::sleep(self.interval).await;

            let value = sample().await.map_err(|e| {
                PluginError::PowerTransitionError(format!("waiting for {condition}: {e}"))
            })?;
            debug!(condition, ?value, "Polled VM state");

            if done(&value) {
                return Ok(());
            }
        }
    }

    async fn bounded<W>(&self, condition: &str, wait: W) -> PluginResult<()>
    where
        W: Future<Output = PluginResult<()>>,
    {
        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| {
                PluginError::PowerTransitionError(format!(
                    "timed out after {:?} waiting for {condition}",
                    self.timeout
                ))
            })?
    }
}
