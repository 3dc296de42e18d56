use std::{future::Future, time::Duration};

use alloy::primitives::U256;
use error_stack::{Result, ResultExt};
use exponential_backoff::Backoff;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::LedgerError,
    provider::{DecodedLog, LogFilter, LogProvider, ProviderError, ProviderErrorExt, ProviderFactory},
};

use super::{range::split_ranges, rotator::EndpointRotator};

#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    /// Delay after the first rate-limited attempt. Doubles after every attempt.
    pub initial_delay: Duration,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
}

impl RetryOptions {
    /// Delays between attempts, one less than the number of attempts.
    fn backoff(&self) -> Backoff {
        let retries = self.max_attempts.max(1) - 1;
        let mut backoff = Backoff::new(retries, self.initial_delay, Some(self.max_delay));
        backoff.set_factor(2);
        backoff.set_jitter(0.0);
        backoff
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Runs RPC requests against one network, switching endpoint when rate limited.
///
/// Only [ProviderError::RateLimited] is retried. Any other failure is returned
/// immediately as [LedgerError::Transport], and running out of attempts is
/// [LedgerError::RetryBudgetExhausted].
pub struct ResilientFetcher<F: ProviderFactory> {
    factory: F,
    rotator: EndpointRotator,
    provider: F::Provider,
    endpoint: Url,
    options: RetryOptions,
}

impl<F: ProviderFactory> ResilientFetcher<F> {
    pub fn new(
        factory: F,
        mut rotator: EndpointRotator,
        options: RetryOptions,
    ) -> Result<Self, LedgerError> {
        let endpoint = rotator.next().clone();
        let provider = factory
            .connect(&endpoint)
            .change_context(LedgerError::Configuration)
            .attach_printable_lazy(|| format!("endpoint: {endpoint}"))?;

        Ok(Self {
            factory,
            rotator,
            provider,
            endpoint,
            options,
        })
    }

    /// Run `op` against the current provider, retrying on rate limits.
    pub async fn fetch<T, Op, Fut>(&mut self, op: Op) -> Result<T, LedgerError>
    where
        Op: Fn(F::Provider) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let backoff = self.options.backoff();
        let mut delays = (&backoff).into_iter();
        let mut attempt = 1;

        loop {
            let err = match op(self.provider.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_rate_limited() {
                return Err(err.change_context(LedgerError::Transport))
                    .attach_printable_lazy(|| format!("endpoint: {}", self.endpoint));
            }

            let failed_endpoint = self.endpoint.clone();
            self.rotate()?;

            let Some(delay) = delays.next() else {
                return Err(err.change_context(LedgerError::RetryBudgetExhausted))
                    .attach_printable_lazy(|| format!("attempts: {attempt}"))
                    .attach_printable_lazy(|| format!("last endpoint: {failed_endpoint}"));
            };

            warn!(
                attempt,
                endpoint = %failed_endpoint,
                next_endpoint = %self.endpoint,
                delay = ?delay,
                "rate limited, switching endpoint"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn latest_block_number(&mut self) -> Result<U256, LedgerError> {
        self.fetch(|provider| async move { provider.latest_block_number().await })
            .await
            .attach_printable("failed to fetch latest block number")
    }

    /// Fetch all logs in `[from_block, to_block]`, one request per sub-range.
    pub async fn fetch_logs(
        &mut self,
        filter: &LogFilter,
        from_block: U256,
        to_block: U256,
        max_range: u64,
    ) -> Result<Vec<DecodedLog>, LedgerError> {
        let mut logs = Vec::new();

        for range in split_ranges(from_block, to_block, max_range) {
            let range_logs = self
                .fetch(|provider| {
                    let filter = filter.clone();
                    async move { provider.get_logs(&filter, range).await }
                })
                .await
                .attach_printable_lazy(|| format!("failed to fetch logs in range {range}"))?;

            debug!(%range, count = range_logs.len(), "fetched range");
            logs.extend(range_logs);
        }

        Ok(logs)
    }

    /// Move to the next endpoint and rebuild the provider against it.
    fn rotate(&mut self) -> Result<(), LedgerError> {
        let endpoint = self.rotator.next().clone();
        self.provider = self
            .factory
            .connect(&endpoint)
            .change_context(LedgerError::Configuration)
            .attach_printable_lazy(|| format!("endpoint: {endpoint}"))?;
        self.endpoint = endpoint;
        Ok(())
    }
}
