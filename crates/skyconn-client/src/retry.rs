//! Retry policies composed around a call.
//!
//! A [`RetryChain`] is an ordered list of [`RetryPolicy`] values, outermost
//! first. Each policy watches for its trigger statuses coming out of
//! everything inside it, runs its recovery actions, and retries the inner
//! call exactly once. Anything else passes through untouched.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, instrument};

use skyconn_core::error::Error;
use skyconn_core::Result;

/// What to do before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recovery {
    /// Rerun the registration handshake.
    RefreshRegistration,
    /// Recreate the event subscription.
    Resubscribe,
}

/// Something that can carry out [`Recovery`] actions.
#[async_trait]
pub trait Recoverer: Send + Sync {
    async fn recover(&self, action: Recovery) -> Result<()>;
}

/// Retry once, after the given recovery actions, when a call fails with one
/// of the trigger statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    triggers: Vec<u16>,
    recovery: Vec<Recovery>,
}

impl RetryPolicy {
    /// A policy triggered by the given HTTP statuses, with no recovery yet.
    pub fn on(triggers: &[u16]) -> Self {
        Self {
            triggers: triggers.to_vec(),
            recovery: Vec::new(),
        }
    }

    /// Add a recovery action, run in order before the retry.
    pub fn then(mut self, action: Recovery) -> Self {
        self.recovery.push(action);
        self
    }

    pub fn is_triggered_by(&self, err: &Error) -> bool {
        err.status().is_some_and(|s| self.triggers.contains(&s))
    }

    pub fn recovery(&self) -> &[Recovery] {
        &self.recovery
    }
}

/// Ordered policies, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryChain {
    policies: Vec<RetryPolicy>,
}

impl RetryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy inside the ones already present.
    pub fn with(mut self, policy: RetryPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// The chain used for long polling: a rejected registration is renewed,
    /// a lapsed subscription is recreated.
    pub fn for_events() -> Self {
        Self::new()
            .with(RetryPolicy::on(&[401]).then(Recovery::RefreshRegistration))
            .with(RetryPolicy::on(&[404]).then(Recovery::Resubscribe))
    }

    pub fn policies(&self) -> &[RetryPolicy] {
        &self.policies
    }

    /// Run `call` wrapped in every policy.
    #[instrument(skip_all, fields(policies = self.policies.len()))]
    pub async fn run<T, F, Fut>(&self, recoverer: &dyn Recoverer, call: F) -> Result<T>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.run_from(0, recoverer, &call).await
    }

    fn run_from<'a, T, F, Fut>(
        &'a self,
        depth: usize,
        recoverer: &'a dyn Recoverer,
        call: &'a F,
    ) -> BoxFuture<'a, Result<T>>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<T>> + Send + 'a,
        T: Send + 'a,
    {
        Box::pin(async move {
            let Some(policy) = self.policies.get(depth) else {
                return call().await;
            };

            match self.run_from(depth + 1, recoverer, call).await {
                Err(err) if policy.is_triggered_by(&err) => {
                    debug!(depth, error = %err, recovery = ?policy.recovery, "Recovering before retry");
                    for action in &policy.recovery {
                        recoverer.recover(*action).await?;
                    }
                    self.run_from(depth + 1, recoverer, call).await
                }
                result => result,
            }
        })
    }
}
