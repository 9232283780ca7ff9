//! Deferred results of mutating calls
//!
//! A mutation the remote side queues instead of completing returns an
//! [`Operation`]. The operation holds the subject entity and, optionally, a
//! [`Completion`] predicate. [`Operation::wait`] polls the predicate on a
//! fixed interval until it reports done or the deadline passes.
//!
//! ```rust,no_run
//! use remodel::{Client, operation::completion_fn};
//! use serde_json::json;
//!
//! # async fn example(client: Client) -> remodel::Result<()> {
//! let data = json!({"name": "web-1"});
//! let server = client
//!     .servers()
//!     .create_until(
//!         data.as_object().unwrap(),
//!         completion_fn(|server| {
//!             Box::pin(async move {
//!                 let state = server.get("state").await?;
//!                 Ok(state.as_str() == Some("running"))
//!             })
//!         }),
//!     )
//!     .await?
//!     .wait()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::WaitConfig;
use crate::error::{Error, Result};
use crate::model::Entity;
use crate::observability::PollContext;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::time::Instant;

/// Decides whether a queued server action has finished.
///
/// Returning an SDK error rejects the operation with that error. Foreign
/// errors ([`Error::Other`]) and panics reject it with
/// [`Error::CallbackFailure`].
#[async_trait]
pub trait Completion: Send {
    /// Check the subject once.
    async fn is_done(&mut self, subject: &mut Entity) -> Result<bool>;
}

/// Completion backed by a closure, see [`completion_fn`].
pub struct FnCompletion<F> {
    f: F,
}

/// Wrap a closure returning a boxed future as a [`Completion`].
pub fn completion_fn<F>(f: F) -> FnCompletion<F>
where
    F: for<'a> FnMut(&'a mut Entity) -> BoxFuture<'a, Result<bool>> + Send,
{
    FnCompletion { f }
}

#[async_trait]
impl<F> Completion for FnCompletion<F>
where
    F: for<'a> FnMut(&'a mut Entity) -> BoxFuture<'a, Result<bool>> + Send,
{
    async fn is_done(&mut self, subject: &mut Entity) -> Result<bool> {
        (self.f)(subject).await
    }
}

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Waiting on a completion predicate
    Pending,
    /// Finished successfully
    Resolved,
    /// Finished with an error
    Rejected,
}

enum State {
    Pending(Box<dyn Completion>),
    Resolved,
    Rejected(Error),
}

/// Deferred result of a mutating call.
///
/// `Pending` moves to `Resolved` or `Rejected` exactly once. Waiting
/// consumes the operation.
pub struct Operation {
    subject: Entity,
    state: State,
    wait: WaitConfig,
}

impl Operation {
    /// An operation that already completed.
    pub fn resolved(subject: Entity) -> Self {
        Self {
            subject,
            state: State::Resolved,
            wait: WaitConfig::default(),
        }
    }

    /// An operation gated by `completion`.
    pub fn pending(subject: Entity, completion: impl Completion + 'static, wait: WaitConfig) -> Self {
        Self {
            subject,
            state: State::Pending(Box::new(completion)),
            wait,
        }
    }

    /// An operation that resolves immediately unless a completion is given.
    pub fn new(subject: Entity, completion: Option<Box<dyn Completion>>, wait: WaitConfig) -> Self {
        let state = match completion {
            Some(completion) => State::Pending(completion),
            None => State::Resolved,
        };
        Self {
            subject,
            state,
            wait,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> OperationStatus {
        match self.state {
            State::Pending(_) => OperationStatus::Pending,
            State::Resolved => OperationStatus::Resolved,
            State::Rejected(_) => OperationStatus::Rejected,
        }
    }

    /// The entity the operation is about.
    pub fn subject(&self) -> &Entity {
        &self.subject
    }

    /// Polling configuration used by [`wait`](Self::wait).
    pub fn wait_config(&self) -> &WaitConfig {
        &self.wait
    }

    /// Mark a pending operation as done. Returns whether the state changed.
    pub fn resolve(&mut self) -> bool {
        if matches!(self.state, State::Pending(_)) {
            self.state = State::Resolved;
            true
        } else {
            false
        }
    }

    /// Mark a pending operation as failed. Returns whether the state changed.
    pub fn reject(&mut self, error: Error) -> bool {
        if matches!(self.state, State::Pending(_)) {
            self.state = State::Rejected(error);
            true
        } else {
            false
        }
    }

    /// Wait for the operation to settle and return its subject.
    ///
    /// The predicate runs strictly in sequence. Every `false` is followed by
    /// one tick callback and one deadline check before sleeping for the poll
    /// interval. A zero timeout polls forever.
    pub async fn wait(self) -> Result<Entity> {
        let Operation {
            mut subject,
            state,
            wait,
        } = self;

        match state {
            State::Resolved => Ok(subject),
            State::Rejected(error) => Err(error),
            State::Pending(completion) => {
                poll(&mut subject, completion, &wait).await?;
                Ok(subject)
            }
        }
    }
}

async fn poll(subject: &mut Entity, mut completion: Box<dyn Completion>, wait: &WaitConfig) -> Result<()> {
    let mut ctx = PollContext::new(subject.kind(), subject.id());
    ctx.log_started(wait.interval, wait.timeout);

    let deadline = (!wait.timeout.is_zero()).then(|| Instant::now() + wait.timeout);

    loop {
        let outcome = AssertUnwindSafe(completion.is_done(subject))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(true)) => {
                ctx.log_resolved();
                return Ok(());
            }
            Ok(Ok(false)) => {}
            Ok(Err(error)) => {
                let error = if error.is_foreign() {
                    Error::CallbackFailure(error.to_string())
                } else {
                    error
                };
                ctx.log_rejected(&error.to_string());
                return Err(error);
            }
            Err(panic) => {
                let error = Error::CallbackFailure(panic_message(panic.as_ref()));
                ctx.log_rejected(&error.to_string());
                return Err(error);
            }
        }

        ctx.log_pending();
        if let Some(tick) = &wait.tick {
            let iteration = ctx.iterations;
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| tick(iteration))) {
                let error = Error::CallbackFailure(panic_message(panic.as_ref()));
                ctx.log_rejected(&error.to_string());
                return Err(error);
            }
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            let error = Error::WaitTimeoutExceeded {
                timeout: wait.timeout,
            };
            ctx.log_rejected(&error.to_string());
            return Err(error);
        }

        tokio::time::sleep(wait.interval).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Operation");
        debug
            .field("subject", &self.subject)
            .field("status", &self.status());
        if let State::Rejected(error) = &self.state {
            debug.field("error", error);
        }
        debug.field("wait", &self.wait).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntitySchema, FieldDef};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    static JOB_FIELDS: &[FieldDef] = &[
        FieldDef::readonly("id"),
        FieldDef::readonly("state"),
    ];

    static JOB: EntitySchema = EntitySchema::new("Job", JOB_FIELDS);

    fn job() -> Entity {
        Entity::from_wire(&JOB, &json!({"id": 1, "state": "queued"})).unwrap()
    }

    fn wait_config(interval_ms: u64, timeout_ms: u64) -> WaitConfig {
        WaitConfig::default()
            .interval(Duration::from_millis(interval_ms))
            .timeout(Duration::from_millis(timeout_ms))
    }

    fn never_done() -> impl Completion {
        completion_fn(|_| Box::pin(async { Ok(false) }))
    }

    #[tokio::test]
    async fn test_no_predicate_resolves_immediately() {
        let op = Operation::new(job(), None, WaitConfig::default());
        assert_eq!(op.status(), OperationStatus::Resolved);
        assert_eq!(op.wait().await.unwrap().id(), Some(1));
    }

    #[tokio::test]
    async fn test_resolve_and_reject_are_terminal() {
        let mut op = Operation::pending(job(), never_done(), WaitConfig::default());
        assert_eq!(op.status(), OperationStatus::Pending);
        assert!(op.reject(Error::MissingIdentity("Job")));
        assert!(!op.resolve());
        assert_eq!(op.status(), OperationStatus::Rejected);
        assert_matches!(op.wait().await, Err(Error::MissingIdentity("Job")));

        let mut op = Operation::pending(job(), never_done(), WaitConfig::default());
        assert!(op.resolve());
        assert!(!op.reject(Error::MissingIdentity("Job")));
        assert_ok!(op.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_sees_subject_updates() {
        let completion = completion_fn(|job: &mut Entity| {
            Box::pin(async move {
                let done = job.peek("state").and_then(|s| s.as_str().map(String::from))
                    == Some("done".to_string());
                job.sync(json!({"state": "done"}).as_object().unwrap(), false)?;
                Ok(done)
            })
        });

        let op = Operation::pending(job(), completion, wait_config(100, 0));
        let job = op.wait().await.unwrap();
        assert_eq!(job.peek("state").unwrap().as_str(), Some("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_bounded_by_one_interval() {
        let ticks = Arc::new(AtomicU32::new(0));
        let seen = ticks.clone();
        let wait = wait_config(1_000, 3_500).on_tick(move |iteration| {
            seen.store(iteration, Ordering::SeqCst);
        });

        let started = Instant::now();
        let result = Operation::pending(job(), never_done(), wait).wait().await;
        let elapsed = started.elapsed();

        assert_matches!(
            result,
            Err(Error::WaitTimeoutExceeded { timeout }) if timeout == Duration::from_millis(3_500)
        );
        assert!(elapsed >= Duration::from_millis(3_500), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(4_500), "{:?}", elapsed);
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_runs_once_per_false_evaluation() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let completion = completion_fn(move |_| {
            let counter = counter.clone();
            Box::pin(async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 3) })
        });

        let ticks = Arc::new(AtomicU32::new(0));
        let seen = ticks.clone();
        let wait = wait_config(10, 0).on_tick(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        Operation::pending(job(), completion, wait).wait().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sdk_errors_propagate_unchanged() {
        let completion =
            completion_fn(|_| Box::pin(async { Err(Error::Forbidden("no".to_string())) }));
        let result = Operation::pending(job(), completion, WaitConfig::default())
            .wait()
            .await;
        assert_matches!(result, Err(Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_foreign_errors_become_callback_failures() {
        let completion =
            completion_fn(|_| Box::pin(async { Err(anyhow::anyhow!("flag raised").into()) }));
        let result = Operation::pending(job(), completion, WaitConfig::default())
            .wait()
            .await;
        assert_matches!(result, Err(Error::CallbackFailure(msg)) if msg == "flag raised");
    }

    #[tokio::test]
    async fn test_panicking_predicate_becomes_callback_failure() {
        let completion = completion_fn(|job| {
            Box::pin(async move {
                assert!(job.id().is_none(), "predicate exploded");
                Ok(false)
            })
        });
        let result = Operation::pending(job(), completion, WaitConfig::default())
            .wait()
            .await;
        assert_matches!(result, Err(Error::CallbackFailure(msg)) if msg == "predicate exploded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_becomes_callback_failure() {
        let wait = wait_config(10, 0).on_tick(|_| panic!("tick exploded"));
        let result = Operation::pending(job(), never_done(), wait).wait().await;
        assert_matches!(result, Err(Error::CallbackFailure(msg)) if msg == "tick exploded");
    }
}
