//! Synchronous calls over the pull-based task protocol
//!
//! Agents cannot be called directly. `RpcEmulator` dispatches a task, then
//! re-reads it on a fixed delay until it reaches a terminal status, the
//! attempt budget runs out, or the caller cancels. Timeouts and remote
//! failures are ordinary outcomes, not errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::FleetError;
use crate::models::deployment::StackSummary;
use crate::models::task::{AgentTask, TaskStatus, TaskType};
use crate::rpc::decode::decode_as;
use crate::tasks::fsm::MISSING_ERROR_MESSAGE;
use crate::tasks::queue::TaskSource;

/// Injectable sleep used between polls
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Real sleeping on the tokio timer
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|duration| Box::pin(tokio::time::sleep(duration)))
}

/// Poll budget for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Number of polls before giving up; 0 is treated as 1
    pub max_attempts: u32,

    /// Sleep before each poll
    pub delay: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(1),
        }
    }
}

impl CallOptions {
    /// Upper bound on how long a call can hold its caller
    pub fn budget(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts.max(1))
    }
}

/// Where a call stands
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    Dispatched,
    Polling { attempt: u32 },
    Completed(Option<serde_json::Value>),
    Failed(String),
    TimedOut { attempts: u32 },
    Cancelled,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallState::Dispatched | CallState::Polling { .. })
    }

    /// The poll number that follows this state, if polling continues
    pub fn next_attempt(&self) -> Option<u32> {
        match self {
            CallState::Dispatched => Some(1),
            CallState::Polling { attempt } => Some(attempt + 1),
            _ => None,
        }
    }

    /// State after seeing `task` on poll number `attempt`
    pub fn observe(attempt: u32, task: &AgentTask, max_attempts: u32) -> CallState {
        match task.status {
            TaskStatus::Completed => CallState::Completed(task.result.clone()),
            TaskStatus::Failed => CallState::Failed(
                task.error
                    .clone()
                    .unwrap_or_else(|| MISSING_ERROR_MESSAGE.to_string()),
            ),
            TaskStatus::Pending | TaskStatus::Running if attempt >= max_attempts.max(1) => {
                CallState::TimedOut { attempts: attempt }
            }
            TaskStatus::Pending | TaskStatus::Running => CallState::Polling { attempt },
        }
    }
}

/// How a call ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome<T = serde_json::Value> {
    /// The agent finished the task
    Completed { task_id: String, result: T },
    /// The agent reported failure; `error` is its message verbatim
    Failed { task_id: String, error: String },
    /// No terminal status within the attempt budget
    TimedOut { task_id: String, attempts: u32 },
    /// The caller gave up first
    Cancelled { task_id: String },
}

impl<T> CallOutcome<T> {
    pub fn task_id(&self) -> &str {
        match self {
            CallOutcome::Completed { task_id, .. }
            | CallOutcome::Failed { task_id, .. }
            | CallOutcome::TimedOut { task_id, .. }
            | CallOutcome::Cancelled { task_id } => task_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed { .. })
    }

    /// Transform a completed result
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Completed { task_id, result } => CallOutcome::Completed {
                task_id,
                result: f(result),
            },
            CallOutcome::Failed { task_id, error } => CallOutcome::Failed { task_id, error },
            CallOutcome::TimedOut { task_id, attempts } => {
                CallOutcome::TimedOut { task_id, attempts }
            }
            CallOutcome::Cancelled { task_id } => CallOutcome::Cancelled { task_id },
        }
    }
}

/// Dispatch-and-wait over a task source
pub struct RpcEmulator {
    tasks: Arc<dyn TaskSource>,
    sleep_fn: SleepFn,
    defaults: CallOptions,
}

impl RpcEmulator {
    pub fn new(tasks: Arc<dyn TaskSource>, sleep_fn: SleepFn, defaults: CallOptions) -> Self {
        Self {
            tasks,
            sleep_fn,
            defaults,
        }
    }

    pub fn defaults(&self) -> CallOptions {
        self.defaults
    }

    /// Dispatch a task and wait for its outcome.
    ///
    /// Dispatch errors (unknown or offline agent) return immediately without
    /// polling. Once `cancel` resolves no further reads are made. Dropping
    /// the returned future stops the loop as well.
    pub async fn call_and_wait<C>(
        &self,
        agent_id: &str,
        task_type: TaskType,
        payload: serde_json::Value,
        options: CallOptions,
        cancel: C,
    ) -> Result<CallOutcome, FleetError>
    where
        C: Future<Output = ()> + Send,
    {
        let task = self.tasks.dispatch(agent_id, task_type, payload).await?;
        self.wait_for(task, options, cancel).await
    }

    /// Poll an already dispatched task until it settles
    pub async fn wait_for<C>(
        &self,
        task: AgentTask,
        options: CallOptions,
        cancel: C,
    ) -> Result<CallOutcome, FleetError>
    where
        C: Future<Output = ()> + Send,
    {
        let task_id = task.id;
        let agent_id = task.agent_id;
        debug!(
            task_id = %task_id,
            agent_id = %agent_id,
            task_type = %task.task_type,
            max_attempts = options.max_attempts,
            delay_ms = options.delay.as_millis() as u64,
            budget_ms = options.budget().as_millis() as u64,
            "Waiting for task"
        );

        tokio::pin!(cancel);
        let mut state = CallState::Dispatched;

        while let Some(attempt) = state.next_attempt() {
            let cancelled = tokio::select! {
                biased;
                _ = &mut cancel => true,
                _ = (self.sleep_fn)(options.delay) => false,
            };
            if cancelled {
                state = CallState::Cancelled;
                break;
            }

            let current = self.tasks.fetch(&task_id).await?;
            state = CallState::observe(attempt, &current, options.max_attempts);
        }

        let outcome = match state {
            CallState::Completed(result) => CallOutcome::Completed {
                task_id,
                result: result.unwrap_or(serde_json::Value::Null),
            },
            CallState::Failed(error) => {
                info!(task_id = %task_id, agent_id = %agent_id, "Agent reported failure: {}", error);
                CallOutcome::Failed { task_id, error }
            }
            CallState::TimedOut { attempts } => {
                warn!(
                    task_id = %task_id,
                    agent_id = %agent_id,
                    attempts,
                    "Gave up waiting for task"
                );
                CallOutcome::TimedOut { task_id, attempts }
            }
            CallState::Cancelled => {
                debug!(task_id = %task_id, "Call cancelled by caller");
                CallOutcome::Cancelled { task_id }
            }
            CallState::Dispatched | CallState::Polling { .. } => {
                return Err(FleetError::Internal(format!(
                    "poll loop for task {} ended without a terminal state",
                    task_id
                )));
            }
        };
        Ok(outcome)
    }

    /// `call_and_wait` with the default budget and no cancellation
    pub async fn call(
        &self,
        agent_id: &str,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Result<CallOutcome, FleetError> {
        self.call_and_wait(
            agent_id,
            task_type,
            payload,
            self.defaults,
            std::future::pending::<()>(),
        )
        .await
    }

    /// Ask an agent for its compose stacks. A result without decodable
    /// stacks reads as an empty list.
    pub async fn list_stacks(
        &self,
        agent_id: &str,
    ) -> Result<CallOutcome<Vec<StackSummary>>, FleetError> {
        let outcome = self
            .call(agent_id, TaskType::StackList, serde_json::json!({}))
            .await?;
        Ok(outcome.map(|result| decode_stacks(&result)))
    }
}

/// Decode a `stack_list` result, treating anything unreadable as no stacks
pub fn decode_stacks(result: &serde_json::Value) -> Vec<StackSummary> {
    decode_as::<Vec<StackSummary>>(result, "stacks").unwrap_or_else(|| {
        warn!("stack_list result carried no decodable stacks");
        Vec::new()
    })
}
