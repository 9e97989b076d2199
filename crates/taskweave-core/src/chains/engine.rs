//! Chain execution engine
//!
//! Drives a chain run wave by wave: promote steps whose parents have all
//! completed, dispatch the ready wave (concurrently when parallel
//! execution is enabled), apply the configured error strategy to
//! failures, merge step outputs into the shared chain data, and write
//! outcomes back through the task store and the execution memory store.
//!
//! Cancellation is cooperative: the token is checked between waves and
//! never interrupts an in-flight provider call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ChainError, Error, Result};
use crate::memory::{ExecutionStatus, MemoryStore, Step};
use crate::storage::EventLog;
use crate::tasks::{Task, TaskPatch, TaskStatus, TaskStore};

use super::actions::{ActionRegistry, StepInput, StepOutput};
use super::{
    ChainDefinition, ChainEvent, ChainEventKind, ChainRunState, ChainStatusReport,
    ExecutionSettings, StepReport, StepState,
};

/// Runtime state of one step
#[derive(Debug, Clone)]
struct StepRuntime {
    step_index: usize,
    task_id: String,
    name: String,
    action: String,
    state: StepState,
    attempts: u32,
    /// Step indices that must complete before this step becomes ready
    deps: Vec<usize>,
}

/// Mutable state of one chain run
struct RunState {
    chain_id: String,
    run_state: ChainRunState,
    settings: ExecutionSettings,
    steps: Vec<StepRuntime>,
    chain_data: serde_json::Map<String, serde_json::Value>,
    events: Vec<ChainEvent>,
    warnings: Vec<String>,
}

struct RunHandle {
    cancel: CancellationToken,
    state: Arc<Mutex<RunState>>,
}

/// The chain execution engine
pub struct ChainEngine {
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    actions: ActionRegistry,
    logs: EventLog,
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl ChainEngine {
    pub fn new(
        tasks: Arc<TaskStore>,
        memory: Arc<MemoryStore>,
        actions: ActionRegistry,
        logs: EventLog,
    ) -> Self {
        Self {
            tasks,
            memory,
            actions,
            logs,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a chain run, returning its chain id
    ///
    /// Creates one task per step, seeds the run state, appends
    /// `ChainStarted` and spawns the driver onto the runtime.
    pub async fn start(&self, definition: ChainDefinition) -> Result<String> {
        if definition.steps.is_empty() {
            return Err(Error::Validation("chain has no steps".into()));
        }
        for (index, step) in definition.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(Error::Validation(format!("step {index} has no name")));
            }
            if let Some(parent) = step.parent_step {
                if parent >= index {
                    return Err(Error::Validation(format!(
                        "step {index} declares parent {parent}, which is not an earlier step"
                    )));
                }
            }
            if self.actions.get(&step.action).is_none() {
                return Err(Error::Validation(format!(
                    "step {index} uses unknown action '{}'",
                    step.action
                )));
            }
        }

        let chain_id = definition
            .chain_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let settings = definition.settings.clone().unwrap_or_default();
        let deps = effective_dependencies(&definition);

        // Assign task ids up front so dependency and parent/child links
        // can reference them before anything is stored.
        let task_ids: Vec<String> = definition
            .steps
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut chain_tasks: Vec<Task> = Vec::with_capacity(definition.steps.len());
        for (index, step) in definition.steps.iter().enumerate() {
            let mut task = Task::new(step.name.clone(), step.description.clone());
            task.id = task_ids[index].clone();
            task.chain_id = Some(chain_id.clone());
            task.step_index = Some(index);
            task.dependencies = deps[index].iter().map(|d| task_ids[*d].clone()).collect();
            task.parent_step_id = step.parent_step.map(|p| task_ids[p].clone());
            task.chain_status = Some(if deps[index].is_empty() {
                StepState::ReadyToExecute
            } else {
                StepState::WaitingForParent
            });
            chain_tasks.push(task);
        }
        for index in 0..chain_tasks.len() {
            if let Some(parent) = definition.steps[index].parent_step {
                let child_id = chain_tasks[index].id.clone();
                chain_tasks[parent].child_step_ids.push(child_id);
            }
        }

        self.tasks.insert_tasks(chain_tasks).await?;

        let steps: Vec<StepRuntime> = definition
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepRuntime {
                step_index: index,
                task_id: task_ids[index].clone(),
                name: step.name.clone(),
                action: step.action.clone(),
                state: if deps[index].is_empty() {
                    StepState::ReadyToExecute
                } else {
                    StepState::WaitingForParent
                },
                attempts: 0,
                deps: deps[index].clone(),
            })
            .collect();

        let mut run = RunState {
            chain_id: chain_id.clone(),
            run_state: ChainRunState::Running,
            settings,
            steps,
            chain_data: definition.initial_data.clone(),
            events: Vec::new(),
            warnings: Vec::new(),
        };
        push_event(&mut run, &self.logs, ChainEvent::new(ChainEventKind::ChainStarted));

        let state = Arc::new(Mutex::new(run));
        let cancel = CancellationToken::new();

        self.runs.lock().await.insert(
            chain_id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                state: state.clone(),
            },
        );

        info!(chain_id = %chain_id, "chain started");
        tokio::spawn(drive(
            self.tasks.clone(),
            self.memory.clone(),
            self.actions.clone(),
            self.logs.clone(),
            state,
            cancel,
        ));

        Ok(chain_id)
    }

    /// Snapshot the status of a run
    pub async fn status(&self, chain_id: &str) -> Result<ChainStatusReport> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(chain_id)
            .ok_or_else(|| Error::ChainNotFound(chain_id.to_string()))?;
        let run = handle.state.lock().await;
        Ok(report(&run))
    }

    /// Events appended so far, in order
    pub async fn events(&self, chain_id: &str) -> Result<Vec<ChainEvent>> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(chain_id)
            .ok_or_else(|| Error::ChainNotFound(chain_id.to_string()))?;
        let run = handle.state.lock().await;
        Ok(run.events.clone())
    }

    /// Request cooperative cancellation of a run
    pub async fn cancel(&self, chain_id: &str) -> Result<()> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(chain_id)
            .ok_or_else(|| Error::ChainNotFound(chain_id.to_string()))?;
        handle.cancel.cancel();
        info!(chain_id, "cancellation requested");
        Ok(())
    }

    /// Re-run one failed step of a finished chain
    pub async fn retry_step(&self, chain_id: &str, step_index: usize) -> Result<ChainStatusReport> {
        let (state, _cancel) = {
            let runs = self.runs.lock().await;
            let handle = runs
                .get(chain_id)
                .ok_or_else(|| Error::ChainNotFound(chain_id.to_string()))?;
            (handle.state.clone(), handle.cancel.clone())
        };

        let (input, action_tag, timeout_secs) = {
            let run = state.lock().await;
            if !run.run_state.is_terminal() {
                return Err(Error::Validation(
                    "chain is still running; cancel it before retrying a step".into(),
                ));
            }
            let step = run
                .steps
                .get(step_index)
                .ok_or_else(|| Error::Validation(format!("no step {step_index}")))?;
            if step.state != StepState::ChainFailed {
                return Err(Error::Validation(format!(
                    "step {step_index} is {}, only failed steps can be retried",
                    step.state
                )));
            }
            let task = self.tasks.get(&step.task_id).await?;
            (
                StepInput {
                    chain_id: chain_id.to_string(),
                    step_index,
                    task,
                    chain_data: run.chain_data.clone(),
                },
                step.action.clone(),
                run.settings.step_timeout_secs,
            )
        };

        {
            let mut run = state.lock().await;
            run.steps[step_index].state = StepState::Executing;
            run.steps[step_index].attempts += 1;
            let event = ChainEvent::step(
                ChainEventKind::StepRetried,
                step_index,
                input.task.id.clone(),
            );
            push_event(&mut run, &self.logs, event);
        }

        let action = self
            .actions
            .get(&action_tag)
            .ok_or_else(|| Error::Validation(format!("unknown action '{action_tag}'")))?;
        let outcome = invoke_with_timeout(action, input.clone(), timeout_secs).await;

        let mut run = state.lock().await;
        match outcome {
            Ok(output) => {
                apply_success(
                    &mut run,
                    &self.logs,
                    &self.tasks,
                    &self.memory,
                    step_index,
                    output,
                )
                .await?;
                if run.steps.iter().all(|s| s.state == StepState::StepCompleted) {
                    run.run_state = ChainRunState::Completed;
                    push_event(&mut run, &self.logs, ChainEvent::new(ChainEventKind::ChainCompleted));
                }
                Ok(report(&run))
            }
            Err(chain_error) => {
                let event = ChainEvent::step(
                    ChainEventKind::StepFailed,
                    step_index,
                    run.steps[step_index].task_id.clone(),
                )
                .with_payload(serde_json::json!({ "error": chain_error.to_string() }));
                push_event(&mut run, &self.logs, event);
                run.steps[step_index].state = StepState::ChainFailed;
                Err(Error::Chain(chain_error))
            }
        }
    }
}

/// Compute the effective dependency indices of every step
///
/// Explicit `parent_step` wins. Otherwise a step follows its predecessor
/// in the same lane: steps sharing a track name form one lane, untracked
/// steps form the default lane. Lanes are mutually independent, so
/// declared-parallel tracks can run concurrently.
fn effective_dependencies(definition: &ChainDefinition) -> Vec<Vec<usize>> {
    let mut last_in_lane: HashMap<Option<&str>, usize> = HashMap::new();
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(definition.steps.len());

    for (index, step) in definition.steps.iter().enumerate() {
        let lane = step.track.as_deref();
        let dep = match step.parent_step {
            Some(parent) => vec![parent],
            None => match last_in_lane.get(&lane) {
                Some(prev) => vec![*prev],
                None => Vec::new(),
            },
        };
        deps.push(dep);
        last_in_lane.insert(lane, index);
    }
    deps
}

/// Outcome of one step dispatch
struct WaveResult {
    step_index: usize,
    attempts: u32,
    result: std::result::Result<StepOutput, ChainError>,
}

async fn drive(
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    actions: ActionRegistry,
    logs: EventLog,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
) {
    let (total_timeout, parallel) = {
        let run = state.lock().await;
        (
            Duration::from_secs(run.settings.total_timeout_secs),
            run.settings.parallel_enabled,
        )
    };
    let deadline = Instant::now() + total_timeout;

    loop {
        if cancel.is_cancelled() {
            finish_cancelled(&state, &logs, &tasks).await;
            return;
        }
        if Instant::now() >= deadline {
            let mut run = state.lock().await;
            run.run_state = ChainRunState::Failed;
            let event = ChainEvent::new(ChainEventKind::ChainFailed).with_payload(
                serde_json::json!({ "error": "total chain timeout exceeded" }),
            );
            push_event(&mut run, &logs, event);
            return;
        }

        // Promote waiting steps and collect the ready wave.
        let wave: Vec<(usize, String, String, u32, u64)> = {
            let mut run = state.lock().await;
            promote_ready(&mut run);

            if run.steps.iter().all(|s| s.state.is_terminal()) {
                finish_completed(&mut run, &logs);
                return;
            }

            let max_attempts = match run.settings.error_strategy {
                super::ErrorStrategy::RetryOnError => run.settings.max_retries + 1,
                _ => 1,
            };
            let timeout_secs = run.settings.step_timeout_secs;
            let ready: Vec<(usize, String, String, u32, u64)> = run
                .steps
                .iter()
                .filter(|s| s.state == StepState::ReadyToExecute)
                .map(|s| {
                    (
                        s.step_index,
                        s.task_id.clone(),
                        s.action.clone(),
                        max_attempts,
                        timeout_secs,
                    )
                })
                .collect();

            if ready.is_empty() {
                // Nothing ready and nothing terminal-complete: remaining
                // steps can never run (their parents failed).
                for step in run.steps.iter_mut() {
                    if !step.state.is_terminal() {
                        step.state = StepState::ChainFailed;
                    }
                }
                finish_completed(&mut run, &logs);
                return;
            }
            ready
        };

        let mut results: Vec<WaveResult> = Vec::with_capacity(wave.len());
        if parallel && wave.len() > 1 {
            let mut set = JoinSet::new();
            for (step_index, task_id, action_tag, max_attempts, timeout_secs) in wave {
                let tasks = tasks.clone();
                let memory = memory.clone();
                let actions = actions.clone();
                let logs = logs.clone();
                let state = state.clone();
                set.spawn(async move {
                    execute_step(
                        tasks,
                        memory,
                        actions,
                        logs,
                        state,
                        step_index,
                        task_id,
                        action_tag,
                        max_attempts,
                        timeout_secs,
                    )
                    .await
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => error!(error = %e, "step task panicked"),
                }
            }
        } else {
            for (step_index, task_id, action_tag, max_attempts, timeout_secs) in wave {
                if cancel.is_cancelled() {
                    break;
                }
                let result = execute_step(
                    tasks.clone(),
                    memory.clone(),
                    actions.clone(),
                    logs.clone(),
                    state.clone(),
                    step_index,
                    task_id,
                    action_tag,
                    max_attempts,
                    timeout_secs,
                )
                .await;
                results.push(result);
            }
        }

        results.sort_by_key(|r| r.step_index);
        let mut chain_failed = false;
        {
            let mut run = state.lock().await;
            for wave_result in results {
                let step_index = wave_result.step_index;
                run.steps[step_index].attempts = wave_result.attempts;
                match wave_result.result {
                    Ok(output) => {
                        if let Err(e) = apply_success(
                            &mut run, &logs, &tasks, &memory, step_index, output,
                        )
                        .await
                        {
                            warn!(step_index, error = %e, "failed to record step outcome");
                            run.steps[step_index].state = StepState::ChainFailed;
                            chain_failed = true;
                        }
                    }
                    Err(chain_error) => {
                        let failed_chain =
                            apply_failure(&mut run, &logs, &tasks, step_index, chain_error).await;
                        chain_failed = chain_failed || failed_chain;
                    }
                }
            }
            if chain_failed {
                run.run_state = ChainRunState::Failed;
                push_event(&mut run, &logs, ChainEvent::new(ChainEventKind::ChainFailed));
            }
        }
        if chain_failed {
            return;
        }
    }
}

/// Promote waiting steps whose dependencies have all completed
fn promote_ready(run: &mut RunState) {
    let completed: Vec<bool> = run
        .steps
        .iter()
        .map(|s| s.state == StepState::StepCompleted)
        .collect();
    let failed: Vec<bool> = run
        .steps
        .iter()
        .map(|s| s.state == StepState::ChainFailed)
        .collect();

    for step in run.steps.iter_mut() {
        if step.state != StepState::WaitingForParent {
            continue;
        }
        if step.deps.iter().all(|d| completed[*d]) {
            step.state = StepState::ReadyToExecute;
        } else if step.deps.iter().any(|d| failed[*d]) {
            // A parent failed permanently; this step can never run.
            step.state = StepState::ChainFailed;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_step(
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    actions: ActionRegistry,
    logs: EventLog,
    state: Arc<Mutex<RunState>>,
    step_index: usize,
    task_id: String,
    action_tag: String,
    max_attempts: u32,
    timeout_secs: u64,
) -> WaveResult {
    let (chain_id, chain_data) = {
        let mut run = state.lock().await;
        run.steps[step_index].state = StepState::Executing;
        let event = ChainEvent::step(ChainEventKind::StepStarted, step_index, task_id.clone());
        push_event(&mut run, &logs, event);
        (run.chain_id.clone(), run.chain_data.clone())
    };

    if let Err(e) = tasks
        .update(
            &task_id,
            TaskPatch {
                status: Some(TaskStatus::InProgress),
                chain_status: Some(StepState::Executing),
                ..Default::default()
            },
        )
        .await
    {
        warn!(step_index, task_id = %task_id, error = %e, "task status writeback failed");
    }

    let execution = memory.begin_execution(&task_id).await;
    if let Err(e) = &execution {
        warn!(step_index, error = %e, "could not open execution context");
    }

    let task = match tasks.get(&task_id).await {
        Ok(task) => task,
        Err(e) => {
            return WaveResult {
                step_index,
                attempts: 1,
                result: Err(ChainError::System(e.to_string())),
            };
        }
    };

    let Some(action) = actions.get(&action_tag) else {
        return WaveResult {
            step_index,
            attempts: 1,
            result: Err(ChainError::System(format!("unknown action '{action_tag}'"))),
        };
    };

    let input = StepInput {
        chain_id: chain_id.clone(),
        step_index,
        task,
        chain_data,
    };

    let started = Instant::now();
    let mut attempts = 0;
    let result = loop {
        attempts += 1;
        match invoke_with_timeout(action.clone(), input.clone(), timeout_secs).await {
            Ok(output) => break Ok(output),
            Err(chain_error) if attempts < max_attempts => {
                warn!(
                    chain_id = %chain_id,
                    step_index,
                    attempt = attempts,
                    error = %chain_error,
                    "step failed, retrying"
                );
                let mut run = state.lock().await;
                let event =
                    ChainEvent::step(ChainEventKind::StepRetried, step_index, task_id.clone())
                        .with_payload(serde_json::json!({
                            "attempt": attempts,
                            "error": chain_error.to_string(),
                        }));
                push_event(&mut run, &logs, event);
            }
            Err(chain_error) => break Err(chain_error),
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    // Record the run in execution memory; storage failures here abort the
    // step rather than disappearing.
    if let Ok(context) = execution {
        let (status, output_text) = match &result {
            Ok(output) => (ExecutionStatus::Completed, Some(output.content.clone())),
            Err(e) => (ExecutionStatus::Failed, Some(e.to_string())),
        };
        let mut step_record = Step::new(action_tag.clone(), format!("chain step {step_index}"))
            .with_status(match status {
                ExecutionStatus::Completed => "completed",
                _ => "failed",
            })
            .with_duration_ms(duration_ms);
        if let Some(output_text) = output_text {
            step_record = step_record.with_output(output_text);
        }
        let recorded = memory
            .record_step(&context.execution_id, step_record)
            .await
            .and(memory.finish_execution(&context.execution_id, status).await.map(|_| ()));
        if let Err(e) = recorded {
            return WaveResult {
                step_index,
                attempts,
                result: Err(ChainError::System(e.to_string())),
            };
        }
    }

    WaveResult {
        step_index,
        attempts,
        result,
    }
}

async fn invoke_with_timeout(
    action: Arc<dyn super::StepAction>,
    input: StepInput,
    timeout_secs: u64,
) -> std::result::Result<StepOutput, ChainError> {
    let step_index = input.step_index;
    match tokio::time::timeout(Duration::from_secs(timeout_secs), action.invoke(input)).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout {
            step_index,
            timeout_secs,
        }),
    }
}

/// Mark a step completed, merging its output into the chain data
async fn apply_success(
    run: &mut RunState,
    logs: &EventLog,
    tasks: &TaskStore,
    _memory: &MemoryStore,
    step_index: usize,
    output: StepOutput,
) -> Result<()> {
    let task_id = run.steps[step_index].task_id.clone();

    if !output.data.is_empty() {
        run.steps[step_index].state = StepState::DataProcessing;
        for (key, value) in &output.data {
            run.chain_data.insert(key.clone(), value.clone());
        }
        let event = ChainEvent::step(ChainEventKind::DataPassed, step_index, task_id.clone())
            .with_payload(serde_json::json!({
                "keys": output.data.keys().cloned().collect::<Vec<_>>(),
            }));
        push_event(run, logs, event);
    }

    run.steps[step_index].state = StepState::StepCompleted;
    let event = ChainEvent::step(ChainEventKind::StepCompleted, step_index, task_id.clone());
    push_event(run, logs, event);

    tasks
        .update(
            &task_id,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                summary: Some(truncate(&output.content, 500)),
                chain_status: Some(StepState::StepCompleted),
                chain_data: Some(run.chain_data.clone()),
                ..Default::default()
            },
        )
        .await?;

    debug!(chain_id = %run.chain_id, step_index, "step completed");
    Ok(())
}

/// Apply the configured error strategy to a failed step
///
/// Returns true when the failure fails the whole chain.
async fn apply_failure(
    run: &mut RunState,
    logs: &EventLog,
    tasks: &TaskStore,
    step_index: usize,
    chain_error: ChainError,
) -> bool {
    let task_id = run.steps[step_index].task_id.clone();
    let event = ChainEvent::step(ChainEventKind::StepFailed, step_index, task_id.clone())
        .with_payload(serde_json::json!({ "error": chain_error.to_string() }));
    push_event(run, logs, event);

    match run.settings.error_strategy {
        super::ErrorStrategy::SkipOnError => {
            // Marked completed with empty output so dependents proceed.
            run.steps[step_index].state = StepState::StepCompleted;
            run.warnings
                .push(format!("step {step_index} skipped: {chain_error}"));
            let event =
                ChainEvent::step(ChainEventKind::StepCompleted, step_index, task_id.clone())
                    .with_payload(serde_json::json!({ "skipped": true }));
            push_event(run, logs, event);
            if let Err(e) = tasks
                .update(
                    &task_id,
                    TaskPatch {
                        status: Some(TaskStatus::Completed),
                        chain_status: Some(StepState::StepCompleted),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!(step_index, task_id = %task_id, error = %e, "task status writeback failed");
                run.warnings
                    .push(format!("step {step_index} task writeback failed: {e}"));
            }
            false
        }
        super::ErrorStrategy::ContinueOnError => {
            run.steps[step_index].state = StepState::ChainFailed;
            run.warnings
                .push(format!("step {step_index} failed: {chain_error}"));
            if let Err(e) = tasks
                .update(
                    &task_id,
                    TaskPatch {
                        chain_status: Some(StepState::ChainFailed),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!(step_index, task_id = %task_id, error = %e, "task status writeback failed");
                run.warnings
                    .push(format!("step {step_index} task writeback failed: {e}"));
            }
            false
        }
        // FailFast, and RetryOnError with its retry budget exhausted.
        super::ErrorStrategy::FailFast | super::ErrorStrategy::RetryOnError => {
            run.steps[step_index].state = StepState::ChainFailed;
            if let Err(e) = tasks
                .update(
                    &task_id,
                    TaskPatch {
                        chain_status: Some(StepState::ChainFailed),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!(step_index, task_id = %task_id, error = %e, "task status writeback failed");
                run.warnings
                    .push(format!("step {step_index} task writeback failed: {e}"));
            }
            error!(chain_id = %run.chain_id, step_index, error = %chain_error, "chain failed");
            true
        }
    }
}

/// Finalize a run whose steps have all reached a terminal state
fn finish_completed(run: &mut RunState, logs: &EventLog) {
    if run.run_state.is_terminal() {
        return;
    }
    let any_failed = run.steps.iter().any(|s| s.state == StepState::ChainFailed);
    if any_failed && run.warnings.is_empty() {
        run.run_state = ChainRunState::Failed;
        push_event(run, logs, ChainEvent::new(ChainEventKind::ChainFailed));
    } else {
        // Warnings from continue/skip strategies surface in the result
        // rather than failing the run.
        run.run_state = ChainRunState::Completed;
        let mut event = ChainEvent::new(ChainEventKind::ChainCompleted);
        if !run.warnings.is_empty() {
            event = event.with_payload(serde_json::json!({ "warnings": run.warnings }));
        }
        push_event(run, logs, event);
    }
    info!(chain_id = %run.chain_id, state = ?run.run_state, "chain finished");
}

async fn finish_cancelled(
    state: &Arc<Mutex<RunState>>,
    logs: &EventLog,
    tasks: &Arc<TaskStore>,
) {
    let mut run = state.lock().await;
    if run.run_state.is_terminal() {
        return;
    }
    let mut cancelled_ids = Vec::new();
    for step in run.steps.iter_mut() {
        if !step.state.is_terminal() {
            step.state = StepState::ChainCancelled;
            cancelled_ids.push(step.task_id.clone());
        }
    }
    run.run_state = ChainRunState::Cancelled;
    push_event(&mut run, logs, ChainEvent::new(ChainEventKind::ChainCancelled));
    info!(chain_id = %run.chain_id, "chain cancelled");

    for task_id in cancelled_ids {
        if let Err(e) = tasks
            .update(
                &task_id,
                TaskPatch {
                    chain_status: Some(StepState::ChainCancelled),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(chain_id = %run.chain_id, task_id = %task_id, error = %e, "task status writeback failed");
            run.warnings
                .push(format!("cancelled task {task_id} writeback failed: {e}"));
        }
    }
}

fn push_event(run: &mut RunState, logs: &EventLog, event: ChainEvent) {
    if let Err(e) = logs.append(&run.chain_id, &event) {
        // The in-memory log stays authoritative for the live run; the
        // JSONL copy is audit output.
        warn!(chain_id = %run.chain_id, error = %e, "event log append failed");
    }
    run.events.push(event);
}

fn report(run: &RunState) -> ChainStatusReport {
    ChainStatusReport {
        chain_id: run.chain_id.clone(),
        state: run.run_state,
        steps: run
            .steps
            .iter()
            .map(|s| StepReport {
                step_index: s.step_index,
                task_id: s.task_id.clone(),
                name: s.name.clone(),
                state: s.state,
                attempts: s.attempts,
            })
            .collect(),
        chain_data: run.chain_data.clone(),
        warnings: run.warnings.clone(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max).collect();
        format!("{truncated}...")
    }
}
