//! Agent-Validator (R4a) fast loop: scores one sub-task attempt at a time, classifies
//! failures, emits correction signals, retries under a bound, and produces exactly one
//! terminal [`SubTaskOutcome`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::RegexSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::Bus;
use crate::error::ShellResult;
use crate::llm::{strip_fences, Chat};
use crate::types::{
    CorrectionSignal, CriterionResult, ExecutionResult, ExecutionStatus, FailureClass,
    GapTrajectoryPoint, Message, MessagePayload, Role, SubTask, SubTaskOutcome, SubTaskStatus,
    Verdict, VerdictWire,
};

/// Scores one `(SubTask, ExecutionResult)` attempt. Implemented by [`ChatScorer`] for
/// production use; tests substitute a stub to drive the fast loop deterministically
/// without a live LLM call.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, subtask: &SubTask, result: &ExecutionResult) -> Verdict;
}

/// The production [`Scorer`]: applies the deterministic short-circuits, then an LLM call,
/// then deterministic environmental promotion.
pub struct ChatScorer<'a> {
    chat: &'a Chat,
}

impl<'a> ChatScorer<'a> {
    pub fn new(chat: &'a Chat) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl<'a> Scorer for ChatScorer<'a> {
    async fn score(&self, subtask: &SubTask, result: &ExecutionResult) -> Verdict {
        if result.status == ExecutionStatus::Failed {
            return Verdict::Failed {
                score: 0.0,
                criteria_results: vec![],
                failure_reason: result.output.clone(),
            };
        }
        if is_infrastructure_error(&result.output) {
            return Verdict::Failed {
                score: 0.0,
                criteria_results: vec![],
                failure_reason: format!("infrastructure error: {}", result.output),
            };
        }

        let today = chrono::Utc::now().format("%Y-%m-%d");
        let user = format!(
            "Today's date: {today}\n\nSubTask:\n{}\n\nExecutionResult:\n{}",
            indent_json(subtask),
            indent_json(result),
        );

        let verdict = match self.chat.chat(SCORING_SYSTEM_PROMPT, &user).await {
            Ok(res) => {
                let cleaned = strip_fences(&res.content);
                match serde_json::from_str::<VerdictWire>(&cleaned) {
                    Ok(wire) => Verdict::from(wire),
                    Err(e) => Verdict::Failed {
                        score: 0.0,
                        criteria_results: vec![],
                        failure_reason: format!("scoring error: {e}"),
                    },
                }
            }
            Err(e) => Verdict::Failed {
                score: 0.0,
                criteria_results: vec![],
                failure_reason: format!("scoring error: {e}"),
            },
        };

        let verdict = promote_environmental(verdict);
        promote_environmental_from_tool_calls(verdict, &result.tool_calls)
    }
}

pub const MAX_RETRIES: u32 = 2;

/// Deterministic ground truth for environmental failures. Applied over evidence and
/// tool-call output; a match only ever *promotes* a criterion to environmental, never
/// demotes one the model already called environmental.
static ENVIRONMENTAL_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)permission denied",
        r"(?i)no such file",
        r"(?i)not found",
        r"(?i)not exist",
        r"(?i)connection refused",
        r"(?i)timed?\s*out",
        r"(?i)network error",
        r"(?i)command not found",
        r"(?i)executable file not found",
        r"(?i)\[LAW1\]",
    ])
    .expect("static environmental pattern set compiles")
});

/// Applies the deterministic environmental-promotion rule to one verdict's criteria.
pub fn promote_environmental(mut v: Verdict) -> Verdict {
    let promote = |c: &mut CriterionResult| {
        if c.met || c.failure_class == Some(FailureClass::Environmental) {
            return;
        }
        let evidence = c.evidence.clone().unwrap_or_default();
        if ENVIRONMENTAL_PATTERNS.is_match(&evidence) {
            c.failure_class = Some(FailureClass::Environmental);
        }
    };

    match &mut v {
        Verdict::Matched { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
        Verdict::Retry { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
        Verdict::Failed { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
    }
    v
}

/// Also checks raw tool-call snippets (not just structured evidence) for the same
/// deterministic error strings, promoting every unmet criterion if any tool call matches.
pub fn promote_environmental_from_tool_calls(mut v: Verdict, tool_calls: &[String]) -> Verdict {
    let any_match = tool_calls.iter().any(|t| ENVIRONMENTAL_PATTERNS.is_match(t));
    if !any_match {
        return v;
    }
    let promote = |c: &mut CriterionResult| {
        if !c.met && c.failure_class != Some(FailureClass::Environmental) {
            c.failure_class = Some(FailureClass::Environmental);
        }
    };
    match &mut v {
        Verdict::Matched { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
        Verdict::Retry { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
        Verdict::Failed { criteria_results, .. } => criteria_results.iter_mut().for_each(promote),
    }
    v
}

pub struct AgentValidator<'a> {
    scorer: &'a dyn Scorer,
    bus: &'a Bus,
}

impl<'a> AgentValidator<'a> {
    pub fn new(scorer: &'a dyn Scorer, bus: &'a Bus) -> Self {
        Self { scorer, bus }
    }

    /// Scores one `(SubTask, ExecutionResult)` pair via the configured [`Scorer`].
    pub async fn score(&self, subtask: &SubTask, result: &ExecutionResult) -> Verdict {
        self.scorer.score(subtask, result).await
    }

    /// Drives the fast loop to completion for one sub-task. Publishes the terminal
    /// outcome and returns it.
    pub async fn run(
        &self,
        subtask: SubTask,
        mut result_rx: mpsc::Receiver<ExecutionResult>,
        correction_tx: mpsc::Sender<CorrectionSignal>,
        cancel: CancellationToken,
    ) -> ShellResult<SubTaskOutcome> {
        let mut attempt: u32 = 0;
        let mut trajectory: Vec<GapTrajectoryPoint> = Vec::new();
        let mut last_tool_calls: Vec<String> = Vec::new();

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(self.terminal(&subtask, SubTaskStatus::Failed, String::new(),
                        Some("context cancelled".to_string()), trajectory, vec![], last_tool_calls).await);
                }
                r = result_rx.recv() => match r {
                    Some(r) => r,
                    None => {
                        return Ok(self.terminal(&subtask, SubTaskStatus::Failed, String::new(),
                            Some("result channel closed".to_string()), trajectory, vec![], last_tool_calls).await);
                    }
                },
            };

            last_tool_calls = result.tool_calls.clone();
            attempt += 1;

            let verdict = self.score(&subtask, &result).await;
            let aggregate = verdict
                .aggregate_failure_class()
                .map(|c| match c {
                    FailureClass::Logical => "logical".to_string(),
                    FailureClass::Environmental => "environmental".to_string(),
                    FailureClass::Mixed => "mixed".to_string(),
                })
                .unwrap_or_default();
            trajectory.push(GapTrajectoryPoint {
                attempt,
                score: verdict.score(),
                unmet_criteria: verdict.unmet_criteria(),
                failure_class: aggregate,
            });

            info!(subtask_id = %subtask.subtask_id, attempt, verdict = ?verdict_kind(&verdict), score = verdict.score(), "agent_validator.attempt");

            match verdict {
                Verdict::Matched { criteria_results, .. } => {
                    return Ok(self
                        .terminal(
                            &subtask,
                            SubTaskStatus::Matched,
                            result.output,
                            None,
                            trajectory,
                            criteria_results,
                            last_tool_calls,
                        )
                        .await);
                }
                Verdict::Retry { criteria_results, what_was_wrong, what_to_do, .. } => {
                    if attempt >= MAX_RETRIES {
                        let reason = format!("max retries ({MAX_RETRIES}) reached; last issue: {what_was_wrong}");
                        return Ok(self
                            .terminal(
                                &subtask,
                                SubTaskStatus::Failed,
                                result.output,
                                Some(reason),
                                trajectory,
                                criteria_results,
                                last_tool_calls,
                            )
                            .await);
                    }

                    let failed_criterion = criteria_results
                        .iter()
                        .find(|c| !c.met)
                        .map(|c| c.criterion.clone())
                        .unwrap_or_default();
                    let failure_class = criteria_results.iter().find(|c| !c.met).and_then(|c| c.failure_class);

                    let signal = CorrectionSignal {
                        subtask_id: subtask.subtask_id.clone(),
                        attempt_number: attempt,
                        failed_criterion,
                        failure_class,
                        what_was_wrong,
                        what_to_do,
                    };

                    // Observational: the bus publish is not authoritative for correction
                    // delivery, so a publish failure (e.g. no subscriber wired) must not
                    // abort the loop before the terminal outcome is produced.
                    let _ = self
                        .bus
                        .publish(Message::new(
                            Role::AgentVal,
                            Some(Role::Executor),
                            MessagePayload::CorrectionSignal(signal.clone()),
                        ))
                        .await;

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Ok(self.terminal(&subtask, SubTaskStatus::Failed, String::new(),
                                Some("context cancelled during correction".to_string()), trajectory, vec![], last_tool_calls).await);
                        }
                        send_res = correction_tx.send(signal) => {
                            send_res.map_err(|_| crate::error::ShellError::Cancelled(
                                "context cancelled during correction".to_string(),
                            ))?;
                        }
                    }
                }
                Verdict::Failed { criteria_results, failure_reason, .. } => {
                    return Ok(self
                        .terminal(
                            &subtask,
                            SubTaskStatus::Failed,
                            result.output,
                            Some(failure_reason),
                            trajectory,
                            criteria_results,
                            last_tool_calls,
                        )
                        .await);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn terminal(
        &self,
        subtask: &SubTask,
        status: SubTaskStatus,
        output: String,
        failure_reason: Option<String>,
        gap_trajectory: Vec<GapTrajectoryPoint>,
        criteria_verdicts: Vec<CriterionResult>,
        tool_calls: Vec<String>,
    ) -> SubTaskOutcome {
        let outcome = SubTaskOutcome {
            subtask_id: subtask.subtask_id.clone(),
            parent_task_id: subtask.parent_task_id.clone(),
            intent: subtask.intent.clone(),
            success_criteria: subtask.success_criteria.clone(),
            status,
            output,
            failure_reason,
            gap_trajectory,
            criteria_verdicts,
            tool_calls,
        };

        info!(subtask_id = %subtask.subtask_id, status = ?outcome.status, attempts = outcome.gap_trajectory.len(), "agent_validator.terminal");

        let _ = self
            .bus
            .publish(Message::new(Role::AgentVal, Some(Role::MetaVal), MessagePayload::SubTaskOutcome(outcome.clone())))
            .await;

        outcome
    }
}

fn verdict_kind(v: &Verdict) -> &'static str {
    match v {
        Verdict::Matched { .. } => "matched",
        Verdict::Retry { .. } => "retry",
        Verdict::Failed { .. } => "failed",
    }
}

fn is_infrastructure_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("context canceled")
        || lower.contains("context cancelled")
        || lower.contains("context deadline exceeded")
}

fn indent_json<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_string_pretty(v).unwrap_or_default()
}

const SCORING_SYSTEM_PROMPT: &str = "You score whether a sub-task's execution result satisfies its \
success criteria. Reply with JSON: {\"verdict\":\"matched\"|\"retry\"|\"failed\",\"score\":0.0, \
\"criteria_results\":[{\"criterion\":\"...\",\"met\":true,\"evidence\":\"...\",\"failure_class\":\"logical\"|\"environmental\"|null}], \
\"what_was_wrong\":\"...\",\"what_to_do\":\"...\",\"failure_reason\":\"...\"}. \
A criterion is matched only when concretely demonstrated by tool output, never by vague prose. \
An empty result is acceptable when a real search ran and genuinely found nothing. \
Any tool output beginning with \"[LAW1]\" is an immediate failed verdict with that line quoted in failure_reason.";
