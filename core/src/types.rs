//! Wire and in-process data model shared by every role: the message envelope, the payload
//! types it carries, and the Agent-Validator's internal verdict representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed role identities. Roles never address each other directly; this is carried on the
/// envelope for observability only, never used to filter bus delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Perceiver,
    Planner,
    Executor,
    AgentVal,
    MetaVal,
    Memory,
    Ggs,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Role::Perceiver => "RolePerceiver",
            Role::Planner => "RolePlanner",
            Role::Executor => "RoleExecutor",
            Role::AgentVal => "RoleAgentVal",
            Role::MetaVal => "RoleMetaVal",
            Role::Memory => "RoleMemory",
            Role::Ggs => "RoleGGS",
        }
    }
}

/// The closed set of payload shapes that travel over the bus. `Bus::subscribe` indexes
/// subscribers by this discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MessagePayload {
    TaskSpec(TaskSpec),
    SubTask(SubTask),
    DispatchManifest(DispatchManifest),
    ExecutionResult(ExecutionResult),
    CorrectionSignal(CorrectionSignal),
    SubTaskOutcome(SubTaskOutcome),
    ReplanRequest(ReplanRequest),
    MemoryRead(MemoryRead),
    MemoryResponse(MemoryResponse),
    FinalResult(FinalResult),
}

/// Discriminant used by `Bus::subscribe` — one variant per [`MessagePayload`] case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    TaskSpec,
    SubTask,
    DispatchManifest,
    ExecutionResult,
    CorrectionSignal,
    SubTaskOutcome,
    ReplanRequest,
    MemoryRead,
    MemoryResponse,
    FinalResult,
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::TaskSpec(_) => MessageType::TaskSpec,
            MessagePayload::SubTask(_) => MessageType::SubTask,
            MessagePayload::DispatchManifest(_) => MessageType::DispatchManifest,
            MessagePayload::ExecutionResult(_) => MessageType::ExecutionResult,
            MessagePayload::CorrectionSignal(_) => MessageType::CorrectionSignal,
            MessagePayload::SubTaskOutcome(_) => MessageType::SubTaskOutcome,
            MessagePayload::ReplanRequest(_) => MessageType::ReplanRequest,
            MessagePayload::MemoryRead(_) => MessageType::MemoryRead,
            MessagePayload::MemoryResponse(_) => MessageType::MemoryResponse,
            MessagePayload::FinalResult(_) => MessageType::FinalResult,
        }
    }
}

/// Envelope wrapping every message published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub from: Role,
    pub to: Option<Role>,
    pub payload: MessagePayload,
}

impl Message {
    pub fn new(from: Role, to: Option<Role>, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            from,
            to,
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub intent: String,
    #[serde(default)]
    pub constraints: TaskConstraints,
    pub raw_input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub subtask_id: String,
    pub parent_task_id: String,
    pub intent: String,
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub deadline: Option<String>,
    pub sequence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub subtask_id: String,
    pub status: ExecutionStatus,
    pub output: String,
    #[serde(default)]
    pub tool_calls: Vec<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    Logical,
    Environmental,
    /// Both logical and environmental failures present within one attempt.
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: String,
    pub met: bool,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub failure_class: Option<FailureClass>,
}

/// The Agent-Validator's scoring result as a tagged variant, per the design note that a
/// single all-optional-fields struct loses the "exactly one of these happened" guarantee.
#[derive(Debug, Clone)]
pub enum Verdict {
    Matched {
        score: f64,
        criteria_results: Vec<CriterionResult>,
    },
    Retry {
        score: f64,
        criteria_results: Vec<CriterionResult>,
        what_was_wrong: String,
        what_to_do: String,
    },
    Failed {
        score: f64,
        criteria_results: Vec<CriterionResult>,
        failure_reason: String,
    },
}

impl Verdict {
    pub fn score(&self) -> f64 {
        match self {
            Verdict::Matched { score, .. }
            | Verdict::Retry { score, .. }
            | Verdict::Failed { score, .. } => *score,
        }
    }

    pub fn criteria_results(&self) -> &[CriterionResult] {
        match self {
            Verdict::Matched { criteria_results, .. }
            | Verdict::Retry { criteria_results, .. }
            | Verdict::Failed { criteria_results, .. } => criteria_results,
        }
    }

    pub fn unmet_criteria(&self) -> Vec<String> {
        self.criteria_results()
            .iter()
            .filter(|c| !c.met)
            .map(|c| c.criterion.clone())
            .collect()
    }

    /// Per-attempt failure class, folded over unmet criteria per the aggregation rule:
    /// no unmet criteria -> None; all logical -> Logical; all environmental -> Environmental;
    /// a mix of both -> Mixed.
    pub fn aggregate_failure_class(&self) -> Option<FailureClass> {
        let mut saw_logical = false;
        let mut saw_env = false;
        for c in self.criteria_results().iter().filter(|c| !c.met) {
            match c.failure_class {
                Some(FailureClass::Logical) => saw_logical = true,
                Some(FailureClass::Environmental) => saw_env = true,
                Some(FailureClass::Mixed) => {
                    saw_logical = true;
                    saw_env = true;
                }
                None => {}
            }
        }
        match (saw_logical, saw_env) {
            (false, false) => None,
            (true, false) => Some(FailureClass::Logical),
            (false, true) => Some(FailureClass::Environmental),
            (true, true) => Some(FailureClass::Mixed),
        }
    }
}

/// Wire shape returned by the scoring LLM call; deserialized then adapted into [`Verdict`].
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictWire {
    pub verdict: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub criteria_results: Vec<CriterionResult>,
    #[serde(default)]
    pub what_was_wrong: Option<String>,
    #[serde(default)]
    pub what_to_do: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl From<VerdictWire> for Verdict {
    fn from(w: VerdictWire) -> Self {
        match w.verdict.as_str() {
            "matched" => Verdict::Matched {
                score: w.score,
                criteria_results: w.criteria_results,
            },
            "retry" => Verdict::Retry {
                score: w.score,
                criteria_results: w.criteria_results,
                what_was_wrong: w.what_was_wrong.unwrap_or_default(),
                what_to_do: w.what_to_do.unwrap_or_default(),
            },
            _ => Verdict::Failed {
                score: w.score,
                criteria_results: w.criteria_results,
                failure_reason: w.failure_reason.unwrap_or_else(|| "validation failed".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapTrajectoryPoint {
    pub attempt: u32,
    pub score: f64,
    pub unmet_criteria: Vec<String>,
    /// Empty string means no unmet criteria this attempt.
    pub failure_class: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    Matched,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskOutcome {
    pub subtask_id: String,
    pub parent_task_id: String,
    pub intent: String,
    pub success_criteria: Vec<String>,
    pub status: SubTaskStatus,
    pub output: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub gap_trajectory: Vec<GapTrajectoryPoint>,
    pub criteria_verdicts: Vec<CriterionResult>,
    #[serde(default)]
    pub tool_calls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchManifest {
    pub task_id: String,
    pub subtask_ids: Vec<String>,
    pub task_spec: TaskSpec,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionSignal {
    pub subtask_id: String,
    pub attempt_number: u32,
    pub failed_criterion: String,
    pub failure_class: Option<FailureClass>,
    pub what_was_wrong: String,
    pub what_to_do: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanRequest {
    pub task_id: String,
    pub recommendation: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRead {
    pub task_id: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub task_id: String,
    pub entries: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Procedural,
    Episodic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// ISO-8601, lexicographically sortable.
    pub timestamp: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub task_id: String,
    pub outcomes: Vec<SubTaskOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_wire_matched_maps_to_matched_variant() {
        let w = VerdictWire {
            verdict: "matched".to_string(),
            score: 1.0,
            criteria_results: vec![],
            what_was_wrong: None,
            what_to_do: None,
            failure_reason: None,
        };
        assert!(matches!(Verdict::from(w), Verdict::Matched { .. }));
    }

    #[test]
    fn aggregate_failure_class_mixed_when_both_present() {
        let v = Verdict::Retry {
            score: 0.5,
            criteria_results: vec![
                CriterionResult {
                    criterion: "a".into(),
                    met: false,
                    evidence: None,
                    failure_class: Some(FailureClass::Logical),
                },
                CriterionResult {
                    criterion: "b".into(),
                    met: false,
                    evidence: None,
                    failure_class: Some(FailureClass::Environmental),
                },
            ],
            what_was_wrong: String::new(),
            what_to_do: String::new(),
        };
        assert_eq!(v.aggregate_failure_class(), Some(FailureClass::Mixed));
    }

    #[test]
    fn aggregate_failure_class_none_when_all_met() {
        let v = Verdict::Matched {
            score: 1.0,
            criteria_results: vec![CriterionResult {
                criterion: "a".into(),
                met: true,
                evidence: None,
                failure_class: None,
            }],
        };
        assert_eq!(v.aggregate_failure_class(), None);
    }

    #[test]
    fn message_type_matches_payload() {
        let m = Message::new(
            Role::Perceiver,
            Some(Role::Planner),
            MessagePayload::TaskSpec(TaskSpec {
                task_id: "t1".into(),
                intent: "do a thing".into(),
                constraints: TaskConstraints { scope: None, deadline: None },
                raw_input: "do a thing".into(),
            }),
        );
        assert_eq!(m.message_type(), MessageType::TaskSpec);
    }
}
