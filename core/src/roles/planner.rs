//! Planner (R2): subscribes to `TaskSpec`/`ReplanRequest`/`MemoryResponse`, calibrates
//! memory into a constraints block, decomposes into sub-tasks, and publishes a
//! [`DispatchManifest`] followed by the ordered `SubTask`s.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::bus::Bus;
use crate::error::{ShellError, ShellResult};
use crate::llm::{strip_fences, Chat};
use crate::types::{
    DispatchManifest, Message, MessagePayload, MemoryEntry, MemoryKind, Role, SubTask, TaskSpec,
};

const MAX_MEMORY_ENTRIES: usize = 10;
const MIN_KEYWORD_LEN: usize = 3;

/// Per-task state the Planner keeps for its own run loop — never a process-wide
/// singleton, since multiple tasks (in principle) may be in flight on the same bus.
#[derive(Default)]
struct PlannerTaskState {
    spec: Option<TaskSpec>,
    memory_entries: Vec<MemoryEntry>,
}

pub struct Planner<'a> {
    chat: &'a Chat,
    bus: &'a Bus,
    tasks: HashMap<String, PlannerTaskState>,
}

#[derive(serde::Deserialize)]
struct RawSubTask {
    #[serde(default)]
    subtask_id: String,
    #[serde(default)]
    parent_task_id: String,
    intent: String,
    success_criteria: Vec<String>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default = "default_sequence")]
    sequence: u32,
}

fn default_sequence() -> u32 {
    1
}

impl<'a> Planner<'a> {
    pub fn new(chat: &'a Chat, bus: &'a Bus) -> Self {
        Self { chat, bus, tasks: HashMap::new() }
    }

    /// Sorts memory entries newest-first, caps at [`MAX_MEMORY_ENTRIES`], and keeps only
    /// entries sharing a length->=3 keyword with the intent.
    pub fn calibrate_memory(intent: &str, mut entries: Vec<MemoryEntry>) -> Vec<MemoryEntry> {
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(MAX_MEMORY_ENTRIES);

        let keywords: Vec<String> = intent
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() >= MIN_KEYWORD_LEN)
            .map(|w| w.to_string())
            .collect();

        if keywords.is_empty() {
            return Vec::new();
        }

        entries
            .into_iter()
            .filter(|e| {
                let haystack = serde_json::to_string(e).unwrap_or_default().to_lowercase();
                keywords.iter().any(|k| haystack.contains(k.as_str()))
            })
            .collect()
    }

    /// Renders the calibrated entries into the MUST NOT / SHOULD PREFER constraints
    /// block injected into the planning prompt.
    pub fn render_constraints_block(entries: &[MemoryEntry]) -> String {
        if entries.is_empty() {
            return "(none)".to_string();
        }

        let summarize = |e: &MemoryEntry| -> String {
            let tags = if e.tags.is_empty() { String::new() } else { format!("[{}] ", e.tags.join(",")) };
            let content: String = e.content.chars().take(180).collect();
            let ellipsis = if e.content.chars().count() > 180 { "..." } else { "" };
            format!("- {tags}{content}{ellipsis}")
        };

        let must_not: Vec<&MemoryEntry> =
            entries.iter().filter(|e| e.kind == MemoryKind::Procedural).collect();
        let should_prefer: Vec<&MemoryEntry> =
            entries.iter().filter(|e| e.kind == MemoryKind::Episodic).collect();

        let mut out = String::new();
        if !must_not.is_empty() {
            out.push_str("MUST NOT:\n");
            for e in must_not {
                out.push_str(&summarize(e));
                out.push('\n');
            }
        }
        if !should_prefer.is_empty() {
            out.push_str("SHOULD PREFER:\n");
            for e in should_prefer {
                out.push_str(&summarize(e));
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }

    pub async fn handle_task_spec(&mut self, spec: TaskSpec, memory_entries: Vec<MemoryEntry>) -> ShellResult<()> {
        let calibrated = Self::calibrate_memory(&spec.intent, memory_entries);
        let constraints_block = Self::render_constraints_block(&calibrated);

        let task_id = spec.task_id.clone();
        self.tasks.insert(
            task_id.clone(),
            PlannerTaskState { spec: Some(spec.clone()), memory_entries: calibrated },
        );

        info!(%task_id, transition = "Idle->AwaitingMemory->Idle", "planner.transition");
        self.plan(&spec, &constraints_block).await
    }

    pub async fn handle_replan(&mut self, task_id: &str, recommendation: &str) -> ShellResult<()> {
        if recommendation == "abandon" {
            info!(%task_id, transition = "abandon->Idle", "planner.transition");
            self.tasks.remove(task_id);
            return Ok(());
        }

        let state = self
            .tasks
            .get(task_id)
            .ok_or_else(|| ShellError::Planning(format!("no cached state for task {task_id}")))?;
        let spec = state
            .spec
            .clone()
            .ok_or_else(|| ShellError::Planning(format!("no cached spec for task {task_id}")))?;
        let constraints_block = Self::render_constraints_block(&state.memory_entries);

        info!(%task_id, transition = "replan", "planner.transition");
        self.plan(&spec, &constraints_block).await
    }

    async fn plan(&self, spec: &TaskSpec, constraints_block: &str) -> ShellResult<()> {
        let system = "You decompose a task specification into an ordered list of sub-tasks. \
                      Reply with a JSON array only, each element: {\"subtask_id\":\"\",\"parent_task_id\":\"\",\
                      \"intent\":\"...\",\"success_criteria\":[\"...\"],\"context\":\"\",\"deadline\":null,\"sequence\":1}. \
                      Sub-tasks sharing a sequence number are independent; higher sequence numbers depend on \
                      the union of outputs of lower ones. MUST NOT constraints are mandatory.";
        let user = format!(
            "TaskSpec:\n{}\n\nConstraints:\n{}",
            serde_json::to_string_pretty(spec).unwrap_or_default(),
            constraints_block
        );

        let res = self.chat.chat(system, &user).await?;
        let cleaned = strip_fences(&res.content);
        let raw: Vec<RawSubTask> = serde_json::from_str(&cleaned)
            .map_err(|e| ShellError::Protocol(format!("plan parse error: {e}")))?;

        if raw.is_empty() {
            return Err(ShellError::Planning("empty plan".to_string()));
        }

        let subtasks: Vec<SubTask> = raw
            .into_iter()
            .map(|r| SubTask {
                subtask_id: if r.subtask_id.is_empty() { Uuid::new_v4().to_string() } else { r.subtask_id },
                parent_task_id: spec.task_id.clone(),
                intent: r.intent,
                success_criteria: r.success_criteria,
                context: r.context,
                deadline: r.deadline,
                sequence: r.sequence,
            })
            .collect();

        let manifest = DispatchManifest {
            task_id: spec.task_id.clone(),
            subtask_ids: subtasks.iter().map(|s| s.subtask_id.clone()).collect(),
            task_spec: spec.clone(),
            dispatched_at: Utc::now(),
        };

        self.bus
            .publish(Message::new(Role::Planner, None, MessagePayload::DispatchManifest(manifest)))
            .await?;

        for subtask in subtasks {
            self.bus
                .publish(Message::new(Role::Planner, Some(Role::Executor), MessagePayload::SubTask(subtask)))
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: MemoryKind, ts: &str, tags: &[&str], content: &str) -> MemoryEntry {
        MemoryEntry {
            kind,
            timestamp: ts.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            content: content.to_string(),
        }
    }

    #[test]
    fn calibrate_memory_sorts_newest_first_and_caps() {
        let entries = vec![
            entry(MemoryKind::Episodic, "2024-01-01T00:00:00Z", &[], "search worked well"),
            entry(MemoryKind::Episodic, "2024-06-01T00:00:00Z", &[], "search worked great"),
        ];
        let out = Planner::calibrate_memory("search for files", entries);
        assert_eq!(out[0].timestamp, "2024-06-01T00:00:00Z");
    }

    #[test]
    fn calibrate_memory_filters_by_keyword_relevance() {
        let entries = vec![
            entry(MemoryKind::Procedural, "2024-01-01T00:00:00Z", &[], "never delete backups"),
            entry(MemoryKind::Episodic, "2024-01-02T00:00:00Z", &[], "unrelated content about weather"),
        ];
        let out = Planner::calibrate_memory("delete old backups", entries);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "never delete backups");
    }

    #[test]
    fn calibrate_memory_empty_when_no_keywords_match() {
        let entries = vec![entry(MemoryKind::Episodic, "2024-01-01T00:00:00Z", &[], "totally unrelated")];
        let out = Planner::calibrate_memory("xyz", entries);
        assert!(out.is_empty());
    }

    #[test]
    fn render_constraints_block_empty_is_none_placeholder() {
        assert_eq!(Planner::render_constraints_block(&[]), "(none)");
    }

    #[test]
    fn render_constraints_block_separates_must_not_and_should_prefer() {
        let entries = vec![
            entry(MemoryKind::Procedural, "2024-01-01T00:00:00Z", &["fs"], "do not rm -rf"),
            entry(MemoryKind::Episodic, "2024-01-02T00:00:00Z", &["fs"], "use rsync"),
        ];
        let block = Planner::render_constraints_block(&entries);
        assert!(block.contains("MUST NOT"));
        assert!(block.contains("SHOULD PREFER"));
    }

    #[test]
    fn render_constraints_block_truncates_long_content() {
        let long_content = "x".repeat(200);
        let entries = vec![entry(MemoryKind::Episodic, "2024-01-01T00:00:00Z", &[], &long_content)];
        let block = Planner::render_constraints_block(&entries);
        assert!(block.contains("..."));
    }
}
