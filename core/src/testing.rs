//! Test doubles for the Executor and Memory collaborators. Not a product surface — the
//! real Executor and Memory live outside this crate and are referenced only by the
//! message types they exchange with it. These doubles exist so the coordination core is
//! exercisable end-to-end without standing up either one.

use crate::types::{ExecutionResult, ExecutionStatus, MemoryEntry};

/// An in-memory stand-in for the Memory collaborator: returns whatever entries were
/// seeded, ignoring the query (real memory search is out of scope for this crate).
#[derive(Default, Clone)]
pub struct InMemoryMemoryReader {
    entries: Vec<MemoryEntry>,
}

impl InMemoryMemoryReader {
    pub fn new(entries: Vec<MemoryEntry>) -> Self {
        Self { entries }
    }

    pub fn read(&self, _query: &str) -> Vec<MemoryEntry> {
        self.entries.clone()
    }
}

/// Builds a successful [`ExecutionResult`] for the given sub-task, for use in fast-loop
/// tests that don't need a real tool-calling Executor.
pub fn success_result(subtask_id: &str, output: impl Into<String>, tool_calls: Vec<String>) -> ExecutionResult {
    ExecutionResult {
        subtask_id: subtask_id.to_string(),
        status: ExecutionStatus::Success,
        output: output.into(),
        tool_calls,
        elapsed_ms: 0,
    }
}

/// Builds a failed [`ExecutionResult`] carrying `error` as its output, matching the
/// Executor contract (`status=="failed"` carries the error message in `output`).
pub fn failed_result(subtask_id: &str, error: impl Into<String>) -> ExecutionResult {
    ExecutionResult {
        subtask_id: subtask_id.to_string(),
        status: ExecutionStatus::Failed,
        output: error.into(),
        tool_calls: vec![],
        elapsed_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryKind;

    #[test]
    fn memory_reader_returns_seeded_entries_regardless_of_query() {
        let reader = InMemoryMemoryReader::new(vec![MemoryEntry {
            kind: MemoryKind::Episodic,
            timestamp: "2024-01-01T00:00:00Z".into(),
            tags: vec![],
            content: "example".into(),
        }]);
        assert_eq!(reader.read("anything").len(), 1);
    }

    #[test]
    fn failed_result_carries_error_in_output() {
        let r = failed_result("st1", "tool crashed");
        assert_eq!(r.status, ExecutionStatus::Failed);
        assert_eq!(r.output, "tool crashed");
    }
}
