//! Perceiver (R1): lifts raw user input into a [`TaskSpec`] via a bounded clarification
//! dialogue, then publishes it.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::bus::Bus;
use crate::error::{ShellError, ShellResult};
use crate::llm::{strip_fences, Chat};
use crate::types::{Message, MessagePayload, Role, TaskSpec};

const MAX_CLARIFICATION_ROUNDS: u32 = 2;

/// Injectable collaborator for the clarifying-question dialogue, so the Perceiver is
/// testable without a terminal. `None` signals the user declined to answer (commit now).
#[async_trait]
pub trait ClarifyFn: Send + Sync {
    async fn ask(&self, question: &str) -> Option<String>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PerceiverReply {
    Clarify { needs_clarification: bool, question: String },
    Spec(TaskSpec),
}

pub struct Perceiver<'a> {
    chat: &'a Chat,
    bus: &'a Bus,
}

impl<'a> Perceiver<'a> {
    pub fn new(chat: &'a Chat, bus: &'a Bus) -> Self {
        Self { chat, bus }
    }

    /// Runs the bounded clarification loop for one raw input and publishes the resulting
    /// `TaskSpec`. Returns the task id.
    pub async fn perceive(
        &self,
        raw_input: &str,
        session_context: Option<&str>,
        clarify: &dyn ClarifyFn,
    ) -> ShellResult<String> {
        let mut accumulated = raw_input.to_string();
        let mut round = 0u32;

        loop {
            let user_prompt = if round == 0 {
                match session_context {
                    Some(ctx) => format!("Session context:\n{ctx}\n\nUser input:\n{accumulated}"),
                    None => accumulated.clone(),
                }
            } else {
                accumulated.clone()
            };

            let final_round = round >= MAX_CLARIFICATION_ROUNDS;
            let system = self.system_prompt(final_round);

            let res = self.chat.chat(&system, &user_prompt).await?;
            let cleaned = strip_fences(&res.content);

            let reply: PerceiverReply = serde_json::from_str(&cleaned)
                .map_err(|e| ShellError::Protocol(format!("perceiver reply parse error: {e}")))?;

            match reply {
                PerceiverReply::Clarify { needs_clarification: true, question } if !final_round => {
                    match clarify.ask(&question).await {
                        Some(answer) if !answer.is_empty() => {
                            accumulated = format!("{accumulated}\nQ: {question}\nA: {answer}");
                            round += 1;
                            continue;
                        }
                        _ => {
                            round = MAX_CLARIFICATION_ROUNDS; // next call is final
                            continue;
                        }
                    }
                }
                PerceiverReply::Clarify { .. } => {
                    return Err(ShellError::Protocol(
                        "perceiver could not resolve a task spec".to_string(),
                    ));
                }
                PerceiverReply::Spec(mut spec) => {
                    if spec.task_id.is_empty() {
                        spec.task_id = Uuid::new_v4().to_string();
                    }
                    spec.raw_input = accumulated.clone();
                    let task_id = spec.task_id.clone();

                    self.bus
                        .publish(Message::new(Role::Perceiver, Some(Role::Planner), MessagePayload::TaskSpec(spec)))
                        .await?;
                    return Ok(task_id);
                }
            }
        }
    }

    fn system_prompt(&self, final_round: bool) -> String {
        system_prompt(final_round)
    }
}

fn system_prompt(final_round: bool) -> String {
    let mut prompt = String::from(
        "You turn a user's raw request into a structured task specification. \
         Preserve relative time expressions (e.g. \"this year\", \"yesterday\") verbatim \
         in `intent` — never resolve them yourself. If the request is ambiguous, reply \
         {\"needs_clarification\":true,\"question\":\"...\"}. Otherwise reply with a \
         TaskSpec JSON object: {\"task_id\":\"\",\"intent\":\"...\",\"constraints\":{\"scope\":null,\"deadline\":null},\"raw_input\":\"\"}.",
    );
    if final_round {
        prompt.push_str(" Proceed with the best interpretation; do not request further clarification.");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_round_system_prompt_forbids_further_clarification() {
        assert!(system_prompt(true).contains("do not request further clarification"));
    }

    #[test]
    fn non_final_round_prompt_allows_clarification() {
        assert!(!system_prompt(false).contains("do not request further clarification"));
    }

    #[test]
    fn reply_spec_parses_from_json() {
        let json = r#"{"task_id":"t1","intent":"find files","constraints":{},"raw_input":"find files"}"#;
        let reply: PerceiverReply = serde_json::from_str(json).unwrap();
        assert!(matches!(reply, PerceiverReply::Spec(_)));
    }

    #[test]
    fn reply_clarify_parses_from_json() {
        let json = r#"{"needs_clarification":true,"question":"which files?"}"#;
        let reply: PerceiverReply = serde_json::from_str(json).unwrap();
        assert!(matches!(reply, PerceiverReply::Clarify { .. }));
    }
}
