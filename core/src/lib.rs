//! Coordination core for an agentic shell: a typed pub/sub bus and the roles that drive
//! a user request from raw input to a verified outcome.
//!
//! The fixed topology is Perceiver -> Planner -> Executor <-> Agent-Validator ->
//! Meta-Validator. This crate implements the first three and the fast feedback loop
//! between them; the Executor, Meta-Validator, Memory, and Governor are external
//! collaborators referenced only by the message types in [`types`] — see
//! [`testing`] for minimal stand-ins used in this crate's own tests.
//!
//! Main modules:
//! - [`bus`] — the typed pub/sub [`bus::Bus`] every role publishes to and subscribes on.
//! - [`types`] — the message envelope and every payload it carries, including the
//!   Agent-Validator's [`types::Verdict`].
//! - [`llm`] — the shared chat gateway ([`llm::Chat`]), tiered credential resolution,
//!   and output sanitization.
//! - [`roles`] — [`roles::Perceiver`], [`roles::Planner`], [`roles::AgentValidator`].
//! - [`error`] — the crate-wide [`error::ShellError`].

pub mod bus;
pub mod error;
pub mod llm;
pub mod roles;
pub mod testing;
pub mod types;

pub use bus::Bus;
pub use error::{ShellError, ShellResult};
