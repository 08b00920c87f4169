pub mod agent_validator;
pub mod perceiver;
pub mod planner;

pub use agent_validator::AgentValidator;
pub use perceiver::{ClarifyFn, Perceiver};
pub use planner::Planner;
