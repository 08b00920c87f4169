pub mod config;
pub mod gateway;
pub mod sanitize;

pub use config::{normalize_base_url, resolve_tier, TierConfig};
pub use gateway::{Chat, ChatResponse, LlmUsage};
pub use sanitize::{strip_fences, strip_think_blocks};
