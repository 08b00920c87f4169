//! Tiered LLM credential resolution: a shared `OPENAI_*` default plus an optional
//! tier-prefixed override (`P_API_KEY`, `P_BASE_URL`, `P_MODEL`, `P_ENABLE_THINKING`).

use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub enable_thinking: bool,
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

/// Strips a trailing slash and a trailing `/chat/completions` suffix so repeated
/// normalization and path joining are idempotent.
pub fn normalize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim_end_matches('/').to_string();
    if let Some(stripped) = url.strip_suffix("/chat/completions") {
        url = stripped.trim_end_matches('/').to_string();
    }
    url
}

/// Resolves configuration for `tier` (e.g. `"BRAIN"`, `"TOOL"`), falling back to the
/// shared `OPENAI_*` variables for any field the tier does not override.
pub fn resolve_tier(tier: &str) -> TierConfig {
    let shared_key = non_empty("OPENAI_API_KEY").unwrap_or_default();
    let shared_url = non_empty("OPENAI_BASE_URL").unwrap_or_default();
    let shared_model = non_empty("OPENAI_MODEL").unwrap_or_default();

    let api_key = non_empty(&format!("{tier}_API_KEY")).unwrap_or(shared_key);
    let base_url = non_empty(&format!("{tier}_BASE_URL")).unwrap_or(shared_url);
    let model = non_empty(&format!("{tier}_MODEL")).unwrap_or(shared_model);
    let enable_thinking = env::var(format!("{tier}_ENABLE_THINKING"))
        .map(|v| v == "true")
        .unwrap_or(false);

    TierConfig {
        api_key,
        base_url: normalize_base_url(&base_url),
        model,
        enable_thinking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation is process-global; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear(vars: &[&str]) {
        for v in vars {
            env::remove_var(v);
        }
    }

    #[test]
    fn normalize_base_url_strips_trailing_slash() {
        assert_eq!(normalize_base_url("https://api.example.com/"), "https://api.example.com");
    }

    #[test]
    fn normalize_base_url_strips_chat_completions_suffix() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/chat/completions"),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn normalize_base_url_strips_suffix_then_slash() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/chat/completions/"),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn normalize_base_url_is_idempotent() {
        let once = normalize_base_url("https://api.example.com/v1/chat/completions/");
        let twice = normalize_base_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_base_url_empty_string_is_fixed_point() {
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn tier_override_wins_over_shared() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&["OPENAI_API_KEY", "OPENAI_BASE_URL", "OPENAI_MODEL", "T_API_KEY", "T_BASE_URL", "T_MODEL", "T_ENABLE_THINKING"]);
        env::set_var("OPENAI_API_KEY", "shared-key");
        env::set_var("OPENAI_MODEL", "shared-model");
        env::set_var("T_API_KEY", "tier-key");

        let cfg = resolve_tier("T");
        assert_eq!(cfg.api_key, "tier-key");
        assert_eq!(cfg.model, "shared-model");
        assert!(!cfg.enable_thinking);

        clear(&["OPENAI_API_KEY", "OPENAI_MODEL", "T_API_KEY"]);
    }

    #[test]
    fn empty_tier_value_falls_back_to_shared() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&["OPENAI_BASE_URL", "U_BASE_URL"]);
        env::set_var("OPENAI_BASE_URL", "https://shared.example.com");
        env::set_var("U_BASE_URL", "");

        let cfg = resolve_tier("U");
        assert_eq!(cfg.base_url, "https://shared.example.com");

        clear(&["OPENAI_BASE_URL", "U_BASE_URL"]);
    }

    #[test]
    fn enable_thinking_requires_literal_true() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&["V_ENABLE_THINKING"]);
        env::set_var("V_ENABLE_THINKING", "1");
        assert!(!resolve_tier("V").enable_thinking);
        env::set_var("V_ENABLE_THINKING", "true");
        assert!(resolve_tier("V").enable_thinking);
        clear(&["V_ENABLE_THINKING"]);
    }
}
