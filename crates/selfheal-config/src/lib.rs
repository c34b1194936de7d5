// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod loader;
mod schema;

pub use loader::load;
pub use schema::{SelfHealConfig, Strategy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_types_wildcard_admits_anything() {
        let mut cfg = SelfHealConfig::default();
        cfg.allowed_types = vec!["all".to_string()];
        assert!(cfg.type_allowed("bug"));
        assert!(cfg.type_allowed("anything"));
    }

    #[test]
    fn allowed_types_closed_set() {
        let mut cfg = SelfHealConfig::default();
        cfg.allowed_types = vec!["bug".to_string(), "feature".to_string()];
        assert!(cfg.type_allowed("bug"));
        assert!(!cfg.type_allowed("question"));
    }

    #[test]
    fn resolve_api_key_prefers_explicit() {
        let mut cfg = SelfHealConfig::default();
        cfg.api_key = Some("explicit".into());
        cfg.api_key_env = Some("SELFHEAL_TEST_KEY_UNUSED".into());
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("explicit"));
    }

    #[test]
    fn resolve_api_key_falls_back_to_env() {
        std::env::set_var("SELFHEAL_TEST_KEY_FALLBACK", "from-env");
        let mut cfg = SelfHealConfig::default();
        cfg.api_key_env = Some("SELFHEAL_TEST_KEY_FALLBACK".into());
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("from-env"));
        std::env::remove_var("SELFHEAL_TEST_KEY_FALLBACK");
    }

    #[test]
    fn cooldown_duration_defaults_to_one_hour() {
        let cfg = SelfHealConfig::default();
        assert_eq!(cfg.cooldown_duration().as_secs(), 3600);
    }

    #[test]
    fn timeout_duration_defaults_to_thirty_minutes() {
        let cfg = SelfHealConfig::default();
        assert_eq!(cfg.timeout_duration().as_secs(), 1800);
    }

    #[test]
    fn malformed_duration_string_falls_back() {
        let mut cfg = SelfHealConfig::default();
        cfg.cooldown = "not-a-duration".into();
        assert_eq!(cfg.cooldown_duration().as_secs(), 3600);
    }
}
