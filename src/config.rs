/// Engine configuration snapshot.
///
/// Captured by value when a fragment context is created; toggling the
/// environment afterwards does not affect an in-flight fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Parse a text document once and reuse it while consecutive rows hold
    /// identical text.
    pub reuse_parse: bool,
    /// When a flat column has no remainder, treat keys outside its schema
    /// as not found instead of failing the call.
    pub dynamic_flat_fallback: bool,
}

pub const ENV_REUSE_PARSE: &str = "JSONPATH_REUSE_PARSE";
pub const ENV_DYNAMIC_FLAT_FALLBACK: &str = "JSONPATH_DYNAMIC_FLAT_FALLBACK";

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reuse_parse: true,
            dynamic_flat_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `JSONPATH_REUSE_PARSE` and
    /// `JSONPATH_DYNAMIC_FLAT_FALLBACK`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            reuse_parse: lookup(ENV_REUSE_PARSE)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.reuse_parse),
            dynamic_flat_fallback: lookup(ENV_DYNAMIC_FLAT_FALLBACK)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.dynamic_flat_fallback),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_both() {
        let config = EngineConfig::default();
        assert!(config.reuse_parse);
        assert!(config.dynamic_flat_fallback);
    }

    #[test]
    fn lookup_overrides() {
        let config = EngineConfig::from_lookup(|name| match name {
            ENV_REUSE_PARSE => Some("off".to_string()),
            ENV_DYNAMIC_FLAT_FALLBACK => Some("0".to_string()),
            _ => None,
        });
        assert!(!config.reuse_parse);
        assert!(!config.dynamic_flat_fallback);
    }

    #[test]
    fn unrecognized_values_keep_default() {
        let config = EngineConfig::from_lookup(|_| Some("maybe".to_string()));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn flag_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert_eq!(parse_flag(raw), Some(true), "{raw:?}");
        }
        for raw in ["0", "False", "no", "OFF"] {
            assert_eq!(parse_flag(raw), Some(false), "{raw:?}");
        }
        assert_eq!(parse_flag(""), None);
    }
}
