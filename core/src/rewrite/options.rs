use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Knobs for [`PartialApplier`](super::PartialApplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RewriteOptions {
    /// Treat a twice-referenced local of value type as `default(T)`
    pub recognize_struct_defaults: bool,
    /// Accept branches to the next instruction (emitted by debug builds)
    pub allow_fallthrough_branches: bool,
    /// Trace every packet pushed while rebuilding the expression tree
    pub trace_packets: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            recognize_struct_defaults: true,
            allow_fallthrough_branches: true,
            trace_packets: false,
        }
    }
}

impl RewriteOptions {
    /// Parse options from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(RewriteOptions::from_toml_str("").expect("parse"), RewriteOptions::default());
    }

    #[test]
    fn keys_override_defaults() {
        let opts = RewriteOptions::from_toml_str("recognize_struct_defaults = false\ntrace_packets = true\n").expect("parse");
        assert!(!opts.recognize_struct_defaults);
        assert!(opts.allow_fallthrough_branches);
        assert!(opts.trace_packets);
    }

    #[test]
    fn wrong_value_type_is_an_error() {
        assert!(RewriteOptions::from_toml_str("trace_packets = 3").is_err());
    }
}
