//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the configuration key in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} {}", e.var_name, e.cause),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_passes_through() {
        assert_eq!(expand_env("mmdc", "diagrams.command").unwrap(), "mmdc");
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("MDIMG_EXPAND_UNSET");
        }
        assert_eq!(
            expand_env("${MDIMG_EXPAND_UNSET:-dark}", "diagrams.theme").unwrap(),
            "dark"
        );
    }

    #[test]
    fn test_missing_variable_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("MDIMG_EXPAND_MISSING");
        }
        let err = expand_env("${MDIMG_EXPAND_MISSING}", "diagrams.command").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("diagrams.command"), "{msg}");
        assert!(msg.contains("MDIMG_EXPAND_MISSING"), "{msg}");
    }
}
