//! Environment variable expansion for configuration strings.
//!
//! Supports:
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

use crate::ConfigError;

/// Expand environment variable references in a string.
///
/// Returns the original string unchanged if no `${}` patterns are present,
/// so bare `$VAR` text survives untouched.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Expand every entry of a list field, naming entries `field[i]` in errors.
pub(crate) fn expand_env_list(values: &[String], field: &str) -> Result<Vec<String>, ConfigError> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| expand_env(value, &format!("{field}[{i}]")))
        .collect()
}

/// Error returned when environment variable lookup fails.
struct LookupError {
    var_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_simple_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("RIPPLE_EXPAND_SIMPLE", "assets");
        }
        let result = expand_env("${RIPPLE_EXPAND_SIMPLE}", "live_reload.watch").unwrap();
        assert_eq!(result, "assets");
        unsafe {
            std::env::remove_var("RIPPLE_EXPAND_SIMPLE");
        }
    }

    #[test]
    fn test_expand_with_default_uses_default() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RIPPLE_EXPAND_UNSET");
        }
        let result = expand_env("${RIPPLE_EXPAND_UNSET:-views}", "live_reload.watch").unwrap();
        assert_eq!(result, "views");
    }

    #[test]
    fn test_expand_missing_var_error() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RIPPLE_EXPAND_MISSING");
        }
        let err = expand_env("${RIPPLE_EXPAND_MISSING}", "server.host").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("RIPPLE_EXPAND_MISSING"));
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_expand_embedded_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("RIPPLE_EXPAND_THEME", "dark");
        }
        let result = expand_env("themes/${RIPPLE_EXPAND_THEME}/css", "live_reload.watch").unwrap();
        assert_eq!(result, "themes/dark/css");
        unsafe {
            std::env::remove_var("RIPPLE_EXPAND_THEME");
        }
    }

    #[test]
    fn test_bare_dollar_not_expanded() {
        let result = expand_env("$HOME/assets", "live_reload.watch").unwrap();
        assert_eq!(result, "$HOME/assets");
    }

    #[test]
    fn test_expand_list_reports_entry_index() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RIPPLE_EXPAND_LIST_MISSING");
        }
        let values = vec![
            "assets".to_owned(),
            "${RIPPLE_EXPAND_LIST_MISSING}".to_owned(),
        ];
        let err = expand_env_list(&values, "live_reload.watch").unwrap_err();
        assert!(err.to_string().contains("live_reload.watch[1]"));
    }

    #[test]
    fn test_expand_list_literals_unchanged() {
        let values = vec!["assets".to_owned(), "views".to_owned()];
        let result = expand_env_list(&values, "live_reload.watch").unwrap();
        assert_eq!(result, values);
    }
}
