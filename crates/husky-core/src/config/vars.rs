//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `${VAR:?message}` - error with `message` if VAR is unset OR empty
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape sequence
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: variable name
            (?:
                (:-|-|:\?)             # 2: operator
                ([^}]*)                # 3: default value or message
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: unbraced variable name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem encountered, in order of appearance.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// Errors are accumulated rather than returned on the first miss so that a
/// user sees every missing variable at once.
pub fn interpolate(input: &str) -> InterpolationResult {
    interpolate_with(input, |name| env::var(name).ok())
}

/// Interpolate using an arbitrary variable lookup.
pub fn interpolate_with<F>(input: &str, lookup: F) -> InterpolationResult
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            let full_match = &caps[0];
            if full_match == "$$" {
                return "$".to_string();
            }

            let name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let operator = caps.get(2).map(|m| m.as_str());
            let operand = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

            match (lookup(name), operator) {
                (Some(value), _) if value.contains('\n') || value.contains('\r') => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    full_match.to_string()
                }
                (Some(value), Some(":-")) if value.is_empty() => operand.to_string(),
                (Some(value), Some(":?")) if value.is_empty() => {
                    errors.push(required_message(name, operand));
                    full_match.to_string()
                }
                (Some(value), _) => value,
                (None, Some(":-" | "-")) => operand.to_string(),
                (None, Some(":?")) => {
                    errors.push(required_message(name, operand));
                    full_match.to_string()
                }
                (None, _) => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    full_match.to_string()
                }
            }
        })
        .into_owned();

    InterpolationResult { text, errors }
}

fn required_message(name: &str, message: &str) -> String {
    if message.is_empty() {
        format!("environment variable '{name}' is required")
    } else {
        format!("environment variable '{name}': {message}")
    }
}
