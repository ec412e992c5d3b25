use std::env;
use std::str::FromStr;
use tracing::warn;

/// Reads an environment variable and parses it, falling back to `default` when the
/// variable is unset or cannot be parsed.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: Value used when the variable is missing or invalid.
pub fn get_env_var_or<T>(var: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value {:?} for {}, using {:?}", raw, var, default);
                default
            }
        },
        _ => default,
    }
}

/// Reads an environment variable as a string, falling back to `default`.
pub fn get_env_string(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Reads an optional relevance threshold. The literal values `none` and `off` disable it.
pub fn get_env_threshold(var: &str, default: Option<f32>) -> Option<f32> {
    match env::var(var) {
        Ok(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                default
            } else if raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("off") {
                None
            } else {
                match raw.parse::<f32>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid threshold {:?} for {}", raw, var);
                        default
                    }
                }
            }
        }
        Err(_) => default,
    }
}
