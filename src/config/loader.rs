//! Configuration loading and environment parsing.

use super::validation::validate_config;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Environment variable holding an inline JSON document.
pub const CONFIG_JSON_ENV: &str = "CHAT_RELAY_CONFIG_JSON";
/// Environment variable that, when truthy, makes the loader read JSON from stdin.
pub const CONFIG_STDIN_ENV: &str = "CHAT_RELAY_CONFIG_STDIN";
/// Environment variable pointing at a JSON config file.
pub const CONFIG_PATH_ENV: &str = "CHAT_RELAY_CONFIG_PATH";
/// Prefix for per-field overrides, e.g. `CHAT_RELAY__SERVER__HISTORY_LIMIT=500`.
pub const ENV_OVERRIDE_PREFIX: &str = "CHAT_RELAY__";

/// Load configuration. Sources are merged so that earlier entries win:
/// 1) `CHAT_RELAY_CONFIG_JSON` env var containing raw JSON
/// 2) If `CHAT_RELAY_CONFIG_STDIN=true/1`, JSON read from stdin
/// 3) File pointed to by `CHAT_RELAY_CONFIG_PATH`
/// 4) config.json in the current working directory
/// 5) config.json next to the executable
/// 6) Defaults compiled into the binary
///
/// Individual fields can then be overridden by environment variables with the
/// `CHAT_RELAY__` prefix, using `__` as the nesting separator, e.g.
/// `CHAT_RELAY__PORT=7000` or `CHAT_RELAY__LOGGING__LEVEL=debug`.
/// Read/parse errors are printed to stderr and the remaining sources still apply.
///
/// Validation errors are reported on stderr but not propagated; callers that
/// need a hard failure call [`validate_config`] on the result.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::io::Read;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    // Lowest precedence first so that later merges win.
    if let Ok(exe_path) = env::current_exe() {
        if let Some(mut exe_dir) = exe_path.parent().map(std::path::Path::to_path_buf) {
            exe_dir.push("config.json");
            merge_file_source(&mut merged, &exe_dir);
        }
    }

    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    if let Ok(val) = env::var(CONFIG_STDIN_ENV) {
        if env_var_truthy(&val) {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("Failed to read config from stdin: {e}");
            } else if let Some(value) = parse_json_document(&buf, "stdin") {
                merge_values(&mut merged, value);
            }
        }
    }

    if let Ok(json) = env::var(CONFIG_JSON_ENV) {
        if let Some(value) = parse_json_document(&json, CONFIG_JSON_ENV) {
            merge_values(&mut merged, value);
        }
    }

    apply_env_overrides(&mut merged);

    let config = match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    };

    // Warn-only here; main.rs validates again and fails hard.
    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_env_value(&raw_value);
        set_nested_value(root, &segments, value);
    }
}

fn env_var_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        let items = trimmed
            .split(',')
            .map(|segment| parse_scalar(segment.trim()))
            .collect::<Vec<_>>();
        return Value::Array(items);
    }

    parse_scalar(trimmed)
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    // A scalar on the path is replaced by an object holding the override.
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    if rest.is_empty() {
        map.insert(first.clone(), value);
    } else {
        let entry = map
            .entry(first.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        set_nested_value(entry, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_values_overrides_leaves_and_keeps_siblings() {
        let mut target = json!({
            "port": 9999,
            "server": {"outbound_queue_capacity": 1024, "history_limit": null}
        });
        merge_values(&mut target, json!({"server": {"history_limit": 50}}));

        assert_eq!(target["port"], 9999);
        assert_eq!(target["server"]["outbound_queue_capacity"], 1024);
        assert_eq!(target["server"]["history_limit"], 50);
    }

    #[test]
    fn test_parse_env_value_scalars_and_lists() {
        assert_eq!(parse_env_value("7000"), json!(7000));
        assert_eq!(parse_env_value("true"), json!(true));
        assert_eq!(parse_env_value("null"), Value::Null);
        assert_eq!(parse_env_value("debug"), json!("debug"));
        assert_eq!(parse_env_value("a, 2"), json!(["a", 2]));
        assert_eq!(parse_env_value(""), json!(""));
    }

    #[test]
    fn test_set_nested_value_creates_intermediate_objects() {
        let mut root = json!({"port": 1});
        let segments = vec!["logging".to_string(), "level".to_string()];
        set_nested_value(&mut root, &segments, json!("debug"));

        assert_eq!(root["logging"]["level"], "debug");
        assert_eq!(root["port"], 1);
    }

    #[test]
    fn test_set_nested_value_replaces_scalar_parent() {
        let mut root = json!({"server": 3});
        let segments = vec!["server".to_string(), "history_limit".to_string()];
        set_nested_value(&mut root, &segments, json!(10));
        assert_eq!(root["server"]["history_limit"], 10);
    }

    #[test]
    fn test_set_nested_value_replaces_scalar_root_and_empty_path() {
        let mut root = json!("not an object");
        let segments = vec!["port".to_string()];
        set_nested_value(&mut root, &segments, json!(7000));
        assert_eq!(root, json!({"port": 7000}));

        set_nested_value(&mut root, &[], json!({"host": "::1"}));
        assert_eq!(root, json!({"host": "::1"}));
    }

    #[test]
    fn test_env_var_truthy() {
        assert!(env_var_truthy(" TRUE "));
        assert!(env_var_truthy("1"));
        assert!(env_var_truthy("yes"));
        assert!(!env_var_truthy("0"));
        assert!(!env_var_truthy("off"));
    }

    #[test]
    fn test_parse_json_document_ignores_blank_and_invalid() {
        assert!(parse_json_document("   ", "test").is_none());
        assert!(parse_json_document("{not json", "test").is_none());
        assert_eq!(parse_json_document(r#"{"port": 1}"#, "test"), Some(json!({"port": 1})));
    }
}
