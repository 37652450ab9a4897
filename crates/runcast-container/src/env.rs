//! `.env` import and environment-variable policy.
//!
//! Import is lenient: bad rows are skipped and the rest of the file keeps
//! flowing into the map until it holds [`MAX_ENV_ENTRIES`] keys.
//! [`validate_env`] is the strict counterpart used before a save, and lists
//! every violation instead of skipping.

use std::collections::BTreeMap;

use tracing::{debug, warn};

/// Hard cap on the number of keys an environment map may hold after import.
pub const MAX_ENV_ENTRIES: usize = 500;

/// Variable names that alter dynamic-loader or shell start-up behaviour.
///
/// Matched case-insensitively against the trimmed key.
const BLOCKED_KEYS: &[&str] = &[
    // glibc / musl dynamic loader
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_DEBUG_OUTPUT",
    "LD_PROFILE",
    // macOS dyld
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "DYLD_FALLBACK_FRAMEWORK_PATH",
    // shell start-up hooks
    "BASH_ENV",
    "ENV",
    "ZDOTDIR",
    "PROMPT_COMMAND",
    "SHELLOPTS",
    "BASHOPTS",
    "PS4",
    "IFS",
];

/// Returns `true` if `key` is on the dangerous-name blocklist.
pub fn is_blocked_key(key: &str) -> bool {
    let upper = key.trim().to_ascii_uppercase();
    BLOCKED_KEYS.iter().any(|blocked| *blocked == upper)
}

/// Outcome of one [`import_env`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvImport {
    /// Rows written into the map (new keys and overwrites).
    pub imported: usize,
    /// Rows skipped because the key is blocklisted.
    pub blocked: usize,
    /// Rows without `=` or with an empty key.
    pub malformed: usize,
    /// `true` when the cap stopped the import before the end of the text.
    pub truncated: bool,
}

/// Merge `.env`-style `text` into `env`.
///
/// Blank lines and `#` comments are skipped, each remaining line is split on
/// the first `=`, key and value are trimmed, one matching pair of surrounding
/// quotes is removed from the value and NUL characters are stripped from both.
/// Existing keys are overwritten (last write wins).
pub fn import_env(text: &str, env: &mut BTreeMap<String, String>) -> EnvImport {
    let mut report = EnvImport::default();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if env.len() >= MAX_ENV_ENTRIES {
            report.truncated = true;
            warn!(cap = MAX_ENV_ENTRIES, "environment import stopped at entry cap");
            break;
        }

        let Some((raw_key, raw_value)) = trimmed.split_once('=') else {
            report.malformed += 1;
            continue;
        };

        let key = strip_nul(raw_key.trim());
        let value = strip_nul(unquote(raw_value.trim()));

        if key.is_empty() {
            report.malformed += 1;
            continue;
        }
        if is_blocked_key(&key) {
            debug!(%key, "skipping blocklisted environment variable");
            report.blocked += 1;
            continue;
        }

        env.insert(key, value);
        report.imported += 1;
    }

    report
}

/// Strict save-time check. Returns one message per violation.
pub fn validate_env(env: &BTreeMap<String, String>) -> Vec<String> {
    let mut errors = Vec::new();

    if env.len() > MAX_ENV_ENTRIES {
        errors.push(format!(
            "environment has {} entries (max {MAX_ENV_ENTRIES})",
            env.len()
        ));
    }
    for (key, value) in env {
        if key.trim().is_empty() {
            errors.push("environment variable name must not be empty".to_string());
            continue;
        }
        if key.contains('=') {
            errors.push(format!("environment variable name {key:?} contains '='"));
        }
        if key.contains('\0') || value.contains('\0') {
            errors.push(format!("environment variable {key:?} contains a null byte"));
        }
        if is_blocked_key(key) {
            errors.push(format!("environment variable {key} is not allowed"));
        }
    }

    errors
}

/// Render the map as `KEY=value` lines, the format [`import_env`] reads.
pub fn to_env_file(env: &BTreeMap<String, String>) -> String {
    env.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn strip_nul(s: &str) -> String {
    s.chars().filter(|c| *c != '\0').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn comments_blanks_and_blocklist() {
        let mut env = map(&[("KEEP", "1")]);
        let text = "FOO=bar\n# comment\n\nLD_PRELOAD=/tmp/evil.so\n";
        let report = import_env(text, &mut env);

        assert_eq!(env, map(&[("FOO", "bar"), ("KEEP", "1")]));
        assert_eq!(report.imported, 1);
        assert_eq!(report.blocked, 1);
        assert!(!report.truncated);
    }

    #[test]
    fn indented_comment_is_skipped() {
        let mut env = BTreeMap::new();
        import_env("   # FOO=bar\n", &mut env);
        assert!(env.is_empty());
    }

    #[test]
    fn splits_on_first_equals_and_trims() {
        let mut env = BTreeMap::new();
        import_env("  URL = postgres://u:p@h/db?x=1  \n", &mut env);
        assert_eq!(env["URL"], "postgres://u:p@h/db?x=1");
    }

    #[test]
    fn strips_one_pair_of_matching_quotes() {
        let mut env = BTreeMap::new();
        import_env(
            "A=\"hello world\"\nB='single'\nC=\"mismatched'\nD=\"\"nested\"\"\n",
            &mut env,
        );
        assert_eq!(env["A"], "hello world");
        assert_eq!(env["B"], "single");
        assert_eq!(env["C"], "\"mismatched'");
        assert_eq!(env["D"], "\"nested\"");
    }

    #[test]
    fn strips_nul_characters() {
        let mut env = BTreeMap::new();
        import_env("FO\0O=ba\0r\n", &mut env);
        assert_eq!(env["FOO"], "bar");
    }

    #[test]
    fn blocklist_is_case_insensitive() {
        assert!(is_blocked_key("ld_preload"));
        assert!(is_blocked_key(" DYLD_INSERT_LIBRARIES "));
        assert!(!is_blocked_key("PATH"));
    }

    #[test]
    fn merge_overwrites_existing_key() {
        let mut env = map(&[("FOO", "old")]);
        import_env("FOO=new\n", &mut env);
        assert_eq!(env.len(), 1);
        assert_eq!(env["FOO"], "new");
    }

    #[test]
    fn reimport_is_idempotent() {
        let text = "A=1\nB=2\nC=3\n";
        let mut env = BTreeMap::new();
        import_env(text, &mut env);
        let snapshot = env.clone();
        import_env(text, &mut env);
        assert_eq!(env, snapshot);
    }

    #[test]
    fn cap_is_exactly_500() {
        let text: String = (0..750).map(|i| format!("KEY_{i}=v{i}\n")).collect();
        let mut env = BTreeMap::new();
        let report = import_env(&text, &mut env);
        assert_eq!(env.len(), MAX_ENV_ENTRIES);
        assert!(report.truncated);
        assert_eq!(report.imported, MAX_ENV_ENTRIES);
    }

    #[test]
    fn cap_counts_pre_existing_keys() {
        let mut env: BTreeMap<String, String> =
            (0..499).map(|i| (format!("OLD_{i}"), "x".to_string())).collect();
        import_env("NEW_1=a\nNEW_2=b\n", &mut env);
        assert_eq!(env.len(), MAX_ENV_ENTRIES);
        assert!(env.contains_key("NEW_1"));
        assert!(!env.contains_key("NEW_2"));
    }

    #[test]
    fn malformed_rows_are_counted() {
        let mut env = BTreeMap::new();
        let report = import_env("NOEQUALS\n=novalue\nOK=1\n", &mut env);
        assert_eq!(report.malformed, 2);
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn strict_validation_reports_each_violation() {
        let env = map(&[("BASH_ENV", "x"), ("GOOD", "ok"), ("NUL", "a\0b")]);
        let errors = validate_env(&env);
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn env_file_round_trip() {
        let env = map(&[("A", "1"), ("B", "two words")]);
        let mut back = BTreeMap::new();
        import_env(&to_env_file(&env), &mut back);
        assert_eq!(back, env);
    }
}
