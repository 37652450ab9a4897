//! Command-override strings.
//!
//! Tokens are separated by single spaces with no quote or escape handling:
//! `sh -c "echo hi"` becomes `["sh", "-c", "\"echo", "hi\""]`. Callers that
//! need embedded spaces must set the token list directly.

/// Split a command-override string into tokens.
pub fn parse_command(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`parse_command`] for display in an editor field.
pub fn join_command(tokens: &[String]) -> String {
    tokens.join(" ")
}
