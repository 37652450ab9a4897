//! Bounding captured tool output.
//!
//! `run_now` output is persisted in the execution history, so it is capped.
//! The middle is dropped: the head shows what started, the tail how it ended.

/// Clip `output` to at most `max_chars` characters, keeping head and tail.
///
/// Counts characters, not bytes, so multi-byte sequences are never split.
/// `max_chars == 0` disables clipping.
pub fn clip(output: &str, max_chars: usize) -> String {
    if max_chars == 0 || output.len() <= max_chars {
        return output.to_owned();
    }

    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let keep = max_chars / 2;
    let head: String = output.chars().take(keep).collect();
    let tail: String = output.chars().skip(total - keep).collect();
    let omitted = total - 2 * keep;

    format!("{head}\n[... {omitted} characters omitted ...]\n{tail}")
}
