//! Prompt-echo reconciliation
//!
//! Some upstream model configurations echo the user's prompt verbatim at
//! the start of their raw output. This is a deterministic local fixup on
//! the fully accumulated text, not a network round trip.

/// Strip a verbatim echo of `prompt` from the front of `accumulated`.
/// Anything short of an exact prefix match leaves the text untouched.
pub fn strip_prompt_echo(prompt: &str, accumulated: &str) -> String {
    if !prompt.is_empty() {
        if let Some(rest) = accumulated.strip_prefix(prompt) {
            return rest.to_owned();
        }
    }
    accumulated.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_prefix_is_stripped() {
        assert_eq!(strip_prompt_echo("Hi", "Hi there!"), " there!");
    }

    #[test]
    fn test_echo_only_output_becomes_empty() {
        assert_eq!(strip_prompt_echo("Hi", "Hi"), "");
    }

    #[test]
    fn test_non_prefix_is_untouched() {
        assert_eq!(strip_prompt_echo("Hi", "Well, hi!"), "Well, hi!");
    }

    #[test]
    fn test_empty_accumulated_stays_empty() {
        assert_eq!(strip_prompt_echo("Hi", ""), "");
    }

    #[test]
    fn test_empty_prompt_is_identity() {
        assert_eq!(strip_prompt_echo("", "answer"), "answer");
    }

    #[test]
    fn test_case_sensitive_match_only() {
        assert_eq!(strip_prompt_echo("hi", "Hi there!"), "Hi there!");
    }
}
