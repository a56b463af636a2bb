/// Placeholder replaced with the editor's selected text.
pub const CONTENT_PLACEHOLDER: &str = "{content}";
/// Placeholder replaced with the user's prompt.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

pub fn render_prompt(template: &str, selected_text: &str, prompt: &str) -> String {
    // Substitute in one pass so a prompt containing `{content}` is left alone.
    let mut out = String::with_capacity(template.len() + selected_text.len() + prompt.len());
    let mut rest = template;
    loop {
        let content_at = rest.find(CONTENT_PLACEHOLDER);
        let prompt_at = rest.find(PROMPT_PLACEHOLDER);
        let (at, placeholder, value) = match (content_at, prompt_at) {
            (Some(c), Some(p)) if p < c => (p, PROMPT_PLACEHOLDER, prompt),
            (Some(c), _) => (c, CONTENT_PLACEHOLDER, selected_text),
            (None, Some(p)) => (p, PROMPT_PLACEHOLDER, prompt),
            (None, None) => break,
        };
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_both_placeholders() {
        let t = "{prompt}\n---\n{content}";
        assert_eq!(render_prompt(t, "some text", "Summarize"), "Summarize\n---\nsome text");
    }

    #[test]
    fn values_are_not_rescanned() {
        assert_eq!(render_prompt("{prompt}", "SEL", "say {content}"), "say {content}");
    }

    #[test]
    fn template_without_placeholders_is_kept() {
        assert_eq!(render_prompt("plain", "a", "b"), "plain");
    }
}
