//! Prompt templates and resolution.
//!
//! Templates are plain text with `{name}` placeholders, substituted
//! literally in a single pass so substituted values are never re-expanded.
//! [`resolve`] picks the template that governs a summarization request.

use crate::DEFAULT_PROMPT_ID;
use crate::settings::PromptSettings;
use tracing::debug;

// ── Built-in templates ─────────────────────────────────────────────

/// System message sent with every provider call.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes web pages and \
answers questions about them. Be accurate and concise, and never invent facts that are not \
in the provided content.";

/// Summary instruction used when no template was resolved.
pub const SUMMARY_TEMPLATE: &str = "Summarize the following web page content. Capture the \
main points, key facts and conclusions in a concise, well-structured summary using short \
paragraphs or bullet points.\n\n{content}";

/// Per-chunk instruction for long pages.
pub const CHUNK_TEMPLATE: &str = "This is part {index} of {total} of a longer web page. \
Summarize the key points of this part concisely. Your summary will be combined with the \
summaries of the other parts.\n\n{content}";

/// Merges chunk summaries when the user has no template of their own.
pub const SYNTHESIS_TEMPLATE: &str = "The following are summaries of consecutive parts of one \
web page, separated by ---. Combine them into a single coherent summary of the whole page. \
Remove repetition and keep the original order of ideas.\n\n{content}";

/// Question-answering instruction used when no custom question prompt is set.
pub const QUESTION_TEMPLATE: &str = "Answer the question using the web page content and its \
summary below. If the answer is not in the content, say so.\n\nPage content:\n{context}\n\n\
Summary:\n{summary}\n\nQuestion: {question}";

// ── Rendering ──────────────────────────────────────────────────────

/// Replace every `{name}` in `template` with its value.
///
/// Unknown placeholders and stray braces are kept verbatim.
///
/// ```
/// use pagebrief::prompt::render;
///
/// let out = render("Q: {question} ({question})", &[("question", "why {content}?")]);
/// assert_eq!(out, "Q: why {content}? (why {content}?)");
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(pos) = rest.find('{') {
        let (before, tail) = rest.split_at(pos);
        out.push_str(before);
        for (name, value) in vars {
            let after = tail
                .strip_prefix('{')
                .and_then(|t| t.strip_prefix(name))
                .and_then(|t| t.strip_prefix('}'));
            if let Some(after) = after {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = tail.get(1..).unwrap_or_default();
    }
    out.push_str(rest);
    out
}

// ── Resolution ─────────────────────────────────────────────────────

/// The outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedPrompt {
    /// Template text. Empty means "use the built-in summary template".
    pub template: String,
    /// Identity used for cache keying.
    pub prompt_id: Option<String>,
}

impl ResolvedPrompt {
    /// The template, or `None` when the built-in default applies.
    pub fn template(&self) -> Option<&str> {
        Some(self.template.as_str()).filter(|t| !t.trim().is_empty())
    }
}

/// Decide which template governs a summarization request.
///
/// Precedence: explicit text, then the requested saved prompt, then the
/// configured default, then the saved prompt with id `"default"`, then
/// nothing.
pub fn resolve(
    prompt_text: Option<&str>,
    prompt_id: Option<&str>,
    prompts: &PromptSettings,
) -> ResolvedPrompt {
    let prompt_id = prompt_id.filter(|id| !id.is_empty());

    if let Some(text) = prompt_text.filter(|t| !t.trim().is_empty()) {
        debug!("Using explicit prompt text ({} chars)", text.len());
        return ResolvedPrompt {
            template: text.to_string(),
            prompt_id: prompt_id.map(str::to_string),
        };
    }

    let candidates = [
        prompt_id,
        Some(prompts.default_prompt_id.as_str()).filter(|id| !id.is_empty()),
        Some(DEFAULT_PROMPT_ID),
    ];
    for id in candidates.into_iter().flatten() {
        if let Some(saved) = prompts.find(id) {
            debug!("Using saved prompt '{}' ({})", saved.name, saved.id);
            return ResolvedPrompt {
                template: saved.content.clone(),
                prompt_id: Some(saved.id.clone()),
            };
        }
    }

    debug!("No saved prompt matched; using built-in template");
    ResolvedPrompt::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CustomPrompt;

    fn prompts() -> PromptSettings {
        PromptSettings {
            saved_prompts: vec![
                CustomPrompt::new("a", "A", "X"),
                CustomPrompt::new("default", "Default", "Y"),
            ],
            default_prompt_id: "default".into(),
            ..Default::default()
        }
    }

    #[test]
    fn explicit_text_wins() {
        let r = resolve(Some("Z"), None, &prompts());
        assert_eq!(r.template, "Z");
        assert_eq!(r.prompt_id, None);

        let r = resolve(Some("Z"), Some("a"), &prompts());
        assert_eq!(r.template, "Z");
        assert_eq!(r.prompt_id.as_deref(), Some("a"));
    }

    #[test]
    fn saved_id_beats_default() {
        let r = resolve(None, Some("a"), &prompts());
        assert_eq!(r.template, "X");
        assert_eq!(r.prompt_id.as_deref(), Some("a"));
    }

    #[test]
    fn falls_back_to_configured_default() {
        let r = resolve(None, None, &prompts());
        assert_eq!(r.template, "Y");
        assert_eq!(r.prompt_id.as_deref(), Some("default"));

        let r = resolve(Some("   "), Some("missing"), &prompts());
        assert_eq!(r.template, "Y");
    }

    #[test]
    fn dangling_default_id_uses_fixed_default() {
        let mut p = prompts();
        p.default_prompt_id = "deleted".into();
        let r = resolve(None, None, &p);
        assert_eq!(r.prompt_id.as_deref(), Some("default"));
        assert_eq!(r.template, "Y");
    }

    #[test]
    fn nothing_saved_resolves_to_builtin() {
        let r = resolve(None, Some("a"), &PromptSettings::empty());
        assert_eq!(r, ResolvedPrompt::default());
        assert_eq!(r.template(), None);
    }

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render(
            "{content}|{content}|{missing}|{",
            &[("content", "c")],
        );
        assert_eq!(out, "c|c|{missing}|{");
    }

    #[test]
    fn render_handles_multibyte_text_around_braces() {
        let out = render("要約：{content}。", &[("content", "本文")]);
        assert_eq!(out, "要約：本文。");
    }

    #[test]
    fn builtin_templates_carry_their_placeholders() {
        assert!(SUMMARY_TEMPLATE.contains("{content}"));
        assert!(SYNTHESIS_TEMPLATE.contains("{content}"));
        assert!(CHUNK_TEMPLATE.contains("{index}") && CHUNK_TEMPLATE.contains("{total}"));
        for p in ["{context}", "{summary}", "{question}"] {
            assert!(QUESTION_TEMPLATE.contains(p));
        }
    }
}
