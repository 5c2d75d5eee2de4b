// Display normalization for annotated text. Annotators and upstream
// flatteners often leave double-escaped sequences (`\n` as two characters);
// the training data wants the real control characters.
use serde::{Deserialize, Serialize};

/// Default language tag for fenced assistant code.
pub const DEFAULT_LANG_HINT: &str = "asymptote";

const FENCE: &str = "```";

/// How injected text is normalized.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Convert literal escape sequences. Default: true.
    pub enabled: bool,
    /// Wrap assistant text in a fenced code block. Default: false.
    pub fence_code: bool,
    /// Language tag used when fencing.
    pub lang_hint: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            enabled: true,
            fence_code: false,
            lang_hint: DEFAULT_LANG_HINT.to_string(),
        }
    }
}

impl NormalizeOptions {
    /// Normalize an edited user prompt. Never fenced.
    pub fn user_text(&self, s: &str) -> String {
        if self.enabled {
            normalize_for_markdown(s, false, &self.lang_hint)
        } else {
            s.to_string()
        }
    }

    /// Normalize an edited assistant response, fenced per `fence_code`.
    pub fn assistant_text(&self, s: &str) -> String {
        if self.enabled {
            normalize_for_markdown(s, self.fence_code, &self.lang_hint)
        } else {
            s.to_string()
        }
    }
}

/// Replace literal `\n`, `\t` and `\"` with newline, tab and `"`.
pub fn unescape_literals(s: &str) -> String {
    s.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

/// Unescape `s` and, with `fence`, wrap it in a ```` ```lang_hint ```` block
/// unless it is already fenced.
pub fn normalize_for_markdown(s: &str, fence: bool, lang_hint: &str) -> String {
    let s = unescape_literals(s);
    if !fence {
        return s;
    }
    let stripped = s.trim();
    if stripped.starts_with(FENCE) && stripped.ends_with(FENCE) {
        s
    } else {
        format!("{FENCE}{lang_hint}\n{s}\n{FENCE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_escaped_quote_and_newline() {
        assert_eq!(
            normalize_for_markdown(r#"He said \"hi\"\n"#, false, DEFAULT_LANG_HINT),
            "He said \"hi\"\n"
        );
    }

    #[test]
    fn converts_escaped_tab() {
        assert_eq!(unescape_literals(r"a\tb"), "a\tb");
    }

    #[test]
    fn fences_unfenced_code() {
        assert_eq!(
            normalize_for_markdown(r"draw((0,0)--(1,1));\n", true, "asymptote"),
            "```asymptote\ndraw((0,0)--(1,1));\n\n```"
        );
    }

    #[test]
    fn leaves_fenced_code_alone() {
        let code = "  ```asy\nsize(100);\n```\n";
        assert_eq!(normalize_for_markdown(code, true, "asymptote"), code);
    }

    #[test]
    fn disabled_options_pass_text_through() {
        let opts = NormalizeOptions {
            enabled: false,
            fence_code: true,
            ..Default::default()
        };
        assert_eq!(opts.assistant_text(r"a\nb"), r"a\nb");
        assert_eq!(opts.user_text(r"a\nb"), r"a\nb");
    }

    #[test]
    fn user_text_is_never_fenced() {
        let opts = NormalizeOptions {
            fence_code: true,
            ..Default::default()
        };
        assert_eq!(opts.user_text("plain"), "plain");
        assert_eq!(opts.assistant_text("plain"), "```asymptote\nplain\n```");
    }
}
