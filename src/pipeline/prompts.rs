//! Prompt composition. The input text is inserted verbatim; nothing is escaped.

pub const DEFAULT_TRANSLATE_TEMPLATE: &str =
    "{{context_prefix}}Translate from {{source_lang}} to {{target_lang}}: {{text}}";

const EMERGENCY_PREFIX: &str = "Emergency translation: ";
const GOVERNMENT_PREFIX: &str = "Official translation: ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextTag {
    Emergency,
    Government,
    General,
}

impl ContextTag {
    /// Exact, case-sensitive match; anything else (including no tag) is general.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("emergency") => Self::Emergency,
            Some("government") => Self::Government,
            _ => Self::General,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Emergency => EMERGENCY_PREFIX,
            Self::Government => GOVERNMENT_PREFIX,
            Self::General => "",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: DEFAULT_TRANSLATE_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn build(&self, input: &str, from: &str, to: &str, context: Option<&str>) -> String {
        let prefix = ContextTag::parse(context).prefix();
        render_template(
            &self.template,
            &[
                ("context_prefix", prefix),
                ("source_lang", from),
                ("target_lang", to),
                ("text", input),
            ],
        )
    }
}

pub fn build_prompt(input: &str, from: &str, to: &str, context: Option<&str>) -> String {
    PromptBuilder::default().build(input, from, to, context)
}

/// Replaces `{{key}}` placeholders in one left-to-right pass, so substituted values
/// are never expanded again. Unknown placeholders are kept as-is.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, v)) => out.push_str(v),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
