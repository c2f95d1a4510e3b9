use crate::ConversationError;

pub const CONTEXT_SLOT: &str = "{context}";
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "文脈に即した返答を作成してください。文脈：{context}";
pub const DEFAULT_SYSTEM_TEXT: &str = "あなたは優秀な回答アシスタントです。";

/// Format string with exactly one `{context}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    prefix: String,
    suffix: String,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self, ConversationError> {
        let slots = template.matches(CONTEXT_SLOT).count();
        if slots != 1 {
            return Err(ConversationError::InvalidTemplate {
                reason: format!("expected exactly one {CONTEXT_SLOT} slot, found {slots}"),
            });
        }
        let (prefix, suffix) = template
            .split_once(CONTEXT_SLOT)
            .ok_or_else(|| ConversationError::InvalidTemplate {
                reason: format!("missing {CONTEXT_SLOT} slot"),
            })?;
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn render(&self, context: &str) -> String {
        let mut rendered =
            String::with_capacity(self.prefix.len() + context.len() + self.suffix.len());
        rendered.push_str(&self.prefix);
        rendered.push_str(context);
        rendered.push_str(&self.suffix);
        rendered
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        let prefix = DEFAULT_PROMPT_TEMPLATE.trim_end_matches(CONTEXT_SLOT);
        Self {
            prefix: prefix.to_string(),
            suffix: String::new(),
        }
    }
}

/// Builds the exact user prompt and carries the fixed system text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    template: PromptTemplate,
    system_text: String,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate, system_text: impl Into<String>) -> Self {
        Self {
            template,
            system_text: system_text.into(),
        }
    }

    pub fn system_text(&self) -> &str {
        &self.system_text
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Applies the template to `input`, prefixed by `history` when history is non-empty.
    pub fn build(&self, history: &str, input: &str) -> String {
        if history.is_empty() {
            return self.template.render(input);
        }
        self.template.render(&format!("{history}{input}"))
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptTemplate::default(), DEFAULT_SYSTEM_TEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::{PromptBuilder, PromptTemplate, DEFAULT_PROMPT_TEMPLATE, DEFAULT_SYSTEM_TEXT};
    use crate::ConversationError;

    #[test]
    fn unit_build_without_history_applies_template_to_input() {
        let builder = PromptBuilder::default();
        let template = PromptTemplate::parse(DEFAULT_PROMPT_TEMPLATE).expect("template");
        assert_eq!(builder.build("", "hello"), template.render("hello"));
        assert_eq!(
            builder.build("", "hello"),
            "文脈に即した返答を作成してください。文脈：hello"
        );
    }

    #[test]
    fn unit_build_with_history_prefixes_context() {
        let template = PromptTemplate::parse("<<{context}>>").expect("template");
        let builder = PromptBuilder::new(template.clone(), "system");
        assert_eq!(builder.build("ctx\n", "hello"), template.render("ctx\nhello"));
        assert_eq!(builder.build("ctx\n", "hello"), "<<ctx\nhello>>");
    }

    #[test]
    fn unit_build_is_deterministic() {
        let builder = PromptBuilder::default();
        assert_eq!(builder.build("a\n", "b"), builder.build("a\n", "b"));
        assert_eq!(builder.system_text(), DEFAULT_SYSTEM_TEXT);
    }

    #[test]
    fn regression_template_requires_exactly_one_slot() {
        assert!(matches!(
            PromptTemplate::parse("no slot"),
            Err(ConversationError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            PromptTemplate::parse("{context} and {context}"),
            Err(ConversationError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn regression_context_braces_are_not_reinterpreted() {
        let template = PromptTemplate::parse("[{context}]").expect("template");
        assert_eq!(template.render("{context}"), "[{context}]");
    }
}
