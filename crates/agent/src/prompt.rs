//! Prompt/cache composition.
//!
//! A request is laid out so the stable parts come first and carry cache
//! boundaries: system prompt, then (if large enough) the live context block,
//! then the tool catalog, then the conversation prefix. Only the newest turn
//! is guaranteed to be reprocessed on every call.

use cheers_core::ToolDefinition;

use crate::llm::ChatMessage;

/// Context blocks shorter than this are inlined without a cache boundary.
pub const MIN_CACHEABLE_CONTEXT_CHARS: usize = 4000;

/// The history prefix gets a cache boundary once more than this many prior messages exist.
pub const HISTORY_CACHE_MIN_PRIOR_MESSAGES: usize = 2;

const CONTEXT_HEADING: &str = "# CURRENT CONTEXT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSegment {
    pub text: String,
    pub cacheable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposedTool {
    pub definition: ToolDefinition,
    pub cache_boundary: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposedMessage {
    pub message: ChatMessage,
    pub cache_boundary: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposedRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: Vec<PromptSegment>,
    pub tools: Vec<ComposedTool>,
    pub messages: Vec<ComposedMessage>,
}

impl ComposedRequest {
    pub fn cache_boundaries(&self) -> usize {
        self.system.iter().filter(|segment| segment.cacheable).count()
            + self.tools.iter().filter(|tool| tool.cache_boundary).count()
            + self.messages.iter().filter(|message| message.cache_boundary).count()
    }
}

pub struct PromptInput<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system_prompt: &'a str,
    pub context: Option<&'a str>,
    pub tools: &'a [ToolDefinition],
    pub messages: &'a [ChatMessage],
}

pub fn compose(input: PromptInput<'_>) -> ComposedRequest {
    let mut system =
        vec![PromptSegment { text: input.system_prompt.to_string(), cacheable: true }];

    if let Some(context) = input.context.map(str::trim).filter(|context| !context.is_empty()) {
        system.push(PromptSegment {
            text: format!("{CONTEXT_HEADING}\n{context}"),
            cacheable: context.chars().count() > MIN_CACHEABLE_CONTEXT_CHARS,
        });
    }

    let last_tool = input.tools.len().checked_sub(1);
    let tools = input
        .tools
        .iter()
        .enumerate()
        .map(|(index, definition)| ComposedTool {
            definition: definition.clone(),
            cache_boundary: Some(index) == last_tool,
        })
        .collect();

    // Everything before the final turn is the prefix; its last message is the boundary.
    let prior = input.messages.len().saturating_sub(1);
    let prefix_boundary =
        (prior > HISTORY_CACHE_MIN_PRIOR_MESSAGES).then(|| prior - 1);
    let messages = input
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| ComposedMessage {
            message: message.clone(),
            cache_boundary: Some(index) == prefix_boundary,
        })
        .collect();

    ComposedRequest {
        model: input.model.to_string(),
        max_tokens: input.max_tokens,
        system,
        tools,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use cheers_core::catalog::assistant_tools;

    use super::{compose, PromptInput, MIN_CACHEABLE_CONTEXT_CHARS};
    use crate::llm::ChatMessage;

    fn history(len: usize) -> Vec<ChatMessage> {
        (0..len)
            .map(|index| {
                if index % 2 == 0 {
                    ChatMessage::user_text(format!("question {index}"))
                } else {
                    ChatMessage::assistant_text(format!("answer {index}"))
                }
            })
            .collect()
    }

    fn input<'a>(
        context: Option<&'a str>,
        messages: &'a [ChatMessage],
    ) -> PromptInput<'a> {
        PromptInput {
            model: "claude-haiku-4-5-20251001",
            max_tokens: 4096,
            system_prompt: "You are the Cheers assistant.",
            context,
            tools: assistant_tools(),
            messages,
        }
    }

    #[test]
    fn small_context_is_inlined_without_a_boundary() {
        let messages = history(1);
        let request = compose(input(Some("## Today's Events (1)\n- 22:00 | DJ"), &messages));

        assert_eq!(request.system.len(), 2);
        assert!(request.system[0].cacheable);
        assert!(!request.system[1].cacheable);
        assert!(request.system[1].text.starts_with("# CURRENT CONTEXT\n## Today's Events"));
    }

    #[test]
    fn large_context_becomes_its_own_cacheable_segment() {
        let messages = history(1);
        let context = "x".repeat(MIN_CACHEABLE_CONTEXT_CHARS + 1);
        let request = compose(input(Some(&context), &messages));
        assert!(request.system[1].cacheable);

        let exact = "x".repeat(MIN_CACHEABLE_CONTEXT_CHARS);
        let request = compose(input(Some(&exact), &messages));
        assert!(!request.system[1].cacheable);
    }

    #[test]
    fn blank_context_adds_no_segment() {
        let messages = history(1);
        let request = compose(input(Some("  \n"), &messages));
        assert_eq!(request.system.len(), 1);
    }

    #[test]
    fn only_the_last_tool_is_a_cache_boundary() {
        let messages = history(1);
        let request = compose(input(None, &messages));
        let boundaries: Vec<_> =
            request.tools.iter().filter(|tool| tool.cache_boundary).collect();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(
            boundaries[0].definition.name,
            assistant_tools().last().map(|tool| tool.name.clone()).unwrap_or_default()
        );
    }

    #[test]
    fn history_prefix_boundary_needs_more_than_two_prior_messages() {
        let short = history(3);
        let request = compose(input(None, &short));
        assert!(request.messages.iter().all(|message| !message.cache_boundary));

        let long = history(5);
        let request = compose(input(None, &long));
        let marked: Vec<usize> = request
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.cache_boundary)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(marked, vec![3]);
        assert_eq!(request.cache_boundaries(), 3);
    }
}
