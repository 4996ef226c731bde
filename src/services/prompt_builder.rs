//! Deterministic prompt assembly: system template with interpolated FAQ
//! knowledge, token-budgeted conversation history, then the new user turn.

use crate::models::internal::{FaqEntry, Message, MessageRole, PromptSegment};

const SYSTEM_PROMPT_TEMPLATE: &str = "You are a helpful and friendly customer support agent for our company. Your goal is to assist users with their questions quickly and accurately.

ROLE & CAPABILITIES:
- Answer questions about billing, account management, and technical support
- Provide clear, concise responses (under 200 words)
- Use information from the FAQ knowledge base below when available
- Admit when you don't know something rather than guessing
- Maintain a professional yet warm tone

RESPONSE GUIDELINES:
- Be direct: Answer the question in the first sentence
- Be specific: Include concrete steps, links, or examples
- Be concise: Keep responses under 200 words unless more detail is requested
- Be empathetic: Acknowledge user frustration when appropriate
- Use bullet points for multi-step instructions

CONSTRAINTS:
- ONLY answer questions related to our product/service
- DO NOT provide medical, legal, or financial advice
- DO NOT make promises about features or timelines
- DO NOT ask for sensitive information (passwords, credit card numbers)
- If a question is outside your scope, politely redirect to human support

AVAILABLE KNOWLEDGE BASE:
{faq_knowledge_base}

When answering:
1. Check if the FAQ knowledge base contains relevant information
2. Use that information as the primary source for your answer
3. If the answer isn't in the knowledge base, use general reasoning
4. If you're uncertain, say \"I'm not sure\" and suggest contacting support";

const NO_FAQ_PLACEHOLDER: &str = "No specific FAQ information available for this query.";

/// Hard ceiling for the whole prompt, dictated by the downstream model's
/// context window.
const MAX_TOTAL_TOKENS: usize = 4000;
/// Budget for the history portion alone.
const MAX_HISTORY_TOKENS: usize = 1200;
/// Segments kept (beyond the system prompt) by the aggressive fallback.
const AGGRESSIVE_TRIM_KEEP: usize = 5;

pub struct PromptBuilder {
    max_faqs: usize,
}

impl PromptBuilder {
    pub fn new(max_faqs: usize) -> Self {
        Self { max_faqs }
    }

    /// Assemble the ordered prompt: system segment first, trimmed history in
    /// chronological order, the new user turn last.
    pub fn build(
        &self,
        user_message: &str,
        faqs: &[FaqEntry],
        history: &[Message],
    ) -> Vec<PromptSegment> {
        let system_prompt =
            SYSTEM_PROMPT_TEMPLATE.replace("{faq_knowledge_base}", &self.format_faqs(faqs));

        let history_segments = format_history(history);
        let truncated = truncate_history(&history_segments, MAX_HISTORY_TOKENS);

        let mut segments = Vec::with_capacity(truncated.len() + 2);
        segments.push(PromptSegment::new(MessageRole::System, system_prompt));
        segments.extend(truncated.iter().cloned());
        segments.push(PromptSegment::new(MessageRole::User, user_message));

        let total_tokens = estimate_total_tokens(&segments);
        if total_tokens > MAX_TOTAL_TOKENS {
            tracing::warn!(
                total_tokens,
                limit = MAX_TOTAL_TOKENS,
                "Token limit exceeded, applying aggressive trimming"
            );
            return aggressive_trim(segments);
        }

        tracing::debug!(
            history_segments = truncated.len(),
            faq_count = faqs.len(),
            total_tokens,
            "Prompt built successfully"
        );

        segments
    }

    /// System + user only, for contexts without history or FAQ retrieval.
    pub fn build_simple(&self, user_message: &str) -> Vec<PromptSegment> {
        let system_prompt =
            SYSTEM_PROMPT_TEMPLATE.replace("{faq_knowledge_base}", NO_FAQ_PLACEHOLDER);

        vec![
            PromptSegment::new(MessageRole::System, system_prompt),
            PromptSegment::new(MessageRole::User, user_message),
        ]
    }

    pub fn estimate_prompt_tokens(
        &self,
        user_message: &str,
        faqs: &[FaqEntry],
        history: &[Message],
    ) -> usize {
        estimate_total_tokens(&self.build(user_message, faqs, history))
    }

    fn format_faqs(&self, faqs: &[FaqEntry]) -> String {
        if faqs.is_empty() {
            return NO_FAQ_PLACEHOLDER.to_string();
        }

        faqs.iter()
            .take(self.max_faqs)
            .enumerate()
            .map(|(i, faq)| {
                let category = faq.category.as_deref().unwrap_or("general");
                format!(
                    "Q{n}: [{category}] {question}\nA{n}: {answer}",
                    n = i + 1,
                    question = faq.question,
                    answer = faq.answer
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// History as role/content segments, chronological, system rows excluded.
fn format_history(history: &[Message]) -> Vec<PromptSegment> {
    history
        .iter()
        .filter(|msg| msg.role != MessageRole::System)
        .map(|msg| PromptSegment::new(msg.role, msg.content.clone()))
        .collect()
}

/// Walk history newest-first, accumulating until the budget would be
/// exceeded, then re-emit chronologically. Keeps at least the last two
/// segments when the input has them, even if those alone blow the budget.
fn truncate_history(segments: &[PromptSegment], max_tokens: usize) -> Vec<PromptSegment> {
    let mut kept: Vec<PromptSegment> = Vec::new();
    let mut token_count = 0;

    for segment in segments.iter().rev() {
        let segment_tokens = estimate_tokens(&segment.content);
        if token_count + segment_tokens > max_tokens {
            break;
        }
        kept.push(segment.clone());
        token_count += segment_tokens;
    }

    kept.reverse();

    if kept.len() < 2 && segments.len() >= 2 {
        return segments[segments.len() - 2..].to_vec();
    }

    kept
}

/// Coarse fallback when the assembled prompt still exceeds the global cap:
/// keep the system segment and the final five segments. This can drop the
/// distinction of the current user turn; it is a documented blunt instrument,
/// not a precise truncation.
fn aggressive_trim(segments: Vec<PromptSegment>) -> Vec<PromptSegment> {
    let system = segments[0].clone();
    let tail_start = segments.len().saturating_sub(AGGRESSIVE_TRIM_KEEP);
    let mut trimmed = vec![system];
    trimmed.extend(segments[tail_start..].iter().cloned());
    trimmed
}

/// Cheap token heuristic: one token per four characters, rounded up. Avoids
/// a tokenizer dependency at the cost of precision.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn estimate_total_tokens(segments: &[PromptSegment]) -> usize {
    segments
        .iter()
        .map(|segment| estimate_tokens(&segment.content))
        .sum()
}
