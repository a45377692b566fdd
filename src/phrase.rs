use crate::assistant::AssistantClient;
use crate::config::PhraseConfig;

const PHRASE_SYSTEM_PROMPT: &str = "\
You extract verbatim quotes. When given a question, an AI answer, and the name \
of the source document the answer was based on, return ONE phrase of 20-35 \
words that most likely appears word-for-word in that document. The phrase MUST \
be unique enough to appear only ONCE in the document - avoid short phrases, \
generic headings, or common words that could repeat many times. Pick a full \
sentence or clause with specific, distinctive terminology. Return ONLY the \
phrase itself - no quotes, no explanation, no punctuation around it.";

/// Derives the search phrase the viewer uses to auto-locate and highlight the
/// cited passage. One call per distinct cited document, not per citation.
#[derive(Clone)]
pub struct PhraseLocator {
    assistant: AssistantClient,
    config: PhraseConfig,
}

impl PhraseLocator {
    pub fn new(assistant: AssistantClient, config: PhraseConfig) -> Self {
        Self { assistant, config }
    }

    /// Best-effort: any upstream failure degrades to an empty phrase so the
    /// citation links still render, just without auto-highlight.
    pub async fn locate(&self, question: &str, answer_text: &str, filename: &str) -> String {
        let user_prompt = format!(
            "Question: {question}\n\nAnswer: {answer_text}\n\nSource document: {filename}"
        );

        match self
            .assistant
            .complete(
                &self.config.model,
                PHRASE_SYSTEM_PROMPT,
                &user_prompt,
                self.config.max_tokens,
            )
            .await
        {
            Ok(raw) => {
                let phrase = sanitize_phrase(&raw);
                tracing::debug!("located phrase for {}: \"{}\"", filename, phrase);
                phrase
            }
            Err(err) => {
                tracing::warn!("phrase location failed for {}: {:#}", filename, err);
                String::new()
            }
        }
    }
}

/// The viewer searches for the phrase literally, so wrapping quotes or stray
/// newlines from the model would break the match.
fn sanitize_phrase(raw: &str) -> String {
    let mut phrase = raw.trim();

    loop {
        let stripped = phrase
            .strip_prefix('"')
            .and_then(|p| p.strip_suffix('"'))
            .or_else(|| phrase.strip_prefix('\'').and_then(|p| p.strip_suffix('\'')))
            .or_else(|| {
                phrase
                    .strip_prefix('\u{201C}')
                    .and_then(|p| p.strip_suffix('\u{201D}'))
            });

        match stripped {
            Some(inner) => phrase = inner.trim(),
            None => break,
        }
    }

    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(sanitize_phrase("\"the filing deadline is May 1\""), "the filing deadline is May 1");
        assert_eq!(sanitize_phrase("'single quoted'"), "single quoted");
        assert_eq!(
            sanitize_phrase("\u{201C}curly quoted phrase\u{201D}"),
            "curly quoted phrase"
        );
    }

    #[test]
    fn strips_nested_quote_pairs() {
        assert_eq!(sanitize_phrase("\"'double wrapped'\""), "double wrapped");
    }

    #[test]
    fn keeps_interior_quotes() {
        assert_eq!(
            sanitize_phrase("the term \"fast track\" means expedited review"),
            "the term \"fast track\" means expedited review"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            sanitize_phrase("  spread \n across\t lines  "),
            "spread across lines"
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_phrase(""), "");
        assert_eq!(sanitize_phrase("\"\""), "");
    }
}
