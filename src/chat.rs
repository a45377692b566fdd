use std::collections::{HashMap, HashSet};
use std::time::Instant;

use anyhow::Result;

use crate::assistant::AssistantClient;
use crate::config::PollConfig;
use crate::models::{Annotation, Answer, ChatRequest, ChatResponse, ResolvedCitation};
use crate::phrase::PhraseLocator;
use crate::rewrite::rewrite_answer;

#[derive(Clone)]
pub struct ChatService {
    assistant: AssistantClient,
    locator: PhraseLocator,
    poll: PollConfig,
}

impl ChatService {
    pub fn new(assistant: AssistantClient, locator: PhraseLocator, poll: PollConfig) -> Self {
        Self {
            assistant,
            locator,
            poll,
        }
    }

    /// One chat turn: resolve the session, run the assistant to completion,
    /// then turn grounding annotations into clickable references.
    pub async fn answer(&self, request: ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();

        let thread_id = self.resolve_session(request.thread_id).await?;
        let answer = self
            .assistant
            .invoke(&thread_id, &request.message, &self.poll)
            .await?;

        let citations = self.resolve_citations(&answer).await;
        let phrases = self
            .locate_phrases(&request.message, &answer.text, &citations)
            .await;
        let rewritten = rewrite_answer(&answer.text, &citations, &phrases);

        tracing::info!(
            "answered on thread {} with {} citation(s) across {} document(s) in {}ms",
            thread_id,
            citations.len(),
            phrases.len(),
            started.elapsed().as_millis()
        );

        Ok(ChatResponse {
            response: rewritten.html,
            thread_id,
        })
    }

    /// Absent or blank token means a new remote thread; anything else passes
    /// through untouched. An invalid token fails later, when the service
    /// rejects it.
    pub async fn resolve_session(&self, token: Option<String>) -> Result<String> {
        match normalize_token(token) {
            Some(token) => Ok(token),
            None => self.assistant.create_thread().await,
        }
    }

    /// Walk annotations in order and resolve each document citation to its
    /// filename. Non-document annotations are skipped, and a failed file
    /// lookup drops that citation rather than failing the turn; either way
    /// the marker text stays verbatim in the output.
    async fn resolve_citations(&self, answer: &Answer) -> Vec<ResolvedCitation> {
        let mut citations = Vec::new();

        for annotation in document_annotations(&answer.annotations) {
            let Some(citation) = &annotation.file_citation else {
                continue;
            };

            match self.assistant.file_name(&citation.file_id).await {
                Ok(filename) => {
                    citations.push(ResolvedCitation {
                        ordinal: citations.len() + 1,
                        marker_text: annotation.text.clone(),
                        file_id: citation.file_id.clone(),
                        filename,
                    });
                }
                Err(err) => {
                    tracing::warn!("dropping citation for file {}: {:#}", citation.file_id, err);
                }
            }
        }

        citations
    }

    /// One locate call per distinct cited document. Responses without any
    /// document citation never reach the locator.
    async fn locate_phrases(
        &self,
        question: &str,
        answer_text: &str,
        citations: &[ResolvedCitation],
    ) -> HashMap<String, String> {
        let mut phrases = HashMap::new();

        for (file_id, filename) in distinct_documents(citations) {
            let phrase = self.locator.locate(question, answer_text, filename).await;
            phrases.insert(file_id.to_string(), phrase);
        }

        phrases
    }
}

/// First-appearance order of the distinct cited documents.
fn distinct_documents(citations: &[ResolvedCitation]) -> Vec<(&str, &str)> {
    let mut seen = HashSet::new();
    let mut documents = Vec::new();

    for citation in citations {
        if seen.insert(citation.file_id.as_str()) {
            documents.push((citation.file_id.as_str(), citation.filename.as_str()));
        }
    }

    documents
}

fn normalize_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

fn document_annotations(annotations: &[Annotation]) -> impl Iterator<Item = &Annotation> {
    annotations
        .iter()
        .filter(|annotation| annotation.file_citation.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileCitation;

    fn annotation(text: &str, file_id: Option<&str>) -> Annotation {
        Annotation {
            text: text.to_string(),
            file_citation: file_id.map(|id| FileCitation {
                file_id: id.to_string(),
            }),
        }
    }

    #[test]
    fn blank_tokens_mean_new_session() {
        assert_eq!(normalize_token(None), None);
        assert_eq!(normalize_token(Some(String::new())), None);
        assert_eq!(normalize_token(Some("   ".to_string())), None);
        assert_eq!(
            normalize_token(Some("thread_abc".to_string())).as_deref(),
            Some("thread_abc")
        );
    }

    #[test]
    fn non_document_annotations_are_skipped() {
        let annotations = vec![
            annotation("[a]", Some("file-1")),
            annotation("[b]", None),
            annotation("[c]", Some("file-2")),
        ];

        let kept: Vec<&str> = document_annotations(&annotations)
            .map(|a| a.text.as_str())
            .collect();
        assert_eq!(kept, vec!["[a]", "[c]"]);
    }

    fn resolved(ordinal: usize, file_id: &str, filename: &str) -> ResolvedCitation {
        ResolvedCitation {
            ordinal,
            marker_text: format!("[m{ordinal}]"),
            file_id: file_id.to_string(),
            filename: filename.to_string(),
        }
    }

    #[test]
    fn one_locate_target_per_distinct_document() {
        let citations = vec![
            resolved(1, "file-a", "handbook.pdf"),
            resolved(2, "file-a", "handbook.pdf"),
            resolved(3, "file-b", "fees.pdf"),
        ];

        let documents = distinct_documents(&citations);
        assert_eq!(
            documents,
            vec![("file-a", "handbook.pdf"), ("file-b", "fees.pdf")]
        );
    }

    #[test]
    fn no_citations_means_no_locate_targets() {
        assert!(distinct_documents(&[]).is_empty());
    }

    #[test]
    fn annotation_order_is_preserved() {
        let annotations = vec![
            annotation("[later]", Some("file-2")),
            annotation("[earlier]", Some("file-1")),
        ];

        let kept: Vec<&str> = document_annotations(&annotations)
            .map(|a| a.text.as_str())
            .collect();
        assert_eq!(kept, vec!["[later]", "[earlier]"]);
    }
}
