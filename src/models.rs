use serde::{Deserialize, Serialize};

/// Remote run states, collapsed for our purposes: everything that is not
/// terminal keeps the poll loop going.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// One grounding marker inside generated text. `text` is the exact substring
/// the assistant inserted; `file_citation` is present only for annotations
/// that point at a retrieved document chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCitation {
    pub file_id: String,
}

/// The text of a completed run plus its ordered annotation list.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub annotations: Vec<Annotation>,
}

/// A document citation resolved to its source file. Ordinals are 1-based and
/// follow annotation order, which matches order of first appearance in the
/// answer text.
#[derive(Debug, Clone)]
pub struct ResolvedCitation {
    pub ordinal: usize,
    pub marker_text: String,
    pub file_id: String,
    pub filename: String,
}

/// One rendered citation: the inline superscript reference and the matching
/// entry in the appended Sources block share this data.
#[derive(Debug, Clone)]
pub struct SourceCard {
    pub ordinal: usize,
    pub display_name: String,
    pub viewer_url: String,
    pub phrase: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    pub rating: serde_json::Value,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResponse {
    pub status: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Expired.is_terminal());
    }

    #[test]
    fn unknown_status_keeps_polling() {
        let status: RunStatus = serde_json::from_str("\"some_future_state\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_terminal());
    }

    #[test]
    fn annotation_without_citation_deserializes() {
        let raw = r#"{"type":"file_path","text":"[marker]"}"#;
        let annotation: Annotation = serde_json::from_str(raw).unwrap();
        assert_eq!(annotation.text, "[marker]");
        assert!(annotation.file_citation.is_none());
    }

    #[test]
    fn annotation_with_citation_deserializes() {
        let raw = r#"{"type":"file_citation","text":"【4:0†src】","file_citation":{"file_id":"file-abc"}}"#;
        let annotation: Annotation = serde_json::from_str(raw).unwrap();
        assert_eq!(
            annotation.file_citation.as_ref().map(|c| c.file_id.as_str()),
            Some("file-abc")
        );
    }
}
