use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;

use crate::models::FeedbackRequest;

/// Append-only record sink for user feedback. Best-effort: rows are never
/// deduplicated and a failed append is reported, not retried.
#[derive(Clone)]
pub struct FeedbackSink {
    client: Client,
    url: Option<String>,
}

impl FeedbackSink {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub async fn record(&self, feedback: &FeedbackRequest) -> Result<()> {
        let Some(url) = &self.url else {
            tracing::error!("feedback sink URL is not configured");
            anyhow::bail!("Database configuration error.");
        };

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let payload = build_row(feedback, &timestamp);

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("failed to call feedback sink")?;

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 201 {
            tracing::info!("feedback row appended for thread {:?}", feedback.thread_id);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("feedback sink returned {}: {}", status, body.trim());
            anyhow::bail!("Unexpected API status")
        }
    }
}

fn build_row(feedback: &FeedbackRequest, timestamp: &str) -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "Timestamp": timestamp,
            "Thread ID": feedback.thread_id,
            "Rating": feedback.rating,
            "Comments": feedback.comments,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_carries_all_fields() {
        let feedback = FeedbackRequest {
            thread_id: Some("thread_1".to_string()),
            rating: serde_json::json!(5),
            comments: Some("very helpful".to_string()),
        };

        let row = build_row(&feedback, "2026-08-07 12:00:00");
        let entry = &row["data"][0];
        assert_eq!(entry["Timestamp"], "2026-08-07 12:00:00");
        assert_eq!(entry["Thread ID"], "thread_1");
        assert_eq!(entry["Rating"], 5);
        assert_eq!(entry["Comments"], "very helpful");
    }

    #[test]
    fn missing_thread_id_becomes_null() {
        let feedback = FeedbackRequest {
            thread_id: None,
            rating: serde_json::json!("thumbs_up"),
            comments: None,
        };

        let row = build_row(&feedback, "2026-08-07 12:00:00");
        let entry = &row["data"][0];
        assert!(entry["Thread ID"].is_null());
        assert_eq!(entry["Rating"], "thumbs_up");
        assert!(entry["Comments"].is_null());
    }

    #[test]
    fn identical_rows_are_independent() {
        let feedback = FeedbackRequest {
            thread_id: Some("t".to_string()),
            rating: serde_json::json!(1),
            comments: Some("dup".to_string()),
        };

        let first = build_row(&feedback, "2026-08-07 12:00:00");
        let second = build_row(&feedback, "2026-08-07 12:00:00");
        assert_eq!(first, second);
        assert_eq!(first["data"].as_array().unwrap().len(), 1);
    }
}
