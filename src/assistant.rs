use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AssistantConfig, PollConfig};
use crate::models::{Annotation, Answer, RunStatus};

/// Format contract injected into every run. The assistant service is expected
/// to honor it; nothing here enforces it.
const ANSWER_FORMAT_INSTRUCTIONS: &str = "\
Every response must follow this exact structure - no exceptions:\n\
\n\
1. One short opening sentence answering the question directly.\n\
2. A bullet point list of key details (always use bullets, even for 1 item).\n\
3. If there are steps, use a numbered list.\n\
4. End with one short closing sentence if needed, otherwise stop.\n\
\n\
Always use **bold** for key terms. Never write paragraphs. Never add intros \
like \"Great question!\" or outros like \"I hope this helps!\".";

/// Terminal outcomes of a run that are request failures. The display strings
/// become the `detail` field of the HTTP error body.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Run Failed")]
    RunFailed,
    #[error("Run Cancelled")]
    RunCancelled,
    #[error("Run Timed Out")]
    RunTimedOut,
}

#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.config.assistant_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Create a fresh conversation thread and return its identifier.
    pub async fn create_thread(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct ThreadResp {
            id: String,
        }

        let response = self
            .request(Method::POST, "/threads")
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("failed to call thread create endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("thread create returned {status}: {}", api_error_body(&body));
        }

        let response = response
            .json::<ThreadResp>()
            .await
            .context("failed to decode thread create response")?;

        Ok(response.id)
    }

    /// Send a user message, run the assistant, and poll to a terminal state.
    /// `failed` and `cancelled` runs surface as [`InvokeError`]; so does a run
    /// that outlives the configured deadline or attempt cap.
    pub async fn invoke(&self, thread_id: &str, message: &str, poll: &PollConfig) -> Result<Answer> {
        self.append_message(thread_id, message).await?;
        let (run_id, status) = self.create_run(thread_id).await?;
        let status = self.poll_run(thread_id, &run_id, status, poll).await?;

        match status {
            RunStatus::Completed => self.latest_answer(thread_id).await,
            RunStatus::Cancelled => Err(InvokeError::RunCancelled.into()),
            _ => Err(InvokeError::RunFailed.into()),
        }
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()> {
        #[derive(Serialize)]
        struct MessageReq<'a> {
            role: &'a str,
            content: &'a str,
        }

        self.request(Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&MessageReq {
                role: "user",
                content,
            })
            .send()
            .await
            .context("failed to call message create endpoint")?
            .error_for_status()
            .context("message create returned non-success status")?;

        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> Result<(String, RunStatus)> {
        #[derive(Serialize)]
        struct RunReq<'a> {
            assistant_id: &'a str,
            additional_instructions: &'a str,
        }

        #[derive(Deserialize)]
        struct RunResp {
            id: String,
            status: RunStatus,
        }

        let response = self
            .request(Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&RunReq {
                assistant_id: &self.config.assistant_id,
                additional_instructions: ANSWER_FORMAT_INSTRUCTIONS,
            })
            .send()
            .await
            .context("failed to call run create endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("run create returned {status}: {}", api_error_body(&body));
        }

        let response = response
            .json::<RunResp>()
            .await
            .context("failed to decode run create response")?;

        Ok((response.id, response.status))
    }

    /// Fixed-interval poll, bounded by both a wall-clock deadline and an
    /// attempt cap so an upstream stall cannot hang the request forever.
    async fn poll_run(
        &self,
        thread_id: &str,
        run_id: &str,
        initial: RunStatus,
        poll: &PollConfig,
    ) -> Result<RunStatus> {
        let started = Instant::now();
        let mut status = initial;

        for _ in 0..poll.max_attempts {
            if status.is_terminal() {
                return Ok(status);
            }
            if started.elapsed() >= poll.deadline() {
                break;
            }

            tokio::time::sleep(poll.interval()).await;
            status = self.run_status(thread_id, run_id).await?;
        }

        if status.is_terminal() {
            return Ok(status);
        }

        tracing::warn!(
            "run {} on thread {} still {:?} after {:?}; giving up",
            run_id,
            thread_id,
            status,
            started.elapsed()
        );
        Err(InvokeError::RunTimedOut.into())
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        #[derive(Deserialize)]
        struct RunResp {
            status: RunStatus,
        }

        let response = self
            .request(Method::GET, &format!("/threads/{thread_id}/runs/{run_id}"))
            .send()
            .await
            .context("failed to call run retrieve endpoint")?
            .error_for_status()
            .context("run retrieve returned non-success status")?
            .json::<RunResp>()
            .await
            .context("failed to decode run retrieve response")?;

        Ok(response.status)
    }

    /// Newest message on the thread; its first text block carries the answer
    /// and the annotation list.
    async fn latest_answer(&self, thread_id: &str) -> Result<Answer> {
        #[derive(Deserialize)]
        struct MessageList {
            data: Vec<MessageObject>,
        }

        #[derive(Deserialize)]
        struct MessageObject {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            kind: String,
            text: Option<TextPayload>,
        }

        #[derive(Deserialize)]
        struct TextPayload {
            value: String,
            #[serde(default)]
            annotations: Vec<Annotation>,
        }

        let response = self
            .request(
                Method::GET,
                &format!("/threads/{thread_id}/messages?limit=1&order=desc"),
            )
            .send()
            .await
            .context("failed to call message list endpoint")?
            .error_for_status()
            .context("message list returned non-success status")?
            .json::<MessageList>()
            .await
            .context("failed to decode message list response")?;

        let message = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("thread {thread_id} has no messages after run"))?;

        let text = message
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| anyhow::anyhow!("assistant reply contained no text content"))?;

        Ok(Answer {
            text: text.value,
            annotations: text.annotations,
        })
    }

    /// Display filename for a cited file id.
    pub async fn file_name(&self, file_id: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct FileResp {
            filename: String,
        }

        let response = self
            .request(Method::GET, &format!("/files/{file_id}"))
            .send()
            .await
            .context("failed to call file retrieve endpoint")?
            .error_for_status()
            .context("file retrieve returned non-success status")?
            .json::<FileResp>()
            .await
            .context("failed to decode file retrieve response")?;

        Ok(response.filename)
    }

    /// One-shot chat completion with deterministic sampling. Used by the
    /// phrase locator, which needs temperature 0 and a tight max_tokens cap.
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: usize,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct CompletionReq<'a> {
            model: &'a str,
            max_tokens: usize,
            temperature: f32,
            messages: Vec<CompletionMessage<'a>>,
        }

        #[derive(Serialize)]
        struct CompletionMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct CompletionResp {
            choices: Vec<CompletionChoice>,
        }

        #[derive(Deserialize)]
        struct CompletionChoice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let response = self
            .request(Method::POST, "/chat/completions")
            .json(&CompletionReq {
                model,
                max_tokens,
                temperature: 0.0,
                messages: vec![
                    CompletionMessage {
                        role: "system",
                        content: system_prompt,
                    },
                    CompletionMessage {
                        role: "user",
                        content: user_prompt,
                    },
                ],
            })
            .send()
            .await
            .context("failed to call chat completions endpoint")?
            .error_for_status()
            .context("chat completions returned non-success status")?
            .json::<CompletionResp>()
            .await
            .context("failed to decode chat completions response")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("chat completions returned no choices"))?;

        Ok(choice.message.content.trim().to_string())
    }

    /// Upload one document for assistant retrieval and return its file id.
    pub async fn upload_file(&self, path: &std::path::Path) -> Result<String> {
        #[derive(Deserialize)]
        struct FileResp {
            id: String,
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );

        let response = self
            .request(Method::POST, "/files")
            .multipart(form)
            .send()
            .await
            .context("failed to call file upload endpoint")?
            .error_for_status()
            .context("file upload returned non-success status")?
            .json::<FileResp>()
            .await
            .context("failed to decode file upload response")?;

        Ok(response.id)
    }

    pub async fn create_vector_store(&self, name: &str) -> Result<String> {
        #[derive(Serialize)]
        struct StoreReq<'a> {
            name: &'a str,
        }

        #[derive(Deserialize)]
        struct StoreResp {
            id: String,
        }

        let response = self
            .request(Method::POST, "/vector_stores")
            .json(&StoreReq { name })
            .send()
            .await
            .context("failed to call vector store create endpoint")?
            .error_for_status()
            .context("vector store create returned non-success status")?
            .json::<StoreResp>()
            .await
            .context("failed to decode vector store create response")?;

        Ok(response.id)
    }

    /// Start indexing the given uploaded files into a vector store.
    pub async fn attach_files(&self, vector_store_id: &str, file_ids: &[String]) -> Result<String> {
        #[derive(Serialize)]
        struct BatchReq<'a> {
            file_ids: &'a [String],
        }

        #[derive(Deserialize)]
        struct BatchResp {
            id: String,
        }

        let response = self
            .request(
                Method::POST,
                &format!("/vector_stores/{vector_store_id}/file_batches"),
            )
            .json(&BatchReq { file_ids })
            .send()
            .await
            .context("failed to call file batch create endpoint")?
            .error_for_status()
            .context("file batch create returned non-success status")?
            .json::<BatchResp>()
            .await
            .context("failed to decode file batch create response")?;

        Ok(response.id)
    }

    pub async fn file_batch(&self, vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        self.request(
            Method::GET,
            &format!("/vector_stores/{vector_store_id}/file_batches/{batch_id}"),
        )
        .send()
        .await
        .context("failed to call file batch retrieve endpoint")?
        .error_for_status()
        .context("file batch retrieve returned non-success status")?
        .json::<FileBatch>()
        .await
        .context("failed to decode file batch retrieve response")
    }

    pub async fn create_assistant(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
        vector_store_id: &str,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct AssistantResp {
            id: String,
        }

        let body = serde_json::json!({
            "name": name,
            "instructions": instructions,
            "model": model,
            "tools": [{"type": "file_search"}],
            "tool_resources": {
                "file_search": {"vector_store_ids": [vector_store_id]}
            }
        });

        let response = self
            .request(Method::POST, "/assistants")
            .json(&body)
            .send()
            .await
            .context("failed to call assistant create endpoint")?
            .error_for_status()
            .context("assistant create returned non-success status")?
            .json::<AssistantResp>()
            .await
            .context("failed to decode assistant create response")?;

        Ok(response.id)
    }

    /// Vector store ids wired to the configured assistant's file_search tool.
    pub async fn assistant_vector_stores(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct AssistantResp {
            #[serde(default)]
            tool_resources: Option<ToolResources>,
        }

        #[derive(Deserialize)]
        struct ToolResources {
            #[serde(default)]
            file_search: Option<FileSearchResources>,
        }

        #[derive(Deserialize)]
        struct FileSearchResources {
            #[serde(default)]
            vector_store_ids: Vec<String>,
        }

        let response = self
            .request(
                Method::GET,
                &format!("/assistants/{}", self.config.assistant_id),
            )
            .send()
            .await
            .context("failed to call assistant retrieve endpoint")?
            .error_for_status()
            .context("assistant retrieve returned non-success status")?
            .json::<AssistantResp>()
            .await
            .context("failed to decode assistant retrieve response")?;

        Ok(response
            .tool_resources
            .and_then(|r| r.file_search)
            .map(|f| f.vector_store_ids)
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
pub struct FileBatch {
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub total: u32,
}

fn api_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }

    trimmed.to_string()
}
