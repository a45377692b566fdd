use anyhow::Result;
use tracing_subscriber::EnvFilter;

use citebot::assistant::AssistantClient;
use citebot::chat::ChatService;
use citebot::feedback::FeedbackSink;
use citebot::phrase::PhraseLocator;
use citebot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    let assistant = AssistantClient::new(config.assistant.clone());
    let locator = PhraseLocator::new(assistant.clone(), config.phrase.clone());
    let chat = ChatService::new(assistant, locator, config.poll.clone());
    let feedback = FeedbackSink::new(config.feedback_sink_url.clone());

    run_server(config, chat, feedback).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
