use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use citebot::assistant::AssistantClient;
use citebot::config::AssistantConfig;

const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful assistant. Use HTML for formatting.";

#[derive(Parser, Debug)]
#[command(name = "setup")]
#[command(about = "Provision the assistant: vector store, document uploads, assistant identity")]
struct Cli {
    #[arg(long, default_value = "./data_files")]
    data_dir: PathBuf,
    #[arg(long, default_value = "citebot_documents")]
    store_name: String,
    #[arg(long, default_value = "Document Assistant")]
    assistant_name: String,
    #[arg(long, default_value = "gpt-4o")]
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AssistantConfig::bootstrap_from_env()?;
    let client = AssistantClient::new(config);

    let store_id = client.create_vector_store(&cli.store_name).await?;
    println!("Vector store created: {store_id}");

    let mut file_ids = Vec::new();
    let mut entries = tokio::fs::read_dir(&cli.data_dir)
        .await
        .with_context(|| format!("failed to read {}", cli.data_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_id = client.upload_file(&path).await?;
        println!("Uploaded {} as {}", path.display(), file_id);
        file_ids.push(file_id);
    }

    if file_ids.is_empty() {
        anyhow::bail!("no files found under {}", cli.data_dir.display());
    }

    let batch_id = client.attach_files(&store_id, &file_ids).await?;
    let batch = wait_for_batch(&client, &store_id, &batch_id).await?;
    println!(
        "Indexing {}: {}/{} files completed, {} failed",
        batch.status, batch.file_counts.completed, batch.file_counts.total, batch.file_counts.failed
    );

    let assistant_id = client
        .create_assistant(
            &cli.assistant_name,
            &cli.model,
            ASSISTANT_INSTRUCTIONS,
            &store_id,
        )
        .await?;

    println!("--------------------------------------------------");
    println!("ASSISTANT_ID = \"{assistant_id}\"");
    println!("--------------------------------------------------");

    Ok(())
}

async fn wait_for_batch(
    client: &AssistantClient,
    store_id: &str,
    batch_id: &str,
) -> Result<citebot::assistant::FileBatch> {
    // Indexing is slow for large documents; cap the wait rather than loop forever.
    for _ in 0..600 {
        let batch = client.file_batch(store_id, batch_id).await?;
        if batch.status != "in_progress" {
            return Ok(batch);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    anyhow::bail!("file batch {batch_id} still in progress after 10 minutes")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
