use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use citebot::assistant::AssistantClient;
use citebot::config::AssistantConfig;

#[derive(Parser, Debug)]
#[command(name = "add_file")]
#[command(about = "Upload one more document into the assistant's vector store")]
struct Cli {
    #[arg(long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AssistantConfig::bootstrap_from_env()?;
    if config.assistant_id.trim().is_empty() {
        anyhow::bail!("ASSISTANT_ID must be set; run setup first");
    }
    let client = AssistantClient::new(config);

    let stores = client.assistant_vector_stores().await?;
    let Some(store_id) = stores.first() else {
        anyhow::bail!(
            "assistant {} has no file_search vector store attached",
            client.assistant_id()
        );
    };
    println!("Found vector store: {store_id}");

    let file_id = client.upload_file(&cli.file).await?;
    println!("Uploaded {} as {}", cli.file.display(), file_id);

    let batch_id = client.attach_files(store_id, &[file_id]).await?;
    for _ in 0..600 {
        let batch = client.file_batch(store_id, &batch_id).await?;
        if batch.status != "in_progress" {
            println!(
                "Indexing {}: {}/{} files completed, {} failed",
                batch.status,
                batch.file_counts.completed,
                batch.file_counts.total,
                batch.file_counts.failed
            );
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    anyhow::bail!("file batch {batch_id} still in progress after 10 minutes")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
