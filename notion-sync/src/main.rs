use anyhow::Context;
use notion_core::NotionClient;
use notion_sync::config::SyncConfig;
use notion_sync::logging::init_logging;
use notion_sync::render::MarkdownRenderer;
use notion_sync::sync::blob::FsBlobStore;
use notion_sync::sync::engine::SyncEngine;
use notion_sync::sync::manifest::ManifestStore;
use notion_sync::sync::source::NotionSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

fn error_payload(err: &anyhow::Error) -> String {
    serde_json::json!({ "error": format!("{err:#}") }).to_string()
}

async fn run() -> anyhow::Result<()> {
    if parse_cli_mode(std::env::args())? == CliMode::Help {
        println!("Usage: notion-sync");
        println!("  Mirrors every page shared with NOTION_TOKEN into NOTION_SYNC_WORKSPACE.");
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    let client = match &config.api_base_url {
        Some(base) => NotionClient::with_base_url(base, &config.token),
        None => NotionClient::new(&config.token),
    }
    .context("failed to build Notion client")?;

    tokio::fs::create_dir_all(&config.workspace_root)
        .await
        .with_context(|| {
            format!(
                "failed to create workspace at {}",
                config.workspace_root.display()
            )
        })?;

    let engine = SyncEngine::new(
        NotionSource::new(client.clone()),
        MarkdownRenderer::new(client),
        FsBlobStore::new(&config.workspace_root),
    )
    .with_manifest_store(ManifestStore::new(&config.manifest_key));
    engine.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();
    // Failures are reported as data on stdout; the exit status stays 0.
    if let Err(err) = run().await {
        tracing::error!("sync failed: {err:#}");
        println!("{}", error_payload(&err));
    }
}
