pub mod ask;
pub mod chat;
pub mod init;
pub mod serve;

use docchat_agent::{Services, TurnEvent};
use docchat_config::AppConfig;
use docchat_tools::{HttpPageFetcher, PageFetcher, clean_html};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;

/// Load config and refuse to go on without an API key.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    DOCCHAT_API_KEY   (generic)");
        eprintln!("    GROQ_API_KEY      (Groq, the default provider)");
        eprintln!("    OPENAI_API_KEY    (OpenAI)");
        eprintln!();
        eprintln!("  Or run `docchat init` and add it to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

/// The given session id, or a fresh one.
pub fn session_or_new(session: Option<String>) -> String {
    session
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Ingest each source into the session. Files are read as text and named by
/// their file name; URLs are fetched, cleaned and named by the URL.
pub async fn ingest_sources(
    services: &Services,
    config: &AppConfig,
    session_id: &str,
    sources: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = if sources.iter().any(|s| is_url(s)) {
        Some(HttpPageFetcher::new(docchat_tools::http_client(&config.scrape)?))
    } else {
        None
    };

    for source in sources {
        let (name, text) = match &fetcher {
            Some(fetcher) if is_url(source) => {
                let html = fetcher.fetch(source).await?;
                (source.clone(), clean_html(&html))
            }
            _ => {
                let path = std::path::Path::new(source);
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| format!("Failed to read {source}: {e}"))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| source.clone());
                (name, text)
            }
        };

        let chunks = services.ingestor.ingest(session_id, &name, &text).await?;
        info!(session_id = %session_id, source = %name, chunks, "Ingested source");
    }
    Ok(())
}

/// Print a streaming turn: status lines on stderr, tokens on stdout.
/// Returns `false` if the turn ended with an error event.
pub async fn render_stream(
    mut rx: mpsc::Receiver<TurnEvent>,
    prefix: &str,
) -> std::io::Result<bool> {
    let mut stdout = tokio::io::stdout();
    let mut started = false;

    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Status(status) => eprintln!("  [{status}...]"),
            TurnEvent::Token(token) => {
                if !started {
                    stdout.write_all(prefix.as_bytes()).await?;
                    started = true;
                }
                stdout.write_all(token.as_bytes()).await?;
                stdout.flush().await?;
            }
            TurnEvent::Heartbeat => {}
            TurnEvent::Done => {
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                return Ok(true);
            }
            TurnEvent::Error(message) => {
                if started {
                    stdout.write_all(b"\n").await?;
                }
                eprintln!("  [Error] {message}");
                return Ok(false);
            }
        }
    }

    Ok(false)
}
