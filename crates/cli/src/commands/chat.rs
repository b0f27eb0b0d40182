//! `docchat chat` — Interactive streaming chat on one session.

use docchat_agent::TurnRequest;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{ingest_sources, load_config, render_stream, session_or_new};

pub async fn run(
    session: Option<String>,
    files: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let services = docchat_agent::build_services(&config).await?;

    let session_id = session_or_new(session);
    ingest_sources(&services, &config, &session_id, &files).await?;

    println!();
    println!("  docchat — Interactive Mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.models.chat_model);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("  You > ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        let request = TurnRequest::new(query, session_id.clone(), None);
        match services.orchestrator.run_turn_stream(request).await {
            Ok(rx) => {
                render_stream(rx, "  Assistant > ").await?;
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!("  Resume with: docchat chat --session {session_id}");
    Ok(())
}
