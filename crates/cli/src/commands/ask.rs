//! `docchat ask` — Answer one question and exit.

use docchat_agent::TurnRequest;

use super::{ingest_sources, load_config, render_stream, session_or_new};

pub async fn run(
    query: String,
    session: Option<String>,
    files: Vec<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let services = docchat_agent::build_services(&config).await?;

    let session_id = session_or_new(session);
    ingest_sources(&services, &config, &session_id, &files).await?;

    let request = TurnRequest::new(query, session_id.clone(), None);

    if stream {
        let rx = services.orchestrator.run_turn_stream(request).await?;
        if !render_stream(rx, "").await? {
            return Err("The turn failed".into());
        }
    } else {
        let outcome = services.orchestrator.ask(request).await;
        if outcome.code != 200 {
            return Err(outcome.answer.into());
        }
        println!("{}", outcome.answer);
    }

    eprintln!("  session: {session_id}");
    Ok(())
}
