use ledger_chat::{AppConfig, ChatService};
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_COMMAND: &str = "Exit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let group_id: u64 = std::env::args()
        .nth(1)
        .ok_or("usage: ledger-chat <group_id>")?
        .parse()
        .map_err(|e| format!("group_id must be a number: {}", e))?;

    let config = AppConfig::load()?;
    let service = ChatService::from_config(&config)?;

    let group_name = match service.ledger().fetch_group(group_id).await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "Could not fetch group name");
            format!("group {}", group_id)
        }
    };

    let session = service.open_session(group_id).await?;
    info!(session_id = %session.session_id, documents = session.documents, "Session ready");

    println!("Chatting about {} ({} documents). Type '{}' to quit.", group_name, session.documents, EXIT_COMMAND);

    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();

    loop {
        out.write_all(b"\n> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question == EXIT_COMMAND {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match service.ask(session.session_id, question).await {
            Ok(answer) => println!("{}", answer),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    service.close_session(session.session_id).await?;
    Ok(())
}
