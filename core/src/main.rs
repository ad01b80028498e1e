/// LifeLink chat terminal client - main entry point
use colored::*;
use lifelink_chat::{ChatSession, Config, HttpChatApi};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let token = env::var("LIFELINK_TOKEN")
        .map_err(|_| anyhow::anyhow!("LIFELINK_TOKEN must be set"))?;
    let user_id = env::var("LIFELINK_USER_ID")
        .map_err(|_| anyhow::anyhow!("LIFELINK_USER_ID must be set"))?;

    let api = Arc::new(HttpChatApi::new(&config.api_base, &token));
    let session = Arc::new(ChatSession::new(config, api, &user_id));

    info!("Starting LifeLink chat session for {}", user_id);
    session.start(&token);

    if let Err(e) = session.fetch_conversations().await {
        eprintln!("{} {}", "✗".red().bold(), format!("Could not load conversations: {}", e).red());
    }
    print_conversations(&session).await;
    print_usage();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                handle_command(&session, line.trim()).await;
                for alert in session.relay().take_alerts() {
                    println!("{} {}", "!".yellow().bold(), alert.text.yellow());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    session.dispose().await;
    info!("Session ended");
    Ok(())
}

fn print_usage() {
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <conversation_id>         Open a conversation", "open".cyan());
    println!("  {} <receiver_id> <text...>   Send a message", "send".cyan());
    println!("  {}                           List conversations", "list".cyan());
    println!("  {}                           Show active messages", "show".cyan());
    println!("  {}                           Quit", "quit".cyan());
}

async fn print_conversations(session: &ChatSession) {
    for conv in session.conversations().await {
        let unread = if conv.unread_count > 0 {
            format!(" ({} unread)", conv.unread_count).red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{} - {}",
            conv.id.cyan(),
            conv.participant_name.bright_white(),
            unread,
            conv.last_message.dimmed()
        );
    }
}

async fn handle_command(session: &ChatSession, line: &str) {
    let mut parts = line.splitn(3, ' ');
    match parts.next().unwrap_or("") {
        "open" => {
            let Some(id) = parts.next() else {
                eprintln!("{}", "Usage: open <conversation_id>".yellow());
                return;
            };
            match session.select_conversation(id).await {
                Ok(()) => {
                    for msg in session.messages().await {
                        let body = msg
                            .display_content()
                            .unwrap_or("(message deleted)")
                            .to_string();
                        println!("  {} {}", msg.sender_id.cyan(), body);
                    }
                }
                Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
            }
        }
        "send" => {
            let (Some(receiver), Some(text)) = (parts.next(), parts.next()) else {
                eprintln!("{}", "Usage: send <receiver_id> <text...>".yellow());
                return;
            };
            session.keystroke();
            if let Err(e) = session.send_message(receiver, text).await {
                eprintln!("{} {}", "✗".red().bold(), e);
                if let Some(draft) = session.take_failed_draft().await {
                    eprintln!("  draft kept: {}", draft.dimmed());
                }
            }
        }
        "list" => {
            if let Err(e) = session.fetch_conversations().await {
                eprintln!("{} {}", "✗".red().bold(), e);
            }
            print_conversations(session).await;
        }
        "show" => {
            let typing = session.typing_state();
            if typing.is_typing {
                if let Some(name) = typing.typing_user_name {
                    println!("{}", format!("{} is typing...", name).dimmed());
                }
            }
            for msg in session.messages().await {
                let body = msg
                    .display_content()
                    .unwrap_or("(message deleted)")
                    .to_string();
                println!("  {} {}", msg.sender_id.cyan(), body);
            }
        }
        "quit" | "exit" => {
            session.dispose().await;
            std::process::exit(0);
        }
        "" => {}
        other => eprintln!("{} Unknown command: {}", "✗".red().bold(), other.red()),
    }
}
