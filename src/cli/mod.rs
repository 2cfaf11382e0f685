//! Command-line interface parsing and the line-oriented chat driver.
//!
//! The driver is deliberately plain: stdout is the display sink for response
//! chunks and status text, stdin supplies one message (or driver command) per
//! line. Input is not accepted while a turn stream is draining, which keeps
//! at most one send in flight.

use std::error::Error;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::Parser;
use futures_util::StreamExt;
use tokio::io::AsyncBufReadExt;
use tracing::warn;

use crate::core::backend::LocalBackend;
use crate::core::config::Config;
use crate::core::session::SessionManager;

const DEFAULT_MODEL: &str = "phi-3.5-mini";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";

#[derive(Parser)]
#[command(name = "locutor")]
#[command(about = "A terminal chat client for locally hosted language models")]
#[command(
    long_about = "Locutor connects to an OpenAI-compatible local model server \
(Foundry Local, llama.cpp server, Ollama's compatibility endpoint) and streams \
responses line by line.\n\n\
Commands while chatting:\n\
  /clear            Clear the conversation transcript\n\
  /save [path]      Save the transcript to a file\n\
  /summary          Show turn counts\n\
  /init             Retry backend initialization\n\
  /help             Show this command list\n\
  /quit             Exit"
)]
pub struct Args {
    /// Model to request from the backend
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible server
    #[arg(short = 'b', long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Driver commands typed with a leading slash. Anything else on a line is a
/// chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DriverCommand {
    Quit,
    Clear,
    Summary,
    Init,
    Save(Option<String>),
    Help,
    Unknown(String),
}

fn parse_command(input: &str) -> Option<DriverCommand> {
    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    Some(match name {
        "quit" | "q" | "exit" => DriverCommand::Quit,
        "clear" => DriverCommand::Clear,
        "summary" => DriverCommand::Summary,
        "init" => DriverCommand::Init,
        "save" => DriverCommand::Save(arg.map(str::to_string)),
        "help" => DriverCommand::Help,
        other => DriverCommand::Unknown(other.to_string()),
    })
}

/// Default transcript filename for `/save` without an argument.
fn default_save_path(dir: Option<&Path>, now: DateTime<Local>) -> PathBuf {
    let name = format!("conversation-{}.txt", now.format("%Y%m%d-%H%M%S"));
    match dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    crate::logging::init(args.verbose);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring unreadable config: {e}");
            Config::default()
        }
    };

    let base_url = args
        .base_url
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = args
        .model
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let backend = LocalBackend::new(&base_url);
    let mut session = SessionManager::new(backend, model);

    println!("{}", session.initialize().await);
    chat_loop(&mut session, config.transcript_dir.as_deref()).await
}

async fn chat_loop(
    session: &mut SessionManager<LocalBackend>,
    transcript_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Some(DriverCommand::Quit) => break,
            Some(DriverCommand::Clear) => {
                session.clear_history();
                println!("Transcript cleared.");
            }
            Some(DriverCommand::Summary) => println!("{}", session.summary()),
            Some(DriverCommand::Init) => println!("{}", session.initialize().await),
            Some(DriverCommand::Save(arg)) => {
                let path = arg
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_save_path(transcript_dir, Local::now()));
                match session.save_conversation(&path) {
                    Ok(()) => println!("Saved transcript to {}", path.display()),
                    Err(e) => println!("Could not save: {e}"),
                }
            }
            Some(DriverCommand::Help) => print_help(),
            Some(DriverCommand::Unknown(name)) => {
                println!("Unknown command: /{name} (try /help)");
            }
            None => {
                let mut stream = session.send_message(input);
                while let Some(chunk) = stream.next().await {
                    print!("{chunk}");
                    stdout.flush()?;
                }
                drop(stream);
                println!();
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /clear            Clear the conversation transcript");
    println!("  /save [path]      Save the transcript to a file");
    println!("  /summary          Show turn counts");
    println!("  /init             Retry backend initialization");
    println!("  /help             Show this command list");
    println!("  /quit             Exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("what does /save do?"), None);
    }

    #[test]
    fn commands_parse_with_and_without_args() {
        assert_eq!(parse_command("/quit"), Some(DriverCommand::Quit));
        assert_eq!(parse_command("/q"), Some(DriverCommand::Quit));
        assert_eq!(parse_command("/clear"), Some(DriverCommand::Clear));
        assert_eq!(parse_command("/save"), Some(DriverCommand::Save(None)));
        assert_eq!(
            parse_command("/save out/chat.txt"),
            Some(DriverCommand::Save(Some("out/chat.txt".to_string())))
        );
        assert_eq!(
            parse_command("/frobnicate"),
            Some(DriverCommand::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn default_save_path_is_timestamped() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        let path = default_save_path(Some(Path::new("/tmp/chats")), now);
        assert_eq!(path, Path::new("/tmp/chats/conversation-20240309-143005.txt"));

        let bare = default_save_path(None, now);
        assert_eq!(bare, Path::new("conversation-20240309-143005.txt"));
    }
}
