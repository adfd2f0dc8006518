//! Chat with the storefront support bot from the terminal.
//!
//! Reads the API key from the `OPENAI_API_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # One-shot question
//! shopchat --user "Where is my order?"
//!
//! # Pipe content from stdin
//! cat question.txt | shopchat --stdin
//!
//! # Interactive session (default when no --user/--stdin given)
//! shopchat
//!
//! # Custom knowledge base and model
//! shopchat --facts store_facts.json --model gpt-4o-mini
//! ```

use clap::Parser;
use shopchat::engine::{AskError, ChatEngine, EngineConfig};
use shopchat::knowledge::KnowledgeBase;
use shopchat::session::ChatSession;
use shopchat::{CompletionClient, api_key_from_env};
use std::io::{BufRead, Read, Write};
use std::process;
use tracing_subscriber::EnvFilter;

/// Chat with the storefront support bot from the terminal.
///
/// Reads the API key from the OPENAI_API_KEY environment variable.
#[derive(Parser)]
#[command(name = "shopchat")]
struct Cli {
    // ── Message content ────────────────────────────────────────
    /// Single question to ask (one-shot mode)
    #[arg(long)]
    user: Option<String>,

    /// Read the question from stdin (one-shot mode)
    #[arg(long)]
    stdin: bool,

    // ── Model selection ────────────────────────────────────────
    /// Model to use
    #[arg(long, default_value = shopchat::DEFAULT_MODEL)]
    model: String,

    /// Maximum tokens in the response
    #[arg(long, default_value_t = shopchat::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Sampling temperature (0.0 = deterministic)
    #[arg(long)]
    temperature: Option<f32>,

    // ── Knowledge base ─────────────────────────────────────────
    /// Path to a JSON facts file (defaults to the built-in store facts)
    #[arg(long)]
    facts: Option<String>,

    /// Number of context facts sampled into each prompt
    #[arg(long, default_value_t = shopchat::knowledge::DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,
}

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn build_one_shot_content(cli: &Cli) -> Result<Option<String>, String> {
    let stdin_text = if cli.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    Ok(match (&cli.user, stdin_text) {
        (Some(msg), Some(piped)) => Some(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Some(msg.clone()),
        (None, Some(piped)) => Some(piped),
        (None, None) => None,
    })
}

/// Print one bot reply, with heading styling and cart-add diagnostics.
fn print_reply(reply: &shopchat::reply::Reply) {
    if reply.heading {
        println!("ShopBot: == {} ==", reply.text);
    } else {
        println!("ShopBot: {}", reply.text);
    }
    if let Some(ref item) = reply.cart_add {
        println!("  [cart] added: {item}");
    }
}

async fn run_one_shot(engine: &mut ChatEngine<'_>, input: &str) -> Result<(), String> {
    let mut session = ChatSession::new();
    match engine.ask(&mut session, input).await {
        Ok(reply) => {
            print_reply(&reply);
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

async fn run_interactive(engine: &mut ChatEngine<'_>) -> Result<(), String> {
    let mut session = ChatSession::new();
    println!("Start a conversation with ShopBot. Press Ctrl-D to quit.");
    println!("Example questions: What can you tell me? Do you deliver in Accra?");

    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        std::io::stdout()
            .flush()
            .map_err(|e| format!("failed to flush stdout: {e}"))?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| format!("failed to read input: {e}"))?;
        if read == 0 {
            // EOF
            println!();
            return Ok(());
        }

        match engine.ask(&mut session, line.trim_end()).await {
            Ok(reply) => print_reply(&reply),
            Err(AskError::Rejected(rejection)) => {
                // Submission skipped, transcript unchanged.
                eprintln!("(not sent: {rejection})");
            }
            Err(AskError::Busy) => {
                // The loop awaits each reply before prompting again, so a
                // pending request here would be a session-handling bug.
                eprintln!("(not sent: a request is already in flight)");
            }
            Err(AskError::Completion(_)) => {
                // The session already recorded a visible failure message.
                if let Some(last) = session.transcript().last() {
                    println!("ShopBot: {}", last.text);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let api_key = match api_key_from_env() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let client = match CompletionClient::new(api_key) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            process::exit(1);
        }
    };

    let knowledge = match &cli.facts {
        Some(path) => match KnowledgeBase::from_json_file(path) {
            Ok(base) => base,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => KnowledgeBase::builtin(),
    };

    let mut config = EngineConfig::default()
        .with_model(cli.model.clone())
        .with_max_tokens(cli.max_tokens)
        .with_sample_size(cli.sample_size);
    if let Some(temperature) = cli.temperature {
        config = config.with_temperature(temperature);
    }

    let mut engine = ChatEngine::new(&client, knowledge, config);

    let result = match build_one_shot_content(&cli) {
        Ok(Some(input)) => run_one_shot(&mut engine, &input).await,
        Ok(None) => run_interactive(&mut engine).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
