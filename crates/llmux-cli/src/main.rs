mod configuration;
mod inputs;
mod render;

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use futures::StreamExt;
use llmux::models::message::Message;
use llmux::providers::base::Provider;
use llmux::providers::factory::get_provider;
use llmux::providers::stream::collect_message;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use configuration::{load_configuration, Overrides};
use inputs::user_message;
use render::ChunkPrinter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with provider options, LLMUX_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provider id, e.g. anthropic, openrouter, gemini
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(short, long, default_value = "You are a helpful assistant.")]
    system: String,

    /// Image to attach to the first message, may be repeated
    #[arg(short, long)]
    image: Vec<PathBuf>,

    /// Single-shot prompt completion instead of chat
    #[arg(long)]
    complete: bool,

    /// Prompt to send. Without one an interactive session starts.
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let configuration = load_configuration(
        cli.config.as_deref(),
        Overrides {
            provider: cli.provider.clone(),
            model: cli.model.clone(),
            max_tokens: cli.max_tokens,
            temperature: cli.temperature,
        },
    )
    .context("Failed to load configuration")?;
    let provider = get_provider(&configuration)?;
    let prompt = cli.prompt.join(" ");

    if cli.complete {
        if !provider.supports_completion() {
            bail!("{} does not support single prompt completion", provider.name());
        }
        println!("{}", provider.complete_prompt(&prompt).await?);
        return Ok(());
    }

    let mut conversation = Vec::new();
    if !prompt.trim().is_empty() {
        conversation.push(user_message(&prompt, cli.image.as_slice())?);
        reply(provider.as_ref(), &cli.system, &mut conversation).await?;
        return Ok(());
    }

    let model = provider.get_model();
    println!(
        "{} {}",
        style(format!("{} / {}", provider.name(), model.id)).bold(),
        style("- type \"exit\" to end the session").dim()
    );

    let mut images = cli.image.as_slice();
    let stdin = io::stdin();
    loop {
        print!("{} ", style(">").green().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        conversation.push(user_message(&line, images)?);
        images = &[];
        if let Err(err) = reply(provider.as_ref(), &cli.system, &mut conversation).await {
            eprintln!("{}", style(format!("Error: {}", err)).red());
            // forget the turn so the conversation stays well formed
            conversation.pop();
        }
        println!();
    }
    Ok(())
}

/// Stream the next assistant message to stdout and append it to the conversation
async fn reply(
    provider: &dyn Provider,
    system: &str,
    conversation: &mut Vec<Message>,
) -> Result<()> {
    let mut printer = ChunkPrinter::new(io::stdout());
    let chunks = provider
        .create_message(system, conversation, &[])?
        .inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                if let Err(err) = printer.print(chunk) {
                    tracing::warn!("Failed to write output: {}", err);
                }
            }
        })
        .boxed();

    let completed = collect_message(chunks).await?;
    if !record_reply(conversation, completed.message) {
        println!("{}", style("(empty reply)").dim());
    }
    Ok(())
}

/// Append the assistant's reply, backends reject assistant turns without content
fn record_reply(conversation: &mut Vec<Message>, reply: Message) -> bool {
    if reply.content.is_empty() {
        tracing::warn!("Backend returned an empty reply, it is not kept in the conversation");
        return false;
    }
    conversation.push(reply);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_replies_are_not_recorded() {
        let mut conversation = vec![Message::user().with_text("Hi")];

        assert!(!record_reply(&mut conversation, Message::assistant()));
        assert_eq!(conversation.len(), 1);

        assert!(record_reply(
            &mut conversation,
            Message::assistant().with_text("Hello")
        ));
        assert_eq!(conversation.len(), 2);
    }
}
