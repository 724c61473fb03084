use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use llmobs_core::{
    LlmInstrumentation,
    attributes::AttributeValue,
    config::Config,
    model::{ChatMessage, ChatRequest, EmbedRequest, Role},
    provider::{ChatProvider, EmbedProvider, NullProvider},
    tracer::{InMemoryTracer, Tracer},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "LLM observability smoke tool", long_about = None)]
struct Cli {
    /// JSON or TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Canned provider reports no usage object
    #[arg(long, global = true)]
    no_usage: bool,
    /// Install a whitespace word-count tokenizer as the token count fallback
    #[arg(long, global = true)]
    word_count_fallback: bool,
    /// Transaction custom attribute, `key=value` (repeatable)
    #[arg(long = "attr", global = true, value_parser = parse_attr)]
    attrs: Vec<(String, AttributeValue)>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a chat completion request through the instrumented provider
    Chat {
        #[arg(long, default_value = "gpt-4o")]
        model: String,
        #[arg(
            short,
            long = "message",
            required = true,
            help = "Message from the user (repeatable)"
        )]
        messages: Vec<String>,
    },
    /// Send an embedding request through the instrumented provider
    Embed {
        #[arg(long, default_value = "text-embedding-3-small")]
        model: String,
        #[arg(short, long = "input", required = true, help = "Input text (repeatable)")]
        inputs: Vec<String>,
    },
}

fn parse_attr(raw: &str) -> Result<(String, AttributeValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty attribute key in '{raw}'"));
    }
    let value = if let Ok(b) = value.parse::<bool>() {
        AttributeValue::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        AttributeValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        AttributeValue::Float(f)
    } else {
        AttributeValue::String(value.to_string())
    };
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let llm = LlmInstrumentation::new(cfg)?;
    if cli.word_count_fallback {
        llm.set_token_count_callback(|input| Ok(input.content.split_whitespace().count() as u64));
    }

    let provider = if cli.no_usage {
        NullProvider::without_usage()
    } else {
        NullProvider::new()
    };
    let tracer = Arc::new(InMemoryTracer::new());
    let wrapped = llm.instrument(provider, tracer.clone());

    let (txn, result) = tracer
        .in_transaction("llmobs/smoke", async {
            if let Some(txn) = tracer.current_transaction() {
                for (key, value) in &cli.attrs {
                    tracer.set_custom_attribute(&txn, key, value.clone());
                }
            }
            match &cli.command {
                Commands::Chat { model, messages } => {
                    let req = ChatRequest::new(
                        model.clone(),
                        messages
                            .iter()
                            .map(|m| ChatMessage::new(Role::User, m.clone()))
                            .collect(),
                    );
                    let resp = wrapped.chat(req).await?;
                    eprintln!("{} -> {}", resp.provider, resp.text());
                }
                Commands::Embed { model, inputs } => {
                    let req = EmbedRequest::new(model.clone(), inputs.clone());
                    let resp = wrapped.embed(req).await?;
                    for (i, v) in resp.vectors.iter().enumerate() {
                        eprintln!("{} -> dim={}", i, v.len());
                    }
                }
            }
            anyhow::Ok(())
        })
        .await;
    result?;

    let (meta, events) = llm.harvest();
    tracing::debug!(?meta, transaction = txn.id(), "harvest complete");
    for event in &events {
        println!("{}", serde_json::Value::Object(event.to_payload()?));
    }
    eprintln!(
        "harvested {} of {} events (capacity {})",
        events.len(),
        meta.events_seen,
        meta.reservoir_size
    );
    for segment in txn.segments() {
        eprintln!(
            "segment {} duration={:?} error={:?}",
            segment.name, segment.duration, segment.error
        );
    }
    for (name, count) in tracer.metrics() {
        eprintln!("metric {name} = {count}");
    }

    Ok(())
}
