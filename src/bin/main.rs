use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rmcp::model::JsonObject;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use multi_mcp_chat::orchestrator::synthesizer::{
    render_prompt_output, render_resource_output, render_tool_output,
};
use multi_mcp_chat::{
    AppConfig, CallRouter, CapabilityKind, ChatRepl, ChatSession, DebugSwitch, LanguageModel,
    ModelName, OllamaClient, ServerRegistry, chat::log_directives, chat::render_listing,
    connect_all,
};

#[derive(Parser)]
#[command(name = "mcp-chat")]
#[command(about = "Chat with a local Ollama model over tools from several MCP servers")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Ollama model to use instead of the configured default
    #[arg(short, long)]
    model: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// List tools from every connected server
    Tools,
    /// List resources from every connected server
    Resources,
    /// List prompts from every connected server
    Prompts,
    /// Call a tool directly, bypassing the model
    Call {
        /// Bare or server-qualified tool name
        identifier: String,
        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
    /// Read a resource by URI or server:uri
    Read { identifier: String },
    /// Fetch a prompt by bare or server-qualified name
    Prompt {
        identifier: String,
        /// Prompt arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
}

fn log_filter(debug: bool) -> Result<EnvFilter> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    Ok(EnvFilter::try_new(log_directives(rust_log.as_deref(), debug))?)
}

fn parse_arguments(raw: Option<&str>) -> Result<Option<JsonObject>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(raw).context("Arguments are not valid JSON")? {
        serde_json::Value::Object(map) => Ok(Some(map)),
        _ => bail!("Arguments must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (filter, filter_handle) = reload::Layer::new(log_filter(false)?);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let registry = Arc::new(ServerRegistry::new());
    let connected = connect_all(&config.servers, &registry).await;
    if connected == 0 {
        bail!(
            "None of the {} configured MCP servers could be connected",
            config.servers.len()
        );
    }
    info!(
        "Connected to {} of {} MCP servers",
        connected,
        config.servers.len()
    );
    let router = CallRouter::new(registry.clone());

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let model = cli
                .model
                .map(ModelName::new)
                .unwrap_or_else(|| config.ollama.default_model.clone());
            let ollama = OllamaClient::new(&config.ollama.host, model)?;
            ollama
                .ensure_model()
                .await
                .context("Failed to initialize Ollama")?;
            info!(model = %ollama.model().await, "Using Ollama model");

            let session = ChatSession::new(
                router,
                Arc::new(ollama),
                &config.chat,
                config.ollama.system_prompt.clone(),
            );
            let debug = DebugSwitch::new(false, move |on| {
                filter_handle.reload(log_filter(on)?)?;
                Ok(())
            });
            ChatRepl::new(session, debug).run().await?;
        }
        Commands::Tools => {
            let tools = router.aggregator().collect(CapabilityKind::Tool).await;
            println!("{}", render_listing(CapabilityKind::Tool, &tools));
        }
        Commands::Resources => {
            let resources = router.aggregator().collect(CapabilityKind::Resource).await;
            println!("{}", render_listing(CapabilityKind::Resource, &resources));
        }
        Commands::Prompts => {
            let prompts = router.aggregator().collect(CapabilityKind::Prompt).await;
            println!("{}", render_listing(CapabilityKind::Prompt, &prompts));
        }
        Commands::Call { identifier, args } => {
            let arguments = parse_arguments(args.as_deref())?.unwrap_or_default();
            let output = router.invoke(&identifier, arguments.clone()).await?;
            println!("{}", render_tool_output(&identifier, &output, &arguments));
        }
        Commands::Read { identifier } => {
            let output = router.read_resource(&identifier).await?;
            println!("{}", render_resource_output(&output));
        }
        Commands::Prompt { identifier, args } => {
            let arguments = parse_arguments(args.as_deref())?;
            let output = router.get_prompt(&identifier, arguments).await?;
            println!("{}", render_prompt_output(&output));
        }
    }

    // Dropping the connections ends stdio server processes.
    registry.clear().await;
    Ok(())
}
