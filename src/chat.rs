//! Interactive chat loop and its slash commands.

use std::io::Write;

use anyhow::Result;
use rmcp::model::JsonObject;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::capabilities::{CapabilityDescriptor, CapabilityKind};
use crate::orchestrator::ChatSession;
use crate::types::ModelName;

const HELP: &str = "Commands:
  /tools                  List available MCP tools
  /resources              List available MCP resources
  /prompts                List available MCP prompts
  /read <resource>        Read a resource (uri or server:uri)
  /prompt <name> [json]   Fetch a prompt, optionally with JSON arguments
  /model [name]           Show or switch the Ollama model
  /clear                  Clear conversation history
  /context                Show recent conversation
  /debug <on|off>         Toggle debug logging of model prompts
  /exit                   Exit the chat
  /help                   Show this help message

Just type naturally: tools are detected and executed automatically.
Contextual references such as \"update that note\" use the conversation history.";

const CONTEXT_PREVIEW_TURNS: usize = 5;
const CONTEXT_PREVIEW_CHARS: usize = 80;

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Empty,
    Help,
    Tools,
    Resources,
    Prompts,
    Read(Option<String>),
    Prompt {
        identifier: Option<String>,
        arguments: Option<String>,
    },
    Model(Option<String>),
    Clear,
    Context,
    Debug(Option<String>),
    Exit,
    Unknown(String),
    Message(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if !trimmed.starts_with('/') {
            return Self::Message(trimmed.to_string());
        }

        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };
        let rest = (!rest.is_empty()).then(|| rest.to_string());

        match command.to_lowercase().as_str() {
            "/help" => Self::Help,
            "/tools" => Self::Tools,
            "/resources" => Self::Resources,
            "/prompts" => Self::Prompts,
            "/read" => Self::Read(rest),
            "/prompt" => {
                let (identifier, arguments) = match rest.as_deref().map(|r| r.split_once(char::is_whitespace)) {
                    Some(Some((id, args))) => (Some(id.to_string()), Some(args.trim().to_string())),
                    Some(None) => (rest.clone(), None),
                    None => (None, None),
                };
                Self::Prompt {
                    identifier,
                    arguments,
                }
            }
            "/model" => Self::Model(rest),
            "/clear" => Self::Clear,
            "/context" => Self::Context,
            "/debug" => Self::Debug(rest),
            "/exit" | "/quit" => Self::Exit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Tracing filter directives for a `RUST_LOG` value and the debug switch.
///
/// A non-empty `RUST_LOG` is used as given. The crate directive is only added
/// when it is unset or when debug output is on.
pub fn log_directives(rust_log: Option<&str>, debug: bool) -> String {
    match (rust_log.map(str::trim).filter(|s| !s.is_empty()), debug) {
        (Some(env), false) => env.to_string(),
        (Some(env), true) => format!("{},multi_mcp_chat=debug", env),
        (None, debug) => format!(
            "warn,multi_mcp_chat={},rmcp=warn",
            if debug { "debug" } else { "info" }
        ),
    }
}

type ApplyDebug = Box<dyn Fn(bool) -> Result<()> + Send + Sync>;

/// Switches prompt-level logging on and off at runtime.
pub struct DebugSwitch {
    enabled: bool,
    apply: ApplyDebug,
}

impl DebugSwitch {
    pub fn new(enabled: bool, apply: impl Fn(bool) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            enabled,
            apply: Box::new(apply),
        }
    }

    /// A switch that only tracks state.
    pub fn detached() -> Self {
        Self::new(false, |_| Ok(()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set(&mut self, enabled: bool) -> Result<()> {
        (self.apply)(enabled)?;
        self.enabled = enabled;
        Ok(())
    }
}

pub struct ChatRepl {
    session: ChatSession,
    debug: DebugSwitch,
}

impl ChatRepl {
    pub fn new(session: ChatSession, debug: DebugSwitch) -> Self {
        Self { session, debug }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Read lines from stdin until `/exit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        println!("\n=== Multi-server MCP chat ===\n");
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\nYou: ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };
            match self.dispatch(&line).await {
                Some(output) if !output.is_empty() => println!("\n{}", output),
                Some(_) => {}
                None => {
                    println!("Goodbye!");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one input line. Returns the text to show, or `None` to exit.
    pub async fn dispatch(&mut self, line: &str) -> Option<String> {
        let output = match ChatCommand::parse(line) {
            ChatCommand::Empty => String::new(),
            ChatCommand::Exit => return None,
            ChatCommand::Message(text) => {
                let outcome = self.session.handle_message(&text).await;
                format!("Assistant: {}", outcome.reply())
            }
            ChatCommand::Help => HELP.to_string(),
            ChatCommand::Tools => self.list(CapabilityKind::Tool).await,
            ChatCommand::Resources => self.list(CapabilityKind::Resource).await,
            ChatCommand::Prompts => self.list(CapabilityKind::Prompt).await,
            ChatCommand::Read(None) => "Usage: /read <resource>".to_string(),
            ChatCommand::Read(Some(identifier)) => self.session.read_resource(&identifier).await,
            ChatCommand::Prompt {
                identifier: None, ..
            } => "Usage: /prompt <name> [json-arguments]".to_string(),
            ChatCommand::Prompt {
                identifier: Some(identifier),
                arguments,
            } => match parse_prompt_arguments(arguments.as_deref()) {
                Ok(arguments) => self.session.get_prompt(&identifier, arguments).await,
                Err(message) => message,
            },
            ChatCommand::Model(None) => format!(
                "Current model: {}\nUsage: /model <model-name>",
                self.session.model().model().await
            ),
            ChatCommand::Model(Some(name)) => {
                self.session.model().set_model(ModelName::new(name.clone())).await;
                format!("Switched to model: {}", name)
            }
            ChatCommand::Clear => {
                self.session.clear_history();
                "Conversation history cleared!".to_string()
            }
            ChatCommand::Context => self.context(),
            ChatCommand::Debug(action) => self.debug(action.as_deref()),
            ChatCommand::Unknown(command) => format!(
                "Unknown command: {}. Type '/help' for available commands.",
                command
            ),
        };
        Some(output)
    }

    async fn list(&self, kind: CapabilityKind) -> String {
        let entries = self.session.router().aggregator().collect(kind).await;
        render_listing(kind, &entries)
    }

    fn context(&self) -> String {
        let history = self.session.history();
        let mut out = format!(
            "Conversation: {} messages stored (max {})",
            history.len(),
            history.max_len()
        );
        for turn in history.recent(CONTEXT_PREVIEW_TURNS) {
            let preview: String = turn.content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            let ellipsis = if turn.content.chars().count() > CONTEXT_PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            out.push_str(&format!(
                "\n  [{}] {}: {}{}",
                turn.timestamp.format("%H:%M:%S"),
                turn.role,
                preview,
                ellipsis
            ));
        }
        out
    }

    fn debug(&mut self, action: Option<&str>) -> String {
        let Some(action) = action else {
            let state = if self.debug.is_enabled() { "enabled" } else { "disabled" };
            return format!("Debug logging is currently {}\nUsage: /debug <on|off>", state);
        };

        let enable = match action.to_lowercase().as_str() {
            "on" | "enable" | "true" => true,
            "off" | "disable" | "false" => false,
            _ => return "Invalid option. Use 'on' or 'off'".to_string(),
        };
        match self.debug.set(enable) {
            Ok(()) if enable => "Debug logging enabled".to_string(),
            Ok(()) => "Debug logging disabled".to_string(),
            Err(e) => format!("Could not change debug logging: {}", e),
        }
    }
}

/// Human-readable listing of one capability kind.
pub fn render_listing(kind: CapabilityKind, entries: &[CapabilityDescriptor]) -> String {
    if entries.is_empty() {
        return format!("No {} available.", kind.plural());
    }

    let mut out = format!("Available MCP {}:", kind.plural());
    for entry in entries {
        out.push_str(&format!(
            "\n  {} ({}) - {}",
            entry.qualified_name,
            entry.server,
            entry.description_or_default()
        ));
        let params = entry.parameter_list();
        if !params.is_empty() {
            out.push_str(&format!(" [{}]", params));
        }
    }
    out
}

fn parse_prompt_arguments(raw: Option<&str>) -> std::result::Result<Option<JsonObject>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err("Prompt arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("Invalid prompt arguments: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatSettings;
    use crate::registry::ServerRegistry;
    use crate::router::CallRouter;
    use crate::testing::{MockServer, ScriptedModel};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    async fn repl(model: ScriptedModel) -> ChatRepl {
        let registry = Arc::new(ServerRegistry::new());
        registry
            .register(
                "notes",
                Arc::new(
                    MockServer::notes()
                        .with_resource("memo://readme", "hello")
                        .with_prompt("summarize"),
                ),
            )
            .await
            .unwrap();
        let session = ChatSession::new(
            CallRouter::new(registry),
            Arc::new(model),
            &ChatSettings::default(),
            "system",
        );
        ChatRepl::new(session, DebugSwitch::detached())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("   "), ChatCommand::Empty);
        assert_eq!(ChatCommand::parse("/TOOLS"), ChatCommand::Tools);
        assert_eq!(
            ChatCommand::parse("/model  qwen2.5 "),
            ChatCommand::Model(Some("qwen2.5".to_string()))
        );
        assert_eq!(ChatCommand::parse("/debug"), ChatCommand::Debug(None));
        assert_eq!(
            ChatCommand::parse("/prompt notes.summarize {\"topic\": \"work\"}"),
            ChatCommand::Prompt {
                identifier: Some("notes.summarize".to_string()),
                arguments: Some("{\"topic\": \"work\"}".to_string()),
            }
        );
        assert_eq!(
            ChatCommand::parse("/prompt summarize"),
            ChatCommand::Prompt {
                identifier: Some("summarize".to_string()),
                arguments: None,
            }
        );
        assert_eq!(ChatCommand::parse("/quit"), ChatCommand::Exit);
        assert_eq!(ChatCommand::parse("/nope"), ChatCommand::Unknown("/nope".to_string()));
        assert_eq!(
            ChatCommand::parse(" show me my notes "),
            ChatCommand::Message("show me my notes".to_string())
        );
    }

    #[tokio::test]
    async fn test_listing_commands() {
        let mut repl = repl(ScriptedModel::new()).await;

        let tools = repl.dispatch("/tools").await.unwrap();
        assert!(tools.starts_with("Available MCP tools:"));
        assert!(tools.contains("notes.create_note (notes) - create_note tool [name, content]"));

        let resources = repl.dispatch("/resources").await.unwrap();
        assert!(resources.contains("notes:memo://readme (notes)"));

        let prompts = repl.dispatch("/prompts").await.unwrap();
        assert!(prompts.contains("notes.summarize"));
    }

    #[tokio::test]
    async fn test_read_and_prompt_commands() {
        let mut repl = repl(ScriptedModel::new()).await;

        let read = repl.dispatch("/read memo://readme").await.unwrap();
        assert_eq!(read, "Resource content:\n\nhello");

        let missing = repl.dispatch("/read memo://nothing").await.unwrap();
        assert!(missing.starts_with("Failed to read resource: Resource memo://nothing not found on any server"));

        let prompt = repl
            .dispatch("/prompt summarize {\"topic\": \"work\"}")
            .await
            .unwrap();
        assert!(prompt.contains("user: Run summarize with {\"topic\":\"work\"}"));

        let bad = repl.dispatch("/prompt summarize [1]").await.unwrap();
        assert_eq!(bad, "Prompt arguments must be a JSON object");
    }

    #[tokio::test]
    async fn test_model_clear_and_exit() {
        let mut repl = repl(ScriptedModel::new().with_chat("hi there")).await;

        assert_eq!(
            repl.dispatch("/model qwen2.5").await.unwrap(),
            "Switched to model: qwen2.5"
        );
        assert!(repl.dispatch("/model").await.unwrap().starts_with("Current model: qwen2.5"));

        repl.dispatch("hello").await.unwrap();
        assert_eq!(repl.session().history().len(), 2);
        repl.dispatch("/clear").await.unwrap();
        assert!(repl.session().history().is_empty());

        assert!(repl.dispatch("/exit").await.is_none());
    }

    #[tokio::test]
    async fn test_debug_toggle_applies() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = flag.clone();
        let mut repl = repl(ScriptedModel::new()).await;
        repl.debug = DebugSwitch::new(false, move |on| {
            seen.store(on, Ordering::SeqCst);
            Ok(())
        });

        assert!(repl.dispatch("/debug").await.unwrap().contains("disabled"));
        assert_eq!(repl.dispatch("/debug on").await.unwrap(), "Debug logging enabled");
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(
            repl.dispatch("/debug maybe").await.unwrap(),
            "Invalid option. Use 'on' or 'off'"
        );
        assert_eq!(repl.dispatch("/debug off").await.unwrap(), "Debug logging disabled");
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_log_directives_respect_rust_log() {
        assert_eq!(
            log_directives(None, false),
            "warn,multi_mcp_chat=info,rmcp=warn"
        );
        assert_eq!(
            log_directives(Some("  "), true),
            "warn,multi_mcp_chat=debug,rmcp=warn"
        );
        assert_eq!(
            log_directives(Some("multi_mcp_chat=trace"), false),
            "multi_mcp_chat=trace"
        );
        assert_eq!(
            log_directives(Some("error"), true),
            "error,multi_mcp_chat=debug"
        );
    }

    #[tokio::test]
    async fn test_context_shows_recent_turns() {
        let mut repl = repl(ScriptedModel::new().with_chat("sure")).await;
        repl.dispatch("remember the meeting note").await.unwrap();

        let context = repl.dispatch("/context").await.unwrap();
        assert!(context.starts_with("Conversation: 2 messages stored (max 500)"));
        assert!(context.contains("user: remember the meeting note"));
        assert!(context.contains("assistant: sure"));
    }
}
