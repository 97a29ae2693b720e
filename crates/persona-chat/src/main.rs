// persona-chat/crates/persona-chat/src/main.rs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use persona_chat::{config::Config, run_server, GeminiClient};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "persona-chat", version, about = "Persona chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print the models visible to the configured API key
    ListModels,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    persona_chat::telemetry::init_tracing();
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(cfg).await,
        Command::ListModels => list_models(&cfg).await,
    }
}

#[cfg(feature = "cli")]
async fn list_models(cfg: &Config) -> anyhow::Result<()> {
    let client = GeminiClient::new(&cfg.llm)?;
    let models = client.list_models().await?;

    println!("Available models:");
    for model in models {
        let generates = model
            .supported_generation_methods
            .iter()
            .any(|m| m == "generateContent");
        match model.display_name {
            Some(display) => println!(
                "- {} ({}){}",
                model.name,
                display,
                if generates { "" } else { " [no generateContent]" }
            ),
            None => println!("- {}", model.name),
        }
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
