use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::{DashboardStats, SweepSummary};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod client;
mod commands;
mod config;
mod render;
mod screen;

use client::{ApiClient, ApiError};
use commands::{
    catalog::ProductsCommand,
    messages::MessagesCommand,
    quotes::QuotesCommand,
    settings::{SettingsCommand, TemplatesCommand},
};

#[derive(Parser)]
#[command(name = "backoffice")]
#[command(about = "Admin client for the meat-export back office")]
#[command(version)]
struct Cli {
    /// Server URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Auth token (overrides config)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Login to the back office
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Logout from the back office
    Logout,
    /// Show current login status
    Whoami,
    /// Contact messages, drafts and outgoing mail
    Messages {
        #[command(subcommand)]
        action: MessagesCommand,
    },
    /// Quote requests
    Quotes {
        #[command(subcommand)]
        action: QuotesCommand,
    },
    /// Product catalogue
    Products {
        #[command(subcommand)]
        action: ProductsCommand,
    },
    /// Company, mail and notification settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
    /// Canned quote replies
    Templates {
        #[command(subcommand)]
        action: TemplatesCommand,
    },
    /// Deliver due scheduled messages now
    Sweep,
    /// Counts at a glance
    Dashboard,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (server, token)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backoffice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::Config::load().unwrap_or_default();
    let server = config.server(cli.server);

    let (api, command) = match cli.command {
        Commands::Config { action } => return handle_config_command(action),
        Commands::Login { email } => {
            let token = auth::login(&server, email).await?;

            // Save the token
            let mut config = config::Config::load().unwrap_or_default();
            config.remote.token = Some(token);
            config.save()?;
            return Ok(());
        }
        Commands::Logout => {
            let mut config = config;
            return auth::logout(&mut config);
        }
        Commands::Whoami => return auth::whoami(&config, &server).await,
        command => {
            let Some(token) = cli.token.or(config.remote.token) else {
                eprintln!("\x1b[33m🔐 Not logged in.\x1b[0m");
                eprintln!("   Run '\x1b[1mbackoffice login\x1b[0m' to authenticate.");
                return Ok(());
            };
            (ApiClient::new(&server, Some(token)), command)
        }
    };

    if let Err(err) = run(&api, command).await {
        match err.downcast_ref::<ApiError>() {
            Some(api_err) => {
                eprintln!("\x1b[31m✗ {}\x1b[0m", api_err);
                if let Some(errors) = api_err.field_errors() {
                    render::field_errors(errors);
                }
                std::process::exit(1);
            }
            None => return Err(err),
        }
    }
    Ok(())
}

async fn run(api: &ApiClient, command: Commands) -> Result<()> {
    match command {
        Commands::Messages { action } => commands::messages::run(api, action).await,
        Commands::Quotes { action } => commands::quotes::run(api, action).await,
        Commands::Products { action } => commands::catalog::run(api, action).await,
        Commands::Settings { action } => commands::settings::run_settings(api, action).await,
        Commands::Templates { action } => commands::settings::run_templates(api, action).await,
        Commands::Sweep => {
            let reply = api.post_empty::<SweepSummary>("/api/messages/sweep").await?;
            commands::announce(reply.message, "Sweep finished");
            for failure in &reply.data.errors {
                eprintln!("  \x1b[31m{}\x1b[0m: {}", failure.message_id, failure.error);
            }
            Ok(())
        }
        Commands::Dashboard => {
            let stats = api.get::<DashboardStats>("/api/dashboard").await?.data;
            render::dashboard(&stats);
            Ok(())
        }
        Commands::Config { .. }
        | Commands::Login { .. }
        | Commands::Logout
        | Commands::Whoami => Ok(()),
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load().unwrap_or_default();
            match key.as_str() {
                "server" => config.remote.server = Some(value),
                "token" => config.remote.token = Some(value),
                _ => anyhow::bail!("Unknown config key: {}. Valid keys: server, token", key),
            }
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            let value = match key.as_str() {
                "server" => config.remote.server.unwrap_or_default(),
                "token" => config.remote.token.map(|_| "****").unwrap_or_default().to_string(),
                _ => anyhow::bail!("Unknown config key: {}", key),
            };
            println!("{}", value);
        }
        ConfigAction::Show => {
            let config = config::Config::load()?;
            println!("server: {}", config.server(None));
            println!("token: {}", config.remote.token.map(|_| "****").unwrap_or_default());
        }
        ConfigAction::Path => {
            let path = config::Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
