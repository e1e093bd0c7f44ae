//! Command-line interface.
//!
//! Without a subcommand the binary starts the HTTP server. The other
//! subcommands work directly against the local database:
//! - `inspect <external-user-id>` - Show a user's organisations, groups and teams
//! - `teams create` - Create a team inside a synced organisation
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::DbPool;

#[derive(Parser, Debug)]
#[command(name = "orgbridge")]
#[command(author, version, about = "Session resolution and organisation sync for multi-tenant apps", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ORGBRIDGE_CONFIG", default_value = "orgbridge.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long, env = "ORGBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Show the organisations, groups and teams of a user
    Inspect {
        /// External identity provider user id
        external_user_id: String,
    },

    /// Team management commands
    #[command(subcommand)]
    Teams(TeamsCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum TeamsCommands {
    /// Create a team and attach the organisation's groups to it
    Create {
        /// External id of the organisation
        #[arg(long)]
        organisation: String,
        /// Team name
        #[arg(long)]
        name: String,
        /// Team url (defaults to a slug of the name)
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

impl Cli {
    /// Whether this invocation should start the server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Run a non-server subcommand
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Inspect { external_user_id }) => cmd_inspect(cli, external_user_id).await,
        Some(Commands::Teams(TeamsCommands::Create {
            organisation,
            name,
            url,
        })) => cmd_teams_create(cli, organisation, name, url.as_deref()).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        // Server start is handled in main.rs
        Some(Commands::Serve) | None => Ok(()),
    }
}

async fn open_database(cli: &Cli) -> Result<DbPool> {
    let config = Config::load(&cli.config)?;
    let db_path = config.server.data_dir.join("orgbridge.db");
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Has the server been started?",
            db_path.display()
        );
    }
    crate::db::init(&config.server.data_dir)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

async fn cmd_inspect(cli: &Cli, external_user_id: &str) -> Result<()> {
    let pool = open_database(cli).await?;

    let Some(user) = crate::accounts::find_by_external_id(&pool, external_user_id).await? else {
        println!("No local user is linked to {}", external_user_id);
        return Ok(());
    };

    println!("User {} <{}>", user.id, user.email);
    if let Some(name) = &user.name {
        println!("  Name:     {}", name);
    }
    println!("  Disabled: {}", user.disabled);
    println!();

    let organisations = crate::projection::get_organisation_session(&pool, user.id).await?;
    if organisations.is_empty() {
        println!("No organisation memberships.");
        return Ok(());
    }

    for org in organisations {
        println!(
            "{} ({}) [{}]",
            org.organisation.name,
            org.organisation.url,
            org.current_organisation_role
        );
        println!(
            "  External id: {}",
            org.organisation
                .external_organisation_id
                .as_deref()
                .unwrap_or("-")
        );
        let groups: Vec<String> = org
            .groups
            .iter()
            .map(|g| format!("{}:{}", g.group_type, g.organisation_role))
            .collect();
        println!("  Groups:      {}", if groups.is_empty() { "-".to_string() } else { groups.join(", ") });
        for team in &org.teams {
            println!(
                "  Team {} {} ({}) [{}]",
                team.team.id, team.team.name, team.team.url, team.current_team_role
            );
        }
        println!();
    }

    Ok(())
}

async fn cmd_teams_create(
    cli: &Cli,
    external_organisation_id: &str,
    name: &str,
    url: Option<&str>,
) -> Result<()> {
    let pool = open_database(cli).await?;

    let organisation =
        crate::accounts::find_organisation_by_external_id(&pool, external_organisation_id)
            .await?
            .with_context(|| format!("Organisation {} has not been synced", external_organisation_id))?;

    let team = crate::teams::create_team(&pool, &organisation.id, name, url, chrono::Utc::now()).await?;
    println!(
        "[OK] Created team {} ({}) in {}",
        team.name, team.url, organisation.name
    );
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("Server:");
            println!("  Host:          {}", config.server.host);
            println!("  API Port:      {}", config.server.api_port);
            println!("  Data Dir:      {}", config.server.data_dir.display());
            println!();
            println!("Auth:");
            println!("  Legacy cookie: {}", config.auth.legacy_cookie);
            println!("  IdP cookie:    {}", config.auth.external_cookie);
            println!(
                "  IdP headers:   {} / {}",
                config.auth.external_user_header, config.auth.external_session_header
            );
            println!("  Session TTL:   {} days", config.auth.external_session_ttl_days);
            println!();
            println!("Sync:");
            println!("  Max attempts:  {}", config.sync.max_attempts);
            println!("  Backoff:       {} ms", config.sync.retry_backoff_ms);
            println!();
            println!("Warnings:");
            println!(
                "  [!] External session tokens are not signature-checked here; \
                 verify them at the edge before they reach this service"
            );
            println!();
            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Invalid configuration file");
        }
    }
}
