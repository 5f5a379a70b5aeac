mod api;
mod auth;
mod billing;
mod config;
mod db;
mod error;
mod invoice_gen;
mod mailer;
mod models;
mod pagination;
mod push;
mod scheduler;
mod vnd;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::mailer::Mailer;
use crate::models::UserRole;

#[derive(Debug, Parser)]
#[command(name = "bluemoon", about = "BlueMoon apartment management server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and the background jobs
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create a login for staff or a resident
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Admin)]
        role: RoleArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Manager,
    Accountant,
    Resident,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => UserRole::Admin,
            RoleArg::Manager => UserRole::Manager,
            RoleArg::Accountant => UserRole::Accountant,
            RoleArg::Resident => UserRole::Resident,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bluemoon=debug,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::init()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let db = db::Database::new(&config).await?;
            db.migrate().await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::CreateUser {
            username,
            email,
            phone,
            password,
            role,
        } => {
            if password.chars().count() < 8 {
                bail!("password must be at least 8 characters");
            }

            let db = db::init(&config).await?;
            if db.user_exists(&username, &email, &phone).await? {
                bail!("a user with this username, email or phone already exists");
            }

            let hash = auth::hash_password(&password)?;
            let id = db
                .create_user(&username, &email, &phone, &hash, role.into())
                .await?;
            tracing::info!(user = %id, %username, ?role, "user created");
            Ok(())
        }
    }
}

async fn serve(config: config::Config) -> Result<()> {
    let db = db::init(&config).await?;
    tracing::info!("database connection established");

    let mailer = Mailer::from_config(&config)?;
    if !mailer.is_enabled() {
        tracing::warn!("SMTP is not configured, account credentials will not be mailed");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db, config, mailer);
    let _jobs = scheduler::spawn(state.clone());

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, api::router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["bluemoon"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn create_user_parses_role() {
        let cli = Cli::try_parse_from([
            "bluemoon",
            "create-user",
            "--username",
            "ketoan",
            "--email",
            "ketoan@bluemoon.vn",
            "--phone",
            "0912345678",
            "--password",
            "matkhau123",
            "--role",
            "accountant",
        ])
        .unwrap();

        match cli.command {
            Some(Command::CreateUser { username, role, .. }) => {
                assert_eq!(username, "ketoan");
                assert_eq!(UserRole::from(role), UserRole::Accountant);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
