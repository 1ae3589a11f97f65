//! # TaskDesk admin CLI
//!
//! Creates administrator accounts directly in the database, for
//! bootstrapping a fresh install before anyone can log in.
//!
//! ```bash
//! taskdesk-admin create --name "Ops" --email ops@example.com --password 'long enough'
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use taskdesk_shared::auth::password;
use taskdesk_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use taskdesk_shared::models::user::{CreateUser, Role, User};
use taskdesk_shared::repository::{postgres::PgRepository, RepositoryError, UserRepository};
use validator::ValidateEmail;

#[derive(Parser, Debug)]
#[command(name = "taskdesk-admin")]
#[command(author, version, about = "TaskDesk administration", long_about = None)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an administrator (email marked as verified)
    Create(CreateArgs),
}

#[derive(clap::Args, Debug)]
struct CreateArgs {
    /// Display name
    #[arg(long)]
    name: String,

    /// Email address, must not be in use
    #[arg(long)]
    email: String,

    /// Password, at least 8 characters
    #[arg(long, env = "TASKDESK_ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

async fn create_admin(users: &dyn UserRepository, args: CreateArgs) -> Result<User> {
    let name = args.name.trim().to_string();
    let email = args.email.trim().to_string();

    if name.is_empty() {
        bail!("Name must not be empty");
    }
    if !email.validate_email() {
        bail!("Invalid email address: {}", email);
    }
    if users.find_user_by_email(&email).await?.is_some() {
        bail!("A user with email {} already exists", email);
    }
    password::validate_password(&args.password).map_err(anyhow::Error::msg)?;

    let password_hash = password::hash_password(&args.password)?;

    let created = users
        .create_user(CreateUser {
            name,
            email,
            password_hash,
            role: Role::Admin,
            email_verified_at: Some(Utc::now()),
        })
        .await;

    match created {
        Ok(user) => Ok(user),
        Err(RepositoryError::DuplicateEmail) => bail!("A user with that email already exists"),
        Err(e) => Err(e).context("Failed to create administrator"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let pool = create_pool(DatabaseConfig::from_url(cli.database_url, 2))
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let repository = PgRepository::new(pool.clone());

    let result = match cli.command {
        Commands::Create(args) => create_admin(&repository, args).await,
    };
    close_pool(pool).await;

    let user = result?;
    println!("Administrator created");
    println!("  ID:         {}", user.id);
    println!("  Name:       {}", user.name);
    println!("  Email:      {}", user.email);
    println!("  Created at: {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));

    Ok(())
}
