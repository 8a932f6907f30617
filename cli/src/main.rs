use std::path::PathBuf;

use clap::{Parser, Subcommand};
use identa::config::Configuration;
use identa::crypto::Crypto;
use identa::database::Database;
use identa::user::{Registration, register};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of `config.yaml`.
    #[arg(long, short, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Create a staff, superuser account with the `admin` role.
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "IDENTA_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = Configuration::default().path(args.config).read()?;
    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = Database::from_config(postgres).await?;
    // Refresh tokens are never digested here.
    let crypto = Crypto::new(
        config.argon2.clone(),
        std::env::var("SALT").unwrap_or_default(),
    )?;

    match args.cmd {
        Commands::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
        } => {
            let registration = Registration {
                email,
                password: Zeroizing::new(password),
                first_name,
                last_name,
                role: None,
                business_name: None,
                admin: true,
            };

            match register(&db, &crypto, registration).await {
                Ok(identity) => println!(
                    "Administrator {:?} has been created with ID {}.",
                    identity.email, identity.id
                ),
                Err(err) => return Err(err.into()),
            }
        },
    }

    Ok(())
}
