//! # Setup
//!
//! One-time initialization of a pharmacy database: the settings record and
//! the first admin account. The server never creates either on its own.
//!
//! ## Usage
//! ```bash
//! SETUP_ADMIN_PASSWORD='a long passphrase' \
//!   cargo run -p apothecary-api --bin setup -- \
//!     --db ./apothecary.db --settings ./pharmacy.json --admin admin
//! ```
//!
//! `pharmacy.json` holds the settings as the API serves them
//! (`GET /api/v1/settings`).
//!
//! Re-running is safe: an existing settings record or admin is left alone.

use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use apothecary_core::{PharmacySettings, Role};
use apothecary_db::{Database, DbConfig, NewUser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    db_path: String,
    settings_path: String,
    admin_username: String,
    admin_full_name: String,
}

fn print_help() {
    println!("Apothecary Setup");
    println!();
    println!("Usage: setup --settings <FILE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --db <PATH>         Database file path (default: DATABASE_PATH or ./apothecary.db)");
    println!("  -s, --settings <FILE>   Pharmacy settings as JSON");
    println!("      --admin <USERNAME>  First admin's username (default: admin)");
    println!("      --admin-name <NAME> First admin's full name (default: Administrator)");
    println!("  -h, --help              Show this help message");
    println!();
    println!("Environment:");
    println!("  SETUP_ADMIN_PASSWORD    first admin's password (required when one is created)");
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        db_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "./apothecary.db".to_string()),
        settings_path: String::new(),
        admin_username: "admin".to_string(),
        admin_full_name: "Administrator".to_string(),
    };

    let mut argv = env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--db" | "-d" => args.db_path = argv.next().context("--db needs a path")?,
            "--settings" | "-s" => args.settings_path = argv.next().context("--settings needs a file")?,
            "--admin" => args.admin_username = argv.next().context("--admin needs a username")?,
            "--admin-name" => args.admin_full_name = argv.next().context("--admin-name needs a name")?,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    if args.settings_path.is_empty() {
        bail!("--settings is required (see --help)");
    }
    Ok(Some(args))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let raw = fs::read_to_string(&args.settings_path)
        .with_context(|| format!("reading {}", args.settings_path))?;
    let settings: PharmacySettings =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", args.settings_path))?;

    let db = Database::new(DbConfig::new(&args.db_path))
        .await
        .with_context(|| format!("opening {}", args.db_path))?;
    info!(path = %args.db_path, "Database ready");

    let admin = if db.users().count_with_role(Role::Admin).await? > 0 {
        warn!("An admin already exists, not creating another");
        None
    } else {
        let password = env::var("SETUP_ADMIN_PASSWORD").context("SETUP_ADMIN_PASSWORD must be set")?;
        let user = db
            .users()
            .create(NewUser {
                username: args.admin_username.clone(),
                full_name: args.admin_full_name.clone(),
                password,
                role: Role::Admin,
            })
            .await
            .context("creating admin")?;
        info!(username = %user.username, "Admin created");
        Some(user)
    };

    if db.settings().is_configured().await? {
        warn!("Pharmacy settings already initialized; use PUT /api/v1/settings to change them");
    } else {
        let actor = admin.as_ref().map(|u| u.id.as_str());
        let stored = db
            .settings()
            .initialize(&settings, actor)
            .await
            .context("initializing settings")?;
        info!(pharmacy = %stored.pharmacy_name, "Settings initialized");
    }

    db.close().await;
    Ok(())
}
