use anyhow::{Context, bail};
use authcore::store::records::RecordType;
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use whatsapp_session::SessionConfig;
use whatsapp_session::session::{OfflineTransport, SessionManager};
use whatsapp_session::store::FileStore;

#[derive(Parser)]
#[command(name = "session-admin")]
#[command(about = "Inspect and repair stored messaging sessions")]
struct Cli {
    /// Store directory; defaults to $WA_SESSION_DATA_DIR or ./session-data
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted status of a session as JSON
    Status { session_id: String },
    /// Count stored key records
    Keys {
        session_id: String,
        #[arg(short = 't', long = "type")]
        record_type: Option<RecordType>,
    },
    /// Validate every stored key record
    Check { session_id: String },
    /// Reset a session locally without contacting the remote side
    Reset { session_id: String },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let backend = FileStore::new(config.data_dir.clone())
        .await
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
    let manager = SessionManager::new(Arc::new(backend), Arc::new(OfflineTransport), config);

    let result = match cli.command {
        Commands::Status { session_id } => show_status(&manager, &session_id).await,
        Commands::Keys {
            session_id,
            record_type,
        } => count_keys(&manager, &session_id, record_type).await,
        Commands::Check { session_id } => check_keys(&manager, &session_id).await,
        Commands::Reset { session_id } => manager
            .force_reset(&session_id)
            .await
            .map_err(anyhow::Error::from),
    };
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

async fn show_status(manager: &SessionManager, session_id: &str) -> Result<(), anyhow::Error> {
    let status = manager.get_status(session_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn count_keys(
    manager: &SessionManager,
    session_id: &str,
    record_type: Option<RecordType>,
) -> Result<(), anyhow::Error> {
    manager.session(session_id).await?;
    let store = manager.auth_store();
    match record_type {
        Some(record_type) => {
            let count = store.key_count(session_id, Some(record_type)).await?;
            println!("{record_type}: {count}");
        }
        None => {
            for record_type in RecordType::ALL {
                let count = store.key_count(session_id, Some(record_type)).await?;
                if count > 0 {
                    println!("{record_type}: {count}");
                }
            }
            println!("total: {}", store.key_count(session_id, None).await?);
        }
    }
    Ok(())
}

async fn check_keys(manager: &SessionManager, session_id: &str) -> Result<(), anyhow::Error> {
    manager.session(session_id).await?;
    let problems = manager.auth_store().check_keys(session_id).await?;
    if problems.is_empty() {
        info!("No malformed records in session {session_id}");
        return Ok(());
    }
    for problem in &problems {
        println!("{problem}");
    }
    bail!("{} malformed record(s) in session {session_id}", problems.len())
}
