use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use fragment_store::{FragmentSetId, StorageManager};

#[derive(Parser)]
#[command(name = "fragment-store")]
#[command(about = "Local operator tool for the fragment store", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a file and store its fragments
    Ingest {
        #[arg(short, long)]
        file: PathBuf,

        /// Display name to record, defaults to the file name
        #[arg(short, long)]
        name: Option<String>,

        /// Principal recorded as the owner of the upload
        #[arg(short, long)]
        owner: String,
    },

    /// Reconstruct a file from its fragments
    Retrieve {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,

        #[arg(short, long, default_value = "output.txt")]
        output: PathBuf,
    },

    /// Show the fragment set recorded for a file
    Info {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,
    },

    /// List recorded fragment sets
    List,

    /// Delete stored fragments that no fragment set references
    Gc {
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_id(raw: &str) -> anyhow::Result<FragmentSetId> {
    raw.parse()
        .map_err(|e| anyhow!("invalid file id {:?}: {}", raw, e))
}

pub async fn execute_command(storage: &StorageManager, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { file, name, owner } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("invalid filename: {}", file.display()))?
                    .to_string(),
            };

            let set = storage.upload_file(&name, &data, &owner).await?;
            println!("{}", set.id);
        }
        Commands::Retrieve { file_id, output } => {
            let id = parse_id(&file_id)?;
            let retrieved = storage.download_file(&id).await?;
            retrieved
                .write_to(&output)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} reconstructed from {} fragments ({} skipped), saved as {}",
                retrieved.original_name,
                retrieved.fragments_used,
                retrieved.fragments_skipped,
                output.display()
            );
        }
        Commands::Info { file_id } => {
            let id = parse_id(&file_id)?;
            let set = storage.file_info(&id).await?;
            println!("{}", serde_json::to_string_pretty(&set)?);
        }
        Commands::List => {
            let files = storage.list_files().await?;
            if files.is_empty() {
                println!("no files stored");
            }
            for file in files {
                println!(
                    "{}: {} ({} fragments, owner {}, uploaded {})",
                    file.id, file.original_name, file.fragments_count, file.owner_id, file.uploaded_at
                );
            }
        }
        Commands::Gc { dry_run } => {
            let report = storage.collect_orphans(dry_run).await?;
            let verb = if dry_run { "would delete" } else { "deleted" };
            println!(
                "scanned {} fragments, {} referenced, {} {}, {} within grace period",
                report.scanned,
                report.referenced,
                verb,
                report.orphaned.len(),
                report.retained.len()
            );
            for key in &report.failed {
                eprintln!("failed to delete {}", key);
            }
        }
    }

    Ok(())
}
