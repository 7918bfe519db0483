use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use fragment_store::FragmentSet;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "storage-cli")]
#[command(about = "Fragment Storage CLI", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    server_address: String,

    /// Principal sent as the upload owner
    #[arg(short, long, env = "FRAGMENT_STORE_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file to storage
    Upload {
        #[arg(short, long)]
        file: PathBuf,

        /// Display name to record instead of the file name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download a file from storage
    Download {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,

        #[arg(short, long, default_value = "output.txt")]
        output: PathBuf,
    },

    /// Show the fragment set of a file
    Info {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,
    },

    /// List files in storage
    List,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: String,
    stage: Option<String>,
    message: String,
}

struct StorageCli {
    client: reqwest::Client,
    base_url: String,
    owner: Option<String>,
}

impl StorageCli {
    fn new(server_address: &str, owner: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let base_url = if server_address.starts_with("http://") || server_address.starts_with("https://") {
            server_address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", server_address.trim_end_matches('/'))
        };
        Ok(Self { client, base_url, owner })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return serde_json::from_str(&text).context("server returned invalid JSON");
        }
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => match body.stage {
                Some(stage) => bail!("{} failed at {} stage: {}", body.kind, stage, body.message),
                None => bail!("{}: {}", body.kind, body.message),
            },
            Err(_) => bail!("server returned HTTP {}: {}", status, text),
        }
    }

    async fn upload_file(&self, file_path: &Path, name: Option<String>) -> anyhow::Result<Value> {
        let owner = self
            .owner
            .clone()
            .ok_or_else(|| anyhow!("an owner is required for uploads (--owner or FRAGMENT_STORE_OWNER)"))?;
        let file_data = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("File not found: {}", file_path.display()))?;
        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid filename"))?
            .to_string();

        let mut form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(file_data).file_name(filename),
        );
        if let Some(name) = name {
            form = form.text("name", name);
        }

        let response = self
            .client
            .post(self.url("/upload-file"))
            .header("X-Owner-Id", owner)
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn download_file(&self, file_id: &str, output: &Path) -> anyhow::Result<String> {
        let response = self
            .client
            .post(self.url("/download-file"))
            .json(&json!({ "file_id": file_id }))
            .send()
            .await?;
        let body = Self::read_json(response).await?;

        let content = body["content"]
            .as_str()
            .ok_or_else(|| anyhow!("response carried no content"))?;
        tokio::fs::write(output, content).await?;

        Ok(format!("File downloaded to {}", output.display()))
    }

    async fn file_info(&self, file_id: &str) -> anyhow::Result<FragmentSet> {
        let response = self.client.get(self.url(&format!("/files/{}", file_id))).send().await?;
        Ok(serde_json::from_value(Self::read_json(response).await?)?)
    }

    async fn list_files(&self) -> anyhow::Result<Vec<FragmentSet>> {
        let response = self.client.get(self.url("/files")).send().await?;
        Ok(serde_json::from_value(Self::read_json(response).await?)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let storage_cli = StorageCli::new(&cli.server_address, cli.owner)?;

    match cli.command {
        Commands::Upload { file, name } => {
            let result = storage_cli.upload_file(&file, name).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        },
        Commands::Download { file_id, output } => {
            let result = storage_cli.download_file(&file_id, &output).await?;
            println!("{}", result);
        },
        Commands::Info { file_id } => {
            let set = storage_cli.file_info(&file_id).await?;
            println!("{}", serde_json::to_string_pretty(&set)?);
        },
        Commands::List => {
            let files = storage_cli.list_files().await?;
            for file in files {
                println!("{}: {} ({} fragments)", file.id, file.original_name, file.fragments_count);
            }
        },
    }

    Ok(())
}
