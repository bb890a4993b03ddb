use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face reference matcher CLI")]
struct Cli {
    /// Base URL of the facegated server
    #[arg(long, env = "FACEGATE_SERVER", default_value = "http://127.0.0.1:3000", global = true)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a labeled reference image
    Enroll {
        /// Label (person name) the image belongs to
        #[arg(short, long)]
        label: String,
        /// Image file containing exactly one face
        image: PathBuf,
    },
    /// Match every face in an image against the enrolled labels
    Verify {
        image: PathBuf,
    },
    /// Show server phase, index version and per-label counts
    Status,
    /// Rebuild the index from the store
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server);

    let response = match cli.command {
        Commands::Enroll { label, image } => {
            let form = Form::new()
                .text("name", label)
                .part("image", image_part(&image).await?);
            client.post_form("/loadimages", form).await?
        }
        Commands::Verify { image } => {
            let form = Form::new().part("image", image_part(&image).await?);
            client.post_form("/api/verify-face", form).await?
        }
        Commands::Status => client.get("/api/status").await?,
        Commands::Reload => client.post("/api/reload").await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        std::process::exit(1);
    }
    Ok(())
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let request = self.http.get(self.url(path));
        self.send(path, request).await
    }

    async fn post(&self, path: &str) -> Result<Value> {
        let request = self.http.post(self.url(path));
        self.send(path, request).await
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<Value> {
        let request = self.http.post(self.url(path)).multipart(form);
        self.send(path, request).await
    }

    async fn send(&self, path: &str, request: reqwest::RequestBuilder) -> Result<Value> {
        tracing::debug!(url = %self.url(path), "sending request");
        let response = request
            .send()
            .await
            .with_context(|| format!("cannot reach facegated at {}", self.base))?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), "response received");

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(_) if status.is_success() => Ok(Value::String(body)),
            Err(_) => bail!("{path}: HTTP {status}: {body}"),
        }
    }
}

async fn image_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Part::bytes(data).file_name(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enroll_arguments() {
        let cli = Cli::try_parse_from(["facegate", "enroll", "--label", "alice", "alice.jpg"]).unwrap();
        match cli.command {
            Commands::Enroll { label, image } => {
                assert_eq!(label, "alice");
                assert_eq!(image, PathBuf::from("alice.jpg"));
            }
            _ => panic!("expected enroll"),
        }
    }

    #[test]
    fn test_server_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["facegate", "status", "--server", "http://faces:8080/"]).unwrap();
        assert_eq!(Client::new(&cli.server).url("/api/status"), "http://faces:8080/api/status");
    }
}
