use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "metrics-cli")]
#[command(about = "Command-line client for the metrics server", long_about = None)]
struct Cli {
    #[arg(short, long, env = "METRICS_URL", default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a single value (gauge replaces, counter adds)
    Update {
        kind: String,
        name: String,
        value: String,
    },
    /// Read the current value of a metric
    Value { kind: String, name: String },
    /// Check that the server and its storage are reachable
    Ping,
    /// Fetch a metric as JSON
    Get { kind: String, name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = reqwest::Url::parse(&cli.url)?;

    match cli.command {
        Commands::Update { kind, name, value } => {
            let res = client
                .post(endpoint(&base, &["update", &kind, &name, &value])?)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .send()
                .await?;
            print_text(res).await?;
        }
        Commands::Value { kind, name } => {
            let res = client
                .get(endpoint(&base, &["value", &kind, &name])?)
                .send()
                .await?;
            print_text(res).await?;
        }
        Commands::Ping => {
            let res = client.get(endpoint(&base, &["ping"])?).send().await?;
            print_text(res).await?;
        }
        Commands::Get { kind, name } => {
            let res = client
                .post(endpoint(&base, &["value", ""])?)
                .json(&json!({ "id": name, "type": kind }))
                .send()
                .await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

/// Append `segments` to the base URL, percent-encoding each one.
fn endpoint(base: &reqwest::Url, segments: &[&str]) -> Result<reqwest::Url, Box<dyn std::error::Error>> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{} cannot be used as a base URL", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn status_error(status: reqwest::StatusCode, text: &str) -> Box<dyn std::error::Error> {
    if text.is_empty() {
        format!("server returned status {}", status).into()
    } else {
        format!("server returned status {}: {}", status, text.trim_end()).into()
    }
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(status_error(status, &text));
    }
    if text.is_empty() {
        println!("{}", status);
    } else {
        println!("{}", text);
    }
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(status_error(status, &text));
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
