use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "vanguard-cli")]
#[command(about = "Operator CLI for the Vanguard admission gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "VANGUARD_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "VANGUARD_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operating mode and switches
    Status,
    /// Failure rates per tracked endpoint
    Rates,
    /// Circuit states
    Circuits,
    /// Load shedding flag and memory utilization
    Shedding,
    /// Routes and active fallbacks
    Routes,
    /// Recent incidents
    Incidents,
    /// Quarantine an endpoint
    ForceOpen { endpoint: String },
    /// Close an endpoint's circuit
    ForceClosed { endpoint: String },
    /// Switch a route onto its fallback
    Activate { key: String, reason: String },
    /// Switch a route back to its primary
    Deactivate { key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (path, body) = match cli.command {
        Commands::Status => ("/vanguard/status", None),
        Commands::Rates => ("/vanguard/rates", None),
        Commands::Circuits => ("/vanguard/circuits", None),
        Commands::Shedding => ("/vanguard/shedding", None),
        Commands::Routes => ("/vanguard/routes", None),
        Commands::Incidents => ("/vanguard/incidents", None),
        Commands::ForceOpen { endpoint } => ("/admin/circuits/force-open", Some(json!({ "endpoint": endpoint }))),
        Commands::ForceClosed { endpoint } => ("/admin/circuits/force-closed", Some(json!({ "endpoint": endpoint }))),
        Commands::Activate { key, reason } => ("/admin/fallbacks/activate", Some(json!({ "key": key, "reason": reason }))),
        Commands::Deactivate { key } => ("/admin/fallbacks/deactivate", Some(json!({ "key": key }))),
    };

    let url = format!("{}{}", cli.url.trim_end_matches('/'), path);
    let request = match body {
        Some(body) => client.post(url).headers(headers).json(&body),
        None => client.get(url).headers(headers),
    };
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
