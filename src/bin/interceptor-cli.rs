use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "interceptor-cli")]
#[command(about = "Manage interception rules of an ows-interceptor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "INTERCEPTOR_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all rules
    List,
    /// Show one rule
    Get { id: u64 },
    /// Create a rule
    Create {
        /// REQUEST or RESPONSE
        #[arg(long)]
        direction: String,
        /// ALLOW, DENY or MODIFY
        #[arg(long)]
        rule_type: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        operation: String,
        /// Omit for a rule covering every endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Delete one rule
    Delete { id: u64 },
    /// List rules of a service for one direction
    ForService { service: String, direction: String },
    /// Delete every rule of an endpoint
    RemoveEndpoint { endpoint: String },
    /// Add one rule per operation of a service (scope: request, response or all)
    AddForEndpoint {
        endpoint: String,
        scope: String,
        service: String,
        rule_type: String,
    },
    /// MODIFY every WMS request and response of an endpoint
    ModifyAllWms { endpoint: String },
    /// MODIFY every WFS request and response of an endpoint
    ModifyAllWfs { endpoint: String },
    /// MODIFY every WMS request of an endpoint
    ModifyAllWmsRequests { endpoint: String },
    /// MODIFY every WFS request of an endpoint
    ModifyAllWfsRequests { endpoint: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/interceptorrules", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::List => client.get(&base),
        Commands::Get { id } => client.get(format!("{base}/{id}")),
        Commands::Create {
            direction,
            rule_type,
            service,
            operation,
            endpoint,
        } => client.post(&base).json(&json!({
            "direction": direction,
            "ruleType": rule_type,
            "service": service,
            "operation": operation,
            "endpoint": endpoint,
        })),
        Commands::Delete { id } => client.delete(format!("{base}/{id}")),
        Commands::ForService { service, direction } => {
            client.get(format!("{base}/service/{service}/event/{direction}"))
        }
        Commands::RemoveEndpoint { endpoint } => client.delete(format!("{base}/endpoint/{endpoint}")),
        Commands::AddForEndpoint {
            endpoint,
            scope,
            service,
            rule_type,
        } => client.post(format!("{base}/endpoint/{endpoint}/{scope}/{service}/{rule_type}")),
        Commands::ModifyAllWms { endpoint } => client.post(format!("{base}/endpoint/{endpoint}/modifyAllWms")),
        Commands::ModifyAllWfs { endpoint } => client.post(format!("{base}/endpoint/{endpoint}/modifyAllWfs")),
        Commands::ModifyAllWmsRequests { endpoint } => {
            client.post(format!("{base}/endpoint/{endpoint}/modifyAllWmsRequests"))
        }
        Commands::ModifyAllWfsRequests { endpoint } => {
            client.post(format!("{base}/endpoint/{endpoint}/modifyAllWfsRequests"))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
