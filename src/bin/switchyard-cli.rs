use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

#[derive(Parser)]
#[command(name = "switchyard-cli")]
#[command(about = "Management CLI for a running switchyard server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Token issued by `login`.
    #[arg(short, long)]
    token: Option<String>,

    #[arg(long, default_value = "X-AuthToken")]
    token_header: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the server version
    Version,
    /// Run a deep health inspection
    Inspect,
    /// Pause the server (load balancer ping turns 503)
    Pause,
    /// Resume a paused server
    Resume,
    /// Log in and print the issued token
    Login { username: String, password: String },
    /// Revoke the current token
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let header = HeaderName::from_bytes(cli.token_header.as_bytes())?;

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(header.clone(), HeaderValue::from_str(token)?);
    }

    match cli.command {
        Commands::Version => {
            let res = client.get(format!("{}/version", cli.url)).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Inspect => {
            let res = client.get(format!("{}/inspection", cli.url)).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Pause => set_paused(&client, &cli.url, headers, true).await?,
        Commands::Resume => set_paused(&client, &cli.url, headers, false).await?,
        Commands::Login { username, password } => {
            let res = client
                .post(format!("{}/j_security_check", cli.url))
                .form(&[("j_username", username), ("j_password", password)])
                .send()
                .await?;
            let token = res
                .headers()
                .get(&header)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match token {
                Some(token) if res.status().is_success() => println!("{}", token),
                _ => print_response(res).await?,
            }
        }
        Commands::Logout => {
            let res = client.delete(format!("{}/logout", cli.url)).headers(headers).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn set_paused(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    pause: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let res = client
        .put(format!("{}/status", url))
        .query(&[("pause", pause)])
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{}", status),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
