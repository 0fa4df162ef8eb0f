use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use gymgate_core::{
    ApiClient, Client, ClientDirectory, ClientId, ClientUpdate, NewClient, RecognitionService,
    RegisterFace,
};
use gymgate_hw::{Camera, CaptureSettings, CaptureSource, V4lCapture};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gymgate", about = "gymgate access kiosk CLI")]
struct Cli {
    /// API base URL (default: $GYMGATE_API_URL or http://localhost:5000/api)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Camera device (default: $GYMGATE_CAMERA_DEVICE or /dev/video0)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage client records
    Clients {
        #[command(subcommand)]
        action: ClientsAction,
    },
    /// Capture a photo and enroll it as the client's face
    Enroll {
        /// Client ID
        id: ClientId,
    },
    /// Capture a photo and run one access check
    Verify,
    /// Check whether the API is reachable
    Health,
    /// Run camera diagnostics
    Test {
        /// Write the captured still to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ClientsAction {
    /// List all clients
    List,
    /// Show one client
    Show { id: ClientId },
    /// Create a client without a face
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Membership expiration (YYYY-MM-DD)
        #[arg(long)]
        expires: NaiveDate,
    },
    /// Update fields of an existing client
    Update {
        id: ClientId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Membership expiration (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<NaiveDate>,
        /// Activate or deactivate the membership
        #[arg(long)]
        active: Option<bool>,
    },
}

fn api_url(cli: &Cli) -> String {
    cli.api_url
        .clone()
        .or_else(|| std::env::var("GYMGATE_API_URL").ok())
        .unwrap_or_else(|| gymgate_core::DEFAULT_API_URL.to_string())
}

fn capture_settings(cli: &Cli) -> CaptureSettings {
    let mut settings = CaptureSettings::default();
    if let Some(device) = cli
        .device
        .clone()
        .or_else(|| std::env::var("GYMGATE_CAMERA_DEVICE").ok())
    {
        settings.device = device;
    }
    tracing::debug!(device = %settings.device, "camera device resolved");
    settings
}

fn print_value<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn describe(client: &Client) -> String {
    format!(
        "#{} {} <{}>\n  expires: {}\n  active: {}\n  face enrolled: {}",
        client.id, client.name, client.email, client.expiration_date, client.active, client.has_face
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = ApiClient::new(api_url(&cli), Duration::from_secs(10))?;
    tracing::debug!(url = %api.base_url(), "API base URL resolved");

    match &cli.command {
        Commands::Clients { action } => match action {
            ClientsAction::List => {
                let clients = api.list_clients().await.context("listing clients")?;
                print_value(cli.json, &clients, || {
                    if clients.is_empty() {
                        return "No clients registered".to_string();
                    }
                    clients.iter().map(describe).collect::<Vec<_>>().join("\n")
                })?;
            }
            ClientsAction::Show { id } => {
                let client = api.get_client(*id).await.context("fetching client")?;
                print_value(cli.json, &client, || describe(&client))?;
            }
            ClientsAction::Create {
                name,
                email,
                expires,
            } => {
                let client = api
                    .create_client(&NewClient {
                        name: name.clone(),
                        email: email.clone(),
                        expiration_date: *expires,
                    })
                    .await
                    .context("creating client")?;
                print_value(cli.json, &client, || format!("Created {}", describe(&client)))?;
            }
            ClientsAction::Update {
                id,
                name,
                email,
                expires,
                active,
            } => {
                let update = ClientUpdate {
                    name: name.clone(),
                    email: email.clone(),
                    expiration_date: *expires,
                    active: *active,
                };
                if update.is_empty() {
                    bail!("nothing to update: pass at least one of --name, --email, --expires, --active");
                }
                let client = api
                    .update_client(*id, &update)
                    .await
                    .context("updating client")?;
                print_value(cli.json, &client, || format!("Updated {}", describe(&client)))?;
            }
        },
        Commands::Enroll { id } => {
            let camera = V4lCapture::new(capture_settings(&cli));
            let image = camera.capture().await.context("capturing photo")?;
            camera.release();
            let client = api
                .register_face(&RegisterFace {
                    client_id: *id,
                    image,
                })
                .await
                .context("registering face")?;
            print_value(cli.json, &client, || format!("Enrolled {}", describe(&client)))?;
        }
        Commands::Verify => {
            let camera = V4lCapture::new(capture_settings(&cli));
            let image = camera.capture().await.context("capturing photo")?;
            camera.release();
            let outcome = api.verify_access(&image).await.context("verifying access")?;
            print_value(cli.json, &outcome, || {
                let mut text = format!(
                    "{}: {}",
                    if outcome.access_granted { "GRANTED" } else { "DENIED" },
                    outcome.message
                );
                if let Some(client) = &outcome.client {
                    text.push_str(&format!("\n  client: {} (#{})", client.name, client.id));
                }
                if let Some(confidence) = outcome.confidence {
                    text.push_str(&format!("\n  confidence: {confidence:.0}%"));
                }
                text
            })?;
        }
        Commands::Health => {
            let reachable = api.health().await;
            print_value(
                cli.json,
                &serde_json::json!({ "url": api.base_url(), "reachable": reachable }),
                || {
                    let state = if reachable { "reachable" } else { "unreachable" };
                    format!("{}: {state}", api.base_url())
                },
            )?;
            if !reachable {
                std::process::exit(1);
            }
        }
        Commands::Test { output } => {
            println!("Video capture devices:");
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("  (none found)");
            }
            for dev in &devices {
                println!("  {}: {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }

            let settings = capture_settings(&cli);
            println!("Capturing a still from {}...", settings.device);
            let camera = V4lCapture::new(settings);
            let image = camera.capture().await.context("capturing still")?;
            camera.release();
            println!("  ok: {} byte data URL", image.len());

            if let Some(path) = output {
                let jpeg = image
                    .jpeg_bytes()
                    .context("captured still is not a JPEG data URL")?;
                std::fs::write(path, &jpeg)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  wrote {}", path.display());
            }
        }
    }

    Ok(())
}
