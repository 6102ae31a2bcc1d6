use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use pr_report::sheets::{self, CredentialStore, SheetsClient};

/// Sheet Upload — replace the contents of a Google Sheet with a CSV file.
#[derive(Parser, Debug)]
#[command(name = "sheet-upload", version, about)]
struct UploadCli {
    /// Path to the CSV file to read
    #[arg(short, long)]
    file: PathBuf,

    /// ID of the Google Sheet to upload to
    #[arg(short, long)]
    spreadsheet: String,

    /// Path to the token file; written after the first authorization
    #[arg(short, long)]
    token: PathBuf,

    /// Path to the OAuth client secrets file
    #[arg(short, long)]
    credentials: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = UploadCli::parse();
    let _main_span = info_span!("sheet_upload", spreadsheet = %cli.spreadsheet).entered();

    let http = reqwest::Client::new();
    let store = CredentialStore::new(&cli.token);
    let access_token = sheets::authorize(&store, &cli.credentials, &http).await?;

    info!(file = %cli.file.display(), "reading CSV");
    let grid = sheets::read_grid(&cli.file)?;

    let client = SheetsClient::new(http, access_token);
    let response = client.upload(&cli.spreadsheet, &grid).await?;

    match sheets::summarize(&response) {
        Some(text) => println!("{}", text),
        None => println!("{}", "No data found.".yellow()),
    }
    Ok(())
}
