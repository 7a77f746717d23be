use std::env;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;

use model_worker::worker::protocol::Ack;

const DEFAULT_URL: &str = "http://127.0.0.1:25566/healthz";

fn main() -> ExitCode {
    let url = env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    match check_health(&url) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Health check against {url} failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn check_health(url: &str) -> Result<()> {
    let url = Url::parse(url).context("Invalid URL argument")?;
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let response = client.get(url).send()?;
    if !response.status().is_success() {
        bail!("Request failed with status {}", response.status());
    }
    let ack: Ack = response.json().context("Unexpected health response")?;
    if !ack.ok {
        bail!("Service reported it is not ready");
    }
    Ok(())
}
