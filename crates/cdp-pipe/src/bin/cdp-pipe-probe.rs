use anyhow::{Context, Result, bail};
use cdp_pipe::flags::HEADLESS;
use cdp_pipe::{LaunchConfig, Launcher, PipeTransport};
use clap::Parser;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Launch a browser over the debugging pipe, send one request and print the reply.
#[derive(Debug, Parser)]
#[command(name = "cdp-pipe-probe", version)]
struct Cli {
    /// Browser executable (defaults to the first Chromium found on PATH)
    #[arg(long)]
    bin: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Protocol method to call
    #[arg(long, default_value = "Browser.getVersion")]
    method: String,

    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Keep the browser's stdout/stderr
    #[arg(long)]
    forward_output: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the reply only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = LaunchConfig::pipe_mode();
    config.bin = cli.bin;
    config.forward_output = cli.forward_output;
    if cli.headful {
        config.flags.delete(HEADLESS);
    }

    let launcher = Launcher::new(config);
    let (transport, process) = launcher
        .launch_pipe()
        .await
        .context("failed to launch browser")?;
    info!(pid = process.pid(), "Browser started");

    let reply = tokio::time::timeout(
        Duration::from_secs(cli.timeout),
        call(&transport, &cli.method),
    )
    .await
    .context("timed out waiting for reply")
    .and_then(|reply| reply);

    if let Err(e) = transport.close().await {
        warn!(error = ?e, "Failed to close transport");
    }
    process.kill().await?;

    let reply = reply?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// Send `method` with id 1 and return the first message answering it.
async fn call(transport: &PipeTransport, method: &str) -> Result<Value> {
    let request = json!({ "id": 1, "method": method });
    transport.send(&serde_json::to_vec(&request)?).await?;

    loop {
        let frame = transport.receive().await?;
        let message: Value =
            serde_json::from_slice(&frame).context("browser sent a frame that is not JSON")?;

        if message.get("id") != Some(&json!(1)) {
            continue;
        }
        if let Some(error) = message.get("error") {
            bail!("{method} failed: {error}");
        }
        return Ok(message);
    }
}
