//! Command line entry point for TN3270R
//!
//! Connects to a host, prints every screen the host paints, and exits when
//! the session closes. Lines typed on stdin are written at the cursor and
//! sent with Enter; `:pf<n>` sends a function key and `:quit` disconnects.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use tn3270r::config::default_config_path;
use tn3270r::{Session, SessionConfig, SessionEvent};

fn print_usage() {
    println!("TN3270R - IBM 3270 terminal client");
    println!();
    println!("Usage: tn3270r [OPTIONS] [HOST]");
    println!();
    println!("Options:");
    println!("  --server <host> or -s <host>        Host to connect to");
    println!("  --port <port> or -p <port>          Port to connect to (default: 23)");
    println!("  --device-type <name> or -t <name>   Device type, e.g. IBM-3278-2-E");
    println!("  --device-name <lu>                  LU name requested from a TN3270E host");
    println!("  --config <path> or -c <path>        Load settings from a JSON file");
    println!("  --help or -h                        Show this help message");
    println!();
    println!("Without a host the configuration file at {} is used.", default_config_path().display());
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", flag),
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<SessionConfig>> {
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut device_type: Option<String> = None;
    let mut device_name: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => host = Some(next_value(args, &mut i, "--server")?.to_string()),
            "--port" | "-p" => {
                let value = next_value(args, &mut i, "--port")?;
                port = Some(value.parse().with_context(|| format!("invalid port '{}'", value))?);
            }
            "--device-type" | "-t" => {
                device_type = Some(next_value(args, &mut i, "--device-type")?.to_string())
            }
            "--device-name" => device_name = Some(next_value(args, &mut i, "--device-name")?.to_string()),
            "--config" | "-c" => config_path = Some(PathBuf::from(next_value(args, &mut i, "--config")?)),
            "--help" | "-h" => return Ok(None),
            other if !other.starts_with('-') && host.is_none() => host = Some(other.to_string()),
            other => bail!("unknown argument '{}'", other),
        }
        i += 1;
    }

    let mut config = match (host, config_path) {
        (Some(host), None) => SessionConfig::new(host),
        (host, path) => {
            let path = path.unwrap_or_else(default_config_path);
            let mut config = SessionConfig::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if let Some(host) = host {
                config.host = host;
            }
            config
        }
    };
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(device_type) = device_type {
        config = config.with_device_type(&device_type)?;
    }
    if let Some(name) = device_name {
        config = config.with_device_name(name);
    }
    Ok(Some(config))
}

async fn handle_input(session: &Session, line: &str) -> anyhow::Result<()> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == ":quit" {
        session.disconnect().await?;
        return Ok(());
    }
    if let Some(number) = line.strip_prefix(":pf") {
        let number: u8 = number.parse().with_context(|| format!("invalid function key '{}'", line))?;
        session.send_pf(number).await?;
        return Ok(());
    }
    if !line.is_empty() {
        session.write_string(line, None).await?;
    }
    session.send_enter().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args)? {
        Some(config) => config,
        None => {
            print_usage();
            return Ok(());
        }
    };

    let session = Session::new(config)?;
    let mut events = session.subscribe();
    session
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}:{}", session.config().host, session.config().port))?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::ScreenUpdate) => println!("{}", session.screen_text().await?),
                Ok(SessionEvent::Connect) => {
                    let status = session.status();
                    eprintln!("connected as {} ({})", status.device_name, session.config().device_type);
                }
                Ok(SessionEvent::SocketError(message)) => eprintln!("socket error: {}", message),
                Ok(SessionEvent::Close) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => log::warn!("missed {} session events", skipped),
            },
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = handle_input(&session, &line).await {
                        eprintln!("{}", e);
                    }
                }
                None => {
                    session.disconnect().await?;
                    break;
                }
            },
        }
    }

    Ok(())
}
