use anyhow::{Context, Result, bail};
use qrdrop_core::net::all_local_ipv4_addresses;
use qrdrop_core::{Credential, ServeRequest, ShareConfig, ShareEvent, ShareServer};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub const USAGE: &str = "\
Usage: qrdrop <PATH> [options]

Share one file (or a zipped directory) on the local network and print a QR code.

Options:
  -d, --duration <SECS>     How long the download stays available
  -a, --auth <USER:PASS>    Require HTTP Basic authentication
      --auth-token <B64>    Same, from a base64 encoded user:pass
      --host <HOST>         Host to put in the URL instead of the detected address
      --png <FILE>          Also save the QR code as a PNG image
      --config <FILE>       Read settings from this JSON file
  -h, --help                Show this help";

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub path: PathBuf,
    pub duration_secs: Option<u64>,
    pub credential: Option<Credential>,
    pub advertise_host: Option<String>,
    pub png: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Result of parsing: either run a share or print help
#[derive(Debug, PartialEq)]
pub enum Invocation {
    Share(CliArgs),
    Help,
}

pub fn parse_args<I>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("{} needs a value", flag))
        };

        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-d" | "--duration" => {
                let raw = value(&arg)?;
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("invalid duration {:?}", raw))?;
                if secs == 0 {
                    bail!("duration must be at least one second");
                }
                parsed.duration_secs = Some(secs);
            }
            "-a" | "--auth" => parsed.credential = Some(Credential::parse(&value(&arg)?)?),
            "--auth-token" => {
                parsed.credential = Some(Credential::from_basic_token(&value(&arg)?)?)
            }
            "--host" => parsed.advertise_host = Some(value(&arg)?),
            "--png" => parsed.png = Some(PathBuf::from(value(&arg)?)),
            "--config" => parsed.config = Some(PathBuf::from(value(&arg)?)),
            flag if flag.starts_with('-') && flag.len() > 1 => bail!("unknown option {}", flag),
            _ if path.is_some() => bail!("only one path can be shared at a time"),
            _ => path = Some(PathBuf::from(arg)),
        }
    }

    parsed.path = path.context("missing PATH to share")?;
    Ok(Invocation::Share(parsed))
}

/// Build the effective config: file (or default location), env, then flags
pub fn load_config(args: &CliArgs) -> Result<ShareConfig> {
    let mut config = match &args.config {
        Some(path) => ShareConfig::from_file(path)
            .with_context(|| format!("Config load failed: {}", path.display()))?,
        None => ShareConfig::load(),
    };
    config.apply_env_overrides();
    if let Some(host) = &args.advertise_host {
        config.advertise_host = Some(host.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Start one share, print its URL and QR code, and wait until it ends
pub async fn run(args: CliArgs, config: ShareConfig) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<ShareEvent>(256);
    let server = ShareServer::new(config)?.with_events(event_tx);

    let mut request = ServeRequest::new(&args.path);
    request.credential = args.credential;
    request.duration_secs = args.duration_secs;

    let handle = server
        .start(request)
        .await
        .with_context(|| format!("Cannot share {}", args.path.display()))?;

    let qr = handle.qr()?;
    println!("{}", qr.to_terminal_string());
    println!("Download: {}", handle.url());
    println!(
        "Available for {}s{}",
        handle.session().remaining().as_secs(),
        if handle.session().temp_artifact.is_some() {
            " (directory zipped, archive removed afterwards)"
        } else {
            ""
        }
    );

    let others: Vec<String> = all_local_ipv4_addresses()
        .into_iter()
        .map(|ip| ip.to_string())
        .filter(|ip| Some(ip.as_str()) != handle.url().host())
        .collect();
    if !others.is_empty() {
        println!("Other local addresses: {}", others.join(", "));
    }

    if let Some(png) = &args.png {
        qr.save_png(png)?;
        println!("QR code saved to {}", png.display());
    }

    // Events can be dropped, so stop on the handle's state, not on ServerStopped
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => log_event(&event),
            _ = handle.stopped() => {
                while let Ok(event) = event_rx.try_recv() {
                    log_event(&event);
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping share");
                handle.stop();
            }
        }
    }

    let reason = handle.join().await?;
    println!("Share stopped ({})", reason);
    Ok(())
}

fn log_event(event: &ShareEvent) {
    match event {
        ShareEvent::ServerStarted { url } => tracing::debug!("Server started: {}", url),
        ShareEvent::DownloadServed { from, name } => tracing::info!(
            "{} downloaded by {}",
            name,
            from.as_deref().unwrap_or("unknown client")
        ),
        ShareEvent::AccessDenied { from, status, path } => tracing::info!(
            "Denied {} ({}) to {}",
            path,
            status,
            from.as_deref().unwrap_or("unknown client")
        ),
        ShareEvent::ShuttingDown { reason } => tracing::info!("Shutting down: {}", reason),
        ShareEvent::ServerStopped { reason } => tracing::info!("Stopped: {}", reason),
        ShareEvent::CleanupFailed { path, error } => {
            tracing::warn!("Could not remove {}: {}", path.display(), error)
        }
        ShareEvent::ServerError(msg) => tracing::error!("Server error: {}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_invocation() {
        let parsed = parse_args(args(&[
            "photos",
            "-d",
            "60",
            "--auth",
            "user:pass",
            "--png",
            "qr.png",
            "--host",
            "192.168.1.5",
        ]))
        .unwrap();

        let Invocation::Share(cli) = parsed else {
            panic!("expected share invocation");
        };
        assert_eq!(cli.path, PathBuf::from("photos"));
        assert_eq!(cli.duration_secs, Some(60));
        assert_eq!(cli.credential, Some(Credential::new("user", "pass")));
        assert_eq!(cli.png, Some(PathBuf::from("qr.png")));
        assert_eq!(cli.advertise_host.as_deref(), Some("192.168.1.5"));
    }

    #[test]
    fn test_parse_auth_token() {
        let Invocation::Share(cli) =
            parse_args(args(&["notes.txt", "--auth-token", "dXNlcjpwYXNz"])).unwrap()
        else {
            panic!("expected share invocation");
        };
        assert_eq!(cli.credential, Some(Credential::new("user", "pass")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a", "b"])).is_err());
        assert!(parse_args(args(&["a", "--duration"])).is_err());
        assert!(parse_args(args(&["a", "--duration", "0"])).is_err());
        assert!(parse_args(args(&["a", "--duration", "soon"])).is_err());
        assert!(parse_args(args(&["a", "--bogus"])).is_err());
        assert!(parse_args(args(&["a", "--auth", "nocolon"])).is_err());
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(args(&["--help"])).unwrap(), Invocation::Help);
    }

    #[test]
    fn test_host_flag_overrides_config() {
        let cli = CliArgs {
            path: PathBuf::from("x"),
            advertise_host: Some("10.0.0.9".to_string()),
            config: None,
            ..Default::default()
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.advertise_host.as_deref(), Some("10.0.0.9"));
    }
}
