use anyhow::{Context, bail};
use clap::Parser;
use log::info;
use opn_relay::config::{Config, LoggingConfig, StaticFileConfig, UpstreamConfig};
use opn_relay::{RelayServer, logging};
use std::path::Path;

#[derive(Parser)]
#[clap(
    version,
    about = "HTTP relay exposing firmware status/update/upgrade actions of an OPNsense appliance"
)]
struct Args {
    #[clap(short, long, value_name = "ADDR", help = "Listen address (e.g., 127.0.0.1:8080)")]
    listen: Option<String>,

    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[clap(long, value_name = "URL", help = "Upstream appliance base URL (overrides OPN_URL)")]
    upstream_url: Option<String>,

    #[clap(long, value_name = "KEY", help = "Upstream API key (overrides OPN_KEY)")]
    api_key: Option<String>,

    #[clap(long, value_name = "SECRET", help = "Upstream API secret (overrides OPN_SECRET)")]
    api_secret: Option<String>,

    #[clap(long, help = "Skip TLS certificate validation for the upstream connection")]
    insecure: bool,

    #[clap(long, value_name = "SECONDS", help = "Upstream request timeout in seconds")]
    request_timeout: Option<u64>,

    #[clap(long, value_name = "DIR", help = "Serve static files from this directory")]
    static_dir: Option<String>,

    #[clap(long, value_name = "FILE", help = "Private key file path for HTTPS")]
    private_key: Option<String>,

    #[clap(long, value_name = "FILE", help = "Certificate file path for HTTPS")]
    certificate: Option<String>,

    #[clap(long, value_name = "LEVEL", help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<String>,

    #[clap(long, value_name = "FORMAT", help = "Log format: text or json")]
    log_format: Option<String>,

    #[clap(long, value_name = "FILE", help = "Generate a sample configuration file")]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(config_file) = &args.generate_config {
        generate_sample_config(config_file)?;
        println!("Sample configuration file generated: {}", config_file);
        return Ok(());
    }

    let mut config = if let Some(config_file) = &args.config {
        if !Path::new(config_file).exists() {
            bail!("Configuration file not found: {}", config_file);
        }
        Config::from_file(config_file)
            .with_context(|| format!("failed to load configuration from {}", config_file))?
    } else {
        create_config_from_args(&args)?
    };

    apply_overrides(&mut config, &args)?;
    config.validate().context("invalid configuration")?;

    let logging_config = config.logging.clone().unwrap_or_default();
    logging::init(&logging_config).context("failed to initialize logging")?;

    info!("Starting firmware relay...");
    info!("Upstream appliance: {}", config.upstream.base_url);

    let server = RelayServer::new(&config)?;
    let addr = config.listen_addr;
    let private_key = config.private_key.clone();
    let certificate = config.certificate.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run_with_config(addr, private_key, certificate).await {
            eprintln!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = server_handle => {
            if let Err(e) = result {
                eprintln!("Server task error: {}", e);
            }
        }
    }

    info!("Firmware relay stopped.");
    Ok(())
}

fn create_config_from_args(args: &Args) -> anyhow::Result<Config> {
    let listen_addr = args.listen.as_deref().unwrap_or("127.0.0.1:8080");
    let listen_addr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address: {}", listen_addr))?;

    // CLI flags win over the OPN_* environment variables.
    let upstream = if args.upstream_url.is_some() && args.api_key.is_some() && args.api_secret.is_some() {
        UpstreamConfig {
            base_url: args.upstream_url.clone().unwrap(),
            api_key: args.api_key.clone().unwrap(),
            api_secret: args.api_secret.clone().unwrap(),
            insecure_tls: args.insecure,
            request_timeout_secs: args.request_timeout.unwrap_or(30),
        }
    } else {
        UpstreamConfig::from_env()
            .context("upstream settings missing (use --upstream-url/--api-key/--api-secret or OPN_URL/OPN_KEY/OPN_SECRET)")?
    };

    Ok(Config {
        listen_addr,
        upstream,
        static_files: args.static_dir.clone().map(StaticFileConfig::single),
        private_key: args.private_key.clone(),
        certificate: args.certificate.clone(),
        logging: None,
    })
}

fn apply_overrides(config: &mut Config, args: &Args) -> anyhow::Result<()> {
    if let Some(url) = &args.upstream_url {
        config.upstream.base_url = url.clone();
    }
    if let Some(key) = &args.api_key {
        config.upstream.api_key = key.clone();
    }
    if let Some(secret) = &args.api_secret {
        config.upstream.api_secret = secret.clone();
    }
    if args.insecure {
        config.upstream.insecure_tls = true;
    }
    if let Some(timeout) = args.request_timeout {
        config.upstream.request_timeout_secs = timeout;
    }
    if let Some(static_dir) = &args.static_dir {
        config.static_files = Some(StaticFileConfig::single(static_dir.clone()));
    }

    let mut logging = config.logging.clone().unwrap_or_default();
    if let Some(level) = &args.log_level {
        logging.level = Some(logging::parse_log_level(level)?);
    }
    if let Some(format) = &args.log_format {
        logging.format = Some(logging::parse_log_format(format)?);
    }
    config.logging = Some(logging);

    Ok(())
}

fn generate_sample_config(file_path: &str) -> anyhow::Result<()> {
    let sample = r#"{
  "listen_addr": "127.0.0.1:8080",
  "upstream": {
    "base_url": "https://192.168.1.1",
    "api_key": "your-api-key",
    "api_secret": "your-api-secret",
    "insecure_tls": false,
    "request_timeout_secs": 30
  },
  "static_files": {
    "root_dir": "./static"
  }
}"#;

    std::fs::write(file_path, sample)
        .with_context(|| format!("failed to write {}", file_path))?;
    Ok(())
}
