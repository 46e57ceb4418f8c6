//! # load-auth
//!
//! Command line front end: run the data loader or the target hardware side of
//! a load authentication, or decode a protocol file.

use async_trait::async_trait;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use load_authentication::{
    AbortSource, DataLoader, LoadAuthError, LoadEntry, Result, TargetHardware, TargetServer,
    TargetState,
    config::{self, AuthConfig},
    error::Context,
    files::{
        InitializationAuthenticationFile, LoadAuthenticationRequestFile,
        LoadAuthenticationStatusFile, SerializableAuthentication,
    },
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    operations::{
        AuthenticationBase, DataLoaderHooks, INITIALIZATION_FILE_EXTENSION, REQUEST_FILE_EXTENSION,
        STATUS_FILE_EXTENSION, TargetHardwareHooks,
    },
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "load-auth",
    version,
    about = "Load authentication over TFTP (LAI/LAR/LAS)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to config/config.{RUST_ENV}.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate a load against a target hardware
    Dataloader(DataLoaderArgs),
    /// Serve one authentication as the target hardware
    Target(TargetArgs),
    /// Decode a .LAI, .LAR or .LAS file and print it as JSON
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct DataLoaderArgs {
    /// Target hardware identifier
    #[arg(long)]
    id: String,

    /// Target hardware position
    #[arg(long)]
    position: String,

    /// Target hardware IP address
    #[arg(long)]
    target_ip: IpAddr,

    /// Certificate to authenticate, as FILE:PART_NUMBER
    #[arg(long = "load", value_parser = parse_load)]
    load: LoadEntry,

    /// Target hardware TFTP port
    #[arg(long)]
    target_port: Option<u16>,

    /// Local TFTP server port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Directory certificates are served from
    #[arg(long)]
    load_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Data loader IP address
    #[arg(long)]
    data_loader_ip: Option<IpAddr>,

    /// Data loader TFTP port
    #[arg(long)]
    data_loader_port: Option<u16>,

    /// Local TFTP server port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Cryptographic key returned in the .LAI, hex encoded
    #[arg(long)]
    key_hex: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// File to decode; the extension selects the format
    file: PathBuf,
}

fn parse_load(value: &str) -> std::result::Result<LoadEntry, String> {
    match value.rsplit_once(':') {
        Some((file, part_number)) if !file.is_empty() && !part_number.is_empty() => {
            Ok(LoadEntry::new(file, part_number))
        }
        _ => Err(format!("expected FILE:PART_NUMBER, got '{value}'")),
    }
}

/// Prints every JSON document the data loader receives
struct PrintingHooks;

#[async_trait]
impl DataLoaderHooks for PrintingHooks {
    async fn authentication_initialization_response(&self, json: &str) {
        println!("{json}");
    }

    async fn authentication_information_status(&self, json: &str) {
        println!("{json}");
    }
}

struct KeyHooks {
    key: Vec<u8>,
}

#[async_trait]
impl TargetHardwareHooks for KeyHooks {
    async fn generate_cryptographic_key(&self, _base_file_name: &str) -> Vec<u8> {
        self.key.clone()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_ref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Error,
                LogComponent::Main,
                "main",
                "Command failed",
                error = %e
            );
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Inspect(args) = &cli.command {
        return inspect(args);
    }

    let config = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Dataloader(args) => run_data_loader(config, args).await,
        Command::Target(args) => run_target(config, args).await,
        Command::Inspect(_) => Ok(()),
    }
}

async fn run_data_loader(mut config: AuthConfig, args: DataLoaderArgs) -> Result<()> {
    if let Some(port) = args.target_port {
        config.data_loader.target_port = port;
    }
    if let Some(port) = args.listen_port {
        config.data_loader.server_port = port;
    }
    if let Some(dir) = args.load_dir {
        config.data_loader.load_directory = dir;
    }
    config.validate()?;

    let mut data_loader =
        DataLoader::new(config.data_loader, config.tftp).with_hooks(Arc::new(PrintingHooks));
    data_loader.set_target_hardware_id(args.id);
    data_loader.set_target_hardware_position(args.position);
    data_loader.set_target_hardware_ip(args.target_ip);
    data_loader.set_load_list(vec![args.load])?;
    let data_loader = Arc::new(data_loader);

    let running = Arc::clone(&data_loader);
    let mut authentication = tokio::spawn(async move { running.authenticate().await });

    let result = tokio::select! {
        joined = &mut authentication => joined,
        _ = tokio::signal::ctrl_c() => {
            linfo!(
                "system",
                LogStage::Abort,
                LogComponent::Main,
                "ctrl_c",
                "Operator abort requested"
            );
            data_loader.abort(AbortSource::Operator.code()).await?;
            authentication.await
        }
    };
    result.map_err(|e| LoadAuthError::internal_with_source("authentication task failed", e))?
}

async fn run_target(mut config: AuthConfig, args: TargetArgs) -> Result<()> {
    if let Some(ip) = args.data_loader_ip {
        config.target_hardware.data_loader_ip = ip;
    }
    if let Some(port) = args.data_loader_port {
        config.target_hardware.data_loader_port = port;
    }
    if let Some(port) = args.listen_port {
        config.target_hardware.server_port = port;
    }
    config.validate()?;

    let key = match args.key_hex {
        Some(text) => hex::decode(text)?,
        None => Vec::new(),
    };
    let target = TargetHardware::with_hooks(
        config.target_hardware,
        config.tftp.clone(),
        Arc::new(KeyHooks { key }),
    );
    let server = TargetServer::start(target.clone(), config.tftp).await?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "run_target",
        "Waiting for a data loader",
        local_addr = %server.local_addr()
    );

    let state = tokio::select! {
        state = target.wait_finished() => state,
        _ = tokio::signal::ctrl_c() => {
            target.abort(AbortSource::Operator.code()).await?;
            if target.state() == TargetState::Created {
                TargetState::Finished
            } else {
                target.wait_finished().await
            }
        }
    };

    let snapshot = target.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    target.shutdown().await;
    server.shutdown().await;

    match state {
        TargetState::Finished if snapshot.status_code == 0x0003 => Ok(()),
        other => Err(LoadAuthError::business(format!(
            "authentication ended in state {other:?}"
        ))),
    }
}

fn inspect(args: &InspectArgs) -> Result<()> {
    let data = Bytes::from(
        std::fs::read(&args.file).with_context(|| format!("cannot read {}", args.file.display()))?,
    );
    let name = args.file.to_string_lossy().to_uppercase();

    let json = if name.ends_with(INITIALIZATION_FILE_EXTENSION) {
        InitializationAuthenticationFile::deserialize(&data)?.serialize_json()?
    } else if name.ends_with(REQUEST_FILE_EXTENSION) {
        LoadAuthenticationRequestFile::deserialize(&data)?.serialize_json()?
    } else if name.ends_with(STATUS_FILE_EXTENSION) {
        LoadAuthenticationStatusFile::deserialize(&data)?.serialize_json()?
    } else {
        return Err(LoadAuthError::business(format!(
            "cannot tell the file type of {}",
            args.file.display()
        )));
    };
    println!("{json}");
    Ok(())
}
