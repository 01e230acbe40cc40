use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use voxgate::AccessTokenProvider;
use voxgate::audio::capture::{CpalAudioSource, list_devices, suppress_audio_warnings};
use voxgate::cli::{Cli, Commands, ConfigAction};
use voxgate::config::Config;
use voxgate::room::ws::WsRoomTransport;
use voxgate::turn::{CoordinatorConfig, TurnCoordinator};
use voxgate::verify::client::BackendClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_session(
                config,
                cli.device,
                cli.server_url,
                cli.room_url,
                cli.quiet,
                cli.verbose,
            )
            .await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxgate",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

async fn run_session(
    mut config: Config,
    device: Option<String>,
    server_url: Option<String>,
    room_url: Option<String>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before any audio backend probing
    suppress_audio_warnings();

    if let Some(device) = device {
        config.audio.device = Some(device);
    }
    if let Some(url) = server_url {
        config.server.api_url = url;
    }
    if let Some(url) = room_url {
        config.server.room_url = url;
    }
    config.validate()?;

    let auth = Arc::new(voxgate::auth::StaticTokenProvider::from_env());
    if auth.access_token().is_none() {
        anyhow::bail!("no access token; set VOXGATE_TOKEN and retry");
    }

    let backend = Arc::new(BackendClient::new(config.server.api_url.clone()));
    let device_name = config.audio.device.clone();
    let sources: voxgate::turn::coordinator::SourceFactory = Box::new(move || {
        Ok(Box::new(CpalAudioSource::new(device_name.as_deref())?)
            as Box<dyn voxgate::AudioSource>)
    });

    let coordinator_config = CoordinatorConfig {
        quiet,
        verbosity,
        ..CoordinatorConfig::from_config(&config)
    };

    let mut coordinator = TurnCoordinator::new(
        Box::new(WsRoomTransport::new()),
        backend.clone(),
        backend,
        auth,
        sources,
        coordinator_config,
    );

    coordinator.connect().await?;

    tokio::select! {
        result = coordinator.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!();
            }
        }
    }

    if coordinator.phase() != voxgate::TurnPhase::Idle {
        coordinator.disconnect().await;
    }

    Ok(())
}

fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    println!("Available audio input devices:");
    for device in devices {
        if let Some(name) = device.strip_suffix(" [recommended]") {
            println!("  {} {}", name, "[recommended]".green());
        } else {
            println!("  {}", device);
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::default_path().display());
        }
        ConfigAction::Show => {
            let config = load_config(path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
