use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use whisper_tts::app::{SpeakOptions, run_speak_command};
use whisper_tts::audio::list_devices;
use whisper_tts::catalog::{self, MODELS, VOICES};
use whisper_tts::cli::{Cli, Commands, ConfigAction, SettingsAction};
use whisper_tts::config::Config;
use whisper_tts::defaults::API_KEY_ENV;
use whisper_tts::service::TtsService;
use whisper_tts::settings::{
    FileSettingsStore, Settings, SettingsGateway, SettingsPatch, validate_api_key_format,
};
use whisper_tts::tts::OpenAiTransport;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    whisper_tts::logging::init(cli.verbose, cli.quiet);
    tracing::debug!(version = %whisper_tts::version_string(), "whisper-tts starting");

    match &cli.command {
        None => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            let store = settings_store()?;
            let settings = effective_settings(store.as_ref(), &cli)?;
            let (text, piped) = read_text(&cli)?;
            let options = SpeakOptions {
                interactive: !piped && std::io::stdin().is_terminal(),
                quiet: cli.quiet,
                save: cli.save,
                download_dir: config.download_dir(),
            };
            run_speak_command(config, settings, store, text, options).await?;
        }
        Some(Commands::TestVoice { text }) => {
            let config = load_config(cli.config.as_deref())?;
            let store = settings_store()?;
            let settings = effective_settings(store.as_ref(), &cli)?;
            handle_test_voice(&config, store, settings, &text.join(" ")).await?;
        }
        Some(Commands::Voices) => {
            print_voices();
        }
        Some(Commands::Devices) => {
            list_output_devices()?;
        }
        Some(Commands::Settings { action }) => {
            handle_settings_command(action, settings_store()?.as_ref())?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "whisper-tts",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/whisper-tts/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path()?)?
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Layer command-line flags over the loaded configuration.
fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if cli.no_stream {
        config.playback.incremental = false;
    }
    if let Some(preserve) = cli.preserve_pitch() {
        config.playback.preserve_pitch = preserve;
    }
    if let Some(timeout) = cli.sink_timeout {
        config.playback.sink_ready_timeout_ms = timeout.as_millis() as u64;
    }
    config
}

fn settings_store() -> Result<Arc<dyn SettingsGateway>> {
    let path = FileSettingsStore::default_path()?;
    Ok(Arc::new(FileSettingsStore::new(path)))
}

/// Stored settings with `--voice`, `--model`, `--instructions` and `--speed` applied.
/// Flags affect this run only.
fn effective_settings(store: &dyn SettingsGateway, cli: &Cli) -> Result<Settings> {
    let mut settings = store.get_settings()?;
    settings.apply(&SettingsPatch {
        voice: cli.voice.voice.clone(),
        model: cli.voice.model.clone(),
        playback_speed: cli.speed,
        instructions: cli.voice.instructions.clone(),
    });
    Ok(settings)
}

/// Text from arguments, `--file`, or stdin. The flag is true when stdin was consumed.
fn read_text(cli: &Cli) -> Result<(String, bool)> {
    if !cli.text.is_empty() {
        return Ok((cli.text.join(" "), false));
    }
    if let Some(path) = &cli.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok((text, false));
    }
    if std::io::stdin().is_terminal() {
        bail!("No text given. Pass TEXT, --file PATH, or pipe text on stdin.");
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;
    Ok((text, true))
}

async fn handle_test_voice(
    config: &Config,
    store: Arc<dyn SettingsGateway>,
    settings: Settings,
    text: &str,
) -> Result<()> {
    let transport = OpenAiTransport::new(config.api.endpoint.clone(), config.request_timeout())?;
    // test_voice never streams, so nothing is sent on this channel
    let (events, _unused) = tokio::sync::mpsc::unbounded_channel();
    let service = TtsService::new(Arc::new(transport), store, events);

    eprintln!(
        "Testing voice '{}' with model '{}'...",
        settings.voice, settings.model
    );
    let outcome = service.test_voice(text, Some(settings)).await;
    match outcome {
        whisper_tts::protocol::TestVoiceOutcome::Failed { error } => {
            eprintln!("{} {}", "✗".red(), error);
            std::process::exit(1);
        }
        _ => println!("{} {}", "✓".green(), "Voice test succeeded"),
    }
    Ok(())
}

fn print_voices() {
    println!("Models:");
    for model in MODELS {
        println!("  {:<18} {}", model.id.bold(), model.description.dimmed());
    }
    println!();
    println!("Voices:");
    for voice in VOICES {
        if voice.instruction_model_only {
            println!(
                "  {:<10} {}",
                voice.id,
                format!("({} only)", whisper_tts::defaults::INSTRUCTION_MODEL).dimmed()
            );
        } else {
            println!("  {}", voice.id);
        }
    }
}

/// List available audio output devices.
fn list_output_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("  {}      {}", "Voice:".dimmed(), settings.voice);
    println!("  {}      {}", "Model:".dimmed(), settings.model);
    println!("  {}      {:.1}x", "Speed:".dimmed(), settings.playback_speed);
    match settings.effective_instructions() {
        Some(instructions) => println!("  {} {}", "Instructions:".dimmed(), instructions),
        None if !settings.instructions.is_empty() => println!(
            "  {} {}",
            "Instructions:".dimmed(),
            "(ignored by this model)".yellow()
        ),
        None => {}
    }
}

/// Handle settings commands.
fn handle_settings_command(action: &SettingsAction, store: &dyn SettingsGateway) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = store.get_settings()?;
            println!("Settings:");
            print_settings(&settings);
            let key = if store.has_api_key()? {
                "stored".green().to_string()
            } else if std::env::var(API_KEY_ENV).is_ok_and(|k| !k.trim().is_empty()) {
                format!("from {}", API_KEY_ENV)
            } else {
                "not configured".red().to_string()
            };
            println!("  {}    {}", "API key:".dimmed(), key);
        }
        SettingsAction::SetKey { key } => {
            let key = match key {
                Some(key) => key.clone(),
                None => {
                    eprintln!("Paste your OpenAI API key and press Enter:");
                    let mut line = String::new();
                    std::io::stdin()
                        .read_line(&mut line)
                        .context("Failed to read API key")?;
                    line
                }
            };
            let key = key.trim();
            validate_api_key_format(key)?;
            store.save_api_key(key)?;
            println!("{}", "API key saved".green());
        }
        SettingsAction::ClearKey => {
            store.clear_all()?;
            println!("Settings and API key cleared");
        }
        SettingsAction::Set {
            voice,
            model,
            speed,
            instructions,
        } => {
            if let Some(model) = model
                && catalog::find_model(model).is_none()
            {
                bail!("Unknown model '{}'. Run `whisper-tts voices` to list models.", model);
            }
            if let Some(voice) = voice
                && catalog::find_voice(voice).is_none()
            {
                bail!("Unknown voice '{}'. Run `whisper-tts voices` to list voices.", voice);
            }
            let patch = SettingsPatch {
                voice: voice.clone(),
                model: model.clone(),
                playback_speed: *speed,
                instructions: instructions.clone(),
            };
            if patch.is_empty() {
                eprintln!("Nothing to change. Use --voice, --model, --speed or --instructions.");
                std::process::exit(1);
            }
            let settings = store.save_settings(&patch)?;
            println!("Settings saved:");
            print_settings(&settings);
        }
        SettingsAction::Reset => {
            let settings = store.reset_to_defaults()?;
            println!("Settings restored to defaults:");
            print_settings(&settings);
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: &ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = match custom_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path()?,
    };

    match action {
        ConfigAction::Dump => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            let toml = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", toml);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}
