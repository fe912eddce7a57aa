//! Interactive first-run setup wizard (`spot setup`)

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};

use crate::config::file::{
    KeywordFileConfig, MediaFileConfig, SpotConfigFile, config_file_path, load_config_file,
    write_config_file,
};
use crate::config::{SpotterEngine, SpotterMode};
use crate::media::MediaBackend;

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("spot setup\n");

    let existing = load_config_file();
    let config_path =
        config_file_path().unwrap_or_else(|| PathBuf::from("~/.config/spot/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. Wake word
    let wake_word: String = Input::new()
        .with_prompt("Wake word")
        .default(
            existing
                .wake_word
                .clone()
                .unwrap_or_else(|| crate::commands::DEFAULT_WAKE_WORD.to_string()),
        )
        .interact_text()?;

    // 2. Wake word engine
    let engines = ["Porcupine (keyword file, needs Picovoice key)", "Vosk (model only)"];
    let default_engine = match existing.keyword.engine {
        Some(SpotterEngine::Vosk) => 1,
        _ => 0,
    };
    let engine = match Select::new()
        .with_prompt("Wake word engine")
        .items(&engines)
        .default(default_engine)
        .interact()?
    {
        1 => SpotterEngine::Vosk,
        _ => SpotterEngine::Porcupine,
    };

    let access_key = if engine == SpotterEngine::Porcupine {
        prompt_access_key(existing.keyword.access_key.as_deref())?
    } else {
        existing.keyword.access_key.clone()
    };

    let background = Confirm::new()
        .with_prompt("Run wake word detection on its own capture stream?")
        .default(existing.keyword.mode == Some(SpotterMode::Background))
        .interact()?;

    // 3. Media backend
    let backends = ["playerctl (MPRIS players)", "log only (dry run)"];
    let default_backend = match existing.media.backend {
        Some(MediaBackend::Log) => 1,
        _ => 0,
    };
    let backend = match Select::new()
        .with_prompt("Media backend")
        .items(&backends)
        .default(default_backend)
        .interact()?
    {
        1 => MediaBackend::Log,
        _ => MediaBackend::Playerctl,
    };

    let player: String = Input::new()
        .with_prompt("Player to control (blank for any)")
        .default(existing.media.player.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    // 4. Build and write config
    let config_file = SpotConfigFile {
        wake_word: Some(wake_word.trim().to_lowercase()),
        keyword: KeywordFileConfig {
            engine: Some(engine),
            mode: Some(if background {
                SpotterMode::Background
            } else {
                SpotterMode::Embedded
            }),
            access_key,
            ..existing.keyword
        },
        media: MediaFileConfig {
            backend: Some(backend),
            player: Some(player).filter(|p| !p.trim().is_empty()),
            ..existing.media
        },
        ..existing
    };

    write_config_file(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());

    // 5. Service install (optional)
    let install_service = Confirm::new()
        .with_prompt("Install spot as a user service?")
        .default(false)
        .interact()?;

    if install_service {
        let service = crate::lifecycle::ServiceConfig {
            binary_path: std::env::current_exe()?,
            ..crate::lifecycle::ServiceConfig::default()
        };
        match crate::lifecycle::install_service(&service) {
            Ok(()) => println!("Service installed"),
            Err(e) => println!("Failed to install service: {e}"),
        }
    }

    println!("\nSetup complete! Run `spot assets` once, then `spot run -v`.");

    Ok(())
}

/// Ask for the Picovoice access key, keeping the current one on blank input
fn prompt_access_key(existing: Option<&str>) -> anyhow::Result<Option<String>> {
    let prompt = existing.map_or_else(
        || "Picovoice access key (PICOVOICE_ACCESS_KEY)".to_string(),
        |k| format!("Picovoice access key (current: {}, leave blank to keep)", mask(k)),
    );

    let input: String = Input::new()
        .with_prompt(&prompt)
        .allow_empty(true)
        .interact_text()?;

    Ok(if input.trim().is_empty() {
        existing.map(str::to_string)
    } else {
        Some(input.trim().to_string())
    })
}

/// Show only the ends of a secret
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
