use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spot::commands::CommandDispatcher;
use spot::voice::{
    AudioSource, ConfiguredEngines, EngineFactory, FrameError, MicrophoneSource, SAMPLE_RATE,
    frame_rms, samples_to_wav,
};
use spot::{Config, Grammar, Pipeline, PipelineEvent, media};

/// spot - hands-free voice control for media playback
#[derive(Parser)]
#[command(name = "spot", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Wake word (overrides config)
    #[arg(long, env = "SPOT_WAKE_WORD", global = true)]
    wake_word: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for the wake word and commands until interrupted (default)
    Run,
    /// Print the command grammar
    Grammar {
        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Dispatch a phrase to the media backend without listening
    Dispatch {
        /// Phrase, e.g. "jarvis skip twenty"
        #[arg(required = true, num_args = 1..)]
        phrase: Vec<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio as WAV
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
    /// Copy model and keyword assets into the data directory
    Assets,
    /// Install spot as a user service
    Install,
    /// Uninstall the spot user service
    Uninstall,
    /// Show service status
    Status,
    /// Tail the service log file
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
    /// Interactive first-run setup
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,spot=info",
        1 => "info,spot=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Command::Run);

    match command {
        Command::Install => return cmd_install(),
        Command::Uninstall => return cmd_uninstall(),
        Command::Status => return cmd_status(),
        Command::Logs { lines, follow } => return cmd_logs(lines, follow),
        Command::Setup => return spot::setup::run_setup(),
        _ => {}
    }

    let mut config = Config::load()?;
    if let Some(wake_word) = cli.wake_word {
        config.set_wake_word(&wake_word)?;
    }
    tracing::debug!(?config, "loaded configuration");

    let config = Arc::new(config);
    let grammar = Arc::new(Grammar::build(&config.wake_word));

    match command {
        Command::Run => run_pipeline(config, grammar).await,
        Command::Grammar { json } => print_grammar(&grammar, json),
        Command::Dispatch { phrase } => dispatch_once(&config, grammar, &phrase.join(" ")),
        Command::TestMic { duration, record } => test_mic(&config, duration, record.as_deref()),
        Command::Assets => materialize_assets(config, grammar),
        _ => Ok(()),
    }
}

/// Run the pipeline until Ctrl-C or an initialization failure
async fn run_pipeline(config: Arc<Config>, grammar: Arc<Grammar>) -> anyhow::Result<()> {
    let controller = media::controller_from_config(&config.media)?;
    tracing::info!(backend = controller.name(), "media backend ready");

    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&grammar), controller));
    let factory: Arc<dyn EngineFactory> =
        Arc::new(ConfiguredEngines::new(Arc::clone(&config), grammar));

    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Pipeline::new(factory, dispatcher).with_events(tx);
    pipeline.start()?;

    let wake_word = config.wake_word.clone();
    let outcome = wait_for_shutdown(&mut events, &wake_word).await;

    tokio::task::spawn_blocking(move || pipeline.stop()).await?;
    outcome
}

/// Follow pipeline events until Ctrl-C, a clean stop, or a failure
async fn wait_for_shutdown(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    wake_word: &str,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break Ok(());
            }
            event = events.recv() => match event {
                Some(PipelineEvent::Started) => {
                    tracing::info!("spot ready - say \"{wake_word}\"");
                }
                Some(PipelineEvent::PhaseChanged(state)) => {
                    tracing::debug!(%state, "pipeline phase");
                }
                Some(PipelineEvent::Dispatched { phrase, action }) => {
                    tracing::info!(%phrase, %action, "command handled");
                }
                Some(PipelineEvent::Failed(reason)) => {
                    break Err(anyhow::anyhow!("pipeline failed: {reason}"));
                }
                Some(PipelineEvent::Stopped) => break Ok(()),
                None => break Err(anyhow::anyhow!("pipeline exited without stopping")),
            }
        }
    }
}

fn print_grammar(grammar: &Grammar, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", grammar.to_json()?);
    } else {
        for phrase in grammar.phrases() {
            println!("{phrase}");
        }
    }
    Ok(())
}

fn dispatch_once(config: &Config, grammar: Arc<Grammar>, phrase: &str) -> anyhow::Result<()> {
    let controller = media::controller_from_config(&config.media)?;
    let dispatcher = CommandDispatcher::new(grammar, controller);
    let action = dispatcher.dispatch(phrase)?;
    println!("{action}");
    Ok(())
}

fn materialize_assets(config: Arc<Config>, grammar: Arc<Grammar>) -> anyhow::Result<()> {
    let engines = ConfiguredEngines::new(config, grammar);
    for path in engines.materialize_assets()? {
        println!("{}", path.display());
    }
    Ok(())
}

/// Test microphone input
fn test_mic(config: &Config, duration: u64, record: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Capturing {duration}s from the microphone, say something...\n");

    let mut source = MicrophoneSource::new(config.audio.device.clone(), config.audio.enhancements());
    source.open()?;

    println!("{SAMPLE_RATE} Hz mono, {} samples per frame", config.audio.frame_length);

    let mut frame = vec![0i16; config.audio.frame_length];
    let mut recorded = Vec::new();

    for second in 1..=duration {
        let until = Instant::now() + Duration::from_secs(1);
        let mut window = Vec::new();
        while Instant::now() < until {
            match source.read_frame(&mut frame) {
                Ok(n) => window.extend_from_slice(&frame[..n]),
                Err(FrameError::Timeout(_)) => {}
                Err(e) => anyhow::bail!("capture failed: {e}"),
            }
        }

        let energy = frame_rms(&window);
        let peak = window.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:5} | [{meter}]");

        if record.is_some() {
            recorded.extend(window);
        }
    }

    source.close()?;

    if let Some(path) = record {
        std::fs::write(path, samples_to_wav(&recorded, SAMPLE_RATE)?)?;
        println!("\nSaved {} samples to {}", recorded.len(), path.display());
    }

    println!("\nNo level movement? Check the device spot opens:");
    println!("  - set SPOT_AUDIO_DEVICE or [audio] device in config.toml");
    println!("  - list capture devices with `arecord -l` or `pactl list sources short`");

    Ok(())
}

/// Install spot as a user service
fn cmd_install() -> anyhow::Result<()> {
    let config = spot::lifecycle::ServiceConfig {
        binary_path: std::env::current_exe()?,
        extra_args: Vec::new(),
    };

    spot::lifecycle::install_service(&config)?;
    println!("spot installed as a user service");
    Ok(())
}

/// Uninstall the spot user service
fn cmd_uninstall() -> anyhow::Result<()> {
    spot::lifecycle::uninstall_service()?;
    println!("spot user service removed");
    Ok(())
}

/// Show service status
fn cmd_status() -> anyhow::Result<()> {
    let status = spot::lifecycle::service_status()?;
    println!("spot service: {status}");
    Ok(())
}

/// Tail the service log file
fn cmd_logs(lines: usize, follow: bool) -> anyhow::Result<()> {
    let log_path = spot::lifecycle::log_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine log path"))?;

    if !log_path.exists() {
        anyhow::bail!("log file not found: {}", log_path.display());
    }

    let mut args = vec![format!("-n{lines}"), log_path.display().to_string()];
    if follow {
        args.insert(0, "-f".to_string());
    }

    let status = std::process::Command::new("tail").args(&args).status()?;

    if !status.success() {
        anyhow::bail!("tail exited with {status}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_event_channel_is_an_error() {
        let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        tx.send(PipelineEvent::Started).unwrap();
        drop(tx);

        let err = wait_for_shutdown(&mut events, "jarvis").await.unwrap_err();
        assert!(err.to_string().contains("without stopping"));
    }

    #[tokio::test]
    async fn stopped_event_is_a_clean_exit() {
        let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        tx.send(PipelineEvent::Started).unwrap();
        tx.send(PipelineEvent::Stopped).unwrap();
        drop(tx);

        assert!(wait_for_shutdown(&mut events, "jarvis").await.is_ok());
    }

    #[tokio::test]
    async fn failed_event_is_an_error() {
        let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        tx.send(PipelineEvent::Failed("pipeline worker panicked".to_string()))
            .unwrap();

        let err = wait_for_shutdown(&mut events, "jarvis").await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }
}
