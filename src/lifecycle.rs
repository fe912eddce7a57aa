//! Per-user service management
//!
//! `spot install` registers `spot run` with the user's service manager
//! (systemd user unit on Linux, LaunchAgent on macOS) so the pipeline starts
//! at login and is restarted if it dies.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{Error, Result};

const SYSTEMD_UNIT: &str = "spot.service";
const LAUNCHD_LABEL: &str = "dev.spot.agent";

/// Where the installed service stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    NotInstalled,
    /// The manager answered with something unexpected
    Unknown(String),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::NotInstalled => f.write_str("not installed"),
            Self::Unknown(detail) => write!(f, "unknown ({detail})"),
        }
    }
}

/// What the service runs
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub binary_path: PathBuf,
    /// Arguments appended after `run`
    pub extra_args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("spot"),
            extra_args: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Full command line, program first
    #[must_use]
    pub fn program_arguments(&self) -> Vec<String> {
        let mut args = vec![self.binary_path.display().to_string(), "run".to_string()];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Supported per-user service managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    Systemd,
    Launchd,
}

impl ServiceManager {
    /// Manager for the running platform, if any
    #[must_use]
    pub const fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Systemd)
        } else if cfg!(target_os = "macos") {
            Some(Self::Launchd)
        } else {
            None
        }
    }

    /// Location of the unit or property list
    #[must_use]
    pub fn definition_path(self) -> Option<PathBuf> {
        let dirs = directories::BaseDirs::new()?;
        Some(match self {
            Self::Systemd => dirs.config_dir().join("systemd/user").join(SYSTEMD_UNIT),
            Self::Launchd => dirs
                .home_dir()
                .join("Library/LaunchAgents")
                .join(format!("{LAUNCHD_LABEL}.plist")),
        })
    }

    /// Service definition text
    #[must_use]
    pub fn render(self, config: &ServiceConfig, log_dir: &Path) -> String {
        match self {
            Self::Systemd => systemd_unit(config, log_dir),
            Self::Launchd => launchd_plist(config, LAUNCHD_LABEL, log_dir),
        }
    }

    /// Commands that activate a freshly written definition
    fn activate(self, definition: &Path) -> Vec<Vec<String>> {
        match self {
            Self::Systemd => vec![
                argv(&["systemctl", "--user", "daemon-reload"]),
                argv(&["systemctl", "--user", "enable", "--now", SYSTEMD_UNIT]),
            ],
            Self::Launchd => vec![argv(&[
                "launchctl",
                "load",
                "-w",
                &definition.display().to_string(),
            ])],
        }
    }

    /// Commands that stop the service before its definition is removed
    fn deactivate(self, definition: &Path) -> Vec<Vec<String>> {
        match self {
            Self::Systemd => vec![argv(&[
                "systemctl",
                "--user",
                "disable",
                "--now",
                SYSTEMD_UNIT,
            ])],
            Self::Launchd => vec![argv(&[
                "launchctl",
                "unload",
                &definition.display().to_string(),
            ])],
        }
    }

    fn status_query(self) -> Vec<String> {
        match self {
            Self::Systemd => argv(&["systemctl", "--user", "is-active", SYSTEMD_UNIT]),
            Self::Launchd => argv(&["launchctl", "list", LAUNCHD_LABEL]),
        }
    }

    /// Interpret the status query's exit code and output
    #[must_use]
    pub fn parse_status(self, succeeded: bool, stdout: &str) -> ServiceStatus {
        match self {
            Self::Systemd => match stdout.trim() {
                "active" => ServiceStatus::Running,
                "inactive" | "failed" => ServiceStatus::Stopped,
                other => ServiceStatus::Unknown(other.to_string()),
            },
            // launchctl list exits non-zero for labels it has not loaded
            Self::Launchd if succeeded => ServiceStatus::Running,
            Self::Launchd => ServiceStatus::Stopped,
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn unsupported() -> Error {
    Error::Config("no supported service manager on this platform".to_string())
}

/// Run one command and capture its exit status and stdout
fn invoke(command: &[String]) -> Result<(bool, String)> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::Config("empty service command".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Config(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        tracing::debug!(
            command = %command.join(" "),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "service command failed"
        );
    }

    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Run one command, failing on a non-zero exit
fn run_tool(command: &[String]) -> Result<()> {
    match invoke(command)? {
        (true, _) => Ok(()),
        (false, _) => Err(Error::Config(format!("{} failed", command.join(" ")))),
    }
}

/// Install and start the user service
///
/// # Errors
///
/// Returns error if the platform has no supported manager, the definition
/// cannot be written, or the manager rejects it
pub fn install_service(config: &ServiceConfig) -> Result<()> {
    let manager = ServiceManager::current().ok_or_else(unsupported)?;
    let path = manager.definition_path().ok_or_else(unsupported)?;

    let log_dir = log_dir().unwrap_or_else(|| std::env::temp_dir().join("spot"));
    std::fs::create_dir_all(&log_dir)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, manager.render(config, &log_dir))?;

    for step in manager.activate(&path) {
        run_tool(&step)?;
    }

    tracing::info!(?manager, path = %path.display(), "service installed");
    Ok(())
}

/// Stop the user service and remove its definition
///
/// A service that was never installed is not an error.
///
/// # Errors
///
/// Returns error if the definition exists but cannot be removed
pub fn uninstall_service() -> Result<()> {
    let manager = ServiceManager::current().ok_or_else(unsupported)?;
    let Some(path) = manager.definition_path().filter(|p| p.exists()) else {
        tracing::debug!(?manager, "service not installed");
        return Ok(());
    };

    for step in manager.deactivate(&path) {
        if let Err(e) = run_tool(&step) {
            tracing::debug!(error = %e, "deactivation step failed");
        }
    }
    std::fs::remove_file(&path)?;

    if manager == ServiceManager::Systemd {
        let _ = run_tool(&argv(&["systemctl", "--user", "daemon-reload"]));
    }

    tracing::info!(?manager, "service removed");
    Ok(())
}

/// Ask the service manager about spot
///
/// # Errors
///
/// Returns error if the manager cannot be queried
pub fn service_status() -> Result<ServiceStatus> {
    let Some(manager) = ServiceManager::current() else {
        return Ok(ServiceStatus::Unknown("platform not supported".to_string()));
    };
    if !manager.definition_path().is_some_and(|p| p.exists()) {
        return Ok(ServiceStatus::NotInstalled);
    }

    let (succeeded, stdout) = invoke(&manager.status_query())?;
    Ok(manager.parse_status(succeeded, &stdout))
}

/// Directory service logs are written to (`~/.spot/logs`)
#[must_use]
pub fn log_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".spot").join("logs"))
}

/// Service stdout log
#[must_use]
pub fn log_path() -> Option<PathBuf> {
    log_dir().map(|dir| dir.join("spot.log"))
}

/// systemd user unit running `spot run`
#[must_use]
pub fn systemd_unit(config: &ServiceConfig, log_dir: &Path) -> String {
    let lines = [
        "[Unit]".to_string(),
        "Description=spot voice media control".to_string(),
        "After=sound.target pipewire.service pulseaudio.service".to_string(),
        String::new(),
        "[Service]".to_string(),
        "Type=simple".to_string(),
        format!("ExecStart={}", config.program_arguments().join(" ")),
        "Restart=on-failure".to_string(),
        "RestartSec=5".to_string(),
        "Environment=RUST_LOG=info".to_string(),
        format!("StandardOutput=append:{}", log_dir.join("spot.log").display()),
        format!("StandardError=append:{}", log_dir.join("spot.err.log").display()),
        String::new(),
        "[Install]".to_string(),
        "WantedBy=default.target".to_string(),
    ];
    let mut unit = lines.join("\n");
    unit.push('\n');
    unit
}

/// LaunchAgent property list running `spot run`
#[must_use]
pub fn launchd_plist(config: &ServiceConfig, label: &str, log_dir: &Path) -> String {
    let string = |value: &str| format!("<string>{value}</string>");
    let stdout_log = log_dir.join("spot.log").display().to_string();
    let stderr_log = log_dir.join("spot.err.log").display().to_string();

    let mut plist = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#.to_string(),
        r#"<plist version="1.0">"#.to_string(),
        "<dict>".to_string(),
        "    <key>Label</key>".to_string(),
        format!("    {}", string(label)),
        "    <key>ProgramArguments</key>".to_string(),
        "    <array>".to_string(),
    ];
    plist.extend(
        config
            .program_arguments()
            .iter()
            .map(|arg| format!("        {}", string(arg))),
    );
    plist.extend([
        "    </array>".to_string(),
        "    <key>RunAtLoad</key>".to_string(),
        "    <true/>".to_string(),
        "    <key>KeepAlive</key>".to_string(),
        "    <true/>".to_string(),
        "    <key>StandardOutPath</key>".to_string(),
        format!("    {}", string(&stdout_log)),
        "    <key>StandardErrorPath</key>".to_string(),
        format!("    {}", string(&stderr_log)),
        "</dict>".to_string(),
        "</plist>".to_string(),
    ]);
    plist.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceConfig {
        ServiceConfig {
            binary_path: PathBuf::from("/usr/local/bin/spot"),
            extra_args: vec!["-v".to_string()],
        }
    }

    #[test]
    fn status_display() {
        assert_eq!(ServiceStatus::NotInstalled.to_string(), "not installed");
        assert_eq!(
            ServiceStatus::Unknown("activating".to_string()).to_string(),
            "unknown (activating)"
        );
    }

    #[test]
    fn program_arguments_start_with_run() {
        assert_eq!(
            service().program_arguments(),
            vec!["/usr/local/bin/spot", "run", "-v"]
        );
    }

    #[test]
    fn unit_runs_pipeline_and_logs_to_file() {
        let unit = systemd_unit(&service(), Path::new("/home/u/.spot/logs"));
        assert!(unit.contains("ExecStart=/usr/local/bin/spot run -v\n"));
        assert!(unit.contains("StandardOutput=append:/home/u/.spot/logs/spot.log"));
        assert!(unit.ends_with("WantedBy=default.target\n"));
    }

    #[test]
    fn plist_lists_every_argument() {
        let plist = launchd_plist(&service(), LAUNCHD_LABEL, Path::new("/tmp/logs"));
        assert!(plist.contains("<string>dev.spot.agent</string>"));
        assert!(plist.contains("        <string>run</string>"));
        assert!(plist.contains("<string>-v</string>"));
        assert!(plist.contains("<string>/tmp/logs/spot.err.log</string>"));
    }

    #[test]
    fn systemd_status_parsing() {
        let m = ServiceManager::Systemd;
        assert_eq!(m.parse_status(true, "active\n"), ServiceStatus::Running);
        assert_eq!(m.parse_status(false, "inactive\n"), ServiceStatus::Stopped);
        assert_eq!(m.parse_status(false, "failed"), ServiceStatus::Stopped);
        assert_eq!(
            m.parse_status(false, "activating"),
            ServiceStatus::Unknown("activating".to_string())
        );
    }

    #[test]
    fn launchd_status_follows_exit_code() {
        let m = ServiceManager::Launchd;
        assert_eq!(m.parse_status(true, "{}"), ServiceStatus::Running);
        assert_eq!(m.parse_status(false, ""), ServiceStatus::Stopped);
    }

    #[test]
    fn activation_commands() {
        let path = Path::new("/x/dev.spot.agent.plist");
        assert_eq!(
            ServiceManager::Launchd.activate(path),
            vec![argv(&["launchctl", "load", "-w", "/x/dev.spot.agent.plist"])]
        );
        let systemd = ServiceManager::Systemd.activate(path);
        assert_eq!(systemd.len(), 2);
        assert_eq!(systemd[1].last().map(String::as_str), Some("spot.service"));
    }

    #[test]
    fn definition_paths() {
        if let Some(path) = ServiceManager::Systemd.definition_path() {
            assert!(path.ends_with("systemd/user/spot.service"));
        }
        if let Some(path) = ServiceManager::Launchd.definition_path() {
            assert!(path.ends_with("Library/LaunchAgents/dev.spot.agent.plist"));
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(run_tool(&[]).is_err());
    }
}
