use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scribe",
    version,
    about = "Append newline-delimited JSON events from stdin to a log file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "scribe.yaml")]
    pub config: PathBuf,

    /// Event log file to append to (overrides config file setting)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Tag reported alongside every event (overrides config file setting)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Diagnostic log level when RUST_LOG is unset (overrides config file setting)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_config_in_working_directory() {
        let cli = Cli::parse_from(["scribe"]);
        assert_eq!(cli.config, PathBuf::from("scribe.yaml"));
        assert!(cli.destination.is_none());
        assert!(cli.tag.is_none());
    }

    #[test]
    fn accepts_overrides() {
        let cli = Cli::parse_from([
            "scribe",
            "-c",
            "/etc/scribe.yaml",
            "--destination",
            "/var/log/events.log",
            "--tag",
            "ops",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.destination, Some(PathBuf::from("/var/log/events.log")));
        assert_eq!(cli.tag.as_deref(), Some("ops"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
