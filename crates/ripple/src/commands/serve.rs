//! `ripple serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use ripple_config::{CliSettings, Config};
use ripple_server::{run_server, server_config_from_ripple_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover ripple.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of files to serve (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to watch for changes; repeat for several (overrides config).
    #[arg(short, long = "watch", value_name = "DIR")]
    watch: Vec<PathBuf>,

    /// Enable verbose output (request and change logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let live_reload_enabled = self.resolve_live_reload_enabled();
        let watch = (!self.watch.is_empty()).then_some(self.watch);

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            root_dir: self.root,
            watch,
            live_reload_enabled,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            tracing::info!(path = %path.display(), "Loaded configuration");
        }

        let root_dir = &config.site_resolved.root_dir;
        if !root_dir.is_dir() {
            output.warning(&format!(
                "Root directory does not exist: {}",
                root_dir.display()
            ));
        }

        output.highlight(&format!(
            "Serving http://{}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!("Root directory: {}", root_dir.display()));

        let live_reload = &config.live_reload_resolved;
        if live_reload.enabled {
            let dirs: Vec<String> = live_reload
                .watch
                .iter()
                .map(|dir| dir.display().to_string())
                .collect();
            output.info(&format!("Live reload: watching {}", dirs.join(", ")));
        } else {
            output.info("Live reload: disabled");
        }

        let server_config = server_config_from_ripple_config(&config);
        run_server(server_config).await?;

        Ok(())
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        let argv = std::iter::once("serve").chain(args.iter().copied());
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_live_reload_default_is_unset() {
        assert_eq!(parse(&[]).resolve_live_reload_enabled(), None);
    }

    #[test]
    fn test_no_live_reload_flag() {
        assert_eq!(
            parse(&["--no-live-reload"]).resolve_live_reload_enabled(),
            Some(false)
        );
    }

    #[test]
    fn test_live_reload_explicit_value() {
        assert_eq!(
            parse(&["--live-reload", "true"]).resolve_live_reload_enabled(),
            Some(true)
        );
    }

    #[test]
    fn test_watch_is_repeatable() {
        let args = parse(&["-w", "assets", "--watch", "templates"]);
        assert_eq!(
            args.watch,
            vec![PathBuf::from("assets"), PathBuf::from("templates")]
        );
    }

    #[test]
    fn test_conflicting_live_reload_flags_rejected() {
        let result =
            TestCli::try_parse_from(["serve", "--live-reload", "true", "--no-live-reload"]);
        assert!(result.is_err());
    }
}
