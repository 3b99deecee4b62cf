//! Command-line arguments.
//!
//! Flags only gather values. Validation happens in the transport selector,
//! so a missing credential is reported the same way whether it came from
//! the command line or the config file.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::config::PublisherConfig;

/// Publish one footfall telemetry snapshot to AWS IoT Core.
#[derive(Debug, Parser)]
#[command(name = "footfall-publisher")]
#[command(about = "Publish one footfall telemetry snapshot over MQTT")]
#[command(version)]
pub struct Cli {
    /// TOML config file. Flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// AWS IoT custom endpoint
    #[arg(short = 'e', long = "endpoint")]
    pub endpoint: Option<String>,

    /// Root CA file path
    #[arg(short = 'r', long = "rootCA")]
    pub root_ca: Option<String>,

    /// Device certificate file path
    #[arg(short = 'c', long = "cert")]
    pub cert: Option<String>,

    /// Private key file path
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

    /// Use MQTT over WebSocket (TLS on port 443)
    #[arg(short = 'w', long = "websocket")]
    pub websocket: bool,

    /// People count from the local counter
    #[arg(short = 'p', long = "pi", allow_negative_numbers = true)]
    pub people_count: Option<i64>,
}

/// Exit code for an unusable command line: no options at all, or options
/// that fail to parse.
pub const USAGE_EXIT_CODE: u8 = 1;

impl Cli {
    /// Parse a full argument list, program name first. A bare invocation
    /// with no options is a usage error, the same as a malformed flag.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.len() <= 1 {
            return Err(
                Cli::command().error(ErrorKind::MissingRequiredArgument, "no options given"),
            );
        }
        Self::try_parse_from(args)
    }

    /// Process exit code for a parse result that did not yield a `Cli`.
    /// `--help` and `--version` are not failures.
    pub fn exit_code_for(error: &clap::Error) -> u8 {
        if error.use_stderr() { USAGE_EXIT_CODE } else { 0 }
    }

    /// Load the config file (if any) and apply flag overrides.
    pub fn load_config(&self) -> anyhow::Result<PublisherConfig> {
        let mut config = match &self.config {
            Some(path) => PublisherConfig::from_file(path)?,
            None => PublisherConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    /// Overwrite config values with any flags that were given.
    pub fn apply_to(&self, config: &mut PublisherConfig) {
        let endpoint = &mut config.endpoint;
        if let Some(host) = &self.endpoint {
            endpoint.host.clone_from(host);
        }
        if let Some(path) = &self.root_ca {
            endpoint.root_ca_path.clone_from(path);
        }
        if let Some(path) = &self.cert {
            endpoint.certificate_path.clone_from(path);
        }
        if let Some(path) = &self.key {
            endpoint.private_key_path.clone_from(path);
        }
        if self.websocket {
            endpoint.use_websocket = true;
        }
        if let Some(count) = self.people_count {
            config.people_count = count;
        }
    }
}
