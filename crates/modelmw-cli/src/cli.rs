use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use mmw_core::AreaOfInterest;

#[derive(Parser)]
#[command(name = "mmw")]
#[command(about = "ModelMyWatershed client: submit, poll and cache geoprocessing jobs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/modelmw-client/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the staging deployment
    #[arg(long, global = true)]
    pub staging: bool,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write logs to a run file under the state directory
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a job, poll it to completion and print the result
    Run {
        /// Endpoint path, e.g. api/analyze/land/2019_2019/
        endpoint: String,

        /// Job label; names the cache file
        label: String,

        /// JSON payload
        #[arg(long, conflicts_with_all = ["payload_file", "form"])]
        payload: Option<String>,

        /// Read the JSON payload from a file
        #[arg(long, conflicts_with = "form")]
        payload_file: Option<PathBuf>,

        /// Pre-encoded form body (legacy mmw/modeling/ endpoints)
        #[arg(long)]
        form: Option<String>,

        /// Ignore cached results and always submit
        #[arg(long)]
        no_cache: bool,

        /// Key a cached result must contain to be reused
        #[arg(long)]
        needed_key: Option<String>,
    },

    /// Print a cached result without contacting the service
    Lookup {
        endpoint: String,

        label: String,

        #[arg(long)]
        needed_key: Option<String>,

        /// File to read when the derived cache file does not exist
        #[arg(long)]
        alt_file: Option<PathBuf>,
    },

    /// Run one endpoint for several areas of interest, one after another
    Batch {
        endpoint: String,

        /// HUC code, WKAoI (<table>__<id>) or inline GeoJSON
        #[arg(required = true, value_parser = parse_aoi)]
        aois: Vec<AreaOfInterest>,
    },

    /// Run GWLF-E (MapShed prepare, then the model) for one area of interest
    Gwlfe {
        #[arg(value_parser = parse_aoi)]
        aoi: AreaOfInterest,

        /// Land-use layer override
        #[arg(long)]
        land: Option<String>,

        /// Stream network override
        #[arg(long)]
        streams: Option<String>,
    },

    /// List known endpoints
    Endpoints,

    /// Show/manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (API key redacted)
    Show,
    /// Write a commented config template
    Init,
    /// Print the config file location
    Path,
}

/// Parses HUC codes and WKAoIs, or a GeoJSON object when the argument starts
/// with `{`.
pub fn parse_aoi(raw: &str) -> Result<AreaOfInterest, String> {
    if raw.trim_start().starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| format!("invalid GeoJSON: {err}"))?;
        AreaOfInterest::from_value(value).map_err(|err| err.to_string())
    } else {
        raw.parse().map_err(|err: mmw_core::AoiError| err.to_string())
    }
}
