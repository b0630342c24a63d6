use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod commands;
mod config_cmds;
mod logging;

use cli::{Cli, Commands, ConfigCommands};
use commands::RunArgs;
use mmw_client::ModelMwClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format;

    let log_dir = cli.log_file.then(mmw_config::paths::log_dir);
    let log_guard = logging::init(cli.verbose, log_dir.as_deref())?;

    // Commands that never touch the service.
    match &cli.command {
        Commands::Endpoints => return commands::handle_endpoints(format),
        Commands::Config { cmd } => {
            return match cmd {
                ConfigCommands::Init => config_cmds::handle_config_init(cli.config.as_deref()),
                ConfigCommands::Path => config_cmds::handle_config_path(cli.config.as_deref()),
                ConfigCommands::Show => {
                    let config = config_cmds::load_config(cli.config.as_deref(), cli.staging)?;
                    config_cmds::handle_config_show(&config, format)
                }
            };
        }
        _ => {}
    }

    let config = config_cmds::load_config(cli.config.as_deref(), cli.staging)?;

    let exit_code = match cli.command {
        Commands::Lookup {
            endpoint,
            label,
            needed_key,
            alt_file,
        } => commands::handle_lookup(
            &config,
            &endpoint,
            &label,
            needed_key.as_deref(),
            alt_file.as_deref(),
            format,
        )?,
        command => {
            if config.service.api_key.is_none() {
                warn!("No API key configured; set service.api_key or MMW_API_KEY");
            }
            let client = ModelMwClient::from_config(&config)?;
            info!("Using ModelMW host {}", client.host());

            let cancel = client.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; stopping after the current request");
                    cancel.cancel();
                }
            });

            match command {
                Commands::Run {
                    endpoint,
                    label,
                    payload,
                    payload_file,
                    form,
                    no_cache,
                    needed_key,
                } => {
                    let args = RunArgs {
                        endpoint,
                        label,
                        payload,
                        payload_file,
                        form,
                        no_cache,
                        needed_key,
                    };
                    commands::handle_run(&client, args, format).await?
                }
                Commands::Batch { endpoint, aois } => {
                    commands::handle_batch(&client, &endpoint, &aois, format).await?
                }
                Commands::Gwlfe {
                    aoi,
                    land,
                    streams,
                } => commands::handle_gwlfe(&client, &aoi, land, streams, format).await?,
                Commands::Lookup { .. } | Commands::Endpoints | Commands::Config { .. } => 0,
            }
        }
    };

    if exit_code != 0 {
        drop(log_guard);
        std::process::exit(exit_code);
    }
    Ok(())
}
