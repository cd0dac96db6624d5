use anyhow::{Context, Result};
use log::{error, info};
use std::io;

use relay_bank_ctl::cli::{build_cli, handle_local_commands, handle_subcommands, Shell};
use relay_bank_ctl::output::formatter_for;
use relay_bank_ctl::{Config, ModbusClient};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, default_filter),
    );
    info!("🖥️  relayctl v{}", relay_bank_ctl::VERSION);

    let config = Config::from_matches(&matches).context("Invalid configuration")?;

    if handle_local_commands(&matches, &config).await? {
        return Ok(());
    }

    let client = ModbusClient::connect(&config)
        .await
        .with_context(|| format!("Cannot reach relay bank at {}", config.target()))?;
    let formatter = formatter_for(config.output_format);

    let handled = match handle_subcommands(&matches, &client, formatter.as_ref(), &mut io::stdout()).await {
        Ok(handled) => handled,
        Err(e) => {
            error!("❌ Command failed: {}", e);
            client.disconnect().await;
            return Err(e.into());
        }
    };

    if !handled {
        let stdin = io::stdin();
        let mut shell = Shell::new(
            &client,
            formatter.as_ref(),
            format!("{} (unit {})", client.peer_addr(), client.unit_id()),
            stdin.lock(),
            io::stdout(),
        );
        shell.run().await?;
    }

    client.disconnect().await;
    println!("Connection closed.");
    Ok(())
}
