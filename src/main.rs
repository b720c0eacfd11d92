use anyhow::Context;
use clap::Parser;
use digit_trader::cli::{Cli, Commands};
use digit_trader::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Invalid configuration is fatal
    let config = Config::load(&cli.config)
        .with_context(|| format!("Could not load config from {}", cli.config))?;

    match cli.command {
        Commands::Run(args) => {
            digit_trader::telemetry::init_telemetry(&config.telemetry)?;
            tracing::info!(
                mode = ?config.execution.mode,
                symbols = ?config.trading.symbols,
                analyzer = ?config.analyzer.kind,
                "Starting digit-trader"
            );
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Configuration OK: {}", cli.config);
            println!("  Venue: {}", config.venue.endpoint());
            println!(
                "  Token: {}",
                if config.venue.resolve_token().is_some() { "set" } else { "not set" }
            );
            println!("  Execution: {:?}", config.execution.mode);
            println!(
                "  Trading: {:?} {} x{} ticks, single-flight {:?}",
                config.trading.symbols,
                config.trading.contract_type,
                config.trading.duration_ticks,
                config.trading.single_flight
            );
            println!(
                "  Analyzer: {:?}, min history {}, min confidence {}",
                config.analyzer.kind,
                config.analyzer.min_history_length,
                config.analyzer.min_confidence
            );
            println!(
                "  Risk: daily loss {}, drawdown {}%, stake {}..{}",
                config.risk.daily_loss_limit,
                config.risk.max_drawdown_pct * rust_decimal_macros::dec!(100),
                config.risk.min_stake,
                config.risk.max_stake
            );
            println!(
                "  Staking: {:?}, base {}, x{}",
                config.staking.policy, config.staking.base_stake, config.staking.loss_multiplier
            );
        }
    }

    Ok(())
}
