//! Run command implementation

use crate::analyzer::create_analyzer;
use crate::config::{Config, ExecutionMode};
use crate::execution::{ExecutionEngine, PaperEngine};
use crate::feed::TickFeed;
use crate::orchestrator::TradeOrchestrator;
use crate::protocol::ProtocolClient;
use crate::risk::RiskManager;
use crate::store::{JsonFileStore, NullStore, StrategyStore};
use anyhow::Context;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Force paper trading regardless of config
    #[arg(long)]
    pub paper: bool,

    /// Override the traded symbols (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if self.paper {
            config.execution.mode = ExecutionMode::Paper;
        }
        if !self.symbols.is_empty() {
            config.trading.symbols = self.symbols.clone();
        }

        let (client, events) = ProtocolClient::new(config.venue.protocol_config());
        let client = Arc::new(client);
        let account = client
            .connect()
            .await
            .with_context(|| format!("Could not connect to {}", config.venue.endpoint()))?;

        let (execution, balance): (Arc<dyn ExecutionEngine>, _) = match config.execution.mode {
            ExecutionMode::Paper => {
                let engine: Arc<dyn ExecutionEngine> = Arc::new(PaperEngine::new(
                    config.execution.paper_balance,
                    config.execution.paper_payout_rate,
                    client.event_sender(),
                ));
                (engine, config.execution.paper_balance)
            }
            ExecutionMode::Live => {
                let account = account.context("Live trading needs an authorized session")?;
                config.trading.currency = account.currency.clone();
                let execution: Arc<dyn ExecutionEngine> = client.clone();
                (execution, account.balance)
            }
        };

        let store: Box<dyn StrategyStore> = match &config.store.path {
            Some(path) => Box::new(JsonFileStore::new(path)),
            None => Box::new(NullStore),
        };
        let risk = RiskManager::new(
            config.risk.clone(),
            config.staking.clone(),
            balance,
            chrono::Local::now().date_naive(),
        );
        let feed: Arc<dyn TickFeed> = client.clone();

        let mut orchestrator = TradeOrchestrator::new(
            config.trading.clone(),
            feed,
            execution,
            create_analyzer(&config.analyzer),
            risk,
            balance,
        )
        .with_store(store)
        .with_retry_policy(config.venue.retry_policy())
        .with_balance_stream(config.execution.mode == ExecutionMode::Live)
        .with_analyzer_weights(config.analyzer.weights.to_map());

        orchestrator.start().await?;

        let result = tokio::select! {
            result = orchestrator.run(events) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                Ok(())
            }
        };

        orchestrator.shutdown();
        client.close();
        result.context("Trading stopped on a fatal error")
    }
}
