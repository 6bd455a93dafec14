//! Lottoline operator CLI
//!
//! Drives the settlement engine against the RocksDB store: seed a catalog,
//! move draws through their lifecycle, place bets and settle.

use clap::{Parser, Subcommand};
use lottoline::{
    catalog::Catalog,
    common::types::{BetId, BetTypeId, DrawId, LottoNumber, UserId},
    config::LottoConfig,
    errors::LottoResult,
    games::{
        user_statistics, BetPlacement, ChannelSink, DrawLifecycle, EventSink, PlaceBetRequest,
        SettlementEngine,
    },
    storage::{CommitOutcome, RocksStore, Store},
    Clock, ReferenceGenerator, SystemClock,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Lottoline settlement CLI
#[derive(Parser)]
#[command(name = "lottoline")]
#[command(about = "Numbers-lottery bet placement and settlement")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the settlement store
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert games, bet types, odds and draws from a catalog file
    Seed {
        /// Catalog TOML; the built-in 5/90 catalog when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Create a user account with an opening balance
    OpenAccount {
        #[arg(long)]
        user_id: UserId,

        #[arg(long, default_value = "0")]
        balance: Decimal,
    },

    /// Place a bet against an open draw
    Place {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        draw_id: DrawId,

        #[arg(long)]
        bet_type_id: BetTypeId,

        /// Comma-separated selection, e.g. 7,21,45
        #[arg(long, value_delimiter = ',', required = true)]
        numbers: Vec<LottoNumber>,

        #[arg(long)]
        stake: Decimal,
    },

    /// Open and close draws whose betting windows have started or ended
    Advance,

    /// Record the winning numbers of a closed draw
    Publish {
        #[arg(long)]
        draw_id: DrawId,

        #[arg(long, value_delimiter = ',', required = true)]
        numbers: Vec<LottoNumber>,
    },

    /// Settle the active bets of one completed draw
    Settle {
        #[arg(long)]
        draw_id: DrawId,
    },

    /// Settle every completed draw that still has active bets
    Sweep,

    /// Cancel a draw and refund its active bets
    CancelDraw {
        #[arg(long)]
        draw_id: DrawId,
    },

    /// Record that a won bet has been paid out
    MarkPaid {
        #[arg(long)]
        bet_id: BetId,
    },

    /// Betting statistics for one user
    Stats {
        #[arg(long)]
        user_id: UserId,
    },
}

struct Services {
    config: LottoConfig,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    references: Arc<ReferenceGenerator>,
}

impl Services {
    fn open(config: LottoConfig) -> LottoResult<Self> {
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(&config.storage)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let references = Arc::new(ReferenceGenerator::from_entropy(clock.clone()));
        Ok(Self {
            config,
            store,
            clock,
            references,
        })
    }

    fn lifecycle(&self) -> DrawLifecycle {
        DrawLifecycle::new(
            self.store.clone(),
            self.clock.clone(),
            self.references.clone(),
            self.config.settlement.reference_retry_limit,
        )
    }

    fn placement(&self) -> BetPlacement {
        BetPlacement::new(
            self.store.clone(),
            self.clock.clone(),
            self.references.clone(),
            self.config.settlement.reference_retry_limit,
        )
    }

    fn settlement(&self, sink: Arc<dyn EventSink>) -> SettlementEngine {
        SettlementEngine::new(
            self.store.clone(),
            sink,
            self.clock.clone(),
            self.references.clone(),
            &self.config,
        )
    }
}

#[tokio::main]
async fn main() -> LottoResult<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LottoConfig::load(path)?,
        None => LottoConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.monitoring.log_level.as_filter())),
        )
        .init();

    let services = Services::open(config)?;

    match cli.command {
        Commands::Seed { catalog } => {
            let catalog = match catalog {
                Some(path) => Catalog::load(path)?,
                None => Catalog::standard(),
            };
            print_json(&catalog.seed(services.store.as_ref()).await?)
        }
        Commands::OpenAccount { user_id, balance } => {
            services.store.open_account(user_id, balance).await?;
            print_json(&serde_json::json!({ "user_id": user_id, "balance": balance }))
        }
        Commands::Place {
            user_id,
            draw_id,
            bet_type_id,
            numbers,
            stake,
        } => {
            let bet = services
                .placement()
                .place(PlaceBetRequest {
                    user_id,
                    draw_id,
                    bet_type_id,
                    selected_numbers: numbers,
                    stake_amount: stake,
                })
                .await?;
            print_json(&bet)
        }
        Commands::Advance => {
            let moved = services.lifecycle().advance_schedule().await?;
            print_json(&serde_json::json!({ "draws_transitioned": moved }))
        }
        Commands::Publish { draw_id, numbers } => {
            let draw = services.lifecycle().publish_results(draw_id, numbers).await?;
            print_json(&draw)
        }
        Commands::Settle { draw_id } => {
            let result = with_event_log(&services, |engine| async move { engine.settle_draw(draw_id).await }).await?;
            print_json(&result)
        }
        Commands::Sweep => {
            let results = with_event_log(&services, |engine| async move { engine.settle_pending_draws().await }).await?;
            print_json(&results)
        }
        Commands::CancelDraw { draw_id } => {
            let report = services.lifecycle().cancel_draw(draw_id).await?;
            print_json(&report)
        }
        Commands::MarkPaid { bet_id } => match services.lifecycle().mark_paid(bet_id).await? {
            CommitOutcome::Applied { bet, .. } => print_json(&bet),
            CommitOutcome::Conflict { current } => print_json(&serde_json::json!({
                "bet_id": bet_id,
                "applied": false,
                "status": current,
            })),
        },
        Commands::Stats { user_id } => {
            let stats = user_statistics(services.store.as_ref(), user_id).await?;
            print_json(&stats)
        }
    }
}

/// Run a settlement pass while a background task logs each event.
async fn with_event_log<T, F, Fut>(services: &Services, pass: F) -> LottoResult<T>
where
    F: FnOnce(Arc<SettlementEngine>) -> Fut,
    Fut: std::future::Future<Output = LottoResult<T>>,
{
    let (sink, mut events) = ChannelSink::channel(256);
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                bet_id = event.bet_id,
                user_id = event.user_id,
                draw_id = event.draw_id,
                outcome = ?event.outcome,
                amount = %event.amount,
                "bet settled"
            );
        }
    });

    let engine = Arc::new(services.settlement(Arc::new(sink)));
    let result = pass(engine).await;
    // The engine owns the last sender; once it is gone the logger drains and exits.
    let _ = logger.await;
    result
}

fn print_json<T: Serialize>(value: &T) -> LottoResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
