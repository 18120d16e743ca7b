mod app;
mod error;

use crate::app::App;
use crate::error::RunnerError;
use algorithm::{stop_bot, StopMode};
use clap::{Parser, Subcommand, ValueEnum};
use common::EngineConfig;
use connector_fake::FillOverrides;
use model::{BotId, ConnectionId, OrderId};
use rust_decimal::Decimal;
use std::process::ExitCode;
use std::time::Duration;
use supervisor::StreamCommand;
use tokio::sync::watch;
use tracing::{error, info};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(author, version, about = "Order lifecycle engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the stream supervisor and consume START/STOP commands
    Run,
    /// Queue a START or STOP for a connection's stream worker
    Command {
        #[command(subcommand)]
        action: QueueCommand,
    },
    /// Reset an order's callback to WAITING and dispatch it again
    ReplayCallback { order: i64 },
    /// Cancel an ACTIVE order without running its callback
    CancelOrder { order: i64 },
    /// Switch a running bot OFF
    BotStop {
        bot: i64,
        /// What to do with the bot's ACTIVE orders
        #[arg(long, value_enum)]
        mode: StopModeArg,
    },
    /// Drive orders on FAKE connections by hand
    Fake {
        #[command(subcommand)]
        action: FakeCommand,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    Start { connection: i64 },
    Stop { connection: i64 },
}

#[derive(Subcommand)]
enum FakeCommand {
    /// Fill an order completely
    Fill {
        order: i64,
        /// Used when the order carries no price of its own
        #[arg(long)]
        price: Option<Decimal>,
        /// Report this base quantity instead of the order's
        #[arg(long)]
        filled_quantity: Option<Decimal>,
        /// Report this quote quantity instead of the order's
        #[arg(long)]
        quote_quantity: Option<Decimal>,
    },
    /// Cancel an order and its active OCO sibling
    Cancel { order: i64 },
    /// Expire an order
    Expire { order: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum StopModeArg {
    /// Leave ACTIVE orders resting
    Freeze,
    /// Cancel ACTIVE orders
    Keep,
}

impl From<StopModeArg> for StopMode {
    fn from(mode: StopModeArg) -> Self {
        match mode {
            StopModeArg::Freeze => StopMode::Freeze,
            StopModeArg::Keep => StopMode::Keep,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    common::init_logging();
    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command) -> Result<(), RunnerError> {
    let app = App::build(EngineConfig::from_env()?)?;

    match command {
        Command::Run => run(app).await,
        Command::Command { action } => {
            let command = match action {
                QueueCommand::Start { connection } => StreamCommand::start(ConnectionId(connection)),
                QueueCommand::Stop { connection } => StreamCommand::stop(ConnectionId(connection)),
            };
            let queue = app.command_queue()?;
            queue.publish(&command).await?;
            info!(queue = %queue.queue(), payload = %command.to_json(), "command queued");
            Ok(())
        }
        Command::ReplayCallback { order } => {
            let outcome = app.engine.replay_callback(OrderId(order)).await?;
            info!(order_id = order, outcome = ?outcome, "callback replayed");
            Ok(())
        }
        Command::CancelOrder { order } => {
            let order_id = OrderId(order);
            let bot = app.store.bot_for_order(order_id)?;
            app.connections
                .gateway(bot.connection_id, app.engine.sink())?
                .cancel_order(order_id)
                .await?;
            let order = app.store.order(order_id)?;
            info!(order_id = %order_id, status = %order.status, "cancel done");
            Ok(())
        }
        Command::BotStop { bot, mode } => {
            let report = stop_bot(BotId(bot), mode.into(), &app.connections, app.engine.sink()).await?;
            info!(
                bot_id = bot,
                canceled = report.canceled.len(),
                failed = report.failed.len(),
                "bot stopped"
            );
            Ok(())
        }
        Command::Fake { action } => {
            let injector = app.injector();
            match action {
                FakeCommand::Fill {
                    order,
                    price,
                    filled_quantity,
                    quote_quantity,
                } => {
                    let overrides = FillOverrides {
                        price,
                        filled_quantity,
                        quote_quantity,
                    };
                    let outcome = injector.fill_with(OrderId(order), overrides).await?;
                    info!(order_id = order, outcome = ?outcome, "filled");
                }
                FakeCommand::Cancel { order } => {
                    let outcomes = injector.cancel(OrderId(order)).await?;
                    info!(order_id = order, outcomes = ?outcomes, "canceled");
                }
                FakeCommand::Expire { order } => {
                    let outcome = injector.expire(OrderId(order)).await?;
                    info!(order_id = order, outcome = ?outcome, "expired");
                }
            }
            Ok(())
        }
    }
}

async fn run(app: App) -> Result<(), RunnerError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl+c, shutting down");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let health_metrics = app.metrics.clone();
    let mut health_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = health_metrics.snapshot();
                    info!(
                        status = %snapshot.health_status(),
                        events = snapshot.events_received,
                        applied = snapshot.transitions_applied,
                        stale = snapshot.stale_rejected,
                        callbacks_done = snapshot.callbacks_done,
                        callbacks_failed = snapshot.callbacks_failed,
                        worker_restarts = snapshot.worker_restarts,
                        "health check"
                    );
                }
                changed = health_shutdown.changed() => {
                    if changed.is_err() || *health_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    let queue = app.command_queue()?;
    info!(queue = %queue.queue(), "supervisor starting");
    let result = app.supervisor().run(queue, shutdown_rx).await;
    let _ = shutdown_tx.send(true);

    println!("\n{}", app.metrics.snapshot());
    Ok(result?)
}
