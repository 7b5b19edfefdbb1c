use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use journey_planner::{CurrencyCode, PlannerConfig, PlannerContext, logging, web};

#[derive(Parser)]
#[command(name = "journey-planner", version, about = "Multi-currency journey cost tracking")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "JOURNEY_PLANNER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API together with the exchange rate refresher
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Recompute stored journey totals
    Recompute {
        /// Only this journey; all journeys when omitted
        #[arg(long)]
        journey: Option<i64>,
    },
    /// Fetch fresh rates for a base currency into the cache
    RefreshRates {
        #[arg(long)]
        base: String,
    },
    /// Print the cached rates for a base currency
    ShowRates {
        #[arg(long)]
        base: String,
    },
    /// Convert an amount between two currencies
    Convert { amount: f64, from: String, to: String },
    /// Delete the exchange rate cache file
    ClearRates,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PlannerConfig::load_from_path(cli.config)?;
    logging::init(&config.logging)?;

    let context = PlannerContext::from_config(config)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(context, port).await,
        Command::Recompute { journey } => recompute(&context, journey).await,
        Command::RefreshRates { base } => {
            let base = CurrencyCode::parse(&base)?;
            let snapshot = context.currency.force_refresh(&base).await?;
            println!(
                "Refreshed {} rates for {} from {}",
                snapshot.rates.len(),
                snapshot.base,
                context.currency.provider_name()
            );
            Ok(())
        }
        Command::ShowRates { base } => {
            let base = CurrencyCode::parse(&base)?;
            let Some(snapshot) = context.currency.get_cached_rates(&base).await else {
                bail!("No cached rates for {base}; run `refresh-rates --base {base}` first");
            };
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Command::Convert { amount, from, to } => {
            let from = CurrencyCode::parse(&from)?;
            let to = CurrencyCode::parse(&to)?;
            let converted = context.currency.convert(amount, &from, &to).await?;
            println!("{amount:.2} {from} = {converted:.2} {to}");
            Ok(())
        }
        Command::ClearRates => {
            context.currency.clear_cache().await?;
            println!("Exchange rate cache cleared");
            Ok(())
        }
    }
}

async fn serve(mut context: PlannerContext, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        context.config.server.port = port;
    }

    let refresher = if context.config.currency.auto_refresh {
        let refresher = context.refresher()?;
        refresher.start();
        Some(refresher)
    } else {
        info!("Exchange rate auto refresh disabled");
        None
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let result = web::run(context.app_state(), &context.config.server, shutdown).await;

    if let Some(refresher) = refresher {
        refresher.stop().await;
    }
    result
}

async fn recompute(context: &PlannerContext, journey: Option<i64>) -> Result<()> {
    if let Some(id) = journey {
        let summary = context
            .journeys
            .recompute(id)
            .await
            .with_context(|| format!("Failed to recompute journey {id}"))?;
        println!(
            "Journey {}: {:.2} {}",
            summary.journey_id, summary.total, summary.currency
        );
        for warning in &summary.warnings {
            println!(
                "  warning: {} {} counted in {} ({})",
                warning.kind, warning.item_id, warning.from, warning.reason
            );
        }
        return Ok(());
    }

    let report = context.journeys.recompute_all().await?;
    for summary in &report.summaries {
        println!(
            "Journey {}: {:.2} {}",
            summary.journey_id, summary.total, summary.currency
        );
    }
    for (id, error) in &report.failures {
        eprintln!("Journey {id}: {}", error.user_message());
    }
    println!(
        "Recomputed {} journeys, {} failed",
        report.summaries.len(),
        report.failures.len()
    );
    if !report.failures.is_empty() {
        bail!("{} journeys could not be recomputed", report.failures.len());
    }
    Ok(())
}
