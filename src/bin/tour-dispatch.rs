//! CLI front end for the dispatch core: loads a JSON fixture into the
//! in-memory store and runs one of the public operations against it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tour_dispatch_core::config::DispatchConfig;
use tour_dispatch_core::core::DispatchCore;
use tour_dispatch_core::domain::ids::{BookingId, GuideId};
use tour_dispatch_core::domain::warning::ResolutionAction;
use tour_dispatch_core::fixtures;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tour-dispatch")]
#[command(about = "Tour Command Center dispatch core CLI")]
#[command(version)]
struct Cli {
    /// Path to a JSON fixture describing tours, bookings, guides, and
    /// availability for one or more tenants.
    #[arg(short, long)]
    fixture: String,

    /// The day being dispatched, as YYYY-MM-DD.
    #[arg(short, long)]
    date: chrono::NaiveDate,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current dispatch status for the date.
    Status,
    /// List the tour runs aggregated for the date.
    Runs,
    /// List guides available for the date, with their resolved windows.
    Guides,
    /// Reconstruct per-guide timelines for the date.
    Timelines,
    /// Run the greedy optimizer and print the resulting assignments.
    Optimize,
    /// Assign one booking to one guide.
    Assign {
        #[arg(long)]
        booking: Uuid,
        #[arg(long)]
        guide: Uuid,
    },
    /// Remove a booking's confirmed assignment.
    Unassign {
        #[arg(long)]
        booking: Uuid,
    },
    /// Acknowledge a warning with no other change.
    Acknowledge {
        #[arg(long)]
        warning: Uuid,
    },
    /// Freeze the date, rejecting further mutation.
    Dispatch {
        #[arg(long)]
        by: String,
    },
}

#[tokio::main]
async fn main() {
    tour_dispatch_core::logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        log::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let fixture = fixtures::parse_fixture_file(&cli.fixture).with_context(|| format!("loading fixture {}", cli.fixture))?;
    let (store, organization_id) = fixtures::load_into_store(&fixture)
        .await
        .context("seeding in-memory store from fixture")?;
    let core = DispatchCore::new(store, DispatchConfig::default());
    let date = cli.date;

    match cli.command {
        Commands::Status => {
            let status = core.get_dispatch_status(organization_id, date).await?;
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        Commands::Runs => {
            let runs = core.get_tour_runs(organization_id, date).await?;
            for run in runs {
                println!(
                    "{} guests={} needed={} assigned={} status={:?}",
                    run.key, run.total_guests, run.guides_needed, run.guides_assigned, run.status
                );
            }
        }
        Commands::Guides => {
            let guides = core.get_available_guides(organization_id, date).await?;
            for g in guides {
                println!(
                    "{} ({}) available={} runs_assigned={}",
                    g.guide.full_name(),
                    g.guide.id,
                    g.availability.is_available,
                    g.assigned_run_count
                );
            }
        }
        Commands::Timelines => {
            let timelines = core.get_guide_timelines(organization_id, date).await?;
            for t in timelines {
                println!("guide {} utilization={}%", t.assignee_key, t.utilization);
                for seg in &t.segments {
                    println!("  {:?} {}..{} guests={}", seg.kind, seg.start_minutes, seg.end_minutes, seg.guest_count.unwrap_or(0));
                }
            }
        }
        Commands::Optimize => {
            let result = core.optimize(organization_id, date).await?;
            println!("assigned {} bookings, {} warnings, efficiency={}", result.assignments.len(), result.warnings.len(), result.efficiency);
            for w in &result.warnings {
                println!("  warning: {:?} {}", w.warning_type, w.message);
            }
        }
        Commands::Assign { booking, guide } => {
            let status = core
                .manual_assign(organization_id, date, BookingId::from_uuid(booking), GuideId::from_uuid(guide))
                .await?;
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        Commands::Unassign { booking } => {
            let status = core.unassign(organization_id, date, BookingId::from_uuid(booking)).await?;
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        Commands::Acknowledge { warning } => {
            let status = core
                .resolve_warning(organization_id, tour_dispatch_core::domain::ids::WarningId::from_uuid(warning), ResolutionAction::Acknowledge)
                .await?;
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        Commands::Dispatch { by } => {
            let result = core.dispatch(organization_id, date, &by).await?;
            println!("{}", serde_json::to_string_pretty(&result.status).unwrap_or_default());
        }
    }
    Ok(())
}
