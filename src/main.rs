mod autopilot;
mod error;
mod flight;
mod geo;
mod logging;
mod mission;
mod operation;
mod perception;
mod plan;
mod release;

use autopilot::{AutopilotController, AutopilotLink};
use clap::Parser;
use flight::{FlightConfig, FlightManager};
use operation::{Operation, Status};
use perception::{BriefedTargetDetector, FileCamera};
use plan::MissionPlan;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "skycourier",
    version,
    about = "Autonomous drop-mission controller for a fixed-wing UAS"
)]
struct Options {
    /// Autopilot connection: serial device, tcp://host:port or udp://host:port
    #[arg(long, default_value = "/dev/ttyACM0")]
    connection: String,

    /// Mission plan file
    #[arg(long)]
    plan: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = Options::parse();

    let log_path = match logging::init() {
        Ok(path) => path,
        Err(err) => {
            eprintln!("failed to set up flight logging: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("flight log: {}", log_path.display());

    match run(options).await {
        Ok(Status::Ok) => ExitCode::SUCCESS,
        Ok(Status::Abort) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(options: Options) -> anyhow::Result<Status> {
    let plan = MissionPlan::load(&options.plan)?;
    info!("loaded mission plan from {}", options.plan.display());

    let link = Arc::new(AutopilotLink::connect(&options.connection).await?);

    // Ctrl-C cancels every blocking wait; the state machine treats that as
    // an abort and lands if airborne.
    let cancel = link.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown requested, cancelling waits");
            cancel.cancel();
        }
    });

    let controller = AutopilotController::new(link.clone());
    let manager = FlightManager::new(controller, FlightConfig::from_plan(&plan));
    let camera = FileCamera::new(plan.image_dir.clone());
    let detector = BriefedTargetDetector::new(plan.targets.clone());

    let mut operation = Operation::new(
        plan,
        Box::new(manager),
        Box::new(camera),
        Box::new(detector),
    );
    operation.run().await;
    info!(
        "final state: {} target(s), {} drop(s), {} detection attempt(s), trace {}",
        operation.targets().len(),
        operation.drop_count(),
        operation.detect_attempts(),
        operation
            .phase_trace()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> "),
    );

    link.shutdown();
    Ok(operation.status())
}
