//! DrishtiSLAM route replay
//!
//! Replays a taught route through the follow driver:
//!
//! - loads the route XML and, if present, the observation log
//! - feeds each taught pose to the [`RouteFollower`], which builds and
//!   swaps map buffers
//! - surveys the active buffer with that waypoint's rays, starting from a
//!   nominal pose displaced by `--offset-mm`, and logs the estimate
//!
//! Usage:
//!   drishti-slam --path route.xml --rays rays.bin
//!   drishti-slam -c configs/drishti.toml -p route.xml -r rays.bin --offset-mm 80

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use drishti_slam::config::DrishtiConfig;
use drishti_slam::engine::{FollowEvent, RouteFollower};
use drishti_slam::io::{load_observations, load_route};

/// Replay a taught route and survey-localize along it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to configs/drishti.toml if it exists)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Taught route XML
    #[arg(short, long)]
    path: PathBuf,

    /// Observation log recorded with the route
    #[arg(short, long)]
    rays: Option<PathBuf>,

    /// Displacement of the nominal pose from the taught pose (mm, along +x)
    #[arg(long, default_value_t = 0.0)]
    offset_mm: f32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => DrishtiConfig::load(path)?,
        None => DrishtiConfig::load_default()?,
    };

    let Some(route) = load_route(&args.path)? else {
        return Err(format!("route {} not found", args.path.display()).into());
    };

    let observations = match &args.rays {
        Some(path) => load_observations(path)?.unwrap_or_else(|| route.empty_observations()),
        None => route.empty_observations(),
    };
    if observations.len() != route.len() {
        log::warn!(
            "Route has {} waypoints but {} observations",
            route.len(),
            observations.len()
        );
    }

    log::info!("drishti-slam replay starting");
    log::info!(
        "  Route: {} waypoints, {:.0}mm",
        route.len(),
        route.length()
    );
    log::info!(
        "  Observations: {} rays",
        observations.iter().map(|o| o.ray_count()).sum::<usize>()
    );
    log::info!(
        "  Buffers: {} points per grid",
        config.route.points_per_grid
    );
    log::info!(
        "  Survey: {} trial poses over {:.0}mm",
        config.survey.trial_poses,
        config.survey.diameter_mm
    );

    let mut follower = RouteFollower::new(
        &config.route,
        config.grid.clone(),
        Arc::new(config.robot_geometry()),
        config.sensor_models(),
        observations.clone(),
    );
    let mut survey = config.survey_localizer();

    let mut localized = 0usize;
    let mut total_error = 0.0f32;
    for (i, observation) in observations.iter().enumerate() {
        if follower.update(&observation.pose) == FollowEvent::Swapped {
            log::info!("Waypoint {}: map buffer swapped", i);
        }

        let nominal = observation.pose.translate(args.offset_mm, 0.0, 0.0);
        match follower.localize(&mut survey, &observation.rays, &nominal)? {
            Some(result) => {
                let error = result.pose.planar_distance(&observation.pose);
                localized += 1;
                total_error += error;
                log::info!(
                    "Waypoint {}: ({:.0}, {:.0}) pan {:.1}° score {:.2}, error {:.0}mm",
                    i,
                    result.pose.x,
                    result.pose.y,
                    result.pose.pan.to_degrees(),
                    result.position_score,
                    error
                );
            }
            None => log::debug!("Waypoint {}: no estimate", i),
        }
    }

    log::info!(
        "Replay finished: {} swaps, {}/{} waypoints localized",
        follower.swaps(),
        localized,
        observations.len()
    );
    if localized > 0 {
        log::info!("Mean position error {:.1}mm", total_error / localized as f32);
    }
    Ok(())
}
