//! Court analytics over one video's upstream outputs
//!
//! Reads player tracks, ball detections, team labels and court keypoints from a
//! JSON file and writes possession, events, team ball control and tactical
//! positions as JSON.

use clap::Parser;
use court_analytics::{AnalyticsConfig, AnalyticsPipeline, BallControlStats, EventCounts, FrameInputs, StageCache};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "analyze")]
#[command(about = "Possession, passes, interceptions and tactical view from tracked basketball video", long_about = None)]
struct Args {
    /// Analytics configuration JSON; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for cached stage results
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Cache key of this run (defaults to the input file stem)
    #[arg(long)]
    run_key: Option<String>,

    /// Input JSON with per-frame tracks, detections, teams and keypoints
    input: PathBuf,

    /// Output JSON path; stdout when omitted
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let start_total = Instant::now();

    let config = match &args.config {
        Some(path) => AnalyticsConfig::from_file(path)?,
        None => AnalyticsConfig::default(),
    };
    let pipeline = AnalyticsPipeline::new(config)?;
    log::info!("court_analytics {}", court_analytics::version());

    let inputs: FrameInputs = serde_json::from_reader(BufReader::new(File::open(&args.input)?))?;
    log::info!("Loaded {} frames from {}", inputs.player_tracks.len(), args.input.display());

    let output = match &args.cache {
        Some(dir) => {
            let cache = StageCache::open(dir)?;
            let run_key = args.run_key.clone().unwrap_or_else(|| default_run_key(&args.input));
            pipeline.run_cached(&inputs, &cache, &run_key)?
        }
        None => pipeline.run(&inputs)?,
    };

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &output)?;
            writer.flush()?;
            log::info!("Wrote results to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &output)?;
            writeln!(writer)?;
        }
    }

    let counts = EventCounts::up_to(&output.events, usize::MAX);
    let control = BallControlStats::total(&output.team_ball_control);
    let calibrated = output
        .tactical_positions
        .iter()
        .filter(|frame| frame.is_some())
        .count();

    log::info!(
        "Passes - Team A: {}, Team B: {}",
        counts.passes_a,
        counts.passes_b
    );
    log::info!(
        "Interceptions - Team A: {}, Team B: {}",
        counts.interceptions_a,
        counts.interceptions_b
    );
    log::info!(
        "Ball control - Team A: {:.1}%, Team B: {:.1}%",
        control.team_a_pct,
        control.team_b_pct
    );
    log::info!(
        "Tactical view calibrated in {}/{} frames",
        calibrated,
        output.tactical_positions.len()
    );
    log::info!("Done in {:.2}s", start_total.elapsed().as_secs_f32());

    Ok(())
}

/// Input file stem, so reruns on the same file reuse the same stubs
fn default_run_key(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string())
}
