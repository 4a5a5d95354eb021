//! webcam-focus CLI: position-derived webcam focus for a printer toolhead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use webcam_focus::camera::{CameraControl, V4l2Ctl};
use webcam_focus::command::Console;
use webcam_focus::config::{Config, ConfigFile};
use webcam_focus::engine::{ControlHandle, ControlLoop, HostEvent, WebcamFocus};
use webcam_focus::mapper::FocusMapper;
use webcam_focus::model::Axis;
use webcam_focus::motion::sim::SimToolhead;
use webcam_focus::plot;
use webcam_focus::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "webcam-focus", about = "Drive webcam focus from toolhead position")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run focus control against a simulated toolhead, reading commands from stdin
    Serve,
    /// Evaluate the configured focus mappings
    Map {
        /// Report the focus for this distance only
        #[arg(long)]
        distance: Option<f64>,
        /// Write an SVG plot of the mapping here
        #[arg(long)]
        graph: Option<PathBuf>,
    },
    /// List camera controls, or read one
    Query {
        #[arg(long)]
        property: Option<String>,
        #[command(flatten)]
        camera: CameraArgs,
    },
    /// Set a camera control
    Set {
        property: String,
        value: i64,
        #[command(flatten)]
        camera: CameraArgs,
    },
}

#[derive(clap::Args)]
struct CameraArgs {
    /// Video device
    #[arg(long, default_value = "/dev/video0")]
    device: PathBuf,
    /// Camera control utility
    #[arg(long, default_value = "v4l2-ctl")]
    utility: PathBuf,
}

impl CameraArgs {
    fn camera(&self) -> V4l2Ctl {
        V4l2Ctl::new(&self.utility, &self.device)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Map { distance, graph } => cmd_map(distance, graph),
        Command::Query { property, camera } => cmd_query(property, camera).await,
        Command::Set {
            property,
            value,
            camera,
        } => {
            camera.camera().set(&property, value).await?;
            println!("{property}={value}");
            Ok(())
        }
    }
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let file = ConfigFile::load(&config.config_path)?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "webcam-focus".to_string(),
        log_level: config.log_level.clone(),
        device: Some(file.focus.device.display().to_string()),
    })?;

    let camera = Arc::new(V4l2Ctl::new(&file.focus.utility, &file.focus.device));
    let toolhead = Arc::new(SimToolhead::new(&file.sim));
    let (console, mut responses) = Console::channel();

    let focus = WebcamFocus::new(file.focus, Arc::clone(&toolhead), camera, console);
    let (control, handle) = ControlLoop::new(focus);

    tokio::spawn(async move {
        while let Some(line) = responses.recv().await {
            println!("{line}");
        }
    });

    let ctrl = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    tokio::spawn(read_stdin(handle.clone(), toolhead));

    handle.event(HostEvent::Ready);
    control.run().await?;
    Ok(())
}

/// Forward stdin lines to the control loop. `G28 [X] [Y] [Z]` homes the
/// simulated toolhead instead.
async fn read_stdin(handle: ControlHandle, toolhead: Arc<SimToolhead>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(axes) = parse_home(&line) {
            match toolhead.home(&axes) {
                Ok(()) => {
                    handle.event(HostEvent::HomeComplete);
                }
                Err(e) => println!("!! {e}"),
            }
            continue;
        }
        if !handle.command(line) {
            break;
        }
    }
    handle.shutdown();
}

/// Axes named by a `G28` line, all of them when none are given.
fn parse_home(line: &str) -> Option<Vec<Axis>> {
    let mut words = line.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("G28") {
        return None;
    }
    let axes: Vec<Axis> = words.filter_map(|w| w.parse().ok()).collect();
    if axes.is_empty() {
        Some(Axis::ALL.to_vec())
    } else {
        Some(axes)
    }
}

fn cmd_map(distance: Option<f64>, graph: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let file = ConfigFile::load(&config.config_path)?;
    let points = file.focus.focus_mappings;
    let mapper = FocusMapper::build(&points).ok_or_else(|| {
        anyhow::anyhow!(
            "focus_mappings needs at least {} points, found {}",
            FocusMapper::MIN_POINTS,
            points.len()
        )
    })?;

    if let Some(d) = distance {
        println!("focal distance {d:.6} value {}", mapper.evaluate(d));
        return Ok(());
    }

    let (_, last) = mapper.domain();
    println!("{:>10}  FOCUS", "DISTANCE");
    println!("{}", "-".repeat(17));
    for (d, f) in mapper.sample(0.0, last.max(1.0), 11) {
        println!("{d:>10.3}  {f}");
    }

    if let Some(path) = graph {
        plot::render_mapper(&path, &points, Some(&mapper))?;
        println!("\ngraph written to {}", path.display());
    }
    Ok(())
}

async fn cmd_query(property: Option<String>, camera: CameraArgs) -> anyhow::Result<()> {
    let camera = camera.camera();
    if let Some(property) = property {
        println!("{property}={}", camera.query(&property).await?);
        return Ok(());
    }

    let controls = camera.list_controls().await?;
    if controls.is_empty() {
        println!("No controls reported by {}.", camera.device().display());
        return Ok(());
    }
    println!("{:<32}  {:<8}  VALUE", "NAME", "TYPE");
    println!("{}", "-".repeat(50));
    for control in &controls {
        let value = control
            .properties
            .get("value")
            .map(String::as_str)
            .unwrap_or("-");
        println!("{:<32}  {:<8}  {}", control.name, control.kind, value);
    }
    println!("\n{} control(s)", controls.len());
    Ok(())
}
