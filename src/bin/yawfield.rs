//! yawfield command line
//!
//! Loads `yawfield.toml`, applies command line overrides and runs a session
//! until `q` or end of input. Lines typed while running:
//! - a number sets the angle (static mode only)
//! - `r` recenters
//! - `q` quits

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use yawfield::{Config, CpalDevice, Direction, Session, StatsReporter, SurroundFormat, TrackerSource, TrackingMode};

#[derive(Parser, Debug)]
#[command(name = "yawfield", version, about = "Head-tracked stereo to surround rotation")]
struct Args {
    /// Config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "yawfield.toml")]
    config: PathBuf,

    /// Print input and output devices, then exit
    #[arg(long)]
    list_devices: bool,

    /// Angle source
    #[arg(short, long, value_enum)]
    mode: Option<TrackingMode>,

    /// Output format: stereo, 5.1 or 7.1
    #[arg(short, long)]
    format: Option<SurroundFormat>,

    /// Starting angle for static mode, in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    angle: Option<f32>,

    /// Play an in-phase test tone at this frequency instead of capturing
    #[arg(long)]
    tone: Option<f32>,
}

enum Command {
    Angle(f32),
    Recenter,
    Quit,
}

fn list_devices() {
    for direction in [Direction::Input, Direction::Output] {
        println!("{direction} devices:");
        for (i, device) in CpalDevice::list(direction).iter().enumerate() {
            println!("  [{i}] {}", device.caps());
        }
    }
}

fn spawn_stdin_reader(commands: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "q" | "quit" => Command::Quit,
                "r" | "recenter" => Command::Recenter,
                "" => continue,
                other => match other.parse::<f32>() {
                    Ok(angle) => Command::Angle(angle),
                    Err(_) => {
                        eprintln!("\nunrecognized input '{other}' (number, r or q)");
                        continue;
                    }
                },
            };
            if commands.send(command).is_err() {
                return;
            }
        }
        let _ = commands.send(Command::Quit);
    });
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(mode) = args.mode {
        config.tracking.mode = mode;
    }
    if let Some(format) = args.format {
        config.rotation.format = format;
    }
    if let Some(angle) = args.angle {
        config.tracking.static_angle = angle;
    }

    let source = TrackerSource::from_config(&config.tracking);
    let is_static = config.tracking.mode == TrackingMode::Static;

    let session = match args.tone {
        Some(frequency) => Session::start_with_tone(config, source, frequency),
        None => Session::start(config, source),
    }
    .context("starting session")?;

    println!(
        "running {} at {} Hz, ~{:.1} ms latency. {}r to recenter, q to quit",
        session.config().rotation.format,
        session.config().audio.sample_rate,
        session.latency_ms(),
        if is_static { "type an angle to turn, " } else { "" }
    );

    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx);

    let stats = session.stats();
    let mut reporter = StatsReporter::new();
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Command::Quit) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Ok(Command::Recenter) => session.recenter(),
            Ok(Command::Angle(angle)) => {
                if !session.set_static_angle(angle) {
                    eprintln!("\nangles can only be set in static mode");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        reporter.report(&stats);
        print!(
            "\rraw {:6.1}°  smoothed {:6.1}°  ",
            session.angle().raw(),
            session.angle().read()
        );
        std::io::stdout().flush().ok();
    }

    println!();
    session.stop().context("stopping session")?;
    Ok(())
}
