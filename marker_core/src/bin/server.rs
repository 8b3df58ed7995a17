use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use marker_core::metrics::PlacementMetrics;
use marker_core::network::{start_snapshot_server, BroadcastSurface};
use marker_core::{
    build_headless_app, load_placement_config_from_env, run_frame, ConfigWatcher, GeoBounds,
    GltfModelLoader, GridTerrain, MarkerLayer, ModelLoader, NoisyTerrain, PlacementConfig,
    PlacementPreset, PositionUpdate, Relief, SurfaceEvent,
};

/// Exaggeration applied by the map's terrain layer.
const TERRAIN_EXAGGERATION: f64 = 1.6;
const TERRAIN_GRID: u32 = 256;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless terrain marker placement server", long_about = None)]
struct Cli {
    /// Address accepting line commands.
    #[arg(long, default_value = "127.0.0.1:41100")]
    command_bind: SocketAddr,
    /// Address broadcasting length-prefixed JSON snapshot frames.
    #[arg(long, default_value = "127.0.0.1:41101")]
    snapshot_bind: SocketAddr,
    /// Builtin constant set used when no config file is given.
    #[arg(long, default_value_t = PlacementPreset::Overlay)]
    preset: PlacementPreset,
    /// Placement config file; overrides the preset and the environment.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reload the config file when it changes.
    #[arg(long)]
    watch: bool,
    /// Directory the model source is resolved against.
    #[arg(long)]
    model_root: Option<PathBuf>,
    #[arg(long, default_value_t = 139.767)]
    center_lng: f64,
    #[arg(long, default_value_t = 35.681)]
    center_lat: f64,
    /// Half-width of the generated terrain in degrees.
    #[arg(long, default_value_t = 0.05)]
    span_deg: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Vertical noise added to every terrain sample, in meters.
    #[arg(long, default_value_t = 0.0)]
    jitter_m: f64,
    /// Probability that a terrain sample is reported as not loaded.
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let (config, config_path) = match cli.config.as_ref() {
        Some(path) => match PlacementConfig::from_file(path) {
            Ok(config) => (config, Some(path.clone())),
            Err(err) => {
                error!(
                    target: "terrain_markers::server",
                    path = %path.display(),
                    error = %err,
                    "placement_config.rejected"
                );
                std::process::exit(2);
            }
        },
        None => load_placement_config_from_env(cli.preset),
    };

    let grid = GridTerrain::generate(
        GeoBounds::around(cli.center_lng, cli.center_lat, cli.span_deg),
        TERRAIN_GRID,
        TERRAIN_GRID,
        Relief::default(),
        cli.seed,
    )
    .with_exaggeration(TERRAIN_EXAGGERATION);
    let terrain = NoisyTerrain::new(grid, cli.jitter_m, cli.dropout, cli.seed);

    let loader: Arc<dyn ModelLoader> = Arc::new(match cli.model_root.as_ref() {
        Some(root) => GltfModelLoader::with_root(root),
        None => GltfModelLoader::new(),
    });

    let mut layer = MarkerLayer::new(config, terrain);
    if let Some(server) = start_snapshot_server(cli.snapshot_bind) {
        layer.attach(
            Box::new(BroadcastSurface::new(server)),
            Some(loader),
            Duration::ZERO,
        );
    }

    let mut app = build_headless_app(layer);
    if cli.watch {
        match config_path.clone().map(ConfigWatcher::watch) {
            Some(Ok(watcher)) => {
                info!(
                    target: "terrain_markers::server",
                    path = %watcher.path().display(),
                    "placement_config.watching"
                );
                app.insert_resource(watcher);
            }
            Some(Err(err)) => warn!(
                target: "terrain_markers::server",
                error = %err,
                "placement_config.watch_failed"
            ),
            None => warn!(
                target: "terrain_markers::server",
                "placement_config.watch_skipped -- builtin preset has no file"
            ),
        }
    }

    let command_rx = match spawn_command_listener(cli.command_bind) {
        Ok(receiver) => receiver,
        Err(err) => {
            error!(
                target: "terrain_markers::server",
                command_bind = %cli.command_bind,
                error = %err,
                "command_listener.bind_failed"
            );
            std::process::exit(1);
        }
    };

    info!(
        target: "terrain_markers::server",
        command_bind = %cli.command_bind,
        snapshot_bind = %cli.snapshot_bind,
        preset = %cli.preset,
        "Marker placement server ready"
    );

    let frame = Duration::from_millis(cli.frame_ms.max(1));
    loop {
        while let Ok(command) = command_rx.try_recv() {
            apply_command(&mut app, command);
        }
        run_frame(&mut app);
        thread::sleep(frame);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Upsert(PositionUpdate),
    Bearing { id: String, degrees: f64 },
    Visible(bool),
    Clearance(f64),
    BaseLift(f64),
    ExtraLift(f64),
    Nudge(f64),
    Refresh,
    Event(SurfaceEvent),
    FootOffset,
}

fn spawn_command_listener(bind_addr: SocketAddr) -> std::io::Result<Receiver<Command>> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "terrain_markers::server", %addr, "command_client.connected");
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(target: "terrain_markers::server", error = %err, "command_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(receiver)
}

fn handle_client(stream: TcpStream, sender: Sender<Command>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command(trimmed) {
                    Some(cmd) => {
                        if sender.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!(target: "terrain_markers::server", command = trimmed, "command.invalid"),
                }
            }
            Err(err) => {
                warn!(target: "terrain_markers::server", error = %err, "command.read_failed");
                break;
            }
        }
    }
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    match parts.next()? {
        "upsert" => {
            let id = parts.next()?;
            let lng: f64 = parts.next()?.parse().ok()?;
            let lat: f64 = parts.next()?.parse().ok()?;
            let mut update = PositionUpdate::new(id, lng, lat);
            if let Some(bearing) = parts.next() {
                update = update.with_bearing(bearing.parse().ok()?);
            }
            if let Some(color) = parts.next() {
                update = update.with_color(color);
            }
            Some(Command::Upsert(update))
        }
        "bearing" => {
            let id = parts.next()?.to_string();
            let degrees = parts.next()?.parse().ok()?;
            Some(Command::Bearing { id, degrees })
        }
        "visible" => match parts.next().unwrap_or("on") {
            "on" | "true" | "1" => Some(Command::Visible(true)),
            "off" | "false" | "0" => Some(Command::Visible(false)),
            _ => None,
        },
        "clearance" => Some(Command::Clearance(parts.next()?.parse().ok()?)),
        "lift" => Some(Command::BaseLift(parts.next()?.parse().ok()?)),
        "extra" => Some(Command::ExtraLift(parts.next()?.parse().ok()?)),
        "nudge" => Some(Command::Nudge(parts.next()?.parse().ok()?)),
        "refresh" => Some(Command::Refresh),
        "event" => Some(Command::Event(SurfaceEvent::parse(parts.next()?)?)),
        "offset" => Some(Command::FootOffset),
        _ => None,
    }
}

fn apply_command(app: &mut bevy::prelude::App, command: Command) {
    if let Command::Event(event) = command {
        app.world.send_event(event);
        return;
    }

    let mut layer = app.world.resource_mut::<MarkerLayer>();
    match command {
        Command::Upsert(update) => {
            let id = update.id.clone();
            let outcome = layer.upsert(update);
            info!(target: "terrain_markers::server", %id, ?outcome, "command.applied=upsert");
        }
        Command::Bearing { id, degrees } => {
            if !layer.set_bearing(&id, degrees) {
                warn!(target: "terrain_markers::server", %id, "bearing.rejected=unknown_marker");
            }
        }
        Command::Visible(visible) => layer.set_visible(visible),
        Command::Clearance(meters) => {
            layer.set_ground_clearance(meters);
        }
        Command::BaseLift(meters) => {
            layer.set_base_lift(meters);
        }
        Command::ExtraLift(meters) => {
            layer.set_extra_lift(meters);
        }
        Command::Nudge(delta) => {
            layer.nudge(delta);
        }
        Command::Refresh => {
            let changed = layer.force_refresh();
            info!(target: "terrain_markers::server", changed, "command.applied=refresh");
        }
        Command::FootOffset => {
            let offset = layer.foot_offset();
            let state = layer.foot_offset_state();
            drop(layer);
            let metrics = app.world.resource::<PlacementMetrics>();
            info!(
                target: "terrain_markers::server",
                foot_offset_m = ?offset,
                ?state,
                markers = metrics.markers,
                locked = metrics.locked_markers,
                "foot_offset.reported"
            );
        }
        Command::Event(_) => {}
    }
}
