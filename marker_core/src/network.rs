use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::render::{RenderSurface, SnapshotFrame};

/// What subscribers receive, one JSON document per length-prefixed frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceMessage<'a> {
    Frame(&'a SnapshotFrame),
    Visibility { visible: bool },
}

type Clients = Arc<Mutex<Vec<TcpStream>>>;

/// Last marker frame and last visibility message, replayed to late joiners
/// in that order.
#[derive(Debug, Default)]
struct Replay {
    frame: Option<Vec<u8>>,
    visibility: Option<Vec<u8>>,
}

impl Replay {
    fn messages(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.frame.iter().chain(self.visibility.iter())
    }
}

type SharedReplay = Arc<Mutex<Replay>>;

/// Fans messages out to every connected TCP subscriber. Late joiners get the
/// latest frame and the latest visibility first.
pub struct SnapshotServer {
    sender: Sender<Vec<u8>>,
    replay: SharedReplay,
}

impl SnapshotServer {
    /// Send a marker frame and keep it for subscribers that connect later.
    pub fn broadcast(&self, bytes: &[u8]) {
        lock(&self.replay).frame = Some(bytes.to_vec());
        self.enqueue(bytes);
    }

    /// Send a visibility change without displacing the latest frame.
    pub fn broadcast_visibility(&self, bytes: &[u8]) {
        lock(&self.replay).visibility = Some(bytes.to_vec());
        self.enqueue(bytes);
    }

    fn enqueue(&self, bytes: &[u8]) {
        if let Err(err) = self.sender.send(bytes.to_vec()) {
            error!(target: "terrain_markers::network", error = %err, "snapshot.queue_failed");
        }
    }
}

pub fn start_snapshot_server(bind_addr: SocketAddr) -> Option<SnapshotServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!(
                target: "terrain_markers::network",
                %bind_addr,
                error = %err,
                "snapshot_server.bind_failed -- broadcasting disabled"
            );
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        warn!(
            target: "terrain_markers::network",
            error = %err,
            "snapshot_server.nonblocking_failed -- broadcasting disabled"
        );
        return None;
    }

    let (sender, receiver) = unbounded::<Vec<u8>>();
    let replay = SharedReplay::default();
    let accept_replay = Arc::clone(&replay);
    thread::Builder::new()
        .name("snapshot-server".into())
        .spawn(move || serve(listener, receiver, accept_replay))
        .map_err(|err| {
            warn!(target: "terrain_markers::network", error = %err, "snapshot_server.spawn_failed");
        })
        .ok()?;

    Some(SnapshotServer { sender, replay })
}

fn serve(listener: TcpListener, receiver: Receiver<Vec<u8>>, replay: SharedReplay) {
    let clients: Clients = Arc::new(Mutex::new(Vec::new()));
    loop {
        match listener.accept() {
            Ok((stream, addr)) => accept_client(stream, addr, &clients, &replay),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => {
                error!(target: "terrain_markers::network", error = %err, "snapshot_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }

        while let Ok(frame) = receiver.try_recv() {
            broadcast_frame(&clients, &frame);
        }
        if receiver.is_empty() && Arc::strong_count(&replay) == 1 {
            // Server handle dropped and queue drained.
            break;
        }
    }
}

fn accept_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    clients: &Clients,
    replay: &SharedReplay,
) {
    info!(target: "terrain_markers::network", %addr, "snapshot_client.connected");
    if let Err(err) = stream.set_nodelay(true) {
        warn!(target: "terrain_markers::network", %addr, error = %err, "snapshot_client.nodelay_failed");
    }
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(target: "terrain_markers::network", %addr, error = %err, "snapshot_client.blocking_failed");
    }
    let initial: Vec<Vec<u8>> = lock(replay).messages().cloned().collect();
    for message in &initial {
        if let Err(err) = write_frame(&mut stream, message) {
            warn!(target: "terrain_markers::network", %addr, error = %err, "snapshot_client.initial_frame_failed");
            return;
        }
    }
    lock(clients).push(stream);
}

pub fn write_frame(stream: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    let len = frame.len() as u32;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    stream.write_all(&buffer)
}

fn broadcast_frame(clients: &Clients, frame: &[u8]) {
    lock(clients).retain_mut(|stream| match write_frame(stream, frame) {
        Ok(_) => true,
        Err(err) => {
            warn!(target: "terrain_markers::network", error = %err, "snapshot_client.dropped");
            false
        }
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Render surface that serialises every update and hands it to a
/// [`SnapshotServer`].
pub struct BroadcastSurface {
    server: SnapshotServer,
}

impl BroadcastSurface {
    pub fn new(server: SnapshotServer) -> Self {
        Self { server }
    }

    fn encode(message: &SurfaceMessage<'_>) -> Option<Vec<u8>> {
        serde_json::to_vec(message)
            .map_err(|err| {
                error!(target: "terrain_markers::network", error = %err, "snapshot.encode_failed")
            })
            .ok()
    }
}

impl RenderSurface for BroadcastSurface {
    fn push_snapshot(&mut self, frame: &SnapshotFrame) {
        if let Some(bytes) = Self::encode(&SurfaceMessage::Frame(frame)) {
            self.server.broadcast(&bytes);
        }
    }

    fn set_visible(&mut self, visible: bool) {
        if let Some(bytes) = Self::encode(&SurfaceMessage::Visibility { visible }) {
            self.server.broadcast_visibility(&bytes);
        }
    }
}
