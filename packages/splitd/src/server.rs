//! Unix-socket server multiplexing producer connections onto sessions.
//!
//! One loop owns the [`Registry`]. Each connection gets a reader task that
//! frames lines and forwards them to the loop, and a writer task that sends
//! replies back. Sessions are only ever touched by the loop, so a slow or
//! misbehaving producer cannot corrupt or stall another session's state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use split_tree::SplitStore;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, LineCodec};
use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::session::SessionId;
use crate::snapshot::SessionSnapshot;

/// Replies queued per connection before the writer is considered stuck.
const REPLY_QUEUE: usize = 64;

/// Connection reader → server loop.
#[derive(Debug)]
enum Event {
    Line { id: SessionId, line: String },
    Closed { id: SessionId, error: Option<CodecError> },
}

pub type SnapshotReceiver = watch::Receiver<Option<SessionSnapshot>>;

pub struct Server {
    listener: UnixListener,
    socket_path: PathBuf,
    config: ServerConfig,
    store: Arc<dyn SplitStore>,
    snapshots: watch::Sender<Option<SessionSnapshot>>,
}

impl Server {
    /// Bind the listening socket. A stale socket file at the path is
    /// replaced; this is the only fatal step.
    pub fn bind(config: ServerConfig, store: Arc<dyn SplitStore>) -> Result<Self> {
        let socket_path = config.socket_path.clone();
        let listener = bind_socket(&socket_path)?;
        let (snapshots, _) = watch::channel(None);
        info!(socket = %socket_path.display(), "listening");
        Ok(Self {
            listener,
            socket_path,
            config,
            store,
            snapshots,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Foreground session snapshots, updated after every change.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshots.subscribe()
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Server {
            listener,
            socket_path,
            config,
            store,
            snapshots,
        } = self;

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(config.event_queue);
        let mut hub = Hub {
            registry: Registry::new(store),
            connections: HashMap::new(),
            snapshots,
        };
        let mut housekeeping = tokio::time::interval(config.housekeeping);
        housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        hub.accept(stream, &config, &event_tx, &shutdown);
                    }
                    Err(error) => warn!(%error, "accept failed"),
                },
                Some(event) = event_rx.recv() => hub.handle(event),
                _ = housekeeping.tick() => hub.housekeeping(),
            }
        }

        let ids: Vec<SessionId> = hub.registry.iter().map(|s| s.id()).collect();
        for id in ids {
            hub.remove(id);
        }
        if let Err(error) = fs::remove_file(&socket_path) {
            debug!(%error, "failed to remove socket file");
        }
        info!("server stopped");
        Ok(())
    }
}

fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
    }
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket: {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(socket = %path.display(), %error, "failed to restrict socket permissions");
        }
    }
    Ok(listener)
}

/// The loop's handle on one connection's tasks.
struct Connection {
    replies: mpsc::Sender<String>,
    /// Stops both tasks, closing the socket.
    cancel: CancellationToken,
}

struct Hub {
    registry: Registry,
    connections: HashMap<SessionId, Connection>,
    snapshots: watch::Sender<Option<SessionSnapshot>>,
}

impl Hub {
    fn accept(
        &mut self,
        stream: UnixStream,
        config: &ServerConfig,
        events: &mpsc::Sender<Event>,
        shutdown: &CancellationToken,
    ) {
        let id = self.registry.accept();
        let (read_half, write_half) = stream.into_split();

        let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE);
        let cancel = shutdown.child_token();
        self.connections.insert(
            id,
            Connection {
                replies: reply_tx,
                cancel: cancel.clone(),
            },
        );
        tokio::spawn(writer_loop(id, write_half, reply_rx, cancel.clone()));
        tokio::spawn(reader_loop(
            id,
            read_half,
            LineCodec::new(config.max_line_bytes),
            events.clone(),
            cancel,
        ));

        if self.registry.foreground() == Some(id) {
            self.publish();
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Line { id, line } => {
                let Some(session) = self.registry.get_mut(id) else {
                    return;
                };
                let replies = session.handle_line(&line);
                for reply in replies {
                    let Some(connection) = self.connections.get(&id) else {
                        break;
                    };
                    if connection.replies.try_send(reply).is_err() {
                        warn!(session = %id, "reply queue full, dropping connection");
                        self.remove(id);
                        break;
                    }
                }
                if self.registry.foreground() == Some(id) {
                    self.publish();
                }
            }
            Event::Closed { id, error } => {
                if let Some(error) = error {
                    warn!(session = %id, %error, "connection error");
                }
                self.remove(id);
            }
        }
    }

    fn remove(&mut self, id: SessionId) {
        if let Some(connection) = self.connections.remove(&id) {
            connection.cancel.cancel();
        }
        let was_foreground = self.registry.foreground() == Some(id);
        if self.registry.remove(id).is_some() && was_foreground {
            self.publish();
        }
    }

    fn housekeeping(&mut self) {
        self.publish();
    }

    /// Push the foreground snapshot if it changed.
    fn publish(&self) {
        let snapshot = self
            .registry
            .foreground_session()
            .map(SessionSnapshot::capture);
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

async fn reader_loop(
    id: SessionId,
    read_half: OwnedReadHalf,
    codec: LineCodec,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let mut lines = FramedRead::new(read_half, codec);
    let error = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next() => next,
        };
        match next {
            Some(Ok(line)) => {
                if events.send(Event::Line { id, line }).await.is_err() {
                    return;
                }
            }
            Some(Err(error)) => break Some(error),
            None => break None,
        }
    };
    let _ = events.send(Event::Closed { id, error }).await;
}

async fn writer_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut replies: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let mut reply = tokio::select! {
            _ = cancel.cancelled() => break,
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
        };
        reply.push('\n');
        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = writer.write_all(reply.as_bytes()) => written,
        };
        if let Err(error) = written {
            debug!(session = %id, %error, "write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
