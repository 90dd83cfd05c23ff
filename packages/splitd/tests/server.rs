//! End-to-end tests driving a real server over a Unix socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use split_tree::{MemoryStore, RunKey, Time};
use splitd::{Server, ServerConfig, SessionId, SessionSnapshot, SnapshotReceiver};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    _dir: TempDir,
    socket: PathBuf,
    store: Arc<MemoryStore>,
    snapshots: SnapshotReceiver,
    shutdown: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start() -> Self {
        Self::with_max_line(1024)
    }

    fn with_max_line(max_line_bytes: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("splitd.sock");
        let config = ServerConfig {
            socket_path: socket.clone(),
            max_line_bytes,
            housekeeping: Duration::from_millis(20),
            event_queue: 64,
        };
        let store = Arc::new(MemoryStore::new());
        let server = Server::bind(config, store.clone()).unwrap();
        let snapshots = server.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.run(shutdown.clone()));
        Self {
            _dir: dir,
            socket,
            store,
            snapshots,
            shutdown,
            task,
        }
    }

    async fn connect(&self) -> Client {
        let stream = UnixStream::connect(&self.socket).await.unwrap();
        let (read, write) = stream.into_split();
        Client {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    /// Wait until the published foreground snapshot satisfies `pred`.
    async fn wait_for(
        &mut self,
        mut pred: impl FnMut(Option<&SessionSnapshot>) -> bool,
    ) -> Option<SessionSnapshot> {
        let rx = &mut self.snapshots;
        tokio::time::timeout(TIMEOUT, async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if pred(current.as_ref()) {
                        return current.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    async fn wait_for_foreground(&mut self, id: SessionId) -> SessionSnapshot {
        self.wait_for(|s| s.is_some_and(|s| s.session == id))
            .await
            .unwrap()
    }

    /// Shut the server down, handing back the temp dir so callers can
    /// inspect it.
    async fn stop(self) -> TempDir {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
        self._dir
    }
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    async fn send(&mut self, text: &str) {
        self.write.write_all(text.as_bytes()).await.unwrap();
        self.write.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for reply")
            .unwrap()
    }
}

fn key() -> RunKey {
    RunKey::new("g", "c").unwrap()
}

#[tokio::test]
async fn hello_is_answered() {
    let harness = Harness::start();
    let mut client = harness.connect().await;

    client.send("HELLO 0.0 0.1\n").await;
    assert_eq!(client.recv().await.as_deref(), Some("HELLO 0.1"));
    assert_eq!(client.recv().await.as_deref(), Some("NORECOVER"));

    harness.stop().await;
}

#[tokio::test]
async fn lines_split_across_reads_are_reassembled() {
    let mut harness = Harness::start();
    let mut client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    client.send("NSPLITS 2\nSTA").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send("RT 0\nSYN").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send("C 500\n").await;

    let snapshot = harness
        .wait_for(|s| s.is_some_and(|s| s.elapsed == Time::from_micros(500)))
        .await
        .unwrap();
    assert_eq!(snapshot.active, Some(0));
    assert_eq!(snapshot.rows.len(), 2);

    harness.stop().await;
}

#[tokio::test]
async fn bad_lines_do_not_close_the_connection() {
    let harness = Harness::start();
    let mut client = harness.connect().await;

    client.send("FOO bar\nSPLIT\nNSPLITS many\n\nHELLO 0.1\n").await;
    assert_eq!(client.recv().await.as_deref(), Some("HELLO 0.1"));
    assert_eq!(client.recv().await.as_deref(), Some("NORECOVER"));

    harness.stop().await;
}

#[tokio::test]
async fn foreground_is_not_promoted_on_disconnect() {
    let mut harness = Harness::start();

    let mut first = harness.connect().await;
    first.send("HELLO 0.1\n").await;
    first.recv().await;
    harness.wait_for_foreground(SessionId(1)).await;

    let mut second = harness.connect().await;
    second.send("HELLO 0.1\n").await;
    second.recv().await;

    drop(first);
    harness.wait_for(|s| s.is_none()).await;

    // Still connected, but not displayed.
    second.send("NSPLITS 3\n").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.snapshots.borrow().is_none());

    let _third = harness.connect().await;
    harness.wait_for_foreground(SessionId(3)).await;

    harness.stop().await;
}

#[tokio::test]
async fn ungraceful_disconnect_saves_recovery() {
    let mut harness = Harness::start();
    let mut client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    client
        .send("GAME g Game\nCAT c Category\nRECOVERDATA level=3\nRECOVERAPPEND ;lives=2\n")
        .await;
    harness
        .wait_for(|s| s.is_some_and(|s| s.category.is_some()))
        .await;
    drop(client);
    harness.wait_for(|s| s.is_none()).await;

    let entry = harness.store.entry(&key()).unwrap();
    assert_eq!(entry.recovery.as_deref(), Some("level=3;lives=2"));

    harness.stop().await;
}

#[tokio::test]
async fn goodbye_skips_recovery() {
    let mut harness = Harness::start();
    let mut client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    client
        .send("GAME g Game\nCAT c Category\nNSPLITS 1\nRECOVERDATA x\nGOODBYE\n")
        .await;
    harness
        .wait_for(|s| s.is_some_and(|s| s.rows.len() == 1))
        .await;
    drop(client);
    harness.wait_for(|s| s.is_none()).await;

    let entry = harness.store.entry(&key()).unwrap();
    assert!(entry.recovery.is_none());
    assert!(entry.splits.is_some());

    harness.stop().await;
}

#[tokio::test]
async fn finished_run_is_stored() {
    let mut harness = Harness::start();
    let mut client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    client
        .send("GAME g Game\nCAT c Category\nNSPLITS 2\nSTART 0\nSPLIT 100\nSPLIT 250\n")
        .await;
    let snapshot = harness
        .wait_for(|s| s.is_some_and(|s| s.elapsed == Time::from_micros(250)))
        .await
        .unwrap();
    assert_eq!(snapshot.active, None);
    assert_eq!(snapshot.sum_of_best, Time::from_micros(250));

    let entry = harness.store.entry(&key()).unwrap();
    assert_eq!(entry.runs.len(), 1);
    let (times, personal_best) = &entry.runs[0];
    assert_eq!(times, &vec![Time::from_micros(100), Time::from_micros(250)]);
    assert!(*personal_best);

    harness.stop().await;
}

#[tokio::test]
async fn oversized_line_drops_the_connection() {
    let mut harness = Harness::with_max_line(16);
    let mut client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    client.send(&"X".repeat(64)).await;
    harness.wait_for(|s| s.is_none()).await;

    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(TIMEOUT, client.lines.get_mut().read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    harness.stop().await;
}

#[tokio::test]
async fn shutdown_removes_socket() {
    let harness = Harness::start();
    let _client = harness.connect().await;
    let socket = harness.socket.clone();
    assert!(socket.exists());

    let dir = harness.stop().await;
    assert!(dir.path().join("run").is_dir());
    assert!(!socket.exists());
}

#[tokio::test]
async fn stalled_reader_is_disconnected() {
    let mut harness = Harness::start();
    let client = harness.connect().await;
    harness.wait_for_foreground(SessionId(1)).await;

    // Never read the replies; keep the read half open so the only way out
    // is the server closing the socket.
    let Client { lines: _unread, mut write } = client;
    let chunk = "HELLO 0.1\n".repeat(1000);
    let flood = tokio::spawn(async move {
        loop {
            if write.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
        }
    });

    harness.wait_for(|s| s.is_none()).await;
    tokio::time::timeout(Duration::from_secs(10), flood)
        .await
        .expect("server kept consuming a dropped connection")
        .unwrap();

    harness.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn socket_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let harness = Harness::start();
    let mode = std::fs::metadata(&harness.socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    harness.stop().await;
}
