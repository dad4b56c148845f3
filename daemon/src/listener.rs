/// The listening loop.
///
/// Every open source is registered with the tokio reactor and read by its own
/// task, which forwards decoded raw events over a channel.  [`Listener::run`]
/// consumes that channel on the single runtime thread: each event is matched
/// against the rule tables and a resolved action is dispatched exactly once.
///
/// Descriptors the reactor refuses with `EPERM` (regular files) are read to
/// the end on the blocking pool instead.
///
/// The loop ends when every source has closed or a termination signal is
/// received.  Reader tasks are aborted on the way out, which closes their
/// descriptors.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use anyhow::{Context, Result};
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::AcpiEvent;
use crate::matcher::EventMatcher;
use crate::source::{EventSources, InputEvent, SourceKind, INPUT_EVENT_SIZE};

const CHANNEL_CAPACITY: usize = 64;
const READ_CHUNK: usize = 4096;

pub struct Listener {
    tx: mpsc::Sender<AcpiEvent>,
    rx: mpsc::Receiver<AcpiEvent>,
    tasks: Vec<JoinHandle<()>>,
    open: usize,
}

impl Listener {
    /// Registers every source with the reactor and starts its reader task.
    /// Must be called from within a tokio runtime.
    pub fn start(sources: EventSources) -> Result<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let kind = sources.kind;
        let open = sources.len();
        let mut tasks = Vec::with_capacity(open);

        for (index, source) in sources.sources.into_iter().enumerate() {
            let tx = tx.clone();
            let file = match AsyncFd::try_new(source.file) {
                Ok(fd) => {
                    tasks.push(match kind {
                        SourceKind::Binary => tokio::spawn(read_records(index, fd, tx)),
                        SourceKind::Text => tokio::spawn(read_lines(index, fd, tx)),
                    });
                    continue;
                }
                Err(e) => {
                    let (file, err) = e.into_parts();
                    if err.raw_os_error() != Some(libc::EPERM) {
                        return Err(err)
                            .with_context(|| format!("Failed to poll {}", source.path.display()));
                    }
                    file
                }
            };
            debug!(path = %source.path.display(), "not pollable, reading on blocking pool");
            tasks.push(tokio::task::spawn_blocking(move || read_file(index, kind, file, tx)));
        }

        Ok(Self { tx, rx, tasks, open })
    }

    /// A handle for injecting events, e.g. [`AcpiEvent::Shutdown`].
    pub fn sender(&self) -> mpsc::Sender<AcpiEvent> {
        self.tx.clone()
    }

    /// Turns SIGTERM, SIGINT, SIGHUP and SIGQUIT into [`AcpiEvent::Shutdown`].
    pub fn shutdown_on_signals(&mut self) -> Result<()> {
        let mut term = signal(SignalKind::terminate()).context("Failed to watch SIGTERM")?;
        let mut int = signal(SignalKind::interrupt()).context("Failed to watch SIGINT")?;
        let mut hup = signal(SignalKind::hangup()).context("Failed to watch SIGHUP")?;
        let mut quit = signal(SignalKind::quit()).context("Failed to watch SIGQUIT")?;

        let tx = self.sender();
        self.tasks.push(tokio::spawn(async move {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
                _ = hup.recv() => "SIGHUP",
                _ = quit.recv() => "SIGQUIT",
            };
            info!("received {name}");
            let _ = tx.send(AcpiEvent::Shutdown).await;
        }));
        Ok(())
    }

    /// Runs until shutdown, calling `dispatch` once per resolved action.
    /// Returns the number of actions dispatched.
    pub async fn run(mut self, matcher: &EventMatcher<'_>, mut dispatch: impl FnMut(&str)) -> usize {
        let mut dispatched = 0;

        while let Some(evt) = self.rx.recv().await {
            let action = match evt {
                AcpiEvent::Input(ev) => {
                    let Some(action) = matcher.resolve_input(&ev) else {
                        continue;
                    };
                    debug!(kind = ev.kind, code = ev.code, value = ev.value, action, "event");
                    action
                }
                AcpiEvent::Line(line) => {
                    let Some(action) = matcher.resolve_line(&line) else {
                        continue;
                    };
                    debug!(line = %String::from_utf8_lossy(&line), action, "event");
                    action
                }
                AcpiEvent::SourceClosed(index) => {
                    self.open = self.open.saturating_sub(1);
                    debug!(index, remaining = self.open, "event source closed");
                    if self.open == 0 {
                        warn!("all event sources closed");
                        break;
                    }
                    continue;
                }
                AcpiEvent::Shutdown => {
                    info!("shutting down");
                    break;
                }
            };

            dispatch(action);
            dispatched += 1;
        }

        for task in &self.tasks {
            task.abort();
        }
        dispatched
    }
}

/// Waits for readiness and performs one non-blocking read.
async fn read_ready(fd: &AsyncFd<File>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| inner.get_ref().read(&mut *buf)) {
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Reads fixed-size `input_event` records.  Short reads are skipped.
async fn read_records(index: usize, fd: AsyncFd<File>, tx: mpsc::Sender<AcpiEvent>) {
    let mut buf = [0u8; INPUT_EVENT_SIZE];
    loop {
        match read_ready(&fd, &mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Some(ev) = InputEvent::decode(&buf[..n]) else {
                    continue;
                };
                if tx.send(AcpiEvent::Input(ev)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(index, "read failed: {e}");
                break;
            }
        }
    }
    let _ = tx.send(AcpiEvent::SourceClosed(index)).await;
}

/// Reads newline-terminated lines.  An unterminated tail is delivered at
/// end of file.
async fn read_lines(index: usize, fd: AsyncFd<File>, tx: mpsc::Sender<AcpiEvent>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match read_ready(&fd, &mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let mut line: Vec<u8> = pending.drain(..=pos).collect();
                    line.pop();
                    if tx.send(AcpiEvent::Line(line)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(index, "read failed: {e}");
                break;
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(AcpiEvent::Line(pending)).await;
    }
    let _ = tx.send(AcpiEvent::SourceClosed(index)).await;
}

/// Blocking counterpart of [`read_records`] and [`read_lines`] for regular
/// files.  Stops at end of file.
fn read_file(index: usize, kind: SourceKind, file: File, tx: mpsc::Sender<AcpiEvent>) {
    let mut reader = BufReader::new(file);
    loop {
        let evt = match kind {
            SourceKind::Binary => {
                let mut buf = [0u8; INPUT_EVENT_SIZE];
                match reader.read_exact(&mut buf) {
                    Ok(()) => InputEvent::decode(&buf).map(AcpiEvent::Input),
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        warn!(index, "read failed: {e}");
                        break;
                    }
                }
            }
            SourceKind::Text => {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                        }
                        Some(AcpiEvent::Line(line))
                    }
                    Err(e) => {
                        warn!(index, "read failed: {e}");
                        break;
                    }
                }
            }
        };
        if let Some(evt) = evt {
            if tx.blocking_send(evt).is_err() {
                return;
            }
        }
    }
    let _ = tx.blocking_send(AcpiEvent::SourceClosed(index));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleTables;
    use crate::source::OpenSource;
    use std::io::Write;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;

    /// A pollable source plus the writer feeding it.
    fn socket_source(name: &str) -> (OpenSource, UnixStream) {
        let (writer, reader) = UnixStream::pair().unwrap();
        reader.set_nonblocking(true).unwrap();
        let source = OpenSource {
            path: PathBuf::from(name),
            file: File::from(OwnedFd::from(reader)),
        };
        (source, writer)
    }

    fn sources(kind: SourceKind, sources: Vec<OpenSource>) -> EventSources {
        EventSources { kind, sources }
    }

    fn record(kind: u16, code: u16, value: i32) -> Vec<u8> {
        InputEvent { kind, code, value }.encode()
    }

    async fn collect_actions(listener: Listener, rules: &RuleTables) -> Vec<String> {
        let matcher = EventMatcher::new(rules);
        let mut actions = Vec::new();
        let count = listener.run(&matcher, |a| actions.push(a.to_string())).await;
        assert_eq!(count, actions.len());
        actions
    }

    // ── binary sources ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn power_press_dispatches_pwrf_handler() {
        let (source, mut writer) = socket_source("event0");
        writer.write_all(&record(1, 116, 1)).unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["PWRF/00000080"]);
    }

    #[tokio::test]
    async fn unmatched_and_repeat_records_never_dispatch() {
        let (source, mut writer) = socket_source("event0");
        writer.write_all(&record(1, 116, 2)).unwrap();
        writer.write_all(&record(1, 116, 0)).unwrap();
        writer.write_all(&record(4, 4, 1)).unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn short_record_is_skipped() {
        let (source, mut writer) = socket_source("event0");
        writer.write_all(&[0u8; 10]).unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn loop_runs_until_every_source_closes() {
        let (first, mut w1) = socket_source("event0");
        let (second, mut w2) = socket_source("event1");
        w1.write_all(&record(1, 116, 1)).unwrap();
        drop(w1);

        let listener =
            Listener::start(sources(SourceKind::Binary, vec![first, second])).unwrap();

        // The second device keeps producing after the first one is gone.
        let feeder = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            w2.write_all(&record(1, 116, 1)).unwrap();
        });

        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        feeder.join().unwrap();
        assert_eq!(actions, ["PWRF/00000080", "PWRF/00000080"]);
    }

    // ── text sources ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn text_lines_are_stripped_and_matched() {
        let (source, mut writer) = socket_source("/proc/acpi/event");
        writer
            .write_all(b"button/power PWRB 00000080 00000000\nbutton/power PW")
            .unwrap();
        writer
            .write_all(b"RF 00000080 00000001\nac_adapter ACAD 00000080 00000001\n")
            .unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Text, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["button/power PWRB 00000080", "PWRF/00000080"]);
    }

    #[tokio::test]
    async fn unterminated_last_line_is_delivered() {
        let (source, mut writer) = socket_source("/proc/acpi/event");
        writer.write_all(b"button/power PWRF 00000080 00000000").unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Text, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["PWRF/00000080"]);
    }

    // ── regular files ─────────────────────────────────────────────────────────

    fn file_source(dir: &tempfile::TempDir, content: &[u8]) -> OpenSource {
        let path = dir.path().join("event");
        std::fs::write(&path, content).unwrap();
        let file = File::open(&path).unwrap();
        OpenSource { path, file }
    }

    #[tokio::test]
    async fn regular_text_file_is_read_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_source(
            &dir,
            b"button/power PWRF 00000080 00000000\nbutton/power PWRB 00000080 00000000",
        );

        let listener = Listener::start(sources(SourceKind::Text, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["PWRF/00000080", "button/power PWRB 00000080"]);
    }

    #[tokio::test]
    async fn regular_binary_file_is_read_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = record(1, 116, 1);
        content.extend_from_slice(&record(1, 116, 2));
        content.extend_from_slice(&[0u8; 5]);
        let source = file_source(&dir, &content);

        let listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["PWRF/00000080"]);
    }

    #[tokio::test]
    async fn regular_file_and_device_share_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_source(&dir, &record(1, 116, 1));
        let (socket, mut writer) = socket_source("event1");
        writer.write_all(&record(1, 116, 1)).unwrap();
        drop(writer);

        let listener = Listener::start(sources(SourceKind::Binary, vec![file, socket])).unwrap();
        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert_eq!(actions, ["PWRF/00000080", "PWRF/00000080"]);
    }

    // ── shutdown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_event_stops_loop_with_sources_open() {
        let (source, _writer) = socket_source("event0");
        let listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        listener.sender().send(AcpiEvent::Shutdown).await.unwrap();

        let actions = collect_actions(listener, &RuleTables::defaults()).await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn signal_watchers_install() {
        let (source, _writer) = socket_source("event0");
        let mut listener = Listener::start(sources(SourceKind::Binary, vec![source])).unwrap();
        listener.shutdown_on_signals().unwrap();
        listener.sender().send(AcpiEvent::Shutdown).await.unwrap();
        assert!(collect_actions(listener, &RuleTables::defaults()).await.is_empty());
    }
}
