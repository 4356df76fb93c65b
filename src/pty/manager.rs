use super::error::SessionError;
use crate::bus::{BusEvent, EventBus};
use crate::config::ShellConfig;
use crate::models::SessionInfo;
use anyhow::Result;
use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtyPair, PtySize, PtySystem};
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const READ_BUFFER_SIZE: usize = 8192;

/// The one operation the creation queue needs from a process manager.
pub trait SessionSpawner: Send + Sync + 'static {
    fn create(&self, id: &str, cols: u16, rows: u16, cwd: &Path) -> Result<(), SessionError>;
}

pub struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub child_killer: Box<dyn ChildKiller + Send + Sync>,
    pub process_id: Option<u32>,
    pub writer: Box<dyn Write + Send>,
}

impl PtyHandle {
    pub fn send_input(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;
        Ok(())
    }

    pub fn kill(&mut self) -> Result<()> {
        self.kill_process_group()
    }

    #[cfg(unix)]
    fn process_group_id(&self) -> Option<libc::pid_t> {
        self.process_id
            .filter(|pid| *pid > 0)
            .map(|pid| pid as libc::pid_t)
    }

    #[cfg(unix)]
    fn signal_process_group(&self, pgid: libc::pid_t, signal: i32) -> Result<()> {
        let result = unsafe { libc::kill(-pgid, signal) };
        if result == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err.into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_process_group(&mut self) -> Result<()> {
        self.child_killer.kill()?;
        Ok(())
    }

    #[cfg(unix)]
    fn kill_process_group(&mut self) -> Result<()> {
        if let Some(pgid) = self.process_group_id() {
            // portable-pty uses setsid() on spawn, so pid == pgid for the child.
            if self.signal_process_group(pgid, libc::SIGKILL).is_ok() {
                return Ok(());
            }
        }

        self.child_killer.kill()?;
        Ok(())
    }
}

/// Switch between a session's reader and the bus.
///
/// Chunks are published while the gate lock is held, so once `close` returns
/// no chunk from this session can reach the bus.
pub(crate) struct OutputGate {
    open: Mutex<bool>,
}

impl OutputGate {
    pub(crate) fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
        }
    }

    pub(crate) fn open(&self) {
        *lock(&self.open) = true;
    }

    /// Waits for a publish in flight, then shuts the gate.
    pub(crate) fn close(&self) {
        *lock(&self.open) = false;
    }

    /// Run `publish` if the gate is open. Returns whether it was.
    pub(crate) fn pass(&self, publish: impl FnOnce()) -> bool {
        let open = lock(&self.open);
        if *open {
            publish();
        }
        *open
    }
}

struct SessionSlot {
    inner: Mutex<SlotInner>,
    /// Closed before `Closed` is published. Lock order is `inner` then `output`.
    output: OutputGate,
}

struct SlotInner {
    info: SessionInfo,
    handle: Option<PtyHandle>,
}

type SessionMap = Arc<Mutex<HashMap<String, Arc<SessionSlot>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns one child process per session id and streams its output onto the bus.
///
/// The session map lock is only held to look up or insert a slot. Each slot has
/// its own lock, so writes to one session never wait on another.
pub struct PtyManager {
    pty_system: Mutex<Box<dyn PtySystem + Send>>,
    shell: ShellConfig,
    sessions: SessionMap,
    bus: EventBus,
}

impl PtyManager {
    pub fn new(shell: ShellConfig, bus: EventBus) -> Self {
        Self::with_pty_system(native_pty_system(), shell, bus)
    }

    pub fn with_pty_system(
        pty_system: Box<dyn PtySystem + Send>,
        shell: ShellConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            pty_system: Mutex::new(pty_system),
            shell,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Spawn a shell for `id` in `cwd`. Duplicate ids are rejected.
    pub fn create(&self, id: &str, cols: u16, rows: u16, cwd: &Path) -> Result<(), SessionError> {
        let slot = Arc::new(SessionSlot {
            inner: Mutex::new(SlotInner {
                info: SessionInfo::new(id.to_string(), cwd.to_path_buf(), cols, rows),
                handle: None,
            }),
            output: OutputGate::new(false),
        });

        {
            let mut sessions = lock(&self.sessions);
            if sessions.contains_key(id) {
                return Err(SessionError::AlreadyExists(id.to_string()));
            }
            sessions.insert(id.to_string(), slot.clone());
        }

        match self.spawn_into(&slot, id, cols, rows, cwd) {
            Ok(()) => {
                tracing::info!(session = id, cwd = %cwd.display(), cols, rows, "session started");
                Ok(())
            }
            Err(e) => {
                let mut sessions = lock(&self.sessions);
                if sessions.get(id).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                    sessions.remove(id);
                }
                Err(e)
            }
        }
    }

    fn spawn_into(
        &self,
        slot: &Arc<SessionSlot>,
        id: &str,
        cols: u16,
        rows: u16,
        cwd: &Path,
    ) -> Result<(), SessionError> {
        let pair = lock(&self.pty_system)
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::spawn(id, format!("failed to open PTY: {e}")))?;
        let PtyPair { master, slave } = pair;

        let reader = master
            .try_clone_reader()
            .map_err(|e| SessionError::spawn(id, format!("failed to clone PTY reader: {e}")))?;
        let writer = master
            .take_writer()
            .map_err(|e| SessionError::spawn(id, format!("failed to take PTY writer: {e}")))?;

        let mut child = slave
            .spawn_command(self.shell.command(cwd, cols, rows))
            .map_err(|e| SessionError::spawn(id, format!("failed to spawn shell: {e}")))?;
        // The reader only sees EOF once our copy of the slave side is gone.
        drop(slave);

        let mut handle = PtyHandle {
            master,
            child_killer: child.clone_killer(),
            process_id: child.process_id(),
            writer,
        };

        {
            let mut inner = lock(&slot.inner);
            if inner.info.is_closed() {
                // Closed while the child was starting.
                let _ = handle.kill();
                let _ = child.wait();
                return Err(SessionError::UnknownSession(id.to_string()));
            }
            inner.info.mark_running();
            inner.handle = Some(handle);
            slot.output.open();
        }

        let thread_slot = slot.clone();
        let sessions = self.sessions.clone();
        let bus = self.bus.clone();
        let sid = id.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("pty-reader-{}", id.chars().take(8).collect::<String>()))
            .spawn(move || {
                let mut reader = reader;
                Self::read_session_output(&sid, &mut reader, child, &bus, &thread_slot, &sessions);
            });

        if let Err(e) = spawned {
            let _ = self.close(id);
            return Err(SessionError::spawn(id, format!("failed to start reader thread: {e}")));
        }
        Ok(())
    }

    /// Reader thread body: forward output, then tear down if the child exited on its own.
    fn read_session_output(
        id: &str,
        reader: &mut Box<dyn Read + Send>,
        mut child: Box<dyn Child + Send + Sync>,
        bus: &EventBus,
        slot: &Arc<SessionSlot>,
        sessions: &SessionMap,
    ) {
        pump_output(id, reader.as_mut(), bus, &slot.output);

        let exit_code = child.wait().ok().map(|status| status.exit_code() as i32);

        let owns_teardown = {
            let mut inner = lock(&slot.inner);
            if inner.info.is_closed() {
                false
            } else {
                inner.info.mark_closed();
                slot.output.close();
                true
            }
        };
        if !owns_teardown {
            return;
        }

        // Unprompted exit: deregister first, then release the handles.
        bus.publish(BusEvent::Closed {
            id: id.to_string(),
            exit_code,
        });
        bus.remove(id);
        {
            let mut sessions = lock(sessions);
            if sessions.get(id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                sessions.remove(id);
            }
        }
        lock(&slot.inner).handle.take();
        tracing::info!(session = id, ?exit_code, "session exited");
    }

    /// Forward raw bytes to the child's input.
    ///
    /// A pipe failure closes the session and is reported as `Io`.
    pub fn write(&self, id: &str, data: &[u8]) -> Result<(), SessionError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;

        let result = {
            let mut inner = lock(&slot.inner);
            match inner.handle.as_mut() {
                Some(handle) => handle.send_input(data),
                None => return Err(SessionError::UnknownSession(id.to_string())),
            }
        };

        if let Err(source) = result {
            tracing::warn!(session = id, error = %source, "write failed, closing session");
            let _ = self.close(id);
            return Err(SessionError::Io {
                id: id.to_string(),
                source,
            });
        }
        Ok(())
    }

    /// Update the PTY window size. Closed sessions ignore it.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;

        let mut inner = lock(&slot.inner);
        if inner.info.is_closed() {
            return Ok(());
        }
        if let Some(handle) = inner.handle.as_ref() {
            handle
                .resize(rows, cols)
                .map_err(|e| SessionError::Io {
                    id: id.to_string(),
                    source: io::Error::other(e.to_string()),
                })?;
        }
        inner.info.cols = cols;
        inner.info.rows = rows;
        Ok(())
    }

    /// Terminate the child and release its handles. Unknown or closed ids succeed.
    pub fn close(&self, id: &str) -> Result<(), SessionError> {
        let Some(slot) = lock(&self.sessions).remove(id) else {
            return Ok(());
        };

        let handle = {
            let mut inner = lock(&slot.inner);
            if inner.info.is_closed() {
                return Ok(());
            }
            inner.info.mark_closed();
            // Stop output forwarding before the process goes away.
            slot.output.close();
            inner.handle.take()
        };

        if let Some(mut handle) = handle {
            if let Err(e) = handle.kill() {
                tracing::debug!(session = id, error = %e, "kill failed, child likely gone");
            }
        }

        self.bus.publish(BusEvent::Closed {
            id: id.to_string(),
            exit_code: None,
        });
        self.bus.remove(id);
        tracing::info!(session = id, "session closed");
        Ok(())
    }

    pub fn close_all(&self) {
        for id in self.list() {
            let _ = self.close(&id);
        }
    }

    pub fn info(&self, id: &str) -> Option<SessionInfo> {
        self.slot(id).map(|slot| lock(&slot.inner).info.clone())
    }

    /// Ids of live sessions, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: &str) -> Option<Arc<SessionSlot>> {
        lock(&self.sessions).get(id).cloned()
    }
}

impl SessionSpawner for PtyManager {
    fn create(&self, id: &str, cols: u16, rows: u16, cwd: &Path) -> Result<(), SessionError> {
        PtyManager::create(self, id, cols, rows, cwd)
    }
}

/// Read until EOF, error, or until the gate shuts, publishing each chunk in order.
pub(crate) fn pump_output(id: &str, reader: &mut dyn Read, bus: &EventBus, gate: &OutputGate) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let data = decode_chunk(&mut pending, &buf[..n]);
                let open = gate.pass(|| {
                    if !data.is_empty() {
                        bus.publish(BusEvent::Output {
                            id: id.to_string(),
                            data,
                        });
                    }
                });
                if !open {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports the slave side closing.
                tracing::debug!(session = id, error = %e, "pty read ended");
                break;
            }
        }
    }
}

/// Decode bytes as UTF-8, holding back an incomplete trailing sequence for the next chunk.
fn decode_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let keep = match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() => pending.len() - e.valid_up_to(),
        _ => 0,
    };
    let split = pending.len() - keep;
    let text = String::from_utf8_lossy(&pending[..split]).into_owned();
    pending.drain(..split);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_pty::{CommandBuilder, ExitStatus, SlavePty};
    use std::sync::Condvar;
    use std::time::{Duration, Instant};

    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        index: usize,
    }

    impl ChunkedReader {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self { chunks, index: 0 }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.index >= self.chunks.len() {
                return Ok(0);
            }
            let chunk = &self.chunks[self.index];
            let len = chunk.len().min(buf.len());
            buf[..len].copy_from_slice(&chunk[..len]);
            self.index += 1;
            Ok(len)
        }
    }

    fn drain(sub: &mut crate::bus::Subscription) -> Vec<BusEvent> {
        let mut events = Vec::new();
        while let Some(event) = sub.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn pump_publishes_chunks_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("s");
        let mut reader = ChunkedReader::new(vec![b"hello".to_vec(), b"world".to_vec()]);
        let gate = OutputGate::new(true);

        pump_output("s", &mut reader, &bus, &gate);

        assert_eq!(
            drain(&mut sub),
            vec![
                BusEvent::Output { id: "s".into(), data: "hello".into() },
                BusEvent::Output { id: "s".into(), data: "world".into() },
            ]
        );
    }

    #[test]
    fn pump_stops_when_the_gate_is_shut() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("s");
        let mut reader = ChunkedReader::new(vec![b"late".to_vec()]);
        let gate = OutputGate::new(false);

        pump_output("s", &mut reader, &bus, &gate);

        assert!(drain(&mut sub).is_empty());
    }

    /// Shuts the gate right before its second read, as `close` would from another thread.
    struct ClosingReader<'a> {
        gate: &'a OutputGate,
        inner: ChunkedReader,
    }

    impl Read for ClosingReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inner.index == 1 {
                self.gate.close();
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn nothing_is_published_once_the_gate_shuts() {
        let bus = EventBus::new();
        let mut all = bus.subscribe_all();
        let gate = OutputGate::new(true);
        let mut reader = ClosingReader {
            gate: &gate,
            inner: ChunkedReader::new(vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]),
        };

        pump_output("s", &mut reader, &bus, &gate);

        assert_eq!(
            drain(&mut all),
            vec![BusEvent::Output { id: "s".into(), data: "first".into() }]
        );
    }

    #[test]
    fn closing_the_gate_waits_for_a_publish_in_flight() {
        let gate = Arc::new(OutputGate::new(true));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut closer = None;

        let passed = gate.pass(|| {
            let closing_gate = gate.clone();
            let closing_order = order.clone();
            closer = Some(std::thread::spawn(move || {
                closing_gate.close();
                closing_order.lock().unwrap().push("closed");
            }));
            std::thread::sleep(Duration::from_millis(50));
            order.lock().unwrap().push("published");
        });
        closer.unwrap().join().unwrap();

        assert!(passed);
        assert_eq!(*order.lock().unwrap(), vec!["published", "closed"]);
        assert!(!gate.pass(|| panic!("published through a closed gate")));
    }

    #[test]
    fn multibyte_characters_split_across_reads_survive() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("s");
        let bytes = "⠋ ok".as_bytes();
        let mut reader = ChunkedReader::new(vec![bytes[..2].to_vec(), bytes[2..].to_vec()]);
        let gate = OutputGate::new(true);

        pump_output("s", &mut reader, &bus, &gate);

        let text: String = drain(&mut sub)
            .into_iter()
            .filter_map(|e| match e {
                BusEvent::Output { data, .. } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(text, "⠋ ok");
    }

    #[test]
    fn operations_on_unknown_sessions() {
        let manager = PtyManager::new(ShellConfig::default(), EventBus::new());
        assert!(matches!(
            manager.write("nope", b"ls\n"),
            Err(SessionError::UnknownSession(_))
        ));
        assert!(matches!(
            manager.resize("nope", 80, 24),
            Err(SessionError::UnknownSession(_))
        ));
        assert!(manager.close("nope").is_ok());
        assert!(manager.info("nope").is_none());
    }

    /// Tripped when the fake child is killed.
    #[derive(Debug, Clone, Default)]
    struct KillSwitch(Arc<(Mutex<bool>, Condvar)>);

    impl KillSwitch {
        fn trip(&self) {
            let (killed, cv) = &*self.0;
            *killed.lock().unwrap() = true;
            cv.notify_all();
        }

        fn is_tripped(&self) -> bool {
            *self.0 .0.lock().unwrap()
        }

        fn wait(&self) {
            let (killed, cv) = &*self.0;
            let mut killed = killed.lock().unwrap();
            while !*killed {
                killed = cv.wait(killed).unwrap();
            }
        }
    }

    /// Reports EOF once the child is killed, like a PTY whose slave went away.
    struct HangingReader(KillSwitch);

    impl Read for HangingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.wait();
            Ok(0)
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "pty closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenMaster(KillSwitch);

    impl MasterPty for BrokenMaster {
        fn resize(&self, _size: PtySize) -> Result<()> {
            Ok(())
        }

        fn get_size(&self) -> Result<PtySize> {
            Ok(PtySize::default())
        }

        fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>> {
            Ok(Box::new(HangingReader(self.0.clone())))
        }

        fn take_writer(&self) -> Result<Box<dyn Write + Send>> {
            Ok(Box::new(BrokenWriter))
        }

        #[cfg(unix)]
        fn process_group_leader(&self) -> Option<libc::pid_t> {
            None
        }

        #[cfg(unix)]
        fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
            None
        }
    }

    #[derive(Debug)]
    struct TestChild(KillSwitch);

    impl ChildKiller for TestChild {
        fn kill(&mut self) -> io::Result<()> {
            self.0.trip();
            Ok(())
        }

        fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
            Box::new(TestChild(self.0.clone()))
        }
    }

    impl Child for TestChild {
        fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
            Ok(self.0.is_tripped().then(|| ExitStatus::with_exit_code(1)))
        }

        fn wait(&mut self) -> io::Result<ExitStatus> {
            self.0.wait();
            Ok(ExitStatus::with_exit_code(1))
        }

        fn process_id(&self) -> Option<u32> {
            None
        }

        #[cfg(windows)]
        fn as_raw_handle(&self) -> Option<std::os::windows::io::RawHandle> {
            None
        }
    }

    struct TestSlave(KillSwitch);

    impl SlavePty for TestSlave {
        fn spawn_command(&self, _cmd: CommandBuilder) -> Result<Box<dyn Child + Send + Sync>> {
            Ok(Box::new(TestChild(self.0.clone())))
        }
    }

    /// Opens PTYs whose input side is already broken.
    #[derive(Default)]
    struct BrokenPtySystem(KillSwitch);

    impl PtySystem for BrokenPtySystem {
        fn openpty(&self, _size: PtySize) -> Result<PtyPair> {
            Ok(PtyPair {
                slave: Box::new(TestSlave(self.0.clone())),
                master: Box::new(BrokenMaster(self.0.clone())),
            })
        }
    }

    #[test]
    fn failed_write_closes_the_session() {
        let bus = EventBus::new();
        let mut all = bus.subscribe_all();
        let killed = KillSwitch::default();
        let manager = PtyManager::with_pty_system(
            Box::new(BrokenPtySystem(killed.clone())),
            ShellConfig::default(),
            bus.clone(),
        );

        manager.create("w", 80, 24, &std::env::temp_dir()).unwrap();
        assert!(manager.info("w").is_some());

        let err = manager.write("w", b"ls\r").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Io { ref id, ref source } if id == "w" && source.kind() == ErrorKind::BrokenPipe
        ));
        assert!(killed.is_tripped());
        assert!(manager.info("w").is_none());
        assert!(manager.list().is_empty());

        // Give the reader thread time to notice the kill; it must not announce a second close.
        std::thread::sleep(Duration::from_millis(100));
        let closed: Vec<BusEvent> = drain(&mut all)
            .into_iter()
            .filter(|e| matches!(e, BusEvent::Closed { .. }))
            .collect();
        assert_eq!(
            closed,
            vec![BusEvent::Closed { id: "w".into(), exit_code: None }]
        );

        assert!(matches!(
            manager.write("w", b"ls\r"),
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[cfg(unix)]
    fn sh_manager(bus: &EventBus) -> PtyManager {
        PtyManager::new(ShellConfig::with_program("/bin/sh"), bus.clone())
    }

    #[cfg(unix)]
    async fn collect_until(
        sub: &mut crate::bus::Subscription,
        timeout: Duration,
        done: impl Fn(&[BusEvent]) -> bool,
    ) -> Vec<BusEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while !done(&events) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, sub.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) | Err(_) => break,
            }
        }
        events
    }

    #[cfg(unix)]
    fn output_text(events: &[BusEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Output { data, .. } => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_echo_round_trip() {
        let bus = EventBus::new();
        let manager = sh_manager(&bus);
        let mut sub = bus.subscribe("echo");

        manager.create("echo", 80, 24, &std::env::temp_dir()).unwrap();
        manager.write("echo", b"echo PANEGRID_OK\n").unwrap();

        let events = collect_until(&mut sub, Duration::from_secs(5), |events| {
            output_text(events).matches("PANEGRID_OK").count() >= 2
        })
        .await;
        assert!(
            output_text(&events).contains("PANEGRID_OK"),
            "got: {}",
            output_text(&events)
        );

        manager.close("echo").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn duplicate_ids_are_rejected() {
        let bus = EventBus::new();
        let manager = sh_manager(&bus);
        manager.create("dup", 80, 24, &std::env::temp_dir()).unwrap();

        let second = manager.create("dup", 80, 24, &std::env::temp_dir());
        assert!(matches!(second, Err(SessionError::AlreadyExists(_))));
        assert_eq!(manager.list(), vec!["dup".to_string()]);

        manager.close("dup").unwrap();
        assert!(manager.list().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn closing_twice_tears_down_once() {
        let bus = EventBus::new();
        let manager = sh_manager(&bus);
        let mut all = bus.subscribe_all();

        manager.create("twice", 80, 24, &std::env::temp_dir()).unwrap();
        manager.close("twice").unwrap();
        manager.close("twice").unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut closed = 0;
        while let Some(event) = all.try_recv() {
            if matches!(event, BusEvent::Closed { .. }) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        assert!(manager.info("twice").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn resize_updates_session_info() {
        let bus = EventBus::new();
        let manager = sh_manager(&bus);
        manager.create("size", 80, 24, &std::env::temp_dir()).unwrap();

        manager.resize("size", 120, 40).unwrap();
        let info = manager.info("size").unwrap();
        assert_eq!((info.cols, info.rows), (120, 40));
        assert_eq!(info.state, crate::models::SessionState::Running);

        manager.close("size").unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unprompted_exit_emits_closed_and_removes_session() {
        let bus = EventBus::new();
        let manager = sh_manager(&bus);
        let mut sub = bus.subscribe("bye");

        manager.create("bye", 80, 24, &std::env::temp_dir()).unwrap();
        manager.write("bye", b"exit 3\n").unwrap();

        let events = collect_until(&mut sub, Duration::from_secs(5), |events| {
            events.iter().any(|e| matches!(e, BusEvent::Closed { .. }))
        })
        .await;
        assert!(matches!(
            events.last(),
            Some(BusEvent::Closed { id, .. }) if id == "bye"
        ));

        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.info("bye").is_some() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(manager.info("bye").is_none());
        assert!(matches!(
            manager.write("bye", b"ls\n"),
            Err(SessionError::UnknownSession(_))
        ));
    }
}
