//! Stack dumps: capture every thread's call stack and write it out.
//!
//! A dump lands either in a fresh, timestamped file under a directory
//! (`goroutine-stacks-<stamp>.log`) or on stderr.
use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use std::backtrace::Backtrace;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name prefix for dump artifacts.
const ARTIFACT_PREFIX: &str = "goroutine-stacks-";

/// How many `-N` suffixes to try when dumps collide within one second.
const MAX_NAME_COLLISIONS: u32 = 1024;

/// Sentinel name reported for dumps written to stderr.
const LIVE_STREAM_NAME: &str = "/dev/stderr";

/// Source of the raw textual stack dump.
///
/// `fill` writes at most `buf.len()` bytes (a prefix of the full dump) and
/// returns how many were written. A return equal to `buf.len()` means the
/// dump may have been cut short.
pub trait StackSource: Send + Sync {
    fn fill(&self, buf: &mut [u8], all_threads: bool) -> usize;
}

/// Renders the stacks of the running process.
///
/// On Linux every thread in `/proc/self/task` is listed with its name,
/// scheduler state and wait channel (plus the kernel stack when the process
/// may read it). The calling thread also gets a full symbolized backtrace.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessStacks;

impl ProcessStacks {
    fn render(&self, all_threads: bool) -> String {
        let current = current_tid();
        let mut out = String::new();

        let name = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| "unnamed".to_string());
        match current {
            Some(tid) => out.push_str(&format!("thread {tid} \"{name}\" [running, current]:\n")),
            None => out.push_str(&format!("thread \"{name}\" [running, current]:\n")),
        }
        out.push_str(&Backtrace::force_capture().to_string());
        out.push('\n');

        if !all_threads {
            return out;
        }
        for tid in task_ids() {
            if Some(tid) == current {
                continue;
            }
            out.push('\n');
            render_task(&mut out, tid);
        }
        out
    }
}

impl StackSource for ProcessStacks {
    fn fill(&self, buf: &mut [u8], all_threads: bool) -> usize {
        let dump = self.render(all_threads);
        let n = dump.len().min(buf.len());
        buf[..n].copy_from_slice(&dump.as_bytes()[..n]);
        n
    }
}

fn task_dir(tid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/self/task/{tid}"))
}

/// Thread id of the caller, from the `/proc/thread-self` link (`<pid>/task/<tid>`).
fn current_tid() -> Option<u32> {
    let link = std::fs::read_link("/proc/thread-self").ok()?;
    link.file_name()?.to_str()?.parse().ok()
}

fn task_ids() -> Vec<u32> {
    let entries = match std::fs::read_dir("/proc/self/task") {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut ids: Vec<u32> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().and_then(|n| n.parse().ok()))
        .collect();
    ids.sort_unstable();
    ids
}

fn render_task(out: &mut String, tid: u32) {
    let dir = task_dir(tid);
    let read = |file: &str| {
        std::fs::read_to_string(dir.join(file))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let name = read("comm");
    let state = read("status")
        .lines()
        .find_map(|line| line.strip_prefix("State:"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    out.push_str(&format!("thread {tid} \"{name}\" [{state}]:\n"));

    let wchan = read("wchan");
    if !wchan.is_empty() && wchan != "0" {
        out.push_str(&format!("    wchan: {wchan}\n"));
    }
    let kernel_stack = read("stack");
    for frame in kernel_stack.lines() {
        out.push_str(&format!("    {frame}\n"));
    }
}

/// Immutable bytes of one complete stack dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSnapshot(Vec<u8>);

impl StackSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Buffer sizing for the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// First buffer size tried.
    pub initial: usize,
    /// Largest buffer the loop may allocate.
    pub max: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            initial: 16 * 1024,
            max: 1024 * 1024 * 1024,
        }
    }
}

/// Where a dump should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureDestination {
    /// A new uniquely named file under this directory.
    Directory(PathBuf),
    /// The process's stderr.
    LiveStream,
}

impl CaptureDestination {
    /// An empty path means "no directory": dump to stderr.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            CaptureDestination::LiveStream
        } else {
            CaptureDestination::Directory(dir)
        }
    }
}

/// Where a dump ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    File(PathBuf),
    LiveStream,
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::File(path) => write!(f, "{}", path.display()),
            ArtifactLocation::LiveStream => f.write_str(LIVE_STREAM_NAME),
        }
    }
}

/// Errors from a single dump attempt.
#[derive(Debug)]
pub enum CaptureError {
    /// The artifact file could not be created.
    Open { path: PathBuf, source: io::Error },
    /// The snapshot could not be written completely.
    Write {
        location: ArtifactLocation,
        source: io::Error,
    },
    /// The snapshot still filled the largest allowed buffer.
    Oversized { limit: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Open { path, source } => {
                write!(
                    f,
                    "failed to open {} to write the stack dump: {}",
                    path.display(),
                    source
                )
            }
            CaptureError::Write { location, source } => {
                write!(f, "failed to write stack dump to {}: {}", location, source)
            }
            CaptureError::Oversized { limit } => {
                write!(f, "stack dump does not fit in the {limit}-byte capture limit")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Open { source, .. } => Some(source),
            CaptureError::Write { source, .. } => Some(source),
            CaptureError::Oversized { .. } => None,
        }
    }
}

/// Take a complete snapshot from `source`, doubling the buffer until the
/// dump comes back strictly shorter than the buffer.
pub fn capture_snapshot(
    source: &dyn StackSource,
    limits: BufferLimits,
) -> Result<StackSnapshot, CaptureError> {
    let max = limits.max.max(1);
    let mut len = limits.initial.clamp(1, max);
    loop {
        let mut buf = vec![0u8; len];
        let written = source.fill(&mut buf, true).min(len);
        if written < len {
            buf.truncate(written);
            return Ok(StackSnapshot(buf));
        }
        if len >= max {
            return Err(CaptureError::Oversized { limit: max });
        }
        tracing::debug!(buffer_bytes = len, "stack dump filled the buffer, doubling");
        len = len.saturating_mul(2).min(max);
    }
}

/// `goroutine-stacks-<RFC 3339 stamp without ':'>.log`
pub fn artifact_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    numbered_file_name(&file_stamp(at), 0)
}

fn file_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.to_rfc3339_opts(SecondsFormat::Secs, true).replace(':', "")
}

fn numbered_file_name(stamp: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{ARTIFACT_PREFIX}{stamp}.log")
    } else {
        format!("{ARTIFACT_PREFIX}{stamp}-{attempt}.log")
    }
}

fn open_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    options.open(path)
}

/// Create the artifact file, stepping past names taken by earlier dumps.
fn create_artifact(dir: &Path, stamp: &str) -> Result<(PathBuf, File), CaptureError> {
    for attempt in 0..=MAX_NAME_COLLISIONS {
        let path = dir.join(numbered_file_name(stamp, attempt));
        match open_exclusive(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(CaptureError::Open { path, source }),
        }
    }
    Err(CaptureError::Open {
        path: dir.join(numbered_file_name(stamp, MAX_NAME_COLLISIONS)),
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "every candidate dump file name is already taken",
        ),
    })
}

/// Captures snapshots and writes them to a [`CaptureDestination`].
#[derive(Clone)]
pub struct StackDumper {
    source: Arc<dyn StackSource>,
    limits: BufferLimits,
    clock: fn() -> DateTime<Local>,
}

impl fmt::Debug for StackDumper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackDumper")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for StackDumper {
    fn default() -> Self {
        Self::new(BufferLimits::default())
    }
}

impl StackDumper {
    /// Dump the stacks of this process.
    pub fn new(limits: BufferLimits) -> Self {
        Self::with_source(Arc::new(ProcessStacks), limits)
    }

    pub fn with_source(source: Arc<dyn StackSource>, limits: BufferLimits) -> Self {
        Self {
            source,
            limits,
            clock: Local::now,
        }
    }

    /// Replace the clock used to stamp artifact names.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Capture a full snapshot and write it to `destination`.
    pub fn dump(&self, destination: &CaptureDestination) -> Result<ArtifactLocation, CaptureError> {
        let snapshot = capture_snapshot(self.source.as_ref(), self.limits)?;
        match destination {
            CaptureDestination::Directory(dir) => {
                let stamp = file_stamp(&(self.clock)());
                write_to_dir(dir, &stamp, snapshot)
            }
            CaptureDestination::LiveStream => write_to_stderr(snapshot),
        }
    }
}

/// Write the whole snapshot to `writer` and flush it.
fn write_snapshot<W: Write>(
    writer: &mut W,
    snapshot: &StackSnapshot,
    location: &ArtifactLocation,
) -> Result<(), CaptureError> {
    writer
        .write_all(snapshot.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|source| CaptureError::Write {
            location: location.clone(),
            source,
        })
}

fn write_to_dir(
    dir: &Path,
    stamp: &str,
    snapshot: StackSnapshot,
) -> Result<ArtifactLocation, CaptureError> {
    let (path, mut file) = create_artifact(dir, stamp)?;
    let location = ArtifactLocation::File(path);
    write_snapshot(&mut file, &snapshot, &location)?;
    file.sync_data().map_err(|source| CaptureError::Write {
        location: location.clone(),
        source,
    })?;
    tracing::debug!(%location, bytes = snapshot.len(), "wrote stack dump");
    Ok(location)
}

fn write_to_stderr(snapshot: StackSnapshot) -> Result<ArtifactLocation, CaptureError> {
    let location = ArtifactLocation::LiveStream;
    write_snapshot(&mut io::stderr().lock(), &snapshot, &location)?;
    Ok(location)
}

/// Dump this process's stacks with default buffer limits.
pub fn dump_stacks(destination: &CaptureDestination) -> Result<ArtifactLocation, CaptureError> {
    StackDumper::default().dump(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Produces exactly `size` bytes of dump text and counts calls.
    struct FixedSizeSource {
        size: usize,
        calls: AtomicUsize,
    }

    impl FixedSizeSource {
        fn new(size: usize) -> Self {
            Self {
                size,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl StackSource for FixedSizeSource {
        fn fill(&self, buf: &mut [u8], _all_threads: bool) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = self.size.min(buf.len());
            for (i, b) in buf[..n].iter_mut().enumerate() {
                *b = b'a' + (i % 26) as u8;
            }
            n
        }
    }

    /// Always fills whatever buffer it is handed.
    struct BottomlessSource;

    impl StackSource for BottomlessSource {
        fn fill(&self, buf: &mut [u8], _all_threads: bool) -> usize {
            buf.fill(b'x');
            buf.len()
        }
    }

    fn fixed_clock() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .single()
            .unwrap()
    }

    #[test]
    fn test_capture_never_truncates() {
        for size in [0, 1, 100, 16383, 16384, 16385, 40_000, 300_000] {
            let source = FixedSizeSource::new(size);
            let snapshot = capture_snapshot(&source, BufferLimits::default()).unwrap();
            assert_eq!(snapshot.len(), size, "snapshot of {size} bytes was cut");
        }
    }

    #[test]
    fn test_capture_doubles_when_dump_fills_buffer_exactly() {
        let source = FixedSizeSource::new(16 * 1024);
        let snapshot = capture_snapshot(&source, BufferLimits::default()).unwrap();
        assert_eq!(snapshot.len(), 16 * 1024);
        // 16 KiB fills the first buffer, 32 KiB holds it.
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capture_small_dump_takes_one_pass() {
        let source = FixedSizeSource::new(512);
        capture_snapshot(&source, BufferLimits::default()).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_preserves_content() {
        let source = FixedSizeSource::new(70_000);
        let snapshot = capture_snapshot(&source, BufferLimits::default()).unwrap();
        let bytes = snapshot.as_bytes();
        assert_eq!(bytes[0], b'a');
        assert_eq!(bytes[25], b'z');
        assert_eq!(bytes[69_999], b'a' + (69_999 % 26) as u8);
    }

    #[test]
    fn test_capture_stops_at_limit() {
        let limits = BufferLimits {
            initial: 16,
            max: 64,
        };
        let err = capture_snapshot(&BottomlessSource, limits).unwrap_err();
        assert!(matches!(err, CaptureError::Oversized { limit: 64 }));
        assert!(err.to_string().contains("64-byte"));
    }

    #[test]
    fn test_capture_fits_exactly_below_limit() {
        let limits = BufferLimits {
            initial: 16,
            max: 64,
        };
        let source = FixedSizeSource::new(63);
        let snapshot = capture_snapshot(&source, limits).unwrap();
        assert_eq!(snapshot.len(), 63);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_capture_zero_initial_buffer() {
        let limits = BufferLimits {
            initial: 0,
            max: 1024,
        };
        let snapshot = capture_snapshot(&FixedSizeSource::new(10), limits).unwrap();
        assert_eq!(snapshot.len(), 10);
    }

    #[test]
    fn test_process_stacks_lists_current_thread() {
        let source = ProcessStacks;
        let snapshot = capture_snapshot(&source, BufferLimits::default()).unwrap();
        let text = String::from_utf8_lossy(snapshot.as_bytes());
        assert!(!snapshot.is_empty());
        assert!(text.starts_with("thread "));
        assert!(text.contains("[running, current]"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_stacks_lists_other_threads() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        let parked = std::thread::Builder::new()
            .name("dump-target".to_string())
            .spawn(move || {
                // The thread names itself once it starts running.
                ready_tx.send(()).unwrap();
                let _ = rx.recv();
            })
            .unwrap();
        ready_rx.recv().unwrap();

        let snapshot = capture_snapshot(&ProcessStacks, BufferLimits::default()).unwrap();
        let text = String::from_utf8_lossy(snapshot.as_bytes()).to_string();

        tx.send(()).unwrap();
        parked.join().unwrap();
        assert!(text.contains("\"dump-target\""), "dump was:\n{text}");
    }

    #[test]
    fn test_artifact_file_name_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            artifact_file_name(&at),
            "goroutine-stacks-2024-03-05T140709Z.log"
        );
    }

    #[test]
    fn test_artifact_file_name_with_offset() {
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let at = offset.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            artifact_file_name(&at),
            "goroutine-stacks-2024-12-31T235959+0530.log"
        );
    }

    #[test]
    fn test_artifact_file_name_differs_per_second() {
        let first = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let second = first + chrono::Duration::seconds(1);
        assert_ne!(artifact_file_name(&first), artifact_file_name(&second));
        assert!(!artifact_file_name(&first).contains(':'));
    }

    #[test]
    fn test_from_dir_empty_is_live_stream() {
        assert_eq!(CaptureDestination::from_dir(""), CaptureDestination::LiveStream);
        assert_eq!(
            CaptureDestination::from_dir("/var/log"),
            CaptureDestination::Directory(PathBuf::from("/var/log"))
        );
    }

    #[test]
    fn test_live_stream_location_display() {
        assert_eq!(ArtifactLocation::LiveStream.to_string(), "/dev/stderr");
        assert_eq!(
            ArtifactLocation::File(PathBuf::from("/tmp/a.log")).to_string(),
            "/tmp/a.log"
        );
    }

    #[test]
    fn test_dump_to_directory_writes_full_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(50_000)),
            BufferLimits::default(),
        );

        let location = dumper
            .dump(&CaptureDestination::Directory(dir.path().to_path_buf()))
            .unwrap();

        let ArtifactLocation::File(path) = location else {
            panic!("expected a file artifact");
        };
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(std::fs::read(&path).unwrap().len(), 50_000);

        let pattern =
            regex::Regex::new(r"^goroutine-stacks-\d{4}-\d{2}-\d{2}T\d{6}(Z|[+-]\d{4})\.log$")
                .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(pattern.is_match(name), "unexpected name {name}");
    }

    #[test]
    fn test_dump_same_second_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(100)),
            BufferLimits::default(),
        )
        .with_clock(fixed_clock);
        let destination = CaptureDestination::Directory(dir.path().to_path_buf());

        let first = dumper.dump(&destination).unwrap();
        let second = dumper.dump(&destination).unwrap();
        let third = dumper.dump(&destination).unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);

        let stamp = file_stamp(&fixed_clock());
        assert_eq!(
            second,
            ArtifactLocation::File(dir.path().join(format!("goroutine-stacks-{stamp}-1.log")))
        );
    }

    #[test]
    fn test_dump_keeps_existing_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join(artifact_file_name(&fixed_clock()));
        std::fs::write(&taken, "earlier dump").unwrap();

        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(10)),
            BufferLimits::default(),
        )
        .with_clock(fixed_clock);
        dumper
            .dump(&CaptureDestination::Directory(dir.path().to_path_buf()))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "earlier dump");
    }

    #[cfg(unix)]
    #[test]
    fn test_dump_file_has_no_execute_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(10)),
            BufferLimits::default(),
        );
        let ArtifactLocation::File(path) = dumper
            .dump(&CaptureDestination::Directory(dir.path().to_path_buf()))
            .unwrap()
        else {
            panic!("expected a file artifact");
        };
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o600, 0o600);
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_dump_missing_directory_is_open_error() {
        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(10)),
            BufferLimits::default(),
        );
        let err = dumper
            .dump(&CaptureDestination::Directory(PathBuf::from(
                "/nonexistent-dir/impossible",
            )))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Open { .. }));
        assert!(err.to_string().contains("failed to open"));
        assert!(std::error::Error::source(&err).is_some());
    }

    /// Accepts a few bytes, then fails like a full disk.
    struct FullDisk {
        room: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "no space left"));
            }
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_write_error() {
        let snapshot = capture_snapshot(&FixedSizeSource::new(100), BufferLimits::default()).unwrap();
        let location = ArtifactLocation::File(PathBuf::from("/var/log/dump.log"));

        let err = write_snapshot(&mut FullDisk { room: 10 }, &snapshot, &location).unwrap_err();

        match &err {
            CaptureError::Write { location: at, .. } => assert_eq!(at, &location),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("failed to write stack dump to /var/log/dump.log"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_write_snapshot_writes_everything() {
        let snapshot = capture_snapshot(&FixedSizeSource::new(100), BufferLimits::default()).unwrap();
        let mut out = Vec::new();
        write_snapshot(&mut out, &snapshot, &ArtifactLocation::LiveStream).unwrap();
        assert_eq!(out, snapshot.as_bytes());
    }

    #[test]
    fn test_dump_oversized_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = StackDumper::with_source(
            Arc::new(BottomlessSource),
            BufferLimits {
                initial: 8,
                max: 32,
            },
        );
        let err = dumper
            .dump(&CaptureDestination::Directory(dir.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Oversized { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dump_to_live_stream() {
        let dumper = StackDumper::with_source(
            Arc::new(FixedSizeSource::new(4)),
            BufferLimits::default(),
        );
        let location = dumper.dump(&CaptureDestination::LiveStream).unwrap();
        assert_eq!(location, ArtifactLocation::LiveStream);
    }

    #[test]
    fn test_dump_stacks_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let location =
            dump_stacks(&CaptureDestination::Directory(dir.path().to_path_buf())).unwrap();
        let ArtifactLocation::File(path) = location else {
            panic!("expected a file artifact");
        };
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("thread "));
    }
}
