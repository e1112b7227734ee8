//! Append-only JSONL log of SysEx traffic.
//!
//! Written to `~/.local/share/virusmc/traffic.jsonl` when enabled in the
//! config. One line per frame, tailable with `tail -f`.
//!
//! Frames are queued on a bounded channel and written by a dedicated thread,
//! so file I/O stays off the processing path. When the queue is full the
//! entry is dropped and counted.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use virusmc_types::MidiEventSource;

/// Entries waiting for the writer thread.
const WRITE_QUEUE_CAPACITY: usize = 1024;

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("virusmc"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Serialize)]
struct SessionHeader {
    event: &'static str,
    epoch_ms: u128,
    pid: u32,
}

/// One frame, as queued for and written by the writer thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEntry {
    pub t_ms: u128,
    pub dir: Direction,
    pub source: MidiEventSource,
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handle to the log. Dropping it flushes what is queued and stops the writer.
pub struct TrafficLog {
    tx: Option<Sender<TrafficEntry>>,
    writer: Option<JoinHandle<()>>,
    session_start: Instant,
    dropped: u64,
}

impl TrafficLog {
    /// Open the default log file, creating its directory.
    pub fn open() -> Option<Self> {
        let dir = log_dir();
        if std::fs::create_dir_all(&dir).is_err() {
            return None;
        }
        Self::open_at(&dir.join("traffic.jsonl"))
    }

    pub fn open_at(path: &Path) -> Option<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()?;
        let mut out = BufWriter::new(file);

        let header = SessionHeader {
            event: "session_start",
            epoch_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            pid: std::process::id(),
        };
        if let Ok(json) = serde_json::to_string(&header) {
            let _ = writeln!(out, "{}", json);
            let _ = out.flush();
        }

        let (tx, rx) = crossbeam_channel::bounded::<TrafficEntry>(WRITE_QUEUE_CAPACITY);
        let writer = thread::Builder::new()
            .name("virusmc-traffic-log".into())
            .spawn(move || writer_loop(out, rx))
            .map_err(|e| log::warn!(target: "mc::traffic", "could not start traffic log writer: {}", e))
            .ok()?;

        Some(Self {
            tx: Some(tx),
            writer: Some(writer),
            session_start: Instant::now(),
            dropped: 0,
        })
    }

    /// Queue one frame. Never blocks.
    pub fn log(&mut self, dir: Direction, source: MidiEventSource, bytes: &[u8], error: Option<&str>) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let entry = TrafficEntry {
            t_ms: self.session_start.elapsed().as_millis(),
            dir,
            source,
            bytes: bytes.to_vec(),
            error: error.map(str::to_owned),
        };
        match tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!(target: "mc::traffic", "traffic log writer stopped, disabling log");
                self.tx = None;
            }
        }
    }

    /// Entries lost because the writer fell behind.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl Drop for TrafficLog {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn writer_loop(mut out: BufWriter<File>, rx: Receiver<TrafficEntry>) {
    while let Ok(entry) = rx.recv() {
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(out, "{}", json);
        }
        // flush once the burst is written
        if rx.is_empty() {
            let _ = out.flush();
        }
    }
    let _ = out.flush();
}

#[derive(Debug)]
pub enum TrafficLogError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl From<std::io::Error> for TrafficLogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for TrafficLogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl std::fmt::Display for TrafficLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for TrafficLogError {}

/// Read every frame entry back. Session headers and blank lines are skipped;
/// any other line that does not parse is an error.
pub fn read_traffic_log(path: &Path) -> Result<Vec<TrafficEntry>, TrafficLogError> {
    let file = File::open(path)?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() || line.contains("\"session_start\"") {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.jsonl");
        let mut log = TrafficLog::open_at(&path).unwrap();
        log.log(Direction::In, MidiEventSource::Editor, &[0xf0, 0x01, 0xf7], None);
        log.log(Direction::In, MidiEventSource::Host, &[0xf0], Some("truncated"));
        log.log(Direction::Out, MidiEventSource::Internal, &[0xf0, 0x02, 0xf7], None);
        drop(log);

        let entries = read_traffic_log(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].dir, Direction::In);
        assert_eq!(entries[0].bytes, vec![0xf0, 0x01, 0xf7]);
        assert_eq!(entries[1].error.as_deref(), Some("truncated"));
        assert_eq!(entries[2].source, MidiEventSource::Internal);
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.jsonl");
        TrafficLog::open_at(&path).unwrap().log(Direction::In, MidiEventSource::Host, &[1], None);
        TrafficLog::open_at(&path).unwrap().log(Direction::In, MidiEventSource::Host, &[2], None);
        let entries = read_traffic_log(&path).unwrap();
        assert_eq!(entries.iter().map(|e| e.bytes[0]).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.jsonl");
        let mut log = TrafficLog::open_at(&path).unwrap();
        let total = WRITE_QUEUE_CAPACITY * 4;
        for n in 0..total {
            log.log(Direction::In, MidiEventSource::Host, &[(n % 128) as u8], None);
        }
        let dropped = log.dropped_count() as usize;
        drop(log);

        let entries = read_traffic_log(&path).unwrap();
        assert_eq!(entries.len() + dropped, total);
        assert_eq!(entries[0].bytes, vec![0]);
    }

    #[test]
    fn garbage_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(matches!(read_traffic_log(&path), Err(TrafficLogError::Json(_))));
    }
}
