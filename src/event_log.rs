//! JSONL log of events applied by the tick loop.

use anyhow::{Context, Result};
use serde::Serialize;
use simrelay_core::SimTick;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One event observed by the tick loop.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    /// Simulation step when the event was applied.
    pub tick: SimTick,
    /// Simulated seconds at that step.
    pub sim_time: f64,
    /// Event label (`control`, `connect`, ...).
    pub kind: &'a str,
    pub detail: &'a str,
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent dirs if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one record as a JSON line.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrelay_testkit::read_jsonl;

    #[test]
    fn records_roundtrip_through_disk() {
        let path = std::env::temp_dir().join(format!(
            "simrelay_events_{:016x}/log.jsonl",
            rand::random::<u64>()
        ));
        let mut sink = JsonlSink::create(&path).expect("creates parent dir");
        for (i, kind) in ["connect", "control"].iter().enumerate() {
            sink.write(&EventRecord {
                tick: SimTick(i as u64),
                sim_time: i as f64 * 0.01,
                kind: *kind,
                detail: "pause:true",
            })
            .expect("write succeeds");
        }
        sink.flush().expect("flush");

        let lines = read_jsonl(&path).expect("readable");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["kind"], "control");
        assert_eq!(lines[1]["tick"], 1);
        assert_eq!(lines[1]["detail"], "pause:true");
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
