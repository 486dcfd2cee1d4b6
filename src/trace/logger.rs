use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{AutofillError, Result};
use crate::trace::trace::FlowTraceEvent;

struct Sink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Sink {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// One JSON object per line, flushed so readers see whole records.
    fn append(&self, event: &FlowTraceEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AutofillError::invariant("trace", "trace writer poisoned"))?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// JSONL sink for flow transitions. A trace that cannot be written is
/// reported and dropped.
pub struct TraceLogger {
    sink: Option<Sink>,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let sink = Sink::open(path)
            .inspect(|_| debug!(path = %path.display(), "tracing flow transitions"))
            .inspect_err(|e| warn!(path = %path.display(), error = %e, "could not open trace file"))
            .ok();
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn log(&self, event: &FlowTraceEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.append(event) {
            warn!(path = %sink.path.display(), error = %e, "dropped trace event");
        }
    }
}
