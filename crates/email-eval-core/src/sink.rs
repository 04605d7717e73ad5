//! Evaluation tracing sinks.
//!
//! Each case records its inputs (`module`, `test`, `case`) and outputs
//! (`extracted_tool_calls`, `missing_calls`, `extra_calls`, `response`).
//! Recording is best-effort: callers log a failed write and carry on.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink rejected record: {0}")]
    Rejected(String),
}

/// Destination for per-case evaluation records.
pub trait EvalSink: Send + Sync {
    fn log_inputs(&self, case: &str, inputs: &Value) -> Result<(), SinkError>;

    fn log_outputs(&self, case: &str, outputs: &Value) -> Result<(), SinkError>;
}

/// Emits records as `debug` tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EvalSink for TracingSink {
    fn log_inputs(&self, case: &str, inputs: &Value) -> Result<(), SinkError> {
        tracing::debug!(event = "eval.inputs", case = %case, inputs = %inputs);
        Ok(())
    }

    fn log_outputs(&self, case: &str, outputs: &Value) -> Result<(), SinkError> {
        tracing::debug!(event = "eval.outputs", case = %case, outputs = %outputs);
        Ok(())
    }
}

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, kind: &str, case: &str, payload: &Value) -> Result<(), SinkError> {
        let record = json!({
            "ts": Utc::now().to_rfc3339(),
            "kind": kind,
            "case": case,
            "payload": payload,
        });
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| SinkError::Rejected("sink file lock poisoned".to_string()))?;
        file.write_all(&line)?;
        Ok(())
    }
}

impl EvalSink for JsonlSink {
    fn log_inputs(&self, case: &str, inputs: &Value) -> Result<(), SinkError> {
        self.append("inputs", case, inputs)
    }

    fn log_outputs(&self, case: &str, outputs: &Value) -> Result<(), SinkError> {
        self.append("outputs", case, outputs)
    }
}

/// Fans records out to several sinks. Every sink is attempted; the first
/// error is returned.
#[derive(Default, Clone)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EvalSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn EvalSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EvalSink>) {
        self.sinks.push(sink);
    }

    fn each(
        &self,
        mut f: impl FnMut(&dyn EvalSink) -> Result<(), SinkError>,
    ) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = f(sink.as_ref()) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl EvalSink for MultiSink {
    fn log_inputs(&self, case: &str, inputs: &Value) -> Result<(), SinkError> {
        self.each(|sink| sink.log_inputs(case, inputs))
    }

    fn log_outputs(&self, case: &str, outputs: &Value) -> Result<(), SinkError> {
        self.each(|sink| sink.log_outputs(case, outputs))
    }
}
