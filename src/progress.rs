//! Analysis and ingestion progress reporting.
//!
//! Reports observable progress while a submission moves through the run
//! stages and while `simcheck ingest-dir` loads a corpus directory.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use simcheck_core::RunStage;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum RunProgressEvent {
    /// An analysis run entered a new stage.
    Stage { document_id: String, stage: RunStage },
    /// `done` of `total` candidate alignments have finished.
    Aligned {
        document_id: String,
        done: u64,
        total: u64,
    },
    /// Directory ingestion: `n` of `total` files processed.
    Ingesting { n: u64, total: u64 },
}

/// Receives progress events from the engine and the directory loader.
pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "analyze essay-7  aligning  3 / 12 sources".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Stage { document_id, stage } => {
                format!("analyze {}  {}\n", document_id, stage)
            }
            RunProgressEvent::Aligned {
                document_id,
                done,
                total,
            } => format!(
                "analyze {}  aligning  {} / {} sources\n",
                document_id,
                format_number(*done),
                format_number(*total)
            ),
            RunProgressEvent::Ingesting { n, total } => format!(
                "ingest  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Stage { document_id, stage } => serde_json::json!({
                "event": "progress",
                "document_id": document_id,
                "stage": stage,
                "status": stage.ui_status(),
            }),
            RunProgressEvent::Aligned {
                document_id,
                done,
                total,
            } => serde_json::json!({
                "event": "progress",
                "document_id": document_id,
                "stage": RunStage::Aligning,
                "n": done,
                "total": total
            }),
            RunProgressEvent::Ingesting { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
