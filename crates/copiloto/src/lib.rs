//! Copiloto Replay Runner
//!
//! Feeds a recorded JSON-lines stream of frame observations and
//! motion-sensor samples through the session engine. Each frame record may
//! carry a precomputed embedding, which stands in for the embedding model.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use perception::{
    FaceEncoder, FaceLandmarks, FrameObservation, MotionSample, PerceptionError, VideoFrame,
};
use serde::{Deserialize, Serialize};
use session::{EngineConfig, FrameReport, LoggingConfig, SessionEngine, Transition};
use std::io::Write;
use std::time::{Duration, Instant};
use storage::Repository;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// One line of a replay stream
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayRecord {
    Frame {
        /// Milliseconds since the start of the recording
        timestamp_ms: u64,
        observation: FrameObservation,
        #[serde(default)]
        embedding: Option<Vec<f32>>,
    },
    Motion {
        timestamp_ms: u64,
        sample: MotionSample,
    },
}

impl ReplayRecord {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("invalid replay record")
    }
}

/// What a replayed record produced
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplayOutput {
    Frame(Box<FrameReport>),
    Motion { transition: Transition },
}

/// Encoder that hands back the embedding recorded with the current frame
#[derive(Debug, Default)]
pub struct ReplayEncoder {
    current: Option<Vec<f32>>,
}

impl ReplayEncoder {
    pub fn set_current(&mut self, embedding: Option<Vec<f32>>) {
        self.current = embedding;
    }
}

impl FaceEncoder for ReplayEncoder {
    fn encode(
        &mut self,
        _: &VideoFrame,
        _: &FaceLandmarks,
    ) -> Result<Vec<f32>, PerceptionError> {
        self.current.clone().ok_or_else(|| {
            PerceptionError::Inference("no embedding recorded for frame".to_string())
        })
    }
}

/// Session engine plus the recording's time base
pub struct Replayer {
    engine: SessionEngine<Repository, ReplayEncoder>,
    base: Instant,
    sequence: u32,
}

impl Replayer {
    pub fn new(config: EngineConfig, repository: Repository) -> Result<Self> {
        let mut engine = SessionEngine::new(config, repository, ReplayEncoder::default())?;
        let base = Instant::now();
        engine.set_clock_anchor(base, Utc::now());
        Ok(Self {
            engine,
            base,
            sequence: 0,
        })
    }

    pub fn engine(&self) -> &SessionEngine<Repository, ReplayEncoder> {
        &self.engine
    }

    pub fn apply(&mut self, record: ReplayRecord) -> Option<ReplayOutput> {
        match record {
            ReplayRecord::Frame {
                timestamp_ms,
                observation,
                embedding,
            } => {
                let now = self.base + Duration::from_millis(timestamp_ms);
                self.engine.encoder_mut().set_current(embedding);
                let frame = VideoFrame::empty(observation.size, self.sequence);
                self.sequence = self.sequence.wrapping_add(1);
                let report = self.engine.process_frame(&frame, &observation, now);
                debug!("Frame {} -> {}", timestamp_ms, report.state);
                Some(ReplayOutput::Frame(Box::new(report)))
            }
            ReplayRecord::Motion {
                timestamp_ms,
                sample,
            } => {
                let now = self.base + Duration::from_millis(timestamp_ms);
                self.engine
                    .handle_motion(&sample, now)
                    .map(|transition| ReplayOutput::Motion { transition })
            }
        }
    }

    /// Apply every line of `reader`, writing one JSON document per output
    /// line to `out`. Malformed lines are skipped; ctrl-c stops early.
    pub async fn run<R, W>(&mut self, reader: R, out: &mut W) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = reader.lines();
        let mut processed = 0u64;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match ReplayRecord::parse(&line) {
                        Ok(record) => {
                            if let Some(output) = self.apply(record) {
                                serde_json::to_writer(&mut *out, &output)?;
                                writeln!(out)?;
                            }
                            processed += 1;
                        }
                        Err(e) => warn!("Skipping line: {:#}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping replay");
                    break;
                }
            }
        }
        out.flush()?;
        Ok(processed)
    }

    pub fn into_repository(self) -> Repository {
        self.engine.into_store()
    }
}

/// Initialize logging on stderr; stdout carries the reports
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| anyhow!("unknown log level '{}'", config.level))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
