//! Bounded fan-out of template jobs.
//!
//! A blocking feeder pulls records from the (possibly unbounded) source into
//! a job channel sized to the worker count, so reading never runs ahead of
//! the pool. `C` workers share that channel, each running one session at a
//! time. A single consumer drains the result channel and writes whole JSONL
//! records, so records from different jobs never interleave.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::conversation::ConversationState;
use crate::core::error::{BatchError, MalformedInputError, SessionError};
use crate::core::payload::PayloadBuilder;
use crate::core::session::{NullSink, StreamingSession};

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateJob {
    /// Position of the source record; the job's identity.
    pub ordinal: usize,
    pub prompt: String,
    pub variables: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreparedJob {
    Ready(TemplateJob),
    /// The record could not be rendered; it fails without a request.
    Malformed {
        ordinal: usize,
        variables: Value,
        error: MalformedInputError,
    },
}

impl PreparedJob {
    pub fn ordinal(&self) -> usize {
        match self {
            PreparedJob::Ready(job) => job.ordinal,
            PreparedJob::Malformed { ordinal, .. } => *ordinal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(String),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub ordinal: usize,
    pub prompt: Option<String>,
    pub variables: Value,
    pub outcome: JobOutcome,
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    prompt: Option<&'a str>,
    variables: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success(_))
    }

    /// One self-contained JSON object, newline terminated.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let (response, error) = match &self.outcome {
            JobOutcome::Success(text) => (Some(text.as_str()), None),
            JobOutcome::Failure(detail) => (None, Some(detail.as_str())),
        };
        let record = ResultRecord {
            prompt: self.prompt.as_deref(),
            variables: &self.variables,
            response,
            error,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultOrder {
    /// Results are written as jobs complete.
    #[default]
    Arrival,
    /// Completions are held back until every earlier ordinal is written.
    Input,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// A run that attempted jobs but completed none is a failed run.
    pub fn is_success(&self) -> bool {
        self.total() == 0 || self.succeeded > 0
    }

    fn record(&mut self, result: &JobResult) {
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Executes one rendered job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &TemplateJob) -> Result<String, SessionError>;
}

/// Runs each job as a fresh single-turn conversation.
pub struct SessionJobRunner {
    session: StreamingSession,
    builder: PayloadBuilder,
    seed: ConversationState,
}

impl SessionJobRunner {
    /// `seed` holds the system prompt and rewrites shared by every job.
    pub fn new(session: StreamingSession, builder: PayloadBuilder, seed: ConversationState) -> Self {
        Self {
            session,
            builder,
            seed,
        }
    }
}

#[async_trait]
impl JobRunner for SessionJobRunner {
    async fn run(&self, job: &TemplateJob) -> Result<String, SessionError> {
        let mut conversation = self.seed.clone();
        conversation.append_user(&job.prompt);
        let request = self.builder.build(&conversation);
        let output = self.session.run(&request, &mut NullSink).await?;
        Ok(output.text)
    }
}

async fn execute(job: PreparedJob, runner: &dyn JobRunner) -> JobResult {
    match job {
        PreparedJob::Ready(job) => {
            debug!(ordinal = job.ordinal, "job started");
            let outcome = match runner.run(&job).await {
                Ok(text) => JobOutcome::Success(text),
                Err(e) => {
                    warn!(ordinal = job.ordinal, error = %e, "job failed");
                    JobOutcome::Failure(e.to_string())
                }
            };
            JobResult {
                ordinal: job.ordinal,
                prompt: Some(job.prompt),
                variables: job.variables,
                outcome,
            }
        }
        PreparedJob::Malformed {
            ordinal,
            variables,
            error,
        } => {
            warn!(ordinal, error = %error, "skipping malformed record");
            JobResult {
                ordinal,
                prompt: None,
                variables,
                outcome: JobOutcome::Failure(error.to_string()),
            }
        }
    }
}

fn write_result(sink: &mut dyn Write, result: &JobResult) -> Result<(), BatchError> {
    let line = result
        .to_json_line()
        .map_err(|e| BatchError::Sink(io::Error::other(e)))?;
    sink.write_all(line.as_bytes()).map_err(BatchError::Sink)?;
    sink.flush().map_err(BatchError::Sink)
}

pub struct BatchDispatcher {
    concurrency: usize,
    order: ResultOrder,
    cancel: CancellationToken,
}

impl BatchDispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            order: ResultOrder::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_order(mut self, order: ResultOrder) -> Self {
        self.order = order;
        self
    }

    /// Cancelling stops new jobs from starting; in-flight sessions sharing
    /// the token end as failures.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs every job and writes one record per job to `sink`. Per-job
    /// failures become failure records; only an unreadable source or a
    /// failing sink ends the run with an error.
    pub async fn run<I>(
        &self,
        jobs: I,
        runner: Arc<dyn JobRunner>,
        sink: &mut dyn Write,
    ) -> Result<BatchSummary, BatchError>
    where
        I: Iterator<Item = Result<PreparedJob, BatchError>> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<PreparedJob>(self.concurrency);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(self.concurrency);

        let feeder_cancel = self.cancel.clone();
        let feeder = tokio::task::spawn_blocking(move || -> Result<(), BatchError> {
            for job in jobs {
                if feeder_cancel.is_cancelled() {
                    break;
                }
                if job_tx.blocking_send(job?).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for worker in 0..self.concurrency {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let runner = Arc::clone(&runner);
            let cancel = self.cancel.clone();
            workers.spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        job = async { job_rx.lock().await.recv().await } => job,
                    };
                    let Some(job) = next else {
                        break;
                    };
                    let result = execute(job, runner.as_ref()).await;
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
                debug!(worker, "worker idle");
            });
        }
        drop(job_rx);
        drop(result_tx);

        let mut summary = BatchSummary::default();
        let mut held = BTreeMap::new();
        let mut next_ordinal = 0;
        while let Some(result) = result_rx.recv().await {
            summary.record(&result);
            match self.order {
                ResultOrder::Arrival => write_result(sink, &result)?,
                ResultOrder::Input => {
                    held.insert(result.ordinal, result);
                    while let Some(ready) = held.remove(&next_ordinal) {
                        write_result(sink, &ready)?;
                        next_ordinal += 1;
                    }
                }
            }
        }
        // Only reachable with gaps after cancellation.
        for result in held.into_values() {
            write_result(sink, &result)?;
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "batch worker panicked");
            }
        }

        // A cancelled run does not wait on a source that may never yield
        // again; the feeder stops on its own once the next record arrives.
        if self.cancel.is_cancelled() {
            debug!("batch cancelled, leaving the job source behind");
            drop(feeder);
        } else {
            match feeder.await {
                Ok(outcome) => outcome?,
                Err(e) => return Err(BatchError::Source(io::Error::other(e))),
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch complete"
        );
        Ok(summary)
    }
}
