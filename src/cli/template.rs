//! Template mode: one job per JSON record, run concurrently.

use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::setup::{cancel_on_interrupt, Setup};
use crate::cli::{Args, TemplateArgs};
use crate::core::batch::{BatchDispatcher, PreparedJob, ResultOrder, SessionJobRunner};
use crate::core::constants::TEMPLATE_FALLBACK_SYSTEM_PROMPT;
use crate::core::error::{BatchError, ConfigError};
use crate::core::template::{parse_inline, prepare_jobs, JsonlRecords, Record, TemplateSource};

type Records = Box<dyn Iterator<Item = io::Result<Record>> + Send>;
type Jobs = Box<dyn Iterator<Item = Result<PreparedJob, BatchError>> + Send>;

fn template_source(args: &TemplateArgs) -> Result<TemplateSource, Box<dyn Error>> {
    match (&args.template.template_from_file, &args.template.template_from_field) {
        (Some(path), _) => {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            Ok(TemplateSource::Text(text))
        }
        (None, Some(field)) => Ok(TemplateSource::Field(field.clone())),
        (None, None) => Err("a template is required".into()),
    }
}

fn jsonl_records<R: BufRead + Send + 'static>(reader: R) -> Records {
    Box::new(JsonlRecords::new(reader))
}

fn records(args: &TemplateArgs) -> Result<Records, Box<dyn Error>> {
    match (&args.variables.variables, &args.variables.variables_from_file) {
        (Some(inline), _) => Ok(Box::new(parse_inline(inline)?.into_iter().map(Ok::<Record, io::Error>))),
        (None, Some(path)) if path == Path::new("-") => {
            Ok(jsonl_records(BufReader::new(io::stdin())))
        }
        (None, Some(path)) => {
            let file = File::open(path).map_err(BatchError::Source)?;
            Ok(jsonl_records(BufReader::new(file)))
        }
        (None, None) => Err("variables are required".into()),
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub async fn run_template(args: &Args, template: &TemplateArgs) -> Result<ExitCode, Box<dyn Error>> {
    let jobs: Jobs = Box::new(prepare_jobs(records(template)?, template_source(template)?));

    let setup = Setup::load(args).await?;
    let system = setup
        .system_prompt(args)?
        .unwrap_or_else(|| TEMPLATE_FALLBACK_SYSTEM_PROMPT.to_string());
    let seed = setup.conversation(args, Some(system))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let runner = Arc::new(SessionJobRunner::new(
        setup.session(cancel.clone()),
        setup.builder.clone(),
        seed,
    ));

    let concurrency = template.concurrency.unwrap_or_else(default_concurrency);
    let order = if template.ordered {
        ResultOrder::Input
    } else {
        ResultOrder::Arrival
    };
    let dispatcher = BatchDispatcher::new(concurrency)
        .with_order(order)
        .with_cancel(cancel);
    info!(concurrency, ?order, "starting batch");

    let mut sink: Box<dyn Write> = match &template.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(BatchError::Sink)?)),
        None => Box::new(io::stdout()),
    };

    let result = dispatcher.run(jobs, runner, sink.as_mut()).await;
    interrupt.abort();
    let summary = result?;
    sink.flush()?;

    info!(succeeded = summary.succeeded, failed = summary.failed, "batch finished");
    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("❌ All {} jobs failed", summary.total());
        Ok(ExitCode::FAILURE)
    }
}
