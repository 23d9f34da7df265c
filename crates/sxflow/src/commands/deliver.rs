use anyhow::{Result, bail};
use sxflow_deliver::{ArtifactLocation, BatchResult, SampleResult};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;

use crate::batch::BatchFile;
use crate::cli::DeliverArgs;
use crate::config::Config;

#[derive(Tabled)]
struct SampleRow {
    sample:    String,
    status:    &'static str,
    artifacts: usize,
    detail:    String,
}

impl SampleRow {
    fn new(name: &str, result: &SampleResult) -> Self {
        let (status, detail) = match result {
            SampleResult::Delivered { from_cache: true, .. } => ("cached", String::new()),
            SampleResult::Delivered { .. } => ("delivered", String::new()),
            SampleResult::Partial {
                transform_id,
                files_failed,
                ..
            } => ("partial", format!("{files_failed} input file(s) failed in {transform_id}")),
            SampleResult::Failed { error } => ("failed", error.to_string()),
        };
        Self {
            sample: name.to_string(),
            status,
            artifacts: result.artifacts().map_or(0, <[_]>::len),
            detail,
        }
    }
}

pub async fn run(config: &Config, endpoint: Option<&str>, args: DeliverArgs) -> Result<()> {
    let batch = BatchFile::load(&args.batch)?;

    let mut options = config.deliver_options();
    if let Some(mode) = args.mode.map(Into::into).or(batch.general.mode) {
        options.mode = mode;
    }
    options.fail_if_incomplete |= args.fail_if_incomplete;
    let concurrency = args.concurrency.unwrap_or(config.concurrency_limit);

    let deliverer = super::connect(config, endpoint, options)?;
    let samples = batch.into_samples(args.ignore_cache);
    if args.check_codegens {
        deliverer.validate_codegens(&samples).await?;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, canceling unfinished samples");
            on_interrupt.cancel();
        }
    });

    tracing::info!(samples = samples.len(), concurrency, "Delivering batch");
    let results = deliverer.deliver_with_cancel(samples, concurrency, cancel).await?;
    report(&results, args.list);

    let failed = results.failures().count();
    if failed > 0 {
        bail!("{failed} of {} sample(s) failed", results.len());
    }
    Ok(())
}

fn report(results: &BatchResult, list: bool) {
    let rows = results.iter().map(|(name, result)| SampleRow::new(name, result));
    println!("{}", Table::new(rows).with(Style::rounded()));

    if !list {
        return;
    }
    for (name, result) in results.iter() {
        let Ok(artifacts) = result.artifacts() else {
            continue;
        };
        for artifact in artifacts {
            match &artifact.location {
                ArtifactLocation::Local { path, size } => {
                    println!("{name}\t{}\t{size}", path.display())
                }
                ArtifactLocation::Url(url) => println!("{name}\t{url}"),
            }
        }
    }
}
