//! Bounded extraction worker pool feeding a single-writer builder.
//!
//! Extraction calls run on a dedicated rayon pool. Completed results are sent
//! over a channel to the calling thread, which is the only thread that touches
//! the graph; the builder's reorder buffer then applies them in fragment order.

use std::sync::mpsc;

use crate::collaborator::{CollaboratorError, Extractor};
use crate::config::IngestConfig;
use crate::error::{IngestError, IngestWarning};
use crate::extraction::{Fragment, FragmentExtraction};

use super::GraphBuilder;

type Completion = (usize, Result<FragmentExtraction, CollaboratorError>);

/// Runs an [`Extractor`] over fragments with bounded concurrency and retries.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    workers: usize,
    max_retries: usize,
}

impl ExtractionPipeline {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_retries: config.max_retries,
        }
    }

    /// Extract every fragment and feed the results to `builder`.
    ///
    /// A fragment whose extraction still fails after all retries is skipped
    /// with an [`IngestWarning::ParseFailure`]. Only failing to start the pool
    /// is an error.
    pub fn run<E>(
        &self,
        fragments: &[Fragment],
        extractor: &E,
        builder: &mut GraphBuilder,
    ) -> Result<(), IngestError>
    where
        E: Extractor + ?Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("tgr-extract-{i}"))
            .build()
            .map_err(|e| IngestError::WorkerPool {
                message: e.to_string(),
            })?;

        tracing::info!(
            fragments = fragments.len(),
            workers = self.workers,
            "starting extraction"
        );

        let max_retries = self.max_retries;
        let (tx, rx) = mpsc::channel::<Completion>();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.scope(|s| {
                    for fragment in fragments {
                        let tx = tx.clone();
                        s.spawn(move |_| {
                            let outcome = extract_with_retries(extractor, fragment, max_retries);
                            // The receiver outlives every worker.
                            let _ = tx.send((fragment.index, outcome));
                        });
                    }
                });
                drop(tx);
            });

            for (index, outcome) in rx {
                match outcome {
                    Ok(extraction) => {
                        builder.ingest_extraction(index, extraction);
                    }
                    Err(err) => {
                        builder.skip(
                            index,
                            IngestWarning::ParseFailure {
                                fragment_index: index,
                                message: err.to_string(),
                            },
                        );
                    }
                }
            }
        });

        Ok(())
    }
}

fn extract_with_retries<E>(
    extractor: &E,
    fragment: &Fragment,
    max_retries: usize,
) -> Result<FragmentExtraction, CollaboratorError>
where
    E: Extractor + ?Sized,
{
    let mut attempt = 0;
    loop {
        match extractor.extract(fragment) {
            Ok(extraction) => return Ok(extraction),
            Err(err) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    fragment = fragment.index,
                    attempt,
                    %err,
                    "extraction failed, retrying"
                );
            }
            Err(err) => {
                tracing::warn!(fragment = fragment.index, %err, "extraction failed, giving up");
                return Err(err);
            }
        }
    }
}
