use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::storage::ObjectStoreClient;
use crate::toolbox::Toolbox;

use super::{Services, output_already_exists, output_with_index};

/// UMI-aware deduplication (UMICollapse) of a bam and its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmiDedupJob {
    pub input: BucketPath,
    pub output: BucketPath,
}

impl UmiDedupJob {
    pub(crate) fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        run_dedup(&self.input, &self.output, services, |services, input, output| {
            tracing::info!("starting UMI deduplication");
            services.toolbox.dedup_umi(input, output)?;
            tracing::info!("finished UMI deduplication");
            Ok(())
        })
    }
}

/// Positional duplicate marking (sambamba markdup) of a bam and its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkDedupJob {
    pub input: BucketPath,
    pub output: BucketPath,
}

impl MarkDedupJob {
    pub(crate) fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        run_dedup(&self.input, &self.output, services, |services, input, output| {
            tracing::info!("starting duplicate marking");
            services.toolbox.mark_duplicates(input, output)?;
            tracing::info!("finished duplicate marking");
            Ok(())
        })
    }
}

fn run_dedup<C, T, F>(
    input: &BucketPath,
    output: &BucketPath,
    services: &Services<C, T>,
    deduplicate: F,
) -> Result<(), PipelineError>
where
    C: ObjectStoreClient,
    T: Toolbox,
    F: Fn(
        &Services<C, T>,
        &camino::Utf8Path,
        &camino::Utf8Path,
    ) -> Result<(), PipelineError>,
{
    tracing::info!("settings:");
    tracing::info!("    input  = {input}");
    tracing::info!("    output = {output}");

    if output_already_exists(services.cache.client(), output)? {
        return Ok(());
    }

    tracing::info!("starting download of input files");
    services
        .cache
        .download_all(&[input.clone(), input.with_suffix(".bai")])?;
    tracing::info!("finished download of input files");

    let local_input = services.cache.local_path(input);
    let local_output = services.cache.local_path(output);

    deduplicate(services, &local_input, &local_output)?;

    tracing::info!("starting creation of bam index");
    services.toolbox.index_bam(&local_output)?;
    tracing::info!("finished creation of bam index");

    tracing::info!("starting upload of output files");
    services.cache.upload_all(&output_with_index(output))?;
    tracing::info!("finished upload of output files");

    Ok(())
}
