use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::storage::ObjectStoreClient;
use crate::toolbox::Toolbox;

use super::{Services, output_already_exists};

/// sambamba flagstat over a bam, producing a text report. The report has
/// no index companion, so only the report itself is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagstatJob {
    pub input: BucketPath,
    pub output: BucketPath,
}

impl FlagstatJob {
    pub(crate) fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        tracing::info!("settings:");
        tracing::info!("    input  = {}", self.input);
        tracing::info!("    output = {}", self.output);

        if output_already_exists(services.cache.client(), &self.output)? {
            return Ok(());
        }

        tracing::info!("starting download of input files");
        services
            .cache
            .download_all(&[self.input.clone(), self.input.with_suffix(".bai")])?;
        tracing::info!("finished download of input files");

        let local_input = services.cache.local_path(&self.input);
        let local_output = services.cache.local_path(&self.output);

        tracing::info!("starting flagstat");
        services.toolbox.flagstat(&local_input, &local_output)?;
        tracing::info!("finished flagstat");

        tracing::info!("starting upload of output files");
        services.cache.upload_all(&[self.output.clone()])?;
        tracing::info!("finished upload of output files");

        Ok(())
    }
}
