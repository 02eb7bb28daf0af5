use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::fastq::{self, FastqPair, LocalFastqPair};
use crate::fs_util;
use crate::storage::ObjectStoreClient;
use crate::toolbox::Toolbox;

use super::{Services, discover_matching_fastqs, discover_reference_files, output_already_exists, output_with_index};

/// STAR alignment of paired reads against a reference resource bundle,
/// sorted and indexed into a single bam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnaAlignJob {
    pub input: BucketPath,
    pub ref_genome_resource_dir: BucketPath,
    pub output: BucketPath,
}

impl RnaAlignJob {
    pub(crate) fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        tracing::info!("settings:");
        tracing::info!("    input       = {}", self.input);
        tracing::info!("    ref_genome  = {}", self.ref_genome_resource_dir);
        tracing::info!("    output      = {}", self.output);

        let client = services.cache.client();
        if output_already_exists(client, &self.output)? {
            return Ok(());
        }

        let fastq_paths = discover_matching_fastqs(client, &self.input)?;
        let fastq_pairs = fastq::pair_up(&fastq_paths)?;

        // The resource bundle path is already a directory, unlike the DNA
        // job's single-FASTA reference.
        let reference_files = discover_reference_files(client, &self.ref_genome_resource_dir)?;

        tracing::info!("starting download of input files");
        let mut inputs = fastq_paths;
        inputs.extend(reference_files);
        services.cache.download_all(&inputs)?;
        tracing::info!("finished download of input files");

        self.run_alignment(&fastq_pairs, services)?;

        tracing::info!("starting upload of output files");
        services.cache.upload_all(&output_with_index(&self.output))?;
        tracing::info!("finished upload of output files");

        Ok(())
    }

    fn run_alignment<C: ObjectStoreClient, T: Toolbox>(
        &self,
        fastq_pairs: &[FastqPair],
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        fs_util::create_or_cleanup_dir(&services.work_dir)?;

        let local_pairs: Vec<LocalFastqPair> = fastq_pairs
            .iter()
            .map(|pair| pair.to_local(&services.cache))
            .collect();
        let local_reference_dir = services.cache.local_path(&self.ref_genome_resource_dir);
        let local_final_bam = services.cache.local_path(&self.output);

        tracing::info!("start creating unsorted bam");
        let local_unsorted_bam =
            services
                .toolbox
                .align_rna(&local_pairs, &local_reference_dir, &services.work_dir)?;
        tracing::info!("finished creating unsorted bam {local_unsorted_bam}");

        tracing::info!("start sorting bam {local_unsorted_bam} to create {local_final_bam}");
        services.toolbox.sort_bam(&local_unsorted_bam, &local_final_bam)?;
        tracing::info!("finished sorting bam");

        tracing::info!("start indexing bam {local_final_bam}");
        services.toolbox.index_bam(&local_final_bam)?;
        tracing::info!("finished indexing bam");

        fs_util::create_or_cleanup_dir(&services.work_dir)
    }
}
