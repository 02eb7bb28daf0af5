mod dedup;
mod dna_align;
mod flagstat;
mod rna_align;

use camino::Utf8PathBuf;

pub use dedup::{MarkDedupJob, UmiDedupJob};
pub use dna_align::DnaAlignJob;
pub use flagstat::FlagstatJob;
pub use rna_align::RnaAlignJob;

use crate::bucket::BucketPath;
use crate::cache::FileCache;
use crate::error::PipelineError;
use crate::storage::ObjectStoreClient;
use crate::toolbox::Toolbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    DnaAlign,
    RnaAlign,
    UmiDedup,
    MarkDedup,
    Flagstat,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::DnaAlign,
        JobKind::RnaAlign,
        JobKind::UmiDedup,
        JobKind::MarkDedup,
        JobKind::Flagstat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::DnaAlign => "dna_align",
            JobKind::RnaAlign => "rna_align",
            JobKind::UmiDedup => "umi_dedup",
            JobKind::MarkDedup => "mark_dedup",
            JobKind::Flagstat => "flagstat",
        }
    }

    pub fn from_name(name: &str) -> Option<JobKind> {
        JobKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Collaborators a job needs to run, built once at process start and
/// passed in explicitly. The working directory is exclusive to the job
/// currently executing; the cache root behind `cache` is shared.
pub struct Services<C, T> {
    pub cache: FileCache<C>,
    pub toolbox: T,
    pub work_dir: Utf8PathBuf,
}

/// One batch job. Each variant carries only the value fields its pipeline
/// needs; parsing happens upstream, and a job executes exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    DnaAlign(DnaAlignJob),
    RnaAlign(RnaAlignJob),
    UmiDedup(UmiDedupJob),
    MarkDedup(MarkDedupJob),
    Flagstat(FlagstatJob),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::DnaAlign(_) => JobKind::DnaAlign,
            Job::RnaAlign(_) => JobKind::RnaAlign,
            Job::UmiDedup(_) => JobKind::UmiDedup,
            Job::MarkDedup(_) => JobKind::MarkDedup,
            Job::Flagstat(_) => JobKind::Flagstat,
        }
    }

    /// Runs the job's pipeline to completion. The first failed state
    /// aborts the job; nothing is retried.
    pub fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        tracing::info!("starting {} job", self.kind().name());
        let result = match self {
            Job::DnaAlign(job) => job.execute(services),
            Job::RnaAlign(job) => job.execute(services),
            Job::UmiDedup(job) => job.execute(services),
            Job::MarkDedup(job) => job.execute(services),
            Job::Flagstat(job) => job.execute(services),
        };
        if result.is_ok() {
            tracing::info!("finished {} job", self.kind().name());
        }
        result
    }
}

/// Output skipping: a job whose output object already exists remotely is
/// complete by definition and must not touch any input.
fn output_already_exists<C: ObjectStoreClient>(
    client: &C,
    output: &BucketPath,
) -> Result<bool, PipelineError> {
    if client.exists(output)? {
        tracing::info!("skipping job, output file already exists in bucket: {output}");
        Ok(true)
    } else {
        Ok(false)
    }
}

fn discover_matching_fastqs<C: ObjectStoreClient>(
    client: &C,
    input_pattern: &BucketPath,
) -> Result<Vec<BucketPath>, PipelineError> {
    let fastq_paths = client.match_glob(input_pattern)?;
    if fastq_paths.is_empty() {
        return Err(PipelineError::NoInputsFound(input_pattern.to_string()));
    }
    let listing = fastq_paths
        .iter()
        .map(|path| path.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    tracing::info!("found FASTQ paths matching input path {input_pattern}:\n{listing}");
    Ok(fastq_paths)
}

fn discover_reference_files<C: ObjectStoreClient>(
    client: &C,
    reference_dir: &BucketPath,
) -> Result<Vec<BucketPath>, PipelineError> {
    tracing::info!("searching for reference genome files to download: {reference_dir}");
    let reference_files = client.list_children(reference_dir)?;
    if reference_files.is_empty() {
        return Err(PipelineError::NoInputsFound(reference_dir.to_string()));
    }
    let listing = reference_files
        .iter()
        .map(|path| path.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    tracing::info!("identified reference genome files to download:\n{listing}");
    Ok(reference_files)
}

/// The declared output object together with its `.bai` companion.
fn output_with_index(output: &BucketPath) -> Vec<BucketPath> {
    vec![output.clone(), output.with_suffix(".bai")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(JobKind::from_name("not_a_job"), None);
    }

    #[test]
    fn index_companion_derivation() {
        let output: BucketPath = "gs://out/sample.bam".parse().unwrap();
        let uploads = output_with_index(&output);
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].to_string(), "gs://out/sample.bam.bai");
    }
}
