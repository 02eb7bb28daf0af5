use std::sync::LazyLock;

use clap::Parser;
use regex::Regex;

use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::jobs::{
    DnaAlignJob, FlagstatJob, Job, JobKind, MarkDedupJob, RnaAlignJob, UmiDedupJob,
};

pub const REF_GENOME_37_ARGUMENT: &str = "37";
pub const REF_GENOME_38_ARGUMENT: &str = "38";

const REF_GENOME_37_BUCKET_FASTA_PATH: &str =
    "gs://common-resources/reference_genome/37/Homo_sapiens.GRCh37.GATK.illumina.fasta";
const REF_GENOME_38_BUCKET_FASTA_PATH: &str =
    "gs://common-resources/reference_genome/38/GCA_000001405.15_GRCh38_no_alt_analysis_set.fna";

static BUCKET_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gs://[a-zA-Z0-9/._-]+$").expect("valid regex"));
static BAM_BUCKET_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gs://[a-zA-Z0-9/._-]+\.bam$").expect("valid regex"));
static WILDCARD_FASTQ_BUCKET_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gs://[a-zA-Z0-9*/._-]+\.fastq\.gz$").expect("valid regex"));
static FLAGSTAT_BUCKET_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gs://[a-zA-Z0-9/._-]+\.flagstat$").expect("valid regex"));

/// Splits a command line into job blocks and parses each block. The
/// grammar is a sequence of `<job-kind> [flags…]` groups: every token that
/// names a job kind starts a new block, and the tokens up to the next job
/// kind belong to the current one.
pub fn extract_jobs(arguments: &[String]) -> Result<Vec<Job>, PipelineError> {
    let mut jobs = Vec::new();
    let mut remaining = arguments;

    while let Some((kind_token, rest)) = remaining.split_first() {
        let kind = JobKind::from_name(kind_token)
            .ok_or_else(|| PipelineError::UnknownJob(kind_token.clone()))?;
        tracing::info!("detected job of type: {}", kind.name());

        let block_len = rest
            .iter()
            .position(|token| JobKind::from_name(token).is_some())
            .unwrap_or(rest.len());
        let (job_args, tail) = rest.split_at(block_len);

        jobs.push(parse_job(kind, job_args)?);
        remaining = tail;
    }

    Ok(jobs)
}

fn parse_job(kind: JobKind, job_args: &[String]) -> Result<Job, PipelineError> {
    match kind {
        JobKind::DnaAlign => {
            let args = try_parse::<DnaAlignArgs>(job_args)?;
            Ok(Job::DnaAlign(DnaAlignJob {
                input: args.input,
                ref_genome: args.ref_genome,
                output: args.output,
            }))
        }
        JobKind::RnaAlign => {
            let args = try_parse::<RnaAlignArgs>(job_args)?;
            Ok(Job::RnaAlign(RnaAlignJob {
                input: args.input,
                ref_genome_resource_dir: args.ref_genome,
                output: args.output,
            }))
        }
        JobKind::UmiDedup => {
            let args = try_parse::<BamToBamArgs>(job_args)?;
            Ok(Job::UmiDedup(UmiDedupJob {
                input: args.input,
                output: args.output,
            }))
        }
        JobKind::MarkDedup => {
            let args = try_parse::<BamToBamArgs>(job_args)?;
            Ok(Job::MarkDedup(MarkDedupJob {
                input: args.input,
                output: args.output,
            }))
        }
        JobKind::Flagstat => {
            let args = try_parse::<FlagstatArgs>(job_args)?;
            Ok(Job::Flagstat(FlagstatJob {
                input: args.input,
                output: args.output,
            }))
        }
    }
}

fn try_parse<P: Parser>(job_args: &[String]) -> Result<P, PipelineError> {
    P::try_parse_from(job_args).map_err(|err| PipelineError::InvalidJobArguments(err.to_string()))
}

#[derive(Parser, Debug)]
#[command(name = "dna_align", no_binary_name = true)]
#[command(about = "Run bwa mem alignment of paired reads against the bucket")]
struct DnaAlignArgs {
    /// Wildcard path to the FASTQ files to align, e.g.
    /// 'gs://some-kind/of/path*.fastq.gz'. Read 1 file paths must contain
    /// '_R1_' exactly once and '_R2_' zero times, and vice versa for read 2.
    #[arg(long, short = 'i', value_parser = parse_wildcard_fastq_path)]
    input: BucketPath,

    /// Reference genome to align to: '37', '38', or a bucket path to a
    /// FASTA file.
    #[arg(long, short = 'r', value_parser = parse_reference_genome)]
    ref_genome: BucketPath,

    /// Bucket path the bam will be written to; an index file with an
    /// additional '.bai' suffix is written next to it.
    #[arg(long, short = 'o', value_parser = parse_bam_path)]
    output: BucketPath,
}

#[derive(Parser, Debug)]
#[command(name = "rna_align", no_binary_name = true)]
#[command(about = "Run STAR alignment of paired reads against the bucket")]
struct RnaAlignArgs {
    /// Wildcard path to the FASTQ files to align.
    #[arg(long, short = 'i', value_parser = parse_wildcard_fastq_path)]
    input: BucketPath,

    /// Bucket directory holding the STAR reference genome resource bundle.
    #[arg(long, short = 'r', value_parser = parse_bucket_path)]
    ref_genome: BucketPath,

    /// Bucket path the bam will be written to (plus a '.bai' index).
    #[arg(long, short = 'o', value_parser = parse_bam_path)]
    output: BucketPath,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
#[command(about = "Deduplicate a bam from the bucket")]
struct BamToBamArgs {
    /// Bucket path of the input bam; its '.bai' index must sit next to it.
    #[arg(long, short = 'i', value_parser = parse_bam_path)]
    input: BucketPath,

    /// Bucket path the deduplicated bam will be written to (plus '.bai').
    #[arg(long, short = 'o', value_parser = parse_bam_path)]
    output: BucketPath,
}

#[derive(Parser, Debug)]
#[command(name = "flagstat", no_binary_name = true)]
#[command(about = "Run sambamba flagstat on a bam from the bucket")]
struct FlagstatArgs {
    /// Bucket path of the input bam; its '.bai' index must sit next to it.
    #[arg(long, short = 'i', value_parser = parse_bam_path)]
    input: BucketPath,

    /// Bucket path the flagstat report will be written to, e.g.
    /// 'gs://some/path.flagstat'.
    #[arg(long, short = 'o', value_parser = parse_flagstat_path)]
    output: BucketPath,
}

fn parse_with_regex(value: &str, pattern: &Regex) -> Result<BucketPath, String> {
    if !pattern.is_match(value) {
        return Err(format!(
            "value '{value}' does not match the pattern '{}'",
            pattern.as_str()
        ));
    }
    value.parse::<BucketPath>().map_err(|err| err.to_string())
}

fn parse_bucket_path(value: &str) -> Result<BucketPath, String> {
    parse_with_regex(value, &BUCKET_PATH_REGEX)
}

fn parse_bam_path(value: &str) -> Result<BucketPath, String> {
    parse_with_regex(value, &BAM_BUCKET_PATH_REGEX)
}

fn parse_wildcard_fastq_path(value: &str) -> Result<BucketPath, String> {
    parse_with_regex(value, &WILDCARD_FASTQ_BUCKET_PATH_REGEX)
}

fn parse_flagstat_path(value: &str) -> Result<BucketPath, String> {
    parse_with_regex(value, &FLAGSTAT_BUCKET_PATH_REGEX)
}

fn parse_reference_genome(value: &str) -> Result<BucketPath, String> {
    let fasta_path = match value {
        REF_GENOME_37_ARGUMENT => REF_GENOME_37_BUCKET_FASTA_PATH,
        REF_GENOME_38_ARGUMENT => REF_GENOME_38_BUCKET_FASTA_PATH,
        other => {
            if !BUCKET_PATH_REGEX.is_match(other) {
                return Err(format!(
                    "value '{other}' does not match '{REF_GENOME_37_ARGUMENT}', \
                     '{REF_GENOME_38_ARGUMENT}' or the pattern '{}'",
                    BUCKET_PATH_REGEX.as_str()
                ));
            }
            other
        }
    };
    fasta_path.parse::<BucketPath>().map_err(|err| err.to_string())
}
