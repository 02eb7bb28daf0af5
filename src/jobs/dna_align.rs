use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::fastq::{self, FastqPair, LocalFastqPair};
use crate::fs_util;
use crate::storage::ObjectStoreClient;
use crate::toolbox::Toolbox;

use super::{Services, discover_matching_fastqs, discover_reference_files, output_already_exists, output_with_index};

static RECORD_GROUP_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*_){2}S[0-9]+_L[0-9]{3}_R[1-2].*").expect("valid regex"));

/// bwa mem alignment of paired reads, one lane bam per read pair, merged
/// into a single indexed bam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaAlignJob {
    pub input: BucketPath,
    pub ref_genome: BucketPath,
    pub output: BucketPath,
}

impl DnaAlignJob {
    pub(crate) fn execute<C: ObjectStoreClient, T: Toolbox>(
        &self,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        tracing::info!("settings:");
        tracing::info!("    input       = {}", self.input);
        tracing::info!("    ref_genome  = {}", self.ref_genome);
        tracing::info!("    output      = {}", self.output);

        let client = services.cache.client();
        if output_already_exists(client, &self.output)? {
            return Ok(());
        }

        let fastq_paths = discover_matching_fastqs(client, &self.input)?;
        let fastq_pairs = fastq::pair_up(&fastq_paths)?;
        log_pairs(&fastq_pairs);

        let reference_files = discover_reference_files(client, &self.ref_genome.parent())?;

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

        let mut lane_bams: Vec<Utf8PathBuf> = Vec::new();
        for pair in fastq_pairs {
            let lane_bam = services.work_dir.join(format!("{}.bam", pair.pair_name));
            self.align_lane(pair, &lane_bam, services)?;
            lane_bams.push(lane_bam);
        }

        self.merge_and_index(&lane_bams, services)?;

        fs_util::create_or_cleanup_dir(&services.work_dir)
    }

    fn align_lane<C: ObjectStoreClient, T: Toolbox>(
        &self,
        pair: &FastqPair,
        lane_bam: &Utf8Path,
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        tracing::info!("start creating lane bam {lane_bam}");

        let local_pair = pair.to_local(&services.cache);
        let local_reference = services.cache.local_path(&self.ref_genome);
        let local_final_bam = services.cache.local_path(&self.output);
        let read_group = read_group_string(&local_pair, &local_final_bam)?;

        services
            .toolbox
            .align_dna(&local_pair, &local_reference, lane_bam, &read_group)?;
        tracing::info!("finished creating lane bam {lane_bam}");
        Ok(())
    }

    fn merge_and_index<C: ObjectStoreClient, T: Toolbox>(
        &self,
        lane_bams: &[Utf8PathBuf],
        services: &Services<C, T>,
    ) -> Result<(), PipelineError> {
        let local_final_bam = services.cache.local_path(&self.output);

        if let [single_lane] = lane_bams {
            tracing::info!("only one lane bam, so lane bam is merged bam");
            fs_util::move_file(single_lane, &local_final_bam)?;
        } else {
            tracing::info!("start merging lane bams");
            services.toolbox.merge_bams(lane_bams, &local_final_bam)?;
            tracing::info!("finished merging lane bams");
        }

        tracing::info!("start creating index for merged bam");
        services.toolbox.index_bam(&local_final_bam)?;
        tracing::info!("finished creating index for merged bam");
        Ok(())
    }
}

/// Derives the bwa `-R` read-group string from the staged-in read 1
/// filename. A filename that does not follow the
/// `<sample>_<flowcell>_S<n>_L<nnn>_R<1-2>` convention fails the job
/// instead of producing a guessed read group.
fn read_group_string(
    local_pair: &LocalFastqPair,
    local_final_bam: &Utf8Path,
) -> Result<String, PipelineError> {
    let read1_name = local_pair.read1.file_name().unwrap_or_default();
    let record_group_id = read1_name.split('.').next().unwrap_or(read1_name);
    if !RECORD_GROUP_ID_REGEX.is_match(record_group_id) {
        return Err(PipelineError::InvalidRecordGroup {
            id: record_group_id.to_string(),
            pattern: RECORD_GROUP_ID_REGEX.as_str().to_string(),
        });
    }

    let bam_name = local_final_bam.file_name().unwrap_or_default();
    let sample_name = bam_name.split('.').next().unwrap_or(bam_name);
    let flowcell_id = record_group_id.split('_').nth(1).unwrap_or_default();

    Ok(format!(
        "@RG\\tID:{record_group_id}\\tLB:{sample_name}\\tPL:ILLUMINA\\tPU:{flowcell_id}\\tSM:{sample_name}"
    ))
}

fn log_pairs(fastq_pairs: &[FastqPair]) {
    let listing = fastq_pairs
        .iter()
        .map(|pair| format!("Read1: {}\nRead2: {}", pair.read1, pair.read2))
        .collect::<Vec<_>>()
        .join("\n\n");
    tracing::info!("the FASTQ paths have been paired up:\n{listing}");
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn local_pair(read1: &str) -> LocalFastqPair {
        LocalFastqPair {
            pair_name: "pair".to_string(),
            read1: Utf8PathBuf::from(format!("/cache/in/{read1}")),
            read2: Utf8PathBuf::from("/cache/in/ignored_R2_.fastq.gz"),
        }
    }

    #[test]
    fn read_group_from_conventional_filename() {
        let pair = local_pair("sampleA_FC123_S1_L001_R1_001.fastq.gz");
        let bam = Utf8PathBuf::from("/cache/out/tumor.bam");
        let read_group = read_group_string(&pair, &bam).unwrap();
        assert_eq!(
            read_group,
            "@RG\\tID:sampleA_FC123_S1_L001_R1_001\\tLB:tumor\\tPL:ILLUMINA\\tPU:FC123\\tSM:tumor"
        );
    }

    #[test]
    fn unconventional_filename_fails_instead_of_guessing() {
        let pair = local_pair("reads_R1_.fastq.gz");
        let bam = Utf8PathBuf::from("/cache/out/tumor.bam");
        let err = read_group_string(&pair, &bam).unwrap_err();
        assert_matches!(err, PipelineError::InvalidRecordGroup { .. });
    }
}
