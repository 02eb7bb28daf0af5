use std::process::{Command, Stdio};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PipelineError;
use crate::fastq::LocalFastqPair;
use crate::fs_util;

/// External alignment and BAM tooling. Every call takes explicit local
/// input and output paths and either produces a valid output file or
/// fails; there is no partial-output recovery.
pub trait Toolbox {
    fn align_dna(
        &self,
        pair: &LocalFastqPair,
        reference: &Utf8Path,
        output_bam: &Utf8Path,
        read_group: &str,
    ) -> Result<(), PipelineError>;

    /// STAR alignment of all pairs at once, producing an unsorted BAM
    /// inside `work_dir`. Returns the path of that BAM.
    fn align_rna(
        &self,
        pairs: &[LocalFastqPair],
        reference_dir: &Utf8Path,
        work_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, PipelineError>;

    fn merge_bams(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<(), PipelineError>;

    fn sort_bam(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError>;

    fn index_bam(&self, bam: &Utf8Path) -> Result<(), PipelineError>;

    fn dedup_umi(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError>;

    fn mark_duplicates(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError>;

    fn flagstat(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError>;
}

const SAMBAMBA_MARKDUP_OVERFLOW_LIST_SIZE: u32 = 4_500_000;

/// Toolbox backed by locally installed binaries: bwa and sambamba in the
/// home directory, STAR on PATH, UMICollapse as a jar.
pub struct SystemToolbox {
    bwa: Utf8PathBuf,
    sambamba: Utf8PathBuf,
    star: Utf8PathBuf,
    java: Utf8PathBuf,
    umi_collapse_jar: Utf8PathBuf,
}

impl SystemToolbox {
    pub fn new() -> Result<Self, PipelineError> {
        let home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or_else(|| PipelineError::Filesystem("unable to resolve home directory".to_string()))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|_| PipelineError::Filesystem("non-utf8 home directory".to_string()))?;
        Ok(Self {
            bwa: home.join("bwa"),
            sambamba: home.join("sambamba"),
            star: Utf8PathBuf::from("STAR"),
            java: Utf8PathBuf::from("java"),
            umi_collapse_jar: home.join("UMICollapse").join("umicollapse.jar"),
        })
    }

    fn thread_count(&self) -> usize {
        thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    }

    fn run(&self, mut command: Command) -> Result<(), PipelineError> {
        tracing::info!("running command: {command:?}");
        let output = command
            .output()
            .map_err(|err| PipelineError::ToolFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command exited with status {}", output.status)
        } else {
            stderr
        };
        Err(PipelineError::ToolFailed(message))
    }
}

impl Toolbox for SystemToolbox {
    fn align_dna(
        &self,
        pair: &LocalFastqPair,
        reference: &Utf8Path,
        output_bam: &Utf8Path,
        read_group: &str,
    ) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output_bam)?;
        let threads = self.thread_count().to_string();

        // bwa mem | sambamba view -S | sambamba sort, wired stage to stage.
        // Stage stderr is inherited so alignment diagnostics stay visible.
        let mut bwa = Command::new(self.bwa.as_std_path())
            .args(["mem", "-Y", "-t", &threads, "-R", read_group])
            .arg(reference.as_str())
            .arg(pair.read1.as_str())
            .arg(pair.read2.as_str())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| PipelineError::ToolFailed(format!("bwa: {err}")))?;
        let bwa_stdout = bwa
            .stdout
            .take()
            .ok_or_else(|| PipelineError::ToolFailed("bwa produced no stdout pipe".to_string()))?;

        let mut view = Command::new(self.sambamba.as_std_path())
            .args(["view", "-f", "bam", "-S", "-l", "0", "/dev/stdin"])
            .stdin(Stdio::from(bwa_stdout))
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| PipelineError::ToolFailed(format!("sambamba view: {err}")))?;
        let view_stdout = view.stdout.take().ok_or_else(|| {
            PipelineError::ToolFailed("sambamba view produced no stdout pipe".to_string())
        })?;

        let sort = Command::new(self.sambamba.as_std_path())
            .args(["sort", "-o", output_bam.as_str(), "/dev/stdin"])
            .stdin(Stdio::from(view_stdout))
            .output()
            .map_err(|err| PipelineError::ToolFailed(format!("sambamba sort: {err}")))?;

        let bwa_status = bwa
            .wait()
            .map_err(|err| PipelineError::ToolFailed(err.to_string()))?;
        let view_status = view
            .wait()
            .map_err(|err| PipelineError::ToolFailed(err.to_string()))?;

        if !bwa_status.success() || !view_status.success() || !sort.status.success() {
            let stderr = String::from_utf8_lossy(&sort.stderr).trim().to_string();
            return Err(PipelineError::ToolFailed(format!(
                "alignment pipeline failed (bwa {bwa_status}, view {view_status}, sort {}): {stderr}",
                sort.status
            )));
        }
        Ok(())
    }

    fn align_rna(
        &self,
        pairs: &[LocalFastqPair],
        reference_dir: &Utf8Path,
        work_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let read1_list = pairs
            .iter()
            .map(|pair| pair.read1.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let read2_list = pairs
            .iter()
            .map(|pair| pair.read2.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let prefix = format!("{work_dir}/");

        let mut command = Command::new(self.star.as_std_path());
        command
            .args(["--runThreadN", &self.thread_count().to_string()])
            .args(["--genomeDir", reference_dir.as_str()])
            .args(["--readFilesIn", &read1_list, &read2_list])
            .args(["--readFilesCommand", "zcat"])
            .args(["--outSAMtype", "BAM", "Unsorted"])
            .args(["--outFileNamePrefix", &prefix]);
        self.run(command)?;

        let unsorted_bam = work_dir.join("Aligned.out.bam");
        if !unsorted_bam.as_std_path().exists() {
            return Err(PipelineError::ToolFailed(format!(
                "STAR did not produce {unsorted_bam}"
            )));
        }
        Ok(unsorted_bam)
    }

    fn merge_bams(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output)?;
        let mut command = Command::new(self.sambamba.as_std_path());
        command
            .args(["merge", "-t", &self.thread_count().to_string()])
            .arg(output.as_str());
        for input in inputs {
            command.arg(input.as_str());
        }
        self.run(command)
    }

    fn sort_bam(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output)?;
        let mut command = Command::new(self.sambamba.as_std_path());
        command
            .args(["sort", "-t", &self.thread_count().to_string()])
            .args(["-o", output.as_str()])
            .arg(input.as_str());
        self.run(command)
    }

    fn index_bam(&self, bam: &Utf8Path) -> Result<(), PipelineError> {
        let mut command = Command::new(self.sambamba.as_std_path());
        command
            .args(["index", "-t", &self.thread_count().to_string()])
            .arg(bam.as_str());
        self.run(command)
    }

    fn dedup_umi(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output)?;
        let mut command = Command::new(self.java.as_std_path());
        command
            .args(["-server", "-Xms8G", "-Xmx16G", "-Xss20M", "-jar"])
            .arg(self.umi_collapse_jar.as_str())
            .args(["bam", "-i", input.as_str(), "-o", output.as_str()])
            .args(["--umi-sep", ":", "--paired", "--two-pass"]);
        self.run(command)
    }

    fn mark_duplicates(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output)?;
        let mut command = Command::new(self.sambamba.as_std_path());
        command
            .args(["markdup", "-t", &self.thread_count().to_string()])
            .arg(format!(
                "--overflow-list-size={SAMBAMBA_MARKDUP_OVERFLOW_LIST_SIZE}"
            ))
            .arg(input.as_str())
            .arg(output.as_str());
        self.run(command)
    }

    fn flagstat(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::create_parent_dirs(output)?;
        let parent = output
            .parent()
            .ok_or_else(|| PipelineError::Filesystem(format!("no parent for {output}")))?;
        let temp = tempfile::Builder::new()
            .prefix("flagstat")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        let stdout_file = temp
            .reopen()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut command = Command::new(self.sambamba.as_std_path());
        command
            .args(["flagstat", "-t", &self.thread_count().to_string()])
            .arg(input.as_str())
            .stdout(Stdio::from(stdout_file));
        self.run(command)?;

        temp.persist(output.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
