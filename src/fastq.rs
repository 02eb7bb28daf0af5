use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::bucket::BucketPath;
use crate::cache::FileCache;
use crate::error::PipelineError;
use crate::storage::ObjectStoreClient;

pub const READ1_MARKER: &str = "_R1_";
pub const READ2_MARKER: &str = "_R2_";
pub const PAIR_MARKER: &str = "_R?_";

/// One paired-end read pair in the bucket. `pair_name` is the shared
/// filename with the read marker normalized to `_R?_` and the extension
/// stripped, and acts as the join key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FastqPair {
    pub pair_name: String,
    pub read1: BucketPath,
    pub read2: BucketPath,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalFastqPair {
    pub pair_name: String,
    pub read1: Utf8PathBuf,
    pub read2: Utf8PathBuf,
}

impl FastqPair {
    pub fn to_local<C: ObjectStoreClient>(&self, cache: &FileCache<C>) -> LocalFastqPair {
        LocalFastqPair {
            pair_name: self.pair_name.clone(),
            read1: cache.local_path(&self.read1),
            read2: cache.local_path(&self.read2),
        }
    }
}

/// Reconstructs validated read pairs from a flat list of matched FASTQ
/// paths. Each filename must carry exactly one read marker (`_R1_` or
/// `_R2_`, never both, never repeated), and every pair name must have both
/// mates. The result is sorted by pair name.
pub fn pair_up(fastq_paths: &[BucketPath]) -> Result<Vec<FastqPair>, PipelineError> {
    let mut read1_by_name: BTreeMap<String, BucketPath> = BTreeMap::new();
    let mut read2_by_name: BTreeMap<String, BucketPath> = BTreeMap::new();

    for path in fastq_paths {
        let file_name = path.file_name();
        let read1_count = file_name.matches(READ1_MARKER).count();
        let read2_count = file_name.matches(READ2_MARKER).count();

        if read1_count == 1 && read2_count == 0 {
            read1_by_name.insert(pair_name(file_name, READ1_MARKER), path.clone());
        } else if read2_count == 1 && read1_count == 0 {
            read2_by_name.insert(pair_name(file_name, READ2_MARKER), path.clone());
        } else {
            return Err(PipelineError::AmbiguousReadMarker(path.to_string()));
        }
    }

    if !read1_by_name.keys().eq(read2_by_name.keys()) {
        let only_read1: Vec<&str> = read1_by_name
            .keys()
            .filter(|name| !read2_by_name.contains_key(*name))
            .map(String::as_str)
            .collect();
        let only_read2: Vec<&str> = read2_by_name
            .keys()
            .filter(|name| !read1_by_name.contains_key(*name))
            .map(String::as_str)
            .collect();
        return Err(PipelineError::UnbalancedPairs(format!(
            "missing read 2 for [{}], missing read 1 for [{}]",
            only_read1.join(", "),
            only_read2.join(", ")
        )));
    }

    let pairs = read1_by_name
        .into_iter()
        .map(|(name, read1)| {
            let read2 = read2_by_name
                .remove(&name)
                .expect("key sets checked equal");
            FastqPair {
                pair_name: name,
                read1,
                read2,
            }
        })
        .collect();

    Ok(pairs)
}

fn pair_name(file_name: &str, marker: &str) -> String {
    let normalized = file_name.replace(marker, PAIR_MARKER);
    normalized
        .split('.')
        .next()
        .unwrap_or(&normalized)
        .to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn path(name: &str) -> BucketPath {
        format!("gs://fastq-bucket/run1/{name}").parse().unwrap()
    }

    #[test]
    fn pairs_two_matching_reads() {
        let paths = vec![
            path("sampleA_FC1_S1_L001_R2_001.fastq.gz"),
            path("sampleA_FC1_S1_L001_R1_001.fastq.gz"),
        ];
        let pairs = pair_up(&paths).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].pair_name, "sampleA_FC1_S1_L001_R?_001");
        assert!(pairs[0].read1.file_name().contains("_R1_"));
        assert!(pairs[0].read2.file_name().contains("_R2_"));
    }

    #[test]
    fn output_is_sorted_by_pair_name() {
        let paths = vec![
            path("b_R1_.fastq.gz"),
            path("a_R2_.fastq.gz"),
            path("b_R2_.fastq.gz"),
            path("a_R1_.fastq.gz"),
        ];
        let pairs = pair_up(&paths).unwrap();
        let names: Vec<&str> = pairs.iter().map(|pair| pair.pair_name.as_str()).collect();
        assert_eq!(names, vec!["a_R?_", "b_R?_"]);
    }

    #[test]
    fn missing_mate_is_unbalanced() {
        let paths = vec![
            path("A_R1_.fastq.gz"),
            path("A_R2_.fastq.gz"),
            path("B_R1_.fastq.gz"),
        ];
        let err = pair_up(&paths).unwrap_err();
        assert_matches!(err, PipelineError::UnbalancedPairs(ref detail) if detail.contains("B_R?_"));
    }

    #[test]
    fn both_markers_is_ambiguous() {
        let paths = vec![path("weird_R1__R2_.fastq.gz")];
        let err = pair_up(&paths).unwrap_err();
        assert_matches!(err, PipelineError::AmbiguousReadMarker(_));
    }

    #[test]
    fn no_marker_is_ambiguous() {
        let paths = vec![path("unmarked.fastq.gz")];
        let err = pair_up(&paths).unwrap_err();
        assert_matches!(err, PipelineError::AmbiguousReadMarker(_));
    }

    #[test]
    fn repeated_marker_is_ambiguous() {
        let paths = vec![path("twice_R1__R1_.fastq.gz")];
        let err = pair_up(&paths).unwrap_err();
        assert_matches!(err, PipelineError::AmbiguousReadMarker(_));
    }
}
