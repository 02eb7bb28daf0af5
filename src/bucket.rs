use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

pub const SCHEME_PREFIX: &str = "gs://";

/// Location of an object within a bucket. The relative path never starts
/// with `/`, and ordering is structural on `(bucket, relative_path)` so
/// that batches of paths sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketPath {
    bucket: String,
    relative_path: String,
}

impl BucketPath {
    pub fn new(bucket: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            relative_path: relative_path.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Last `/`-delimited segment of the relative path.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Path with the last segment removed. A trailing slash is dropped
    /// before the segment is stripped, and a path without any `/` resolves
    /// to the bucket root (empty relative path).
    pub fn parent(&self) -> BucketPath {
        let trimmed = self.relative_path.strip_suffix('/').unwrap_or(&self.relative_path);
        let parent = match trimmed.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "",
        };
        BucketPath::new(self.bucket.clone(), parent)
    }

    /// Appends `suffix` verbatim to the relative path. No validation is
    /// done on the result.
    pub fn with_suffix(&self, suffix: &str) -> BucketPath {
        BucketPath::new(self.bucket.clone(), format!("{}{suffix}", self.relative_path))
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative_path.is_empty() {
            write!(f, "{SCHEME_PREFIX}{}", self.bucket)
        } else {
            write!(f, "{SCHEME_PREFIX}{}/{}", self.bucket, self.relative_path)
        }
    }
}

impl FromStr for BucketPath {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| PipelineError::InvalidBucketPath(value.to_string()))?;
        if rest.is_empty() {
            return Err(PipelineError::InvalidBucketPath(value.to_string()));
        }
        let (bucket, relative_path) = match rest.split_once('/') {
            Some((bucket, relative_path)) => (bucket, relative_path),
            None => (rest, ""),
        };
        Ok(BucketPath::new(bucket, relative_path))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_round_trip() {
        let path: BucketPath = "gs://some-bucket/a/b/c.bam".parse().unwrap();
        assert_eq!(path.bucket(), "some-bucket");
        assert_eq!(path.relative_path(), "a/b/c.bam");
        assert_eq!(path.to_string(), "gs://some-bucket/a/b/c.bam");
    }

    #[test]
    fn parse_rejects_other_schemes() {
        let err = "s3://bucket/key".parse::<BucketPath>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidBucketPath(_));
        let err = "plain/path".parse::<BucketPath>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidBucketPath(_));
    }

    #[test]
    fn parent_strips_last_segment() {
        let path: BucketPath = "gs://b/x/y/z".parse().unwrap();
        assert_eq!(path.parent().to_string(), "gs://b/x/y");
    }

    #[test]
    fn parent_tolerates_trailing_slash() {
        let path: BucketPath = "gs://b/x/".parse().unwrap();
        assert_eq!(path.parent().to_string(), "gs://b");
        assert_eq!(path.parent().relative_path(), "");
    }

    #[test]
    fn parent_of_top_level_object_is_bucket_root() {
        let path: BucketPath = "gs://b/file.bam".parse().unwrap();
        assert_eq!(path.parent().relative_path(), "");
        assert_eq!(path.parent().to_string(), "gs://b");
    }

    #[test]
    fn bucket_root_renders_without_trailing_slash() {
        let path: BucketPath = "gs://b".parse().unwrap();
        assert_eq!(path.relative_path(), "");
        assert_eq!(path.to_string(), "gs://b");
    }

    #[test]
    fn with_suffix_appends_verbatim() {
        let path: BucketPath = "gs://b/out/result.bam".parse().unwrap();
        assert_eq!(
            path.with_suffix(".bai").to_string(),
            "gs://b/out/result.bam.bai"
        );
    }

    #[test]
    fn ordering_is_structural() {
        let mut paths: Vec<BucketPath> = vec![
            "gs://b/z".parse().unwrap(),
            "gs://a/z".parse().unwrap(),
            "gs://b/a".parse().unwrap(),
        ];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(|path| path.to_string()).collect();
        assert_eq!(rendered, vec!["gs://a/z", "gs://b/a", "gs://b/z"]);
    }

    #[test]
    fn file_name_is_last_segment() {
        let path: BucketPath = "gs://b/x/sample_R1_001.fastq.gz".parse().unwrap();
        assert_eq!(path.file_name(), "sample_R1_001.fastq.gz");
    }
}
