use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use seqbatch::bucket::BucketPath;
use seqbatch::cache::{FileCache, TransferStatus};
use seqbatch::error::PipelineError;
use seqbatch::storage::{ObjectStoreClient, glob_to_regex};

/// Object store held in memory, counting network-touching calls.
#[derive(Default)]
struct InMemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
}

impl InMemoryStore {
    fn insert(&self, path: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
    }

    fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }
}

impl ObjectStoreClient for InMemoryStore {
    fn exists(&self, path: &BucketPath) -> Result<bool, PipelineError> {
        Ok(self.contains(&path.to_string()))
    }

    fn download(&self, path: &BucketPath, local_path: &Utf8Path) -> Result<(), PipelineError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let content = objects
            .get(&path.to_string())
            .ok_or_else(|| PipelineError::RemoteFileMissing(path.to_string()))?;
        std::fs::write(local_path.as_std_path(), content)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn upload(&self, local_path: &Utf8Path, path: &BucketPath) -> Result<(), PipelineError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if !local_path.as_std_path().exists() {
            return Err(PipelineError::LocalFileMissing(local_path.to_owned()));
        }
        let content = std::fs::read(local_path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        self.insert(&path.to_string(), &content);
        Ok(())
    }

    fn list_children(&self, dir_path: &BucketPath) -> Result<Vec<BucketPath>, PipelineError> {
        let bucket_prefix = format!("gs://{}/", dir_path.bucket());
        let mut prefix = dir_path.relative_path().to_string();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter_map(|key| key.strip_prefix(&bucket_prefix))
            .filter(|relative| {
                relative.starts_with(&prefix) && !relative[prefix.len()..].contains('/')
            })
            .map(|relative| BucketPath::new(dir_path.bucket(), relative))
            .collect())
    }

    fn match_glob(&self, pattern: &BucketPath) -> Result<Vec<BucketPath>, PipelineError> {
        let bucket_prefix = format!("gs://{}/", pattern.bucket());
        let matcher = glob_to_regex(pattern.relative_path())?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter_map(|key| key.strip_prefix(&bucket_prefix))
            .filter(|relative| matcher.is_match(relative))
            .map(|relative| BucketPath::new(pattern.bucket(), relative))
            .collect())
    }
}

fn cache_in(temp: &tempfile::TempDir, store: InMemoryStore) -> FileCache<InMemoryStore> {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("mirror")).unwrap();
    FileCache::new(root, store)
}

#[test]
fn download_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let store = InMemoryStore::default();
    store.insert("gs://bucket/runs/sample.bam", b"bam-bytes");
    let cache = cache_in(&temp, store);

    let path: BucketPath = "gs://bucket/runs/sample.bam".parse().unwrap();

    let first = cache.download(&path).unwrap();
    assert_eq!(first, TransferStatus::Done);
    let local = cache.local_path(&path);
    assert_eq!(std::fs::read(local.as_std_path()).unwrap(), b"bam-bytes");

    let second = cache.download(&path).unwrap();
    assert_eq!(second, TransferStatus::Skipped);
    assert_eq!(cache.client().downloads.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(local.as_std_path()).unwrap(), b"bam-bytes");
}

#[test]
fn missing_remote_object_is_fatal_not_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let cache = cache_in(&temp, InMemoryStore::default());

    let path: BucketPath = "gs://bucket/absent.bam".parse().unwrap();
    let err = cache.download(&path).unwrap_err();
    assert_matches!(err, PipelineError::RemoteFileMissing(_));
}

#[test]
fn upload_refuses_to_overwrite_remote_objects() {
    let temp = tempfile::tempdir().unwrap();
    let store = InMemoryStore::default();
    store.insert("gs://bucket/out/result.bam", b"already-there");
    let cache = cache_in(&temp, store);

    let path: BucketPath = "gs://bucket/out/result.bam".parse().unwrap();
    let local = cache.local_path(&path);
    std::fs::create_dir_all(local.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(local.as_std_path(), b"new-content").unwrap();

    let err = cache.upload(&path).unwrap_err();
    assert_matches!(err, PipelineError::RemoteAlreadyExists(_));
    // Refused before any network write.
    assert_eq!(cache.client().uploads.load(Ordering::SeqCst), 0);
    assert_eq!(
        cache.client().objects.lock().unwrap()["gs://bucket/out/result.bam"],
        b"already-there"
    );
}

#[test]
fn upload_stages_from_the_mirror() {
    let temp = tempfile::tempdir().unwrap();
    let cache = cache_in(&temp, InMemoryStore::default());

    let path: BucketPath = "gs://bucket/out/result.bam".parse().unwrap();
    let local = cache.local_path(&path);
    std::fs::create_dir_all(local.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(local.as_std_path(), b"fresh").unwrap();

    let status = cache.upload(&path).unwrap();
    assert_eq!(status, TransferStatus::Done);
    assert!(cache.client().contains("gs://bucket/out/result.bam"));
}

#[test]
fn batch_download_attempts_every_file_and_fails_as_a_whole() {
    let temp = tempfile::tempdir().unwrap();
    let store = InMemoryStore::default();
    store.insert("gs://bucket/a.fastq.gz", b"a");
    store.insert("gs://bucket/c.fastq.gz", b"c");
    let cache = cache_in(&temp, store);

    let paths: Vec<BucketPath> = ["gs://bucket/a.fastq.gz", "gs://bucket/b.fastq.gz", "gs://bucket/c.fastq.gz"]
        .iter()
        .map(|raw| raw.parse().unwrap())
        .collect();

    let err = cache.download_all(&paths).unwrap_err();
    assert_matches!(
        err,
        PipelineError::BatchTransfer { failed: 1, total: 3, ref details, .. }
            if details.contains("b.fastq.gz")
    );

    // Siblings were not cancelled or rolled back.
    assert!(cache.local_path(&paths[0]).as_std_path().exists());
    assert!(!cache.local_path(&paths[1]).as_std_path().exists());
    assert!(cache.local_path(&paths[2]).as_std_path().exists());
}

#[test]
fn batch_upload_reports_every_failed_path() {
    let temp = tempfile::tempdir().unwrap();
    let cache = cache_in(&temp, InMemoryStore::default());

    let present: BucketPath = "gs://bucket/out/a.bam".parse().unwrap();
    let missing: BucketPath = "gs://bucket/out/b.bam".parse().unwrap();
    let local = cache.local_path(&present);
    std::fs::create_dir_all(local.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(local.as_std_path(), b"a").unwrap();

    let err = cache
        .upload_all(&[present.clone(), missing.clone()])
        .unwrap_err();
    assert_matches!(
        err,
        PipelineError::BatchTransfer { failed: 1, total: 2, ref details, .. }
            if details.contains("b.bam")
    );
    // The sibling that could be staged still made it to the bucket.
    assert!(cache.client().contains("gs://bucket/out/a.bam"));
}
