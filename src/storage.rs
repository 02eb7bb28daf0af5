use std::fs::File;
use std::time::Duration;

use camino::Utf8Path;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::bucket::BucketPath;
use crate::error::PipelineError;

/// Contract over the object-storage SDK. Failures are never retried here;
/// they propagate to the enclosing job.
pub trait ObjectStoreClient: Send + Sync {
    fn exists(&self, path: &BucketPath) -> Result<bool, PipelineError>;

    /// Downloads one object. Fails with `RemoteFileMissing` if the object
    /// does not exist and with `TransferFailed` if the local file is absent
    /// after the call.
    fn download(&self, path: &BucketPath, local_path: &Utf8Path) -> Result<(), PipelineError>;

    /// Uploads one local file. Fails with `LocalFileMissing` before any
    /// network write and with `TransferFailed` if the object is not
    /// confirmed to exist afterwards.
    fn upload(&self, local_path: &Utf8Path, path: &BucketPath) -> Result<(), PipelineError>;

    /// Direct children of `dir_path`, one level deep. The prefix is
    /// normalized to end with a single `/`.
    fn list_children(&self, dir_path: &BucketPath) -> Result<Vec<BucketPath>, PipelineError>;

    /// All objects whose name matches the `*`-wildcard pattern in
    /// `pattern.relative_path()`, shell-glob style. An empty result is not
    /// an error.
    fn match_glob(&self, pattern: &BucketPath) -> Result<Vec<BucketPath>, PipelineError>;
}

/// Translates a shell-glob pattern (`*` and `?` wildcards) into an anchored
/// regex. Wildcards match across `/`, like `fnmatch`.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, PipelineError> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).map_err(|err| PipelineError::StorageHttp(err.to_string()))
}

#[derive(Clone)]
pub struct GcsHttpClient {
    client: Client,
    base_url: String,
    upload_base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl GcsHttpClient {
    /// `token` is a pre-acquired OAuth bearer token; credential acquisition
    /// is out of scope here. Requests go out unauthenticated when it is
    /// absent.
    pub fn new(token: Option<String>) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("seqbatch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::StorageHttp(err.to_string()))?,
        );
        if let Some(token) = token {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {trimmed}"))
                        .map_err(|err| PipelineError::StorageHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://storage.googleapis.com/storage/v1".to_string(),
            upload_base_url: "https://storage.googleapis.com/upload/storage/v1".to_string(),
        })
    }

    fn object_url(&self, path: &BucketPath) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.base_url,
            path.bucket(),
            encode_object_name(path.relative_path())
        )
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListResponse, PipelineError> {
        let url = format!("{}/b/{bucket}/o", self.base_url);
        let mut request = self.client.get(&url).query(&[("prefix", prefix)]);
        if let Some(delimiter) = delimiter {
            request = request.query(&[("delimiter", delimiter)]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let response = request
            .send()
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(status_error(response));
        }
        serde_json::from_reader(response)
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<BucketPath>, PipelineError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(bucket, prefix, delimiter, page_token.as_deref())?;
            names.extend(
                page.items
                    .into_iter()
                    .map(|object| BucketPath::new(bucket, object.name)),
            );
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(names)
    }
}

impl ObjectStoreClient for GcsHttpClient {
    fn exists(&self, path: &BucketPath) -> Result<bool, PipelineError> {
        let response = self
            .client
            .get(self.object_url(path))
            .send()
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            Ok(false)
        } else if status.is_success() {
            Ok(true)
        } else {
            Err(status_error(response))
        }
    }

    fn download(&self, path: &BucketPath, local_path: &Utf8Path) -> Result<(), PipelineError> {
        tracing::info!("starting download of '{path}' to '{local_path}'");
        if !self.exists(path)? {
            return Err(PipelineError::RemoteFileMissing(path.to_string()));
        }

        let url = format!("{}?alt=media", self.object_url(path));
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(status_error(response));
        }

        crate::fs_util::create_parent_dirs(local_path)?;
        write_stream_to_file(&mut response, local_path)?;

        if !local_path.as_std_path().exists() {
            return Err(PipelineError::TransferFailed(format!(
                "download of '{path}' to '{local_path}' has failed"
            )));
        }
        tracing::info!("finished download of '{path}' to '{local_path}'");
        Ok(())
    }

    fn upload(&self, local_path: &Utf8Path, path: &BucketPath) -> Result<(), PipelineError> {
        tracing::info!("starting upload of '{local_path}' to '{path}'");
        if !local_path.as_std_path().exists() {
            return Err(PipelineError::LocalFileMissing(local_path.to_owned()));
        }

        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.upload_base_url,
            path.bucket(),
            encode_object_name(path.relative_path())
        );
        let file = File::open(local_path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .body(file)
            .send()
            .map_err(|err| PipelineError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(status_error(response));
        }

        if !self.exists(path)? {
            return Err(PipelineError::TransferFailed(format!(
                "upload of '{local_path}' to '{path}' has failed"
            )));
        }
        tracing::info!("finished upload of '{local_path}' to '{path}'");
        Ok(())
    }

    fn list_children(&self, dir_path: &BucketPath) -> Result<Vec<BucketPath>, PipelineError> {
        let mut prefix = dir_path.relative_path().to_string();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.list_objects(dir_path.bucket(), &prefix, Some("/"))
    }

    fn match_glob(&self, pattern: &BucketPath) -> Result<Vec<BucketPath>, PipelineError> {
        let relative = pattern.relative_path();
        let prefix = relative.split('*').next().unwrap_or(relative);
        let matcher = glob_to_regex(relative)?;
        let candidates = self.list_objects(pattern.bucket(), prefix, None)?;
        Ok(candidates
            .into_iter()
            .filter(|candidate| matcher.is_match(candidate.relative_path()))
            .collect())
    }
}

/// Streams `reader` into a temp file next to `local_path` and persists it
/// only on success, so an interrupted transfer never leaves a partial file
/// that a later run would treat as already cached.
fn write_stream_to_file(
    reader: &mut impl std::io::Read,
    local_path: &Utf8Path,
) -> Result<(), PipelineError> {
    let parent = local_path
        .parent()
        .ok_or_else(|| PipelineError::Filesystem(format!("no parent for {local_path}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".download")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    std::io::copy(reader, &mut temp)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.persist(local_path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

fn status_error(response: reqwest::blocking::Response) -> PipelineError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "object store request failed".to_string());
    PipelineError::StorageStatus { status, message }
}

/// Percent-encodes an object name for use as a single URL path segment,
/// which is what the JSON API expects (`/` becomes `%2F`).
fn encode_object_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}
