use std::io::SeekFrom;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Method, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::config::OssConfig;
use crate::error::{Error, Result};
use crate::oss::multipart::{complete_body, plan_parts, CompletedPart, PartPlan};
use crate::oss::signer::{
    canonical_query, region_from_endpoint, uri_encode, Credentials, SignableRequest, V4Signer,
};
use crate::oss::xml;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    pub fn from_xml(body: &str) -> Self {
        let objects = xml::blocks(body, "Contents")
            .into_iter()
            .filter_map(|block| {
                Some(ObjectSummary {
                    key: xml::tag_text(block, "Key")?,
                    size: xml::tag_text(block, "Size")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                    last_modified: xml::tag_text(block, "LastModified"),
                    etag: xml::tag_text(block, "ETag").map(|e| e.trim_matches('"').to_string()),
                })
            })
            .collect();

        Self {
            objects,
            is_truncated: xml::tag_text(body, "IsTruncated").as_deref() == Some("true"),
            next_continuation_token: xml::tag_text(body, "NextContinuationToken")
                .filter(|t| !t.is_empty()),
        }
    }
}

pub struct OssClient {
    http: Client,
    config: OssConfig,
    signer: V4Signer,
    host: String,
    retry: RetryPolicy,
}

impl OssClient {
    pub fn new(config: &OssConfig) -> Result<Self> {
        config.validate()?;

        let host = endpoint_host(&config.endpoint);
        let region = config
            .region
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| region_from_endpoint(&config.endpoint))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Cannot derive the OSS region from endpoint {}; set file_upload.region",
                    config.endpoint
                ))
            })?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_connections)
            .build()?;

        tracing::debug!("OSS client ready: endpoint={} region={}", host, region);

        Ok(Self {
            http,
            signer: V4Signer::new(
                Credentials {
                    access_key_id: config.access_key_id.trim().to_string(),
                    access_key_secret: config.access_key_secret.trim().to_string(),
                },
                region,
            ),
            host,
            retry: RetryPolicy::new(config.max_retries),
            config: config.clone(),
        })
    }

    pub fn bucket(&self) -> Result<&str> {
        self.config.require_bucket()
    }

    /// `prefix/yyyy/MM/<uuid>_<file name>`
    pub fn generate_object_key(&self, file_name: &str, now: DateTime<Utc>) -> String {
        let mut prefix = self.config.object_key_prefix.trim().to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        format!(
            "{}{}/{}_{}",
            prefix,
            now.format("%Y/%m"),
            uuid::Uuid::new_v4(),
            file_name
        )
    }

    pub fn object_url(&self, key: &str) -> String {
        let scheme = if self.config.use_https { "https" } else { "http" };
        let bucket = self.config.bucket_name.trim();
        let key = uri_encode(key, false);
        if self.config.path_style {
            format!("{}://{}/{}/{}", scheme, self.host, bucket, key)
        } else {
            format!("{}://{}.{}/{}", scheme, bucket, self.host, key)
        }
    }

    pub fn presigned_url(&self, key: &str, expires_secs: u64) -> Result<String> {
        let bucket = self.bucket()?;
        let query = self.signer.presign(bucket, key, expires_secs, Utc::now());
        Ok(format!("{}?{}", self.object_url(key), query))
    }

    /// URL handed to other services: presigned when an expiry is configured.
    pub fn access_url(&self, key: &str) -> Result<String> {
        match self.config.presign_expiry_secs {
            Some(expiry) => self.presigned_url(key, expiry),
            None => Ok(self.object_url(key)),
        }
    }

    pub async fn upload_file(&self, path: &Path) -> Result<UploadedObject> {
        let metadata = tokio::fs::metadata(path).await.ok();
        let size = match metadata {
            Some(m) if m.is_file() => m.len(),
            _ => {
                return Err(Error::ObjectStore(format!(
                    "File does not exist or is not a regular file: {}",
                    path.display()
                )))
            }
        };
        self.bucket()?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let key = self.generate_object_key(&file_name, Utc::now());
        let content_type = content_type_for(path);

        tracing::info!("Uploading {} ({} bytes) to {}", path.display(), size, key);

        let etag = if size < self.config.multipart_threshold {
            let data = tokio::fs::read(path).await?;
            self.put_object(&key, data, content_type).await?
        } else {
            self.multipart_upload(path, &key, size, content_type).await?
        };

        tracing::debug!("Upload finished: key={} etag={:?}", key, etag);

        Ok(UploadedObject {
            url: self.access_url(&key)?,
            key,
            size,
            etag,
        })
    }

    pub async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<Option<String>> {
        let headers = [("content-type", content_type.to_string())];
        let response = self
            .send(Method::PUT, key, &[], &headers, Some(&data))
            .await?;
        Ok(etag_of(&response).map(|e| e.trim_matches('"').to_string()))
    }

    async fn multipart_upload(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        content_type: &str,
    ) -> Result<Option<String>> {
        let upload_id = self.initiate_multipart(key, content_type).await?;
        tracing::debug!("Multipart upload {} started for {}", upload_id, key);

        let parts = match self.upload_parts(path, key, &upload_id, size).await {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(abort_err) = self.abort_multipart(key, &upload_id).await {
                    tracing::warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
                }
                return Err(e);
            }
        };

        let body = complete_body(&parts);
        let query = [("uploadId", upload_id.clone())];
        let headers = [("content-type", "application/xml".to_string())];
        let response = self
            .send(Method::POST, key, &query, &headers, Some(body.as_bytes()))
            .await?;
        let text = response.text().await?;
        Ok(xml::tag_text(&text, "ETag").map(|e| e.trim_matches('"').to_string()))
    }

    async fn initiate_multipart(&self, key: &str, content_type: &str) -> Result<String> {
        let query = [("uploads", String::new())];
        let headers = [("content-type", content_type.to_string())];
        let response = self
            .send(Method::POST, key, &query, &headers, None)
            .await?;
        let text = response.text().await?;
        xml::tag_text(&text, "UploadId").ok_or_else(|| {
            Error::ObjectStore("InitiateMultipartUpload response has no UploadId".to_string())
        })
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let plan = plan_parts(size, self.config.part_size);
        let semaphore = Semaphore::new(self.config.upload_concurrency.max(1));

        let pb = ProgressBar::new(size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} uploaded")
                .unwrap()
                .progress_chars("#>-"),
        );

        let uploads = plan.into_iter().map(|part| {
            let semaphore = &semaphore;
            let pb = pb.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::ObjectStore(e.to_string()))?;
                let data = read_part(path, part).await?;
                let query = [
                    ("partNumber", part.number.to_string()),
                    ("uploadId", upload_id.to_string()),
                ];
                let response = self
                    .send(Method::PUT, key, &query, &[], Some(&data))
                    .await?;
                let etag = etag_of(&response).ok_or_else(|| {
                    Error::ObjectStore(format!("Part {} upload returned no ETag", part.number))
                })?;
                pb.inc(part.len);
                Ok::<_, Error>(CompletedPart {
                    number: part.number,
                    etag,
                })
            }
        });

        let results = join_all(uploads).await;
        pb.finish_and_clear();
        results.into_iter().collect()
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        let query = [("uploadId", upload_id.to_string())];
        self.send(Method::DELETE, key, &query, &[], None).await?;
        Ok(())
    }

    pub async fn download_to(&self, key: &str, dest: &Path) -> Result<u64> {
        let response = self.send(Method::GET, key, &[], &[], None).await?;
        let stream = Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)));
        let written = save_stream(stream, dest).await?;

        tracing::info!("Downloaded {} ({} bytes) to {}", key, written, dest.display());
        Ok(written)
    }

    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
        max_keys: u32,
        continuation_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut query = vec![
            ("list-type", "2".to_string()),
            ("max-keys", max_keys.clamp(1, 1000).to_string()),
        ];
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token.to_string()));
        }

        let response = self.send(Method::GET, "", &query, &[], None).await?;
        let body = response.text().await?;
        Ok(ListPage::from_xml(&body))
    }

    pub async fn list_all(&self, prefix: Option<&str>, limit: usize) -> Result<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let remaining = limit.saturating_sub(objects.len());
            if remaining == 0 {
                break;
            }
            let page = self
                .list_objects(prefix, remaining.min(1000) as u32, token.as_deref())
                .await?;
            objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        objects.truncate(limit);
        Ok(objects)
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.send(Method::DELETE, key, &[], &[], None).await?;
        tracing::debug!("Deleted object {}", key);
        Ok(())
    }

    /// Best-effort cleanup; failures are logged and reported as `false`.
    pub async fn delete_uploaded(&self, object: &UploadedObject) -> bool {
        if object.key.trim().is_empty() {
            tracing::warn!("Cannot delete an object with an empty key");
            return false;
        }
        match self.delete_object(&object.key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to delete {} from OSS: {}", object.key, e);
                false
            }
        }
    }

    fn request_url(&self, key: &str, query: &std::collections::BTreeMap<String, String>) -> String {
        let mut url = self.object_url(key);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(query));
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: Option<&[u8]>,
    ) -> Result<Response> {
        let bucket = self.bucket()?;
        let operation = format!("OSS {} /{}/{}", method, bucket, key);
        let method = &method;

        self.retry
            .run(&operation, move || async move {
                let mut request = SignableRequest::new(method.as_str(), bucket, key);
                for (name, value) in query {
                    request = request.query(name, value.clone());
                }
                for (name, value) in headers {
                    request = request.header(name, value.clone());
                }
                self.signer.sign(&mut request, Utc::now());

                let url = self.request_url(key, &request.query);
                let mut builder = self.http.request(method.clone(), url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(body) = body {
                    builder = builder.body(body.to_vec());
                }

                check_status(builder.send().await?).await
            })
            .await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let detail = xml::error_summary(&body).unwrap_or_else(|| status.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited(retry_after.unwrap_or(1)));
    }
    if status.is_server_error() {
        return Err(Error::ServerError(status.as_u16(), detail));
    }
    Err(Error::ObjectStore(format!("{} ({})", detail, status)))
}

/// Writes every chunk to `dest`. A partial file never survives a failure.
async fn save_stream<S, B>(mut stream: S, dest: &Path) -> Result<u64>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let result = async {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        Ok::<_, Error>(written)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

fn etag_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn read_part(path: &Path, part: PartPlan) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(part.offset)).await?;
    let mut buf = vec![0u8; part.len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

fn endpoint_host(endpoint: &str) -> String {
    endpoint
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "srt" => "application/x-subrip",
        _ => "application/octet-stream",
    }
}
