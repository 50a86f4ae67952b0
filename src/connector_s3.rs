//! Object-storage source over the S3 REST API.
//!
//! [`S3Client`] implements [`ObjectStorage`] (list, get, put) with AWS
//! Signature V4 authentication, signed with the pure-Rust `hmac` + `sha2`
//! crates. Any S3-compatible endpoint works: AWS itself, Google Cloud
//! Storage through its XML interoperability API, MinIO, LocalStack.
//!
//! [`ObjectSource`] lists documents under the docs prefix, hashes each
//! object's bytes and keeps the downloaded copy in a temporary file until
//! it is staged for upload or the source is dropped.
//!
//! # Configuration
//!
//! ```toml
//! [object]
//! bucket = "acme-docs"
//! docs_prefix = "PdfDocuments/"
//! region = "auto"
//! endpoint_url = "https://storage.googleapis.com"
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials)
//!
//! # Addressing
//!
//! Without `endpoint_url` requests go to
//! `https://<bucket>.s3.<region>.amazonaws.com/<key>` (virtual-hosted
//! style). With a custom endpoint they use path style,
//! `<endpoint>/<bucket>/<key>`, keeping the endpoint's scheme.

use async_trait::async_trait;
use chrono::Utc;
use globset::GlobSet;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;

use crate::config::ObjectSourceConfig;
use crate::connector_fs::build_globset;
use crate::error::{Error, Result};
use crate::models::{Candidate, Discovery};
use crate::tracker::content_hash;
use crate::traits::{DocumentSource, ObjectInfo, ObjectStorage, StagedFile};

const SERVICE: &str = "S3";

type HmacSha256 = Hmac<Sha256>;

// ═══════════════════════════════════════════════════════════════════════
// Document source
// ═══════════════════════════════════════════════════════════════════════

pub struct ObjectSource {
    storage: Arc<dyn ObjectStorage>,
    docs_prefix: String,
    include_set: GlobSet,
    /// Copies written during discovery, handed to `stage` so changed objects
    /// are not downloaded twice.
    downloaded: Mutex<HashMap<String, NamedTempFile>>,
}

impl ObjectSource {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &ObjectSourceConfig) -> Result<Self> {
        Ok(Self {
            storage,
            docs_prefix: config.docs_prefix.clone(),
            include_set: build_globset(&config.include_globs)?,
            downloaded: Mutex::new(HashMap::new()),
        })
    }

    /// Key relative to the docs prefix, used for glob matching.
    fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.docs_prefix.as_str())
            .unwrap_or(key)
            .trim_start_matches('/')
    }

    fn take_downloaded(&self, key: &str) -> Option<NamedTempFile> {
        self.downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

#[async_trait]
impl DocumentSource for ObjectSource {
    fn label(&self) -> &str {
        "object"
    }

    async fn discover(&self) -> Result<Discovery> {
        let objects = self.storage.list(&self.docs_prefix).await?;

        let mut items = Vec::new();
        let mut failed = Vec::new();
        let mut downloaded = HashMap::new();
        for obj in objects {
            if obj.key.ends_with('/') || !self.include_set.is_match(self.relative_key(&obj.key)) {
                continue;
            }

            let body = match self.storage.get(&obj.key).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    tracing::warn!(key = %obj.key, "object disappeared during listing");
                    failed.push((obj.key, "object disappeared during listing".to_string()));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        bucket = %self.storage.bucket(),
                        key = %obj.key,
                        error = %e,
                        "failed to download object"
                    );
                    failed.push((obj.key, format!("download failed: {}", e)));
                    continue;
                }
            };
            tracing::debug!(key = %obj.key, listed = obj.size, read = body.len(), "downloaded");

            let display_name = base_name(&obj.key).to_string();
            let copy = write_temp_copy(&display_name, &body)?;
            items.push(Candidate {
                display_name,
                hash: content_hash(&body),
                id: obj.key.clone(),
            });
            downloaded.insert(obj.key, copy);
        }

        *self
            .downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = downloaded;

        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Discovery {
            candidates: items,
            failed,
        })
    }

    async fn stage(&self, candidate: &Candidate) -> Result<StagedFile> {
        if let Some(copy) = self.take_downloaded(&candidate.id) {
            return Ok(StagedFile::Temp(copy));
        }

        let body = self.storage.get(&candidate.id).await?.ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("s3://{}/{}", self.storage.bucket(), candidate.id),
            ))
        })?;
        Ok(StagedFile::Temp(write_temp_copy(
            &candidate.display_name,
            &body,
        )?))
    }
}

/// Write `body` to a temp file that keeps the document's extension.
fn write_temp_copy(display_name: &str, body: &[u8]) -> Result<NamedTempFile> {
    let suffix = display_name
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext))
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix("fss-")
        .suffix(&suffix)
        .tempfile()?;
    tmp.write_all(body)?;
    tmp.flush()?;
    Ok(tmp)
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

// ═══════════════════════════════════════════════════════════════════════
// S3 client
// ═══════════════════════════════════════════════════════════════════════

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| Error::Config(format!("{} environment variable not set", name)))
        };
        Ok(Self {
            access_key_id: var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: var("AWS_SECRET_ACCESS_KEY")?,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

pub struct S3Client {
    config: ObjectSourceConfig,
    creds: AwsCredentials,
    http: reqwest::Client,
}

impl S3Client {
    /// Build a client with credentials from the environment.
    pub fn from_env(config: &ObjectSourceConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            creds: AwsCredentials::from_env()?,
            http: reqwest::Client::new(),
        })
    }

    /// `(scheme, host, path prefix)` for the configured endpoint.
    fn endpoint(&self) -> (String, String, String) {
        match self.config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (
                    scheme.to_string(),
                    host,
                    format!("/{}", uri_encode(&self.config.bucket)),
                )
            }
            None => (
                "https".to_string(),
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
                String::new(),
            ),
        }
    }

    /// Build and sign a request.
    ///
    /// `key` is the object key (empty for bucket-level calls), `query` the
    /// unencoded query parameters.
    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        query: &[(String, String)],
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let (scheme, host, base_path) = self.endpoint();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = if key.is_empty() {
            format!("{}/", base_path)
        } else {
            format!("{}/{}", base_path, encoded_key)
        };

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical query string must be sorted
        let mut sorted_params = query.to_vec();
        sorted_params.sort();
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}://{}{}", scheme, host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(&canonical_querystring);
        }

        let mut builder = self
            .http
            .request(method, &url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date);
        if let Some(ref token) = self.creds.session_token {
            builder = builder.header("x-amz-security-token", token);
        }
        builder
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|source| Error::Http {
            service: SERVICE,
            source,
        })
    }
}

async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::Api {
        service: SERVICE,
        status,
        body: body.chars().take(500).collect(),
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// `ListObjectsV2` with `max-keys=1000`, following
    /// `NextContinuationToken` until the listing is complete.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let response = self
                .send(self.signed_request(reqwest::Method::GET, "", &query, b""))
                .await?;
            if !response.status().is_success() {
                return Err(api_error(response).await);
            }

            let xml = response.text().await.map_err(|source| Error::Http {
                service: SERVICE,
                source,
            })?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml);
            objects.extend(batch);

            match (is_truncated, next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .send(self.signed_request(reqwest::Method::GET, key, &[], b""))
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let bytes = response.bytes().await.map_err(|source| Error::Http {
            service: SERVICE,
            source,
        })?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let request = self
            .signed_request(reqwest::Method::PUT, key, &[], &data)
            .header("Content-Type", content_type)
            .body(data);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the SigV4 signing key.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal, no extra deps) ============

/// Parse a `ListObjectsV2` response: objects, truncation flag, next token.
fn parse_list_objects_response(xml: &str) -> (Vec<ObjectInfo>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key")
            .map(|k| xml_unescape(&k))
            .unwrap_or_default();
        if key.is_empty() {
            continue;
        }

        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        objects.push(ObjectInfo { key, size });
    }

    (objects, is_truncated, next_token)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
