//! Object storage client for S3-compatible endpoints.
//!
//! The pipeline reads and writes page bundles through the [`ObjectStore`]
//! trait; [`S3Store`] is the production implementation, speaking the S3 REST
//! API (path-style addressing, Signature V4) so it works against any
//! S3-compatible endpoint, R2 included.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// One page of an object listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Object keys in listing order.
    pub keys: Vec<String>,
    /// Whether the listing was truncated and a further page exists.
    pub is_truncated: bool,
    /// Continuation token for the next page, when truncated.
    pub next_continuation: Option<String>,
}

/// Abstraction over object storage used by the cache store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// List one page of object keys under a prefix.
    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    /// Download an object's bytes.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Production object storage client.
pub struct S3Store {
    client: Client,
    endpoint: String,
    host: String,
    bucket: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl S3Store {
    /// Creates a store for a bucket behind an S3-compatible endpoint.
    ///
    /// The region defaults to `auto`, which is what R2 expects; AWS-proper
    /// endpoints need the real region for the signature scope.
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let host = endpoint
            .strip_prefix("https://")
            .or_else(|| endpoint.strip_prefix("http://"))
            .ok_or_else(|| Error::Config(format!("endpoint is not an http(s) URL: {endpoint}")))?
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("pagesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            endpoint,
            host,
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: "auto".to_string(),
        })
    }

    /// Overrides the signing region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", uri_encode(&self.bucket, false), uri_encode(key, false))
    }

    fn bucket_path(&self) -> String {
        format!("/{}", uri_encode(&self.bucket, false))
    }

    /// Signs and sends a request, mapping non-success statuses to
    /// [`Error::Storage`].
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
        body: Option<(Vec<u8>, String)>,
        now: DateTime<Utc>,
    ) -> Result<reqwest::Response> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let canonical_query = canonical_query_string(query);

        let payload_hash = body
            .as_ref()
            .map_or_else(|| EMPTY_PAYLOAD_HASH.to_string(), |(bytes, _)| hex_sha256(bytes));

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), self.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some((_, content_type)) = &body {
            headers.push(("content-type".to_string(), content_type.clone()));
        }
        headers.sort();

        let (canonical, signed_headers) =
            canonical_request(method.as_str(), path, &canonical_query, &headers, &payload_hash);
        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let signature = hex_hmac(
            &signing_key(&self.secret_key, &date, &self.region),
            to_sign.as_bytes(),
        );
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );

        let mut url = format!("{}{path}", self.endpoint);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut request = self
            .client
            .request(method, &url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash);
        if let Some((bytes, content_type)) = body {
            request = request.header("content-type", content_type).body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(Error::Storage(format!("{status}: {message}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        debug!(key, bytes = bytes.len(), "uploading object");
        self.send(
            reqwest::Method::PUT,
            &self.object_path(key),
            &[],
            Some((bytes, content_type.to_string())),
            Utc::now(),
        )
        .await?;
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("prefix".to_string(), prefix.to_string()),
        ];
        if let Some(token) = continuation {
            query.push(("continuation-token".to_string(), token.to_string()));
        }
        debug!(prefix, continuation, "listing objects");

        let response = self
            .send(reqwest::Method::GET, &self.bucket_path(), &query, None, Utc::now())
            .await?;
        let xml = response.text().await?;
        parse_list_response(&xml)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!(key, "downloading object");
        let response = self
            .send(reqwest::Method::GET, &self.object_path(key), &[], None, Utc::now())
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse a `ListBucketResult` response body.
fn parse_list_response(xml: &str) -> Result<ListPage> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut page = ListPage::default();
    let mut in_contents = false;
    let mut current_element: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "Contents" => in_contents = true,
                    "Key" if in_contents => current_element = Some(name),
                    "IsTruncated" | "NextContinuationToken" => current_element = Some(name),
                    _ => {},
                }
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current_element = None;
            },
            Ok(Event::Text(e)) => {
                if let Some(ref element) = current_element {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::Storage(format!("listing parse error: {e}")))?;
                    match element.as_str() {
                        "Key" => page.keys.push(text.into_owned()),
                        "IsTruncated" => page.is_truncated = text.trim() == "true",
                        "NextContinuationToken" => {
                            page.next_continuation = Some(text.into_owned());
                        },
                        _ => {},
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Storage(format!("listing parse error: {e}"))),
            _ => {},
        }
        buf.clear();
    }

    Ok(page)
}

/// RFC 3986 encoding as SigV4 requires: unreserved characters pass through,
/// everything else (optionally excepting `/`) becomes uppercase `%XX`.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            },
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

fn canonical_request(
    method: &str,
    path: &str,
    canonical_query: &str,
    headers: &[(String, String)],
    payload_hash: &str,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical = format!(
        "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    (canonical, signed_headers)
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    )
}

fn signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"));
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac(key: &[u8], message: &[u8]) -> String {
    hex::encode(hmac_sha256(key, message))
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
