use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "OSS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SERVICE: &str = "oss";
const REQUEST_TYPE: &str = "aliyun_v4_request";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `https://oss-cn-hangzhou.aliyuncs.com` -> `cn-hangzhou`.
pub fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let host = endpoint
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()?;
    let label = host.split('.').next()?;
    let region = label.strip_prefix("oss-")?;
    let region = region.strip_suffix("-internal").unwrap_or(region);
    (!region.is_empty()).then(|| region.to_string())
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub bucket: &'a str,
    pub key: &'a str,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl<'a> SignableRequest<'a> {
    pub fn new(method: &'a str, bucket: &'a str, key: &'a str) -> Self {
        Self {
            method,
            bucket,
            key,
            ..Default::default()
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct V4Signer {
    credentials: Credentials,
    region: String,
}

impl V4Signer {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn sign(&self, request: &mut SignableRequest<'_>, now: DateTime<Utc>) {
        request
            .headers
            .insert("x-oss-date".to_string(), iso_timestamp(now));
        request
            .headers
            .insert("x-oss-content-sha256".to_string(), UNSIGNED_PAYLOAD.to_string());

        let signature = self.signature(request, now);
        let authorization = format!(
            "{} Credential={}/{},Signature={}",
            ALGORITHM,
            self.credentials.access_key_id,
            self.scope(now),
            signature
        );
        request
            .headers
            .insert("authorization".to_string(), authorization);
    }

    pub fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
        now: DateTime<Utc>,
    ) -> String {
        let request = SignableRequest::new("GET", bucket, key)
            .query("x-oss-signature-version", ALGORITHM)
            .query(
                "x-oss-credential",
                format!("{}/{}", self.credentials.access_key_id, self.scope(now)),
            )
            .query("x-oss-date", iso_timestamp(now))
            .query("x-oss-expires", expires_secs.to_string());

        let signature = self.signature(&request, now);
        format!(
            "{}&x-oss-signature={}",
            canonical_query(&request.query),
            signature
        )
    }

    fn signature(&self, request: &SignableRequest<'_>, now: DateTime<Utc>) -> String {
        let canonical = canonical_request(request);
        tracing::trace!("OSS canonical request:\n{}", canonical);
        let to_sign = self.string_to_sign(&canonical, now);
        let key = self.signing_key(now);
        hex::encode(hmac_sha256(&key, to_sign.as_bytes()))
    }

    fn scope(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/{}",
            now.format("%Y%m%d"),
            self.region,
            SERVICE,
            REQUEST_TYPE
        )
    }

    fn string_to_sign(&self, canonical_request: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            iso_timestamp(now),
            self.scope(now),
            sha256_hex(canonical_request.as_bytes())
        )
    }

    fn signing_key(&self, now: DateTime<Utc>) -> Vec<u8> {
        let secret = format!("aliyun_v4{}", self.credentials.access_key_secret);
        let date_key = hmac_sha256(secret.as_bytes(), now.format("%Y%m%d").to_string().as_bytes());
        let region_key = hmac_sha256(&date_key, self.region.as_bytes());
        let service_key = hmac_sha256(&region_key, SERVICE.as_bytes());
        hmac_sha256(&service_key, REQUEST_TYPE.as_bytes())
    }
}

fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn canonical_uri(bucket: &str, key: &str) -> String {
    if bucket.is_empty() {
        return "/".to_string();
    }
    format!("/{}/{}", bucket, uri_encode(key, false))
}

pub fn canonical_query(query: &BTreeMap<String, String>) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| if v.is_empty() { k } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_signed_header(name: &str) -> bool {
    name.starts_with("x-oss-") || name == "content-type" || name == "content-md5"
}

fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    let mut lines: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim()))
        .filter(|(k, _)| is_signed_header(k))
        .collect();
    lines.sort();
    lines
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect()
}

fn canonical_request(request: &SignableRequest<'_>) -> String {
    format!(
        "{}\n{}\n{}\n{}\n\n{}",
        request.method,
        canonical_uri(request.bucket, request.key),
        canonical_query(&request.query),
        canonical_headers(&request.headers),
        UNSIGNED_PAYLOAD
    )
}
