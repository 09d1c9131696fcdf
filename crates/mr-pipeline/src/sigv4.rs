//! AWS Signature Version 4 for single-request S3 uploads.
//!
//! Only what a signed `PUT` with headers needs: no query-string signing, no
//! chunked payloads. The payload is hashed up front, which the publisher can
//! do because it reads the artifact fully before sending.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use mr_core::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Static credentials and the region they sign for.
#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
}

/// Headers to attach to a signed request, names lowercased.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub headers: BTreeMap<String, String>,
    pub authorization: String,
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac(key: &[u8], data: &[u8]) -> mr_core::Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the per-day signing key.
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> mr_core::Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{secret_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// `Host` header value as the HTTP client will send it.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Sign a request to `url`.
///
/// `extra` headers (e.g. `content-type`, `x-amz-acl`) are included in the
/// signature; `host`, `x-amz-date`, and `x-amz-content-sha256` are added.
/// The URL path must already be percent-encoded; S3 paths are not encoded a
/// second time.
pub fn sign(
    creds: &Credentials<'_>,
    method: &str,
    url: &Url,
    extra: &[(&str, &str)],
    payload_hash: &str,
    now: DateTime<Utc>,
) -> mr_core::Result<SignedHeaders> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut headers = BTreeMap::new();
    headers.insert("host".to_string(), host_header(url));
    headers.insert("x-amz-date".to_string(), amz_date.clone());
    headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
    for (name, value) in extra {
        headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        path = url.path(),
        query = url.query().unwrap_or(""),
    );

    let scope = format!("{date}/{}/{SERVICE}/aws4_request", creds.region);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(creds.secret_key, &date, creds.region, SERVICE)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key
    );

    // The client derives Host itself.
    headers.remove("host");

    Ok(SignedHeaders {
        headers,
        authorization,
    })
}
