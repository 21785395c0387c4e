//! Minimal AWS Signature Version 4 request signing.
//!
//! Shared by the object-storage and OCR clients. Implements the canonical
//! request / string-to-sign / derived-key chain for header-based auth;
//! presigned URLs and chunked uploads are out of scope.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials resolved at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Headers to attach to the outgoing request.
#[derive(Debug, Clone)]
pub struct Signature {
    pub amz_date: String,
    pub authorization: String,
    pub content_sha256: String,
}

/// Sign a request, producing the `Authorization` and `x-amz-date` headers.
///
/// `path` must already be URI-encoded and `canonical_query` must already be
/// in canonical form (sorted, encoded) or empty. `extra_headers` are the
/// caller's headers to include in signing, lowercase names; `host` and
/// `x-amz-date` are added here.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    method: &str,
    host: &str,
    path: &str,
    canonical_query: &str,
    extra_headers: &[(String, String)],
    payload: &[u8],
    region: &str,
    service: &str,
    creds: &Credentials,
    now: DateTime<Utc>,
) -> Signature {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let content_sha256 = hex::encode(Sha256::digest(payload));

    let mut headers: Vec<(String, String)> = extra_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), normalize_header_value(v)))
        .collect();
    headers.push(("host".to_string(), host.to_string()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, path, canonical_query, canonical_headers, signed_headers, content_sha256
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac(
        format!("AWS4{}", creds.secret_access_key).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    let k_signing = hmac(&k_service, b"aws4_request");
    let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, creds.access_key_id, scope, signed_headers, signature
    );

    Signature {
        amz_date,
        authorization,
        content_sha256,
    }
}

/// URI-encode a storage key for use as a request path, keeping `/` intact.
pub fn uri_encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Trim and collapse internal whitespace runs, per the canonicalization rules.
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac-sha256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        }
    }

    /// The worked example from the AWS SigV4 documentation
    /// (GET iam ListUsers, 2015-08-30T12:36:00Z).
    #[test]
    fn matches_aws_documented_signature() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let sig = sign_request(
            "GET",
            "iam.amazonaws.com",
            "/",
            "Action=ListUsers&Version=2010-05-08",
            &[(
                "content-type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            )],
            b"",
            "us-east-1",
            "iam",
            &example_credentials(),
            now,
        );

        assert_eq!(sig.amz_date, "20150830T123600Z");
        assert!(sig.authorization.ends_with(
            "Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        ));
        assert!(sig
            .authorization
            .contains("Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request"));
        assert!(sig
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date"));
    }

    #[test]
    fn empty_payload_hash_is_sha256_of_nothing() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sig = sign_request(
            "GET",
            "bucket.s3.us-east-1.amazonaws.com",
            "/key",
            "",
            &[],
            b"",
            "us-east-1",
            "s3",
            &example_credentials(),
            now,
        );
        assert_eq!(
            sig.content_sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(uri_encode_path("a/b c.pdf"), "a/b%20c.pdf");
        assert_eq!(uri_encode_path("plain-key_1.pdf"), "plain-key_1.pdf");
        assert_eq!(uri_encode_path("docs/f=x&y"), "docs/f%3Dx%26y");
    }

    #[test]
    fn normalizes_header_values() {
        assert_eq!(normalize_header_value("  a   b  "), "a b");
    }
}
