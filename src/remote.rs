//! Remote state fetch
//!
//! Downloads a state object from S3 (or an S3-compatible store) into the
//! local state path before it is loaded. Requests are signed with SigV4 when
//! the source carries credentials and sent anonymously otherwise.

use crate::config::{AwsCredentials, RemoteSource};
use crate::error::{InventoryError, Result};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use reqwest::{Client, RequestBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use url::Url;

/// SigV4 service name for S3
const SIGNING_SERVICE: &str = "s3";

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a response body for logging and drop control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Object URL for a remote source
///
/// Virtual-hosted style on AWS, path style when an endpoint is configured.
pub fn object_url(source: &RemoteSource) -> Result<Url> {
    let key = source
        .key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let raw = match &source.endpoint {
        Some(endpoint) => format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            urlencoding::encode(&source.bucket),
            key
        ),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            source.bucket, source.region, key
        ),
    };

    Url::parse(&raw).map_err(|e| InventoryError::Config(format!("invalid object URL {}: {}", raw, e)))
}

/// Add SigV4 headers for an empty-bodied GET of `url`
fn sign_get(
    request: RequestBuilder,
    url: &Url,
    region: &str,
    credentials: &AwsCredentials,
    time: SystemTime,
) -> Result<RequestBuilder> {
    let identity = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        credentials.session_token.clone(),
        None,
        "environment",
    )
    .into();

    // S3 signs the already-encoded path as is and wants the payload hash header
    let mut settings = SigningSettings::default();
    settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
    settings.percent_encoding_mode = PercentEncodingMode::Single;
    settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_SERVICE)
        .time(time)
        .settings(settings)
        .build()
        .map_err(|e| InventoryError::Remote(format!("invalid signing parameters: {}", e)))?
        .into();

    let signable = SignableRequest::new("GET", url.as_str(), std::iter::empty(), SignableBody::Bytes(&[]))
        .map_err(|e| InventoryError::Remote(format!("cannot sign {}: {}", url, e)))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| InventoryError::Remote(format!("cannot sign {}: {}", url, e)))?
        .into_parts();

    Ok(instructions
        .headers()
        .fold(request, |request, (name, value)| request.header(name, value)))
}

/// HTTP client for fetching state objects
#[derive(Clone)]
pub struct StateFetcher {
    client: Client,
}

impl StateFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tfstate-inventory/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InventoryError::Remote(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Download `source` into `to_file`
    ///
    /// The body goes to a sibling temp file first and is renamed over
    /// `to_file` only after the whole object arrived.
    pub async fn download(&self, source: &RemoteSource, to_file: &Path) -> Result<u64> {
        let url = object_url(source)?;
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        match &source.credentials {
            Some(credentials) => {
                request = sign_get(request, &url, &source.region, credentials, SystemTime::now())?;
            }
            None => tracing::warn!("No AWS credentials in the environment, sending unsigned request"),
        }

        let response = request
            .send()
            .await
            .map_err(|e| InventoryError::Remote(format!("GET {} failed: {}", url, e)))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Fetch error: {} - {}", status, sanitize_for_log(&body));
            return Err(InventoryError::Remote(format!(
                "GET s3://{}/{} failed: {}",
                source.bucket, source.key, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InventoryError::Remote(format!("reading body of {} failed: {}", url, e)))?;
        let partial = partial_path(to_file);

        if let Some(parent) = to_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = tokio::fs::write(&partial, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, to_file).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::info!(
            "Fetched s3://{}/{} ({} bytes) into {:?}",
            source.bucket,
            source.key,
            bytes.len(),
            to_file
        );

        Ok(bytes.len() as u64)
    }
}

/// Unique temp path next to `target`
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    target.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(endpoint: Option<&str>) -> RemoteSource {
        RemoteSource {
            bucket: "infra-state".to_string(),
            key: "prod/us east/terraform.tfstate".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: endpoint.map(String::from),
            credentials: None,
        }
    }

    fn credentials(session_token: Option<&str>) -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: session_token.map(String::from),
        }
    }

    fn signed_headers(session_token: Option<&str>) -> reqwest::header::HeaderMap {
        let url = object_url(&source(None)).unwrap();
        let client = Client::new();
        let time = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);

        sign_get(client.get(url.clone()), &url, "eu-west-1", &credentials(session_token), time)
            .unwrap()
            .build()
            .unwrap()
            .headers()
            .clone()
    }

    #[test]
    fn test_signed_request_headers() {
        let headers = signed_headers(None);

        let auth = headers["authorization"].to_str().unwrap();
        assert!(
            auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20231114/eu-west-1/s3/aws4_request"),
            "{auth}"
        );
        assert!(auth.contains("x-amz-content-sha256"), "{auth}");
        assert_eq!(headers["x-amz-date"], "20231114T221320Z");
        // SHA-256 of the empty body
        assert_eq!(
            headers["x-amz-content-sha256"],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(!headers.contains_key("x-amz-security-token"));
    }

    #[test]
    fn test_session_token_is_sent() {
        let headers = signed_headers(Some("session"));
        assert_eq!(headers["x-amz-security-token"], "session");
    }

    #[test]
    fn test_virtual_hosted_url() {
        let url = object_url(&source(None)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://infra-state.s3.eu-west-1.amazonaws.com/prod/us%20east/terraform.tfstate"
        );
    }

    #[test]
    fn test_path_style_url_with_endpoint() {
        let url = object_url(&source(Some("http://127.0.0.1:9000/"))).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/infra-state/prod/us%20east/terraform.tfstate"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = object_url(&source(Some("not a url"))).unwrap_err();
        assert!(matches!(err, InventoryError::Config(_)));
    }

    #[test]
    fn test_sanitize_for_log_truncates() {
        let body = "é".repeat(150);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 300 bytes total]"));

        assert_eq!(sanitize_for_log("Access\nDenied"), "AccessDenied");
    }

    #[test]
    fn test_partial_path_is_sibling() {
        let partial = partial_path(Path::new("/tmp/state/terraform.tfstate"));
        assert_eq!(partial.parent(), Some(Path::new("/tmp/state")));
        let name = partial.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".terraform.tfstate."));
        assert!(name.ends_with(".part"));
    }
}
