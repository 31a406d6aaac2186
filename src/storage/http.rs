//! HTTP object storage: PUTs objects to an S3-compatible bucket through
//! SigV4-presigned URLs.

use std::time::Duration;

use async_trait::async_trait;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use super::{Attachment, ObjectStorage, UploadCategory, object_key};
use crate::config::StorageConfig;
use crate::error::UploadError;

/// Validity of each presigned upload URL.
const PRESIGN_TTL: Duration = Duration::from_secs(300);

/// Long-lived storage client; one `reqwest::Client` shared across uploads.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    bucket: Bucket,
    credentials: Credentials,
    public_base_url: String,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig) -> Result<Self, UploadError> {
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            UploadError::InvalidConfig(format!("storage endpoint {:?}: {e}", config.endpoint))
        })?;
        let style = if config.path_style {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };
        let bucket = Bucket::new(endpoint, style, config.bucket.clone(), config.region.clone())
            .map_err(|e| UploadError::InvalidConfig(format!("bucket {}: {e}", config.bucket)))?;
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.expose_secret().to_string(),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("onboarding-portal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            bucket,
            credentials,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Presigned PUT URL for `key`. The public-read ACL header is part of
    /// the signature, so the request must send it unchanged.
    fn upload_url(&self, key: &str) -> reqwest::Url {
        let mut action = self.bucket.put_object(Some(&self.credentials), key);
        action.headers_mut().insert("x-amz-acl", "public-read");
        action.sign(PRESIGN_TTL)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        owner: &str,
        category: UploadCategory,
        attachment: &Attachment,
    ) -> Result<String, UploadError> {
        let key = object_key(owner, category, attachment);

        let resp = self
            .client
            .put(self.upload_url(&key))
            .header(reqwest::header::CONTENT_TYPE, attachment.content_type.as_str())
            .header("x-amz-acl", "public-read")
            .body(attachment.bytes.clone())
            .send()
            .await
            .map_err(|e| UploadError::Request {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(key = %key, status = status.as_u16(), "Storage rejected upload");
            return Err(UploadError::Rejected {
                key,
                status: status.as_u16(),
                body,
            });
        }

        debug!(key = %key, bytes = attachment.bytes.len(), "Object uploaded");
        Ok(self.public_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config(endpoint: &str) -> StorageConfig {
        StorageConfig {
            bucket: "hr-docs".into(),
            region: "us-east-1".into(),
            endpoint: endpoint.into(),
            path_style: true,
            public_base_url: "https://hr-docs.s3.amazonaws.com/".into(),
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: SecretString::from("wJalrXUtnFEMI".to_string()),
        }
    }

    #[test]
    fn path_style_upload_url_is_presigned() {
        let storage = HttpObjectStorage::new(&config("http://127.0.0.1:9000")).unwrap();
        let url = storage.upload_url("documents/doc_u1_ab.pdf");

        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.path(), "/hr-docs/documents/doc_u1_ab.pdf");
        let query = url.query().unwrap_or_default();
        assert!(query.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"), "{query}");
        assert!(query.contains("X-Amz-Credential=AKIDEXAMPLE"), "{query}");
        assert!(query.contains("X-Amz-Signature="), "{query}");
        assert!(query.contains("x-amz-acl"), "{query}");
        assert!(!query.contains("wJalrXUtnFEMI"));

        assert_eq!(
            storage.public_url("documents/doc_u1_ab.pdf"),
            "https://hr-docs.s3.amazonaws.com/documents/doc_u1_ab.pdf"
        );
    }

    #[test]
    fn virtual_host_upload_url_targets_bucket_host() {
        let mut cfg = config("https://s3.eu-west-1.amazonaws.com");
        cfg.region = "eu-west-1".into();
        cfg.path_style = false;
        let storage = HttpObjectStorage::new(&cfg).unwrap();
        let url = storage.upload_url("profiles/profile_u1_ab.png");

        assert_eq!(url.host_str(), Some("hr-docs.s3.eu-west-1.amazonaws.com"));
        assert_eq!(url.path(), "/profiles/profile_u1_ab.png");
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(matches!(
            HttpObjectStorage::new(&config("")),
            Err(UploadError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpObjectStorage::new(&config("not a url")),
            Err(UploadError::InvalidConfig(_))
        ));
    }

    /// A recorded PUT: (path, query, content type).
    type Seen = std::sync::Arc<std::sync::Mutex<Vec<(String, String, String)>>>;

    /// Spawn a bucket stub that records PUTs and answers with `status`.
    async fn spawn_bucket(status: axum::http::StatusCode) -> (String, Seen) {
        use std::sync::{Arc, Mutex};

        use axum::Router;
        use axum::extract::{Path, RawQuery, State};
        use axum::http::HeaderMap;
        use axum::routing::put;

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/{*key}",
                put(
                    move |State(seen): State<Seen>,
                          Path(key): Path<String>,
                          RawQuery(query): RawQuery,
                          headers: HeaderMap| async move {
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        seen.lock()
                            .unwrap()
                            .push((key, query.unwrap_or_default(), content_type));
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://127.0.0.1:{port}"), seen)
    }

    #[tokio::test]
    async fn put_uploads_signed_request_and_returns_public_url() {
        let (endpoint, seen) = spawn_bucket(axum::http::StatusCode::OK).await;
        let storage = HttpObjectStorage::new(&config(&endpoint)).unwrap();
        let attachment = Attachment::new("Photo.JPG", "image/jpeg", vec![0xff, 0xd8]);

        let url = storage
            .put("u1", UploadCategory::Profile, &attachment)
            .await
            .unwrap();

        assert!(url.starts_with("https://hr-docs.s3.amazonaws.com/profiles/profile_u1_"));
        assert!(url.ends_with(".jpg"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (key, query, content_type) = &seen[0];
        assert!(key.starts_with("hr-docs/profiles/profile_u1_"), "{key}");
        assert!(query.contains("X-Amz-Signature="), "{query}");
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (endpoint, _seen) = spawn_bucket(axum::http::StatusCode::FORBIDDEN).await;
        let storage = HttpObjectStorage::new(&config(&endpoint)).unwrap();
        let attachment = Attachment::new("cv.pdf", "application/pdf", b"%PDF".to_vec());

        let err = storage
            .put("u1", UploadCategory::Document, &attachment)
            .await
            .unwrap_err();
        match err {
            UploadError::Rejected { status, key, .. } => {
                assert_eq!(status, 403);
                assert!(key.starts_with("documents/doc_u1_"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let storage = HttpObjectStorage::new(&config("http://127.0.0.1:9")).unwrap();
        let attachment = Attachment::new("cv.pdf", "application/pdf", b"%PDF".to_vec());
        let err = storage
            .put("u1", UploadCategory::Document, &attachment)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Request { .. }));
    }
}
