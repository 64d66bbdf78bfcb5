use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;
use voice_domain::{BlobStorePort, DomainError, EncodedBlob, StoredAudio};

#[derive(Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base_url: String,
    pub folder: String,
    pub resource_type: String,
    pub quality: String,
    pub fetch_format: String,
    pub request_timeout: Duration,
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
}

/// Signed multipart uploads to a Cloudinary-compatible endpoint.
pub struct CloudinaryBlobStore {
    client: reqwest::Client,
    settings: CloudinarySettings,
}

impl CloudinaryBlobStore {
    pub fn new(settings: CloudinarySettings) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| DomainError::internal_error(format!("http client: {err}")))?;
        Ok(Self { client, settings })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.settings.api_base_url.trim_end_matches('/'),
            self.settings.cloud_name,
            self.settings.resource_type
        )
    }

    /// Writes the blob to a named temp file carrying the format suffix.
    /// The file is deleted when the handle drops.
    async fn stage(&self, blob: &EncodedBlob) -> Result<NamedTempFile, DomainError> {
        let suffix = format!(".{}", blob.format.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("voice-upload-").suffix(&suffix);

        let staged = match &self.settings.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|err| DomainError::storage_failure(format!("temp file: {err}")))?;

        tokio::fs::write(staged.path(), &blob.bytes)
            .await
            .map_err(|err| DomainError::storage_failure(format!("temp file write: {err}")))?;
        Ok(staged)
    }

    async fn send(&self, path: &Path, blob: &EncodedBlob) -> Result<StoredAudio, DomainError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| DomainError::storage_failure(format!("temp file read: {err}")))?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| DomainError::internal_error(format!("system clock: {err}")))?
            .as_secs()
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("fetch_format", self.settings.fetch_format.clone());
        params.insert("folder", self.settings.folder.clone());
        params.insert("quality", self.settings.quality.clone());
        params.insert("timestamp", timestamp);
        let signature = sign_params(&params, &self.settings.api_secret);

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(blob.format.media_type())
            .map_err(|err| DomainError::storage_failure(format!("multipart: {err}")))?;

        let mut form = Form::new()
            .part("file", part)
            .text("api_key", self.settings.api_key.clone())
            .text("signature", signature);
        for (name, value) in params {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|err| DomainError::storage_failure(format!("upload request: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(DomainError::storage_failure(format!(
                "upload rejected with status {status}: {excerpt}"
            )));
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|err| DomainError::storage_failure(format!("upload response: {err}")))?;

        Ok(StoredAudio {
            url: payload.secure_url,
            public_id: payload.public_id,
            format: payload
                .format
                .unwrap_or_else(|| blob.format.extension().to_string()),
            resource_type: payload.resource_type,
        })
    }
}

#[async_trait]
impl BlobStorePort for CloudinaryBlobStore {
    async fn upload(&self, blob: EncodedBlob) -> Result<StoredAudio, DomainError> {
        let staged = self.stage(&blob).await?;
        tracing::debug!(
            path = %staged.path().display(),
            bytes = blob.len(),
            folder = %self.settings.folder,
            "staged audio for upload"
        );

        let result = self.send(staged.path(), &blob).await;
        drop(staged);

        match &result {
            Ok(stored) => tracing::info!(public_id = %stored.public_id, "uploaded audio"),
            Err(err) => tracing::error!(error = %err, "audio upload failed"),
        }
        result
    }
}

/// `sha1("k1=v1&k2=v2..." + secret)` over the parameters in key order.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{
        extract::{Multipart, State},
        http::StatusCode,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use voice_domain::{AudioFormat, BlobStorePort, DomainError, EncodedBlob};

    use super::{sign_params, CloudinaryBlobStore, CloudinarySettings};

    type SeenFields = Arc<Mutex<Vec<String>>>;

    async fn accept_upload(
        State(seen): State<SeenFields>,
        mut multipart: Multipart,
    ) -> Json<Value> {
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            seen.lock().expect("fields lock").push(name);
        }
        Json(json!({
            "secure_url": "https://res.example/demo/audio_processing/abc.mp3",
            "public_id": "audio_processing/abc",
            "format": "mp3",
            "resource_type": "video"
        }))
    }

    async fn reject_upload() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }

    async fn spawn_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server");
        });
        format!("http://{addr}")
    }

    fn settings(api_base_url: String, temp_dir: &std::path::Path) -> CloudinarySettings {
        CloudinarySettings {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "test-secret".to_string(),
            api_base_url,
            folder: "audio_processing".to_string(),
            resource_type: "auto".to_string(),
            quality: "auto:low".to_string(),
            fetch_format: "auto".to_string(),
            request_timeout: Duration::from_secs(5),
            temp_dir: Some(temp_dir.to_path_buf()),
        }
    }

    fn blob() -> EncodedBlob {
        EncodedBlob::new(vec![0xFF, 0xFB, 0x90, 0x00], AudioFormat::Mp3)
    }

    fn staged_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).expect("read temp dir").count()
    }

    #[test]
    fn signature_is_sha1_of_sorted_params_and_secret() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample_image".to_string());
        params.insert("eager", "w_400,h_300,c_pad|w_260,h_200,c_crop".to_string());

        let signature = sign_params(&params, "abcd");

        assert_eq!(signature, "bfd09f95f331f558cbd1320e67aa8d488770583e");
    }

    #[tokio::test]
    async fn staged_file_keeps_format_suffix_and_bytes() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = CloudinaryBlobStore::new(settings(
            "http://127.0.0.1:9".to_string(),
            temp_dir.path(),
        ))
        .expect("store");

        let staged = store.stage(&blob()).await.expect("staged");

        assert_eq!(
            staged.path().extension().and_then(|ext| ext.to_str()),
            Some("mp3")
        );
        assert_eq!(std::fs::read(staged.path()).expect("read staged"), blob().bytes);
        drop(staged);
        assert_eq!(staged_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn successful_upload_returns_stored_audio_and_cleans_up() {
        let seen = SeenFields::default();
        let router = Router::new()
            .route("/v1_1/{cloud}/{resource_type}/upload", post(accept_upload))
            .with_state(seen.clone());
        let base_url = spawn_server(router).await;
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = CloudinaryBlobStore::new(settings(base_url, temp_dir.path())).expect("store");

        let stored = store.upload(blob()).await.expect("upload succeeds");

        assert_eq!(stored.url, "https://res.example/demo/audio_processing/abc.mp3");
        assert_eq!(stored.public_id, "audio_processing/abc");
        assert_eq!(stored.format, "mp3");
        assert_eq!(stored.resource_type.as_deref(), Some("video"));

        let fields = seen.lock().expect("fields lock").clone();
        for expected in ["file", "api_key", "signature", "timestamp", "folder", "quality"] {
            assert!(fields.iter().any(|name| name == expected), "missing {expected}");
        }
        assert_eq!(staged_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn rejected_upload_is_storage_failure_and_removes_temp_file() {
        let router = Router::new().route("/v1_1/{cloud}/{resource_type}/upload", post(reject_upload));
        let base_url = spawn_server(router).await;
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = CloudinaryBlobStore::new(settings(base_url, temp_dir.path())).expect("store");

        let error = store.upload(blob()).await.expect_err("upload rejected");

        assert!(matches!(error, DomainError::StorageFailure(_)));
        assert!(!error.to_string().contains("test-secret"));
        assert_eq!(staged_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn unreachable_store_is_storage_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = CloudinaryBlobStore::new(settings(format!("http://{addr}"), temp_dir.path()))
            .expect("store");

        let error = store.upload(blob()).await.expect_err("connection refused");

        assert!(matches!(error, DomainError::StorageFailure(_)));
        assert_eq!(staged_files(temp_dir.path()), 0);
    }
}
