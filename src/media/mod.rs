//! Hosted media storage integration (Cloudinary).
//!
//! Audio bytes are relayed as-is to Cloudinary's upload API and referenced by
//! the returned durable URL + public id; nothing is stored locally. Uploads
//! are signed server-side (SHA-256 request signature), so no unsigned preset
//! is needed.
//!
//! `MediaRelay` is a trait object seam: the gateway holds an
//! `Arc<dyn MediaRelay>` so tests can swap in a recording mock.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::MediaConfig;

/// Folder all audio objects are uploaded under.
const UPLOAD_FOLDER: &str = "class-audio";

/// Relay request timeout. Uploads block the request handler, so this bounds
/// client-perceived latency on a stuck relay.
const RELAY_TIMEOUT_SECS: u64 = 60;

/// A stored audio object: durable URL + identifier for later deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAudio {
    pub secure_url: String,
    pub public_id: String,
}

/// Forwarder to the hosted storage service.
#[async_trait]
pub trait MediaRelay: Send + Sync {
    /// Upload raw audio bytes under the given filename. Any transport or
    /// service failure is an error — the caller decides rollback semantics.
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredAudio>;

    /// Best-effort remote delete by public id. Failures are logged by the
    /// implementation and never propagated.
    async fn delete(&self, public_id: &str);
}

/// Success body of Cloudinary's upload endpoint (fields we use).
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

/// Cloudinary-backed media relay.
pub struct CloudinaryRelay {
    config: MediaConfig,
    http: reqwest::Client,
}

impl CloudinaryRelay {
    pub fn new(config: MediaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RELAY_TIMEOUT_SECS))
            .build()?;
        Ok(Self { config, http })
    }

    /// Upload endpoint. Audio lives under Cloudinary's `video` resource type.
    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/video/upload",
            self.config.cloud_name
        )
    }

    fn destroy_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/video/destroy",
            self.config.cloud_name
        )
    }

    /// Request signature: SHA-256 over the alphabetically-sorted signed
    /// params concatenated with the API secret.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        let query = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl MediaRelay for CloudinaryRelay {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredAudio> {
        let timestamp = epoch_secs_string();
        let signature = self.sign(&[
            ("folder", UPLOAD_FOLDER),
            ("public_id", filename),
            ("timestamp", &timestamp),
        ]);

        let file_part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("folder", UPLOAD_FOLDER)
            .text("public_id", filename.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let resp = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Audio upload failed ({status}): {body}");
        }

        let uploaded: UploadResponse = resp.json().await?;
        tracing::debug!(public_id = %uploaded.public_id, "Audio uploaded");
        Ok(StoredAudio {
            secure_url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) {
        let timestamp = epoch_secs_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let form = reqwest::multipart::Form::new()
            .text("public_id", public_id.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let result = self
            .http
            .post(self.destroy_url())
            .multipart(form)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(public_id, "Remote audio deleted");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(public_id, "Remote audio delete failed ({status}): {body}");
            }
            Err(e) => {
                tracing::warn!(public_id, "Remote audio delete failed: {e}");
            }
        }
    }
}

fn epoch_secs_string() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_relay() -> CloudinaryRelay {
        CloudinaryRelay::new(MediaConfig {
            cloud_name: "demo".into(),
            api_key: "key-123".into(),
            api_secret: "secret-abc".into(),
        })
        .unwrap()
    }

    #[test]
    fn upload_url_targets_video_resource() {
        let relay = test_relay();
        assert_eq!(
            relay.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/video/upload"
        );
        assert_eq!(
            relay.destroy_url(),
            "https://api.cloudinary.com/v1_1/demo/video/destroy"
        );
    }

    #[test]
    fn signature_is_order_independent() {
        let relay = test_relay();
        let a = relay.sign(&[("folder", "class-audio"), ("timestamp", "1700000000")]);
        let b = relay.sign(&[("timestamp", "1700000000"), ("folder", "class-audio")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex sha256
    }

    #[test]
    fn signature_depends_on_secret() {
        let relay_a = test_relay();
        let relay_b = CloudinaryRelay::new(MediaConfig {
            cloud_name: "demo".into(),
            api_key: "key-123".into(),
            api_secret: "other-secret".into(),
        })
        .unwrap();
        let params = [("public_id", "class-audio/x"), ("timestamp", "1700000000")];
        assert_ne!(relay_a.sign(&params), relay_b.sign(&params));
    }

    #[test]
    fn upload_response_deserializes() {
        let json = r#"{
            "public_id": "class-audio/1700000000-class1",
            "secure_url": "https://res.cloudinary.com/demo/video/upload/v1/class-audio/x.mp3",
            "bytes": 1024,
            "resource_type": "video"
        }"#;
        let parsed: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.public_id, "class-audio/1700000000-class1");
        assert!(parsed.secure_url.starts_with("https://"));
    }
}
