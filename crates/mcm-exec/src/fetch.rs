use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("unknown runtime version: {0}")]
    UnknownVersion(String),
    #[error("runtime version {0} has no server download")]
    NoServerDownload(String),
}

/// Source of runtime artifacts.
#[async_trait]
pub trait RuntimeFetcher: Send + Sync + 'static {
    /// Artifact bytes for the version tag `runtime`.
    async fn fetch(&self, runtime: &str) -> Result<Vec<u8>, FetchError>;
}

#[cfg(feature = "fetch")]
pub use mojang::{MANIFEST_URL, MojangFetcher};

#[cfg(feature = "fetch")]
mod mojang {
    use serde::Deserialize;
    use tracing::{debug, instrument};

    use super::*;

    pub const MANIFEST_URL: &str = "https://launchermeta.mojang.com/mc/game/version_manifest.json";

    #[derive(Debug, Deserialize)]
    struct VersionManifest {
        versions: Vec<VersionEntry>,
    }

    #[derive(Debug, Deserialize)]
    struct VersionEntry {
        id: String,
        url: String,
    }

    #[derive(Debug, Deserialize)]
    struct VersionDetails {
        #[serde(default)]
        downloads: Downloads,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Downloads {
        server: Option<Download>,
    }

    #[derive(Debug, Deserialize)]
    struct Download {
        url: String,
    }

    /// Resolves versions through the public launcher manifest.
    #[derive(Clone, Debug)]
    pub struct MojangFetcher {
        client: reqwest::Client,
        manifest_url: String,
    }

    impl MojangFetcher {
        pub fn new(manifest_url: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                manifest_url: manifest_url.into(),
            }
        }

        /// All version ids in the manifest, newest first.
        pub async fn versions(&self) -> Result<Vec<String>, FetchError> {
            let manifest = self.manifest().await?;
            Ok(manifest.versions.into_iter().map(|v| v.id).collect())
        }

        async fn manifest(&self) -> Result<VersionManifest, FetchError> {
            self.get_json(&self.manifest_url).await
        }

        async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(http)?;
            response.json().await.map_err(http)
        }
    }

    impl Default for MojangFetcher {
        fn default() -> Self {
            Self::new(MANIFEST_URL)
        }
    }

    #[async_trait]
    impl RuntimeFetcher for MojangFetcher {
        #[instrument(level = "debug", target = "mcm.exec.fetch", skip(self))]
        async fn fetch(&self, runtime: &str) -> Result<Vec<u8>, FetchError> {
            let manifest = self.manifest().await?;
            let entry = manifest
                .versions
                .into_iter()
                .find(|v| v.id == runtime)
                .ok_or_else(|| FetchError::UnknownVersion(runtime.to_string()))?;

            let details: VersionDetails = self.get_json(&entry.url).await?;
            let download = details
                .downloads
                .server
                .ok_or_else(|| FetchError::NoServerDownload(runtime.to_string()))?;

            debug!(target: "mcm.exec.fetch", url = %download.url, "downloading runtime");
            let bytes = self
                .client
                .get(&download.url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(http)?
                .bytes()
                .await
                .map_err(http)?;

            debug!(target: "mcm.exec.fetch", size = bytes.len(), "runtime downloaded");
            Ok(bytes.to_vec())
        }
    }

    fn http(e: reqwest::Error) -> FetchError {
        FetchError::Http(e.to_string())
    }

}
