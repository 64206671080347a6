use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::features::recommendation_store::repo::{
    is_recommendation_key, RecommendationRepository, RECOMMENDATION_KEY_PREFIX,
};
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::Recommendation;

/// Recommendation store kept as one JSON file per cluster under a data
/// directory. Writes go to a uniquely named temp file first and are renamed
/// into place, so a reader sees either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FileRecommendationRepository {
    data_dir: PathBuf,
}

impl FileRecommendationRepository {
    /// Open the store, creating the data directory if needed.
    pub async fn open(data_dir: impl Into<PathBuf>) -> SpotterResult<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
            SpotterError::StoreUnavailable(format!(
                "cannot create store directory {}: {e}",
                data_dir.display()
            ))
        })?;

        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> SpotterResult<PathBuf> {
        if !is_recommendation_key(key) {
            return Err(SpotterError::InvalidRequest(format!(
                "disallowed store key: {key}"
            )));
        }
        let cluster = &key[RECOMMENDATION_KEY_PREFIX.len()..];
        Ok(self.data_dir.join(format!("{cluster}.json")))
    }
}

#[async_trait]
impl RecommendationRepository for FileRecommendationRepository {
    async fn put(&self, key: &str, recommendation: &Recommendation) -> SpotterResult<()> {
        let path = self.path_for(key)?;
        let temp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));

        let content = recommendation
            .to_json()
            .map_err(|e| SpotterError::StoreUnavailable(e.to_string()))?;

        tokio::fs::write(&temp_path, content).await.map_err(|e| {
            SpotterError::StoreUnavailable(format!("write {}: {e}", temp_path.display()))
        })?;

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(SpotterError::StoreUnavailable(format!(
                "rename into {}: {e}",
                path.display()
            )));
        }

        debug!(path = %path.display(), "Stored recommendation");
        Ok(())
    }

    async fn get(&self, key: &str) -> SpotterResult<Option<Recommendation>> {
        let path = self.path_for(key)?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SpotterError::StoreUnavailable(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        Recommendation::from_json(&raw).map(Some).map_err(|e| {
            SpotterError::StoreUnavailable(format!("{} is unreadable: {e}", path.display()))
        })
    }
}
