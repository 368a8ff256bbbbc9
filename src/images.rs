//! Per-sensor photo references

use crate::errors::Result;
use crate::store::KeyValueStore;
use std::path::PathBuf;
use tracing::debug;

/// One image reference per `(screen, sensor)` pair.
#[derive(Debug)]
pub struct ImageStore {
    store: KeyValueStore,
}

impl ImageStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: KeyValueStore::open(path).await?,
        })
    }

    pub fn key_for(screen: &str, sensor_id: &str) -> String {
        format!("{}_sensor_{}", screen, sensor_id)
    }

    pub fn image(&self, screen: &str, sensor_id: &str) -> Option<&str> {
        self.store.get(&Self::key_for(screen, sensor_id))
    }

    /// `Some` overwrites the reference, `None` removes it.
    pub async fn save_image(
        &mut self,
        screen: &str,
        sensor_id: &str,
        uri: Option<&str>,
    ) -> Result<()> {
        let key = Self::key_for(screen, sensor_id);

        match uri {
            Some(uri) => {
                debug!("Storing image for {}: {}", key, uri);
                self.store.set(key, uri).await
            }
            None => {
                debug!("Removing image for {}", key);
                self.store.remove(&key).await.map(|_| ())
            }
        }
    }
}
