use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use gallery_core::{ParentId, ResourceId};
use gallery_engine::{EngineError, FlagEngine, GalleryConfig, GroupingProjector};
use gallery_storage::{ResourceStore, StoreConfig};
use tempfile::TempDir;

const FAIL_FLAG_INSERTS: &str = "
CREATE TRIGGER IF NOT EXISTS fail_flag_inserts BEFORE INSERT ON resource_flags
BEGIN
    SELECT RAISE(ABORT, 'flag insert rejected');
END;
";

/// A gallery engine over a throwaway store.
pub struct TestGallery {
    pub engine: FlagEngine,
    /// The engine's store, for fixture setup and direct reads.
    pub store: ResourceStore,
    pub projector: GroupingProjector,
    dir: Option<TempDir>,
}

impl TestGallery {
    /// In-memory store with the default flags, single pooled connection.
    pub async fn new() -> Result<Self, EngineError> {
        Self::with_config(GalleryConfig::default(), None).await
    }

    /// File-backed store so several pooled connections share one database.
    pub async fn file_backed(pool_size: u32) -> Result<Self, EngineError> {
        Self::file_backed_with(GalleryConfig::default(), pool_size).await
    }

    pub async fn file_backed_with(
        mut config: GalleryConfig,
        pool_size: u32,
    ) -> Result<Self, EngineError> {
        let dir = tempfile::tempdir()
            .map_err(|e| EngineError::Config(format!("tempdir: {e}")))?;
        config.store = StoreConfig {
            path: Some(dir.path().join("gallery.db")),
            pool_size,
            ..config.store
        };
        Self::with_config(config, Some(dir)).await
    }

    async fn with_config(config: GalleryConfig, dir: Option<TempDir>) -> Result<Self, EngineError> {
        crate::init_tracing();
        let store = ResourceStore::open(&config.store).await?;
        let engine = FlagEngine::with_store(store.clone(), &config)?;
        let projector = engine.projector();
        Ok(Self {
            engine,
            store,
            projector,
            dir,
        })
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.path().join("gallery.db"))
    }

    /// Register a fresh parent.
    pub async fn property(&self) -> Result<ParentId, EngineError> {
        let parent_id = ParentId::new();
        self.engine.register_parent(parent_id).await?;
        Ok(parent_id)
    }

    pub async fn image(&self, parent_id: ParentId, url: &str) -> Result<ResourceId, EngineError> {
        Ok(self.engine.attach_resource(parent_id, url).await?.record.resource_id)
    }

    /// A parent with `count` images attached in order.
    pub async fn property_with_images(
        &self,
        count: usize,
    ) -> Result<(ParentId, Vec<ResourceId>), EngineError> {
        let parent_id = self.property().await?;
        let mut images = Vec::with_capacity(count);
        for i in 0..count {
            images.push(self.image(parent_id, &format!("https://cdn.example/{parent_id}/{i}.jpg")).await?);
        }
        Ok((parent_id, images))
    }

    /// Every resource of the parent with the flags it currently holds.
    pub async fn flag_state(
        &self,
        parent_id: ParentId,
    ) -> Result<BTreeMap<ResourceId, BTreeSet<String>>, EngineError> {
        self.store
            .read_snapshot(move |snap| {
                let mut state = BTreeMap::new();
                for record in snap.resources_of(parent_id)? {
                    let flags = snap
                        .flags_of(record.resource_id)?
                        .into_iter()
                        .map(String::from)
                        .collect();
                    state.insert(record.resource_id, flags);
                }
                Ok::<_, EngineError>(state)
            })
            .await
    }

    /// Resources of the parent currently holding `flag`.
    pub async fn holders(&self, parent_id: ParentId, flag: &str) -> Result<Vec<ResourceId>, EngineError> {
        Ok(self
            .flag_state(parent_id)
            .await?
            .into_iter()
            .filter(|(_, flags)| flags.contains(flag))
            .map(|(id, _)| id)
            .collect())
    }

    /// Make every insert into the flag table fail until restored.
    pub async fn fail_flag_inserts(&self) -> Result<(), EngineError> {
        Ok(self.store.execute_batch(FAIL_FLAG_INSERTS).await?)
    }

    pub async fn restore_flag_inserts(&self) -> Result<(), EngineError> {
        Ok(self
            .store
            .execute_batch("DROP TRIGGER IF EXISTS fail_flag_inserts;")
            .await?)
    }
}
