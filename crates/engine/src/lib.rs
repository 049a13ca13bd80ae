pub mod config;
pub mod error;
pub mod projector;
pub mod retry;

pub use config::GalleryConfig;
pub use error::{EngineError, Missing};
pub use projector::{GroupingProjector, ParentGallery};
pub use retry::{RetryConfig, RetryPolicy};

use std::sync::Arc;

use tracing::{debug, info, warn};

use gallery_core::{FlagName, FlagRegistry, ParentId, ResourceId, ResourceRecord};
use gallery_storage::ResourceStore;

/// Outcome of a successful `set_winner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerChange {
    pub parent_id: ParentId,
    pub resource_id: ResourceId,
    pub flag: FlagName,
    /// Resources that held the flag before this unit of work committed.
    pub displaced: Vec<ResourceId>,
}

impl WinnerChange {
    /// `false` when the call only re-asserted the existing winner.
    pub fn changed(&self) -> bool {
        !self.displaced.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedResource {
    pub record: ResourceRecord,
    /// Flags granted by the auto-assign policy.
    pub flags: Vec<FlagName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub flag: FlagName,
    /// `None` when the parent has no resources left to promote.
    pub promoted: Option<ResourceId>,
}

/// What a deletion did to the winners of its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub parent_id: ParentId,
    pub deleted: ResourceId,
    pub promotions: Vec<Promotion>,
}

/// The single choke point for winner-flag mutations.
///
/// Every operation runs as one unit of work against the resource store, so
/// after a successful call each flag of the touched parent has at most one
/// winner, and a failed call leaves the prior state in place.
#[derive(Clone)]
pub struct FlagEngine {
    store: ResourceStore,
    registry: Arc<FlagRegistry>,
    auto_assign: Arc<Vec<FlagName>>,
    retry: RetryPolicy,
}

impl FlagEngine {
    /// An engine with every registered flag auto-assigned and the default
    /// retry policy.
    pub fn new(store: ResourceStore, registry: FlagRegistry) -> Self {
        let auto_assign = registry.iter().cloned().collect();
        Self {
            store,
            registry: Arc::new(registry),
            auto_assign: Arc::new(auto_assign),
            retry: RetryPolicy::default(),
        }
    }

    pub async fn open(config: &GalleryConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let store = ResourceStore::open(&config.store).await?;
        Self::with_store(store, config)
    }

    /// An engine over an already open store, with flags, auto-assign and
    /// retry taken from `config`. The `[store]` section is not consulted.
    pub fn with_store(store: ResourceStore, config: &GalleryConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let registry = config.registry()?;
        let auto_assign = config.auto_assign_flags(&registry)?;
        Ok(Self {
            store,
            registry: Arc::new(registry),
            auto_assign: Arc::new(auto_assign),
            retry: config.retry_policy(),
        })
    }

    pub fn with_auto_assign<I, S>(mut self, names: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let flags = names
            .into_iter()
            .map(|name| self.resolve(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.auto_assign = Arc::new(flags);
        Ok(self)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &FlagRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn projector(&self) -> GroupingProjector {
        GroupingProjector::new(self.store.clone(), self.registry.clone())
    }

    fn resolve(&self, flag: &str) -> Result<FlagName, EngineError> {
        self.registry
            .resolve(flag)
            .map_err(|_| EngineError::UnknownFlag(flag.to_string()))
    }

    /// Record a parent. Returns `true` if it was not known before.
    pub async fn register_parent(&self, parent_id: ParentId) -> Result<bool, EngineError> {
        self.store
            .run_atomic(parent_id, |unit| Ok::<_, EngineError>(unit.register_parent()?))
            .await
    }

    /// Attach a new resource to an existing parent. Flags in the auto-assign
    /// set that have no winner under the parent go to the new resource in the
    /// same unit of work.
    pub async fn attach_resource(
        &self,
        parent_id: ParentId,
        url: &str,
    ) -> Result<AttachedResource, EngineError> {
        let url = url.to_string();
        let auto_assign = self.auto_assign.clone();
        let attached = self
            .store
            .run_atomic(parent_id, move |unit| {
                if !unit.parent_exists()? {
                    return Err(EngineError::NotFound(Missing::Parent(parent_id)));
                }
                let record = unit.insert_resource(&url)?;
                let mut flags = Vec::new();
                for flag in auto_assign.iter() {
                    if unit.winner(flag)?.is_none() {
                        unit.set_flag(record.resource_id, flag)?;
                        flags.push(flag.clone());
                    }
                }
                Ok(AttachedResource { record, flags })
            })
            .await?;
        debug!(
            %parent_id,
            resource_id = %attached.record.resource_id,
            flags = ?attached.flags,
            "resource attached"
        );
        Ok(attached)
    }

    /// Make `resource_id` the only resource under `parent_id` with `flag` set.
    ///
    /// Clearing the other holders and setting the new one happen in the same
    /// unit of work; no state with zero or two winners is ever committed.
    /// Calling it again with the same arguments re-asserts the same state.
    pub async fn set_winner(
        &self,
        parent_id: ParentId,
        resource_id: ResourceId,
        flag: &str,
    ) -> Result<WinnerChange, EngineError> {
        let flag = self.resolve(flag)?;
        let change = self
            .store
            .run_atomic(parent_id, move |unit| {
                if !unit.parent_exists()? {
                    return Err(EngineError::NotFound(Missing::Parent(parent_id)));
                }
                let record = unit
                    .resource(resource_id)?
                    .ok_or(EngineError::NotFound(Missing::Resource(resource_id)))?;
                if record.parent_id != parent_id {
                    return Err(EngineError::Mismatch {
                        resource_id,
                        expected: parent_id,
                        actual: record.parent_id,
                    });
                }
                let displaced = unit.clear_flag(&flag, Some(resource_id))?;
                unit.set_flag(resource_id, &flag)?;
                Ok(WinnerChange {
                    parent_id,
                    resource_id,
                    flag,
                    displaced,
                })
            })
            .await?;
        if change.changed() {
            info!(
                %parent_id,
                %resource_id,
                flag = %change.flag,
                displaced = ?change.displaced,
                "winner changed"
            );
        }
        Ok(change)
    }

    /// `set_winner`, retrying transaction failures under `policy`. Every
    /// other error is returned on the first attempt.
    pub async fn set_winner_with_retry(
        &self,
        policy: &RetryPolicy,
        parent_id: ParentId,
        resource_id: ResourceId,
        flag: &str,
    ) -> Result<WinnerChange, EngineError> {
        let mut attempt = 1;
        loop {
            match self.set_winner(parent_id, resource_id, flag).await {
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!(%parent_id, attempt, ?delay, "set_winner failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Unset `flag` under `parent_id`, leaving the parent without a winner.
    /// Returns the resource that held it, if any.
    pub async fn clear_winner(
        &self,
        parent_id: ParentId,
        flag: &str,
    ) -> Result<Option<ResourceId>, EngineError> {
        let flag = self.resolve(flag)?;
        let cleared = self
            .store
            .run_atomic(parent_id, move |unit| {
                if !unit.parent_exists()? {
                    return Err(EngineError::NotFound(Missing::Parent(parent_id)));
                }
                Ok(unit.clear_flag(&flag, None)?.into_iter().next())
            })
            .await?;
        if let Some(resource_id) = cleared {
            info!(%parent_id, %resource_id, "winner cleared");
        }
        Ok(cleared)
    }

    pub async fn winner(
        &self,
        parent_id: ParentId,
        flag: &str,
    ) -> Result<Option<ResourceId>, EngineError> {
        let flag = self.resolve(flag)?;
        let winner = self
            .store
            .read_snapshot(move |snap| {
                if !snap.parent_exists(parent_id)? {
                    return Err(EngineError::NotFound(Missing::Parent(parent_id)));
                }
                Ok(snap.winner(parent_id, &flag)?)
            })
            .await?;
        Ok(winner)
    }

    /// Remove a resource whose file has already been deleted, and reconcile
    /// its parent's winners in the same unit of work: each flag the resource
    /// held moves to the remaining resource with the lowest order key, or
    /// stays unset if none remain.
    pub async fn on_resource_deleted(
        &self,
        resource_id: ResourceId,
    ) -> Result<Reconciliation, EngineError> {
        // parent_id never changes, so locating it outside the unit of work is safe.
        let record = self
            .store
            .read_snapshot(move |snap| snap.resource(resource_id))
            .await?
            .ok_or(EngineError::NotFound(Missing::Resource(resource_id)))?;
        let parent_id = record.parent_id;

        let reconciliation = self
            .store
            .run_atomic(parent_id, move |unit| {
                if unit.resource(resource_id)?.is_none() {
                    return Err(EngineError::NotFound(Missing::Resource(resource_id)));
                }
                let held = unit.flags_of(resource_id)?;
                unit.delete_resource(resource_id)?;

                let mut promotions = Vec::with_capacity(held.len());
                let successor = unit.first_by_order_key()?;
                for flag in held {
                    if let Some(next) = successor {
                        unit.set_flag(next, &flag)?;
                    }
                    promotions.push(Promotion {
                        flag,
                        promoted: successor,
                    });
                }
                Ok(Reconciliation {
                    parent_id,
                    deleted: resource_id,
                    promotions,
                })
            })
            .await?;

        for promotion in &reconciliation.promotions {
            match promotion.promoted {
                Some(next) => info!(%parent_id, flag = %promotion.flag, promoted = %next, "winner reconciled after deletion"),
                None => warn!(%parent_id, flag = %promotion.flag, "last resource deleted, flag left unset"),
            }
        }
        Ok(reconciliation)
    }
}
