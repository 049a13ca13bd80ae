//! Read-side projection of resources grouped by parent.
//!
//! Purely derived from one store snapshot; it never repairs anything. A
//! parent that has resources but no winner for some flag is reported in
//! [`ParentGallery::missing_winners`] so the admin console can ask someone to
//! pick one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use gallery_core::{FlagName, FlagRegistry, ParentId, ResourceId, ResourceRecord, ResourceView};
use gallery_storage::ResourceStore;

use crate::error::{EngineError, Missing};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentGallery {
    pub parent_id: ParentId,
    /// Flagged resources first, in registry priority order, then by order key.
    pub resources: Vec<ResourceView>,
    /// Registered flags with no winner. Always empty for a parent with no
    /// resources.
    pub missing_winners: Vec<FlagName>,
}

impl ParentGallery {
    pub fn winner(&self, flag: &str) -> Option<&ResourceView> {
        self.resources.iter().find(|r| r.has_flag(flag))
    }

    pub fn require_winners(&self) -> Result<(), EngineError> {
        match self.missing_winners.first() {
            Some(flag) => Err(EngineError::InvariantViolationDetected {
                parent_id: self.parent_id,
                flag: flag.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct GroupingProjector {
    store: ResourceStore,
    registry: Arc<FlagRegistry>,
}

impl GroupingProjector {
    pub fn new(store: ResourceStore, registry: Arc<FlagRegistry>) -> Self {
        Self { store, registry }
    }

    /// Every known parent, including those without resources.
    pub async fn list_by_parent(&self) -> Result<BTreeMap<ParentId, ParentGallery>, EngineError> {
        let (parents, records, flags) = self
            .store
            .read_snapshot(|snap| Ok::<_, EngineError>((snap.parents()?, snap.resources()?, snap.flags()?)))
            .await?;

        let flags = index_flags(flags);
        let mut grouped: BTreeMap<ParentId, Vec<ResourceRecord>> =
            parents.into_iter().map(|p| (p, Vec::new())).collect();
        for record in records {
            grouped.entry(record.parent_id).or_default().push(record);
        }
        Ok(grouped
            .into_iter()
            .map(|(parent_id, records)| {
                (parent_id, project(&self.registry, parent_id, records, &flags))
            })
            .collect())
    }

    pub async fn list_for_parent(&self, parent_id: ParentId) -> Result<ParentGallery, EngineError> {
        let (records, flags) = self
            .store
            .read_snapshot(move |snap| {
                if !snap.parent_exists(parent_id)? {
                    return Err(EngineError::NotFound(Missing::Parent(parent_id)));
                }
                let records = snap.resources_of(parent_id)?;
                let mut flags = Vec::new();
                for record in &records {
                    for flag in snap.flags_of(record.resource_id)? {
                        flags.push((record.resource_id, String::from(flag)));
                    }
                }
                Ok((records, flags))
            })
            .await?;
        Ok(project(&self.registry, parent_id, records, &index_flags(flags)))
    }

    /// Surface the first missing winner of `parent_id` as an error.
    pub async fn check(&self, parent_id: ParentId) -> Result<(), EngineError> {
        self.list_for_parent(parent_id).await?.require_winners()
    }
}

fn index_flags(flags: Vec<(ResourceId, String)>) -> HashMap<ResourceId, BTreeSet<String>> {
    let mut index: HashMap<ResourceId, BTreeSet<String>> = HashMap::new();
    for (resource_id, flag) in flags {
        index.entry(resource_id).or_default().insert(flag);
    }
    index
}

fn project(
    registry: &FlagRegistry,
    parent_id: ParentId,
    records: Vec<ResourceRecord>,
    flags: &HashMap<ResourceId, BTreeSet<String>>,
) -> ParentGallery {
    let empty = BTreeSet::new();
    let mut resources: Vec<ResourceView> = records
        .into_iter()
        .map(|record| {
            let held = flags.get(&record.resource_id).unwrap_or(&empty);
            ResourceView {
                resource_id: record.resource_id,
                url: record.url,
                order_key: record.order_key,
                flags: registry
                    .iter()
                    .map(|f| (f.to_string(), held.contains(f.as_str())))
                    .collect(),
            }
        })
        .collect();

    // `false` sorts first, so holders of higher-priority flags lead.
    resources.sort_by_key(|view| {
        let rank: Vec<bool> = registry.iter().map(|f| !view.has_flag(f.as_str())).collect();
        (rank, view.order_key)
    });

    let missing_winners = if resources.is_empty() {
        Vec::new()
    } else {
        registry
            .iter()
            .filter(|f| !resources.iter().any(|r| r.has_flag(f.as_str())))
            .cloned()
            .collect()
    };

    ParentGallery {
        parent_id,
        resources,
        missing_winners,
    }
}
