use rusqlite::Transaction;

use gallery_core::{FlagName, ParentId, ResourceId, ResourceRecord};

use crate::error::StorageError;
use crate::queries;

/// The statements of one logical change, bound to a single open transaction.
///
/// A unit of work is scoped to one parent: every mutating statement filters
/// on that parent, so a unit of work cannot touch another parent's rows.
/// Commit and rollback belong to [`crate::ResourceStore::run_atomic`].
pub struct UnitOfWork<'conn> {
    pub(crate) tx: Transaction<'conn>,
    pub(crate) scope: ParentId,
}

impl UnitOfWork<'_> {
    pub fn parent_exists(&self) -> Result<bool, StorageError> {
        queries::parent_exists(&self.tx, self.scope)
    }

    /// Returns `true` if the parent was newly recorded.
    pub fn register_parent(&self) -> Result<bool, StorageError> {
        queries::insert_parent(&self.tx, self.scope)
    }

    /// Look up any resource. The record carries its parent so callers can
    /// tell a missing resource from one under a different parent.
    pub fn resource(&self, resource_id: ResourceId) -> Result<Option<ResourceRecord>, StorageError> {
        queries::resource(&self.tx, resource_id)
    }

    pub fn insert_resource(&self, url: &str) -> Result<ResourceRecord, StorageError> {
        queries::insert_resource(&self.tx, self.scope, url)
    }

    /// Deletes the row and, by cascade, its flags.
    pub fn delete_resource(&self, resource_id: ResourceId) -> Result<bool, StorageError> {
        queries::delete_resource(&self.tx, self.scope, resource_id)
    }

    pub fn first_by_order_key(&self) -> Result<Option<ResourceId>, StorageError> {
        queries::first_by_order_key(&self.tx, self.scope)
    }

    pub fn winner(&self, flag: &FlagName) -> Result<Option<ResourceId>, StorageError> {
        queries::winner(&self.tx, self.scope, flag)
    }

    pub fn flags_of(&self, resource_id: ResourceId) -> Result<Vec<FlagName>, StorageError> {
        queries::flags_of(&self.tx, resource_id)
    }

    pub fn clear_flag(
        &self,
        flag: &FlagName,
        keep: Option<ResourceId>,
    ) -> Result<Vec<ResourceId>, StorageError> {
        queries::clear_flag(&self.tx, self.scope, flag, keep)
    }

    pub fn set_flag(&self, resource_id: ResourceId, flag: &FlagName) -> Result<bool, StorageError> {
        queries::set_flag(&self.tx, self.scope, resource_id, flag)
    }
}

/// A read-only view over one consistent snapshot of the store.
pub struct Snapshot<'conn> {
    pub(crate) tx: Transaction<'conn>,
}

impl Snapshot<'_> {
    pub fn parents(&self) -> Result<Vec<ParentId>, StorageError> {
        queries::parents(&self.tx)
    }

    pub fn parent_exists(&self, parent_id: ParentId) -> Result<bool, StorageError> {
        queries::parent_exists(&self.tx, parent_id)
    }

    pub fn resource(&self, resource_id: ResourceId) -> Result<Option<ResourceRecord>, StorageError> {
        queries::resource(&self.tx, resource_id)
    }

    /// All resources, ascending by order key.
    pub fn resources(&self) -> Result<Vec<ResourceRecord>, StorageError> {
        queries::all_resources(&self.tx)
    }

    pub fn resources_of(&self, parent_id: ParentId) -> Result<Vec<ResourceRecord>, StorageError> {
        queries::resources_of(&self.tx, parent_id)
    }

    pub fn winner(
        &self,
        parent_id: ParentId,
        flag: &FlagName,
    ) -> Result<Option<ResourceId>, StorageError> {
        queries::winner(&self.tx, parent_id, flag)
    }

    pub fn flags_of(&self, resource_id: ResourceId) -> Result<Vec<FlagName>, StorageError> {
        queries::flags_of(&self.tx, resource_id)
    }

    pub fn flags(&self) -> Result<Vec<(ResourceId, String)>, StorageError> {
        queries::all_flags(&self.tx)
    }
}
