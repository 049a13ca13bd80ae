use std::collections::BTreeMap;

use serde::Serialize;

use crate::ids::{ParentId, ResourceId};

/// A resource row as persisted. Flags live in their own table and are joined
/// in by the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub resource_id: ResourceId,
    pub parent_id: ParentId,
    pub url: String,
    pub order_key: i64,
}

/// A resource annotated with its current state for every registered flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    pub resource_id: ResourceId,
    pub url: String,
    pub order_key: i64,
    pub flags: BTreeMap<String, bool>,
}

impl ResourceView {
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
