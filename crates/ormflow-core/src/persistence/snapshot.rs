//! Change-tracking snapshots.

use std::collections::{BTreeMap, BTreeSet};

use ormflow_proto::Value;

use crate::entity::{EntityRef, Related, Snapshot};
use crate::error::Result;
use crate::metadata::{EntityKey, EntityMetadata, MetadataRegistry};

/// Record the current column values, foreign keys and loaded relation
/// membership of an instance as its persisted state.
pub(crate) fn take_snapshot(registry: &MetadataRegistry, entity: &EntityRef) -> Result<()> {
    let (name, values, foreign_keys, relations) = {
        let data = entity.read();
        (
            data.entity_name().to_string(),
            data.values().clone(),
            data.foreign_keys().clone(),
            data.relations().clone(),
        )
    };
    let meta = registry.entity(&name)?;

    let mut members = BTreeMap::new();
    for (property, value) in relations {
        let Some(relation) = meta.relation(&property) else {
            continue;
        };
        let Some(related) = value.resolved() else {
            continue;
        };
        let target = registry.target_of(relation)?;
        members.insert(property, member_keys(target, &related));
    }

    entity.write().set_snapshot(Some(Snapshot {
        values,
        foreign_keys,
        members,
    }));
    Ok(())
}

/// Primary keys of the related entities that have one.
pub(crate) fn member_keys(target: &EntityMetadata, related: &Related) -> BTreeSet<EntityKey> {
    related
        .entities()
        .iter()
        .filter_map(|entity| target.entity_key(&entity.read()))
        .collect()
}

/// Value equality that ignores integer width.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    a == b || a.same_key(b) || (a.is_null() && b.is_null())
}
