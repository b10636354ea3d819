//! In-memory record graph (arena) used as the cascade engine input.
//!
//! # Responsibility
//! - Hold loaded and new records for one unit of work.
//! - Maintain both sides of a relationship through a single mutator.
//! - Remember the link snapshot taken at load/flush time for orphan detection.
//!
//! # Invariants
//! - `NodeId` values are arena indexes and are never reused.
//! - A record identity is assigned at most once, unless the transaction
//!   that assigned it rolls back and `restore` returns the node to transient.
//! - For one-to-one/one-to-many edges, `attach`/`detach` keep the child's
//!   parent pointer and the owner's collection in agreement; only
//!   `overwrite_parent` can make them disagree.

use crate::model::schema::{Cardinality, EdgeSpec, RecordType, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Store-assigned surrogate key.
pub type RecordId = i64;

/// Scalar attributes of one record, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors from invalid arena mutator usage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("unknown arena node {0}")]
    UnknownNode(NodeId),
    #[error("record type `{0}` is not part of the schema")]
    UnknownRecordType(RecordType),
    #[error("edge `{0}` is not an owning edge of the schema")]
    UnknownEdge(String),
    #[error("edge `{edge}` links {expected_source} -> {expected_target}, got {source_type} -> {target_type}")]
    EdgeMismatch {
        edge: &'static str,
        expected_source: RecordType,
        expected_target: RecordType,
        source_type: RecordType,
        target_type: RecordType,
    },
    #[error("{record_type} #{id} is already loaded in this arena")]
    DuplicateIdentity { record_type: RecordType, id: RecordId },
    #[error("arena node {0} was removed")]
    Removed(NodeId),
}

/// Arena handle of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identity of one arena, so undo records only land where they were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(Uuid);

impl Display for ArenaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one record before a plan touched it.
///
/// Held by the transaction the plan ran in and handed back when that
/// transaction (or its savepoint) rolls back.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUndo {
    arena: ArenaId,
    node: NodeId,
    record: Record,
}

impl RecordUndo {
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One record held by the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    record_type: RecordType,
    id: Option<RecordId>,
    attrs: Attributes,
    dirty: bool,
    removed: bool,
    links: BTreeMap<&'static str, Vec<NodeId>>,
    snapshot: BTreeMap<&'static str, Vec<NodeId>>,
    parents: BTreeMap<&'static str, NodeId>,
}

impl Record {
    fn new(record_type: RecordType, id: Option<RecordId>, attrs: Attributes) -> Self {
        Self {
            record_type,
            id,
            attrs,
            dirty: false,
            removed: false,
            links: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            parents: BTreeMap::new(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// No identity yet: the store has never seen this record.
    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Current targets of an owning edge declared on this record.
    pub fn links(&self, edge: &str) -> &[NodeId] {
        self.links.get(edge).map_or(&[][..], Vec::as_slice)
    }

    /// Targets of an owning edge as of the last load or flush.
    pub fn snapshot(&self, edge: &str) -> &[NodeId] {
        self.snapshot.get(edge).map_or(&[][..], Vec::as_slice)
    }

    /// Owner of this record through an owning one-to-one/one-to-many edge.
    pub fn parent(&self, edge: &str) -> Option<NodeId> {
        self.parents.get(edge).copied()
    }

    /// All `(edge, owner)` parent pointers of this record.
    pub fn parents(&self) -> impl Iterator<Item = (&'static str, NodeId)> + '_ {
        self.parents.iter().map(|(edge, node)| (*edge, *node))
    }

    /// Nulls a stored foreign-key attribute once its relationship is gone.
    fn clear_reference_attr(&mut self, join_column: &str) {
        if let Some(value) = self.attrs.get_mut(join_column) {
            *value = AttrValue::Null;
        }
    }
}

/// Arena of records for one unit of work.
#[derive(Debug, Clone)]
pub struct RecordArena {
    id: ArenaId,
    schema: Arc<Schema>,
    records: Vec<Record>,
    identities: HashMap<(RecordType, RecordId), NodeId>,
}

impl RecordArena {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            id: ArenaId(Uuid::new_v4()),
            schema,
            records: Vec::new(),
            identities: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn arena_id(&self) -> ArenaId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a new transient record.
    pub fn create(&mut self, record_type: RecordType) -> ArenaResult<NodeId> {
        self.create_with(record_type, Vec::<(String, AttrValue)>::new())
    }

    /// Adds a new transient record with initial attributes.
    pub fn create_with<K, V>(
        &mut self,
        record_type: RecordType,
        attrs: impl IntoIterator<Item = (K, V)>,
    ) -> ArenaResult<NodeId>
    where
        K: Into<String>,
        V: Into<AttrValue>,
    {
        if !self.schema.contains_type(record_type) {
            return Err(ArenaError::UnknownRecordType(record_type));
        }
        let attrs = attrs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Ok(self.push(Record::new(record_type, None, attrs)))
    }

    /// Adds a persistent, clean record loaded from a store.
    pub fn hydrate(
        &mut self,
        record_type: RecordType,
        id: RecordId,
        attrs: Attributes,
    ) -> ArenaResult<NodeId> {
        if !self.schema.contains_type(record_type) {
            return Err(ArenaError::UnknownRecordType(record_type));
        }
        if self.identities.contains_key(&(record_type, id)) {
            return Err(ArenaError::DuplicateIdentity { record_type, id });
        }
        let node = self.push(Record::new(record_type, Some(id), attrs));
        self.identities.insert((record_type, id), node);
        Ok(node)
    }

    pub fn get(&self, node: NodeId) -> Option<&Record> {
        self.records.get(node.0)
    }

    pub fn record(&self, node: NodeId) -> ArenaResult<&Record> {
        self.records.get(node.0).ok_or(ArenaError::UnknownNode(node))
    }

    pub fn id(&self, node: NodeId) -> Option<RecordId> {
        self.get(node).and_then(Record::id)
    }

    /// Finds a loaded record by identity.
    pub fn find(&self, record_type: RecordType, id: RecordId) -> Option<NodeId> {
        self.identities.get(&(record_type, id)).copied()
    }

    /// Sets one attribute; persistent records become dirty.
    pub fn set_attr(
        &mut self,
        node: NodeId,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> ArenaResult<()> {
        let record = self.live_mut(node)?;
        let key = key.into();
        let value = value.into();
        if record.attrs.get(&key) != Some(&value) {
            record.attrs.insert(key, value);
            record.dirty = record.id.is_some();
        }
        Ok(())
    }

    /// Links `child` under `owner` through an owning edge.
    ///
    /// Both sides are updated together: a to-one edge replaces the previous
    /// target, and a child already owned by another record through the same
    /// edge is moved rather than shared.
    pub fn attach(&mut self, owner: NodeId, edge: &str, child: NodeId) -> ArenaResult<()> {
        let spec = self.checked_edge(owner, edge, child)?;
        match spec.cardinality {
            Cardinality::OneToMany | Cardinality::OneToOne => {
                if spec.cardinality == Cardinality::OneToOne {
                    let previous: Vec<_> = self.records[owner.0]
                        .links(spec.name)
                        .iter()
                        .copied()
                        .filter(|current| *current != child)
                        .collect();
                    for old_child in previous {
                        self.unlink_child(owner, spec.name, old_child);
                    }
                }
                if let Some(old_owner) = self.records[child.0].parent(spec.name) {
                    if old_owner != owner {
                        self.unlink_child(old_owner, spec.name, child);
                    }
                }
                let links = self.records[owner.0].links.entry(spec.name).or_default();
                if !links.contains(&child) {
                    links.push(child);
                }
                let child_record = &mut self.records[child.0];
                if child_record.parents.insert(spec.name, owner) != Some(owner) {
                    child_record.dirty = child_record.id.is_some();
                }
            }
            Cardinality::ManyToOne => {
                let owner_record = &mut self.records[owner.0];
                let links = owner_record.links.entry(spec.name).or_default();
                if links.as_slice() != [child] {
                    *links = vec![child];
                    owner_record.dirty = owner_record.id.is_some();
                }
            }
            Cardinality::ManyToMany => {
                let links = self.records[owner.0].links.entry(spec.name).or_default();
                if !links.contains(&child) {
                    links.push(child);
                }
            }
        }
        Ok(())
    }

    /// Removes `child` from `owner` through an owning edge.
    ///
    /// Returns whether the link existed. The owner's snapshot is untouched,
    /// so the next save sees the removal.
    pub fn detach(&mut self, owner: NodeId, edge: &str, child: NodeId) -> ArenaResult<bool> {
        let spec = self.checked_edge(owner, edge, child)?;
        let existed = self.records[owner.0].links(spec.name).contains(&child);
        match spec.cardinality {
            Cardinality::OneToMany | Cardinality::OneToOne => {
                self.unlink_child(owner, spec.name, child);
            }
            Cardinality::ManyToOne => {
                if existed {
                    let owner_record = &mut self.records[owner.0];
                    owner_record.links.remove(spec.name);
                    owner_record.clear_reference_attr(spec.join_column);
                    owner_record.dirty = owner_record.id.is_some();
                }
            }
            Cardinality::ManyToMany => {
                if let Some(links) = self.records[owner.0].links.get_mut(spec.name) {
                    links.retain(|current| *current != child);
                }
            }
        }
        Ok(existed)
    }

    /// Current targets of an owning edge.
    pub fn children(&self, owner: NodeId, edge: &str) -> &[NodeId] {
        self.get(owner).map_or(&[][..], |record| record.links(edge))
    }

    /// Target of a to-one owning edge declared on `node`.
    pub fn reference(&self, node: NodeId, edge: &str) -> Option<NodeId> {
        self.children(node, edge).first().copied()
    }

    /// Owner of `node` through an owning one-to-one/one-to-many edge.
    pub fn parent(&self, node: NodeId, edge: &str) -> Option<NodeId> {
        self.get(node).and_then(|record| record.parent(edge))
    }

    /// Records an already persisted link, as if it had been loaded.
    pub fn hydrate_link(&mut self, owner: NodeId, edge: &str, child: NodeId) -> ArenaResult<()> {
        self.attach(owner, edge, child)?;
        let name = self.checked_edge(owner, edge, child)?.name;
        let owner_record = &mut self.records[owner.0];
        let snapshot = owner_record.snapshot.entry(name).or_default();
        if !snapshot.contains(&child) {
            snapshot.push(child);
        }
        if owner_record.id.is_some() {
            owner_record.dirty = false;
        }
        let child_record = &mut self.records[child.0];
        if child_record.id.is_some() {
            child_record.dirty = false;
        }
        Ok(())
    }

    /// Writes the inverse pointer of `child` without touching the owner's
    /// collection. Intended for hydrating externally produced state.
    pub fn overwrite_parent(
        &mut self,
        child: NodeId,
        edge: &str,
        parent: Option<NodeId>,
    ) -> ArenaResult<()> {
        let spec = *self
            .schema
            .edge(edge)
            .ok_or_else(|| ArenaError::UnknownEdge(edge.to_string()))?;
        self.record(child)?;
        if let Some(parent) = parent {
            self.record(parent)?;
        }
        let record = &mut self.records[child.0];
        match parent {
            Some(parent) => record.parents.insert(spec.name, parent),
            None => record.parents.remove(spec.name),
        };
        Ok(())
    }

    pub(crate) fn assign_id(&mut self, node: NodeId, id: RecordId) {
        let record = &mut self.records[node.0];
        if record.id.is_none() {
            record.id = Some(id);
            self.identities.insert((record.record_type, id), node);
        }
    }

    /// Takes the flush snapshot: links become the new baseline, dirty clears.
    pub(crate) fn mark_synced(&mut self, node: NodeId) {
        if let Some(record) = self.records.get_mut(node.0) {
            record.snapshot = record.links.clone();
            record.dirty = false;
        }
    }

    /// Flags a deleted record and drops it from its owners' collections.
    pub(crate) fn mark_removed(&mut self, node: NodeId) {
        let Some(record) = self.records.get_mut(node.0) else {
            return;
        };
        record.removed = true;
        record.dirty = false;
        let parents: Vec<_> = record.parents().collect();
        for (edge, owner) in parents {
            let owner_record = &mut self.records[owner.0];
            if let Some(links) = owner_record.links.get_mut(edge) {
                links.retain(|current| *current != node);
            }
            if let Some(snapshot) = owner_record.snapshot.get_mut(edge) {
                snapshot.retain(|current| *current != node);
            }
        }
        self.records[node.0].parents.clear();
    }

    /// Clears the parent pointer of a dependant whose owner is going away.
    pub(crate) fn clear_parent(&mut self, child: NodeId, edge: &'static str) {
        if let Some(owner) = self.parent(child, edge) {
            self.unlink_child(owner, edge, child);
        }
    }

    /// Copies `nodes` and their owners before a plan changes them.
    ///
    /// Owners are included because removing or unlinking a child edits the
    /// owner's collections.
    pub(crate) fn capture(&self, nodes: impl IntoIterator<Item = NodeId>) -> Vec<RecordUndo> {
        let mut seen = HashSet::new();
        let mut undo = Vec::new();
        for node in nodes {
            let Some(record) = self.get(node) else {
                continue;
            };
            let owners = record.parents.values().copied();
            for candidate in std::iter::once(node).chain(owners) {
                if !seen.insert(candidate) {
                    continue;
                }
                if let Some(record) = self.get(candidate) {
                    undo.push(RecordUndo {
                        arena: self.id,
                        node: candidate,
                        record: record.clone(),
                    });
                }
            }
        }
        undo
    }

    /// Puts captured records back, newest capture first so the oldest
    /// state wins.
    ///
    /// Returns the records captured from other arenas, untouched.
    pub(crate) fn restore(&mut self, undo: Vec<RecordUndo>) -> Vec<RecordUndo> {
        let (mine, others): (Vec<_>, Vec<_>) =
            undo.into_iter().partition(|entry| entry.arena == self.id);
        for entry in mine.into_iter().rev() {
            let Some(slot) = self.records.get_mut(entry.node.0) else {
                continue;
            };
            if let Some(id) = slot.id {
                if entry.record.id != Some(id) {
                    self.identities.remove(&(slot.record_type, id));
                }
            }
            if let Some(id) = entry.record.id {
                self.identities
                    .insert((entry.record.record_type, id), entry.node);
            }
            *slot = entry.record;
        }
        others
    }

    fn push(&mut self, record: Record) -> NodeId {
        self.records.push(record);
        NodeId(self.records.len() - 1)
    }

    fn live_mut(&mut self, node: NodeId) -> ArenaResult<&mut Record> {
        let record = self
            .records
            .get_mut(node.0)
            .ok_or(ArenaError::UnknownNode(node))?;
        if record.removed {
            return Err(ArenaError::Removed(node));
        }
        Ok(record)
    }

    fn checked_edge(&self, owner: NodeId, edge: &str, child: NodeId) -> ArenaResult<EdgeSpec> {
        let spec = *self
            .schema
            .edge(edge)
            .ok_or_else(|| ArenaError::UnknownEdge(edge.to_string()))?;
        let owner_record = self.record(owner)?;
        let child_record = self.record(child)?;
        if owner_record.removed {
            return Err(ArenaError::Removed(owner));
        }
        if child_record.removed {
            return Err(ArenaError::Removed(child));
        }
        if owner_record.record_type != spec.source || child_record.record_type != spec.target {
            return Err(ArenaError::EdgeMismatch {
                edge: spec.name,
                expected_source: spec.source,
                expected_target: spec.target,
                source_type: owner_record.record_type,
                target_type: child_record.record_type,
            });
        }
        Ok(spec)
    }

    fn unlink_child(&mut self, owner: NodeId, edge: &'static str, child: NodeId) {
        if let Some(links) = self.records[owner.0].links.get_mut(edge) {
            links.retain(|current| *current != child);
        }
        let join_column = self.schema.edge(edge).map(|spec| spec.join_column);
        let child_record = &mut self.records[child.0];
        if child_record.parents.get(edge) == Some(&owner) {
            child_record.parents.remove(edge);
            if let Some(join_column) = join_column {
                child_record.clear_reference_attr(join_column);
            }
            child_record.dirty = child_record.id.is_some();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::petstore::{self, edges, OWNER, PET, VACCINATION};

    fn arena() -> RecordArena {
        RecordArena::new(Arc::new(petstore::schema().unwrap()))
    }

    #[test]
    fn attach_updates_both_sides() {
        let mut arena = arena();
        let owner = arena.create(OWNER).unwrap();
        let pet = arena.create(PET).unwrap();

        arena.attach(owner, edges::OWNER_PETS, pet).unwrap();

        assert_eq!(arena.children(owner, edges::OWNER_PETS), &[pet]);
        assert_eq!(arena.parent(pet, edges::OWNER_PETS), Some(owner));
    }

    #[test]
    fn attach_moves_child_between_owners() {
        let mut arena = arena();
        let first = arena.create(OWNER).unwrap();
        let second = arena.create(OWNER).unwrap();
        let pet = arena.create(PET).unwrap();

        arena.attach(first, edges::OWNER_PETS, pet).unwrap();
        arena.attach(second, edges::OWNER_PETS, pet).unwrap();

        assert!(arena.children(first, edges::OWNER_PETS).is_empty());
        assert_eq!(arena.children(second, edges::OWNER_PETS), &[pet]);
        assert_eq!(arena.parent(pet, edges::OWNER_PETS), Some(second));
    }

    #[test]
    fn attach_rejects_wrong_endpoint_types() {
        let mut arena = arena();
        let owner = arena.create(OWNER).unwrap();
        let vaccination = arena.create(VACCINATION).unwrap();

        let err = arena
            .attach(owner, edges::OWNER_PETS, vaccination)
            .unwrap_err();
        assert!(matches!(err, ArenaError::EdgeMismatch { .. }));
    }

    #[test]
    fn set_attr_only_dirties_persistent_records() {
        let mut arena = arena();
        let transient = arena.create(PET).unwrap();
        let loaded = arena.hydrate(PET, 7, Attributes::new()).unwrap();

        arena.set_attr(transient, "name", "Rex").unwrap();
        arena.set_attr(loaded, "name", "Fido").unwrap();

        assert!(!arena.record(transient).unwrap().is_dirty());
        assert!(arena.record(loaded).unwrap().is_dirty());
    }

    #[test]
    fn hydrate_rejects_duplicate_identity() {
        let mut arena = arena();
        arena.hydrate(PET, 1, Attributes::new()).unwrap();
        let err = arena.hydrate(PET, 1, Attributes::new()).unwrap_err();
        assert_eq!(
            err,
            ArenaError::DuplicateIdentity {
                record_type: PET,
                id: 1
            }
        );
    }

    #[test]
    fn restore_returns_assigned_identities_to_transient() {
        let mut arena = arena();
        let owner = arena.create(OWNER).unwrap();
        let pet = arena.create(PET).unwrap();
        arena.attach(owner, edges::OWNER_PETS, pet).unwrap();

        let undo = arena.capture([pet]);
        assert_eq!(undo.len(), 2);
        arena.assign_id(owner, 1);
        arena.assign_id(pet, 7);
        arena.mark_synced(owner);
        arena.mark_removed(pet);

        let left = arena.restore(undo);

        assert!(left.is_empty());
        assert!(arena.record(pet).unwrap().is_transient());
        assert!(!arena.record(pet).unwrap().is_removed());
        assert_eq!(arena.find(PET, 7), None);
        assert_eq!(arena.children(owner, edges::OWNER_PETS), &[pet]);
        assert_eq!(arena.parent(pet, edges::OWNER_PETS), Some(owner));
        // captured as an owner, so its identity goes back too
        assert!(arena.record(owner).unwrap().is_transient());
    }

    #[test]
    fn restore_skips_records_of_another_arena() {
        let mut first = arena();
        let mut second = arena();
        let node = first.create(OWNER).unwrap();
        second.create(OWNER).unwrap();
        let undo = first.capture([node]);
        first.assign_id(node, 3);

        let left = second.restore(undo);

        assert_eq!(left.len(), 1);
        assert_eq!(left[0].arena(), first.arena_id());
        assert!(second.record(node).unwrap().is_transient());
        assert!(first.restore(left).is_empty());
        assert_eq!(first.find(OWNER, 3), None);
    }

    #[test]
    fn detach_keeps_snapshot_for_orphan_detection() {
        let mut arena = arena();
        let owner = arena.hydrate(OWNER, 1, Attributes::new()).unwrap();
        let pet = arena.hydrate(PET, 2, Attributes::new()).unwrap();
        arena.hydrate_link(owner, edges::OWNER_PETS, pet).unwrap();

        assert!(arena.detach(owner, edges::OWNER_PETS, pet).unwrap());

        let record = arena.record(owner).unwrap();
        assert!(record.links(edges::OWNER_PETS).is_empty());
        assert_eq!(record.snapshot(edges::OWNER_PETS), &[pet]);
        assert_eq!(arena.parent(pet, edges::OWNER_PETS), None);
    }
}
