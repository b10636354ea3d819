//! Plan construction over the record arena.
//!
//! # Invariants
//! - Only owning edges are traversed; inverse declarations are consulted
//!   for consistency checks only.
//! - Each arena node is planned at most once per walk.
//! - Planning performs no I/O and never mutates the arena.

use crate::cascade::plan::{Operation, PlanAction, PlanEntry, WritePlan};
use crate::cascade::{CascadeError, CascadeResult};
use crate::model::record::{NodeId, Record, RecordArena};
use crate::model::schema::{Cardinality, CascadeKind, EdgeSpec, OnDelete, Schema};
use log::debug;
use std::collections::HashSet;

/// Expands a root mutation into an ordered write plan.
///
/// # Errors
/// - `GraphConsistency` when a child's inverse pointer disagrees with the
///   owner collection it was reached through.
/// - `TransientReference` when a write would reference a record that is
///   neither persistent nor inserted earlier in the same plan.
pub fn plan(arena: &RecordArena, operation: Operation, root: NodeId) -> CascadeResult<WritePlan> {
    arena.record(root)?;
    let mut walker = Walker::new(arena);
    match operation {
        Operation::CreateOrUpdate => walker.save_root(root)?,
        Operation::Delete => walker.delete_root(root)?,
    }
    let plan = walker.finish(operation)?;
    debug!(
        "event=cascade_plan module=cascade status=ok operation={} root={} entries={}",
        operation,
        root,
        plan.len()
    );
    Ok(plan)
}

struct Walker<'a> {
    arena: &'a RecordArena,
    schema: &'a Schema,
    visited: HashSet<NodeId>,
    deleted: HashSet<NodeId>,
    planned_inserts: HashSet<NodeId>,
    writes: Vec<PlanEntry>,
    links: Vec<PlanEntry>,
    unlinks: Vec<PlanEntry>,
    deletes: Vec<PlanEntry>,
    orphans: Vec<NodeId>,
    touched: Vec<NodeId>,
}

impl<'a> Walker<'a> {
    fn new(arena: &'a RecordArena) -> Self {
        Self {
            arena,
            schema: arena.schema().as_ref(),
            visited: HashSet::new(),
            deleted: HashSet::new(),
            planned_inserts: HashSet::new(),
            writes: Vec::new(),
            links: Vec::new(),
            unlinks: Vec::new(),
            deletes: Vec::new(),
            orphans: Vec::new(),
            touched: Vec::new(),
        }
    }

    fn record(&self, node: NodeId) -> CascadeResult<&'a Record> {
        let arena = self.arena;
        Ok(arena.record(node)?)
    }

    fn save_root(&mut self, root: NodeId) -> CascadeResult<()> {
        self.visited.insert(root);
        self.emit_write(root, None)?;
        self.descend_save(root)?;

        let orphans = std::mem::take(&mut self.orphans);
        for orphan in orphans {
            self.delete_subtree(orphan)?;
        }
        Ok(())
    }

    /// Plans the write of one node, after any many-to-one prerequisites.
    fn emit_write(&mut self, node: NodeId, via: Option<&EdgeSpec>) -> CascadeResult<()> {
        let schema = self.schema;
        let record = self.record(node)?;
        for edge in schema.edges_from(record.record_type()) {
            if edge.cardinality != Cardinality::ManyToOne || !edge.cascade.cascades_write() {
                continue;
            }
            let Some(&target) = record.links(edge.name).first() else {
                continue;
            };
            if self.record(target)?.is_removed() || !self.visited.insert(target) {
                continue;
            }
            self.emit_write(target, Some(edge))?;
            self.descend_save(target)?;
        }

        let allows = |kind: CascadeKind| via.map_or(true, |edge| edge.cascade.contains(kind));
        let action = if record.is_removed() {
            None
        } else if record.is_transient() {
            allows(CascadeKind::Create).then_some(PlanAction::Insert)
        } else if record.is_dirty() {
            allows(CascadeKind::Update).then_some(PlanAction::Update)
        } else {
            None
        };

        if let Some(action) = action {
            self.ensure_resolvable(node, record)?;
            if action == PlanAction::Insert {
                self.planned_inserts.insert(node);
            }
            self.writes.push(entry(action, record, node));
        }
        self.touched.push(node);
        Ok(())
    }

    /// Batches a node's cascading children before descending into any of them.
    fn descend_save(&mut self, node: NodeId) -> CascadeResult<()> {
        let schema = self.schema;
        let record = self.record(node)?;
        let mut batch = Vec::new();
        for edge in schema.edges_from(record.record_type()) {
            match edge.cardinality {
                Cardinality::ManyToOne => continue,
                Cardinality::ManyToMany => self.plan_associations(node, record, edge)?,
                Cardinality::OneToOne | Cardinality::OneToMany => {
                    self.check_consistency(node, record, edge)?;
                    self.plan_detached(node, record, edge)?;
                }
            }
            if !edge.cascade.cascades_write() {
                continue;
            }
            for &child in record.links(edge.name) {
                if self.visited.insert(child) {
                    batch.push((child, edge));
                }
            }
        }

        for &(child, edge) in &batch {
            self.emit_write(child, Some(edge))?;
        }
        for (child, _) in batch {
            self.descend_save(child)?;
        }
        Ok(())
    }

    /// Handles records present in the snapshot but gone from the collection.
    fn plan_detached(&mut self, node: NodeId, record: &Record, edge: &EdgeSpec) -> CascadeResult<()> {
        if record.is_transient() {
            return Ok(());
        }
        let current = record.links(edge.name);
        for &previous in record.snapshot(edge.name) {
            if current.contains(&previous) {
                continue;
            }
            let previous_record = self.record(previous)?;
            if previous_record.is_removed() || previous_record.is_transient() {
                continue;
            }
            if matches!(previous_record.parent(edge.name), Some(owner) if owner != node) {
                // moved under another owner, not an orphan
                continue;
            }
            if edge.orphan_removal {
                self.orphans.push(previous);
            } else if edge.cascade.contains(CascadeKind::Update) && self.visited.insert(previous) {
                self.writes
                    .push(entry(PlanAction::Update, previous_record, previous));
                self.touched.push(previous);
            }
        }
        Ok(())
    }

    fn plan_associations(
        &mut self,
        node: NodeId,
        record: &Record,
        edge: &EdgeSpec,
    ) -> CascadeResult<()> {
        let current = record.links(edge.name);
        let snapshot = record.snapshot(edge.name);
        for &target in current {
            if record.is_transient() || !snapshot.contains(&target) {
                self.links.push(entry(
                    PlanAction::Link {
                        edge: edge.name,
                        target,
                    },
                    record,
                    node,
                ));
            }
        }
        if record.is_transient() {
            return Ok(());
        }
        for &target in snapshot {
            if !current.contains(&target) && !self.record(target)?.is_removed() {
                self.unlinks.push(entry(
                    PlanAction::Unlink {
                        edge: edge.name,
                        target,
                    },
                    record,
                    node,
                ));
            }
        }
        Ok(())
    }

    fn delete_root(&mut self, root: NodeId) -> CascadeResult<()> {
        if self.record(root)?.is_transient() {
            return Ok(());
        }
        self.delete_subtree(root)
    }

    /// Plans deletion of `node` and its delete-cascading subgraph, children first.
    fn delete_subtree(&mut self, node: NodeId) -> CascadeResult<()> {
        if !self.deleted.insert(node) {
            return Ok(());
        }
        let mut forward = Vec::new();
        self.delete_visit(node, &mut forward)?;
        self.delete_descend(node, &mut forward)?;
        forward.reverse();
        self.deletes.extend(forward);
        Ok(())
    }

    fn delete_visit(&mut self, node: NodeId, out: &mut Vec<PlanEntry>) -> CascadeResult<()> {
        let schema = self.schema;
        let record = self.record(node)?;
        out.push(entry(PlanAction::Delete, record, node));
        self.touched.push(node);

        for edge in schema.edges_from(record.record_type()) {
            match edge.cardinality {
                Cardinality::ManyToMany => {
                    for target in linked_union(record, edge.name) {
                        if !self.record(target)?.is_transient() {
                            out.push(entry(
                                PlanAction::Unlink {
                                    edge: edge.name,
                                    target,
                                },
                                record,
                                node,
                            ));
                        }
                    }
                }
                Cardinality::OneToOne | Cardinality::OneToMany
                    if !edge.cascades_delete() && edge.on_delete == OnDelete::SetNull =>
                {
                    for &child in record.links(edge.name) {
                        let child_record = self.record(child)?;
                        if child_record.is_transient()
                            || child_record.is_removed()
                            || child_record.parent(edge.name) != Some(node)
                        {
                            continue;
                        }
                        out.push(entry(
                            PlanAction::ClearReference { edge: edge.name },
                            child_record,
                            child,
                        ));
                        self.touched.push(child);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn delete_descend(&mut self, node: NodeId, out: &mut Vec<PlanEntry>) -> CascadeResult<()> {
        let schema = self.schema;
        let record = self.record(node)?;
        let mut batch = Vec::new();
        // many-to-one targets are shared reference data and are never visited here
        for edge in schema
            .edges_from(record.record_type())
            .filter(|edge| edge.cascades_delete())
        {
            self.check_consistency(node, record, edge)?;
            for child in linked_union(record, edge.name) {
                let child_record = self.record(child)?;
                if child_record.is_transient() || child_record.is_removed() {
                    continue;
                }
                if matches!(child_record.parent(edge.name), Some(owner) if owner != node) {
                    continue;
                }
                if self.deleted.insert(child) {
                    batch.push(child);
                }
            }
        }

        for &child in &batch {
            self.delete_visit(child, out)?;
        }
        for child in batch {
            self.delete_descend(child, out)?;
        }
        Ok(())
    }

    fn check_consistency(&self, node: NodeId, record: &Record, edge: &EdgeSpec) -> CascadeResult<()> {
        if self.schema.inverse_of(edge.name).is_none() {
            return Ok(());
        }
        for &child in record.links(edge.name) {
            let found = self.record(child)?.parent(edge.name);
            if found != Some(node) {
                return Err(CascadeError::GraphConsistency {
                    edge: edge.name,
                    owner: node,
                    child,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Every record referenced by a write must already exist or be inserted first.
    fn ensure_resolvable(&self, node: NodeId, record: &Record) -> CascadeResult<()> {
        let schema = self.schema;
        for (edge, parent) in record.parents() {
            self.ensure_target_resolvable(edge, node, parent)?;
        }
        for edge in schema.edges_from(record.record_type()) {
            if edge.cardinality != Cardinality::ManyToOne {
                continue;
            }
            if let Some(&target) = record.links(edge.name).first() {
                self.ensure_target_resolvable(edge.name, node, target)?;
            }
        }
        Ok(())
    }

    fn ensure_target_resolvable(
        &self,
        edge: &'static str,
        node: NodeId,
        target: NodeId,
    ) -> CascadeResult<()> {
        let target_record = self.record(target)?;
        if target_record.is_transient() && !self.planned_inserts.contains(&target) {
            return Err(CascadeError::TransientReference { edge, node, target });
        }
        Ok(())
    }

    fn finish(mut self, operation: Operation) -> CascadeResult<WritePlan> {
        for link in &self.links {
            if let PlanAction::Link { edge, target } = link.action {
                self.ensure_target_resolvable(edge, link.node, target)?;
            }
        }

        let mut entries = std::mem::take(&mut self.writes);
        entries.append(&mut self.links);
        entries.append(&mut self.unlinks);
        entries.append(&mut self.deletes);

        let mut seen = HashSet::new();
        self.touched.retain(|node| seen.insert(*node));

        Ok(WritePlan {
            operation: Some(operation),
            entries,
            touched: self.touched,
        })
    }
}

fn entry(action: PlanAction, record: &Record, node: NodeId) -> PlanEntry {
    PlanEntry {
        action,
        record_type: record.record_type(),
        id: record.id(),
        node,
    }
}

/// Current links followed by snapshot-only links, without duplicates.
fn linked_union(record: &Record, edge: &str) -> Vec<NodeId> {
    let mut nodes = record.links(edge).to_vec();
    for &previous in record.snapshot(edge) {
        if !nodes.contains(&previous) {
            nodes.push(previous);
        }
    }
    nodes
}
