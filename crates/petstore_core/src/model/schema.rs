//! Static relationship graph: record types, owning edges and inverse mirrors.
//!
//! # Responsibility
//! - Describe which record types exist and how they reference each other.
//! - Carry the per-edge cascade policy consumed by the cascade engine.
//! - Validate graph invariants once, before the schema is handed out.
//!
//! # Invariants
//! - Every inverse declaration mirrors exactly one owning edge.
//! - An owning edge has at most one inverse declaration.
//! - Many-to-many edges never cascade DELETE.
//! - A `Schema` value is immutable after `Schema::build` succeeds.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use thiserror::Error;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)?$").expect("valid schema name regex")
});

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while validating an edge table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid schema name `{0}`")]
    InvalidName(String),
    #[error("record type `{0}` declared twice")]
    DuplicateRecordType(&'static str),
    #[error("edge `{0}` declared twice")]
    DuplicateEdge(&'static str),
    #[error("edge `{edge}` references unknown record type `{record_type}`")]
    UnknownRecordType {
        edge: &'static str,
        record_type: &'static str,
    },
    #[error("inverse `{inverse}` is mapped by unknown edge `{mapped_by}`")]
    UnknownMappedBy {
        inverse: &'static str,
        mapped_by: &'static str,
    },
    #[error("inverse `{inverse}` is mapped by `{mapped_by}`, which is itself an inverse")]
    MappedByNotOwning {
        inverse: &'static str,
        mapped_by: &'static str,
    },
    #[error("inverse `{inverse}` does not mirror the endpoints or cardinality of `{mapped_by}`")]
    InverseMismatch {
        inverse: &'static str,
        mapped_by: &'static str,
    },
    #[error("owning edge `{owning}` has two inverses: `{first}` and `{second}`")]
    DuplicateInverse {
        owning: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("many-to-many edge `{0}` must not cascade DELETE")]
    DeleteOnManyToMany(&'static str),
    #[error("edge `{edge}` is {cardinality}; orphan removal needs one-to-one or one-to-many")]
    OrphanRemovalNotSupported {
        edge: &'static str,
        cardinality: Cardinality,
    },
    #[error("edge `{0}` cannot use SET NULL on delete")]
    SetNullNotSupported(&'static str),
    #[error("edge `{0}` has an empty join column")]
    EmptyJoinColumn(&'static str),
}

/// Name of one record type, e.g. `pet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(&'static str);

impl RecordType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Edge cardinality, read from the declaring side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Cardinality seen from the other end of the edge.
    pub fn mirrored(self) -> Self {
        match self {
            Self::OneToOne => Self::OneToOne,
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
            Self::ManyToMany => Self::ManyToMany,
        }
    }

    /// Whether the target record carries the reference back to the source.
    pub fn target_holds_reference(self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }
}

impl Display for Cardinality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        };
        f.write_str(text)
    }
}

/// One cascadable operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeKind {
    Create,
    Update,
    Delete,
    Refresh,
    Detach,
}

impl CascadeKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Create => 1,
            Self::Update => 1 << 1,
            Self::Delete => 1 << 2,
            Self::Refresh => 1 << 3,
            Self::Detach => 1 << 4,
        }
    }
}

/// Subset of `CascadeKind` carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CascadeSet(u8);

impl CascadeSet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b1_1111);

    pub const fn of(kinds: &[CascadeKind]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < kinds.len() {
            bits |= kinds[index].bit();
            index += 1;
        }
        Self(bits)
    }

    pub fn contains(self, kind: CascadeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when CREATE or UPDATE flows across the edge.
    pub fn cascades_write(self) -> bool {
        self.contains(CascadeKind::Create) || self.contains(CascadeKind::Update)
    }
}

/// What happens to dependants of a non-cascading edge when the owner is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OnDelete {
    /// Dependants keep their (now dangling) reference.
    #[default]
    Leave,
    /// Dependants get their reference cleared before the owner goes away.
    SetNull,
}

/// Owning edge: authoritative for cascade decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Stable edge name, `<source>.<field>`.
    pub name: &'static str,
    pub source: RecordType,
    pub target: RecordType,
    pub cardinality: Cardinality,
    pub cascade: CascadeSet,
    pub orphan_removal: bool,
    pub on_delete: OnDelete,
    /// Reference attribute written to the store, or join table name for
    /// many-to-many edges.
    pub join_column: &'static str,
}

impl EdgeSpec {
    pub const fn new(
        name: &'static str,
        source: RecordType,
        cardinality: Cardinality,
        target: RecordType,
        join_column: &'static str,
    ) -> Self {
        Self {
            name,
            source,
            target,
            cardinality,
            cascade: CascadeSet::NONE,
            orphan_removal: false,
            on_delete: OnDelete::Leave,
            join_column,
        }
    }

    pub const fn cascade(self, cascade: CascadeSet) -> Self {
        Self { cascade, ..self }
    }

    pub const fn orphan_removal(self) -> Self {
        Self {
            orphan_removal: true,
            ..self
        }
    }

    pub const fn on_delete(self, on_delete: OnDelete) -> Self {
        Self { on_delete, ..self }
    }

    /// Whether deleting the source also deletes the targets.
    pub fn cascades_delete(&self) -> bool {
        self.cardinality.target_holds_reference()
            && (self.cascade.contains(CascadeKind::Delete) || self.orphan_removal)
    }
}

/// Read-only mirror of an owning edge, used for consistency checks only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseSpec {
    pub name: &'static str,
    pub source: RecordType,
    pub target: RecordType,
    pub cardinality: Cardinality,
    pub mapped_by: &'static str,
}

impl InverseSpec {
    pub const fn new(
        name: &'static str,
        source: RecordType,
        cardinality: Cardinality,
        target: RecordType,
        mapped_by: &'static str,
    ) -> Self {
        Self {
            name,
            source,
            target,
            cardinality,
            mapped_by,
        }
    }
}

/// One row of the static edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDecl {
    Owning(EdgeSpec),
    Inverse(InverseSpec),
}

/// Validated record graph.
#[derive(Debug, Clone)]
pub struct Schema {
    record_types: Vec<RecordType>,
    edges: Vec<EdgeSpec>,
    inverses: Vec<InverseSpec>,
    edge_index: HashMap<&'static str, usize>,
    inverse_by_owning: HashMap<&'static str, usize>,
}

impl Schema {
    /// Builds and validates a schema from an edge table.
    ///
    /// # Errors
    /// - Returns the first violated invariant, in declaration order.
    pub fn build(record_types: &[RecordType], decls: &[EdgeDecl]) -> SchemaResult<Self> {
        let mut known = HashSet::new();
        for record_type in record_types {
            validate_name(record_type.name())?;
            if !known.insert(*record_type) {
                return Err(SchemaError::DuplicateRecordType(record_type.name()));
            }
        }

        let mut edges = Vec::new();
        let mut inverses = Vec::new();
        let mut names = HashSet::new();
        for decl in decls {
            let (name, source, target) = match decl {
                EdgeDecl::Owning(edge) => (edge.name, edge.source, edge.target),
                EdgeDecl::Inverse(inverse) => (inverse.name, inverse.source, inverse.target),
            };
            validate_name(name)?;
            if !names.insert(name) {
                return Err(SchemaError::DuplicateEdge(name));
            }
            for endpoint in [source, target] {
                if !known.contains(&endpoint) {
                    return Err(SchemaError::UnknownRecordType {
                        edge: name,
                        record_type: endpoint.name(),
                    });
                }
            }
            match decl {
                EdgeDecl::Owning(edge) => {
                    validate_owning(edge)?;
                    edges.push(*edge);
                }
                EdgeDecl::Inverse(inverse) => inverses.push(*inverse),
            }
        }

        let edge_index: HashMap<_, _> = edges
            .iter()
            .enumerate()
            .map(|(index, edge)| (edge.name, index))
            .collect();
        let inverse_names: HashSet<_> = inverses.iter().map(|inverse| inverse.name).collect();

        let mut inverse_by_owning: HashMap<&'static str, usize> = HashMap::new();
        for (index, inverse) in inverses.iter().enumerate() {
            let Some(&edge_pos) = edge_index.get(inverse.mapped_by) else {
                if inverse_names.contains(inverse.mapped_by) {
                    return Err(SchemaError::MappedByNotOwning {
                        inverse: inverse.name,
                        mapped_by: inverse.mapped_by,
                    });
                }
                return Err(SchemaError::UnknownMappedBy {
                    inverse: inverse.name,
                    mapped_by: inverse.mapped_by,
                });
            };
            let owning = &edges[edge_pos];
            let mirrors = owning.source == inverse.target
                && owning.target == inverse.source
                && owning.cardinality.mirrored() == inverse.cardinality;
            if !mirrors {
                return Err(SchemaError::InverseMismatch {
                    inverse: inverse.name,
                    mapped_by: inverse.mapped_by,
                });
            }
            if let Some(&previous) = inverse_by_owning.get(owning.name) {
                return Err(SchemaError::DuplicateInverse {
                    owning: owning.name,
                    first: inverses[previous].name,
                    second: inverse.name,
                });
            }
            inverse_by_owning.insert(owning.name, index);
        }

        Ok(Self {
            record_types: record_types.to_vec(),
            edges,
            inverses,
            edge_index,
            inverse_by_owning,
        })
    }

    pub fn record_types(&self) -> &[RecordType] {
        &self.record_types
    }

    pub fn contains_type(&self, record_type: RecordType) -> bool {
        self.record_types.contains(&record_type)
    }

    /// Owning edges in declaration order.
    pub fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    pub fn inverses(&self) -> &[InverseSpec] {
        &self.inverses
    }

    /// Looks up an owning edge by name.
    pub fn edge(&self, name: &str) -> Option<&EdgeSpec> {
        self.edge_index.get(name).map(|&index| &self.edges[index])
    }

    /// Owning edges declared on `record_type`, in declaration order.
    pub fn edges_from(&self, record_type: RecordType) -> impl Iterator<Item = &EdgeSpec> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.source == record_type)
    }

    /// Inverse declaration mirroring `owning`, if the pair is bidirectional.
    pub fn inverse_of(&self, owning: &str) -> Option<&InverseSpec> {
        self.inverse_by_owning
            .get(owning)
            .map(|&index| &self.inverses[index])
    }
}

fn validate_name(name: &str) -> SchemaResult<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

fn validate_owning(edge: &EdgeSpec) -> SchemaResult<()> {
    if edge.join_column.trim().is_empty() {
        return Err(SchemaError::EmptyJoinColumn(edge.name));
    }
    if edge.cardinality == Cardinality::ManyToMany && edge.cascade.contains(CascadeKind::Delete) {
        return Err(SchemaError::DeleteOnManyToMany(edge.name));
    }
    if edge.orphan_removal && !edge.cardinality.target_holds_reference() {
        return Err(SchemaError::OrphanRemovalNotSupported {
            edge: edge.name,
            cardinality: edge.cardinality,
        });
    }
    if edge.on_delete == OnDelete::SetNull
        && (!edge.cardinality.target_holds_reference() || edge.cascades_delete())
    {
        return Err(SchemaError::SetNullNotSupported(edge.name));
    }
    Ok(())
}
