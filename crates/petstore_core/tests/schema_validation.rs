use petstore_core::model::petstore::{self, edges, APPOINTMENT, OWNER, PET, TAG};
use petstore_core::{
    Cardinality, CascadeKind, CascadeSet, EdgeDecl, EdgeSpec, InverseSpec, OnDelete, RecordType,
    Schema, SchemaError,
};

const PARENT: RecordType = RecordType::new("parent");
const CHILD: RecordType = RecordType::new("child");

fn owning(name: &'static str, cardinality: Cardinality) -> EdgeSpec {
    EdgeSpec::new(name, PARENT, cardinality, CHILD, "parent_id")
}

#[test]
fn petstore_schema_builds() {
    let schema = petstore::schema().unwrap();

    let pets = schema.edge(edges::OWNER_PETS).unwrap();
    assert_eq!(pets.cardinality, Cardinality::OneToMany);
    assert!(pets.cascades_delete());
    assert!(pets.orphan_removal);

    let appointments = schema.edge(edges::PET_APPOINTMENTS).unwrap();
    assert!(appointments.cascade.contains(CascadeKind::Create));
    assert!(!appointments.cascades_delete());
    assert_eq!(appointments.target, APPOINTMENT);

    let tags = schema.edge(edges::PET_TAGS).unwrap();
    assert_eq!(tags.target, TAG);
    assert!(!tags.cascade.contains(CascadeKind::Update));

    let clinic = schema.edge(edges::CLINIC_VETERINARIANS).unwrap();
    assert_eq!(clinic.on_delete, OnDelete::SetNull);
}

#[test]
fn owning_edges_from_pet_follow_declaration_order() {
    let schema = petstore::schema().unwrap();
    let names: Vec<_> = schema.edges_from(PET).map(|edge| edge.name).collect();
    assert_eq!(
        names,
        vec![
            edges::PET_BREED,
            edges::PET_INSURANCE,
            edges::PET_VACCINATIONS,
            edges::PET_MEDICAL_RECORDS,
            edges::PET_APPOINTMENTS,
            edges::PET_TAGS,
        ]
    );
    assert_eq!(schema.edges_from(OWNER).count(), 1);
}

#[test]
fn inverse_must_mirror_its_owning_edge() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[
            EdgeDecl::Owning(owning("parent.children", Cardinality::OneToMany)),
            EdgeDecl::Inverse(InverseSpec::new(
                "child.parent",
                CHILD,
                Cardinality::OneToOne,
                PARENT,
                "parent.children",
            )),
        ],
    )
    .unwrap_err();

    assert_eq!(
        err,
        SchemaError::InverseMismatch {
            inverse: "child.parent",
            mapped_by: "parent.children",
        }
    );
}

#[test]
fn inverse_must_name_an_existing_edge() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[EdgeDecl::Inverse(InverseSpec::new(
            "child.parent",
            CHILD,
            Cardinality::ManyToOne,
            PARENT,
            "parent.missing",
        ))],
    )
    .unwrap_err();

    assert!(matches!(err, SchemaError::UnknownMappedBy { .. }));
}

#[test]
fn inverse_cannot_be_mapped_by_another_inverse() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[
            EdgeDecl::Inverse(InverseSpec::new(
                "child.first",
                CHILD,
                Cardinality::ManyToOne,
                PARENT,
                "child.second",
            )),
            EdgeDecl::Inverse(InverseSpec::new(
                "child.second",
                CHILD,
                Cardinality::ManyToOne,
                PARENT,
                "child.first",
            )),
        ],
    )
    .unwrap_err();

    assert!(matches!(err, SchemaError::MappedByNotOwning { .. }));
}

#[test]
fn owning_edge_accepts_a_single_inverse() {
    let inverse = |name| {
        EdgeDecl::Inverse(InverseSpec::new(
            name,
            CHILD,
            Cardinality::ManyToOne,
            PARENT,
            "parent.children",
        ))
    };
    let err = Schema::build(
        &[PARENT, CHILD],
        &[
            EdgeDecl::Owning(owning("parent.children", Cardinality::OneToMany)),
            inverse("child.parent"),
            inverse("child.owner"),
        ],
    )
    .unwrap_err();

    assert_eq!(
        err,
        SchemaError::DuplicateInverse {
            owning: "parent.children",
            first: "child.parent",
            second: "child.owner",
        }
    );
}

#[test]
fn many_to_many_cannot_cascade_delete() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[EdgeDecl::Owning(
            owning("parent.links", Cardinality::ManyToMany).cascade(CascadeSet::ALL),
        )],
    )
    .unwrap_err();

    assert_eq!(err, SchemaError::DeleteOnManyToMany("parent.links"));
}

#[test]
fn orphan_removal_needs_a_collection_or_one_to_one() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[EdgeDecl::Owning(
            owning("parent.kind", Cardinality::ManyToOne).orphan_removal(),
        )],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        SchemaError::OrphanRemovalNotSupported {
            cardinality: Cardinality::ManyToOne,
            ..
        }
    ));
}

#[test]
fn set_null_conflicts_with_delete_cascade() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[EdgeDecl::Owning(
            owning("parent.children", Cardinality::OneToMany)
                .cascade(CascadeSet::ALL)
                .on_delete(OnDelete::SetNull),
        )],
    )
    .unwrap_err();

    assert_eq!(err, SchemaError::SetNullNotSupported("parent.children"));
}

#[test]
fn rejects_unknown_endpoints_and_duplicates() {
    let unknown = Schema::build(
        &[PARENT],
        &[EdgeDecl::Owning(owning("parent.children", Cardinality::OneToMany))],
    )
    .unwrap_err();
    assert_eq!(
        unknown,
        SchemaError::UnknownRecordType {
            edge: "parent.children",
            record_type: "child",
        }
    );

    let duplicate = Schema::build(
        &[PARENT, CHILD],
        &[
            EdgeDecl::Owning(owning("parent.children", Cardinality::OneToMany)),
            EdgeDecl::Owning(owning("parent.children", Cardinality::OneToMany)),
        ],
    )
    .unwrap_err();
    assert_eq!(duplicate, SchemaError::DuplicateEdge("parent.children"));

    let twice = Schema::build(&[PARENT, PARENT], &[]).unwrap_err();
    assert_eq!(twice, SchemaError::DuplicateRecordType("parent"));
}

#[test]
fn rejects_blank_join_column() {
    let err = Schema::build(
        &[PARENT, CHILD],
        &[EdgeDecl::Owning(EdgeSpec::new(
            "parent.children",
            PARENT,
            Cardinality::OneToMany,
            CHILD,
            " ",
        ))],
    )
    .unwrap_err();

    assert_eq!(err, SchemaError::EmptyJoinColumn("parent.children"));
}
