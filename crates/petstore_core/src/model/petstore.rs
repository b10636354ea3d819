//! Petstore record graph.
//!
//! The cascade table mirrors the classic owner/pet/clinic domain:
//! - owner -> pets: ALL + orphan removal
//! - pet -> insurance, vaccinations, medical records: ALL + orphan removal
//! - pet -> appointments: CREATE + UPDATE only
//! - pet -> tags: CREATE on a many-to-many edge
//! - pet -> breed: no cascade (shared reference data)
//! - clinic -> veterinarians: CREATE + UPDATE, references nulled on delete

use crate::model::record::{ArenaResult, NodeId, RecordArena};
use crate::model::schema::{
    CascadeKind, CascadeSet, EdgeDecl, EdgeSpec, InverseSpec, OnDelete, RecordType, Schema,
    SchemaResult,
};
use crate::model::schema::Cardinality::{ManyToMany, ManyToOne, OneToMany, OneToOne};

pub const OWNER: RecordType = RecordType::new("owner");
pub const PET: RecordType = RecordType::new("pet");
pub const BREED: RecordType = RecordType::new("breed");
pub const INSURANCE: RecordType = RecordType::new("pet_insurance");
pub const VACCINATION: RecordType = RecordType::new("vaccination");
pub const MEDICAL_RECORD: RecordType = RecordType::new("medical_record");
pub const APPOINTMENT: RecordType = RecordType::new("appointment");
pub const VETERINARIAN: RecordType = RecordType::new("veterinarian");
pub const CLINIC: RecordType = RecordType::new("clinic");
pub const TAG: RecordType = RecordType::new("tag");

pub const RECORD_TYPES: &[RecordType] = &[
    OWNER,
    PET,
    BREED,
    INSURANCE,
    VACCINATION,
    MEDICAL_RECORD,
    APPOINTMENT,
    VETERINARIAN,
    CLINIC,
    TAG,
];

/// Edge names, `<source>.<field>`.
pub mod edges {
    pub const OWNER_PETS: &str = "owner.pets";
    pub const PET_OWNER: &str = "pet.owner";
    pub const PET_BREED: &str = "pet.breed";
    pub const PET_INSURANCE: &str = "pet.insurance";
    pub const INSURANCE_PET: &str = "pet_insurance.pet";
    pub const PET_VACCINATIONS: &str = "pet.vaccinations";
    pub const VACCINATION_PET: &str = "vaccination.pet";
    pub const PET_MEDICAL_RECORDS: &str = "pet.medical_records";
    pub const MEDICAL_RECORD_PET: &str = "medical_record.pet";
    pub const PET_APPOINTMENTS: &str = "pet.appointments";
    pub const APPOINTMENT_PET: &str = "appointment.pet";
    pub const PET_TAGS: &str = "pet.tags";
    pub const APPOINTMENT_VETERINARIAN: &str = "appointment.veterinarian";
    pub const MEDICAL_RECORD_VETERINARIAN: &str = "medical_record.veterinarian";
    pub const VACCINATION_ADMINISTERED_BY: &str = "vaccination.administered_by";
    pub const CLINIC_VETERINARIANS: &str = "clinic.veterinarians";
    pub const VETERINARIAN_CLINIC: &str = "veterinarian.clinic";
}

const PERSIST_MERGE: CascadeSet = CascadeSet::of(&[CascadeKind::Create, CascadeKind::Update]);
const MERGE_NEW_ONLY: CascadeSet = CascadeSet::of(&[CascadeKind::Create]);

pub const EDGE_TABLE: &[EdgeDecl] = &[
    EdgeDecl::Owning(
        EdgeSpec::new(edges::OWNER_PETS, OWNER, OneToMany, PET, "owner_id")
            .cascade(CascadeSet::ALL)
            .orphan_removal(),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::PET_OWNER,
        PET,
        ManyToOne,
        OWNER,
        edges::OWNER_PETS,
    )),
    EdgeDecl::Owning(EdgeSpec::new(
        edges::PET_BREED,
        PET,
        ManyToOne,
        BREED,
        "breed_id",
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(edges::PET_INSURANCE, PET, OneToOne, INSURANCE, "pet_id")
            .cascade(CascadeSet::ALL)
            .orphan_removal(),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::INSURANCE_PET,
        INSURANCE,
        OneToOne,
        PET,
        edges::PET_INSURANCE,
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(edges::PET_VACCINATIONS, PET, OneToMany, VACCINATION, "pet_id")
            .cascade(CascadeSet::ALL)
            .orphan_removal(),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::VACCINATION_PET,
        VACCINATION,
        ManyToOne,
        PET,
        edges::PET_VACCINATIONS,
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(
            edges::PET_MEDICAL_RECORDS,
            PET,
            OneToMany,
            MEDICAL_RECORD,
            "pet_id",
        )
        .cascade(CascadeSet::ALL)
        .orphan_removal(),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::MEDICAL_RECORD_PET,
        MEDICAL_RECORD,
        ManyToOne,
        PET,
        edges::PET_MEDICAL_RECORDS,
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(edges::PET_APPOINTMENTS, PET, OneToMany, APPOINTMENT, "pet_id")
            .cascade(PERSIST_MERGE),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::APPOINTMENT_PET,
        APPOINTMENT,
        ManyToOne,
        PET,
        edges::PET_APPOINTMENTS,
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(edges::PET_TAGS, PET, ManyToMany, TAG, "pet_tags").cascade(MERGE_NEW_ONLY),
    ),
    EdgeDecl::Owning(EdgeSpec::new(
        edges::APPOINTMENT_VETERINARIAN,
        APPOINTMENT,
        ManyToOne,
        VETERINARIAN,
        "veterinarian_id",
    )),
    EdgeDecl::Owning(EdgeSpec::new(
        edges::MEDICAL_RECORD_VETERINARIAN,
        MEDICAL_RECORD,
        ManyToOne,
        VETERINARIAN,
        "veterinarian_id",
    )),
    EdgeDecl::Owning(EdgeSpec::new(
        edges::VACCINATION_ADMINISTERED_BY,
        VACCINATION,
        ManyToOne,
        VETERINARIAN,
        "administered_by",
    )),
    EdgeDecl::Owning(
        EdgeSpec::new(
            edges::CLINIC_VETERINARIANS,
            CLINIC,
            OneToMany,
            VETERINARIAN,
            "clinic_id",
        )
        .cascade(PERSIST_MERGE)
        .on_delete(OnDelete::SetNull),
    ),
    EdgeDecl::Inverse(InverseSpec::new(
        edges::VETERINARIAN_CLINIC,
        VETERINARIAN,
        ManyToOne,
        CLINIC,
        edges::CLINIC_VETERINARIANS,
    )),
];

/// Builds the validated petstore schema.
pub fn schema() -> SchemaResult<Schema> {
    Schema::build(RECORD_TYPES, EDGE_TABLE)
}

/// Nodes of the household built by `build_household`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Household {
    pub owner: NodeId,
    pub pets: [NodeId; 2],
    pub insurance: NodeId,
    pub vaccinations: [NodeId; 2],
}

/// Adds a transient owner with two pets of `breed`; the first pet carries an
/// insurance policy and two vaccinations.
pub fn build_household(arena: &mut RecordArena, breed: NodeId) -> ArenaResult<Household> {
    let owner = arena.create_with(OWNER, [("name", "Jordan Lee")])?;
    let rex = arena.create_with(PET, [("name", "Rex")])?;
    let milo = arena.create_with(PET, [("name", "Milo")])?;
    let insurance = arena.create_with(INSURANCE, [("policy_number", "POL-1001")])?;
    let rabies = arena.create_with(VACCINATION, [("vaccine", "rabies")])?;
    let distemper = arena.create_with(VACCINATION, [("vaccine", "distemper")])?;

    for pet in [rex, milo] {
        arena.attach(owner, edges::OWNER_PETS, pet)?;
        arena.attach(pet, edges::PET_BREED, breed)?;
    }
    arena.attach(rex, edges::PET_INSURANCE, insurance)?;
    arena.attach(rex, edges::PET_VACCINATIONS, rabies)?;
    arena.attach(rex, edges::PET_VACCINATIONS, distemper)?;

    Ok(Household {
        owner,
        pets: [rex, milo],
        insurance,
        vaccinations: [rabies, distemper],
    })
}
