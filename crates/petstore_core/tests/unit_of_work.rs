use petstore_core::model::petstore::{
    self, build_household, edges, Household, APPOINTMENT, BREED, CLINIC, INSURANCE, OWNER, PET,
    TAG, VACCINATION, VETERINARIAN,
};
use petstore_core::tx::{ManualClock, TransactionEvent};
use petstore_core::{
    AttrValue, Attributes, CascadeError, MemoryDatabase, MemorySession, NodeId, PersistError, PersistStage,
    PlanAction, Propagation, RecordArena, RecordId, RecordType, Store, StoreError,
    TransactionDefinition, TransactionError, TransactionManager, TransactionStatus, UnitOfWork,
};
use std::sync::Arc;
use std::time::Duration;

type MemoryUow = UnitOfWork<MemorySession, MemorySession>;

fn unit_of_work(db: &MemoryDatabase) -> MemoryUow {
    let session = db.connect();
    UnitOfWork::new(session.clone(), session)
}

fn arena() -> RecordArena {
    RecordArena::new(Arc::new(petstore::schema().unwrap()))
}

fn stored_breed(uow: &MemoryUow, arena: &mut RecordArena) -> NodeId {
    let attrs = Attributes::from([("name".to_string(), AttrValue::from("Beagle"))]);
    let id = uow.store().insert(BREED, &attrs).unwrap();
    uow.load(arena, BREED, id).unwrap()
}

fn saved_household(uow: &mut MemoryUow, arena: &mut RecordArena) -> (Household, NodeId) {
    let breed = stored_breed(uow, arena);
    let household = build_household(arena, breed).unwrap();
    uow.save(arena, household.owner, TransactionDefinition::required())
        .unwrap();
    (household, breed)
}

fn id_of(arena: &RecordArena, node: NodeId) -> RecordId {
    arena.id(node).unwrap()
}

fn row_attr(uow: &MemoryUow, record_type: RecordType, id: RecordId, key: &str) -> AttrValue {
    uow.store()
        .load(record_type, id)
        .unwrap()
        .get(key)
        .cloned()
        .unwrap_or(AttrValue::Null)
}

#[test]
fn saving_a_household_writes_every_cascaded_record() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let breed = stored_breed(&uow, &mut arena);
    let household = build_household(&mut arena, breed).unwrap();

    let report = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    assert!(!report.local_transaction);
    let types: Vec<_> = report.executed.iter().map(|entry| entry.record_type).collect();
    assert_eq!(types, vec![OWNER, PET, PET, INSURANCE, VACCINATION, VACCINATION]);
    assert_eq!(uow.count(PET).unwrap(), 2);
    assert_eq!(uow.count(BREED).unwrap(), 1);

    let owner_id = id_of(&arena, household.owner);
    let rex_id = id_of(&arena, household.pets[0]);
    assert_eq!(row_attr(&uow, PET, rex_id, "owner_id"), AttrValue::Int(owner_id));
    assert_eq!(
        row_attr(&uow, PET, rex_id, "breed_id"),
        AttrValue::Int(id_of(&arena, breed))
    );
    assert_eq!(
        row_attr(
            &uow,
            VACCINATION,
            id_of(&arena, household.vaccinations[1]),
            "pet_id"
        ),
        AttrValue::Int(rex_id)
    );
    assert_eq!(row_attr(&uow, PET, rex_id, "name"), AttrValue::from("Rex"));

    let owner = arena.record(household.owner).unwrap();
    assert!(!owner.is_transient());
    assert_eq!(owner.snapshot(edges::OWNER_PETS), &household.pets);
    assert_eq!(db.tracker().commit_count(), 1);
}

#[test]
fn saving_again_without_changes_writes_nothing() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let (household, _) = saved_household(&mut uow, &mut arena);

    let report = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    assert!(report.plan.is_empty());
    assert!(report.executed.is_empty());
}

#[test]
fn deleting_the_owner_removes_dependants_and_keeps_breed() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let (household, breed) = saved_household(&mut uow, &mut arena);

    let report = uow
        .delete(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    let types: Vec<_> = report.executed.iter().map(|entry| entry.record_type).collect();
    assert_eq!(types, vec![VACCINATION, VACCINATION, INSURANCE, PET, PET, OWNER]);
    for record_type in [OWNER, PET, INSURANCE, VACCINATION] {
        assert_eq!(uow.count(record_type).unwrap(), 0, "{record_type} left behind");
    }
    assert_eq!(uow.count(BREED).unwrap(), 1);
    assert!(arena.record(household.owner).unwrap().is_removed());
    assert!(!arena.record(breed).unwrap().is_removed());
}

#[test]
fn removing_a_pet_from_the_owner_deletes_it_on_save() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let (household, _) = saved_household(&mut uow, &mut arena);
    let [rex, milo] = household.pets;

    arena.detach(household.owner, edges::OWNER_PETS, rex).unwrap();
    let report = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    assert_eq!(
        report.plan.types_for(PlanAction::Delete),
        vec![VACCINATION, VACCINATION, INSURANCE, PET]
    );
    assert_eq!(uow.count(PET).unwrap(), 1);
    assert_eq!(uow.count(VACCINATION).unwrap(), 0);
    assert!(arena.record(rex).unwrap().is_removed());
    assert_eq!(arena.children(household.owner, edges::OWNER_PETS), &[milo]);
}

#[test]
fn transferring_a_pet_rewrites_its_owner_reference() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let (household, _) = saved_household(&mut uow, &mut arena);
    let [_, milo] = household.pets;
    let new_owner = arena.create_with(OWNER, [("name", "Sam Ortiz")]).unwrap();
    uow.save(&mut arena, new_owner, TransactionDefinition::required())
        .unwrap();

    arena.attach(new_owner, edges::OWNER_PETS, milo).unwrap();
    uow.save(&mut arena, new_owner, TransactionDefinition::required())
        .unwrap();
    let previous = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    assert!(previous.plan.is_empty());
    assert_eq!(uow.count(PET).unwrap(), 2);
    assert_eq!(
        row_attr(&uow, PET, id_of(&arena, milo), "owner_id"),
        AttrValue::Int(id_of(&arena, new_owner))
    );
}

#[test]
fn loaded_pet_keeps_its_stored_owner_reference() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let attrs = Attributes::from([
        ("name".to_string(), AttrValue::from("Rex")),
        ("owner_id".to_string(), AttrValue::Int(41)),
    ]);
    let pet_id = uow.store().insert(PET, &attrs).unwrap();
    let mut arena = arena();

    let pet = uow.load(&mut arena, PET, pet_id).unwrap();
    assert_eq!(uow.load(&mut arena, PET, pet_id).unwrap(), pet);
    arena.set_attr(pet, "name", "Rex II").unwrap();
    uow.save(&mut arena, pet, TransactionDefinition::required())
        .unwrap();

    assert_eq!(row_attr(&uow, PET, pet_id, "owner_id"), AttrValue::Int(41));
    assert_eq!(row_attr(&uow, PET, pet_id, "name"), AttrValue::from("Rex II"));
}

#[test]
fn loading_a_missing_record_is_not_found() {
    let db = MemoryDatabase::new();
    let uow = unit_of_work(&db);
    let mut arena = arena();

    let err = uow.load(&mut arena, OWNER, 404).unwrap_err();

    assert!(matches!(
        err,
        PersistError::NotFound {
            record_type: OWNER,
            id: 404
        }
    ));
}

#[test]
fn required_inside_required_commits_once_in_call_order() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let first = arena.create_with(OWNER, [("name", "Ann")]).unwrap();
    let second = arena.create_with(OWNER, [("name", "Bob")]).unwrap();

    let journal = uow
        .transactional(TransactionDefinition::required(), |uow| {
            uow.save(&mut arena, first, TransactionDefinition::required())?;
            uow.save(&mut arena, second, TransactionDefinition::required())?;
            Ok(uow.transaction_manager().journal().to_vec())
        })
        .unwrap();

    let ids: Vec<_> = journal.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![id_of(&arena, first), id_of(&arena, second)]);
    assert_eq!(db.tracker().begin_count(), 1);
    assert_eq!(db.tracker().commit_count(), 1);
}

#[test]
fn requires_new_survives_outer_rollback() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let audited = arena.create_with(OWNER, [("name", "audit")]).unwrap();
    let discarded = arena.create_with(OWNER, [("name", "discarded")]).unwrap();

    let result: Result<(), PersistError> =
        uow.transactional(TransactionDefinition::required(), |uow| {
            uow.save(&mut arena, discarded, TransactionDefinition::required())?;
            uow.save(&mut arena, audited, TransactionDefinition::requires_new())?;
            Err(PersistError::ReadOnlyViolation { entries: 0 })
        });

    assert!(result.is_err());
    assert_eq!(uow.count(OWNER).unwrap(), 1);
    assert!(db.contains(OWNER, id_of(&arena, audited)));
    let discarded_id = id_of(&arena, discarded);
    assert!(!db.contains(OWNER, discarded_id));
    assert_eq!(db.tracker().commit_count(), 1);
    assert_eq!(db.tracker().rollback_count(), 1);

    assert_eq!(uow.reconcile(&mut arena), 1);
    assert!(arena.record(discarded).unwrap().is_transient());
    assert_eq!(arena.find(OWNER, discarded_id), None);
    assert!(db.contains(OWNER, id_of(&arena, audited)));
}

#[test]
fn failed_nested_scope_keeps_outer_work() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let kept = arena.create_with(OWNER, [("name", "kept")]).unwrap();
    let undone = arena.create_with(OWNER, [("name", "undone")]).unwrap();

    uow.transactional(TransactionDefinition::required(), |uow| {
        uow.save(&mut arena, kept, TransactionDefinition::required())?;
        let inner = uow.transactional(TransactionDefinition::nested(), |uow| {
            uow.save(&mut arena, undone, TransactionDefinition::required())?;
            Err::<(), _>(PersistError::ReadOnlyViolation { entries: 0 })
        });
        assert!(inner.is_err());
        assert_eq!(uow.transaction_manager().journal().len(), 1);
        Ok(())
    })
    .unwrap();

    assert_eq!(uow.count(OWNER).unwrap(), 1);
    assert!(db.contains(OWNER, id_of(&arena, kept)));
    assert_eq!(db.tracker().count(TransactionEvent::RollbackToSavepoint), 1);
    assert_eq!(db.tracker().commit_count(), 1);
}

#[test]
fn record_undone_by_a_nested_rollback_is_saved_again() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let kept = arena.create_with(OWNER, [("name", "kept")]).unwrap();
    let undone = arena.create_with(OWNER, [("name", "undone")]).unwrap();

    uow.transactional(TransactionDefinition::required(), |uow| {
        uow.save(&mut arena, kept, TransactionDefinition::required())?;
        let inner = uow.transactional(TransactionDefinition::nested(), |uow| {
            uow.save(&mut arena, undone, TransactionDefinition::required())?;
            Err::<(), _>(PersistError::ReadOnlyViolation { entries: 0 })
        });
        assert!(inner.is_err());

        let report = uow.save(&mut arena, undone, TransactionDefinition::required())?;
        assert_eq!(report.plan.types_for(PlanAction::Insert), vec![OWNER]);
        assert!(!arena.record(kept).unwrap().is_transient());
        Ok(())
    })
    .unwrap();

    assert_eq!(uow.count(OWNER).unwrap(), 2);
    assert!(db.contains(OWNER, id_of(&arena, kept)));
    assert!(db.contains(OWNER, id_of(&arena, undone)));
    assert_eq!(db.tracker().commit_count(), 1);
}

#[test]
fn cascade_error_in_a_joined_save_rolls_back_the_outer_transaction() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let valid = arena.create_with(OWNER, [("name", "valid")]).unwrap();
    let broken = arena.create_with(OWNER, [("name", "broken")]).unwrap();
    let stranger = arena.create_with(OWNER, [("name", "stranger")]).unwrap();
    let rex = arena.create_with(PET, [("name", "Rex")]).unwrap();
    arena.attach(broken, edges::OWNER_PETS, rex).unwrap();
    arena
        .overwrite_parent(rex, edges::OWNER_PETS, Some(stranger))
        .unwrap();

    let err = uow
        .transactional(TransactionDefinition::required(), |uow| {
            uow.save(&mut arena, valid, TransactionDefinition::required())?;
            let err = uow
                .save(&mut arena, broken, TransactionDefinition::required())
                .unwrap_err();
            assert!(matches!(
                err,
                PersistError::Cascade(CascadeError::GraphConsistency { child, .. }) if child == rex
            ));
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err.stage(), PersistStage::Commit);
    assert!(matches!(
        err.transaction_error(),
        Some(TransactionError::UnexpectedRollback { .. })
    ));
    assert_eq!(uow.count(OWNER).unwrap(), 0);
    assert_eq!(uow.count(PET).unwrap(), 0);
    assert!(db.tracker().all_rolled_back());
    assert_eq!(
        uow.transaction_manager().last_resolved().unwrap().status(),
        TransactionStatus::RolledBack
    );

    assert_eq!(uow.reconcile(&mut arena), 1);
    assert!(arena.record(valid).unwrap().is_transient());
}

#[test]
fn nested_without_savepoints_fails_at_begin_and_outer_commits() {
    let db = MemoryDatabase::without_savepoints();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let kept = arena.create_with(OWNER, [("name", "kept")]).unwrap();
    let skipped = arena.create_with(OWNER, [("name", "skipped")]).unwrap();

    uow.transactional(TransactionDefinition::required(), |uow| {
        uow.save(&mut arena, kept, TransactionDefinition::required())?;
        let err = uow
            .save(&mut arena, skipped, TransactionDefinition::nested())
            .unwrap_err();
        assert_eq!(err.stage(), PersistStage::Begin);
        assert_eq!(
            err.transaction_error(),
            Some(&TransactionError::SavepointUnsupported)
        );
        Ok(())
    })
    .unwrap();

    assert_eq!(uow.count(OWNER).unwrap(), 1);
    assert!(arena.record(skipped).unwrap().is_transient());
}

#[test]
fn read_only_scope_rejects_a_non_empty_plan() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let owner = arena.create_with(OWNER, [("name", "Ann")]).unwrap();
    let read_only = TransactionDefinition::required().with_read_only(true);

    let err = uow.save(&mut arena, owner, read_only).unwrap_err();

    assert!(matches!(err, PersistError::ReadOnlyViolation { entries: 1 }));
    assert_eq!(err.stage(), PersistStage::Plan);
    assert_eq!(uow.count(OWNER).unwrap(), 0);
    assert_eq!(db.tracker().rollback_count(), 1);

    uow.save(&mut arena, owner, TransactionDefinition::required())
        .unwrap();
    let report = uow.save(&mut arena, owner, read_only).unwrap();
    assert!(report.plan.is_empty());
}

#[test]
fn non_transactional_scope_writes_in_a_local_transaction() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let owner = arena.create_with(OWNER, [("name", "Ann")]).unwrap();

    let report = uow
        .save(&mut arena, owner, TransactionDefinition::supports())
        .unwrap();

    assert!(report.local_transaction);
    assert_eq!(uow.count(OWNER).unwrap(), 1);
    assert_eq!(db.tracker().begin_count(), 1);
    assert_eq!(db.tracker().commit_count(), 1);
    assert_eq!(uow.transaction_manager().depth(), 0);
}

#[test]
fn mandatory_save_without_transaction_is_rejected() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let owner = arena.create(OWNER).unwrap();

    let err = uow
        .save(&mut arena, owner, TransactionDefinition::mandatory())
        .unwrap_err();

    assert_eq!(
        err.transaction_error(),
        Some(&TransactionError::NoTransaction(Propagation::Mandatory))
    );
    assert_eq!(uow.count(OWNER).unwrap(), 0);
    assert_eq!(db.tracker().begin_count(), 0);
}

#[test]
fn failed_write_rolls_back_the_whole_cascade() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let breed = stored_breed(&uow, &mut arena);
    let household = build_household(&mut arena, breed).unwrap();
    db.fail_inserts_of(VACCINATION);

    let err = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap_err();

    assert!(matches!(err, PersistError::Store(StoreError::Backend(_))));
    assert_eq!(err.stage(), PersistStage::Write);
    for record_type in [OWNER, PET, INSURANCE, VACCINATION] {
        assert_eq!(uow.count(record_type).unwrap(), 0);
    }
    assert_eq!(db.tracker().rollback_count(), 1);
    assert_eq!(db.open_transactions(), 0);
    assert!(arena.record(household.owner).unwrap().is_transient());
    assert!(arena.record(household.pets[0]).unwrap().is_transient());
    assert!(!arena.record(breed).unwrap().is_transient());
}

#[test]
fn retry_after_a_failed_write_stores_the_whole_household() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let breed = stored_breed(&uow, &mut arena);
    let household = build_household(&mut arena, breed).unwrap();
    db.fail_inserts_of(VACCINATION);
    uow.save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap_err();
    db.clear_failures();

    let report = uow
        .save(&mut arena, household.owner, TransactionDefinition::required())
        .unwrap();

    let types: Vec<_> = report.executed.iter().map(|entry| entry.record_type).collect();
    assert_eq!(types, vec![OWNER, PET, PET, INSURANCE, VACCINATION, VACCINATION]);
    assert_eq!(uow.count(OWNER).unwrap(), 1);
    assert_eq!(uow.count(PET).unwrap(), 2);
    assert_eq!(uow.count(VACCINATION).unwrap(), 2);
    let owner_id = id_of(&arena, household.owner);
    for pet in household.pets {
        assert_eq!(
            row_attr(&uow, PET, id_of(&arena, pet), "owner_id"),
            AttrValue::Int(owner_id)
        );
    }
    assert_eq!(arena.find(OWNER, owner_id), Some(household.owner));
}

#[test]
fn failed_commit_is_reported_and_nothing_persists() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let owner = arena.create_with(OWNER, [("name", "Ann")]).unwrap();
    db.fail_next_commit();

    let err = uow
        .save(&mut arena, owner, TransactionDefinition::required())
        .unwrap_err();

    assert_eq!(err.stage(), PersistStage::Commit);
    assert!(matches!(
        err.transaction_error(),
        Some(TransactionError::Connection(_))
    ));
    assert_eq!(uow.count(OWNER).unwrap(), 0);
    assert_eq!(
        uow.transaction_manager().last_resolved().unwrap().status(),
        TransactionStatus::RolledBack
    );
}

#[test]
fn expired_transaction_fails_before_planning() {
    let db = MemoryDatabase::new();
    let session = db.connect();
    let clock = ManualClock::new();
    let mut uow = UnitOfWork::with_manager(
        session.clone(),
        TransactionManager::with_clock(session, clock.clone()),
    );
    let mut arena = arena();
    let owner = arena.create_with(OWNER, [("name", "Ann")]).unwrap();
    let timed = TransactionDefinition::required().with_timeout(Duration::from_secs(1));

    let err = uow
        .transactional(timed, |uow| {
            clock.advance(Duration::from_secs(2));
            uow.save(&mut arena, owner, TransactionDefinition::required())
        })
        .unwrap_err();

    assert_eq!(err.stage(), PersistStage::Plan);
    assert!(matches!(
        err.transaction_error(),
        Some(TransactionError::TransactionTimeout { .. })
    ));
    assert_eq!(uow.count(OWNER).unwrap(), 0);
    assert!(db.tracker().all_rolled_back());
}

#[test]
fn deleting_a_pet_leaves_its_appointment_dangling() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let pet = arena.create_with(PET, [("name", "Rex")]).unwrap();
    let appointment = arena
        .create_with(APPOINTMENT, [("reason", "checkup")])
        .unwrap();
    arena
        .attach(pet, edges::PET_APPOINTMENTS, appointment)
        .unwrap();
    uow.save(&mut arena, pet, TransactionDefinition::required())
        .unwrap();
    let pet_id = id_of(&arena, pet);

    uow.delete(&mut arena, pet, TransactionDefinition::required())
        .unwrap();

    assert_eq!(uow.count(PET).unwrap(), 0);
    assert_eq!(uow.count(APPOINTMENT).unwrap(), 1);
    assert_eq!(
        row_attr(&uow, APPOINTMENT, id_of(&arena, appointment), "pet_id"),
        AttrValue::Int(pet_id)
    );
}

#[test]
fn deleting_a_clinic_clears_veterinarian_references() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let clinic = arena.create_with(CLINIC, [("name", "Northside")]).unwrap();
    let vet = arena.create_with(VETERINARIAN, [("name", "Dr. Kim")]).unwrap();
    arena
        .attach(clinic, edges::CLINIC_VETERINARIANS, vet)
        .unwrap();
    uow.save(&mut arena, clinic, TransactionDefinition::required())
        .unwrap();
    let vet_id = id_of(&arena, vet);
    assert_eq!(
        row_attr(&uow, VETERINARIAN, vet_id, "clinic_id"),
        AttrValue::Int(id_of(&arena, clinic))
    );

    uow.delete(&mut arena, clinic, TransactionDefinition::required())
        .unwrap();

    assert_eq!(uow.count(CLINIC).unwrap(), 0);
    assert_eq!(uow.count(VETERINARIAN).unwrap(), 1);
    assert_eq!(row_attr(&uow, VETERINARIAN, vet_id, "clinic_id"), AttrValue::Null);
    assert_eq!(arena.parent(vet, edges::CLINIC_VETERINARIANS), None);
}

#[test]
fn tag_associations_are_linked_reloaded_and_unlinked() {
    let db = MemoryDatabase::new();
    let mut uow = unit_of_work(&db);
    let mut arena = arena();
    let pet = arena.create_with(PET, [("name", "Rex")]).unwrap();
    let tag = arena.create_with(TAG, [("label", "senior")]).unwrap();
    arena.attach(pet, edges::PET_TAGS, tag).unwrap();
    uow.save(&mut arena, pet, TransactionDefinition::required())
        .unwrap();
    let (pet_id, tag_id) = (id_of(&arena, pet), id_of(&arena, tag));
    assert_eq!(uow.store().linked("pet_tags", pet_id).unwrap(), vec![tag_id]);

    let mut reloaded = RecordArena::new(Arc::clone(arena.schema()));
    let pet = uow.load(&mut reloaded, PET, pet_id).unwrap();
    let tags = uow
        .load_associations(&mut reloaded, pet, edges::PET_TAGS)
        .unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(reloaded.id(tags[0]), Some(tag_id));

    reloaded.detach(pet, edges::PET_TAGS, tags[0]).unwrap();
    let report = uow
        .save(&mut reloaded, pet, TransactionDefinition::required())
        .unwrap();

    assert_eq!(report.plan.len(), 1);
    assert!(uow.store().linked("pet_tags", pet_id).unwrap().is_empty());
    assert_eq!(uow.count(TAG).unwrap(), 1);
}
