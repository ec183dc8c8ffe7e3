mod common;

use common::*;
use rowview::{
    AnyView, ColumnSpec, ConstTableView, Predicate, TableKey, Value, ViewError, DETACHED_REF,
};

#[test]
fn test_round_trip_preserves_rows_sort_and_query() {
    init_tracing();
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    assert_eq!(owner.version(), other.version());

    let table = owner.get_table("people").unwrap();
    let mut view = table.where_().less(AGE, 100_i64).find_all().unwrap();
    view.sort(NAME, false).unwrap();

    let handover = owner.export_for_handover(&view).unwrap();
    assert!(handover.patch().unwrap().was_in_sync);
    let imported = other.import_from_handover(handover).unwrap();
    assert!(imported.is_mutable());
    let imported = imported.into_mutable().unwrap();

    assert_eq!(imported.row_refs(), view.row_refs());
    assert_eq!(imported.sort_descriptor(), view.sort_descriptor());
    assert_eq!(imported.predicate(), view.predicate());
    assert!(imported.is_in_sync());

    let dest = other.get_table("people").unwrap();
    assert!(imported.get_parent().unwrap().ptr_eq(&dest));
    assert!(!imported.get_parent().unwrap().ptr_eq(&table));

    // independent lifetimes
    drop(view);
    assert_eq!(table.read().registry().len(), 0);
    assert_eq!(dest.read().registry().len(), 1);
    write(&other, |_| imported.set_int(AGE, 0, 18).unwrap());
    assert_eq!(imported.get_int(AGE, 0).unwrap(), 18);
    assert_eq!(table.read().get_int(AGE, 3).unwrap(), 17);
}

#[test]
fn test_const_view_imports_as_read_only() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let table = owner.get_table("people").unwrap();
    let view = ConstTableView::from(table.find_all_int(AGE, 17).unwrap());

    let imported = other
        .import_from_handover(owner.export_for_handover(&view).unwrap())
        .unwrap();
    assert!(matches!(imported, AnyView::ReadOnly(_)));
    assert_eq!(imported.base().row_refs(), vec![1, 3]);
    assert!(imported.clone().into_mutable().is_none());
    assert_eq!(imported.into_const().count_int(AGE, 17).unwrap(), 2);
}

#[test]
fn test_import_at_other_snapshot_fails_fast() {
    init_tracing();
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let lagging = db.begin_read();
    let writer = db.begin_read();
    write(&writer, |sg| {
        let table = sg.get_table("people").unwrap();
        table.write().set_int(AGE, 0, 1).unwrap();
    });
    owner.advance_read().unwrap();

    let table = owner.get_table("people").unwrap();
    let view = table.view_all().unwrap();
    let handover = owner.export_for_handover(&view).unwrap();
    assert!(matches!(
        lagging.import_from_handover(handover),
        Err(ViewError::HandoverSnapshotMismatch { .. })
    ));

    // a failed import leaves the patch in place for a matching context
    let handover = owner.export_for_handover(&view).unwrap();
    let (mut free, mut patch) = handover.into_parts();
    let err = free.apply_and_consume_patch(&mut patch, lagging.group());
    assert!(matches!(err, Err(ViewError::HandoverSnapshotMismatch { exported, pinned }) if exported == pinned + 1));
    assert!(patch.is_some());

    lagging.advance_read().unwrap();
    free.apply_and_consume_patch(&mut patch, lagging.group()).unwrap();
    assert!(patch.is_none());
    assert_eq!(free.base().get_int(AGE, 0).unwrap(), 1);
}

#[test]
fn test_patch_is_consumed_exactly_once() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let view = owner.get_table("people").unwrap().view_all().unwrap();

    let (mut free, mut patch) = owner.export_for_handover(&view).unwrap().into_parts();
    free.apply_and_consume_patch(&mut patch, other.group()).unwrap();
    assert!(matches!(
        free.apply_and_consume_patch(&mut patch, other.group()),
        Err(ViewError::PatchConsumed)
    ));
}

#[test]
fn test_stale_view_stays_stale_after_import() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let view = owner
        .get_table("people")
        .unwrap()
        .where_()
        .less(AGE, 100_i64)
        .find_all()
        .unwrap();

    let writer = db.begin_read();
    write(&writer, |sg| {
        sg.get_table("people").unwrap().write().set_int(AGE, 1, 300).unwrap();
    });
    owner.advance_read().unwrap();
    other.advance_read().unwrap();
    assert!(!view.is_in_sync());

    let handover = owner.export_for_handover(&view).unwrap();
    assert!(!handover.patch().unwrap().was_in_sync);
    let imported = other.import_from_handover(handover).unwrap().into_const();
    assert!(!imported.is_in_sync());
    assert_eq!(imported.row_refs(), vec![0, 1, 2, 3]);
    imported.sync_if_needed().unwrap();
    assert_eq!(imported.row_refs(), vec![0, 2, 3]);
}

#[test]
fn test_move_handover_gives_up_the_source() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let table = owner.get_table("people").unwrap();
    let mut view = table.view_all().unwrap();
    view.sort(SCORE, false).unwrap();
    let refs = view.row_refs();

    let handover = owner.export_for_handover_move(view).unwrap();
    assert_eq!(table.read().registry().len(), 0);
    let imported = other.import_from_handover(handover).unwrap().into_mutable().unwrap();
    assert_eq!(imported.row_refs(), refs);
    assert!(imported.is_in_sync());
}

#[test]
fn test_restricted_view_brings_its_parent() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let table = owner.get_table("people").unwrap();
    let mut adults = table.where_().greater_equal(AGE, 18_i64).find_all().unwrap();
    adults.sort(NAME, true).unwrap();
    let high = adults
        .find_all(Predicate::Gte {
            column: SCORE,
            value: Value::Double(4.5),
        })
        .unwrap();

    let imported = other
        .import_from_handover(owner.export_for_handover(&high).unwrap())
        .unwrap()
        .into_mutable()
        .unwrap();
    assert_eq!(imported.row_refs(), vec![0, 2]);
    assert!(imported.is_in_sync());

    // the imported parent is live in the destination context
    write(&other, |sg| {
        sg.get_table("people").unwrap().write().set_double(SCORE, 4, 9.0).unwrap();
    });
    imported.sync_if_needed().unwrap();
    assert_eq!(imported.row_refs(), vec![0, 2, 4]);
    assert_eq!(high.row_refs(), vec![0, 2]);
}

#[test]
fn test_link_list_view_handover() {
    let db = database_with_people(&sample());
    let setup = db.begin_read();
    write(&setup, |sg| {
        let teams = sg
            .add_table("teams", vec![ColumnSpec::link_list("members", TableKey(0))])
            .unwrap();
        teams.write().add_empty_row().unwrap();
        let members = teams.get_linklist(0, 0).unwrap();
        members.add(4).unwrap();
        members.add(1).unwrap();
    });

    let owner = db.begin_read();
    let other = db.begin_read();
    let members = owner.get_table("teams").unwrap().get_linklist(0, 0).unwrap();
    let view = members.view().unwrap();
    assert_eq!(view.row_refs(), vec![4, 1]);

    let imported = other
        .import_from_handover(owner.export_for_handover(&view).unwrap())
        .unwrap()
        .into_const();
    assert_eq!(imported.row_refs(), vec![4, 1]);
    assert!(imported.is_in_sync());
    assert_eq!(imported.get_string(NAME, 0).unwrap(), "eve");

    write(&other, |sg| {
        sg.get_table("teams").unwrap().get_linklist(0, 0).unwrap().remove(0).unwrap();
    });
    assert!(!imported.is_in_sync());
    imported.sync_if_needed().unwrap();
    assert_eq!(imported.row_refs(), vec![1]);
}

#[test]
fn test_row_accessor_handover() {
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let row = owner.get_table("people").unwrap().get_row(2).unwrap();

    let handover = owner.export_row_for_handover(&row).unwrap();
    assert_eq!(handover.version(), Some(owner.version()));
    let moved = other.import_row_from_handover(handover).unwrap();
    assert_eq!(moved.get_string(NAME).unwrap(), "cid");
    assert!(moved.table().unwrap().ptr_eq(&other.get_table("people").unwrap()));

    // it follows structural changes in its new context only
    write(&other, |sg| sg.get_table("people").unwrap().write().remove(0).unwrap());
    assert_eq!(moved.index().unwrap(), 1);
    assert_eq!(row.index().unwrap(), 2);
}

#[test]
fn test_export_is_refused_during_write() {
    let db = database_with_people(&sample());
    let sg = db.begin_read();
    let view = sg.get_table("people").unwrap().view_all().unwrap();
    sg.promote_to_write().unwrap();
    assert!(matches!(
        sg.export_for_handover(&view),
        Err(ViewError::WrongTransactStage(_))
    ));
    sg.commit_and_continue_as_read().unwrap();
    assert!(sg.export_for_handover(&view).is_ok());
}

#[test]
fn test_stealing_from_another_thread() {
    init_tracing();
    let db = database_with_people(&sample());
    let owner = db.begin_read();
    let other = db.begin_read();
    let table = owner.get_table("people").unwrap();
    let view = table.where_().less(AGE, 100_i64).find_all().unwrap();

    let handover = std::thread::scope(|s| {
        let thief = s.spawn(|| owner.export_for_handover(&view));
        // owner keeps reading while the export runs
        for _ in 0..100 {
            assert_eq!(view.size(), 4);
            assert_eq!(view.sum_int(AGE).unwrap(), 110);
        }
        thief.join().unwrap()
    })
    .unwrap();

    let imported = std::thread::scope(|s| {
        s.spawn(|| other.import_from_handover(handover).map(AnyView::into_const))
            .join()
            .unwrap()
    })
    .unwrap();
    assert_eq!(imported.row_refs(), view.row_refs());
}

#[test]
fn test_advance_read_adjusts_views_and_rows() {
    init_tracing();
    let db = database_with_people(&sample());
    let reader = db.begin_read();
    let table = reader.get_table("people").unwrap();
    let view = table.where_().less(AGE, 100_i64).find_all().unwrap();
    let eve = table.get_row(4).unwrap();

    let writer = db.begin_read();
    write(&writer, |sg| {
        let people = sg.get_table("people").unwrap();
        let mut t = people.write();
        t.remove(0).unwrap();
        t.insert_empty_rows(0, 1).unwrap();
        t.move_last_over(1).unwrap();
    });

    let before = reader.version();
    assert_eq!(reader.advance_read().unwrap(), before + 1);
    assert_eq!(view.row_refs(), vec![DETACHED_REF, DETACHED_REF, 2, 3]);
    assert_eq!(view.get_string(NAME, 2).unwrap(), "cid");
    assert_eq!(eve.index().unwrap(), 1);
    assert_eq!(eve.get_string(NAME).unwrap(), "eve");

    assert!(!view.is_in_sync());
    view.sync_if_needed().unwrap();
    assert_eq!(view.row_refs(), vec![0, 2, 3]);
}
