use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;
use waypoint_core::db::open_db_in_memory;
use waypoint_core::{
    CatalogRepository, CreateItemRequest, DayPatch, ItemId, ItemPatch, ItineraryRepoError,
    ItineraryRepository, Place, PlaceId, RepoErrorKind, ReorderRequest, SqliteCatalogRepository,
    SqliteItineraryRepository, TransportMode, Trip, TripId,
};

fn seed(conn: &Connection, places: usize) -> (Trip, Vec<PlaceId>) {
    let catalog = SqliteCatalogRepository::try_new(conn).unwrap();
    let trip = catalog
        .create_trip("Osaka", NaiveDate::from_ymd_opt(2026, 4, 1))
        .unwrap();
    let place_ids = (0..places)
        .map(|n| {
            let place = Place::new(format!("Place {n}"));
            catalog.create_place(&place).unwrap();
            catalog.save_place(trip.trip_id, place.place_id, None).unwrap();
            place.place_id
        })
        .collect();
    (trip, place_ids)
}

fn append(repo: &SqliteItineraryRepository<'_>, day_id: Uuid, place_id: PlaceId) -> ItemId {
    repo.create_item(&CreateItemRequest::new(day_id, place_id, None))
        .unwrap()
        .item_id
}

fn day_order(repo: &SqliteItineraryRepository<'_>, trip_id: TripId, day_number: usize) -> Vec<ItemId> {
    let days = repo.list_days(trip_id).unwrap();
    days[day_number - 1]
        .items
        .iter()
        .map(|item| item.item_id)
        .collect()
}

fn reorder(day_id: Uuid, position: usize) -> ReorderRequest {
    ReorderRequest {
        target_day_id: day_id,
        target_position: position,
        client_timestamp: None,
    }
}

#[test]
fn create_day_numbers_days_and_derives_dates_from_trip_start() {
    let conn = open_db_in_memory().unwrap();
    let (trip, _) = seed(&conn, 0);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();

    let first = repo.create_day(trip.trip_id).unwrap();
    let second = repo.create_day(trip.trip_id).unwrap();
    assert_eq!(first.day_number, 1);
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 4, 1));
    assert_eq!(second.day_number, 2);
    assert_eq!(second.date, NaiveDate::from_ymd_opt(2026, 4, 2));

    let days = repo.list_days(trip.trip_id).unwrap();
    assert_eq!(
        days.iter().map(|day| day.day_id).collect::<Vec<_>>(),
        vec![first.day_id, second.day_id]
    );
}

#[test]
fn create_item_inserts_at_position_and_links_pool_entry() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 3);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();

    let a = append(&repo, day.day_id, places[0]);
    let b = append(&repo, day.day_id, places[1]);
    let c = repo
        .create_item(&CreateItemRequest::new(day.day_id, places[2], Some(1)))
        .unwrap();
    assert_eq!(c.sequence, 1.5);
    assert!(c.updated_at > 0);
    assert_eq!(day_order(&repo, trip.trip_id, 1), vec![a, c.item_id, b]);

    let pool = repo.list_pool(trip.trip_id).unwrap();
    let entry = pool.iter().find(|entry| entry.place_id == places[2]).unwrap();
    assert!(entry.placed);
    assert_eq!(entry.current_item_id, Some(c.item_id));
}

#[test]
fn create_item_rejects_unsaved_place_and_bad_duration() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 1);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();

    let err = repo
        .create_item(&CreateItemRequest::new(day.day_id, Uuid::new_v4(), None))
        .unwrap_err();
    assert!(matches!(err, ItineraryRepoError::PlaceNotInPool { .. }));
    assert_eq!(err.kind(), RepoErrorKind::NotFound);

    let mut request = CreateItemRequest::new(day.day_id, places[0], None);
    request.duration_minutes = Some(0);
    let err = repo.create_item(&request).unwrap_err();
    assert_eq!(err.kind(), RepoErrorKind::Validation);

    let err = repo
        .create_item(&CreateItemRequest::new(Uuid::new_v4(), places[0], None))
        .unwrap_err();
    assert!(matches!(err, ItineraryRepoError::DayNotFound(_)));
}

#[test]
fn reorder_within_day_uses_drop_slot_semantics() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 3);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();
    let a = append(&repo, day.day_id, places[0]);
    let b = append(&repo, day.day_id, places[1]);
    let c = append(&repo, day.day_id, places[2]);

    repo.reorder_item(c, &reorder(day.day_id, 0)).unwrap();
    assert_eq!(day_order(&repo, trip.trip_id, 1), vec![c, a, b]);

    // Slot 3 is after the last item; the item itself still counts.
    repo.reorder_item(c, &reorder(day.day_id, 3)).unwrap();
    assert_eq!(day_order(&repo, trip.trip_id, 1), vec![a, b, c]);

    let before = repo.get_item(a).unwrap().unwrap();
    let unchanged = repo.reorder_item(a, &reorder(day.day_id, 1)).unwrap();
    assert_eq!(unchanged, before);
    assert_eq!(day_order(&repo, trip.trip_id, 1), vec![a, b, c]);
}

#[test]
fn cross_day_reorder_clears_transport_link() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 2);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let first = repo.create_day(trip.trip_id).unwrap();
    let second = repo.create_day(trip.trip_id).unwrap();
    let a = append(&repo, first.day_id, places[0]);
    let b = append(&repo, second.day_id, places[1]);

    repo.update_item(
        a,
        &ItemPatch {
            transport_to_next: Some(Some(TransportMode::Subway)),
            transport_duration_minutes: Some(Some(20)),
            notes: Some(Some("JR pass".to_string())),
            ..ItemPatch::default()
        },
    )
    .unwrap();

    let moved = repo.reorder_item(a, &reorder(second.day_id, 0)).unwrap();
    assert_eq!(moved.day_id, second.day_id);
    assert_eq!(moved.transport_to_next, None);
    assert_eq!(moved.transport_duration_minutes, None);
    assert_eq!(moved.notes.as_deref(), Some("JR pass"));
    assert!(day_order(&repo, trip.trip_id, 1).is_empty());
    assert_eq!(day_order(&repo, trip.trip_id, 2), vec![a, b]);
}

#[test]
fn reorder_with_outdated_client_timestamp_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 2);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();
    let a = repo
        .create_item(&CreateItemRequest::new(day.day_id, places[0], None))
        .unwrap();
    append(&repo, day.day_id, places[1]);

    let edited = repo
        .update_item(
            a.item_id,
            &ItemPatch {
                duration_minutes: Some(Some(30)),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert!(edited.updated_at > a.updated_at);

    let err = repo
        .reorder_item(
            a.item_id,
            &ReorderRequest {
                target_day_id: day.day_id,
                target_position: 2,
                client_timestamp: Some(a.updated_at),
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), RepoErrorKind::Conflict);

    repo.reorder_item(
        a.item_id,
        &ReorderRequest {
            target_day_id: day.day_id,
            target_position: 2,
            client_timestamp: Some(edited.updated_at),
        },
    )
    .unwrap();
}

#[test]
fn repeated_inserts_between_neighbors_rebalance_and_keep_order() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 1);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();
    let first = append(&repo, day.day_id, places[0]);
    let last = append(&repo, day.day_id, places[0]);

    let mut expected = vec![first, last];
    for _ in 0..24 {
        let item = repo
            .create_item(&CreateItemRequest::new(day.day_id, places[0], Some(1)))
            .unwrap();
        expected.insert(1, item.item_id);
    }
    assert_eq!(day_order(&repo, trip.trip_id, 1), expected);

    // Move the tail into the tightest gap.
    repo.reorder_item(last, &reorder(day.day_id, 1)).unwrap();
    let tail = expected.pop().unwrap();
    expected.insert(1, tail);
    assert_eq!(day_order(&repo, trip.trip_id, 1), expected);

    let days = repo.list_days(trip.trip_id).unwrap();
    let keys: Vec<f64> = days[0].items.iter().map(|item| item.sequence).collect();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn deleting_one_copy_relinks_pool_to_remaining_copy() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 1);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let first = repo.create_day(trip.trip_id).unwrap();
    let second = repo.create_day(trip.trip_id).unwrap();
    let original = append(&repo, first.day_id, places[0]);
    let copy = append(&repo, second.day_id, places[0]);

    let entry = &repo.list_pool(trip.trip_id).unwrap()[0];
    assert_eq!(entry.current_item_id, Some(original));

    repo.delete_item(original).unwrap();
    let entry = &repo.list_pool(trip.trip_id).unwrap()[0];
    assert_eq!(entry.current_item_id, Some(copy));

    repo.delete_item(copy).unwrap();
    let entry = &repo.list_pool(trip.trip_id).unwrap()[0];
    assert!(!entry.placed);
    assert_eq!(entry.current_item_id, None);

    let err = repo.delete_item(copy).unwrap_err();
    assert!(matches!(err, ItineraryRepoError::ItemNotFound(id) if id == copy));
}

#[test]
fn delete_day_renumbers_later_days_and_unplaces_items() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 2);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let first = repo.create_day(trip.trip_id).unwrap();
    let second = repo.create_day(trip.trip_id).unwrap();
    let third = repo.create_day(trip.trip_id).unwrap();
    append(&repo, second.day_id, places[0]);
    append(&repo, third.day_id, places[1]);

    repo.delete_day(second.day_id).unwrap();

    let days = repo.list_days(trip.trip_id).unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].day_id, first.day_id);
    assert_eq!(days[1].day_id, third.day_id);
    assert_eq!(days[1].day_number, 2);
    assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2026, 4, 2));

    let pool = repo.list_pool(trip.trip_id).unwrap();
    let removed = pool.iter().find(|entry| entry.place_id == places[0]).unwrap();
    let kept = pool.iter().find(|entry| entry.place_id == places[1]).unwrap();
    assert!(!removed.placed);
    assert!(kept.placed);
}

#[test]
fn clear_day_and_update_day() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 2);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();
    append(&repo, day.day_id, places[0]);
    append(&repo, day.day_id, places[1]);

    repo.clear_day(day.day_id).unwrap();
    assert!(day_order(&repo, trip.trip_id, 1).is_empty());
    assert!(repo
        .list_pool(trip.trip_id)
        .unwrap()
        .iter()
        .all(|entry| !entry.placed));

    let updated = repo
        .update_day(
            day.day_id,
            &DayPatch {
                notes: Some(Some("rain plan".to_string())),
                default_transport: Some(Some(TransportMode::Bus)),
            },
        )
        .unwrap();
    assert_eq!(updated.notes.as_deref(), Some("rain plan"));
    assert_eq!(updated.default_transport, Some(TransportMode::Bus));
    assert_eq!(repo.list_days(trip.trip_id).unwrap()[0], updated);
}

#[test]
fn listing_unknown_trip_fails() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let missing = Uuid::new_v4();

    let err = repo.list_days(missing).unwrap_err();
    assert!(matches!(err, ItineraryRepoError::TripNotFound(id) if id == missing));
    assert!(repo.list_pool(missing).is_err());
}

#[test]
fn update_item_clears_fields_set_to_null() {
    let conn = open_db_in_memory().unwrap();
    let (trip, places) = seed(&conn, 1);
    let repo = SqliteItineraryRepository::try_new(&conn).unwrap();
    let day = repo.create_day(trip.trip_id).unwrap();
    let a = append(&repo, day.day_id, places[0]);

    repo.update_item(
        a,
        &ItemPatch {
            notes: Some(Some("closed mondays".to_string())),
            transport_to_next: Some(Some(TransportMode::Drive)),
            duration_minutes: Some(Some(60)),
            ..ItemPatch::default()
        },
    )
    .unwrap();
    let cleared = repo
        .update_item(
            a,
            &ItemPatch {
                notes: Some(None),
                transport_to_next: Some(None),
                ..ItemPatch::default()
            },
        )
        .unwrap();

    assert_eq!(cleared.notes, None);
    assert_eq!(cleared.transport_to_next, None);
    assert_eq!(cleared.duration_minutes, Some(60));
    assert_eq!(repo.get_item(a).unwrap(), Some(cleared));
}
