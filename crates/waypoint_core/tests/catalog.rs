use chrono::NaiveDate;
use waypoint_core::db::open_db_in_memory;
use waypoint_core::{CatalogRepoError, CatalogRepository, Place, PlaceCategory, SqliteCatalogRepository};
use uuid::Uuid;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn create_trip_trims_name_and_round_trips_start_date() {
    let conn = setup();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let start = NaiveDate::from_ymd_opt(2026, 3, 14);
    let trip = repo.create_trip("  Lisbon  ", start).unwrap();
    assert_eq!(trip.name, "Lisbon");

    let loaded = repo.get_trip(trip.trip_id).unwrap().unwrap();
    assert_eq!(loaded, trip);
    assert!(repo.get_trip(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn blank_trip_name_is_rejected() {
    let conn = setup();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let err = repo.create_trip("   ", None).unwrap_err();
    assert!(matches!(err, CatalogRepoError::InvalidName));
}

#[test]
fn place_round_trips_all_metadata() {
    let conn = setup();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let mut place = Place::new("Time Out Market");
    place.address = Some("Av. 24 de Julho 49".to_string());
    place.latitude = Some(38.7069);
    place.longitude = Some(-9.1459);
    place.category = Some(PlaceCategory::Restaurant);
    place.rating = Some(4.4);

    let place_id = repo.create_place(&place).unwrap();
    assert_eq!(repo.get_place(place_id).unwrap(), Some(place));
}

#[test]
fn saved_place_starts_unplaced_and_cannot_be_saved_twice() {
    let conn = setup();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();
    let trip = repo.create_trip("Lisbon", None).unwrap();
    let place = Place::new("Belem Tower");
    repo.create_place(&place).unwrap();

    let entry = repo
        .save_place(trip.trip_id, place.place_id, Some("sunset"))
        .unwrap();
    assert!(!entry.placed);
    assert_eq!(entry.current_item_id, None);
    assert_eq!(entry.notes.as_deref(), Some("sunset"));

    let err = repo.save_place(trip.trip_id, place.place_id, None).unwrap_err();
    assert!(matches!(err, CatalogRepoError::AlreadySaved { .. }));
}

#[test]
fn saving_unknown_place_or_trip_fails() {
    let conn = setup();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();
    let trip = repo.create_trip("Lisbon", None).unwrap();

    let missing_place = Uuid::new_v4();
    let err = repo.save_place(trip.trip_id, missing_place, None).unwrap_err();
    assert!(matches!(err, CatalogRepoError::PlaceNotFound(id) if id == missing_place));

    let place = Place::new("Alfama");
    repo.create_place(&place).unwrap();
    let missing_trip = Uuid::new_v4();
    let err = repo.save_place(missing_trip, place.place_id, None).unwrap_err();
    assert!(matches!(err, CatalogRepoError::TripNotFound(id) if id == missing_trip));
}
