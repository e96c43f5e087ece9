//! CLI demo entry point.
//!
//! # Responsibility
//! - Wire config, logging, storage and the reorder coordinator end to end.
//! - Seed a small trip, run a scripted drag session and print the result as
//!   JSON for quick local sanity checks.

use chrono::NaiveDate;
use log::info;
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;
use waypoint_core::db::{open_db, open_db_in_memory};
use waypoint_core::{
    init_from_config, CatalogRepository, CoreConfig, DragSession, DragSource, DragTarget,
    ItemBounds, ItemPatch, Place, PlaceCategory, ReorderCoordinator, SqliteCatalogRepository,
    SqliteItineraryRepository, TransportMode,
};

const ROW_HEIGHT: f64 = 48.0;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("waypoint: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    init_from_config(&config)?;

    let conn = match &config.db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };

    let catalog = SqliteCatalogRepository::try_new(&conn)?;
    let trip = catalog.create_trip("Kyoto long weekend", NaiveDate::from_ymd_opt(2026, 11, 20))?;
    let mut places = Vec::new();
    for (name, category) in [
        ("Fushimi Inari", PlaceCategory::Attraction),
        ("Nishiki Market", PlaceCategory::Shopping),
        ("Kissa Master", PlaceCategory::Cafe),
        ("Gion Karyo", PlaceCategory::Restaurant),
    ] {
        let mut place = Place::new(name);
        place.category = Some(category);
        catalog.create_place(&place)?;
        catalog.save_place(trip.trip_id, place.place_id, None)?;
        places.push(place.place_id);
    }

    let repo = SqliteItineraryRepository::try_new(&conn)?
        .with_rebalance_epsilon(config.rebalance_epsilon);
    let mut coordinator = ReorderCoordinator::load(repo, trip.trip_id, config.coordinator())?;
    let first_day = coordinator.add_day()?;
    let second_day = coordinator.add_day()?;

    for place_id in &places[..3] {
        let end = coordinator.day(first_day).map_or(0, |day| day.items.len());
        coordinator.add_item(*place_id, first_day, end)?;
    }

    // Drag the last pool entry onto the top of day one.
    let bounds: Vec<ItemBounds> = coordinator
        .day(first_day)
        .map(|day| {
            day.items
                .iter()
                .enumerate()
                .map(|(row, item)| ItemBounds {
                    item_id: item.item_id,
                    top: row as f64 * ROW_HEIGHT,
                    height: ROW_HEIGHT,
                })
                .collect()
        })
        .unwrap_or_default();
    let session = DragSession::start(DragSource::PoolEntry(places[3]));
    let target = DragTarget::Day {
        day_id: first_day,
        items: &bounds,
    };
    if let Some(intent) = session.finish(4.0, &target) {
        coordinator.apply_drop(intent)?;
    }

    let moved = coordinator
        .day(first_day)
        .and_then(|day| day.items.last())
        .map(|item| item.item_id);
    if let Some(item_id) = moved {
        coordinator.move_item(item_id, second_day, 0)?;
        coordinator.update_item(
            item_id,
            &ItemPatch {
                duration_minutes: Some(Some(90)),
                transport_to_next: Some(Some(TransportMode::Walk)),
                ..ItemPatch::default()
            },
        )?;
    }

    info!(
        "event=cli_demo module=cli status=ok trip_id={} days={}",
        coordinator.trip_id(),
        coordinator.days().len()
    );

    let output = json!({
        "version": waypoint_core::core_version(),
        "trip": trip,
        "days": coordinator.days(),
        "pool": coordinator.pool(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
