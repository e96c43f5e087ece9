//! Catalog repository: trips, places and saved-place pools.
//!
//! # Responsibility
//! - Seed and read the records the ordering engine references by id.
//! - Keep SQL details inside repository boundary.
//!
//! # Invariants
//! - Places are immutable after insert.
//! - A place is saved at most once per trip pool and starts unplaced.

use crate::db::{ensure_schema_ready, DbError, RequiredTable};
use crate::model::itinerary::{Trip, TripId};
use crate::model::place::{Place, PlaceCategory, PlaceId, PoolEntry};
use crate::repo::parse_uuid;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "trips",
        columns: &["trip_uuid", "name", "start_date"],
    },
    RequiredTable {
        name: "places",
        columns: &[
            "place_uuid",
            "name",
            "address",
            "latitude",
            "longitude",
            "category",
            "rating",
        ],
    },
    RequiredTable {
        name: "pool_entries",
        columns: &[
            "trip_uuid",
            "place_uuid",
            "notes",
            "is_placed",
            "current_item_uuid",
        ],
    },
];

/// Result type used by catalog repository operations.
pub type CatalogRepoResult<T> = Result<T, CatalogRepoError>;

/// Errors from catalog repository operations.
#[derive(Debug)]
pub enum CatalogRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target trip does not exist.
    TripNotFound(TripId),
    /// Target place does not exist.
    PlaceNotFound(PlaceId),
    /// Place is already in the trip pool.
    AlreadySaved { trip_id: TripId, place_id: PlaceId },
    /// Trip name is blank after trim.
    InvalidName,
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for CatalogRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TripNotFound(id) => write!(f, "trip not found: {id}"),
            Self::PlaceNotFound(id) => write!(f, "place not found: {id}"),
            Self::AlreadySaved { trip_id, place_id } => {
                write!(f, "place {place_id} is already saved in trip {trip_id}")
            }
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::InvalidData(message) => write!(f, "invalid catalog data: {message}"),
        }
    }
}

impl Error for CatalogRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CatalogRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CatalogRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for catalog seeding and lookup.
pub trait CatalogRepository {
    /// Creates one trip.
    fn create_trip(&self, name: &str, start_date: Option<NaiveDate>) -> CatalogRepoResult<Trip>;
    /// Loads one trip by id.
    fn get_trip(&self, trip_id: TripId) -> CatalogRepoResult<Option<Trip>>;
    /// Inserts one immutable place.
    fn create_place(&self, place: &Place) -> CatalogRepoResult<PlaceId>;
    /// Loads one place by id.
    fn get_place(&self, place_id: PlaceId) -> CatalogRepoResult<Option<Place>>;
    /// Saves one place into a trip pool as unplaced.
    fn save_place(
        &self,
        trip_id: TripId,
        place_id: PlaceId,
        notes: Option<&str>,
    ) -> CatalogRepoResult<PoolEntry>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogRepoResult<Self> {
        ensure_schema_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_trip(&self, name: &str, start_date: Option<NaiveDate>) -> CatalogRepoResult<Trip> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogRepoError::InvalidName);
        }

        let trip = Trip {
            trip_id: Uuid::new_v4(),
            name: name.to_string(),
            start_date,
        };
        self.conn.execute(
            "INSERT INTO trips (trip_uuid, name, start_date) VALUES (?1, ?2, ?3);",
            params![trip.trip_id.to_string(), trip.name.as_str(), trip.start_date],
        )?;
        Ok(trip)
    }

    fn get_trip(&self, trip_id: TripId) -> CatalogRepoResult<Option<Trip>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, start_date FROM trips WHERE trip_uuid = ?1;",
                [trip_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<NaiveDate>>(1)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(name, start_date)| Trip {
            trip_id,
            name,
            start_date,
        }))
    }

    fn create_place(&self, place: &Place) -> CatalogRepoResult<PlaceId> {
        if place.name.trim().is_empty() {
            return Err(CatalogRepoError::InvalidName);
        }
        self.conn.execute(
            "INSERT INTO places (
                place_uuid,
                name,
                address,
                latitude,
                longitude,
                category,
                rating
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                place.place_id.to_string(),
                place.name.as_str(),
                place.address.as_deref(),
                place.latitude,
                place.longitude,
                place.category.map(PlaceCategory::as_str),
                place.rating,
            ],
        )?;
        Ok(place.place_id)
    }

    fn get_place(&self, place_id: PlaceId) -> CatalogRepoResult<Option<Place>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                place_uuid,
                name,
                address,
                latitude,
                longitude,
                category,
                rating
             FROM places
             WHERE place_uuid = ?1;",
        )?;
        let mut rows = stmt.query([place_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_place_row(row)?));
        }
        Ok(None)
    }

    fn save_place(
        &self,
        trip_id: TripId,
        place_id: PlaceId,
        notes: Option<&str>,
    ) -> CatalogRepoResult<PoolEntry> {
        if self.get_trip(trip_id)?.is_none() {
            return Err(CatalogRepoError::TripNotFound(trip_id));
        }
        if self.get_place(place_id)?.is_none() {
            return Err(CatalogRepoError::PlaceNotFound(place_id));
        }

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO pool_entries (trip_uuid, place_uuid, notes, is_placed)
             VALUES (?1, ?2, ?3, 0);",
            params![trip_id.to_string(), place_id.to_string(), notes],
        )?;
        if inserted == 0 {
            return Err(CatalogRepoError::AlreadySaved { trip_id, place_id });
        }

        let mut entry = PoolEntry::unplaced(place_id);
        entry.notes = notes.map(str::to_string);
        Ok(entry)
    }
}

fn parse_place_row(row: &Row<'_>) -> CatalogRepoResult<Place> {
    let place_uuid_text: String = row.get("place_uuid")?;
    let place_id =
        parse_uuid(&place_uuid_text, "places.place_uuid").map_err(CatalogRepoError::InvalidData)?;

    let category = match row.get::<_, Option<String>>("category")? {
        Some(value) => Some(PlaceCategory::parse(&value).ok_or_else(|| {
            CatalogRepoError::InvalidData(format!("invalid category `{value}` in places.category"))
        })?),
        None => None,
    };

    Ok(Place {
        place_id,
        name: row.get("name")?,
        address: row.get("address")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        category,
        rating: row.get("rating")?,
    })
}
