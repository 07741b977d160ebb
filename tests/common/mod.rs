//! Shared ride fixture for the SQLite integration tests

#![allow(dead_code)]

use ride_insights::handlers::database::{RideStore, SqliteStore};
use std::sync::Arc;

pub const SCHEMA: &str = r#"
CREATE TABLE zones (
    zone_id INTEGER PRIMARY KEY,
    borough TEXT,
    zone_name TEXT,
    service_zone TEXT
);

CREATE TABLE trips (
    trip_id INTEGER PRIMARY KEY,
    pickup_datetime TEXT NOT NULL,
    dropoff_datetime TEXT NOT NULL,
    pickup_zone_id INTEGER NOT NULL,
    dropoff_zone_id INTEGER NOT NULL,
    passenger_count INTEGER,
    trip_distance REAL NOT NULL,
    fare_amount REAL NOT NULL,
    tip_amount REAL,
    total_amount REAL
);

CREATE TABLE derived_features (
    trip_id INTEGER PRIMARY KEY,
    tip_percentage REAL,
    trip_duration_minutes REAL,
    time_of_day TEXT,
    trip_speed_mph REAL,
    day_type TEXT
);
"#;

pub struct FixtureZone {
    pub zone_id: i64,
    pub borough: &'static str,
    pub zone_name: &'static str,
}

pub static ZONES: [FixtureZone; 4] = [
    FixtureZone {
        zone_id: 1,
        borough: "Manhattan",
        zone_name: "Midtown Center",
    },
    FixtureZone {
        zone_id: 2,
        borough: "Manhattan",
        zone_name: "Upper East Side North",
    },
    FixtureZone {
        zone_id: 3,
        borough: "Queens",
        zone_name: "JFK Airport",
    },
    FixtureZone {
        zone_id: 4,
        borough: "Brooklyn",
        zone_name: "Park Slope",
    },
];

/// 異常として検出される乗車
pub const FARE_OUTLIER_TRIP: i64 = 12;
pub const SPEED_OUTLIER_TRIP: i64 = 30;
pub const TRIP_COUNT: i64 = 30;

#[derive(Debug, Clone)]
pub struct FixtureTrip {
    pub trip_id: i64,
    pub day: u32,
    pub hour: u32,
    pub pickup_zone_id: i64,
    pub dropoff_zone_id: i64,
    pub passenger_count: i64,
    pub trip_distance: f64,
    pub fare_amount: f64,
    pub speed_mph: f64,
}

impl FixtureTrip {
    pub fn pickup_datetime(&self) -> String {
        format!("2019-01-{:02} {:02}:15:00", self.day, self.hour)
    }

    pub fn duration_minutes(&self) -> f64 {
        self.trip_distance / self.speed_mph * 60.0
    }

    pub fn touches_borough(&self, borough: &str) -> bool {
        [self.pickup_zone_id, self.dropoff_zone_id]
            .iter()
            .any(|id| zone(*id).borough == borough)
    }
}

pub fn zone(zone_id: i64) -> &'static FixtureZone {
    ZONES
        .iter()
        .find(|z| z.zone_id == zone_id)
        .expect("fixture zone")
}

/// 3日間・30件。zone 1 に12件集中させ運賃分析の対象にする
pub fn trips() -> Vec<FixtureTrip> {
    (0..TRIP_COUNT as usize)
        .map(|i| {
            let trip_id = i as i64 + 1;
            let pickup_zone_id = if i < 12 { 1 } else { [2, 3, 4][i % 3] };
            let fare_amount = if trip_id == FARE_OUTLIER_TRIP {
                150.0
            } else {
                10.0 + (i % 4) as f64
            };
            let speed_mph = if trip_id == SPEED_OUTLIER_TRIP {
                120.0
            } else {
                12.0 + (i % 3) as f64
            };

            FixtureTrip {
                trip_id,
                day: 1 + (i % 3) as u32,
                hour: ((i * 5) % 24) as u32,
                pickup_zone_id,
                dropoff_zone_id: [3, 1, 2, 4][i % 4],
                passenger_count: 1 + (i % 3) as i64,
                trip_distance: 1.0 + (i % 5) as f64,
                fare_amount,
                speed_mph,
            }
        })
        .collect()
}

pub fn seed_script(trips: &[FixtureTrip]) -> String {
    let mut sql = String::from(SCHEMA);

    for z in &ZONES {
        sql.push_str(&format!(
            "INSERT INTO zones VALUES ({}, '{}', '{}', 'Boro Zone');\n",
            z.zone_id, z.borough, z.zone_name
        ));
    }

    for t in trips {
        sql.push_str(&format!(
            "INSERT INTO trips VALUES ({}, '{}', '{}', {}, {}, {}, {:.1}, {:.2}, 1.50, {:.2});\n",
            t.trip_id,
            t.pickup_datetime(),
            t.pickup_datetime(),
            t.pickup_zone_id,
            t.dropoff_zone_id,
            t.passenger_count,
            t.trip_distance,
            t.fare_amount,
            t.fare_amount + 1.5
        ));
        sql.push_str(&format!(
            "INSERT INTO derived_features VALUES ({}, {:.4}, {:.4}, 'morning', {:.1}, 'weekday');\n",
            t.trip_id,
            1.5 / t.fare_amount * 100.0,
            t.duration_minutes(),
            t.speed_mph
        ));
    }

    sql
}

pub async fn seeded_store() -> Arc<dyn RideStore> {
    let store = SqliteStore::in_memory().await.expect("in-memory sqlite");
    store
        .execute_script(&seed_script(&trips()))
        .await
        .expect("seed fixture");
    Arc::new(store)
}
