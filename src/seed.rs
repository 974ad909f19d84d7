use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, TransactionTrait};

use crate::buses::{create_bus, BusStatus, NewBus};
use crate::entity::prelude::*;
use crate::error::BusConnectResult;
use crate::geo::Coordinate;
use crate::routes::{create_route, RouteInput, ScheduleEntry, Weekday};

const WEEKDAYS: [Weekday; 5] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
];

fn schedule(days: &[Weekday], departure_time: &str) -> Vec<ScheduleEntry> {
    days.iter()
        .map(|&day| ScheduleEntry {
            day,
            departure_time: departure_time.to_string(),
        })
        .collect()
}

fn sample_route(
    name: &str,
    description: &str,
    start: Coordinate,
    end: Coordinate,
    (distance_km, estimated_minutes, fare): (f64, i32, f64),
    is_active: bool,
    schedule: Vec<ScheduleEntry>,
) -> RouteInput {
    RouteInput {
        name: name.to_string(),
        description: description.to_string(),
        start_location: start,
        end_location: end,
        waypoints: vec![],
        distance_km,
        estimated_minutes,
        fare,
        is_active,
        schedule,
    }
}

fn sample_routes() -> Vec<RouteInput> {
    let city_center = Coordinate {
        latitude: 40.7128,
        longitude: -74.0060,
    };

    let mut airport_days = schedule(&WEEKDAYS, "05:30");
    airport_days.extend(schedule(&[Weekday::Saturday, Weekday::Sunday], "06:00"));

    vec![
        sample_route(
            "Downtown Express",
            "Direct route from downtown to business district",
            city_center,
            Coordinate {
                latitude: 40.7589,
                longitude: -73.9851,
            },
            (8.5, 45, 3.50),
            true,
            schedule(&WEEKDAYS, "06:00"),
        ),
        sample_route(
            "University Line",
            "Route connecting university campus to city center",
            Coordinate {
                latitude: 40.6892,
                longitude: -74.0445,
            },
            city_center,
            (6.2, 30, 2.75),
            true,
            schedule(&WEEKDAYS, "07:00"),
        ),
        sample_route(
            "Airport Shuttle",
            "Express service to international airport",
            city_center,
            Coordinate {
                latitude: 40.6413,
                longitude: -73.7781,
            },
            (15.3, 60, 8.00),
            true,
            airport_days,
        ),
        sample_route(
            "Suburban Route",
            "Connecting suburban areas to main city",
            Coordinate {
                latitude: 40.8176,
                longitude: -73.9782,
            },
            city_center,
            (12.7, 55, 4.25),
            false,
            vec![],
        ),
    ]
}

/// Buses as (number, licence, capacity, status, index of assigned sample route)
const SAMPLE_BUSES: [(&str, &str, i32, BusStatus, Option<usize>); 5] = [
    ("BUS-001", "NYC-1234", 45, BusStatus::InService, Some(0)),
    ("BUS-002", "NYC-5678", 40, BusStatus::InService, Some(1)),
    ("BUS-003", "NYC-9012", 50, BusStatus::Maintenance, None),
    ("BUS-004", "NYC-3456", 35, BusStatus::OutOfService, None),
    ("BUS-005", "NYC-7890", 42, BusStatus::InService, Some(2)),
];

/// Fills an empty database with sample routes and buses. Does nothing if
/// any route or bus already exists.
pub async fn seed_if_empty(db: &DatabaseConnection) -> BusConnectResult<bool> {
    if BusRoute::find().count(db).await? > 0 || Bus::find().count(db).await? > 0 {
        log::info!("Database already has data, not seeding");
        return Ok(false);
    }

    seed_sample_data(db).await?;
    Ok(true)
}

/// Inserts every sample route and bus in one transaction
async fn seed_sample_data<C>(db: &C) -> BusConnectResult<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let tx = db.begin().await?;

    let mut route_ids = vec![];
    for input in sample_routes() {
        let route = create_route(&tx, &input).await?;
        route_ids.push(route.id);
    }

    for (bus_number, license_number, capacity, current_status, route_index) in SAMPLE_BUSES {
        let input = NewBus {
            bus_number: bus_number.to_string(),
            license_number: license_number.to_string(),
            capacity,
            current_route_id: route_index.map(|i| route_ids[i]),
            current_status,
        };
        create_bus(&tx, &input).await?;
    }

    tx.commit().await?;

    log::info!(
        "Seeded {} sample routes and {} sample buses",
        route_ids.len(),
        SAMPLE_BUSES.len()
    );
    Ok(())
}
