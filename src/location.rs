use chrono::{DateTime, Utc};
use itertools::Itertools;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::activity::{rank_active_routes, window_start, ActiveRoute};
use crate::buses::BusStatus;
use crate::db::error::{DbError, DbResult};
use crate::db::util::from_millis;
use crate::entity::{bus, location_update};
use crate::error::{BusConnectError, BusConnectResult};
use crate::geo::Coordinate;
use crate::routes::get_routes_by_ids;

/// Most updates returned for one bus's history
pub const HISTORY_LIMIT: u64 = 100;

/// Location update as returned in the API
/// as opposed to a [`location_update::Model`]
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub id: i64,
    pub bus_id: i64,
    pub route_id: i64,
    pub position: Coordinate,
    pub speed: f64,
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<location_update::Model> for LocationUpdate {
    type Error = DbError;

    fn try_from(model: location_update::Model) -> DbResult<Self> {
        Ok(LocationUpdate {
            id: model.id,
            bus_id: model.bus_id,
            route_id: model.route_id,
            position: Coordinate {
                latitude: model.latitude,
                longitude: model.longitude,
            },
            speed: model.speed,
            heading: model.heading,
            timestamp: from_millis(model.timestamp)?,
        })
    }
}

fn into_updates(models: Vec<location_update::Model>) -> DbResult<Vec<LocationUpdate>> {
    models.into_iter().map(LocationUpdate::try_from).collect()
}

/// Body of a location report from a bus
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewLocationUpdate {
    pub bus_id: i64,
    pub route_id: i64,
    pub position: Coordinate,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
}

/// Latest update of a bus on a route, with the bus number
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusPosition {
    #[serde(flatten)]
    pub update: LocationUpdate,
    pub bus_number: String,
}

/// Stores a location report and moves the bus's cached location to it.
///
/// Both writes happen in one transaction. The last committed report for a
/// bus wins; an unknown bus only gets the report stored.
pub async fn record_location<C>(db: &C, input: &NewLocationUpdate) -> BusConnectResult<LocationUpdate>
where
    C: ConnectionTrait + TransactionTrait,
{
    input.position.validate()?;
    if !input.speed.is_finite() || !input.heading.is_finite() {
        return Err(BusConnectError::invalid("speed and heading must be numbers"));
    }

    let now = Utc::now().timestamp_millis();

    let tx = db.begin().await?;

    let saved = location_update::ActiveModel {
        bus_id: Set(input.bus_id),
        route_id: Set(input.route_id),
        latitude: Set(input.position.latitude),
        longitude: Set(input.position.longitude),
        speed: Set(input.speed),
        heading: Set(input.heading),
        timestamp: Set(now),
        ..Default::default()
    }
    .insert(&tx)
    .await?;

    let updated = bus::Entity::update_many()
        .col_expr(bus::Column::CurrentLatitude, Expr::value(input.position.latitude))
        .col_expr(bus::Column::CurrentLongitude, Expr::value(input.position.longitude))
        .col_expr(bus::Column::LastUpdated, Expr::value(now))
        .filter(bus::Column::Id.eq(input.bus_id))
        .exec(&tx)
        .await?;

    tx.commit().await?;

    if updated.rows_affected == 0 {
        log::warn!("Location update {} is for unknown bus {}", saved.id, input.bus_id);
    }
    log::debug!(
        "Bus {} on route {} at {}, {}",
        input.bus_id,
        input.route_id,
        input.position.latitude,
        input.position.longitude
    );

    Ok(saved.try_into()?)
}

/// Every update at or after `since`, oldest first
pub async fn get_updates_since(
    db: &impl ConnectionTrait,
    since: DateTime<Utc>,
) -> DbResult<Vec<LocationUpdate>> {
    let models = location_update::Entity::find()
        .filter(location_update::Column::Timestamp.gte(since.timestamp_millis()))
        .order_by_asc(location_update::Column::Timestamp)
        .all(db)
        .await?;

    into_updates(models)
}

/// The busiest routes over the last `window_hours`
pub async fn get_active_routes(
    db: &impl ConnectionTrait,
    window_hours: f64,
    top_n: usize,
) -> BusConnectResult<Vec<ActiveRoute>> {
    let now = Utc::now();
    let since = window_start(now, window_hours)?;

    let updates = get_updates_since(db, since).await?;
    let route_ids = updates.iter().map(|u| u.route_id).unique().collect_vec();
    let routes = get_routes_by_ids(db, route_ids).await?;

    rank_active_routes(&updates, window_hours, &routes, top_n, now)
}

/// For each in-service bus assigned to the route, its latest update on it
pub async fn get_route_positions(
    db: &impl ConnectionTrait,
    route_id: i64,
) -> DbResult<Vec<BusPosition>> {
    use location_update::Column as lu;

    let buses = bus::Entity::find()
        .filter(bus::Column::CurrentRouteId.eq(route_id))
        .filter(bus::Column::CurrentStatus.eq(BusStatus::InService.as_str()))
        .order_by_asc(bus::Column::Id)
        .all(db)
        .await?;

    let mut positions = vec![];

    for bus in buses {
        let latest = location_update::Entity::find()
            .filter(lu::BusId.eq(bus.id))
            .filter(lu::RouteId.eq(route_id))
            .order_by_desc(lu::Timestamp)
            .order_by_desc(lu::Id)
            .one(db)
            .await?;

        if let Some(latest) = latest {
            positions.push(BusPosition {
                update: latest.try_into()?,
                bus_number: bus.bus_number,
            });
        }
    }

    Ok(positions)
}

/// A bus's updates within the optional range, oldest first, capped at [`HISTORY_LIMIT`]
pub async fn get_bus_history(
    db: &impl ConnectionTrait,
    bus_id: i64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> BusConnectResult<Vec<LocationUpdate>> {
    use location_update::Column as lu;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(BusConnectError::invalid("'from' must not be after 'to'"));
        }
    }

    let mut query = location_update::Entity::find().filter(lu::BusId.eq(bus_id));
    if let Some(from) = from {
        query = query.filter(lu::Timestamp.gte(from.timestamp_millis()));
    }
    if let Some(to) = to {
        query = query.filter(lu::Timestamp.lte(to.timestamp_millis()));
    }

    let models = query
        .order_by_asc(lu::Timestamp)
        .order_by_asc(lu::Id)
        .limit(HISTORY_LIMIT)
        .all(db)
        .await?;

    Ok(into_updates(models)?)
}
