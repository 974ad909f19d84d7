use chrono::Utc;
use itertools::Itertools;
use sea_orm::sea_query::{all, any, Expr, LikeExpr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Select,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::db::error::DbResult;
use crate::entity::prelude::*;
use crate::entity::{bus_route, route_waypoint};
use crate::error::{BusConnectError, BusConnectResult};
use crate::geo::{get_search_box, Coordinate};

/// Route as returned in the API
/// as opposed to a [`bus_route::Model`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub start_location: Coordinate,
    pub end_location: Coordinate,
    pub waypoints: Vec<Waypoint>,
    #[serde(rename = "distanceInKm")]
    pub distance_km: f64,
    #[serde(rename = "estimatedTimeInMinutes")]
    pub estimated_minutes: i32,
    #[serde(rename = "fareAmount")]
    pub fare: f64,
    pub is_active: bool,
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Waypoint {
    #[serde(flatten)]
    pub position: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub day: Weekday,
    pub departure_time: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// Body of a route create or update
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RouteInput {
    pub name: String,
    pub description: String,
    pub start_location: Coordinate,
    pub end_location: Coordinate,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(rename = "distanceInKm")]
    pub distance_km: f64,
    #[serde(rename = "estimatedTimeInMinutes")]
    pub estimated_minutes: i32,
    #[serde(rename = "fareAmount")]
    pub fare: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

fn default_active() -> bool {
    true
}

impl RouteInput {
    pub fn validate(&self) -> BusConnectResult<()> {
        if self.name.trim().is_empty() {
            return Err(BusConnectError::invalid("Route name is required"));
        }
        self.start_location.validate()?;
        self.end_location.validate()?;
        for waypoint in &self.waypoints {
            waypoint.position.validate()?;
        }
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(BusConnectError::invalid("distanceInKm must not be negative"));
        }
        if self.estimated_minutes < 0 {
            return Err(BusConnectError::invalid(
                "estimatedTimeInMinutes must not be negative",
            ));
        }
        if !self.fare.is_finite() || self.fare < 0.0 {
            return Err(BusConnectError::invalid("fareAmount must not be negative"));
        }
        Ok(())
    }
}

fn into_route(model: bus_route::Model, waypoints: Vec<route_waypoint::Model>) -> DbResult<Route> {
    let waypoints = waypoints
        .into_iter()
        .sorted_by_key(|w| w.seq)
        .map(|w| Waypoint {
            position: Coordinate {
                latitude: w.latitude,
                longitude: w.longitude,
            },
            name: w.name,
        })
        .collect();

    Ok(Route {
        id: model.id,
        name: model.name,
        description: model.description,
        start_location: Coordinate {
            latitude: model.start_latitude,
            longitude: model.start_longitude,
        },
        end_location: Coordinate {
            latitude: model.end_latitude,
            longitude: model.end_longitude,
        },
        waypoints,
        distance_km: model.distance_km,
        estimated_minutes: model.estimated_minutes,
        fare: model.fare,
        is_active: model.is_active,
        schedule: serde_json::from_str(&model.schedule)?,
    })
}

/// Runs a route query, attaching each route's waypoints
async fn load_routes(
    db: &impl ConnectionTrait,
    select: Select<bus_route::Entity>,
) -> DbResult<Vec<Route>> {
    let rows = select
        .order_by_asc(bus_route::Column::Id)
        .find_with_related(RouteWaypoint)
        .all(db)
        .await?;

    rows.into_iter()
        .map(|(route, waypoints)| into_route(route, waypoints))
        .collect()
}

pub async fn get_active_routes(db: &impl ConnectionTrait) -> DbResult<Vec<Route>> {
    load_routes(
        db,
        BusRoute::find().filter(bus_route::Column::IsActive.eq(true)),
    )
    .await
}

pub async fn get_route(db: &impl ConnectionTrait, id: i64) -> BusConnectResult<Route> {
    load_routes(db, BusRoute::find_by_id(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BusConnectError::not_found("Route not found"))
}

/// Any route in `ids`, active or not. Unknown ids are skipped.
pub async fn get_routes_by_ids(
    db: &impl ConnectionTrait,
    ids: impl IntoIterator<Item = i64>,
) -> DbResult<Vec<Route>> {
    load_routes(db, BusRoute::find().filter(bus_route::Column::Id.is_in(ids))).await
}

/// `LIKE` pattern matching `query` anywhere, with its wildcards escaped
fn contains_pattern(query: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

/// Substring match on name or description of active routes.
/// Case folding is ASCII only, as with SQLite's `LIKE`.
pub async fn search_routes(db: &impl ConnectionTrait, query: &str) -> BusConnectResult<Vec<Route>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(BusConnectError::invalid("Search query is required"));
    }

    let routes = load_routes(
        db,
        BusRoute::find().filter(all![
            bus_route::Column::IsActive.eq(true),
            any![
                Expr::col((bus_route::Entity, bus_route::Column::Name)).like(contains_pattern(query)),
                Expr::col((bus_route::Entity, bus_route::Column::Description)).like(contains_pattern(query)),
            ]
        ]),
    )
    .await?;
    Ok(routes)
}

/// Active routes with a start, end or waypoint inside the search box around
/// `center`. Exact distances are left to [`crate::geo::find_nearby_routes`].
pub async fn get_candidate_routes(
    db: &impl ConnectionTrait,
    center: &Coordinate,
) -> DbResult<Vec<Route>> {
    use bus_route::Column as r;
    use route_waypoint::Column as w;

    let bounds = get_search_box(center);
    let (min, max) = (bounds.min(), bounds.max());

    let waypoint_routes = Query::select()
        .column(w::RouteId)
        .from(RouteWaypoint)
        .and_where(w::Latitude.between(min.y, max.y))
        .and_where(w::Longitude.between(min.x, max.x))
        .to_owned();

    load_routes(
        db,
        BusRoute::find().filter(all![
            r::IsActive.eq(true),
            any![
                all![
                    r::StartLatitude.between(min.y, max.y),
                    r::StartLongitude.between(min.x, max.x),
                ],
                all![
                    r::EndLatitude.between(min.y, max.y),
                    r::EndLongitude.between(min.x, max.x),
                ],
                r::Id.in_subquery(waypoint_routes),
            ]
        ]),
    )
    .await
}

async fn insert_waypoints(
    db: &impl ConnectionTrait,
    route_id: i64,
    waypoints: &[Waypoint],
) -> DbResult<()> {
    if waypoints.is_empty() {
        return Ok(());
    }

    let models = waypoints
        .iter()
        .enumerate()
        .map(|(seq, w)| route_waypoint::ActiveModel {
            route_id: Set(route_id),
            seq: Set(seq as i32),
            name: Set(w.name.clone()),
            latitude: Set(w.position.latitude),
            longitude: Set(w.position.longitude),
            ..Default::default()
        });

    RouteWaypoint::insert_many(models).exec(db).await?;
    Ok(())
}

fn apply_input(model: &mut bus_route::ActiveModel, input: &RouteInput) -> DbResult<()> {
    model.name = Set(input.name.trim().to_string());
    model.description = Set(input.description.clone());
    model.start_latitude = Set(input.start_location.latitude);
    model.start_longitude = Set(input.start_location.longitude);
    model.end_latitude = Set(input.end_location.latitude);
    model.end_longitude = Set(input.end_location.longitude);
    model.distance_km = Set(input.distance_km);
    model.estimated_minutes = Set(input.estimated_minutes);
    model.fare = Set(input.fare);
    model.is_active = Set(input.is_active);
    model.schedule = Set(serde_json::to_string(&input.schedule)?);
    model.updated_at = Set(Utc::now().timestamp_millis());
    Ok(())
}

pub async fn create_route<C>(db: &C, input: &RouteInput) -> BusConnectResult<Route>
where
    C: ConnectionTrait + TransactionTrait,
{
    input.validate()?;

    let tx = db.begin().await?;

    let mut model = bus_route::ActiveModel {
        created_at: Set(Utc::now().timestamp_millis()),
        ..Default::default()
    };
    apply_input(&mut model, input)?;
    let model = model.insert(&tx).await?;
    insert_waypoints(&tx, model.id, &input.waypoints).await?;

    let route = get_route(&tx, model.id).await?;
    tx.commit().await?;

    log::info!("Created route {} ({})", route.id, route.name);
    Ok(route)
}

/// Replaces every field of the route, including its waypoints
pub async fn update_route<C>(db: &C, id: i64, input: &RouteInput) -> BusConnectResult<Route>
where
    C: ConnectionTrait + TransactionTrait,
{
    input.validate()?;

    let tx = db.begin().await?;

    let mut model: bus_route::ActiveModel = BusRoute::find_by_id(id)
        .one(&tx)
        .await?
        .ok_or_else(|| BusConnectError::not_found("Route not found"))?
        .into();
    apply_input(&mut model, input)?;
    model.update(&tx).await?;

    RouteWaypoint::delete_many()
        .filter(route_waypoint::Column::RouteId.eq(id))
        .exec(&tx)
        .await?;
    insert_waypoints(&tx, id, &input.waypoints).await?;

    let route = get_route(&tx, id).await?;
    tx.commit().await?;

    Ok(route)
}

/// Soft delete, the route stays joinable from historical location updates
pub async fn delete_route(db: &impl ConnectionTrait, id: i64) -> BusConnectResult<()> {
    let mut model: bus_route::ActiveModel = BusRoute::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| BusConnectError::not_found("Route not found"))?
        .into();

    model.is_active = Set(false);
    model.updated_at = Set(Utc::now().timestamp_millis());
    model.update(db).await?;

    log::info!("Deactivated route {}", id);
    Ok(())
}
