mod activity;
mod buses;
mod db;
mod entity;
mod error;
mod geo;
mod location;
mod routes;
mod seed;

#[cfg(test)]
mod test_utils;

use std::env;

use actix_web::{
    delete, get, http::StatusCode, middleware::Logger, post, put, web, App, HttpResponse,
    HttpServer, Responder,
};
use chrono::{DateTime, Utc};
use error::{BusConnectError, BusConnectResult};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::activity::{ActiveRoute, DEFAULT_TOP_N, DEFAULT_WINDOW_HOURS};
use crate::buses::{NewBus, StatusChange, UpdateBus};
use crate::db::util::open_seaorm;
use crate::geo::{find_nearby_routes, validate_radius, Coordinate};
use crate::location::NewLocationUpdate;
use crate::routes::RouteInput;

const DEFAULT_RADIUS_KM: f64 = 5.0;

#[derive(Clone)]
pub struct ContextData {
    db: DatabaseConnection,
}

/// Parses an optional numeric query parameter, falling back to `default`
fn parse_param(name: &str, value: Option<&str>, default: f64) -> BusConnectResult<f64> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse::<f64>().map_err(|_| {
            BusConnectError::invalid(format!("Invalid {} parameter: {:?}", name, value))
        }),
    }
}

fn parse_limit(value: Option<&str>) -> BusConnectResult<usize> {
    match value {
        None => Ok(DEFAULT_TOP_N),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| BusConnectError::invalid(format!("Invalid limit parameter: {:?}", value))),
    }
}

fn parse_time(name: &str, value: Option<&str>) -> BusConnectResult<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| BusConnectError::invalid(format!("Invalid {} time: {}", name, e)))
        })
        .transpose()
}

#[derive(Deserialize)]
struct NearbyQuery {
    latitude: Option<String>,
    longitude: Option<String>,
    radius: Option<String>,
}

impl NearbyQuery {
    fn parse(&self) -> BusConnectResult<(Coordinate, f64)> {
        let (Some(latitude), Some(longitude)) = (&self.latitude, &self.longitude) else {
            return Err(BusConnectError::invalid("Latitude and longitude are required"));
        };

        let latitude = parse_param("latitude", Some(latitude), 0.0)?;
        let longitude = parse_param("longitude", Some(longitude), 0.0)?;
        let radius = parse_param("radius", self.radius.as_deref(), DEFAULT_RADIUS_KM)?;

        Ok((Coordinate::new(latitude, longitude)?, radius))
    }
}

#[derive(Deserialize)]
struct ActivityQuery {
    hours: Option<String>,
    limit: Option<String>,
}

impl ActivityQuery {
    fn parse(&self) -> BusConnectResult<(f64, usize)> {
        let hours = parse_param("hours", self.hours.as_deref(), DEFAULT_WINDOW_HOURS)?;
        Ok((hours, parse_limit(self.limit.as_deref())?))
    }
}

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    from: Option<String>,
    to: Option<String>,
}

/// Activity as served under `/location/active`, which also names the
/// latest timestamp `lastUpdate`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationActivity {
    #[serde(flatten)]
    active: ActiveRoute,
    last_update: DateTime<Utc>,
}

#[get("/ok")]
async fn ok() -> BusConnectResult<impl Responder> {
    Ok(HttpResponse::Ok().finish())
}

#[get("/routes")]
async fn get_routes(ctx: web::Data<ContextData>) -> BusConnectResult<impl Responder> {
    let routes = routes::get_active_routes(&ctx.db).await?;
    Ok(web::Json(routes))
}

#[get("/routes/nearby")]
async fn get_nearby_routes(
    query: web::Query<NearbyQuery>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (center, radius) = query.parse()?;
    validate_radius(radius)?;

    let candidates = routes::get_candidate_routes(&ctx.db, &center).await?;
    let nearby = find_nearby_routes(&center, radius, candidates)?;
    Ok(web::Json(nearby))
}

#[get("/routes/active")]
async fn get_active_routes(
    query: web::Query<ActivityQuery>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (hours, limit) = query.parse()?;
    let active = location::get_active_routes(&ctx.db, hours, limit).await?;
    Ok(web::Json(active))
}

#[get("/routes/search")]
async fn search_routes(
    query: web::Query<SearchQuery>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let routes = routes::search_routes(&ctx.db, query.query.as_deref().unwrap_or("")).await?;
    Ok(web::Json(routes))
}

#[get("/routes/{route_id}")]
async fn get_route(
    params: web::Path<(i64,)>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (route_id,) = params.into_inner();
    let route = routes::get_route(&ctx.db, route_id).await?;
    Ok(web::Json(route))
}

#[post("/routes")]
async fn create_route(
    body: web::Json<RouteInput>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let route = routes::create_route(&ctx.db, &body).await?;
    Ok(HttpResponse::Created().json(route))
}

#[put("/routes/{route_id}")]
async fn update_route(
    params: web::Path<(i64,)>,
    body: web::Json<RouteInput>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (route_id,) = params.into_inner();
    let route = routes::update_route(&ctx.db, route_id, &body).await?;
    Ok(web::Json(route))
}

#[delete("/routes/{route_id}")]
async fn delete_route(
    params: web::Path<(i64,)>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (route_id,) = params.into_inner();
    routes::delete_route(&ctx.db, route_id).await?;
    Ok(web::Json(json!({ "message": "Route deleted successfully" })))
}

#[get("/buses")]
async fn get_buses(ctx: web::Data<ContextData>) -> BusConnectResult<impl Responder> {
    let buses = buses::get_buses(&ctx.db).await?;
    Ok(web::Json(buses))
}

#[get("/buses/{bus_id}")]
async fn get_bus(
    params: web::Path<(i64,)>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (bus_id,) = params.into_inner();
    let bus = buses::get_bus(&ctx.db, bus_id).await?;
    Ok(web::Json(bus))
}

#[post("/buses")]
async fn create_bus(
    body: web::Json<NewBus>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let bus = buses::create_bus(&ctx.db, &body).await?;
    Ok(HttpResponse::Created().json(bus))
}

#[put("/buses/{bus_id}")]
async fn update_bus(
    params: web::Path<(i64,)>,
    body: web::Json<UpdateBus>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (bus_id,) = params.into_inner();
    let bus = buses::update_bus(&ctx.db, bus_id, &body).await?;
    Ok(web::Json(bus))
}

#[put("/buses/{bus_id}/status")]
async fn update_bus_status(
    params: web::Path<(i64,)>,
    body: web::Json<StatusChange>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (bus_id,) = params.into_inner();
    let bus = buses::update_bus_status(&ctx.db, bus_id, &body).await?;
    Ok(web::Json(bus))
}

#[delete("/buses/{bus_id}")]
async fn delete_bus(
    params: web::Path<(i64,)>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (bus_id,) = params.into_inner();
    buses::delete_bus(&ctx.db, bus_id).await?;
    Ok(web::Json(json!({ "message": "Bus deleted successfully" })))
}

#[post("/location")]
async fn record_location(
    body: web::Json<NewLocationUpdate>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let update = location::record_location(&ctx.db, &body).await?;
    Ok(HttpResponse::Created().json(update))
}

#[get("/location/active")]
async fn get_location_activity(
    query: web::Query<ActivityQuery>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (hours, limit) = query.parse()?;
    let active = location::get_active_routes(&ctx.db, hours, limit)
        .await?
        .into_iter()
        .map(|active| LocationActivity {
            last_update: active.summary.latest_timestamp,
            active,
        })
        .collect::<Vec<_>>();
    Ok(web::Json(active))
}

#[get("/location/route/{route_id}")]
async fn get_route_positions(
    params: web::Path<(i64,)>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (route_id,) = params.into_inner();
    let positions = location::get_route_positions(&ctx.db, route_id).await?;
    Ok(web::Json(positions))
}

#[get("/location/history/{bus_id}")]
async fn get_bus_history(
    params: web::Path<(i64,)>,
    query: web::Query<HistoryQuery>,
    ctx: web::Data<ContextData>,
) -> BusConnectResult<impl Responder> {
    let (bus_id,) = params.into_inner();
    let from = parse_time("from", query.from.as_deref())?;
    let to = parse_time("to", query.to.as_deref())?;

    let history = location::get_bus_history(&ctx.db, bus_id, from, to).await?;
    Ok(web::Json(history))
}

/// Registers every endpoint. Literal paths come before `{id}` captures.
fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        BusConnectError::invalid(format!("Invalid request body: {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        BusConnectError::invalid(format!("Invalid query: {}", err)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        actix_web::error::InternalError::from_response(
            err,
            HttpResponse::build(StatusCode::NOT_FOUND).json(json!({ "error": "Not found" })),
        )
        .into()
    }))
    .service(ok)
    .service(get_routes)
    .service(get_nearby_routes)
    .service(get_active_routes)
    .service(search_routes)
    .service(get_route)
    .service(create_route)
    .service(update_route)
    .service(delete_route)
    .service(get_buses)
    .service(get_bus)
    .service(create_bus)
    .service(update_bus)
    .service(update_bus_status)
    .service(delete_bus)
    .service(record_location)
    .service(get_location_activity)
    .service(get_route_positions)
    .service(get_bus_history);
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::from_filename(".env").ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::try_init().ok();

    log::debug!("Debug logging enabled");

    let db_path = env::var("DATABASE_PATH").map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "DATABASE_PATH must be set")
    })?;
    let db = open_seaorm(&db_path).await.map_err(BusConnectError::from)?;

    log::info!("Migrating database");
    Migrator::up(&db, None).await.map_err(BusConnectError::from)?;

    if env_flag("SEED_SAMPLE_DATA") {
        seed::seed_if_empty(&db).await?;
    }

    let ctx = ContextData { db };

    let listen_address = env::var("LISTEN_ADDRESS").unwrap_or("127.0.0.1:8080".to_string());

    log::info!("Starting server at {}", listen_address);

    HttpServer::new(move || {
        let logger = Logger::default();

        let mut cors = actix_cors::Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec!["accept", "content-type"]);

        if let Ok(allowed_origin) = env::var("ALLOW_ORIGIN") {
            if allowed_origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(&allowed_origin);
            }
        }

        App::new()
            .wrap(logger)
            .wrap(cors)
            .app_data(web::Data::new(ctx.clone()))
            .configure(configure)
    })
    .bind(listen_address)?
    .run()
    .await?;

    log::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod test {
    use actix_web::{test, App};
    use serde_json::Value;

    use crate::test_utils::{ctx, TestContext};

    use super::*;

    async fn call(
        ctx: &TestContext,
        req: test::TestRequest,
    ) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ContextData::clone(ctx)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, body)
    }

    fn route_body(name: &str, start: (f64, f64), end: (f64, f64)) -> Value {
        json!({
            "name": name,
            "description": "test route",
            "startLocation": { "latitude": start.0, "longitude": start.1 },
            "endLocation": { "latitude": end.0, "longitude": end.1 },
            "waypoints": [],
            "distanceInKm": 5.0,
            "estimatedTimeInMinutes": 20,
            "fareAmount": 2.5
        })
    }

    #[actix_web::test]
    async fn test_parse_param() {
        assert_eq!(parse_param("radius", None, 5.0).unwrap(), 5.0);
        assert_eq!(parse_param("radius", Some(" 2.5 "), 5.0).unwrap(), 2.5);
        assert!(parse_param("radius", Some("far"), 5.0).is_err());
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_TOP_N);
        assert!(parse_limit(Some("-1")).is_err());
        assert!(parse_time("from", Some("yesterday")).is_err());
        assert!(parse_time("from", Some("2024-05-01T10:00:00Z")).unwrap().is_some());
    }

    #[actix_web::test]
    async fn test_nearby_requires_location() {
        let ctx = ctx().await;

        let (status, body) = call(&ctx, test::TestRequest::get().uri("/routes/nearby?longitude=1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Latitude and longitude are required");

        let (status, _) = call(
            &ctx,
            test::TestRequest::get().uri("/routes/nearby?latitude=abc&longitude=1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &ctx,
            test::TestRequest::get().uri("/routes/nearby?latitude=40.7&longitude=-74&radius=0"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &ctx,
            test::TestRequest::get().uri("/routes/nearby?latitude=91&longitude=-74"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_nearby_routes() {
        let ctx = ctx().await;

        let (status, created) = call(
            &ctx,
            test::TestRequest::post()
                .uri("/routes")
                .set_json(route_body("Downtown", (40.7589, -73.9851), (41.5, -73.0))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        call(
            &ctx,
            test::TestRequest::post()
                .uri("/routes")
                .set_json(route_body("Far away", (45.0, -70.0), (46.0, -71.0))),
        )
        .await;

        let (status, body) = call(
            &ctx,
            test::TestRequest::get().uri("/routes/nearby?latitude=40.7128&longitude=-74.0060&radius=10"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let routes = body.as_array().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["id"], created["id"]);

        // default radius of 5km misses the ~5.4km start
        let (_, body) = call(
            &ctx,
            test::TestRequest::get().uri("/routes/nearby?latitude=40.7128&longitude=-74.0060"),
        )
        .await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_record_location_and_activity() {
        let ctx = ctx().await;

        let (_, route) = call(
            &ctx,
            test::TestRequest::post()
                .uri("/routes")
                .set_json(route_body("Downtown", (40.7128, -74.0060), (40.7589, -73.9851))),
        )
        .await;
        let (_, bus) = call(
            &ctx,
            test::TestRequest::post().uri("/buses").set_json(json!({
                "busNumber": "BUS-001",
                "licenseNumber": "NYC-1234",
                "capacity": 45
            })),
        )
        .await;

        for latitude in [40.7128, 40.7300] {
            let (status, update) = call(
                &ctx,
                test::TestRequest::post().uri("/location").set_json(json!({
                    "busId": bus["id"],
                    "routeId": route["id"],
                    "position": { "latitude": latitude, "longitude": -74.0 },
                    "speed": 25.0
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(update["position"]["latitude"], latitude);
            assert_eq!(update["heading"], 0.0);
        }

        let uri = format!("/buses/{}", bus["id"]);
        let (_, bus) = call(&ctx, test::TestRequest::get().uri(&uri)).await;
        assert_eq!(bus["currentLocation"]["latitude"], 40.7300);

        let (status, body) = call(&ctx, test::TestRequest::get().uri("/routes/active?hours=24")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["routeId"], route["id"]);
        assert_eq!(body[0]["updateCount"], 2);
        assert_eq!(body[0]["busCount"], 1);
        assert_eq!(body[0]["name"], "Downtown");

        let (_, body) = call(&ctx, test::TestRequest::get().uri("/location/active")).await;
        assert_eq!(body[0]["lastUpdate"], body[0]["latestUpdate"]);

        let (status, _) = call(&ctx, test::TestRequest::get().uri("/location/active?hours=-3")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_record_location_rejects_bad_body() {
        let ctx = ctx().await;

        let (status, body) = call(
            &ctx,
            test::TestRequest::post().uri("/location").set_json(json!({
                "routeId": 1,
                "position": { "latitude": 40.7, "longitude": -74.0 }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("busId"));

        let (status, _) = call(
            &ctx,
            test::TestRequest::post().uri("/location").set_json(json!({
                "busId": 1,
                "routeId": 1,
                "position": { "latitude": 40.7, "longitude": -200.0 }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_route_not_found() {
        let ctx = ctx().await;

        let (status, body) = call(&ctx, test::TestRequest::get().uri("/routes/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");

        let (status, _) = call(&ctx, test::TestRequest::delete().uri("/routes/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&ctx, test::TestRequest::get().uri("/routes/not-a-number")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_search_requires_query() {
        let ctx = ctx().await;

        let (status, body) = call(&ctx, test::TestRequest::get().uri("/routes/search")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Search query is required");
    }

    #[actix_web::test]
    async fn test_bus_status_and_history() {
        let ctx = ctx().await;

        let (_, bus) = call(
            &ctx,
            test::TestRequest::post().uri("/buses").set_json(json!({
                "busNumber": "BUS-009",
                "licenseNumber": "NYC-0009",
                "capacity": 30
            })),
        )
        .await;
        assert_eq!(bus["currentStatus"], "out-of-service");

        let uri = format!("/buses/{}", bus["id"]);
        let (status, edited) = call(
            &ctx,
            test::TestRequest::put().uri(&uri).set_json(json!({ "capacity": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["capacity"], 3);
        assert_eq!(edited["busNumber"], "BUS-009");

        let (status, _) = call(
            &ctx,
            test::TestRequest::put().uri("/buses/9999").set_json(json!({ "capacity": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/buses/{}/status", bus["id"]);
        let (status, updated) = call(
            &ctx,
            test::TestRequest::put()
                .uri(&uri)
                .set_json(json!({ "status": "in-service", "routeId": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["currentStatus"], "in-service");
        assert_eq!(updated["currentRouteId"], 3);

        let (status, _) = call(
            &ctx,
            test::TestRequest::put()
                .uri(&uri)
                .set_json(json!({ "status": "flying" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(
            &ctx,
            test::TestRequest::post().uri("/location").set_json(json!({
                "busId": bus["id"],
                "routeId": 3,
                "position": { "latitude": 40.7, "longitude": -74.0 }
            })),
        )
        .await;

        let (_, positions) = call(&ctx, test::TestRequest::get().uri("/location/route/3")).await;
        assert_eq!(positions[0]["busNumber"], "BUS-009");
        assert_eq!(positions[0]["busId"], bus["id"]);

        let uri = format!("/location/history/{}", bus["id"]);
        let (_, history) = call(&ctx, test::TestRequest::get().uri(&uri)).await;
        assert_eq!(history.as_array().unwrap().len(), 1);

        let uri = format!("/location/history/{}?from=garbage", bus["id"]);
        let (status, _) = call(&ctx, test::TestRequest::get().uri(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
