pub use super::bus::Entity as Bus;
pub use super::bus_route::Entity as BusRoute;
pub use super::location_update::Entity as LocationUpdate;
pub use super::route_waypoint::Entity as RouteWaypoint;
