pub mod prelude;

pub mod bus;
pub mod bus_route;
pub mod location_update;
pub mod route_waypoint;
