use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, DurationRound, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::error::{BusConnectError, BusConnectResult};
use crate::location::LocationUpdate;
use crate::routes::Route;

pub const DEFAULT_WINDOW_HOURS: f64 = 24.0;
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub route_id: i64,
    pub update_count: u64,
    #[serde(rename = "busCount")]
    pub distinct_bus_count: u64,
    #[serde(rename = "latestUpdate")]
    pub latest_timestamp: DateTime<Utc>,
}

/// An activity summary with its route details. `route` is `None` when the
/// updates refer to a route that no longer exists.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ActiveRoute {
    #[serde(flatten)]
    pub summary: ActivitySummary,
    #[serde(flatten)]
    pub route: Option<Route>,
}

/// Oldest timestamp still inside a window of `window_hours` ending at `now`,
/// truncated to the millisecond precision updates are stored with
pub fn window_start(now: DateTime<Utc>, window_hours: f64) -> BusConnectResult<DateTime<Utc>> {
    if !window_hours.is_finite() || window_hours <= 0.0 {
        return Err(BusConnectError::invalid(format!(
            "Window must be a positive number of hours, got {}",
            window_hours
        )));
    }

    let window = Duration::try_milliseconds((window_hours * 3_600_000.0) as i64)
        .ok_or_else(|| BusConnectError::invalid("Window is too large"))?;
    let start = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    Ok(start
        .duration_trunc(Duration::milliseconds(1))
        .unwrap_or(start))
}

/// Groups updates at or after `since` by route, busiest first.
///
/// Ties on update count go to the most recent activity, then the lower route id.
pub fn summarize(updates: &[LocationUpdate], since: DateTime<Utc>) -> Vec<ActivitySummary> {
    updates
        .iter()
        .filter(|u| u.timestamp >= since)
        .into_group_map_by(|u| u.route_id)
        .into_iter()
        .filter_map(|(route_id, group)| {
            let latest_timestamp = group.iter().map(|u| u.timestamp).max()?;
            let buses: HashSet<i64> = group.iter().map(|u| u.bus_id).collect();

            Some(ActivitySummary {
                route_id,
                update_count: group.len() as u64,
                distinct_bus_count: buses.len() as u64,
                latest_timestamp,
            })
        })
        .sorted_by_key(|s| (Reverse(s.update_count), Reverse(s.latest_timestamp), s.route_id))
        .collect()
}

/// The `top_n` busiest routes over the last `window_hours` before `now`,
/// joined to their route details where the route is known.
pub fn rank_active_routes(
    updates: &[LocationUpdate],
    window_hours: f64,
    routes: &[Route],
    top_n: usize,
    now: DateTime<Utc>,
) -> BusConnectResult<Vec<ActiveRoute>> {
    let since = window_start(now, window_hours)?;

    let routes_by_id: HashMap<i64, &Route> = routes.iter().map(|r| (r.id, r)).collect();

    let ranked = summarize(updates, since)
        .into_iter()
        .take(top_n)
        .map(|summary| ActiveRoute {
            route: routes_by_id.get(&summary.route_id).map(|r| (*r).clone()),
            summary,
        })
        .collect();

    Ok(ranked)
}
