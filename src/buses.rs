use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, EntityTrait, QueryOrder, Set, SqlErr};
use serde::{Deserialize, Serialize};

use crate::db::error::{DbError, DbResult};
use crate::db::util::{from_millis, OptionMapSet};
use crate::entity::bus;
use crate::error::{BusConnectError, BusConnectResult};
use crate::geo::Coordinate;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BusStatus {
    InService,
    #[default]
    OutOfService,
    Maintenance,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::InService => "in-service",
            BusStatus::OutOfService => "out-of-service",
            BusStatus::Maintenance => "maintenance",
        }
    }
}

impl TryFrom<&str> for BusStatus {
    type Error = DbError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "in-service" => Ok(BusStatus::InService),
            "out-of-service" => Ok(BusStatus::OutOfService),
            "maintenance" => Ok(BusStatus::Maintenance),
            other => Err(DbError::Convert(format!("Unknown bus status: {}", other))),
        }
    }
}

/// Bus as returned in the API
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: i64,
    pub bus_number: String,
    pub license_number: String,
    pub capacity: i32,
    pub current_route_id: Option<i64>,
    pub current_status: BusStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<Coordinate>,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<bus::Model> for Bus {
    type Error = DbError;

    fn try_from(model: bus::Model) -> DbResult<Self> {
        let current_location = match (model.current_latitude, model.current_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Bus {
            id: model.id,
            current_status: BusStatus::try_from(model.current_status.as_str())?,
            bus_number: model.bus_number,
            license_number: model.license_number,
            capacity: model.capacity,
            current_route_id: model.current_route_id,
            current_location,
            last_updated: from_millis(model.last_updated)?,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewBus {
    pub bus_number: String,
    pub license_number: String,
    pub capacity: i32,
    #[serde(default)]
    pub current_route_id: Option<i64>,
    #[serde(default)]
    pub current_status: BusStatus,
}

impl NewBus {
    pub fn validate(&self) -> BusConnectResult<()> {
        if self.bus_number.trim().is_empty() {
            return Err(BusConnectError::invalid("busNumber is required"));
        }
        if self.license_number.trim().is_empty() {
            return Err(BusConnectError::invalid("licenseNumber is required"));
        }
        if self.capacity <= 0 {
            return Err(BusConnectError::invalid("capacity must be positive"));
        }
        Ok(())
    }
}

/// Partial bus edit, absent fields are left as they are
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBus {
    pub bus_number: Option<String>,
    pub license_number: Option<String>,
    pub capacity: Option<i32>,
    pub current_route_id: Option<i64>,
    pub current_status: Option<BusStatus>,
}

impl UpdateBus {
    pub fn validate(&self) -> BusConnectResult<()> {
        if matches!(&self.bus_number, Some(n) if n.trim().is_empty()) {
            return Err(BusConnectError::invalid("busNumber must not be empty"));
        }
        if matches!(&self.license_number, Some(n) if n.trim().is_empty()) {
            return Err(BusConnectError::invalid("licenseNumber must not be empty"));
        }
        if matches!(self.capacity, Some(c) if c <= 0) {
            return Err(BusConnectError::invalid("capacity must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: BusStatus,
    #[serde(default)]
    pub route_id: Option<i64>,
}

pub async fn get_buses(db: &impl ConnectionTrait) -> DbResult<Vec<Bus>> {
    bus::Entity::find()
        .order_by_asc(bus::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(Bus::try_from)
        .collect()
}

pub async fn get_bus(db: &impl ConnectionTrait, id: i64) -> BusConnectResult<Bus> {
    let model = bus::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| BusConnectError::not_found("Bus not found"))?;
    Ok(model.try_into()?)
}

fn map_unique_violation(e: DbErr) -> BusConnectError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            BusConnectError::invalid("busNumber and licenseNumber must be unique")
        }
        _ => e.into(),
    }
}

pub async fn create_bus(db: &impl ConnectionTrait, input: &NewBus) -> BusConnectResult<Bus> {
    input.validate()?;

    let model = bus::ActiveModel {
        bus_number: Set(input.bus_number.trim().to_string()),
        license_number: Set(input.license_number.trim().to_string()),
        capacity: Set(input.capacity),
        current_route_id: Set(input.current_route_id),
        current_status: Set(input.current_status.as_str().to_string()),
        last_updated: Set(Utc::now().timestamp_millis()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(map_unique_violation)?;

    log::info!("Created bus {} ({})", model.id, model.bus_number);
    Ok(model.try_into()?)
}

pub async fn update_bus(
    db: &impl ConnectionTrait,
    id: i64,
    input: &UpdateBus,
) -> BusConnectResult<Bus> {
    input.validate()?;

    let mut model: bus::ActiveModel = bus::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| BusConnectError::not_found("Bus not found"))?
        .into();

    model.bus_number = input.bus_number.as_ref().map(|n| n.trim().to_string()).map_set();
    model.license_number = input
        .license_number
        .as_ref()
        .map(|n| n.trim().to_string())
        .map_set();
    model.capacity = input.capacity.map_set();
    model.current_route_id = input.current_route_id.map(Some).map_set();
    model.current_status = input
        .current_status
        .map(|s| s.as_str().to_string())
        .map_set();
    model.last_updated = Set(Utc::now().timestamp_millis());

    let model = model.update(db).await.map_err(map_unique_violation)?;
    Ok(model.try_into()?)
}

/// Sets the status, and the current route when one is given
pub async fn update_bus_status(
    db: &impl ConnectionTrait,
    id: i64,
    change: &StatusChange,
) -> BusConnectResult<Bus> {
    let mut model: bus::ActiveModel = bus::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| BusConnectError::not_found("Bus not found"))?
        .into();

    model.current_status = Set(change.status.as_str().to_string());
    model.current_route_id = change.route_id.map(Some).map_set();
    model.last_updated = Set(Utc::now().timestamp_millis());

    let model = model.update(db).await?;
    Ok(model.try_into()?)
}

pub async fn delete_bus(db: &impl ConnectionTrait, id: i64) -> BusConnectResult<()> {
    let result = bus::Entity::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(BusConnectError::not_found("Bus not found"));
    }

    log::info!("Deleted bus {}", id);
    Ok(())
}
