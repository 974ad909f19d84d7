use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bus_route")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: String,
    #[sea_orm(column_type = "Double")]
    pub start_latitude: f64,
    #[sea_orm(column_type = "Double")]
    pub start_longitude: f64,
    #[sea_orm(column_type = "Double")]
    pub end_latitude: f64,
    #[sea_orm(column_type = "Double")]
    pub end_longitude: f64,
    #[sea_orm(column_type = "Double")]
    pub distance_km: f64,
    pub estimated_minutes: i32,
    #[sea_orm(column_type = "Double")]
    pub fare: f64,
    pub is_active: bool,
    pub schedule: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::route_waypoint::Entity")]
    RouteWaypoint,
}

impl Related<super::route_waypoint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RouteWaypoint.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
