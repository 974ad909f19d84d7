use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bus")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub bus_number: String,
    #[sea_orm(unique)]
    pub license_number: String,
    pub capacity: i32,
    pub current_route_id: Option<i64>,
    pub current_status: String,
    #[sea_orm(column_type = "Double", nullable)]
    pub current_latitude: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub current_longitude: Option<f64>,
    pub last_updated: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
