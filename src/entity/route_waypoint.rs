use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "route_waypoint")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub route_id: i64,
    pub seq: i32,
    pub name: Option<String>,
    #[sea_orm(column_type = "Double")]
    pub latitude: f64,
    #[sea_orm(column_type = "Double")]
    pub longitude: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bus_route::Entity",
        from = "Column::RouteId",
        to = "super::bus_route::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    BusRoute,
}

impl Related<super::bus_route::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BusRoute.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
