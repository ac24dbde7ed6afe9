use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "appointments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub service_price: i64,
    pub appointment_date: DateTimeWithTimeZone,
    pub location: String,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub attachments: Json,
    pub additional_info: String,
    pub rating: Option<i16>,
    pub review: String,
    pub confirmed_at: Option<DateTimeWithTimeZone>,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::services::Entity",
        from = "Column::ServiceId",
        to = "super::services::Column::Id"
    )]
    Services,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ClientId",
        to = "super::users::Column::Id"
    )]
    Client,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ProviderId",
        to = "super::users::Column::Id"
    )]
    Provider,
    #[sea_orm(has_one = "super::service_appointments::Entity")]
    ServiceAppointment,
}

impl Related<super::services::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Services.def()
    }
}

impl Related<super::service_appointments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ServiceAppointment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
