use sea_orm::entity::prelude::*;

/// One row per user whose join could be attributed to an invite.
/// Rejoins overwrite the inviter and clear `is_left`; `is_fake` is fixed
/// at join time from the joining account's age.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "invite_ledger")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    pub inviter_id: i64,
    pub is_fake: bool,
    pub is_left: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
