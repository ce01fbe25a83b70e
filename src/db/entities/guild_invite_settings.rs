use sea_orm::entity::prelude::*;

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hi, {user} Welcome to our server! You were invited by {inviter} who now has {invites} invites.";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "guild_invite_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: i64,
    pub count_fake_invites: bool,
    pub count_left_invites: bool,
    pub enable_welcome: bool,
    pub welcome_channel_id: Option<i64>,
    pub welcome_message: String,
}

impl Model {
    /// Row used before a guild has ever written settings.
    pub fn defaults(guild_id: i64) -> Self {
        Self {
            guild_id,
            count_fake_invites: false,
            count_left_invites: false,
            enable_welcome: false,
            welcome_channel_id: None,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
