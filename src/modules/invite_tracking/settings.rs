use crate::db::entities::guild_invite_settings;
use crate::services::cache::TtlCache;
use crate::Error;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::time::Duration;

const SETTINGS_CACHE_TTL: Duration = Duration::from_secs(30);

/// Partial update: `None` leaves the stored value untouched. The channel id
/// is doubly optional so callers can distinguish "unchanged" from "cleared".
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub count_fake_invites: Option<bool>,
    pub count_left_invites: Option<bool>,
    pub enable_welcome: Option<bool>,
    pub welcome_channel_id: Option<Option<i64>>,
    pub welcome_message: Option<String>,
}

/// Durable per-guild invite settings, created lazily with defaults on first
/// read. Reads are cached; every write invalidates the guild's cache entry
/// before returning so stale welcome-channel data is never served.
pub struct SettingsStore {
    db: DatabaseConnection,
    cache: TtlCache<i64, guild_invite_settings::Model>,
}

impl SettingsStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            cache: TtlCache::new(SETTINGS_CACHE_TTL),
        }
    }

    pub async fn get(&self, guild_id: i64) -> Result<guild_invite_settings::Model, Error> {
        if let Some(model) = self.cache.get(&guild_id) {
            return Ok(model);
        }

        let model = match guild_invite_settings::Entity::find_by_id(guild_id)
            .one(&self.db)
            .await?
        {
            Some(model) => model,
            None => {
                let defaults = guild_invite_settings::Model::defaults(guild_id);
                // Lazy creation; a concurrent writer may have won the race.
                guild_invite_settings::Entity::insert(to_active(&defaults))
                    .on_conflict(
                        OnConflict::column(guild_invite_settings::Column::GuildId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&self.db)
                    .await?;
                defaults
            }
        };

        self.cache.insert(guild_id, model.clone());
        Ok(model)
    }

    pub async fn update(
        &self,
        guild_id: i64,
        update: SettingsUpdate,
    ) -> Result<guild_invite_settings::Model, Error> {
        let current = self.get(guild_id).await?;

        let merged = guild_invite_settings::Model {
            guild_id,
            count_fake_invites: update
                .count_fake_invites
                .unwrap_or(current.count_fake_invites),
            count_left_invites: update
                .count_left_invites
                .unwrap_or(current.count_left_invites),
            enable_welcome: update.enable_welcome.unwrap_or(current.enable_welcome),
            welcome_channel_id: update
                .welcome_channel_id
                .unwrap_or(current.welcome_channel_id),
            welcome_message: update.welcome_message.unwrap_or(current.welcome_message),
        };

        guild_invite_settings::Entity::insert(to_active(&merged))
            .on_conflict(
                OnConflict::column(guild_invite_settings::Column::GuildId)
                    .update_columns([
                        guild_invite_settings::Column::CountFakeInvites,
                        guild_invite_settings::Column::CountLeftInvites,
                        guild_invite_settings::Column::EnableWelcome,
                        guild_invite_settings::Column::WelcomeChannelId,
                        guild_invite_settings::Column::WelcomeMessage,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.cache.invalidate(&guild_id);
        Ok(merged)
    }
}

fn to_active(model: &guild_invite_settings::Model) -> guild_invite_settings::ActiveModel {
    guild_invite_settings::ActiveModel {
        guild_id: Set(model.guild_id),
        count_fake_invites: Set(model.count_fake_invites),
        count_left_invites: Set(model.count_left_invites),
        enable_welcome: Set(model.enable_welcome),
        welcome_channel_id: Set(model.welcome_channel_id),
        welcome_message: Set(model.welcome_message.clone()),
    }
}

/// Boolean coercion for everything the dashboard may send: JSON booleans,
/// 0/1 storage integers, and form-submission strings.
pub fn coerce_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().map(|i| i != 0),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_welcome_disabled() {
        let defaults = guild_invite_settings::Model::defaults(42);
        assert_eq!(defaults.guild_id, 42);
        assert!(!defaults.count_fake_invites);
        assert!(!defaults.count_left_invites);
        assert!(!defaults.enable_welcome);
        assert_eq!(defaults.welcome_channel_id, None);
        assert!(defaults.welcome_message.contains("{inviter}"));
    }

    #[test]
    fn test_coerce_bool_accepts_wire_and_form_encodings() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!(false)), Some(false));
        assert_eq!(coerce_bool(&json!(1)), Some(true));
        assert_eq!(coerce_bool(&json!(0)), Some(false));
        assert_eq!(coerce_bool(&json!("on")), Some(true));
        assert_eq!(coerce_bool(&json!("true")), Some(true));
        assert_eq!(coerce_bool(&json!("off")), Some(false));
        assert_eq!(coerce_bool(&json!("0")), Some(false));
        assert_eq!(coerce_bool(&json!("maybe")), None);
        assert_eq!(coerce_bool(&json!(null)), None);
    }

    #[tokio::test]
    async fn test_update_merges_over_current_row() {
        use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

        let stored = guild_invite_settings::Model {
            count_fake_invites: true,
            welcome_message: "custom".to_string(),
            ..guild_invite_settings::Model::defaults(1)
        };

        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![stored]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let store = SettingsStore::new(db);
        let update = SettingsUpdate {
            count_left_invites: Some(true),
            welcome_channel_id: Some(Some(99)),
            ..SettingsUpdate::default()
        };

        let merged = store.update(1, update).await.unwrap();
        // Explicitly set fields take the new values, the rest keep stored ones.
        assert!(merged.count_fake_invites);
        assert!(merged.count_left_invites);
        assert_eq!(merged.welcome_channel_id, Some(99));
        assert_eq!(merged.welcome_message, "custom");
    }
}
