use crate::api::error::ApiError;
use crate::api::AppState;
use crate::db::entities::guild_invite_settings;
use crate::modules::invite_tracking::ledger::ResetKind;
use crate::modules::invite_tracking::settings::{coerce_bool, SettingsUpdate};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::error;

/// Settings as they travel over the wire: booleans as true/false, ids as
/// strings (dashboard JavaScript cannot hold 64-bit ids in numbers).
#[derive(Debug, Serialize)]
pub struct InviteSettingsResponse {
    pub guild_id: String,
    pub count_fake_invites: bool,
    pub count_left_invites: bool,
    pub enable_welcome: bool,
    pub welcome_channel_id: Option<String>,
    pub welcome_message: String,
}

impl From<guild_invite_settings::Model> for InviteSettingsResponse {
    fn from(model: guild_invite_settings::Model) -> Self {
        Self {
            guild_id: model.guild_id.to_string(),
            count_fake_invites: model.count_fake_invites,
            count_left_invites: model.count_left_invites,
            enable_welcome: model.enable_welcome,
            welcome_channel_id: model.welcome_channel_id.map(|id| id.to_string()),
            welcome_message: model.welcome_message,
        }
    }
}

/// Partial settings update. Absent fields stay unchanged; an explicit null
/// clears the welcome channel. Boolean fields accept anything the form layer
/// might send.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InviteSettingsRequest {
    #[serde(deserialize_with = "de_loose_bool")]
    pub count_fake_invites: Option<bool>,
    #[serde(deserialize_with = "de_loose_bool")]
    pub count_left_invites: Option<bool>,
    #[serde(deserialize_with = "de_loose_bool")]
    pub enable_welcome: Option<bool>,
    #[serde(deserialize_with = "de_explicit_opt")]
    pub welcome_channel_id: Option<Option<String>>,
    pub welcome_message: Option<String>,
}

impl InviteSettingsRequest {
    fn into_update(self) -> Result<SettingsUpdate, ApiError> {
        let welcome_channel_id = match self.welcome_channel_id {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) => {
                let id: i64 = raw
                    .parse()
                    .map_err(|_| ApiError::BadRequest("welcome_channel_id must be a snowflake"))?;
                Some(Some(id))
            }
        };

        Ok(SettingsUpdate {
            count_fake_invites: self.count_fake_invites,
            count_left_invites: self.count_left_invites,
            enable_welcome: self.enable_welcome,
            welcome_channel_id,
            welcome_message: self.welcome_message,
        })
    }
}

fn de_loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => coerce_bool(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a boolean-like value")),
    }
}

// Distinguishes an absent field (None) from an explicit null (Some(None)).
fn de_explicit_opt<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// GET /guild/:guild_id/invite-settings
pub async fn get_invite_settings(
    State(state): State<AppState>,
    Path(guild_id): Path<u64>,
) -> Result<Json<InviteSettingsResponse>, ApiError> {
    let model = state.settings.get(guild_id as i64).await.map_err(|e| {
        error!(guild_id, "Failed to load invite settings: {e:?}");
        ApiError::Storage
    })?;

    Ok(Json(model.into()))
}

/// POST /guild/:guild_id/invite-settings
pub async fn update_invite_settings(
    State(state): State<AppState>,
    Path(guild_id): Path<u64>,
    Json(request): Json<InviteSettingsRequest>,
) -> Result<Json<InviteSettingsResponse>, ApiError> {
    let update = request.into_update()?;

    let model = state
        .settings
        .update(guild_id as i64, update)
        .await
        .map_err(|e| {
            error!(guild_id, "Failed to update invite settings: {e:?}");
            ApiError::Storage
        })?;

    Ok(Json(model.into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetInvitesRequest {
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// POST /guild/:guild_id/reset-invites
pub async fn reset_invites(
    State(state): State<AppState>,
    Path(guild_id): Path<u64>,
    Json(request): Json<ResetInvitesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = match request.kind.as_deref() {
        None => ResetKind::All,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("type must be one of all, regular, fake, left"))?,
    };

    let user_id = request
        .user_id
        .as_deref()
        .map(|raw| raw.parse::<u64>())
        .transpose()
        .map_err(|_| ApiError::BadRequest("user_id must be a snowflake"))?;

    state
        .ledger
        .reset_invites(guild_id as i64, user_id.map(|id| id as i64), kind)
        .await
        .map_err(|e| {
            error!(guild_id, "Failed to reset invites: {e:?}");
            ApiError::Storage
        })?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_form_style_booleans() {
        let request: InviteSettingsRequest = serde_json::from_str(
            r#"{"count_fake_invites": "on", "count_left_invites": 0, "enable_welcome": true}"#,
        )
        .unwrap();

        assert_eq!(request.count_fake_invites, Some(true));
        assert_eq!(request.count_left_invites, Some(false));
        assert_eq!(request.enable_welcome, Some(true));
        assert_eq!(request.welcome_channel_id, None);
        assert_eq!(request.welcome_message, None);
    }

    #[test]
    fn test_request_distinguishes_null_channel_from_absent() {
        let cleared: InviteSettingsRequest =
            serde_json::from_str(r#"{"welcome_channel_id": null}"#).unwrap();
        assert_eq!(cleared.welcome_channel_id, Some(None));

        let untouched: InviteSettingsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.welcome_channel_id, None);
    }

    #[test]
    fn test_response_serializes_booleans_as_json_booleans() {
        let model = guild_invite_settings::Model {
            count_fake_invites: true,
            welcome_channel_id: Some(123),
            ..guild_invite_settings::Model::defaults(42)
        };

        let body = serde_json::to_value(InviteSettingsResponse::from(model)).unwrap();
        assert_eq!(body["count_fake_invites"], serde_json::json!(true));
        assert_eq!(body["count_left_invites"], serde_json::json!(false));
        assert_eq!(body["welcome_channel_id"], serde_json::json!("123"));
        assert_eq!(body["guild_id"], serde_json::json!("42"));
    }

    #[test]
    fn test_settings_update_round_trip_preserves_set_fields() {
        let request: InviteSettingsRequest = serde_json::from_str(
            r#"{"count_fake_invites": "true", "welcome_channel_id": "99", "welcome_message": "hey {user}"}"#,
        )
        .unwrap();

        let update = request.into_update().unwrap();
        assert_eq!(update.count_fake_invites, Some(true));
        assert_eq!(update.count_left_invites, None);
        assert_eq!(update.welcome_channel_id, Some(Some(99)));
        assert_eq!(update.welcome_message.as_deref(), Some("hey {user}"));
    }

    #[test]
    fn test_bad_channel_id_is_rejected() {
        let request: InviteSettingsRequest =
            serde_json::from_str(r#"{"welcome_channel_id": "not-a-snowflake"}"#).unwrap();
        assert!(request.into_update().is_err());
    }
}
