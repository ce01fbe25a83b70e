use crate::db::entities::guild_invite_settings;
use poise::serenity_prelude as serenity;
use tracing::warn;

/// Values substituted into the welcome template.
#[derive(Debug, Clone)]
pub struct WelcomePlaceholders {
    pub member_mention: String,
    pub member_name: String,
    pub inviter_mention: String,
    pub inviter_name: String,
    pub invite_total: i32,
    pub guild_name: String,
}

pub fn render_template(template: &str, p: &WelcomePlaceholders) -> String {
    template
        .replace("{user}", &p.member_mention)
        .replace("{username}", &p.member_name)
        .replace("{inviter.username}", &p.inviter_name)
        .replace("{inviter}", &p.inviter_mention)
        .replace("{invites}", &p.invite_total.to_string())
        .replace("{guild}", &p.guild_name)
}

/// Send the configured welcome message for a freshly attributed join.
/// Failures are logged and swallowed; a missing channel must not affect the
/// join handling that triggered this.
pub async fn send_welcome(
    ctx: &serenity::Context,
    settings: &guild_invite_settings::Model,
    member: &serenity::Member,
    inviter_id: u64,
    invite_total: i32,
) {
    let guild_id = member.guild_id;
    let Some(channel_id) = settings.welcome_channel_id.filter(|id| *id > 0) else {
        warn!(
            guild_id = guild_id.get(),
            "Welcome enabled but no welcome channel configured"
        );
        return;
    };

    let inviter_name = match ctx.http.get_user(serenity::UserId::new(inviter_id)).await {
        Ok(user) => user.name.clone(),
        Err(_) => "unknown".to_string(),
    };

    let guild_name = {
        let cached = ctx.cache.guild(guild_id).map(|g| g.name.clone());
        match cached {
            Some(name) => name,
            None => match guild_id.to_partial_guild(&ctx.http).await {
                Ok(guild) => guild.name.clone(),
                Err(_) => String::new(),
            },
        }
    };

    let placeholders = WelcomePlaceholders {
        member_mention: format!("<@{}>", member.user.id.get()),
        member_name: member.user.name.clone(),
        inviter_mention: format!("<@{inviter_id}>"),
        inviter_name,
        invite_total,
        guild_name,
    };

    let content = render_template(&settings.welcome_message, &placeholders);

    if let Err(e) = serenity::ChannelId::new(channel_id as u64)
        .say(&ctx.http, content)
        .await
    {
        warn!(
            guild_id = guild_id.get(),
            channel_id, "Failed to send welcome message: {e:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::guild_invite_settings::DEFAULT_WELCOME_MESSAGE;

    fn placeholders() -> WelcomePlaceholders {
        WelcomePlaceholders {
            member_mention: "<@100>".to_string(),
            member_name: "newcomer".to_string(),
            inviter_mention: "<@200>".to_string(),
            inviter_name: "recruiter".to_string(),
            invite_total: 7,
            guild_name: "Test Guild".to_string(),
        }
    }

    #[test]
    fn test_default_template_rendering() {
        let rendered = render_template(DEFAULT_WELCOME_MESSAGE, &placeholders());
        assert_eq!(
            rendered,
            "Hi, <@100> Welcome to our server! You were invited by <@200> who now has 7 invites."
        );
    }

    #[test]
    fn test_all_placeholders_substituted() {
        let rendered = render_template(
            "{user} {username} {inviter} {inviter.username} {invites} {guild}",
            &placeholders(),
        );
        assert_eq!(rendered, "<@100> newcomer <@200> recruiter 7 Test Guild");
    }

    #[test]
    fn test_repeated_placeholders_all_replaced() {
        let rendered = render_template("{invites} and {invites}", &placeholders());
        assert_eq!(rendered, "7 and 7");
    }

    #[test]
    fn test_unknown_placeholders_left_alone() {
        let rendered = render_template("{user} {nope}", &placeholders());
        assert_eq!(rendered, "<@100> {nope}");
    }
}
