use crate::modules::invite_tracking::ledger::ResetKind;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::ChoiceParameter;
use tracing::error;

/// View invite counts for a user
#[poise::command(slash_command, guild_only)]
pub async fn invites(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap();
    let target = user.as_ref().unwrap_or_else(|| ctx.author());

    ctx.defer().await?;

    let data = ctx.data();
    let settings = data.settings.get(guild_id.get() as i64).await?;
    let counts = match data
        .ledger
        .get_counts(&settings, guild_id.get() as i64, target.id.get() as i64)
        .await
    {
        Ok(counts) => counts,
        Err(e) => {
            error!(guild_id = guild_id.get(), "Failed to read invite counts: {e:?}");
            ctx.send(
                poise::CreateReply::default()
                    .content("❌ Could not read invite counts. Please try again later.")
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let counted = |enabled: bool| if enabled { "(counted ✅)" } else { "(not counted ❌)" };

    let mut response = format!("📊 **Invite counts for {}**\n\n", target.name);
    response.push_str(&format!("✅ Regular: **{}**\n", counts.regular));
    response.push_str(&format!(
        "⚠️ Fake: **{}** {}\n",
        counts.fake,
        counted(settings.count_fake_invites)
    ));
    response.push_str(&format!(
        "❌ Left: **{}** {}\n",
        counts.left,
        counted(settings.count_left_invites)
    ));
    response.push_str(&format!("📈 Total: **{}**\n", counts.total));

    ctx.send(poise::CreateReply::default().content(response))
        .await?;

    Ok(())
}

/// Reset invites for a user or the entire server
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn resetinvites(
    ctx: Context<'_>,
    #[description = "User to reset invites for (leave empty to reset the whole server)"]
    user: Option<serenity::User>,
    #[rename = "type"]
    #[description = "Which invites to reset (default: all)"]
    kind: Option<ResetKind>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap();
    let kind = kind.unwrap_or(ResetKind::All);

    ctx.defer_ephemeral().await?;

    let result = ctx
        .data()
        .ledger
        .reset_invites(
            guild_id.get() as i64,
            user.as_ref().map(|u| u.id.get() as i64),
            kind,
        )
        .await;

    let response = match result {
        Ok(()) => match &user {
            Some(user) => format!("✅ Reset {} for {}.", kind.name(), user.name),
            None => format!("✅ Reset {} for the entire server.", kind.name()),
        },
        Err(e) => {
            error!(guild_id = guild_id.get(), "Failed to reset invites: {e:?}");
            "❌ Failed to reset invites. Please try again later.".to_string()
        }
    };

    ctx.send(
        poise::CreateReply::default()
            .content(response)
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

/// View the server's top inviters
#[poise::command(slash_command, guild_only)]
pub async fn topinvites(
    ctx: Context<'_>,
    #[description = "Number of users to show (default: 10)"]
    #[min = 1]
    #[max = 50]
    limit: Option<u32>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap();
    let limit = limit.unwrap_or(10) as usize;

    ctx.defer().await?;

    let data = ctx.data();
    let settings = data.settings.get(guild_id.get() as i64).await?;
    let board = match data
        .ledger
        .get_leaderboard(&settings, guild_id.get() as i64, limit)
        .await
    {
        Ok(board) => board,
        Err(e) => {
            error!(guild_id = guild_id.get(), "Failed to read leaderboard: {e:?}");
            ctx.send(
                poise::CreateReply::default()
                    .content("❌ Could not read the leaderboard. Please try again later.")
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let mut response = format!("🏆 **Top {limit} Inviters**\n\n");

    if board.is_empty() {
        response.push_str("No invite data available yet.");
    } else {
        for (idx, (user_id, counts)) in board.iter().enumerate() {
            let medal = match idx {
                0 => "🥇",
                1 => "🥈",
                2 => "🥉",
                _ => "  ",
            };
            response.push_str(&format!(
                "{} **#{}** <@{}> - {} invites ({} regular, {} fake, {} left)\n",
                medal,
                idx + 1,
                user_id,
                counts.total,
                counts.regular,
                counts.fake,
                counts.left
            ));
        }
    }

    ctx.send(poise::CreateReply::default().content(response))
        .await?;

    Ok(())
}

pub fn commands() -> Vec<poise::Command<crate::Data, Error>> {
    vec![invites(), resetinvites(), topinvites()]
}
