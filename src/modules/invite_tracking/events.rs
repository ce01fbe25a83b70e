use crate::modules::invite_tracking::resolver;
use crate::modules::invite_tracking::snapshot::SnapshotEntry;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info};

pub fn handler<'a>(
    ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(handle_event(ctx, event, data))
}

async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::CacheReady { guilds, .. } => {
            data.snapshots.resync_all(ctx, guilds).await;
        }
        serenity::FullEvent::GuildCreate { guild, is_new, .. } => {
            if is_new.unwrap_or(false) {
                info!(guild_id = guild.id.get(), "Joined new guild, caching invites");
                data.snapshots.refresh_guild(ctx, guild.id).await;
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            data.snapshots.forget_guild(incomplete.id.get());
        }
        serenity::FullEvent::InviteCreate { data: invite, .. } => {
            handle_invite_create(invite, data);
        }
        serenity::FullEvent::InviteDelete { data: invite, .. } => {
            handle_invite_delete(invite, data);
        }
        serenity::FullEvent::GuildMemberAddition { new_member, .. } => {
            resolver::handle_member_join(ctx, new_member, data).await?;
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            handle_member_leave(*guild_id, user, data).await;
        }
        _ => {}
    }

    Ok(())
}

fn handle_invite_create(invite: &serenity::InviteCreateEvent, data: &Data) {
    let Some(guild_id) = invite.guild_id else {
        debug!("Invite created without guild_id, ignoring");
        return;
    };

    info!(guild_id = guild_id.get(), code = %invite.code, "Invite created");
    data.snapshots
        .apply_invite_create(guild_id.get(), SnapshotEntry::from_create_event(invite));
}

fn handle_invite_delete(invite: &serenity::InviteDeleteEvent, data: &Data) {
    let Some(guild_id) = invite.guild_id else {
        debug!("Invite deleted without guild_id, ignoring");
        return;
    };

    info!(guild_id = guild_id.get(), code = %invite.code, "Invite deleted");
    data.snapshots
        .apply_invite_delete(guild_id.get(), invite.code.as_str());
}

async fn handle_member_leave(guild_id: serenity::GuildId, user: &serenity::User, data: &Data) {
    if user.bot {
        return;
    }

    match data
        .ledger
        .record_leave(guild_id.get() as i64, user.id.get() as i64)
        .await
    {
        Ok(Some(inviter_id)) => {
            info!(
                guild_id = guild_id.get(),
                user_id = user.id.get(),
                inviter_id,
                "Member left, ledger updated"
            );
        }
        Ok(None) => {
            debug!(
                guild_id = guild_id.get(),
                user_id = user.id.get(),
                "Member left without a tracked join, nothing to update"
            );
        }
        Err(e) => {
            error!(
                guild_id = guild_id.get(),
                user_id = user.id.get(),
                "Failed to record leave: {e:?}"
            );
        }
    }
}
