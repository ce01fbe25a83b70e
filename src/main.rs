use anyhow::Context as _;
use clap::Parser as _;
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod db;
mod modules;
mod services;

use modules::invite_tracking::ledger::LedgerStore;
use modules::invite_tracking::settings::SettingsStore;
use modules::invite_tracking::snapshot::InviteSnapshotStore;

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Publish commands. If no guild ID is provided, publish globally.
    #[arg(long, num_args = 0..)]
    publish: Option<Vec<u64>>,

    /// Clear all commands instead of publishing them.
    #[arg(long)]
    clear: bool,

    /// Rollback the specified number of migrations and run all migrations again.
    #[arg(long, num_args = 0..=1, default_missing_value = "1")]
    refresh_migrations: Option<u32>,
}

// Custom user data passed to all command functions
pub struct Data {
    pub snapshots: Arc<InviteSnapshotStore>,
    pub settings: Arc<SettingsStore>,
    pub ledger: Arc<LedgerStore>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting invite tracking bot...");

    // Establish database connection
    let db = db::establish_connection()
        .await
        .context("Failed to connect to database")?;

    // Run migrations
    use sea_orm_migration::MigratorTrait;
    if let Some(depth) = args.refresh_migrations {
        info!("Refreshing migrations (down {}, then up)...", depth);
        db::migrations::Migrator::down(&db, Some(depth))
            .await
            .context("Failed to rollback migration")?;
    }

    db::migrations::Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;

    if args.refresh_migrations.is_some() {
        info!("Migrations refreshed successfully.");
        return Ok(());
    }

    let token = std::env::var("DISCORD_TOKEN").context("missing DISCORD_TOKEN")?;
    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_INVITES;

    let commands = modules::commands();

    let framework_options = poise::FrameworkOptions {
        commands,
        event_handler: |ctx, event, _framework, data| {
            Box::pin(modules::dispatch_event(ctx, event, data))
        },
        ..Default::default()
    };

    // Handle command registration if requested
    if let Some(publish_args) = args.publish {
        let http = serenity::HttpBuilder::new(&token).build();
        let bot_user = http
            .get_current_user()
            .await
            .context("Failed to fetch bot user info")?;
        let application_id = bot_user.id;

        info!("Fetched Application ID: {}", application_id);

        let http = serenity::HttpBuilder::new(&token)
            .application_id(serenity::ApplicationId::new(application_id.get()))
            .build();

        let empty_commands = vec![];
        let commands = if args.clear {
            &empty_commands
        } else {
            &framework_options.commands
        };

        if publish_args.is_empty() {
            if args.clear {
                info!("Clearing commands globally...");
            } else {
                info!("Registering commands globally...");
            }

            if let Err(e) = poise::builtins::register_globally(&http, commands).await {
                error!("Failed to register commands globally: {}", e);
            } else {
                info!("Global command operation successful");
            }
        } else {
            for guild_id in publish_args {
                if args.clear {
                    info!("Clearing commands in guild {}...", guild_id);
                } else {
                    info!("Registering commands in guild {}...", guild_id);
                }

                if let Err(e) = poise::builtins::register_in_guild(
                    &http,
                    commands,
                    serenity::GuildId::new(guild_id),
                )
                .await
                {
                    error!("Failed to register commands in guild {}: {}", guild_id, e);
                } else {
                    info!("Guild command operation successful for guild {}", guild_id);
                }
            }
        }
        return Ok(());
    }

    // Initialize shared services
    let snapshots = Arc::new(InviteSnapshotStore::new());
    let settings = Arc::new(SettingsStore::new(db.clone()));
    let ledger = Arc::new(LedgerStore::new(db.clone()));

    // Start the dashboard API if an address is configured
    if let Ok(addr) = std::env::var("DASHBOARD_ADDR") {
        let state = api::AppState {
            settings: settings.clone(),
            ledger: ledger.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = api::serve(addr, state).await {
                error!("Dashboard API error: {e:?}");
            }
        });
    }

    let data = Data {
        snapshots,
        settings,
        ledger,
    };

    // Create the poise framework
    let framework = poise::Framework::builder()
        .options(framework_options)
        .setup(move |_ctx, ready, _framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .context("Failed to create client")?;

    info!("Bot is ready!");
    client.start_autosharded().await.context("Client error")?;

    Ok(())
}
