pub mod invite_tracking;

use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::error;

#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub id: &'static str,
}

pub type EventHandlerFn = for<'a> fn(
    &'a serenity::Context,
    &'a serenity::FullEvent,
    &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>>;

pub struct Module {
    pub definition: ModuleDefinition,
    pub commands: Vec<poise::Command<Data, Error>>,
}

pub fn get_modules() -> Vec<Module> {
    vec![invite_tracking::module()]
}

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    let mut all_commands = vec![];

    for mut module in get_modules() {
        let category = module.definition.id;
        for command in &mut module.commands {
            command.category = Some(category.into());
        }
        all_commands.extend(module.commands);
    }

    all_commands
}

/// Event handlers indexed by module id; kept separate from `get_modules` so
/// event dispatch does not rebuild command trees.
const EVENT_HANDLERS: &[(&str, EventHandlerFn)] =
    &[("invite_tracking", invite_tracking::events::handler)];

/// Forward a gateway event to every module handler. Handler errors are logged
/// here and never reach the gateway dispatcher.
pub async fn dispatch_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    for (module_id, handler) in EVENT_HANDLERS {
        if let Err(e) = handler(ctx, event, data).await {
            error!(module = module_id, "Error in event handler: {e:?}");
        }
    }
    Ok(())
}
