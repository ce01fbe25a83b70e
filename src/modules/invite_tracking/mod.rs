pub mod commands;
pub mod events;
pub mod ledger;
pub mod resolver;
pub mod settings;
pub mod snapshot;
pub mod welcome;

use crate::modules::{Module, ModuleDefinition};

pub const DEFINITION: ModuleDefinition = ModuleDefinition {
    id: "invite_tracking",
};

pub fn module() -> Module {
    Module {
        definition: DEFINITION,
        commands: commands::commands(),
    }
}
