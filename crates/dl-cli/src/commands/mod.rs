//! CLI command implementations

mod inspect;
mod list;
mod ping;
mod profiles;

pub use inspect::inspect_command;
pub use list::list_command;
pub use ping::ping_command;
pub use profiles::{profile_rows, profiles_command};
