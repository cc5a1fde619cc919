//! CLI domain: parse, route and output only.
//! No domain orchestration; the route table dispatches through the host.

mod output;
mod parse;
mod route;

pub use output::{map_error, to_pretty_json};
pub use parse::{Cli, Commands};
pub use route::RunContext;
