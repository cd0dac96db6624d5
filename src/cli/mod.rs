pub mod commands;
pub mod shell;

pub use commands::{build_cli, handle_local_commands, handle_subcommands};
pub use shell::Shell;
