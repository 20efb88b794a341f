mod common;
mod routing;
mod state_machine;
