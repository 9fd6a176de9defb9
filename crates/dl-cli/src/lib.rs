//! dockline: Command-line interface
//!
//! Provides the `dockline` CLI for listing and inspecting composition
//! projects on the local engine or on remote engines reached through
//! SSH-forwarded sockets.

pub mod commands;
pub mod context;
pub mod output;
