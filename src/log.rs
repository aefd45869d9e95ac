//! Logging sink injected into the transfer engine.
//!
//! The engine never prints directly. On the board `RttLogger` forwards to the
//! RTT up-channel set up by `rtt_init_print!`; everywhere else (host tests,
//! builds without a debug probe) `NoOpLogger` swallows the output.

use core::fmt;

pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Prints through `rprintln!`. `rtt_init_print!` must have run first.
#[derive(Debug, Default, Clone, Copy)]
pub struct RttLogger;

impl Logger for RttLogger {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        rtt_target::rprintln!("{}", args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        rtt_target::rprintln!("error: {}", args);
    }
}
