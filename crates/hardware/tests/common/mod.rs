/// Program builder.
pub mod builder;

/// Machines, clocks and run helpers.
pub mod harness;
