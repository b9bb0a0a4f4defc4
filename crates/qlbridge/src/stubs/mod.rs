//! Interception stubs and the logic behind them.

pub mod detours;
pub mod printf;
pub mod translate;
pub mod variadic;
