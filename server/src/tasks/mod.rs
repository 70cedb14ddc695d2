//! Task lifecycle

pub mod fsm;
pub mod queue;
