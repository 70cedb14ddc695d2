//! Deployments and the actions that drive them

pub mod actions;
pub mod tracker;
