//! Dockfleet agent protocol
//!
//! Request and response bodies exchanged between remote agents and the server.

pub mod models;
