//! Integration tests for the Dockfleet server

mod common;
mod test_flow;
mod test_fsm;
mod test_http;
mod test_properties;
mod test_updates;
