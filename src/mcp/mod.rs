//! Model Context Protocol core: envelopes, capability registry and dispatch
//!
//! Transport-independent. Both the stdio and the HTTP front doors hand raw
//! JSON values to a [`dispatcher::Dispatch`] implementation.

pub mod audit;
pub mod dispatcher;
pub mod registry;
pub mod rpc;
