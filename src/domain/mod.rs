//! Domain types and the ports the engine talks through.

pub mod customer;
pub mod gateway;
pub mod notice;
pub mod payment;
pub mod ports;
