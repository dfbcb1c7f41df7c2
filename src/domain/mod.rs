//! Domain layer: the job message model, its wire envelope, and the ports the
//! stage engine depends on.

pub mod cancel;
pub mod envelope;
pub mod message;
pub mod outcome;
pub mod ports;
