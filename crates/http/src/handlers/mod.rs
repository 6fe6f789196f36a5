#![allow(clippy::single_call_fn, reason = "HTTP handlers are called once from router")]

pub mod commit;
pub mod events;
pub mod monitoring;
pub mod pii;
pub mod plans;
pub mod sessions;
pub mod system;
pub mod voice;
