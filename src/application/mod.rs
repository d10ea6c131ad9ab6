//! Application layer containing the settlement orchestration.
//!
//! `SettlementEngine` is the entry point for opening payment attempts and
//! reconciling gateway callbacks. Background loops for session expiry and
//! due-date reminders run beside it on their own schedules.

pub mod engine;
pub mod reminders;
pub mod sessions;
pub mod sweeper;
