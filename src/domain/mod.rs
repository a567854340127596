//! Domain models - session state and kiosk wire types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Session` - the shared workflow record guarded by the workflow mutex
//! - `WatchdogKind` - the three expected-event waits of a session
//! - `User`, `Role`, `CardId` - card holder identity
//! - `SkuDelta`, `Ledger`, `AuditEntry` - inference result bookkeeping
//! - `BoardStatus` - controller board status report
//! - `KioskEvent` - events from the card reader and vision system

pub mod session;
pub mod types;

pub use session::{Session, SessionId, SessionSnapshot, WatchdogKind, WatchdogTokens};
pub use types::{AuditEntry, BoardStatus, CardId, KioskEvent, Ledger, Role, SkuDelta, User};
