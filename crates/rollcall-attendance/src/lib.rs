//! rollcall-attendance — the attendance domain.
//!
//! Identities and class sessions, the role-based authorization policy,
//! the attendance state machine (present/late with lateness accounting,
//! idempotent upsert), and the SQLite-backed store that also serves as
//! the identity directory and the encrypted face gallery.

pub mod ledger;
pub mod model;
pub mod policy;
pub mod store;

pub use ledger::{derive_status, AttendanceLedger};
pub use model::{AttendanceRecord, AttendanceStatus, IdentityProfile, Role, Session};
pub use policy::{authorize, AuthzDecision, DenyReason};
pub use store::{
    AttendanceStore, EmbeddingCipher, FaceGallery, IdentityDirectory, SqliteStore, StoreError,
};
