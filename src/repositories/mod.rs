pub mod audit;
pub mod user;

pub use audit::{AuditSink, PgAuditSink};
pub use user::{PgUserRecordStore, TwoFactorUpdate, UserRecordStore};
