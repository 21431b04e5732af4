// Report persistence and the report HTTP surface.
// store: metadata records on Postgres. gateway: best-effort upload + insert,
// and admin deletion. handlers: generate / list / download / delete.

pub mod gateway;
pub mod handlers;
pub mod store;

pub use store::{PgReportStore, ReportStore};
