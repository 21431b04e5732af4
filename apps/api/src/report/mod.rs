// Report rendering: maps a `Report` onto the fixed DOCX layout.
// Pure and deterministic; no I/O. CPU-bound packing runs inside spawn_blocking.

pub mod render;

pub use render::{render_docx_blocking, report_filename, DOCX_MIME};
