//! Document model, text extraction, and the page-level citation locator.
//!
//! The retrieval API returns quoted snippets without page locations, so the
//! bot keeps its own page-indexed text model per uploaded file and matches
//! quotes back to 1-based page numbers locally.

pub mod extract;
pub mod locate;
pub mod ocr;
pub mod page;

pub use locate::Locator;
pub use page::Document;
