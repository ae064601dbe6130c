//! Pipeline stages for markdown-to-spec-sheet conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! parse ──▶ classify ──▶ build ──▶ layout ──▶ render
//! (table)   (LLM)        (record)  (pages)    (PDF bytes)
//! ```
//!
//! 1. [`parse`]    : split the pipe table into per-product blocks; never fails,
//!    bad rows become warnings
//! 2. [`classify`]: retry/degrade/coverage policy around a
//!    [`classify::ClassifierBackend`]; [`llm`] is the provider-backed one and
//!    the only stage with network I/O
//! 3. [`build`]    : merge, sanitize and order into a `ProductRecord`, using
//!    the text rules in [`sanitize`]
//! 4. [`layout`]   : paginate the two-column table with the metrics in
//!    [`fonts`]
//! 5. [`render`]   : stage pages per product and write the PDF

pub mod build;
pub mod classify;
pub mod fonts;
pub mod layout;
pub mod llm;
pub mod parse;
pub mod render;
pub mod sanitize;
