//!
//! Format conversion modules between client wire formats, the canonical IR,
//! and the Argo gateway dialect.
//!
//! Each module owns one wire format and exposes total conversion functions in
//! both directions for every content part it supports, plus message- and
//! request-level assembly. No module reaches across the IR into another wire
//! format directly.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod anthropic;
pub mod argo;
pub mod google;
pub mod openai;
