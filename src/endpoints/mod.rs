//!
//! Per-protocol endpoint handlers.
//!
//! Each handler validates its protocol's required fields, runs the shared
//! pipeline (image inlining, tool rewriting, model resolution, Argo
//! conversion), posts upstream through the shared session, and rebuilds the
//! client-format response, streaming or buffered.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod chat;
pub mod embed;
pub mod messages;
pub mod responses;
