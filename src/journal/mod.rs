//! Class and daily-entry persistence.
//!
//! A `Class` is a named course container owned by exactly one user; a
//! `DailyEntry` is a dated record under a class with a topic and up to two
//! audio attachments. Every query is scoped through the ownership chain
//! User 1—* Class 1—* DailyEntry — the store never returns another user's
//! rows, so "not owned" and "does not exist" are indistinguishable to
//! callers by construction.

pub mod store;

pub use store::{Class, ClassError, DailyEntry, EntryAudio, JournalStore};
