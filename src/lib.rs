//! Clipper - record, trim and play back mono audio clips
//!
//! The editing core lives in [`state::EditorSession`]; [`app`] is a terminal
//! frontend driving it.

pub mod app;
pub mod audio;
pub mod cli;
pub mod error;
pub mod presentation;
pub mod settings;
pub mod state;
