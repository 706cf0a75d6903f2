//! Terminal output for streamed responses.
//!
//! [`renderer`] turns classified events into terminal writes; [`markdown`]
//! converts a finished answer to ANSI-styled text for the markdown format.

pub mod markdown;
pub mod renderer;
