pub mod data;
pub mod io;
pub mod printing;
pub mod profile;

pub use data::{ConfigFile, PromptBook};
pub use profile::{Profile, ProfileOverrides};
