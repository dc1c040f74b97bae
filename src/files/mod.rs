//! File references and their registration with the engine.

mod reference;
mod registry;

pub use reference::{FileContent, FileHandle, FileReference, InMemoryFile, LocalFile};
pub use registry::{RegistrationReport, UnsupportedFileSkipped, VirtualFileRegistry};
