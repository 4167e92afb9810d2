pub mod registry;

pub use registry::{Persona, PersonaLookup, PersonaRegistry, RegistryError};
