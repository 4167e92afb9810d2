//! Built-in character personas.
//!
//! The registry is an immutable table constructed once at startup and shared
//! by reference (usually behind an `Arc`) with every component that needs to
//! resolve a character name into its system prompt. There is deliberately no
//! way to mutate it after construction.
//!
//! Looking up an unknown name never fails: the registry hands back its
//! designated default persona instead, and [`PersonaLookup`] records which of
//! the two branches was taken so callers can log or surface the substitution.

use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

const BUILTIN_CHARACTERS: &str = include_str!("../../builtins/characters.toml");

/// A named system-prompt profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(rename = "prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Deserialize)]
struct CharacterTable {
    default: String,
    characters: Vec<Persona>,
}

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to parse character table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("character table is empty")]
    Empty,

    #[error("character '{0}' is defined more than once")]
    Duplicate(String),

    #[error("character '{0}' has an empty prompt")]
    EmptyPrompt(String),

    #[error("default character '{0}' is not defined in the table")]
    MissingDefault(String),
}

/// Outcome of resolving a character name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaLookup<'a> {
    /// The requested name is in the table.
    Found(&'a Persona),
    /// The requested name is unknown; the default persona stands in.
    Fallback {
        requested: &'a str,
        persona: &'a Persona,
    },
}

impl<'a> PersonaLookup<'a> {
    pub fn persona(&self) -> &'a Persona {
        match self {
            PersonaLookup::Found(persona) => persona,
            PersonaLookup::Fallback { persona, .. } => persona,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PersonaLookup::Fallback { .. })
    }
}

/// Read-only mapping from character name to system prompt.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    default_index: usize,
}

impl PersonaRegistry {
    /// Loads the table embedded in the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml(BUILTIN_CHARACTERS)
    }

    pub fn from_toml(contents: &str) -> Result<Self, RegistryError> {
        let table: CharacterTable = toml::from_str(contents)?;
        Self::new(table.characters, &table.default)
    }

    pub fn new(personas: Vec<Persona>, default_name: &str) -> Result<Self, RegistryError> {
        if personas.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for persona in &personas {
            if !seen.insert(persona.name.as_str()) {
                return Err(RegistryError::Duplicate(persona.name.clone()));
            }
            if persona.system_prompt.trim().is_empty() {
                return Err(RegistryError::EmptyPrompt(persona.name.clone()));
            }
        }

        let default_index = personas
            .iter()
            .position(|p| p.name == default_name)
            .ok_or_else(|| RegistryError::MissingDefault(default_name.to_string()))?;

        Ok(Self {
            personas,
            default_index,
        })
    }

    /// Character names in table order.
    pub fn names(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.personas.iter().any(|p| p.name == name)
    }

    pub fn default_persona(&self) -> &Persona {
        &self.personas[self.default_index]
    }

    fn find(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn lookup<'a>(&'a self, name: &'a str) -> PersonaLookup<'a> {
        match self.find(name) {
            Some(persona) => PersonaLookup::Found(persona),
            None => PersonaLookup::Fallback {
                requested: name,
                persona: self.default_persona(),
            },
        }
    }

    /// System prompt for `name`, or the default persona's prompt on a miss.
    pub fn get(&self, name: &str) -> &str {
        &self
            .find(name)
            .unwrap_or_else(|| self.default_persona())
            .system_prompt
    }
}
