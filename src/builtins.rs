//! Builtin functions
//!
//! Identifiers that are visible from every scope without a preceding
//! declaration. They map one to one onto C standard library functions that
//! the generated code reaches through the prelude's includes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Formatted printing to standard output
    Printf,
    /// Formatted printing into a string buffer
    Sprintf,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "printf" => Some(Self::Printf),
            "sprintf" => Some(Self::Sprintf),
            _ => None,
        }
    }
}
