//! Value-equality references to front-end entities
//!
//! The front end hands out types, fields, methods and instructions by name
//! and position. These wrappers compare and hash by that identifying data so
//! the optimizer and label resolver can match on them structurally.

use serde::{Deserialize, Serialize};
use std::fmt;

const POINTER_SUFFIXES: &[char] = &['*', '&'];

/// Reference to a type, keyed by its fully-qualified name
///
/// A trailing `*` or `&` marks a pointer or by-ref type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(String);

impl TypeRef {
    /// Creates a type reference from a fully-qualified name
    pub fn new(full_name: impl Into<String>) -> Self {
        Self(full_name.into())
    }

    /// `System.Byte`
    pub fn byte() -> Self {
        Self::new("System.Byte")
    }

    /// `System.Boolean`
    pub fn boolean() -> Self {
        Self::new("System.Boolean")
    }

    /// `System.Void`
    pub fn void() -> Self {
        Self::new("System.Void")
    }

    /// `System.String`, only valid as an inline-assembly argument
    pub fn string() -> Self {
        Self::new("System.String")
    }

    /// Sentinel type for empty stack slots
    pub fn nothing() -> Self {
        Self::new("VCSFramework.Nothing")
    }

    /// Fully-qualified name, including any pointer suffix
    pub fn full_name(&self) -> &str {
        &self.0
    }

    /// True for `T*` and `T&`
    pub fn is_pointer(&self) -> bool {
        self.0.ends_with('*') || self.0.ends_with('&')
    }

    /// True for `System.Void`
    pub fn is_void(&self) -> bool {
        self.0 == "System.Void"
    }

    /// The pointee of a pointer type, or the type itself
    pub fn element_type(&self) -> TypeRef {
        TypeRef(self.0.trim_end_matches(POINTER_SUFFIXES).to_string())
    }

    /// Pointer to this type
    pub fn pointer_to(&self) -> TypeRef {
        TypeRef(format!("{}*", self.0))
    }

    /// Namespace part of the name (empty for the global namespace)
    pub fn namespace(&self) -> &str {
        let element = self.0.trim_end_matches(POINTER_SUFFIXES);
        element.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Simple name without namespace
    pub fn name(&self) -> &str {
        let element = self.0.trim_end_matches(POINTER_SUFFIXES);
        element.rsplit_once('.').map(|(_, n)| n).unwrap_or(element)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn split_member(full_name: &str) -> Result<(TypeRef, String), String> {
    match full_name.split_once("::") {
        Some((ty, member)) if !ty.is_empty() && !member.is_empty() => {
            Ok((TypeRef::new(ty), member.to_string()))
        }
        _ => Err(format!(
            "expected 'Namespace.Type::Member', got '{}'",
            full_name
        )),
    }
}

/// Reference to a field, keyed by `Namespace.Type::field`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    declaring_type: TypeRef,
    name: String,
}

impl FieldRef {
    /// Creates a field reference
    pub fn new(declaring_type: TypeRef, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
        }
    }

    /// Parses `Namespace.Type::field`
    pub fn parse(full_name: &str) -> Result<Self, String> {
        let (declaring_type, name) = split_member(full_name)?;
        Ok(Self {
            declaring_type,
            name,
        })
    }

    /// Type declaring the field
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Namespace.Type::field`
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl TryFrom<String> for FieldRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldRef> for String {
    fn from(value: FieldRef) -> Self {
        value.full_name()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// Reference to a method, keyed by `Namespace.Type::Method`
///
/// Overloads are not distinguished; all routines are static.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodRef {
    declaring_type: TypeRef,
    name: String,
}

impl MethodRef {
    /// Creates a method reference
    pub fn new(declaring_type: TypeRef, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
        }
    }

    /// Parses `Namespace.Type::Method`
    pub fn parse(full_name: &str) -> Result<Self, String> {
        let (declaring_type, name) = split_member(full_name)?;
        Ok(Self {
            declaring_type,
            name,
        })
    }

    /// Type declaring the method
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Method name, e.g. `Main` or `.cctor`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Namespace.Type::Method`
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }

    /// Whether this is a static initializer
    pub fn is_static_initializer(&self) -> bool {
        self.name == ".cctor"
    }
}

impl TryFrom<String> for MethodRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MethodRef> for String {
    fn from(value: MethodRef) -> Self {
        value.full_name()
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// Reference to one instruction, keyed by its offset in the method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstRef(pub u32);

impl InstRef {
    /// Instruction offset
    pub fn offset(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_type_ref_parts() {
        let ty = TypeRef::new("Game.Sprites.Player*");
        assert!(ty.is_pointer());
        assert_eq!(ty.namespace(), "Game.Sprites");
        assert_eq!(ty.name(), "Player");
        assert_eq!(ty.element_type(), TypeRef::new("Game.Sprites.Player"));
        assert_eq!(ty.element_type().pointer_to(), ty);

        let global = TypeRef::new("Program");
        assert_eq!(global.namespace(), "");
        assert_eq!(global.name(), "Program");
    }

    #[test]
    fn test_member_refs_compare_by_name() {
        let a = MethodRef::parse("Game.Program::Main").unwrap();
        let b = MethodRef::new(TypeRef::new("Game.Program"), "Main");
        assert_eq!(a, b);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.to_string(), "Game.Program::Main");

        assert!(FieldRef::parse("NoSeparator").is_err());
        assert!(MethodRef::parse("Game.Program::").is_err());
    }

    #[test]
    fn test_serde_uses_full_names() {
        let field: FieldRef = serde_json::from_str("\"Game.Program::score\"").unwrap();
        assert_eq!(field.declaring_type(), &TypeRef::new("Game.Program"));
        assert_eq!(field.name(), "score");
        assert_eq!(
            serde_json::to_string(&field).unwrap(),
            "\"Game.Program::score\""
        );
    }

    #[test]
    fn test_inst_ref_display() {
        assert_eq!(InstRef(0x2a).to_string(), "IL_002A");
    }
}
