//! Type, field and method metadata supplied by the front end

use super::framework::FRAMEWORK;
use super::opcode::Instruction;
use super::refs::{FieldRef, MethodRef, TypeRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CPU register targeted by a register-load override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    /// Accumulator
    A,
    /// X index register
    X,
    /// Y index register
    Y,
}

impl Register {
    /// Register number understood by `popToRegister`
    pub fn index(self) -> u8 {
        match self {
            Register::A => 0,
            Register::X => 1,
            Register::Y => 2,
        }
    }
}

/// Compiler intrinsics a callee can be replaced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intrinsic {
    /// Emit a string literal as assembly text
    InlineAssembly,
    /// Element count of a ROM data field
    RomDataLength,
    /// Element size of a ROM data field
    RomDataStride,
    /// Address of one ROM data element
    RomDataGetter,
}

/// Declarative call-override marker on a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallMarker {
    /// Calls compile to nothing
    IgnoreCall,
    /// Write to a fixed symbol (strobe when the callee takes no parameters)
    StoreToSymbol {
        /// Hardware symbol, e.g. `COLUBK`
        symbol: String,
    },
    /// Read from a fixed symbol
    LoadFromSymbol {
        /// Hardware symbol, e.g. `INTIM`
        symbol: String,
    },
    /// Pop the argument into a CPU register
    LoadToRegister {
        /// Destination register
        register: Register,
    },
    /// Replace the call with a compiler intrinsic
    ReplaceWithEntry {
        /// Intrinsic to instantiate
        intrinsic: Intrinsic,
    },
    /// Always inline the callee
    AlwaysInline,
}

impl CallMarker {
    /// Human-readable marker name for diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            CallMarker::IgnoreCall => "IgnoreCall",
            CallMarker::StoreToSymbol { .. } => "StoreToSymbol",
            CallMarker::LoadFromSymbol { .. } => "LoadFromSymbol",
            CallMarker::LoadToRegister { .. } => "LoadToRegister",
            CallMarker::ReplaceWithEntry { .. } => "ReplaceWithEntry",
            CallMarker::AlwaysInline => "AlwaysInline",
        }
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// Constant data placed in ROM instead of RAM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomData {
    /// Type of one element
    pub element_type: TypeRef,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// Static fields live in global RAM
    #[serde(default)]
    pub is_static: bool,
    /// ROM-resident data; the field then occupies no RAM
    #[serde(default)]
    pub rom_data: Option<RomData>,
    /// Names usable from inline assembly (`ALIAS_` prefix required)
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FieldDef {
    /// Creates an instance field
    pub fn instance(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
            rom_data: None,
            aliases: Vec::new(),
        }
    }

    /// Creates a static field
    pub fn global(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            is_static: true,
            ..Self::instance(name, ty)
        }
    }
}

fn void_type() -> TypeRef {
    TypeRef::void()
}

/// Method declaration and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Declared parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Return type
    #[serde(default = "void_type")]
    pub return_type: TypeRef,
    /// Local variable types by slot
    #[serde(default)]
    pub locals: Vec<TypeRef>,
    /// Instruction stream
    #[serde(default)]
    pub body: Vec<Instruction>,
    /// Call-override marker
    #[serde(default)]
    pub marker: Option<CallMarker>,
}

impl MethodDef {
    /// Creates a parameterless void method
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: TypeRef::void(),
            locals: Vec::new(),
            body: Vec::new(),
            marker: None,
        }
    }

    /// Sets the body
    pub fn with_body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body;
        self
    }

    /// Sets the local slots
    pub fn with_locals(mut self, locals: Vec<TypeRef>) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the return type
    pub fn returning(mut self, ty: TypeRef) -> Self {
        self.return_type = ty;
        self
    }

    /// Appends a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            ty,
        });
        self
    }

    /// Sets the call-override marker
    pub fn with_marker(mut self, marker: CallMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

/// Type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Fully-qualified name
    pub name: TypeRef,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Methods in declaration order
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    /// Fixed size of a built-in primitive
    #[serde(default)]
    pub primitive_size: Option<u16>,
}

impl TypeDef {
    /// Creates an empty composite type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: TypeRef::new(name),
            fields: Vec::new(),
            methods: Vec::new(),
            primitive_size: None,
        }
    }

    /// Creates a primitive type with a fixed size
    pub fn primitive(name: impl Into<String>, size: u16) -> Self {
        Self {
            primitive_size: Some(size),
            ..Self::new(name)
        }
    }

    /// Appends a field
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a method
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Reference to one of this type's methods
    pub fn method_ref(&self, name: &str) -> MethodRef {
        MethodRef::new(self.name.clone(), name)
    }

    /// Reference to one of this type's fields
    pub fn field_ref(&self, name: &str) -> FieldRef {
        FieldRef::new(self.name.clone(), name)
    }
}

/// One compiled front-end module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    /// Module name
    pub name: String,
    /// Types in declaration order
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// Program entry point
    #[serde(default)]
    pub entry_point: Option<MethodRef>,
}

impl Assembly {
    /// Creates an empty assembly
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            entry_point: None,
        }
    }

    /// Appends a type
    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    /// Sets the entry point
    pub fn with_entry_point(mut self, method: MethodRef) -> Self {
        self.entry_point = Some(method);
        self
    }

    /// Parses an assembly from the front end's JSON output
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The known-assembly universe: the user program plus the built-in framework
#[derive(Debug, Clone)]
pub struct AssemblySet {
    assemblies: Vec<Assembly>,
    index: HashMap<TypeRef, (usize, usize)>,
}

impl AssemblySet {
    /// Creates the set for a user program
    pub fn new(user: Assembly) -> Self {
        Self::with_assemblies(vec![user, FRAMEWORK.clone()])
    }

    /// Creates a set from explicit assemblies; the first one is the user program
    pub fn with_assemblies(assemblies: Vec<Assembly>) -> Self {
        let mut index = HashMap::new();
        for (a, assembly) in assemblies.iter().enumerate() {
            for (t, ty) in assembly.types.iter().enumerate() {
                index.entry(ty.name.clone()).or_insert((a, t));
            }
        }
        Self { assemblies, index }
    }

    /// The user program
    pub fn user(&self) -> &Assembly {
        &self.assemblies[0]
    }

    /// All types in declaration order, user program first
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.assemblies.iter().flat_map(|a| a.types.iter())
    }

    /// Looks up a type; pointer suffixes are ignored
    pub fn find_type(&self, ty: &TypeRef) -> Result<&TypeDef> {
        let element = ty.element_type();
        self.index
            .get(&element)
            .map(|&(a, t)| &self.assemblies[a].types[t])
            .ok_or_else(|| Error::MissingType {
                ty: element.to_string(),
            })
    }

    /// Looks up a method
    pub fn find_method(&self, method: &MethodRef) -> Result<&MethodDef> {
        self.find_type(method.declaring_type())
            .ok()
            .and_then(|ty| ty.method(method.name()))
            .ok_or_else(|| Error::MissingMethod {
                method: method.to_string(),
            })
    }

    /// Looks up a field
    pub fn find_field(&self, field: &FieldRef) -> Result<&FieldDef> {
        self.find_type(field.declaring_type())
            .ok()
            .and_then(|ty| ty.field(field.name()))
            .ok_or_else(|| Error::MissingField {
                field: field.to_string(),
            })
    }

    /// Entry point of the user program
    pub fn entry_point(&self) -> Result<MethodRef> {
        self.user()
            .entry_point
            .clone()
            .ok_or_else(|| Error::MissingEntryPoint {
                assembly: self.user().name.clone(),
            })
    }

    /// Static initializers of the user program
    ///
    /// The order in which initializers run is unspecified. Programs must not
    /// depend on one initializer observing another's effects.
    pub fn static_initializers(&self) -> Vec<MethodRef> {
        self.user()
            .types
            .iter()
            .filter(|ty| ty.method(".cctor").is_some())
            .map(|ty| ty.method_ref(".cctor"))
            .collect()
    }
}
