//! Error types for the vcsc compiler

use thiserror::Error;

/// Compiler errors
///
/// Every kind is fatal: compilation aborts on the first occurrence and no
/// partial output is considered usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Instruction selection errors
    /// An opcode has no registered handler
    ///
    /// **Triggered by:** bytecode using operations the target cannot express
    /// **Example:** `mul` (the 6502 has no multiply instruction)
    #[error("Unsupported opcode '{opcode}' at IL_{offset:04X} in {method}")]
    UnsupportedOpcode {
        /// Opcode mnemonic
        opcode: String,
        /// Instruction offset
        offset: u32,
        /// Method containing the instruction
        method: String,
    },

    /// An operand value cannot be represented on the target
    ///
    /// **Triggered by:** constants outside the byte range, missing operands
    /// **Example:** `ldc.i4 300`
    #[error("Invalid instruction at IL_{offset:04X} in {method}: {reason}")]
    InvalidInstruction {
        /// Instruction offset
        offset: u32,
        /// Method containing the instruction
        method: String,
        /// What is wrong with it
        reason: String,
    },

    // Resolution errors
    /// A call target is not declared by any known assembly
    #[error("Method not found in any known assembly: {method}")]
    MissingMethod {
        /// Fully-qualified method name
        method: String,
    },

    /// A type is not declared by any known assembly
    #[error("Type not found in any known assembly: {ty}")]
    MissingType {
        /// Fully-qualified type name
        ty: String,
    },

    /// A field is not declared by its declaring type
    #[error("Field not found: {field}")]
    MissingField {
        /// Fully-qualified field name
        field: String,
    },

    /// The program declares no entry point
    #[error("No entry point declared by assembly '{assembly}'")]
    MissingEntryPoint {
        /// Name of the user assembly
        assembly: String,
    },

    // Call override errors
    /// A call-override marker doesn't match the callee's signature
    ///
    /// **Triggered by:** a store-to-symbol accessor taking two parameters,
    /// a register load taking none
    #[error("{marker} on {method} requires {expected} parameter(s), found {actual}")]
    ArityMismatch {
        /// Fully-qualified callee name
        method: String,
        /// Marker kind
        marker: String,
        /// Parameter count the marker supports
        expected: usize,
        /// Parameter count the callee declares
        actual: usize,
    },

    /// The callee's signature can't be called or inlined yet
    #[error("Cannot {action} {method}: {reason}")]
    UnsupportedSignature {
        /// Fully-qualified callee name
        method: String,
        /// "inline" or "call"
        action: String,
        /// Which restriction failed
        reason: String,
    },

    /// An inlined routine reaches itself through the inline chain
    #[error("Recursive inline expansion of {method} (chain: {chain})")]
    RecursiveInline {
        /// Fully-qualified method name
        method: String,
        /// Inline chain leading back to the method
        chain: String,
    },

    /// A value type contains itself
    #[error("Type {ty} has an infinitely recursive layout")]
    RecursiveLayout {
        /// Fully-qualified type name
        ty: String,
    },

    /// A value type is larger than the 16-bit address space
    #[error("Type {ty} is too large to lay out")]
    LayoutTooLarge {
        /// Fully-qualified type name
        ty: String,
    },

    /// An inline-assembly alias is malformed or declared twice
    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias {
        /// Alias as declared
        alias: String,
        /// Why it was rejected
        reason: String,
    },

    // Memory errors
    /// Static allocation ran into the region reserved for the hardware stack
    ///
    /// **Triggered by:** too many globals, locals or parameters for 128 bytes of RAM
    #[error("RAM exhausted allocating {label} ({requested} byte(s) at ${next:02X}, limit ${limit:02X})")]
    RamExhausted {
        /// Label being allocated
        label: String,
        /// Bytes requested
        requested: u16,
        /// Next free address
        next: u16,
        /// First address owned by the stack
        limit: u16,
    },

    // Internal consistency errors
    /// Preprocessed entries survived the mandatory rewrite rules
    #[error("Internal error: preprocessed entries left after optimization in {method}: {entries:?}")]
    LeftoverPreprocessedEntries {
        /// Routine being optimized
        method: String,
        /// Rendered leftovers
        entries: Vec<String>,
    },

    /// A stack operation was requested on a routine with no tracked stack
    #[error("Internal error: stack operation on a zero-depth stack tracker")]
    StackDepth,

    // Environment errors
    /// Malformed program or configuration input
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    /// File system error
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error
        message: String,
    },

    /// The external assembler could not be run
    #[error("Assembler error: {0}")]
    Assembler(String),
}

impl Error {
    /// Create an invalid-instruction error
    pub fn invalid_instruction(offset: u32, method: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInstruction {
            offset,
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error for a path
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the error indicates a compiler bug rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::LeftoverPreprocessedEntries { .. } | Error::StackDepth
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidProgram(err.to_string())
    }
}

/// Result type for vcsc operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_classification() {
        assert!(Error::StackDepth.is_internal());
        assert!(Error::LeftoverPreprocessedEntries {
            method: "Game.Program::Main".into(),
            entries: vec![],
        }
        .is_internal());
        assert!(!Error::MissingMethod {
            method: "Game.Program::Nope".into()
        }
        .is_internal());
    }

    #[test]
    fn test_messages() {
        let err = Error::UnsupportedOpcode {
            opcode: "mul".into(),
            offset: 0x12,
            method: "Game.Program::Main".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported opcode 'mul' at IL_0012 in Game.Program::Main"
        );

        let err = Error::RamExhausted {
            label: "GLOBAL_Game_Program_big".into(),
            requested: 4,
            next: 0xEE,
            limit: 0xF0,
        };
        assert!(err.to_string().contains("$EE"));
    }
}
