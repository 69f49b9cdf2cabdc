use thiserror::Error;

/// Failure of an on-demand constant pool lookup.
///
/// The resolver does not know where an index came from, so these errors carry no byte offset.
/// Decode sites lift them into a positioned [`ClassFileError`] with [`ConstantPoolError::at`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstantPoolError {
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
    #[error("Expected {expected} at constant pool index {index}, found {found}")]
    WrongVariant {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("No bootstrap method at index {0}")]
    MissingBootstrapMethod(u16),
    #[error("Utf8 entry {0} holds an unpaired surrogate")]
    UnpairedSurrogate(u16),
}
impl ConstantPoolError {
    pub fn at(self, offset: usize) -> ClassFileError {
        match self {
            ConstantPoolError::InvalidIndex(index)
            | ConstantPoolError::MissingBootstrapMethod(index) => {
                ClassFileError::InvalidIndex { offset, index }
            }
            ConstantPoolError::WrongVariant {
                index,
                expected,
                found,
            } => ClassFileError::WrongVariant {
                offset,
                index,
                expected,
                found,
            },
            ConstantPoolError::UnpairedSurrogate(_) => ClassFileError::MalformedUtf8 { offset },
        }
    }
}

/// Failure to parse a field or method descriptor string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Unexpected end of descriptor `{0}`")]
    UnexpectedEnd(String),
    #[error("Unexpected {found:?} at position {position} of descriptor `{descriptor}`")]
    UnexpectedChar {
        descriptor: String,
        position: usize,
        found: char,
    },
    #[error("Array descriptor `{0}` has more than 255 dimensions")]
    TooManyDimensions(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("Truncated input at offset {offset}: {needed} byte(s) requested")]
    TruncatedInput { offset: usize, needed: usize },
    #[error("Invalid magic identifier: 0x{magic:X}")]
    InvalidMagicIdentifier { offset: usize, magic: u32 },
    #[error("Unsupported class file version {major}.{minor}")]
    UnsupportedVersion {
        offset: usize,
        major: u16,
        minor: u16,
    },
    #[error("Invalid cp info tag {tag} at offset {offset}")]
    InvalidCpInfoTag { offset: usize, tag: u8 },
    #[error("Malformed modified UTF-8 at offset {offset}")]
    MalformedUtf8 { offset: usize },
    #[error("Invalid constant pool index {index} at offset {offset}")]
    InvalidIndex { offset: usize, index: u16 },
    #[error("Expected {expected} at constant pool index {index}, found {found} (offset {offset})")]
    WrongVariant {
        offset: usize,
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Invalid method handle reference kind {kind} at offset {offset}")]
    InvalidReferenceKind { offset: usize, kind: u8 },
    #[error(
        "Attribute `{name}` at offset {offset} declares {declared} bytes, payload spans {consumed}"
    )]
    AttributeLengthMismatch {
        offset: usize,
        name: String,
        declared: u32,
        consumed: usize,
    },
    #[error("Unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("Malformed switch table at offset {offset}: {reason}")]
    MalformedSwitchTable { offset: usize, reason: &'static str },
    #[error("Malformed operands for opcode 0x{opcode:02X} at offset {offset}")]
    MalformedInstruction { offset: usize, opcode: u8 },
    #[error("Branch target {target} out of range at offset {offset}")]
    BranchOutOfRange { offset: usize, target: i64 },
    #[error("Constant pool index {index} does not fit in one byte (offset {offset})")]
    ConstantIndexTooWide { offset: usize, index: u16 },
    #[error("Invalid element value tag {tag:?} at offset {offset}")]
    InvalidElementValueTag { offset: usize, tag: char },
    #[error("Too many {what}: {count} (offset {offset})")]
    CountOverflow {
        offset: usize,
        what: &'static str,
        count: usize,
    },
    #[error("{count} trailing byte(s) after the class file at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },
}
impl ClassFileError {
    /// Byte offset at which the fault was detected.
    ///
    /// For decode errors this is an offset into the input buffer; for encode errors it is an
    /// offset into the output being produced.
    pub fn offset(&self) -> usize {
        match *self {
            ClassFileError::TruncatedInput { offset, .. }
            | ClassFileError::InvalidMagicIdentifier { offset, .. }
            | ClassFileError::UnsupportedVersion { offset, .. }
            | ClassFileError::InvalidCpInfoTag { offset, .. }
            | ClassFileError::MalformedUtf8 { offset }
            | ClassFileError::InvalidIndex { offset, .. }
            | ClassFileError::WrongVariant { offset, .. }
            | ClassFileError::InvalidReferenceKind { offset, .. }
            | ClassFileError::AttributeLengthMismatch { offset, .. }
            | ClassFileError::UnknownOpcode { offset, .. }
            | ClassFileError::MalformedSwitchTable { offset, .. }
            | ClassFileError::MalformedInstruction { offset, .. }
            | ClassFileError::BranchOutOfRange { offset, .. }
            | ClassFileError::ConstantIndexTooWide { offset, .. }
            | ClassFileError::InvalidElementValueTag { offset, .. }
            | ClassFileError::CountOverflow { offset, .. }
            | ClassFileError::TrailingBytes { offset, .. } => offset,
        }
    }

    /// Shifts the offset of an error raised inside a scratch buffer that lands at `base`.
    pub(crate) fn rebase(mut self, base: usize) -> Self {
        match &mut self {
            ClassFileError::TruncatedInput { offset, .. }
            | ClassFileError::InvalidMagicIdentifier { offset, .. }
            | ClassFileError::UnsupportedVersion { offset, .. }
            | ClassFileError::InvalidCpInfoTag { offset, .. }
            | ClassFileError::MalformedUtf8 { offset }
            | ClassFileError::InvalidIndex { offset, .. }
            | ClassFileError::WrongVariant { offset, .. }
            | ClassFileError::InvalidReferenceKind { offset, .. }
            | ClassFileError::AttributeLengthMismatch { offset, .. }
            | ClassFileError::UnknownOpcode { offset, .. }
            | ClassFileError::MalformedSwitchTable { offset, .. }
            | ClassFileError::MalformedInstruction { offset, .. }
            | ClassFileError::BranchOutOfRange { offset, .. }
            | ClassFileError::ConstantIndexTooWide { offset, .. }
            | ClassFileError::InvalidElementValueTag { offset, .. }
            | ClassFileError::CountOverflow { offset, .. }
            | ClassFileError::TrailingBytes { offset, .. } => *offset += base,
        }
        self
    }
}
