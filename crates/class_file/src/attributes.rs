mod annotation;

use std::fmt;

pub use self::annotation::{Annotation, ElementValue, ElementValuePair};
use crate::{bytecode::Instruction, AccessFlags, ConstantPool, ConstantPoolError};

/// Attribute payload kept as raw bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Opaque(pub Vec<u8>);
impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes(pub Vec<Attribute>);
impl Attributes {
    pub fn find_by_name(&self, name: &str, constant_pool: &ConstantPool) -> Option<&Attribute> {
        self.0
            .iter()
            .find(|a| constant_pool.get_utf8(a.attribute_name_index) == Ok(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn bootstrap_methods(&self) -> Option<&[BootstrapMethod]> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::BootstrapMethods(methods) => Some(methods.as_slice()),
            _ => None,
        })
    }

    /// Generic signature string, if a `Signature` attribute is present.
    pub fn signature<'a>(
        &self,
        constant_pool: &'a ConstantPool,
    ) -> Result<Option<&'a str>, ConstantPoolError> {
        self.iter()
            .find_map(|a| match a.info {
                AttributeInfo::Signature { signature_index } => Some(signature_index),
                _ => None,
            })
            .map(|index| constant_pool.get_utf8(index))
            .transpose()
    }

    pub fn source_file<'a>(
        &self,
        constant_pool: &'a ConstantPool,
    ) -> Result<Option<&'a str>, ConstantPoolError> {
        self.iter()
            .find_map(|a| match a.info {
                AttributeInfo::SourceFile { sourcefile_index } => Some(sourcefile_index),
                _ => None,
            })
            .map(|index| constant_pool.get_utf8(index))
            .transpose()
    }
}
impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attribute_name_index: u16,
    pub info: AttributeInfo,
}
impl Attribute {
    pub fn name<'a>(&self, constant_pool: &'a ConstantPool) -> Result<&'a str, ConstantPoolError> {
        constant_pool.get_utf8(self.attribute_name_index)
    }
}

/// Decoded payload of an attribute, selected by the attribute's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    ConstantValue {
        constantvalue_index: u16,
    },
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    /// Same layout as `LocalVariableTable`; `descriptor_index` holds a signature.
    LocalVariableTypeTable(Vec<LocalVariable>),
    /// Frames are stored verbatim and never interpreted.
    StackMapTable {
        number_of_entries: u16,
        frames: Opaque,
    },
    Exceptions(Vec<u16>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod {
        class_index: u16,
        /// Zero when the class is not enclosed by a method or constructor.
        method_index: u16,
    },
    BootstrapMethods(Vec<BootstrapMethod>),
    Signature {
        signature_index: u16,
    },
    SourceFile {
        sourcefile_index: u16,
    },
    NestHost {
        host_class_index: u16,
    },
    NestMembers(Vec<u16>),
    PermittedSubclasses(Vec<u16>),
    Synthetic,
    Deprecated,
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    Unknown(Opaque),
}
impl AttributeInfo {
    pub const CODE: &'static str = "Code";
    pub const CONSTANT_VALUE: &'static str = "ConstantValue";
    pub const LINE_NUMBER_TABLE: &'static str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &'static str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &'static str = "LocalVariableTypeTable";
    pub const STACK_MAP_TABLE: &'static str = "StackMapTable";
    pub const EXCEPTIONS: &'static str = "Exceptions";
    pub const INNER_CLASSES: &'static str = "InnerClasses";
    pub const ENCLOSING_METHOD: &'static str = "EnclosingMethod";
    pub const BOOTSTRAP_METHODS: &'static str = "BootstrapMethods";
    pub const SIGNATURE: &'static str = "Signature";
    pub const SOURCE_FILE: &'static str = "SourceFile";
    pub const NEST_HOST: &'static str = "NestHost";
    pub const NEST_MEMBERS: &'static str = "NestMembers";
    pub const PERMITTED_SUBCLASSES: &'static str = "PermittedSubclasses";
    pub const SYNTHETIC: &'static str = "Synthetic";
    pub const DEPRECATED: &'static str = "Deprecated";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &'static str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &'static str = "RuntimeInvisibleAnnotations";

    /// Name the payload is decoded from, `None` for [`AttributeInfo::Unknown`].
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeInfo::Code(_) => Self::CODE,
            AttributeInfo::ConstantValue { .. } => Self::CONSTANT_VALUE,
            AttributeInfo::LineNumberTable(_) => Self::LINE_NUMBER_TABLE,
            AttributeInfo::LocalVariableTable(_) => Self::LOCAL_VARIABLE_TABLE,
            AttributeInfo::LocalVariableTypeTable(_) => Self::LOCAL_VARIABLE_TYPE_TABLE,
            AttributeInfo::StackMapTable { .. } => Self::STACK_MAP_TABLE,
            AttributeInfo::Exceptions(_) => Self::EXCEPTIONS,
            AttributeInfo::InnerClasses(_) => Self::INNER_CLASSES,
            AttributeInfo::EnclosingMethod { .. } => Self::ENCLOSING_METHOD,
            AttributeInfo::BootstrapMethods(_) => Self::BOOTSTRAP_METHODS,
            AttributeInfo::Signature { .. } => Self::SIGNATURE,
            AttributeInfo::SourceFile { .. } => Self::SOURCE_FILE,
            AttributeInfo::NestHost { .. } => Self::NEST_HOST,
            AttributeInfo::NestMembers(_) => Self::NEST_MEMBERS,
            AttributeInfo::PermittedSubclasses(_) => Self::PERMITTED_SUBCLASSES,
            AttributeInfo::Synthetic => Self::SYNTHETIC,
            AttributeInfo::Deprecated => Self::DEPRECATED,
            AttributeInfo::RuntimeVisibleAnnotations(_) => Self::RUNTIME_VISIBLE_ANNOTATIONS,
            AttributeInfo::RuntimeInvisibleAnnotations(_) => Self::RUNTIME_INVISIBLE_ANNOTATIONS,
            AttributeInfo::Unknown(_) => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero for a handler that catches everything (`finally`).
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    /// Instructions with their program counter, in code order.
    pub instructions: Vec<(u32, Instruction)>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Attributes,
}
impl CodeAttribute {
    pub fn instruction_at(&self, pc: u32) -> Option<&Instruction> {
        self.instructions
            .binary_search_by_key(&pc, |(at, _)| *at)
            .ok()
            .map(|i| &self.instructions[i].1)
    }

    pub fn line_numbers(&self) -> Option<&[LineNumber]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::LineNumberTable(lines) => Some(lines.as_slice()),
            _ => None,
        })
    }

    /// Source line of the instruction at `pc`, from the first `LineNumberTable`.
    pub fn line_number_at(&self, pc: u32) -> Option<u16> {
        self.line_numbers()?
            .iter()
            .filter(|l| l.start_pc as u32 <= pc)
            .max_by_key(|l| l.start_pc)
            .map(|l| l.line_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class_info_index: u16,
    /// Zero for top-level, local and anonymous classes.
    pub outer_class_info_index: u16,
    /// Zero for anonymous classes.
    pub inner_name_index: u16,
    pub inner_class_access_flags: AccessFlags,
}

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// Index of a `MethodHandle` in the constant pool.
    pub bootstrap_method_ref: u16,
    /// Indices of loadable constants passed as static arguments.
    pub bootstrap_arguments: Vec<u16>,
}
