// https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html

#[macro_use]
pub mod constant_pool;
mod access_flags;
pub mod attributes;
pub mod bytecode;
mod class_file;
pub mod cursor;
pub mod descriptor;
mod error;
pub mod mutf8;
mod options;
mod parser;
mod writer;

pub use self::class_file::{CallSite, ClassFile, FieldInfo, MethodInfo, Version, MAGIC};
pub use access_flags::AccessFlags;
pub use constant_pool::{ConstantPool, CpInfo};
pub use error::{ClassFileError, ConstantPoolError, DescriptorError};
pub use options::{ParseOptions, MAX_MAJOR_VERSION, MIN_MAJOR_VERSION};
pub use parser::Parser;
pub use writer::Writer;

pub type Result<T, E = ClassFileError> = std::result::Result<T, E>;

/// Decodes a complete class file with the default [`ParseOptions`].
pub fn decode(bytes: &[u8]) -> Result<ClassFile> {
    Parser::new(bytes).parse()
}

/// Encodes a class file model. Decoding and re-encoding an unmodified class yields the same bytes.
pub fn encode(class_file: &ClassFile) -> Result<Vec<u8>> {
    Writer::new(class_file).write()
}
