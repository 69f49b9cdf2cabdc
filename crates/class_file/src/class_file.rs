use std::fmt;

use crate::{
    attributes::{Attributes, BootstrapMethod, CodeAttribute},
    bytecode::Instruction,
    constant_pool::{ClassInfo, CpInfo, MethodHandleInfo},
    matches_cp_info,
    parser::Parser,
    writer::Writer,
    AccessFlags, ConstantPool, ConstantPoolError, Result,
};

pub const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub magic: u32,
    pub version: Version,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Attributes,
}
impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        Parser::new(bytes).parse()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Writer::new(self).write()
    }

    pub fn super_class(&self) -> Result<Option<&str>, ConstantPoolError> {
        // If the value of the super_class item is zero, then this class file must represent the
        // class Object, the only class or interface without a direct superclass.
        if self.super_class == 0 {
            return Ok(None);
        }

        let ClassInfo { name_index } =
            matches_cp_info!(self.constant_pool, self.super_class, Class)?;

        self.constant_pool.get_utf8(*name_index).map(Some)
    }

    pub fn class_name(&self) -> Result<&str, ConstantPoolError> {
        // The constant_pool entry at this_class must be a CONSTANT_Class_info structure
        // representing the class or interface defined by this class file.
        self.constant_pool.class_name(self.this_class)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ConstantPoolError> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    pub fn field_name(&self, field: &FieldInfo) -> Result<&str, ConstantPoolError> {
        self.constant_pool.get_utf8(field.name_index)
    }

    pub fn field_descriptor(&self, field: &FieldInfo) -> Result<&str, ConstantPoolError> {
        self.constant_pool.get_utf8(field.descriptor_index)
    }

    pub fn method_name(&self, method: &MethodInfo) -> Result<&str, ConstantPoolError> {
        self.constant_pool.get_utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<&str, ConstantPoolError> {
        self.constant_pool.get_utf8(method.descriptor_index)
    }

    /// First method called `name`, optionally also matching `descriptor`.
    pub fn find_method(&self, name: &str, descriptor: Option<&str>) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.method_name(m) == Ok(name)
                && descriptor.map_or(true, |d| self.method_descriptor(m) == Ok(d))
        })
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| self.field_name(f) == Ok(name))
    }

    /// Entries of the class's `BootstrapMethods` attribute, empty if it has none.
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        self.attributes.bootstrap_methods().unwrap_or(&[])
    }

    /// Bootstrap method of the `InvokeDynamic` or `Dynamic` entry at `index`.
    pub fn resolve_bootstrap(&self, index: u16) -> Result<&BootstrapMethod, ConstantPoolError> {
        let dynamic = match self.constant_pool.get(index)? {
            CpInfo::InvokeDynamic(d) | CpInfo::Dynamic(d) => d,
            c => {
                return Err(ConstantPoolError::WrongVariant {
                    index,
                    expected: "InvokeDynamic or Dynamic",
                    found: c.kind(),
                })
            }
        };

        self.bootstrap_methods()
            .get(dynamic.bootstrap_method_attr_index as usize)
            .ok_or(ConstantPoolError::MissingBootstrapMethod(
                dynamic.bootstrap_method_attr_index,
            ))
    }

    /// Resolves an `invokedynamic` instruction to its call site.
    ///
    /// Returns `Ok(None)` for any other instruction.
    pub fn resolve_invoke_dynamic(
        &self,
        instruction: &Instruction,
    ) -> Result<Option<CallSite<'_>>, ConstantPoolError> {
        let index = match *instruction {
            Instruction::InvokeDynamic { index } => index,
            _ => return Ok(None),
        };

        let dynamic = self.constant_pool.get_invoke_dynamic(index)?;
        let bootstrap = self.resolve_bootstrap(index)?;
        let handle = self
            .constant_pool
            .get_method_handle(bootstrap.bootstrap_method_ref)?;
        let (name, descriptor) = self
            .constant_pool
            .name_and_type(dynamic.name_and_type_index)?;

        Ok(Some(CallSite {
            bootstrap,
            handle,
            name,
            descriptor,
        }))
    }
}

/// An `invokedynamic` call site resolved through the constant pool and `BootstrapMethods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub bootstrap: &'a BootstrapMethod,
    pub handle: &'a MethodHandleInfo,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}
impl MethodInfo {
    /// The method's body. Abstract and native methods have none.
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.code()
    }
}
