use std::borrow::Cow;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ConstantPoolError;

type Result<T, E = ConstantPoolError> = std::result::Result<T, E>;

/// Resolves `$index` in `$cp` and destructures the expected tuple variant `$i`.
#[macro_export]
macro_rules! matches_cp_info {
    ($cp:expr, $index:expr, $i:ident) => {{
        let index: u16 = $index;
        match $cp.get(index) {
            Ok($crate::constant_pool::CpInfo::$i(n)) => Ok(n),
            Ok(c) => Err($crate::ConstantPoolError::WrongVariant {
                index,
                expected: stringify!($i),
                found: c.kind(),
            }),
            Err(e) => Err(e),
        }
    }};
}

/// The constant pool of a class file.
///
/// Logical indices start at 1. The slot following a `Long` or `Double` is stored as
/// [`CpInfo::Unusable`] so that logical indices map directly onto storage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    cp_infos: Vec<CpInfo>,
}
impl ConstantPool {
    pub fn new(cp_infos: Vec<CpInfo>) -> Self {
        Self { cp_infos }
    }

    /// Number of logical slots, including unusable ones. The class file stores this plus one.
    pub fn len(&self) -> usize {
        self.cp_infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cp_infos.is_empty()
    }

    pub fn get(&self, index: u16) -> Result<&CpInfo> {
        match index
            .checked_sub(1)
            .and_then(|i| self.cp_infos.get(i as usize))
        {
            None | Some(CpInfo::Unusable) => Err(ConstantPoolError::InvalidIndex(index)),
            Some(cp_info) => Ok(cp_info),
        }
    }

    /// Resolves `index` and checks the entry with `accepts`.
    pub fn expect(
        &self,
        index: u16,
        expected: &'static str,
        accepts: impl FnOnce(&CpInfo) -> bool,
    ) -> Result<&CpInfo> {
        let cp_info = self.get(index)?;
        if accepts(cp_info) {
            Ok(cp_info)
        } else {
            Err(ConstantPoolError::WrongVariant {
                index,
                expected,
                found: cp_info.kind(),
            })
        }
    }

    /// Entries with their logical index, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &CpInfo)> {
        self.cp_infos
            .iter()
            .enumerate()
            .filter(|(_, cp_info)| **cp_info != CpInfo::Unusable)
            .map(|(i, cp_info)| ((i + 1) as u16, cp_info))
    }

    /// Text of the `Utf8` entry at `index`. Entries holding an unpaired surrogate have no `str`
    /// form and fail with [`ConstantPoolError::UnpairedSurrogate`].
    pub fn get_utf8(&self, index: u16) -> Result<&str> {
        matches_cp_info!(self, index, Utf8)?
            .as_str()
            .ok_or(ConstantPoolError::UnpairedSurrogate(index))
    }

    /// The `Utf8` entry at `index`, whatever code units it holds.
    pub fn get_utf8_info(&self, index: u16) -> Result<&Utf8Info> {
        matches_cp_info!(self, index, Utf8)
    }

    pub fn get_class(&self, index: u16) -> Result<&ClassInfo> {
        matches_cp_info!(self, index, Class)
    }

    pub fn get_name_and_type(&self, index: u16) -> Result<&NameAndTypeInfo> {
        matches_cp_info!(self, index, NameAndType)
    }

    pub fn get_field_ref(&self, index: u16) -> Result<&RefInfo> {
        matches_cp_info!(self, index, FieldRef)
    }

    pub fn get_method_ref(&self, index: u16) -> Result<&RefInfo> {
        matches_cp_info!(self, index, MethodRef)
    }

    pub fn get_interface_method_ref(&self, index: u16) -> Result<&RefInfo> {
        matches_cp_info!(self, index, InterfaceMethodRef)
    }

    /// A `MethodRef` or an `InterfaceMethodRef`.
    pub fn get_any_method_ref(&self, index: u16) -> Result<&RefInfo> {
        match self.get(index)? {
            CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => Ok(r),
            c => Err(ConstantPoolError::WrongVariant {
                index,
                expected: "MethodRef or InterfaceMethodRef",
                found: c.kind(),
            }),
        }
    }

    pub fn get_method_handle(&self, index: u16) -> Result<&MethodHandleInfo> {
        matches_cp_info!(self, index, MethodHandle)
    }

    pub fn get_method_type(&self, index: u16) -> Result<&MethodTypeInfo> {
        matches_cp_info!(self, index, MethodType)
    }

    pub fn get_invoke_dynamic(&self, index: u16) -> Result<&DynamicInfo> {
        matches_cp_info!(self, index, InvokeDynamic)
    }

    pub fn get_dynamic(&self, index: u16) -> Result<&DynamicInfo> {
        matches_cp_info!(self, index, Dynamic)
    }

    /// An entry a `ConstantValue` attribute may point at.
    pub fn get_constant_value(&self, index: u16) -> Result<&CpInfo> {
        self.expect(index, "constant value", CpInfo::is_constant_value)
    }

    /// An entry `ldc`, `ldc_w` or a bootstrap argument may load.
    pub fn get_loadable(&self, index: u16) -> Result<&CpInfo> {
        self.expect(index, "loadable constant", CpInfo::is_loadable)
    }

    /// Name of the `Class` entry at `index`, in internal form (`java/lang/Object`).
    pub fn class_name(&self, index: u16) -> Result<&str> {
        self.get_utf8(self.get_class(index)?.name_index)
    }

    /// `(name, descriptor)` of the `NameAndType` entry at `index`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        let nat = self.get_name_and_type(index)?;
        Ok((
            self.get_utf8(nat.name_index)?,
            self.get_utf8(nat.descriptor_index)?,
        ))
    }

    /// Resolves a `FieldRef`, `MethodRef` or `InterfaceMethodRef` down to its strings.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let ref_info = match self.get(index)? {
            CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => r,
            c => {
                return Err(ConstantPoolError::WrongVariant {
                    index,
                    expected: "FieldRef, MethodRef or InterfaceMethodRef",
                    found: c.kind(),
                })
            }
        };
        let (name, descriptor) = self.name_and_type(ref_info.name_and_type_index)?;

        Ok(MemberRef {
            class: self.class_name(ref_info.class_index)?,
            name,
            descriptor,
        })
    }

    /// Checks every reference held by a pool entry against the variant its site expects.
    ///
    /// Bootstrap method indices of `Dynamic` and `InvokeDynamic` point into the class's
    /// `BootstrapMethods` attribute and are not checked here. On failure, the logical index of
    /// the offending entry is returned alongside the error.
    pub(crate) fn validate_references(&self) -> Result<(), (u16, ConstantPoolError)> {
        for (index, cp_info) in self.iter() {
            self.validate_entry(cp_info).map_err(|e| (index, e))?;
        }
        Ok(())
    }

    fn validate_entry(&self, cp_info: &CpInfo) -> Result<()> {
        match cp_info {
            CpInfo::Class(ClassInfo { name_index })
            | CpInfo::Module(ModuleInfo { name_index })
            | CpInfo::Package(PackageInfo { name_index }) => {
                self.get_utf8_info(*name_index)?;
            }
            CpInfo::String(StringInfo { string_index }) => {
                self.get_utf8_info(*string_index)?;
            }
            CpInfo::MethodType(MethodTypeInfo { descriptor_index }) => {
                self.get_utf8_info(*descriptor_index)?;
            }
            CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => {
                self.get_class(r.class_index)?;
                self.get_name_and_type(r.name_and_type_index)?;
            }
            CpInfo::NameAndType(nat) => {
                self.get_utf8_info(nat.name_index)?;
                self.get_utf8_info(nat.descriptor_index)?;
            }
            CpInfo::MethodHandle(handle) => {
                handle
                    .reference_kind
                    .target(self, handle.reference_index)?;
            }
            CpInfo::Dynamic(d) | CpInfo::InvokeDynamic(d) => {
                self.get_name_and_type(d.name_and_type_index)?;
            }
            CpInfo::Utf8(_)
            | CpInfo::Integer(_)
            | CpInfo::Float(_)
            | CpInfo::Long(_)
            | CpInfo::Double(_)
            | CpInfo::Unusable => {}
        }
        Ok(())
    }
}
impl<'a> IntoIterator for &'a ConstantPool {
    type Item = &'a CpInfo;
    type IntoIter = std::slice::Iter<'a, CpInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.cp_infos.iter()
    }
}

/// Strings a member reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Text of a `Utf8` entry.
///
/// Modified UTF-8 may carry unpaired surrogates, which have no `str` form. Such entries keep their
/// UTF-16 code units so that they encode back to the bytes they were decoded from.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Utf8Info {
    Str(String),
    /// Code units holding at least one unpaired surrogate.
    Units(Vec<u16>),
}
impl Utf8Info {
    /// Picks [`Utf8Info::Str`] whenever the units are well-formed UTF-16.
    pub fn from_units(units: Vec<u16>) -> Self {
        match String::from_utf16(&units) {
            Ok(s) => Utf8Info::Str(s),
            Err(_) => Utf8Info::Units(units),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Utf8Info::Str(s) => Some(s),
            Utf8Info::Units(_) => None,
        }
    }

    /// The text with unpaired surrogates replaced by U+FFFD.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        match self {
            Utf8Info::Str(s) => Cow::Borrowed(s),
            Utf8Info::Units(units) => Cow::Owned(String::from_utf16_lossy(units)),
        }
    }
}
impl From<&str> for Utf8Info {
    fn from(s: &str) -> Self {
        Utf8Info::Str(s.to_owned())
    }
}
impl From<String> for Utf8Info {
    fn from(s: String) -> Self {
        Utf8Info::Str(s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CpInfo {
    Utf8(Utf8Info),
    Integer(i32),
    /// Raw IEEE 754 bits, so that every NaN payload survives a round trip.
    Float(u32),
    Long(i64),
    /// Raw IEEE 754 bits.
    Double(u64),
    Class(ClassInfo),
    String(StringInfo),
    FieldRef(RefInfo),
    MethodRef(RefInfo),
    InterfaceMethodRef(RefInfo),
    NameAndType(NameAndTypeInfo),
    MethodHandle(MethodHandleInfo),
    MethodType(MethodTypeInfo),
    Dynamic(DynamicInfo),
    InvokeDynamic(DynamicInfo),
    Module(ModuleInfo),
    Package(PackageInfo),
    /// Second slot of a `Long` or `Double`.
    Unusable,
}
impl CpInfo {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;

    /// Tag byte written in front of the entry, `None` for [`CpInfo::Unusable`].
    pub fn tag(&self) -> Option<u8> {
        Some(match self {
            CpInfo::Utf8(_) => Self::UTF8,
            CpInfo::Integer(_) => Self::INTEGER,
            CpInfo::Float(_) => Self::FLOAT,
            CpInfo::Long(_) => Self::LONG,
            CpInfo::Double(_) => Self::DOUBLE,
            CpInfo::Class(_) => Self::CLASS,
            CpInfo::String(_) => Self::STRING,
            CpInfo::FieldRef(_) => Self::FIELD_REF,
            CpInfo::MethodRef(_) => Self::METHOD_REF,
            CpInfo::InterfaceMethodRef(_) => Self::INTERFACE_METHOD_REF,
            CpInfo::NameAndType(_) => Self::NAME_AND_TYPE,
            CpInfo::MethodHandle(_) => Self::METHOD_HANDLE,
            CpInfo::MethodType(_) => Self::METHOD_TYPE,
            CpInfo::Dynamic(_) => Self::DYNAMIC,
            CpInfo::InvokeDynamic(_) => Self::INVOKE_DYNAMIC,
            CpInfo::Module(_) => Self::MODULE,
            CpInfo::Package(_) => Self::PACKAGE,
            CpInfo::Unusable => return None,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CpInfo::Utf8(_) => "Utf8",
            CpInfo::Integer(_) => "Integer",
            CpInfo::Float(_) => "Float",
            CpInfo::Long(_) => "Long",
            CpInfo::Double(_) => "Double",
            CpInfo::Class(_) => "Class",
            CpInfo::String(_) => "String",
            CpInfo::FieldRef(_) => "FieldRef",
            CpInfo::MethodRef(_) => "MethodRef",
            CpInfo::InterfaceMethodRef(_) => "InterfaceMethodRef",
            CpInfo::NameAndType(_) => "NameAndType",
            CpInfo::MethodHandle(_) => "MethodHandle",
            CpInfo::MethodType(_) => "MethodType",
            CpInfo::Dynamic(_) => "Dynamic",
            CpInfo::InvokeDynamic(_) => "InvokeDynamic",
            CpInfo::Module(_) => "Module",
            CpInfo::Package(_) => "Package",
            CpInfo::Unusable => "Unusable",
        }
    }

    /// Number of logical slots taken by the entry.
    pub fn width(&self) -> usize {
        match self {
            CpInfo::Long(_) | CpInfo::Double(_) => 2,
            _ => 1,
        }
    }

    /// Whether `ldc`/`ldc_w` may load this entry.
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            CpInfo::Integer(_)
                | CpInfo::Float(_)
                | CpInfo::String(_)
                | CpInfo::Class(_)
                | CpInfo::MethodHandle(_)
                | CpInfo::MethodType(_)
                | CpInfo::Dynamic(_)
        )
    }

    /// Whether `ldc2_w` may load this entry.
    pub fn is_wide_loadable(&self) -> bool {
        matches!(
            self,
            CpInfo::Long(_) | CpInfo::Double(_) | CpInfo::Dynamic(_)
        )
    }

    /// Whether the entry may be the value of a `ConstantValue` attribute.
    pub fn is_constant_value(&self) -> bool {
        matches!(
            self,
            CpInfo::Integer(_)
                | CpInfo::Float(_)
                | CpInfo::Long(_)
                | CpInfo::Double(_)
                | CpInfo::String(_)
        )
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            CpInfo::Float(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            CpInfo::Double(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RefInfo {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClassInfo {
    // The value of the name_index item must be a valid index into the constant_pool table.
    // The constant_pool entry at that index must be a CONSTANT_Utf8_info structure
    // representing a valid binary class or interface name encoded in internal form.
    pub name_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StringInfo {
    pub string_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameAndTypeInfo {
    pub name_index: u16,
    pub descriptor_index: u16,
}

/// Shared by `Dynamic` and `InvokeDynamic`.
///
/// `bootstrap_method_attr_index` is an index into the `BootstrapMethods` attribute of the
/// class, not into the constant pool. It stays a plain number until resolved through
/// [`ClassFile::resolve_bootstrap`](crate::ClassFile::resolve_bootstrap).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DynamicInfo {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodHandleInfo {
    pub reference_kind: ReferenceKind,
    pub reference_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodTypeInfo {
    pub descriptor_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ModuleInfo {
    pub name_index: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PackageInfo {
    pub name_index: u16,
}

/// Behaviour of a method handle (JVMS §5.4.3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ReferenceKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}
impl ReferenceKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        Self::try_from(kind).ok()
    }

    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            ReferenceKind::GetField
                | ReferenceKind::GetStatic
                | ReferenceKind::PutField
                | ReferenceKind::PutStatic
        )
    }

    /// Resolves the member reference a handle of this kind points at.
    pub fn target(self, constant_pool: &ConstantPool, index: u16) -> Result<&RefInfo> {
        match self {
            kind if kind.is_field_access() => constant_pool.get_field_ref(index),
            ReferenceKind::InvokeVirtual | ReferenceKind::NewInvokeSpecial => {
                constant_pool.get_method_ref(index)
            }
            ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial => {
                constant_pool.get_any_method_ref(index)
            }
            _ => constant_pool.get_interface_method_ref(index),
        }
    }
}
