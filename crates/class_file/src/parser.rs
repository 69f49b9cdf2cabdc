use log::{debug, trace};

use crate::{
    attributes::{
        Annotation, Attribute, AttributeInfo, Attributes, BootstrapMethod, CodeAttribute,
        ElementValue, ElementValuePair, ExceptionTableEntry, InnerClass, LineNumber,
        LocalVariable, Opaque,
    },
    bytecode::decode_instructions,
    class_file::{FieldInfo, MethodInfo, Version, MAGIC},
    constant_pool::{
        ClassInfo, CpInfo, DynamicInfo, MethodHandleInfo, MethodTypeInfo, ModuleInfo,
        NameAndTypeInfo, PackageInfo, RefInfo, ReferenceKind, StringInfo,
    },
    cursor::ByteReader,
    mutf8, AccessFlags, ClassFile, ClassFileError, ConstantPool, ConstantPoolError, ParseOptions,
    Result,
};

/// Decodes a class file from an in-memory buffer.
///
/// The whole buffer must be one class file: bytes left after the class attributes are an error.
pub struct Parser<'a> {
    r: ByteReader<'a>,
    options: ParseOptions,
}
impl<'a> Parser<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            r: ByteReader::new(bytes),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn parse(&mut self) -> Result<ClassFile> {
        let magic = self.parse_magic_identifier()?;
        let version = self.parse_version()?;
        debug!("class file version {}", version);

        let (constant_pool, entry_offsets) = self.parse_constant_pool()?;
        constant_pool
            .validate_references()
            .map_err(|(index, e)| e.at(entry_offset(&entry_offsets, index)))?;
        debug!("constant pool has {} slot(s)", constant_pool.len());

        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let this_class = self.parse_index(&constant_pool, ConstantPool::get_class)?;
        let super_class = self.parse_optional_index(&constant_pool, ConstantPool::get_class)?;

        let interfaces_count = self.r.read_u2()?;
        let interfaces = (0..interfaces_count)
            .map(|_| self.parse_index(&constant_pool, ConstantPool::get_class))
            .collect::<Result<Vec<_>>>()?;

        let fields_count = self.r.read_u2()?;
        let fields = (0..fields_count)
            .map(|_| self.parse_field_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let methods_count = self.r.read_u2()?;
        let methods = (0..methods_count)
            .map(|_| self.parse_method_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "{} interface(s), {} field(s), {} method(s)",
            interfaces.len(),
            fields.len(),
            methods.len()
        );

        let attributes = parse_attributes(&mut self.r, &constant_pool)?;
        check_bootstrap_indices(&constant_pool, &entry_offsets, &attributes)?;

        if self.r.remaining() > 0 {
            return Err(ClassFileError::TrailingBytes {
                offset: self.r.offset(),
                count: self.r.remaining(),
            });
        }

        Ok(ClassFile {
            magic,
            version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_field_info(&mut self, constant_pool: &ConstantPool) -> Result<FieldInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let name_index = self.parse_index(constant_pool, ConstantPool::get_utf8_info)?;
        let descriptor_index = self.parse_index(constant_pool, ConstantPool::get_utf8_info)?;
        let attributes = parse_attributes(&mut self.r, constant_pool)?;

        Ok(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_method_info(&mut self, constant_pool: &ConstantPool) -> Result<MethodInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let name_index = self.parse_index(constant_pool, ConstantPool::get_utf8_info)?;
        let descriptor_index = self.parse_index(constant_pool, ConstantPool::get_utf8_info)?;
        let attributes = parse_attributes(&mut self.r, constant_pool)?;

        Ok(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_magic_identifier(&mut self) -> Result<u32> {
        let offset = self.r.offset();
        match self.r.read_u4()? {
            MAGIC => Ok(MAGIC),
            magic => Err(ClassFileError::InvalidMagicIdentifier { offset, magic }),
        }
    }

    fn parse_version(&mut self) -> Result<Version> {
        let offset = self.r.offset();
        let minor = self.r.read_u2()?;
        let major = self.r.read_u2()?;
        if !self.options.accepts(major) {
            return Err(ClassFileError::UnsupportedVersion {
                offset,
                major,
                minor,
            });
        }
        Ok(Version { major, minor })
    }

    /// Reads the pool along with the offset of every slot's entry.
    fn parse_constant_pool(&mut self) -> Result<(ConstantPool, Vec<usize>)> {
        let constant_pool_count = self.r.read_u2()?;

        let count = (constant_pool_count as usize).saturating_sub(1);
        let mut cp_infos = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        while cp_infos.len() < count {
            let offset = self.r.offset();
            let cp_info = self.parse_cp_info()?;
            let width = cp_info.width();
            if cp_infos.len() + width > count {
                // A Long or Double in the last slot would need a slot past the end.
                return Err(ClassFileError::InvalidIndex {
                    offset,
                    index: constant_pool_count,
                });
            }

            cp_infos.push(cp_info);
            offsets.push(offset);
            if width == 2 {
                cp_infos.push(CpInfo::Unusable);
                offsets.push(offset);
            }
        }
        Ok((ConstantPool::new(cp_infos), offsets))
    }

    fn parse_cp_info(&mut self) -> Result<CpInfo> {
        let offset = self.r.offset();
        let tag = self.r.read_u1()?;
        let cp_info = match tag {
            CpInfo::UTF8 => self.parse_utf8()?,
            CpInfo::INTEGER => CpInfo::Integer(self.r.read_i4()?),
            CpInfo::FLOAT => CpInfo::Float(self.r.read_u4()?),
            CpInfo::LONG => CpInfo::Long(self.r.read_i64()?),
            CpInfo::DOUBLE => CpInfo::Double(self.r.read_u64()?),
            CpInfo::CLASS => CpInfo::Class(ClassInfo {
                name_index: self.r.read_u2()?,
            }),
            CpInfo::STRING => CpInfo::String(StringInfo {
                string_index: self.r.read_u2()?,
            }),
            CpInfo::FIELD_REF => CpInfo::FieldRef(self.parse_ref_info()?),
            CpInfo::METHOD_REF => CpInfo::MethodRef(self.parse_ref_info()?),
            CpInfo::INTERFACE_METHOD_REF => CpInfo::InterfaceMethodRef(self.parse_ref_info()?),
            CpInfo::NAME_AND_TYPE => CpInfo::NameAndType(NameAndTypeInfo {
                name_index: self.r.read_u2()?,
                descriptor_index: self.r.read_u2()?,
            }),
            CpInfo::METHOD_HANDLE => self.parse_method_handle()?,
            CpInfo::METHOD_TYPE => CpInfo::MethodType(MethodTypeInfo {
                descriptor_index: self.r.read_u2()?,
            }),
            CpInfo::DYNAMIC => CpInfo::Dynamic(self.parse_dynamic_info()?),
            CpInfo::INVOKE_DYNAMIC => CpInfo::InvokeDynamic(self.parse_dynamic_info()?),
            CpInfo::MODULE => CpInfo::Module(ModuleInfo {
                name_index: self.r.read_u2()?,
            }),
            CpInfo::PACKAGE => CpInfo::Package(PackageInfo {
                name_index: self.r.read_u2()?,
            }),
            _ => return Err(ClassFileError::InvalidCpInfoTag { offset, tag }),
        };

        Ok(cp_info)
    }

    fn parse_utf8(&mut self) -> Result<CpInfo> {
        let length = self.r.read_u2()?;
        let offset = self.r.offset();
        let bytes = self.r.read_bytes(length as usize)?;

        mutf8::decode(bytes)
            .map(CpInfo::Utf8)
            .ok_or(ClassFileError::MalformedUtf8 { offset })
    }

    fn parse_method_handle(&mut self) -> Result<CpInfo> {
        let offset = self.r.offset();
        let kind = self.r.read_u1()?;
        let reference_kind = ReferenceKind::from_u8(kind)
            .ok_or(ClassFileError::InvalidReferenceKind { offset, kind })?;
        let reference_index = self.r.read_u2()?;

        Ok(CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind,
            reference_index,
        }))
    }

    fn parse_dynamic_info(&mut self) -> Result<DynamicInfo> {
        let bootstrap_method_attr_index = self.r.read_u2()?;
        let name_and_type_index = self.r.read_u2()?;

        Ok(DynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
    }

    fn parse_ref_info(&mut self) -> Result<RefInfo> {
        let class_index = self.r.read_u2()?;
        let name_and_type_index = self.r.read_u2()?;

        Ok(RefInfo {
            class_index,
            name_and_type_index,
        })
    }

    fn parse_index<'cp, T>(
        &mut self,
        constant_pool: &'cp ConstantPool,
        check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
    ) -> Result<u16> {
        read_index(&mut self.r, constant_pool, check)
    }

    fn parse_optional_index<'cp, T>(
        &mut self,
        constant_pool: &'cp ConstantPool,
        check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
    ) -> Result<u16> {
        read_optional_index(&mut self.r, constant_pool, check)
    }
}

pub(crate) fn entry_offset(entry_offsets: &[usize], index: u16) -> usize {
    entry_offsets
        .get((index as usize).saturating_sub(1))
        .copied()
        .unwrap_or_default()
}

/// Every `Dynamic` and `InvokeDynamic` entry must name an existing `BootstrapMethods` slot.
pub(crate) fn check_bootstrap_indices(
    constant_pool: &ConstantPool,
    entry_offsets: &[usize],
    attributes: &Attributes,
) -> Result<()> {
    let bootstrap_methods = attributes.bootstrap_methods().map_or(0, <[_]>::len);
    for (index, cp_info) in constant_pool.iter() {
        if let CpInfo::Dynamic(d) | CpInfo::InvokeDynamic(d) = cp_info {
            if d.bootstrap_method_attr_index as usize >= bootstrap_methods {
                return Err(ClassFileError::InvalidIndex {
                    offset: entry_offset(entry_offsets, index),
                    index: d.bootstrap_method_attr_index,
                });
            }
        }
    }
    Ok(())
}

fn read_index<'cp, T>(
    r: &mut ByteReader,
    constant_pool: &'cp ConstantPool,
    check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
) -> Result<u16> {
    let offset = r.offset();
    let index = r.read_u2()?;
    check(constant_pool, index).map_err(|e| e.at(offset))?;
    Ok(index)
}

/// Like [`read_index`], but zero stands for "absent" and is not resolved.
fn read_optional_index<'cp, T>(
    r: &mut ByteReader,
    constant_pool: &'cp ConstantPool,
    check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
) -> Result<u16> {
    let offset = r.offset();
    let index = r.read_u2()?;
    if index != 0 {
        check(constant_pool, index).map_err(|e| e.at(offset))?;
    }
    Ok(index)
}

fn parse_attributes(r: &mut ByteReader, constant_pool: &ConstantPool) -> Result<Attributes> {
    let attributes_count = r.read_u2()?;
    (0..attributes_count)
        .map(|_| parse_attribute(r, constant_pool))
        .collect::<Result<Vec<_>>>()
        .map(Attributes)
}

fn parse_attribute(r: &mut ByteReader, constant_pool: &ConstantPool) -> Result<Attribute> {
    let offset = r.offset();
    let attribute_name_index = read_index(r, constant_pool, ConstantPool::get_utf8_info)?;
    let attribute_length = r.read_u4()?;
    // Names that are not valid Unicode cannot match a known attribute.
    let name = constant_pool
        .get_utf8_info(attribute_name_index)
        .map_err(|e| e.at(offset))?
        .to_string_lossy();
    trace!(
        "attribute {} ({} bytes) at offset {}",
        name,
        attribute_length,
        offset
    );

    let mut body = AttributeParser {
        r: r.sub(attribute_length as usize)?,
        constant_pool,
    };
    let start = body.r.offset();
    let end = body.r.end_offset();
    let mismatch = |consumed| ClassFileError::AttributeLengthMismatch {
        offset,
        name: name.to_string(),
        declared: attribute_length,
        consumed,
    };

    let info = match body.parse_attribute_info(&name) {
        Err(ClassFileError::TruncatedInput { offset: at, needed })
            if at.saturating_add(needed) > end =>
        {
            return Err(mismatch(at.saturating_add(needed) - start));
        }
        result => result?,
    };
    if body.r.remaining() > 0 {
        return Err(mismatch(body.r.position()));
    }

    Ok(Attribute {
        attribute_name_index,
        info,
    })
}

/// Decodes one attribute payload from a reader bounded by the declared length.
struct AttributeParser<'a, 'cp> {
    r: ByteReader<'a>,
    constant_pool: &'cp ConstantPool,
}
impl<'a, 'cp> AttributeParser<'a, 'cp> {
    fn parse_attribute_info(&mut self, name: &str) -> Result<AttributeInfo> {
        let info = match name {
            AttributeInfo::CODE => AttributeInfo::Code(self.parse_code_attribute()?),
            AttributeInfo::CONSTANT_VALUE => AttributeInfo::ConstantValue {
                constantvalue_index: self.parse_index(ConstantPool::get_constant_value)?,
            },
            AttributeInfo::LINE_NUMBER_TABLE => {
                AttributeInfo::LineNumberTable(self.parse_table(|p| {
                    Ok(LineNumber {
                        start_pc: p.r.read_u2()?,
                        line_number: p.r.read_u2()?,
                    })
                })?)
            }
            AttributeInfo::LOCAL_VARIABLE_TABLE => AttributeInfo::LocalVariableTable(
                self.parse_table(Self::parse_local_variable)?,
            ),
            AttributeInfo::LOCAL_VARIABLE_TYPE_TABLE => AttributeInfo::LocalVariableTypeTable(
                self.parse_table(Self::parse_local_variable)?,
            ),
            AttributeInfo::STACK_MAP_TABLE => AttributeInfo::StackMapTable {
                number_of_entries: self.r.read_u2()?,
                frames: Opaque(self.r.read_bytes(self.r.remaining())?.to_vec()),
            },
            AttributeInfo::EXCEPTIONS => AttributeInfo::Exceptions(
                self.parse_table(|p| p.parse_index(ConstantPool::get_class))?,
            ),
            AttributeInfo::INNER_CLASSES => {
                AttributeInfo::InnerClasses(self.parse_table(Self::parse_inner_class)?)
            }
            AttributeInfo::ENCLOSING_METHOD => AttributeInfo::EnclosingMethod {
                class_index: self.parse_index(ConstantPool::get_class)?,
                method_index: self.parse_optional_index(ConstantPool::get_name_and_type)?,
            },
            AttributeInfo::BOOTSTRAP_METHODS => {
                AttributeInfo::BootstrapMethods(self.parse_table(Self::parse_bootstrap_method)?)
            }
            AttributeInfo::SIGNATURE => AttributeInfo::Signature {
                signature_index: self.parse_index(ConstantPool::get_utf8_info)?,
            },
            AttributeInfo::SOURCE_FILE => AttributeInfo::SourceFile {
                sourcefile_index: self.parse_index(ConstantPool::get_utf8_info)?,
            },
            AttributeInfo::NEST_HOST => AttributeInfo::NestHost {
                host_class_index: self.parse_index(ConstantPool::get_class)?,
            },
            AttributeInfo::NEST_MEMBERS => AttributeInfo::NestMembers(
                self.parse_table(|p| p.parse_index(ConstantPool::get_class))?,
            ),
            AttributeInfo::PERMITTED_SUBCLASSES => AttributeInfo::PermittedSubclasses(
                self.parse_table(|p| p.parse_index(ConstantPool::get_class))?,
            ),
            AttributeInfo::SYNTHETIC => AttributeInfo::Synthetic,
            AttributeInfo::DEPRECATED => AttributeInfo::Deprecated,
            AttributeInfo::RUNTIME_VISIBLE_ANNOTATIONS => AttributeInfo::RuntimeVisibleAnnotations(
                self.parse_table(Self::parse_annotation)?,
            ),
            AttributeInfo::RUNTIME_INVISIBLE_ANNOTATIONS => {
                AttributeInfo::RuntimeInvisibleAnnotations(
                    self.parse_table(Self::parse_annotation)?,
                )
            }
            _ => {
                debug!(
                    "keeping unknown attribute {} as {} opaque byte(s)",
                    name,
                    self.r.remaining()
                );
                AttributeInfo::Unknown(Opaque(self.r.read_bytes(self.r.remaining())?.to_vec()))
            }
        };

        Ok(info)
    }

    fn parse_code_attribute(&mut self) -> Result<CodeAttribute> {
        let max_stack = self.r.read_u2()?;
        let max_locals = self.r.read_u2()?;
        let code_length = self.r.read_u4()?;
        let code_offset = self.r.offset();
        let code = self.r.read_bytes(code_length as usize)?;

        let instructions = decode_instructions(code, code_offset)?;
        for (pc, instruction) in &instructions {
            instruction
                .check_constant_pool(self.constant_pool)
                .map_err(|e| e.at(code_offset + *pc as usize))?;
        }
        trace!(
            "Code: max_stack {}, max_locals {}, {} instruction(s)",
            max_stack,
            max_locals,
            instructions.len()
        );

        let exception_table = self.parse_table(Self::parse_exception_table_entry)?;
        let attributes = parse_attributes(&mut self.r, self.constant_pool)?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
        })
    }

    fn parse_exception_table_entry(&mut self) -> Result<ExceptionTableEntry> {
        let start_pc = self.r.read_u2()?;
        let end_pc = self.r.read_u2()?;
        let handler_pc = self.r.read_u2()?;
        let catch_type = self.parse_optional_index(ConstantPool::get_class)?;

        Ok(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }

    fn parse_local_variable(&mut self) -> Result<LocalVariable> {
        let start_pc = self.r.read_u2()?;
        let length = self.r.read_u2()?;
        let name_index = self.parse_index(ConstantPool::get_utf8_info)?;
        let descriptor_index = self.parse_index(ConstantPool::get_utf8_info)?;
        let index = self.r.read_u2()?;

        Ok(LocalVariable {
            start_pc,
            length,
            name_index,
            descriptor_index,
            index,
        })
    }

    fn parse_inner_class(&mut self) -> Result<InnerClass> {
        let inner_class_info_index = self.parse_index(ConstantPool::get_class)?;
        let outer_class_info_index = self.parse_optional_index(ConstantPool::get_class)?;
        let inner_name_index = self.parse_optional_index(ConstantPool::get_utf8_info)?;
        let inner_class_access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);

        Ok(InnerClass {
            inner_class_info_index,
            outer_class_info_index,
            inner_name_index,
            inner_class_access_flags,
        })
    }

    fn parse_bootstrap_method(&mut self) -> Result<BootstrapMethod> {
        let bootstrap_method_ref = self.parse_index(ConstantPool::get_method_handle)?;
        let bootstrap_arguments =
            self.parse_table(|p| p.parse_index(ConstantPool::get_loadable))?;

        Ok(BootstrapMethod {
            bootstrap_method_ref,
            bootstrap_arguments,
        })
    }

    fn parse_annotation(&mut self) -> Result<Annotation> {
        let type_index = self.parse_index(ConstantPool::get_utf8_info)?;
        let element_value_pairs = self.parse_table(|p| {
            Ok(ElementValuePair {
                element_name_index: p.parse_index(ConstantPool::get_utf8_info)?,
                value: p.parse_element_value()?,
            })
        })?;

        Ok(Annotation {
            type_index,
            element_value_pairs,
        })
    }

    fn parse_element_value(&mut self) -> Result<ElementValue> {
        let offset = self.r.offset();
        let tag = self.r.read_u1()?;
        let value = match tag {
            tag if ElementValue::is_const_tag(tag) => ElementValue::Const {
                tag,
                const_value_index: self
                    .parse_index(|cp, i| ElementValue::check_const_value(tag, cp, i))?,
            },
            ElementValue::ENUM => ElementValue::Enum {
                type_name_index: self.parse_index(ConstantPool::get_utf8_info)?,
                const_name_index: self.parse_index(ConstantPool::get_utf8_info)?,
            },
            ElementValue::CLASS => ElementValue::Class {
                class_info_index: self.parse_index(ConstantPool::get_utf8_info)?,
            },
            ElementValue::ANNOTATION => ElementValue::Annotation(self.parse_annotation()?),
            ElementValue::ARRAY => {
                ElementValue::Array(self.parse_table(Self::parse_element_value)?)
            }
            _ => {
                return Err(ClassFileError::InvalidElementValueTag {
                    offset,
                    tag: tag as char,
                })
            }
        };

        Ok(value)
    }

    /// Reads a `u2` count followed by that many entries.
    fn parse_table<T>(
        &mut self,
        mut parse: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.r.read_u2()?;
        (0..count).map(|_| parse(self)).collect()
    }

    fn parse_index<T>(
        &mut self,
        check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
    ) -> Result<u16> {
        read_index(&mut self.r, self.constant_pool, check)
    }

    fn parse_optional_index<T>(
        &mut self,
        check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
    ) -> Result<u16> {
        read_optional_index(&mut self.r, self.constant_pool, check)
    }
}
