use log::debug;

use crate::{
    attributes::{
        Annotation, Attribute, AttributeInfo, Attributes, CodeAttribute, ElementValue,
        LocalVariable,
    },
    bytecode::encode_instructions,
    class_file::{FieldInfo, MethodInfo},
    constant_pool::{CpInfo, Utf8Info},
    cursor::ByteWriter,
    mutf8,
    parser::{check_bootstrap_indices, entry_offset},
    AccessFlags, ClassFile, ClassFileError, ConstantPool, ConstantPoolError, Result,
};

/// Encodes a [`ClassFile`] back into its binary form.
///
/// The model is written as is: nothing is re-derived from the constant pool, so an unmodified
/// decoded class encodes to the bytes it was decoded from. Every constant pool reference is
/// checked against its site the way the [`Parser`](crate::Parser) checks it, with errors
/// positioned in the output.
pub struct Writer<'a> {
    class_file: &'a ClassFile,
    w: ByteWriter,
}
impl<'a> Writer<'a> {
    pub fn new(class_file: &'a ClassFile) -> Self {
        Self {
            class_file,
            w: ByteWriter::new(),
        }
    }

    pub fn write(mut self) -> Result<Vec<u8>> {
        let class_file = self.class_file;
        let cp = &class_file.constant_pool;
        let w = &mut self.w;

        w.write_u4(class_file.magic);
        w.write_u2(class_file.version.minor);
        w.write_u2(class_file.version.major);
        let entry_offsets = write_constant_pool(w, cp)?;
        cp.validate_references()
            .map_err(|(index, e)| e.at(entry_offset(&entry_offsets, index)))?;

        w.write_u2(class_file.access_flags.bits());
        write_index(w, cp, class_file.this_class, ConstantPool::get_class)?;
        write_optional_index(w, cp, class_file.super_class, ConstantPool::get_class)?;

        write_count(w, class_file.interfaces.len(), "interfaces")?;
        for interface in &class_file.interfaces {
            write_index(w, cp, *interface, ConstantPool::get_class)?;
        }

        write_count(w, class_file.fields.len(), "fields")?;
        for FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        } in &class_file.fields
        {
            write_member(
                w,
                cp,
                *access_flags,
                *name_index,
                *descriptor_index,
                attributes,
            )?;
        }

        write_count(w, class_file.methods.len(), "methods")?;
        for MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        } in &class_file.methods
        {
            write_member(
                w,
                cp,
                *access_flags,
                *name_index,
                *descriptor_index,
                attributes,
            )?;
        }

        write_attributes(w, cp, &class_file.attributes)?;
        check_bootstrap_indices(cp, &entry_offsets, &class_file.attributes)?;
        debug!("encoded class file into {} byte(s)", w.position());

        Ok(self.w.into_inner())
    }
}

fn write_count(w: &mut ByteWriter, count: usize, what: &'static str) -> Result<()> {
    let count = u16::try_from(count).map_err(|_| ClassFileError::CountOverflow {
        offset: w.position(),
        what,
        count,
    })?;
    w.write_u2(count);
    Ok(())
}

fn write_length(w: &mut ByteWriter, length: usize, what: &'static str) -> Result<()> {
    let length = u32::try_from(length).map_err(|_| ClassFileError::CountOverflow {
        offset: w.position(),
        what,
        count: length,
    })?;
    w.write_u4(length);
    Ok(())
}

fn write_index<'cp, T>(
    w: &mut ByteWriter,
    constant_pool: &'cp ConstantPool,
    index: u16,
    check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
) -> Result<()> {
    check(constant_pool, index).map_err(|e| e.at(w.position()))?;
    w.write_u2(index);
    Ok(())
}

/// Like [`write_index`], but zero stands for "absent" and is not resolved.
fn write_optional_index<'cp, T>(
    w: &mut ByteWriter,
    constant_pool: &'cp ConstantPool,
    index: u16,
    check: impl FnOnce(&'cp ConstantPool, u16) -> std::result::Result<T, ConstantPoolError>,
) -> Result<()> {
    if index == 0 {
        w.write_u2(index);
        return Ok(());
    }
    write_index(w, constant_pool, index, check)
}

/// Writes the pool and returns the offset of every slot's entry.
fn write_constant_pool(w: &mut ByteWriter, cp: &ConstantPool) -> Result<Vec<usize>> {
    write_count(w, cp.len() + 1, "constant pool slots")?;
    let mut offsets = Vec::with_capacity(cp.len());
    for cp_info in cp {
        let tag = match cp_info.tag() {
            Some(tag) => tag,
            None => {
                // The slot after a Long or Double shares its entry's offset.
                let offset = offsets.last().copied().unwrap_or_default();
                offsets.push(offset);
                continue;
            }
        };
        offsets.push(w.position());
        w.write_u1(tag);

        match cp_info {
            CpInfo::Utf8(text) => {
                let bytes = match text {
                    Utf8Info::Str(s) => mutf8::encode(s),
                    Utf8Info::Units(units) => mutf8::encode_units(units.iter().copied()),
                };
                write_count(w, bytes.len(), "modified UTF-8 bytes")?;
                w.write_bytes(&bytes);
            }
            CpInfo::Integer(value) => w.write_i4(*value),
            CpInfo::Float(bits) => w.write_u4(*bits),
            CpInfo::Long(value) => w.write_i64(*value),
            CpInfo::Double(bits) => w.write_u64(*bits),
            CpInfo::Class(c) => w.write_u2(c.name_index),
            CpInfo::String(s) => w.write_u2(s.string_index),
            CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => {
                w.write_u2(r.class_index);
                w.write_u2(r.name_and_type_index);
            }
            CpInfo::NameAndType(nat) => {
                w.write_u2(nat.name_index);
                w.write_u2(nat.descriptor_index);
            }
            CpInfo::MethodHandle(handle) => {
                w.write_u1(handle.reference_kind.into());
                w.write_u2(handle.reference_index);
            }
            CpInfo::MethodType(t) => w.write_u2(t.descriptor_index),
            CpInfo::Dynamic(d) | CpInfo::InvokeDynamic(d) => {
                w.write_u2(d.bootstrap_method_attr_index);
                w.write_u2(d.name_and_type_index);
            }
            CpInfo::Module(m) => w.write_u2(m.name_index),
            CpInfo::Package(p) => w.write_u2(p.name_index),
            CpInfo::Unusable => {}
        }
    }
    Ok(offsets)
}

fn write_member(
    w: &mut ByteWriter,
    cp: &ConstantPool,
    access_flags: AccessFlags,
    name_index: u16,
    descriptor_index: u16,
    attributes: &Attributes,
) -> Result<()> {
    w.write_u2(access_flags.bits());
    write_index(w, cp, name_index, ConstantPool::get_utf8_info)?;
    write_index(w, cp, descriptor_index, ConstantPool::get_utf8_info)?;
    write_attributes(w, cp, attributes)
}

fn write_attributes(w: &mut ByteWriter, cp: &ConstantPool, attributes: &Attributes) -> Result<()> {
    write_count(w, attributes.len(), "attributes")?;
    for attribute in attributes {
        write_attribute(w, cp, attribute)?;
    }
    Ok(())
}

/// Writes the payload into a scratch buffer first so its length can be prefixed.
fn write_attribute(w: &mut ByteWriter, cp: &ConstantPool, attribute: &Attribute) -> Result<()> {
    let offset = w.position();
    cp.get_utf8_info(attribute.attribute_name_index)
        .map_err(|e| e.at(offset))?;

    let mut body = ByteWriter::new();
    write_attribute_info(&mut body, cp, &attribute.info).map_err(|e| e.rebase(offset + 6))?;

    w.write_u2(attribute.attribute_name_index);
    write_length(w, body.position(), "attribute bytes")?;
    w.write_bytes(body.as_slice());
    Ok(())
}

fn write_attribute_info(w: &mut ByteWriter, cp: &ConstantPool, info: &AttributeInfo) -> Result<()> {
    match info {
        AttributeInfo::Code(code) => write_code_attribute(w, cp, code)?,
        AttributeInfo::ConstantValue {
            constantvalue_index,
        } => write_index(w, cp, *constantvalue_index, ConstantPool::get_constant_value)?,
        AttributeInfo::LineNumberTable(lines) => {
            write_count(w, lines.len(), "line numbers")?;
            for line in lines {
                w.write_u2(line.start_pc);
                w.write_u2(line.line_number);
            }
        }
        AttributeInfo::LocalVariableTable(variables)
        | AttributeInfo::LocalVariableTypeTable(variables) => {
            write_count(w, variables.len(), "local variables")?;
            for LocalVariable {
                start_pc,
                length,
                name_index,
                descriptor_index,
                index,
            } in variables
            {
                w.write_u2(*start_pc);
                w.write_u2(*length);
                write_index(w, cp, *name_index, ConstantPool::get_utf8_info)?;
                write_index(w, cp, *descriptor_index, ConstantPool::get_utf8_info)?;
                w.write_u2(*index);
            }
        }
        AttributeInfo::StackMapTable {
            number_of_entries,
            frames,
        } => {
            w.write_u2(*number_of_entries);
            w.write_bytes(&frames.0);
        }
        AttributeInfo::Exceptions(indices)
        | AttributeInfo::NestMembers(indices)
        | AttributeInfo::PermittedSubclasses(indices) => {
            write_count(w, indices.len(), "class indices")?;
            for index in indices {
                write_index(w, cp, *index, ConstantPool::get_class)?;
            }
        }
        AttributeInfo::InnerClasses(classes) => {
            write_count(w, classes.len(), "inner classes")?;
            for class in classes {
                write_index(w, cp, class.inner_class_info_index, ConstantPool::get_class)?;
                write_optional_index(w, cp, class.outer_class_info_index, ConstantPool::get_class)?;
                write_optional_index(w, cp, class.inner_name_index, ConstantPool::get_utf8_info)?;
                w.write_u2(class.inner_class_access_flags.bits());
            }
        }
        AttributeInfo::EnclosingMethod {
            class_index,
            method_index,
        } => {
            write_index(w, cp, *class_index, ConstantPool::get_class)?;
            write_optional_index(w, cp, *method_index, ConstantPool::get_name_and_type)?;
        }
        AttributeInfo::BootstrapMethods(methods) => {
            write_count(w, methods.len(), "bootstrap methods")?;
            for method in methods {
                write_index(
                    w,
                    cp,
                    method.bootstrap_method_ref,
                    ConstantPool::get_method_handle,
                )?;
                write_count(w, method.bootstrap_arguments.len(), "bootstrap arguments")?;
                for argument in &method.bootstrap_arguments {
                    write_index(w, cp, *argument, ConstantPool::get_loadable)?;
                }
            }
        }
        AttributeInfo::Signature { signature_index } => {
            write_index(w, cp, *signature_index, ConstantPool::get_utf8_info)?
        }
        AttributeInfo::SourceFile { sourcefile_index } => {
            write_index(w, cp, *sourcefile_index, ConstantPool::get_utf8_info)?
        }
        AttributeInfo::NestHost { host_class_index } => {
            write_index(w, cp, *host_class_index, ConstantPool::get_class)?
        }
        AttributeInfo::Synthetic | AttributeInfo::Deprecated => {}
        AttributeInfo::RuntimeVisibleAnnotations(annotations)
        | AttributeInfo::RuntimeInvisibleAnnotations(annotations) => {
            write_count(w, annotations.len(), "annotations")?;
            for annotation in annotations {
                write_annotation(w, cp, annotation)?;
            }
        }
        AttributeInfo::Unknown(bytes) => w.write_bytes(&bytes.0),
    }
    Ok(())
}

fn write_code_attribute(w: &mut ByteWriter, cp: &ConstantPool, code: &CodeAttribute) -> Result<()> {
    w.write_u2(code.max_stack);
    w.write_u2(code.max_locals);

    let code_offset = w.position() + 4;
    let bytes = encode_instructions(&code.instructions).map_err(|e| e.rebase(code_offset))?;
    let mut pc = 0;
    for (_, instruction) in &code.instructions {
        instruction
            .check_constant_pool(cp)
            .map_err(|e| e.at(code_offset + pc))?;
        pc += instruction.len_at(pc as u32);
    }
    write_length(w, bytes.len(), "code bytes")?;
    w.write_bytes(&bytes);

    write_count(w, code.exception_table.len(), "exception handlers")?;
    for entry in &code.exception_table {
        w.write_u2(entry.start_pc);
        w.write_u2(entry.end_pc);
        w.write_u2(entry.handler_pc);
        write_optional_index(w, cp, entry.catch_type, ConstantPool::get_class)?;
    }

    write_attributes(w, cp, &code.attributes)
}

fn write_annotation(w: &mut ByteWriter, cp: &ConstantPool, annotation: &Annotation) -> Result<()> {
    write_index(w, cp, annotation.type_index, ConstantPool::get_utf8_info)?;
    write_count(w, annotation.element_value_pairs.len(), "element value pairs")?;
    for pair in &annotation.element_value_pairs {
        write_index(w, cp, pair.element_name_index, ConstantPool::get_utf8_info)?;
        write_element_value(w, cp, &pair.value)?;
    }
    Ok(())
}

fn write_element_value(w: &mut ByteWriter, cp: &ConstantPool, value: &ElementValue) -> Result<()> {
    let offset = w.position();
    w.write_u1(value.tag());
    match value {
        ElementValue::Const {
            tag,
            const_value_index,
        } => {
            if !ElementValue::is_const_tag(*tag) {
                return Err(ClassFileError::InvalidElementValueTag {
                    offset,
                    tag: *tag as char,
                });
            }
            write_index(w, cp, *const_value_index, |cp, i| {
                ElementValue::check_const_value(*tag, cp, i)
            })?;
        }
        ElementValue::Enum {
            type_name_index,
            const_name_index,
        } => {
            write_index(w, cp, *type_name_index, ConstantPool::get_utf8_info)?;
            write_index(w, cp, *const_name_index, ConstantPool::get_utf8_info)?;
        }
        ElementValue::Class { class_info_index } => {
            write_index(w, cp, *class_info_index, ConstantPool::get_utf8_info)?
        }
        ElementValue::Annotation(annotation) => write_annotation(w, cp, annotation)?,
        ElementValue::Array(values) => {
            write_count(w, values.len(), "array element values")?;
            for value in values {
                write_element_value(w, cp, value)?;
            }
        }
    }
    Ok(())
}
