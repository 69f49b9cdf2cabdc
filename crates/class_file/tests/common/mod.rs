#![allow(dead_code)]

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

/// Big-endian byte sink for hand-assembled payloads.
#[derive(Default)]
pub struct Payload(Vec<u8>);
impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u1(&mut self, value: u8) -> &mut Self {
        self.0.write_u8(value).unwrap();
        self
    }

    pub fn u2(&mut self, value: u16) -> &mut Self {
        self.0.write_u16::<BigEndian>(value).unwrap();
        self
    }

    pub fn u4(&mut self, value: u32) -> &mut Self {
        self.0.write_u32::<BigEndian>(value).unwrap();
        self
    }

    pub fn i4(&mut self, value: i32) -> &mut Self {
        self.0.write_i32::<BigEndian>(value).unwrap();
        self
    }

    pub fn i8(&mut self, value: i64) -> &mut Self {
        self.0.write_i64::<BigEndian>(value).unwrap();
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn build(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

/// Constant pool assembler handing out logical indices.
pub struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}
impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: vec![],
            next: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}
impl Pool {
    fn push(&mut self, width: u16, entry: &[u8]) -> u16 {
        let index = self.next;
        self.bytes.extend_from_slice(entry);
        self.next += width;
        index
    }

    /// Appends a raw entry, tag included.
    pub fn raw(&mut self, width: u16, entry: &[u8]) -> u16 {
        self.push(width, entry)
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8s.get(s) {
            return *index;
        }
        let bytes = cafe_class_file::mutf8::encode(s);
        let entry = Payload::new()
            .u1(1)
            .u2(bytes.len() as u16)
            .bytes(&bytes)
            .build();
        let index = self.push(1, &entry);
        self.utf8s.insert(s.to_owned(), index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let index = self.push(1, &Payload::new().u1(7).u2(name_index).build());
        self.classes.insert(name.to_owned(), index);
        index
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let string_index = self.utf8(s);
        self.push(1, &Payload::new().u1(8).u2(string_index).build())
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.push(1, &Payload::new().u1(3).i4(value).build())
    }

    pub fn float_bits(&mut self, bits: u32) -> u16 {
        self.push(1, &Payload::new().u1(4).u4(bits).build())
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.push(2, &Payload::new().u1(5).i8(value).build())
    }

    pub fn double(&mut self, value: f64) -> u16 {
        self.push(2, &Payload::new().u1(6).i8(value.to_bits() as i64).build())
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(
            1,
            &Payload::new().u1(12).u2(name_index).u2(descriptor_index).build(),
        )
    }

    fn member_ref(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(
            1,
            &Payload::new()
                .u1(tag)
                .u2(class_index)
                .u2(name_and_type_index)
                .build(),
        )
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(9, class, name, descriptor)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(10, class, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(11, class, name, descriptor)
    }

    pub fn method_handle(&mut self, kind: u8, reference_index: u16) -> u16 {
        self.push(
            1,
            &Payload::new().u1(15).u1(kind).u2(reference_index).build(),
        )
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor_index = self.utf8(descriptor);
        self.push(1, &Payload::new().u1(16).u2(descriptor_index).build())
    }

    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(
            1,
            &Payload::new()
                .u1(18)
                .u2(bootstrap)
                .u2(name_and_type_index)
                .build(),
        )
    }

    /// The `constant_pool_count` item.
    pub fn count(&self) -> u16 {
        self.next
    }
}

/// Wraps `payload` into an attribute named `name`.
pub fn attribute(pool: &mut Pool, name: &str, payload: &[u8]) -> Vec<u8> {
    let name_index = pool.utf8(name);
    Payload::new()
        .u2(name_index)
        .u4(payload.len() as u32)
        .bytes(payload)
        .build()
}

/// `Code` attribute with `(start, end, handler, catch_type)` handlers.
pub fn code_attribute(
    pool: &mut Pool,
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
    exception_table: &[(u16, u16, u16, u16)],
    attributes: &[Vec<u8>],
) -> Vec<u8> {
    let mut payload = Payload::new();
    payload
        .u2(max_stack)
        .u2(max_locals)
        .u4(code.len() as u32)
        .bytes(code)
        .u2(exception_table.len() as u16);
    for (start_pc, end_pc, handler_pc, catch_type) in exception_table {
        payload
            .u2(*start_pc)
            .u2(*end_pc)
            .u2(*handler_pc)
            .u2(*catch_type);
    }
    payload.u2(attributes.len() as u16);
    for attribute in attributes {
        payload.bytes(attribute);
    }
    let payload = payload.build();
    self::attribute(pool, "Code", &payload)
}

pub struct ClassBuilder {
    pub pool: Pool,
    pub major: u16,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
}
impl ClassBuilder {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut pool = Pool::default();
        let this_class = pool.class(name);
        let super_class = super_name.map_or(0, |s| pool.class(s));
        Self {
            pool,
            major: 61,
            access_flags: 0x0021,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<Vec<u8>>,
    ) -> &mut Self {
        let member = self.member(access_flags, name, descriptor, attributes);
        self.fields.push(member);
        self
    }

    pub fn method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<Vec<u8>>,
    ) -> &mut Self {
        let member = self.member(access_flags, name, descriptor, attributes);
        self.methods.push(member);
        self
    }

    pub fn attribute(&mut self, attribute: Vec<u8>) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    fn member(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<Vec<u8>>,
    ) -> Vec<u8> {
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        let mut member = Payload::new();
        member
            .u2(access_flags)
            .u2(name_index)
            .u2(descriptor_index)
            .u2(attributes.len() as u16);
        for attribute in &attributes {
            member.bytes(attribute);
        }
        member.build()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut class = Payload::new();
        class
            .u4(0xCAFEBABE)
            .u2(0)
            .u2(self.major)
            .u2(self.pool.count())
            .bytes(&self.pool.bytes)
            .u2(self.access_flags)
            .u2(self.this_class)
            .u2(self.super_class)
            .u2(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            class.u2(*interface);
        }
        for members in [&self.fields, &self.methods] {
            class.u2(members.len() as u16);
            for member in members {
                class.bytes(member);
            }
        }
        class.u2(self.attributes.len() as u16);
        for attribute in &self.attributes {
            class.bytes(attribute);
        }
        class.build()
    }
}
