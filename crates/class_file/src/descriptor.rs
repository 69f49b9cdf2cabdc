//! Field and method descriptors (JVMS §4.3).

use std::{fmt, str::FromStr};

use crate::error::DescriptorError;

type Result<T, E = DescriptorError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}
impl BaseType {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Internal name of the wrapper class (`java/lang/Integer` for `int`).
    pub fn wrapper_class(self) -> &'static str {
        match self {
            BaseType::Byte => "java/lang/Byte",
            BaseType::Char => "java/lang/Character",
            BaseType::Double => "java/lang/Double",
            BaseType::Float => "java/lang/Float",
            BaseType::Int => "java/lang/Integer",
            BaseType::Long => "java/lang/Long",
            BaseType::Short => "java/lang/Short",
            BaseType::Boolean => "java/lang/Boolean",
        }
    }
}

/// Coarse classification of a value type, as used by typed instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Reference,
    Void,
}
impl TypeKind {
    /// Local variable and operand stack slots taken by a value of this kind.
    pub fn slot_size(self) -> usize {
        match self {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Base(BaseType),
    /// Internal class name, without the `L` and `;`.
    Object(String),
    Array(Box<FieldType>),
}
impl FieldType {
    pub fn kind(&self) -> TypeKind {
        match self {
            FieldType::Base(BaseType::Byte) => TypeKind::Byte,
            FieldType::Base(BaseType::Char) => TypeKind::Char,
            FieldType::Base(BaseType::Double) => TypeKind::Double,
            FieldType::Base(BaseType::Float) => TypeKind::Float,
            FieldType::Base(BaseType::Int) => TypeKind::Int,
            FieldType::Base(BaseType::Long) => TypeKind::Long,
            FieldType::Base(BaseType::Short) => TypeKind::Short,
            FieldType::Base(BaseType::Boolean) => TypeKind::Boolean,
            FieldType::Object(_) | FieldType::Array(_) => TypeKind::Reference,
        }
    }

    pub fn slot_size(&self) -> usize {
        self.kind().slot_size()
    }

    pub fn dimensions(&self) -> usize {
        match self {
            FieldType::Array(component) => 1 + component.dimensions(),
            _ => 0,
        }
    }

    /// `boolean` or `java.lang.Boolean`.
    pub fn is_boolean(&self) -> bool {
        self.is_primitive_or_wrapper(BaseType::Boolean)
    }

    /// `int` or `java.lang.Integer`.
    pub fn is_integer(&self) -> bool {
        self.is_primitive_or_wrapper(BaseType::Int)
    }

    fn is_primitive_or_wrapper(&self, base: BaseType) -> bool {
        match self {
            FieldType::Base(b) => *b == base,
            FieldType::Object(name) => name == base.wrapper_class(),
            FieldType::Array(_) => false,
        }
    }
}
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => write!(f, "{}", base.as_char()),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
        }
    }
}
impl FromStr for FieldType {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        let mut p = DescriptorParser::new(s);
        let field_type = p.parse_field_type()?;
        p.finish()?;
        Ok(field_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    /// `None` for `void`.
    pub return_type: Option<FieldType>,
}
impl MethodDescriptor {
    /// Slots taken by the parameters, not counting `this`.
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slot_size).sum()
    }

    pub fn return_kind(&self) -> TypeKind {
        self.return_type
            .as_ref()
            .map_or(TypeKind::Void, FieldType::kind)
    }
}
impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(return_type) => write!(f, "{}", return_type),
            None => f.write_str("V"),
        }
    }
}
impl FromStr for MethodDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        let mut p = DescriptorParser::new(s);
        p.expect('(')?;
        let mut parameters = Vec::new();
        while p.peek() != Some(')') {
            parameters.push(p.parse_field_type()?);
        }
        p.expect(')')?;
        let return_type = if p.peek() == Some('V') {
            p.next()?;
            None
        } else {
            Some(p.parse_field_type()?)
        };
        p.finish()?;

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

struct DescriptorParser<'a> {
    descriptor: &'a str,
    position: usize,
}
impl<'a> DescriptorParser<'a> {
    fn new(descriptor: &'a str) -> Self {
        Self {
            descriptor,
            position: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.descriptor[self.position..].chars().next()
    }

    fn next(&mut self) -> Result<char> {
        let c = self
            .peek()
            .ok_or_else(|| DescriptorError::UnexpectedEnd(self.descriptor.to_owned()))?;
        self.position += c.len_utf8();
        Ok(c)
    }

    fn unexpected(&self, position: usize, found: char) -> DescriptorError {
        DescriptorError::UnexpectedChar {
            descriptor: self.descriptor.to_owned(),
            position,
            found,
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        let position = self.position;
        match self.next()? {
            c if c == expected => Ok(()),
            c => Err(self.unexpected(position, c)),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            Some(c) => Err(self.unexpected(self.position, c)),
            None => Ok(()),
        }
    }

    fn parse_field_type(&mut self) -> Result<FieldType> {
        let mut dimensions = 0;
        while self.peek() == Some('[') {
            self.next()?;
            dimensions += 1;
        }
        if dimensions > 255 {
            return Err(DescriptorError::TooManyDimensions(
                self.descriptor.to_owned(),
            ));
        }

        let position = self.position;
        let mut field_type = match self.next()? {
            'L' => FieldType::Object(self.parse_class_name()?),
            c => FieldType::Base(
                BaseType::from_char(c).ok_or_else(|| self.unexpected(position, c))?,
            ),
        };
        for _ in 0..dimensions {
            field_type = FieldType::Array(Box::new(field_type));
        }
        Ok(field_type)
    }

    fn parse_class_name(&mut self) -> Result<String> {
        let start = self.position;
        loop {
            let position = self.position;
            match self.next()? {
                ';' if position > start => {
                    return Ok(self.descriptor[start..position].to_owned());
                }
                c @ (';' | '.' | '[') => return Err(self.unexpected(position, c)),
                _ => {}
            }
        }
    }
}
