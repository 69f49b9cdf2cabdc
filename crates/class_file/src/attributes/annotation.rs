use crate::{ConstantPool, ConstantPoolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// `Utf8` field descriptor of the annotation interface.
    pub type_index: u16,
    pub element_value_pairs: Vec<ElementValuePair>,
}
impl Annotation {
    pub fn type_descriptor<'a>(
        &self,
        constant_pool: &'a ConstantPool,
    ) -> Result<&'a str, ConstantPoolError> {
        constant_pool.get_utf8(self.type_index)
    }

    /// Value of the element called `name`.
    pub fn element<'a>(
        &'a self,
        name: &str,
        constant_pool: &ConstantPool,
    ) -> Option<&'a ElementValue> {
        self.element_value_pairs
            .iter()
            .find(|p| constant_pool.get_utf8(p.element_name_index) == Ok(name))
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant. `tag` is one of `B C D F I J S Z s`.
    Const { tag: u8, const_value_index: u16 },
    Enum {
        type_name_index: u16,
        const_name_index: u16,
    },
    /// `Utf8` return descriptor of the class literal.
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}
impl ElementValue {
    pub const ENUM: u8 = b'e';
    pub const CLASS: u8 = b'c';
    pub const ANNOTATION: u8 = b'@';
    pub const ARRAY: u8 = b'[';

    pub fn tag(&self) -> u8 {
        match self {
            ElementValue::Const { tag, .. } => *tag,
            ElementValue::Enum { .. } => Self::ENUM,
            ElementValue::Class { .. } => Self::CLASS,
            ElementValue::Annotation(_) => Self::ANNOTATION,
            ElementValue::Array(_) => Self::ARRAY,
        }
    }

    /// Whether `tag` introduces a [`ElementValue::Const`].
    pub fn is_const_tag(tag: u8) -> bool {
        matches!(
            tag,
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's'
        )
    }

    /// Checks that `index` holds the pool entry a constant tagged `tag` is stored in.
    pub fn check_const_value(
        tag: u8,
        constant_pool: &ConstantPool,
        index: u16,
    ) -> Result<(), ConstantPoolError> {
        match tag {
            b'D' => matches_cp_info!(constant_pool, index, Double).map(drop),
            b'F' => matches_cp_info!(constant_pool, index, Float).map(drop),
            b'J' => matches_cp_info!(constant_pool, index, Long).map(drop),
            b's' => constant_pool.get_utf8_info(index).map(drop),
            _ => matches_cp_info!(constant_pool, index, Integer).map(drop),
        }
    }
}

#[cfg(test)]
mod annotation_tests {
    use super::*;
    use crate::constant_pool::CpInfo;

    #[test]
    fn it_should_find_elements_by_name() {
        let pool = ConstantPool::new(vec![
            CpInfo::Utf8("Ljava/lang/Deprecated;".into()),
            CpInfo::Utf8("since".into()),
            CpInfo::Utf8("9".into()),
        ]);
        let annotation = Annotation {
            type_index: 1,
            element_value_pairs: vec![ElementValuePair {
                element_name_index: 2,
                value: ElementValue::Const {
                    tag: b's',
                    const_value_index: 3,
                },
            }],
        };

        assert_eq!(
            annotation.type_descriptor(&pool),
            Ok("Ljava/lang/Deprecated;")
        );
        assert_eq!(
            annotation.element("since", &pool).map(ElementValue::tag),
            Some(b's')
        );
        assert!(annotation.element("forRemoval", &pool).is_none());
    }

    #[test]
    fn it_should_check_constants_against_their_tag() {
        let pool = ConstantPool::new(vec![CpInfo::Integer(1), CpInfo::Utf8("x".into())]);
        assert_eq!(ElementValue::check_const_value(b'Z', &pool, 1), Ok(()));
        assert_eq!(ElementValue::check_const_value(b's', &pool, 2), Ok(()));
        assert_eq!(
            ElementValue::check_const_value(b'J', &pool, 1),
            Err(ConstantPoolError::WrongVariant {
                index: 1,
                expected: "Long",
                found: "Integer"
            })
        );
    }

    #[test]
    fn it_should_recognize_constant_tags() {
        assert!(ElementValue::is_const_tag(b'J'));
        assert!(!ElementValue::is_const_tag(ElementValue::ARRAY));
    }
}
