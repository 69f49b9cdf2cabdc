//! Instruction model of a `Code` attribute.
//!
//! Branch and switch targets are absolute program counters (offsets from the start of the code
//! array). The codec converts them from and to the relative deltas stored in the class file.

mod codec;

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub use self::codec::{decode_instructions, encode_instructions};
use crate::{constant_pool::CpInfo, ConstantPool, ConstantPoolError};

macro_rules! opcodes {
    ($($name:ident = $value:literal => $mnemonic:literal,)*) => {
        /// Every opcode defined by JVMS §6.5. The reserved `breakpoint`, `impdep1` and `impdep2`
        /// are not part of the table and decode as unknown.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00 => "nop",
    AconstNull = 0x01 => "aconst_null",
    IconstM1 = 0x02 => "iconst_m1",
    Iconst0 = 0x03 => "iconst_0",
    Iconst1 = 0x04 => "iconst_1",
    Iconst2 = 0x05 => "iconst_2",
    Iconst3 = 0x06 => "iconst_3",
    Iconst4 = 0x07 => "iconst_4",
    Iconst5 = 0x08 => "iconst_5",
    Lconst0 = 0x09 => "lconst_0",
    Lconst1 = 0x0a => "lconst_1",
    Fconst0 = 0x0b => "fconst_0",
    Fconst1 = 0x0c => "fconst_1",
    Fconst2 = 0x0d => "fconst_2",
    Dconst0 = 0x0e => "dconst_0",
    Dconst1 = 0x0f => "dconst_1",
    Bipush = 0x10 => "bipush",
    Sipush = 0x11 => "sipush",
    Ldc = 0x12 => "ldc",
    LdcW = 0x13 => "ldc_w",
    Ldc2W = 0x14 => "ldc2_w",
    Iload = 0x15 => "iload",
    Lload = 0x16 => "lload",
    Fload = 0x17 => "fload",
    Dload = 0x18 => "dload",
    Aload = 0x19 => "aload",
    Iload0 = 0x1a => "iload_0",
    Iload1 = 0x1b => "iload_1",
    Iload2 = 0x1c => "iload_2",
    Iload3 = 0x1d => "iload_3",
    Lload0 = 0x1e => "lload_0",
    Lload1 = 0x1f => "lload_1",
    Lload2 = 0x20 => "lload_2",
    Lload3 = 0x21 => "lload_3",
    Fload0 = 0x22 => "fload_0",
    Fload1 = 0x23 => "fload_1",
    Fload2 = 0x24 => "fload_2",
    Fload3 = 0x25 => "fload_3",
    Dload0 = 0x26 => "dload_0",
    Dload1 = 0x27 => "dload_1",
    Dload2 = 0x28 => "dload_2",
    Dload3 = 0x29 => "dload_3",
    Aload0 = 0x2a => "aload_0",
    Aload1 = 0x2b => "aload_1",
    Aload2 = 0x2c => "aload_2",
    Aload3 = 0x2d => "aload_3",
    Iaload = 0x2e => "iaload",
    Laload = 0x2f => "laload",
    Faload = 0x30 => "faload",
    Daload = 0x31 => "daload",
    Aaload = 0x32 => "aaload",
    Baload = 0x33 => "baload",
    Caload = 0x34 => "caload",
    Saload = 0x35 => "saload",
    Istore = 0x36 => "istore",
    Lstore = 0x37 => "lstore",
    Fstore = 0x38 => "fstore",
    Dstore = 0x39 => "dstore",
    Astore = 0x3a => "astore",
    Istore0 = 0x3b => "istore_0",
    Istore1 = 0x3c => "istore_1",
    Istore2 = 0x3d => "istore_2",
    Istore3 = 0x3e => "istore_3",
    Lstore0 = 0x3f => "lstore_0",
    Lstore1 = 0x40 => "lstore_1",
    Lstore2 = 0x41 => "lstore_2",
    Lstore3 = 0x42 => "lstore_3",
    Fstore0 = 0x43 => "fstore_0",
    Fstore1 = 0x44 => "fstore_1",
    Fstore2 = 0x45 => "fstore_2",
    Fstore3 = 0x46 => "fstore_3",
    Dstore0 = 0x47 => "dstore_0",
    Dstore1 = 0x48 => "dstore_1",
    Dstore2 = 0x49 => "dstore_2",
    Dstore3 = 0x4a => "dstore_3",
    Astore0 = 0x4b => "astore_0",
    Astore1 = 0x4c => "astore_1",
    Astore2 = 0x4d => "astore_2",
    Astore3 = 0x4e => "astore_3",
    Iastore = 0x4f => "iastore",
    Lastore = 0x50 => "lastore",
    Fastore = 0x51 => "fastore",
    Dastore = 0x52 => "dastore",
    Aastore = 0x53 => "aastore",
    Bastore = 0x54 => "bastore",
    Castore = 0x55 => "castore",
    Sastore = 0x56 => "sastore",
    Pop = 0x57 => "pop",
    Pop2 = 0x58 => "pop2",
    Dup = 0x59 => "dup",
    DupX1 = 0x5a => "dup_x1",
    DupX2 = 0x5b => "dup_x2",
    Dup2 = 0x5c => "dup2",
    Dup2X1 = 0x5d => "dup2_x1",
    Dup2X2 = 0x5e => "dup2_x2",
    Swap = 0x5f => "swap",
    Iadd = 0x60 => "iadd",
    Ladd = 0x61 => "ladd",
    Fadd = 0x62 => "fadd",
    Dadd = 0x63 => "dadd",
    Isub = 0x64 => "isub",
    Lsub = 0x65 => "lsub",
    Fsub = 0x66 => "fsub",
    Dsub = 0x67 => "dsub",
    Imul = 0x68 => "imul",
    Lmul = 0x69 => "lmul",
    Fmul = 0x6a => "fmul",
    Dmul = 0x6b => "dmul",
    Idiv = 0x6c => "idiv",
    Ldiv = 0x6d => "ldiv",
    Fdiv = 0x6e => "fdiv",
    Ddiv = 0x6f => "ddiv",
    Irem = 0x70 => "irem",
    Lrem = 0x71 => "lrem",
    Frem = 0x72 => "frem",
    Drem = 0x73 => "drem",
    Ineg = 0x74 => "ineg",
    Lneg = 0x75 => "lneg",
    Fneg = 0x76 => "fneg",
    Dneg = 0x77 => "dneg",
    Ishl = 0x78 => "ishl",
    Lshl = 0x79 => "lshl",
    Ishr = 0x7a => "ishr",
    Lshr = 0x7b => "lshr",
    Iushr = 0x7c => "iushr",
    Lushr = 0x7d => "lushr",
    Iand = 0x7e => "iand",
    Land = 0x7f => "land",
    Ior = 0x80 => "ior",
    Lor = 0x81 => "lor",
    Ixor = 0x82 => "ixor",
    Lxor = 0x83 => "lxor",
    Iinc = 0x84 => "iinc",
    I2l = 0x85 => "i2l",
    I2f = 0x86 => "i2f",
    I2d = 0x87 => "i2d",
    L2i = 0x88 => "l2i",
    L2f = 0x89 => "l2f",
    L2d = 0x8a => "l2d",
    F2i = 0x8b => "f2i",
    F2l = 0x8c => "f2l",
    F2d = 0x8d => "f2d",
    D2i = 0x8e => "d2i",
    D2l = 0x8f => "d2l",
    D2f = 0x90 => "d2f",
    I2b = 0x91 => "i2b",
    I2c = 0x92 => "i2c",
    I2s = 0x93 => "i2s",
    Lcmp = 0x94 => "lcmp",
    Fcmpl = 0x95 => "fcmpl",
    Fcmpg = 0x96 => "fcmpg",
    Dcmpl = 0x97 => "dcmpl",
    Dcmpg = 0x98 => "dcmpg",
    Ifeq = 0x99 => "ifeq",
    Ifne = 0x9a => "ifne",
    Iflt = 0x9b => "iflt",
    Ifge = 0x9c => "ifge",
    Ifgt = 0x9d => "ifgt",
    Ifle = 0x9e => "ifle",
    IfIcmpeq = 0x9f => "if_icmpeq",
    IfIcmpne = 0xa0 => "if_icmpne",
    IfIcmplt = 0xa1 => "if_icmplt",
    IfIcmpge = 0xa2 => "if_icmpge",
    IfIcmpgt = 0xa3 => "if_icmpgt",
    IfIcmple = 0xa4 => "if_icmple",
    IfAcmpeq = 0xa5 => "if_acmpeq",
    IfAcmpne = 0xa6 => "if_acmpne",
    Goto = 0xa7 => "goto",
    Jsr = 0xa8 => "jsr",
    Ret = 0xa9 => "ret",
    Tableswitch = 0xaa => "tableswitch",
    Lookupswitch = 0xab => "lookupswitch",
    Ireturn = 0xac => "ireturn",
    Lreturn = 0xad => "lreturn",
    Freturn = 0xae => "freturn",
    Dreturn = 0xaf => "dreturn",
    Areturn = 0xb0 => "areturn",
    Return = 0xb1 => "return",
    Getstatic = 0xb2 => "getstatic",
    Putstatic = 0xb3 => "putstatic",
    Getfield = 0xb4 => "getfield",
    Putfield = 0xb5 => "putfield",
    Invokevirtual = 0xb6 => "invokevirtual",
    Invokespecial = 0xb7 => "invokespecial",
    Invokestatic = 0xb8 => "invokestatic",
    Invokeinterface = 0xb9 => "invokeinterface",
    Invokedynamic = 0xba => "invokedynamic",
    New = 0xbb => "new",
    Newarray = 0xbc => "newarray",
    Anewarray = 0xbd => "anewarray",
    Arraylength = 0xbe => "arraylength",
    Athrow = 0xbf => "athrow",
    Checkcast = 0xc0 => "checkcast",
    Instanceof = 0xc1 => "instanceof",
    Monitorenter = 0xc2 => "monitorenter",
    Monitorexit = 0xc3 => "monitorexit",
    Wide = 0xc4 => "wide",
    Multianewarray = 0xc5 => "multianewarray",
    Ifnull = 0xc6 => "ifnull",
    Ifnonnull = 0xc7 => "ifnonnull",
    GotoW = 0xc8 => "goto_w",
    JsrW = 0xc9 => "jsr_w",
}

/// Layout of the operands following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operands.
    Implicit,
    /// Signed byte immediate (`bipush`).
    Byte,
    /// Signed short immediate (`sipush`).
    Short,
    /// One-byte constant pool index (`ldc`).
    Constant1,
    /// Two-byte constant pool index.
    Constant2,
    /// Local variable slot, widened by a `wide` prefix.
    Local,
    /// Local variable slot and signed increment, widened by a `wide` prefix.
    Iinc,
    /// Signed two-byte branch delta.
    Branch2,
    /// Signed four-byte branch delta.
    Branch4,
    InvokeInterface,
    InvokeDynamic,
    MultiANewArray,
    NewArray,
    TableSwitch,
    LookupSwitch,
    Wide,
}

impl Opcode {
    pub fn shape(self) -> OperandShape {
        use Opcode::*;
        use OperandShape as S;

        match self {
            Bipush => S::Byte,
            Sipush => S::Short,
            Ldc => S::Constant1,
            LdcW | Ldc2W | Getstatic | Putstatic | Getfield | Putfield | Invokevirtual
            | Invokespecial | Invokestatic | New | Anewarray | Checkcast | Instanceof => {
                S::Constant2
            }
            Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore
            | Ret => S::Local,
            Iinc => S::Iinc,
            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt
            | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne | Goto | Jsr | Ifnull
            | Ifnonnull => S::Branch2,
            GotoW | JsrW => S::Branch4,
            Invokeinterface => S::InvokeInterface,
            Invokedynamic => S::InvokeDynamic,
            Multianewarray => S::MultiANewArray,
            Newarray => S::NewArray,
            Tableswitch => S::TableSwitch,
            Lookupswitch => S::LookupSwitch,
            Wide => S::Wide,
            _ => S::Implicit,
        }
    }
}
impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Element type operand of `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ArrayType {
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSwitch {
    pub default: u32,
    pub low: i32,
    pub high: i32,
    /// One target per key in `low..=high`.
    pub targets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitch {
    pub default: u32,
    /// `(match, target)` pairs in the order they are stored.
    pub pairs: Vec<(i32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Simple(Opcode),
    Bipush(i8),
    Sipush(i16),
    /// Any opcode taking a constant pool index, including the one-byte form of `ldc`.
    Constant {
        opcode: Opcode,
        index: u16,
    },
    /// Loads, stores and `ret`. `wide` records whether the instruction carried the prefix.
    Local {
        opcode: Opcode,
        index: u16,
        wide: bool,
    },
    Iinc {
        index: u16,
        delta: i16,
        wide: bool,
    },
    Branch {
        opcode: Opcode,
        target: u32,
    },
    InvokeInterface {
        index: u16,
        count: u8,
    },
    InvokeDynamic {
        index: u16,
    },
    MultiANewArray {
        index: u16,
        dimensions: u8,
    },
    NewArray(ArrayType),
    TableSwitch(TableSwitch),
    LookupSwitch(LookupSwitch),
}
impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Simple(opcode)
            | Instruction::Constant { opcode, .. }
            | Instruction::Local { opcode, .. }
            | Instruction::Branch { opcode, .. } => *opcode,
            Instruction::Bipush(_) => Opcode::Bipush,
            Instruction::Sipush(_) => Opcode::Sipush,
            Instruction::Iinc { .. } => Opcode::Iinc,
            Instruction::InvokeInterface { .. } => Opcode::Invokeinterface,
            Instruction::InvokeDynamic { .. } => Opcode::Invokedynamic,
            Instruction::MultiANewArray { .. } => Opcode::Multianewarray,
            Instruction::NewArray(_) => Opcode::Newarray,
            Instruction::TableSwitch(_) => Opcode::Tableswitch,
            Instruction::LookupSwitch(_) => Opcode::Lookupswitch,
        }
    }

    /// The constant pool index this instruction refers to, if any.
    pub fn constant_index(&self) -> Option<u16> {
        match *self {
            Instruction::Constant { index, .. }
            | Instruction::InvokeInterface { index, .. }
            | Instruction::InvokeDynamic { index }
            | Instruction::MultiANewArray { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Absolute targets this instruction may transfer control to, excluding fall-through.
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch(t) => std::iter::once(t.default)
                .chain(t.targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch(l) => std::iter::once(l.default)
                .chain(l.pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => vec![],
        }
    }

    /// Encoded size in bytes when placed at `pc`. Switches depend on `pc` through their padding.
    pub fn len_at(&self, pc: u32) -> usize {
        match self {
            Instruction::Simple(_) => 1,
            Instruction::Bipush(_) => 2,
            Instruction::Sipush(_) => 3,
            Instruction::Constant { opcode, .. } => match opcode.shape() {
                OperandShape::Constant1 => 2,
                _ => 3,
            },
            Instruction::Local { wide, .. } => {
                if *wide {
                    4
                } else {
                    2
                }
            }
            Instruction::Iinc { wide, .. } => {
                if *wide {
                    6
                } else {
                    3
                }
            }
            Instruction::Branch { opcode, .. } => match opcode.shape() {
                OperandShape::Branch4 => 5,
                _ => 3,
            },
            Instruction::InvokeInterface { .. } | Instruction::InvokeDynamic { .. } => 5,
            Instruction::MultiANewArray { .. } => 4,
            Instruction::NewArray(_) => 2,
            Instruction::TableSwitch(t) => 1 + switch_padding(pc) + 12 + 4 * t.targets.len(),
            Instruction::LookupSwitch(l) => 1 + switch_padding(pc) + 8 + 8 * l.pairs.len(),
        }
    }

    /// Checks that the constant pool operand resolves to the variant the opcode consumes.
    pub fn check_constant_pool(&self, cp: &ConstantPool) -> Result<(), ConstantPoolError> {
        use Opcode::*;

        let index = match self.constant_index() {
            Some(index) => index,
            None => return Ok(()),
        };
        match self.opcode() {
            Ldc | LdcW => cp.get_loadable(index).map(drop),
            Ldc2W => cp
                .expect(index, "Long, Double or Dynamic", CpInfo::is_wide_loadable)
                .map(drop),
            Getstatic | Putstatic | Getfield | Putfield => cp.get_field_ref(index).map(drop),
            Invokevirtual => cp.get_method_ref(index).map(drop),
            Invokespecial | Invokestatic => cp.get_any_method_ref(index).map(drop),
            Invokeinterface => cp.get_interface_method_ref(index).map(drop),
            Invokedynamic => cp.get_invoke_dynamic(index).map(drop),
            New | Anewarray | Checkcast | Instanceof | Multianewarray => {
                cp.get_class(index).map(drop)
            }
            _ => Ok(()),
        }
    }
}
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode();
        match self {
            Instruction::Simple(_) => write!(f, "{}", opcode),
            Instruction::Bipush(value) => write!(f, "{} {}", opcode, value),
            Instruction::Sipush(value) => write!(f, "{} {}", opcode, value),
            Instruction::Constant { index, .. } | Instruction::InvokeDynamic { index } => {
                write!(f, "{} #{}", opcode, index)
            }
            Instruction::Local { index, wide, .. } => {
                let prefix = if *wide { "wide " } else { "" };
                write!(f, "{}{} {}", prefix, opcode, index)
            }
            Instruction::Iinc { index, delta, wide } => {
                let prefix = if *wide { "wide " } else { "" };
                write!(f, "{}{} {} {}", prefix, opcode, index, delta)
            }
            Instruction::Branch { target, .. } => write!(f, "{} {}", opcode, target),
            Instruction::InvokeInterface { index, count } => {
                write!(f, "{} #{} {}", opcode, index, count)
            }
            Instruction::MultiANewArray { index, dimensions } => {
                write!(f, "{} #{} {}", opcode, index, dimensions)
            }
            Instruction::NewArray(atype) => write!(f, "{} {:?}", opcode, atype),
            Instruction::TableSwitch(t) => write!(
                f,
                "{} {}..={} {:?} default {}",
                opcode, t.low, t.high, t.targets, t.default
            ),
            Instruction::LookupSwitch(l) => {
                write!(f, "{} {:?} default {}", opcode, l.pairs, l.default)
            }
        }
    }
}

/// Zero bytes between a switch opcode at `pc` and its first four-byte aligned operand.
pub fn switch_padding(pc: u32) -> usize {
    (3 - (pc as usize % 4)) % 4
}


#[cfg(test)]
mod instruction_tests {
    use super::*;
    use crate::constant_pool::ClassInfo;

    #[test]
    fn it_should_expose_the_constant_pool_operand() {
        let instruction = Instruction::MultiANewArray {
            index: 7,
            dimensions: 2,
        };
        assert_eq!(instruction.constant_index(), Some(7));
        assert_eq!(Instruction::Bipush(7).constant_index(), None);
    }

    #[test]
    fn it_should_check_the_operand_against_the_opcode() {
        let pool = ConstantPool::new(vec![
            CpInfo::Class(ClassInfo { name_index: 2 }),
            CpInfo::Utf8("[[I".into()),
        ]);
        let multi = Instruction::MultiANewArray {
            index: 1,
            dimensions: 2,
        };
        assert_eq!(multi.check_constant_pool(&pool), Ok(()));

        let ldc = Instruction::Constant {
            opcode: Opcode::Ldc,
            index: 2,
        };
        assert_eq!(
            ldc.check_constant_pool(&pool),
            Err(ConstantPoolError::WrongVariant {
                index: 2,
                expected: "loadable constant",
                found: "Utf8"
            })
        );
        assert_eq!(Instruction::Simple(Opcode::Nop).check_constant_pool(&pool), Ok(()));
    }
}
