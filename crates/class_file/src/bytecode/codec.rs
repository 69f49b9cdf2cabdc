use log::trace;

use crate::{
    bytecode::{
        switch_padding, ArrayType, Instruction, LookupSwitch, Opcode, OperandShape, TableSwitch,
    },
    cursor::{ByteReader, ByteWriter},
    ClassFileError, Result,
};

/// Decodes the code array of a `Code` attribute into `(pc, instruction)` pairs.
///
/// `base_offset` is the position of the code array in the class file and is only used to report
/// absolute offsets in errors. Program counters are relative to the start of `code`.
pub fn decode_instructions(code: &[u8], base_offset: usize) -> Result<Vec<(u32, Instruction)>> {
    let mut r = ByteReader::with_base(code, base_offset);
    let mut instructions = Vec::new();
    while r.remaining() > 0 {
        let pc = r.position() as u32;
        let instruction = decode_instruction(&mut r, pc)?;
        instructions.push((pc, instruction));
    }
    trace!(
        "decoded {} instruction(s) from {} code byte(s)",
        instructions.len(),
        code.len()
    );

    Ok(instructions)
}

/// Encodes instructions back into a code array.
///
/// Instructions are laid out back to back; the program counters stored next to them are not
/// consulted. Error offsets are relative to the start of the code array.
pub fn encode_instructions(instructions: &[(u32, Instruction)]) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    for (_, instruction) in instructions {
        encode_instruction(&mut w, instruction)?;
    }
    Ok(w.into_inner())
}

fn decode_instruction(r: &mut ByteReader, pc: u32) -> Result<Instruction> {
    let offset = r.offset();
    let byte = r.read_u1()?;
    let opcode = Opcode::try_from(byte).map_err(|_| ClassFileError::UnknownOpcode {
        offset,
        opcode: byte,
    })?;

    Ok(match opcode.shape() {
        OperandShape::Implicit => Instruction::Simple(opcode),
        OperandShape::Byte => Instruction::Bipush(r.read_i1()?),
        OperandShape::Short => Instruction::Sipush(r.read_i2()?),
        OperandShape::Constant1 => Instruction::Constant {
            opcode,
            index: r.read_u1()? as u16,
        },
        OperandShape::Constant2 => Instruction::Constant {
            opcode,
            index: r.read_u2()?,
        },
        OperandShape::Local => Instruction::Local {
            opcode,
            index: r.read_u1()? as u16,
            wide: false,
        },
        OperandShape::Iinc => Instruction::Iinc {
            index: r.read_u1()? as u16,
            delta: r.read_i1()? as i16,
            wide: false,
        },
        OperandShape::Branch2 => Instruction::Branch {
            opcode,
            target: absolute_target(pc, r.read_i2()? as i32, offset)?,
        },
        OperandShape::Branch4 => Instruction::Branch {
            opcode,
            target: absolute_target(pc, r.read_i4()?, offset)?,
        },
        OperandShape::InvokeInterface => {
            let index = r.read_u2()?;
            let count = r.read_u1()?;
            expect_zero(r, 1, offset, byte)?;
            Instruction::InvokeInterface { index, count }
        }
        OperandShape::InvokeDynamic => {
            let index = r.read_u2()?;
            expect_zero(r, 2, offset, byte)?;
            Instruction::InvokeDynamic { index }
        }
        OperandShape::MultiANewArray => Instruction::MultiANewArray {
            index: r.read_u2()?,
            dimensions: r.read_u1()?,
        },
        OperandShape::NewArray => {
            let atype = r.read_u1()?;
            Instruction::NewArray(ArrayType::try_from(atype).map_err(|_| {
                ClassFileError::MalformedInstruction {
                    offset,
                    opcode: byte,
                }
            })?)
        }
        OperandShape::TableSwitch => Instruction::TableSwitch(decode_table_switch(r, pc)?),
        OperandShape::LookupSwitch => Instruction::LookupSwitch(decode_lookup_switch(r, pc)?),
        OperandShape::Wide => decode_wide(r)?,
    })
}

/// Decodes the instruction following a `wide` prefix as a single instruction.
fn decode_wide(r: &mut ByteReader) -> Result<Instruction> {
    let offset = r.offset();
    let byte = r.read_u1()?;
    let opcode = Opcode::try_from(byte).map_err(|_| ClassFileError::UnknownOpcode {
        offset,
        opcode: byte,
    })?;

    match opcode.shape() {
        OperandShape::Local => Ok(Instruction::Local {
            opcode,
            index: r.read_u2()?,
            wide: true,
        }),
        OperandShape::Iinc => Ok(Instruction::Iinc {
            index: r.read_u2()?,
            delta: r.read_i2()?,
            wide: true,
        }),
        _ => Err(ClassFileError::UnknownOpcode {
            offset,
            opcode: byte,
        }),
    }
}

fn decode_table_switch(r: &mut ByteReader, pc: u32) -> Result<TableSwitch> {
    skip_padding(r)?;
    let offset = r.offset();
    let default = absolute_target(pc, r.read_i4()?, offset)?;
    let low = r.read_i4()?;
    let high = r.read_i4()?;
    if low > high {
        return Err(ClassFileError::MalformedSwitchTable {
            offset,
            reason: "low exceeds high",
        });
    }

    let count = (high as i64 - low as i64 + 1) as usize;
    r.ensure(count.saturating_mul(4))?;
    let targets = (0..count)
        .map(|_| {
            let offset = r.offset();
            absolute_target(pc, r.read_i4()?, offset)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TableSwitch {
        default,
        low,
        high,
        targets,
    })
}

fn decode_lookup_switch(r: &mut ByteReader, pc: u32) -> Result<LookupSwitch> {
    skip_padding(r)?;
    let offset = r.offset();
    let default = absolute_target(pc, r.read_i4()?, offset)?;
    let npairs = r.read_i4()?;
    if npairs < 0 {
        return Err(ClassFileError::MalformedSwitchTable {
            offset,
            reason: "negative pair count",
        });
    }

    let count = npairs as usize;
    r.ensure(count.saturating_mul(8))?;
    let pairs = (0..count)
        .map(|_| {
            let offset = r.offset();
            let key = r.read_i4()?;
            Ok((key, absolute_target(pc, r.read_i4()?, offset)?))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LookupSwitch { default, pairs })
}

/// Consumes the padding after a switch opcode. The reader is positioned right after the opcode,
/// and its position is the program counter relative to the start of the code array.
fn skip_padding(r: &mut ByteReader) -> Result<()> {
    let offset = r.offset();
    let padding = (4 - r.position() % 4) % 4;
    if r.read_bytes(padding)?.iter().any(|b| *b != 0) {
        return Err(ClassFileError::MalformedSwitchTable {
            offset,
            reason: "non-zero padding",
        });
    }
    Ok(())
}

fn expect_zero(r: &mut ByteReader, n: usize, offset: usize, opcode: u8) -> Result<()> {
    if r.read_bytes(n)?.iter().any(|b| *b != 0) {
        return Err(ClassFileError::MalformedInstruction { offset, opcode });
    }
    Ok(())
}

fn absolute_target(pc: u32, delta: i32, offset: usize) -> Result<u32> {
    let target = pc as i64 + delta as i64;
    u32::try_from(target).map_err(|_| ClassFileError::BranchOutOfRange { offset, target })
}

fn relative_delta(pc: u32, target: u32, offset: usize) -> Result<i32> {
    i32::try_from(target as i64 - pc as i64).map_err(|_| ClassFileError::BranchOutOfRange {
        offset,
        target: target as i64,
    })
}

fn encode_instruction(w: &mut ByteWriter, instruction: &Instruction) -> Result<()> {
    let offset = w.position();
    let pc = offset as u32;
    let opcode = instruction.opcode();
    let malformed = || ClassFileError::MalformedInstruction {
        offset,
        opcode: opcode.into(),
    };

    match instruction {
        Instruction::Simple(_) => {
            if opcode.shape() != OperandShape::Implicit {
                return Err(malformed());
            }
            w.write_u1(opcode.into());
        }
        Instruction::Bipush(value) => {
            w.write_u1(opcode.into());
            w.write_i1(*value);
        }
        Instruction::Sipush(value) => {
            w.write_u1(opcode.into());
            w.write_i2(*value);
        }
        Instruction::Constant { index, .. } => match opcode.shape() {
            OperandShape::Constant1 => {
                let index = u8::try_from(*index).map_err(|_| {
                    ClassFileError::ConstantIndexTooWide {
                        offset,
                        index: *index,
                    }
                })?;
                w.write_u1(opcode.into());
                w.write_u1(index);
            }
            OperandShape::Constant2 => {
                w.write_u1(opcode.into());
                w.write_u2(*index);
            }
            _ => return Err(malformed()),
        },
        Instruction::Local { index, wide, .. } => {
            if opcode.shape() != OperandShape::Local {
                return Err(malformed());
            }
            if *wide {
                w.write_u1(Opcode::Wide.into());
                w.write_u1(opcode.into());
                w.write_u2(*index);
            } else {
                w.write_u1(opcode.into());
                w.write_u1(u8::try_from(*index).map_err(|_| malformed())?);
            }
        }
        Instruction::Iinc { index, delta, wide } => {
            if *wide {
                w.write_u1(Opcode::Wide.into());
                w.write_u1(opcode.into());
                w.write_u2(*index);
                w.write_i2(*delta);
            } else {
                w.write_u1(opcode.into());
                w.write_u1(u8::try_from(*index).map_err(|_| malformed())?);
                w.write_i1(i8::try_from(*delta).map_err(|_| malformed())?);
            }
        }
        Instruction::Branch { target, .. } => {
            let delta = relative_delta(pc, *target, offset)?;
            match opcode.shape() {
                OperandShape::Branch2 => {
                    let delta = i16::try_from(delta).map_err(|_| {
                        ClassFileError::BranchOutOfRange {
                            offset,
                            target: *target as i64,
                        }
                    })?;
                    w.write_u1(opcode.into());
                    w.write_i2(delta);
                }
                OperandShape::Branch4 => {
                    w.write_u1(opcode.into());
                    w.write_i4(delta);
                }
                _ => return Err(malformed()),
            }
        }
        Instruction::InvokeInterface { index, count } => {
            w.write_u1(opcode.into());
            w.write_u2(*index);
            w.write_u1(*count);
            w.write_u1(0);
        }
        Instruction::InvokeDynamic { index } => {
            w.write_u1(opcode.into());
            w.write_u2(*index);
            w.write_u2(0);
        }
        Instruction::MultiANewArray { index, dimensions } => {
            w.write_u1(opcode.into());
            w.write_u2(*index);
            w.write_u1(*dimensions);
        }
        Instruction::NewArray(atype) => {
            w.write_u1(opcode.into());
            w.write_u1((*atype).into());
        }
        Instruction::TableSwitch(table) => {
            if table.low > table.high
                || table.targets.len() as i64 != table.high as i64 - table.low as i64 + 1
            {
                return Err(ClassFileError::MalformedSwitchTable {
                    offset,
                    reason: "target count does not match low..=high",
                });
            }
            w.write_u1(opcode.into());
            write_padding(w, pc);
            w.write_i4(relative_delta(pc, table.default, offset)?);
            w.write_i4(table.low);
            w.write_i4(table.high);
            for target in &table.targets {
                w.write_i4(relative_delta(pc, *target, offset)?);
            }
        }
        Instruction::LookupSwitch(lookup) => {
            let npairs = i32::try_from(lookup.pairs.len()).map_err(|_| {
                ClassFileError::MalformedSwitchTable {
                    offset,
                    reason: "too many pairs",
                }
            })?;
            w.write_u1(opcode.into());
            write_padding(w, pc);
            w.write_i4(relative_delta(pc, lookup.default, offset)?);
            w.write_i4(npairs);
            for (key, target) in &lookup.pairs {
                w.write_i4(*key);
                w.write_i4(relative_delta(pc, *target, offset)?);
            }
        }
    }

    Ok(())
}

fn write_padding(w: &mut ByteWriter, pc: u32) {
    for _ in 0..switch_padding(pc) {
        w.write_u1(0);
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    fn decode(code: &[u8]) -> Result<Vec<(u32, Instruction)>> {
        decode_instructions(code, 0)
    }

    #[test]
    fn it_should_decode_implicit_and_immediate_operands() {
        assert_eq!(
            decode(&[0x2a, 0x10, 0xff, 0x11, 0x01, 0x00, 0xb1]).unwrap(),
            vec![
                (0, Instruction::Simple(Opcode::Aload0)),
                (1, Instruction::Bipush(-1)),
                (3, Instruction::Sipush(256)),
                (6, Instruction::Simple(Opcode::Return)),
            ]
        );
    }

    #[test]
    fn it_should_resolve_branch_offsets_to_absolute_targets() {
        // pc 10: goto +7
        let mut code = vec![0x00; 10];
        code.extend_from_slice(&[0xa7, 0x00, 0x07]);
        code.extend_from_slice(&[0x00; 4]);
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[10],
            (
                10,
                Instruction::Branch {
                    opcode: Opcode::Goto,
                    target: 17
                }
            )
        );
        assert_eq!(encode_instructions(&instructions).unwrap(), code);
    }

    #[test]
    fn it_should_resolve_backward_branches() {
        // pc 0: nop, pc 1: ifne -1
        assert_eq!(
            decode(&[0x00, 0x9a, 0xff, 0xff]).unwrap()[1].1,
            Instruction::Branch {
                opcode: Opcode::Ifne,
                target: 0
            }
        );
    }

    #[test]
    fn it_should_fail_on_branches_before_the_code_array() {
        assert_eq!(
            decode(&[0xa7, 0xff, 0xfe]),
            Err(ClassFileError::BranchOutOfRange {
                offset: 0,
                target: -2
            })
        );
    }

    #[test]
    fn it_should_align_table_switch_operands() {
        // pc 1: tableswitch, padding to pc 4, default +20, low 0, high 1, targets +16 +18
        let code = [
            0x00, // nop
            0xaa, 0x00, 0x00, // tableswitch + 2 padding bytes
            0x00, 0x00, 0x00, 0x14, // default
            0x00, 0x00, 0x00, 0x00, // low
            0x00, 0x00, 0x00, 0x01, // high
            0x00, 0x00, 0x00, 0x10, // 0
            0x00, 0x00, 0x00, 0x12, // 1
        ];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[1],
            (
                1,
                Instruction::TableSwitch(TableSwitch {
                    default: 21,
                    low: 0,
                    high: 1,
                    targets: vec![17, 19],
                })
            )
        );
        assert_eq!(instructions[1].1.len_at(1), code.len() - 1);
        assert_eq!(encode_instructions(&instructions).unwrap(), code.to_vec());
    }

    #[test]
    fn it_should_decode_lookup_switch_without_padding_at_an_aligned_pc() {
        // pc 3: lookupswitch, operands start at 4
        let code = [
            0x00, 0x00, 0x00, // nops
            0xab, // lookupswitch
            0x00, 0x00, 0x00, 0x19, // default +25
            0x00, 0x00, 0x00, 0x01, // npairs
            0xff, 0xff, 0xff, 0xfb, // -5
            0x00, 0x00, 0x00, 0x11, // +17
        ];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[3].1,
            Instruction::LookupSwitch(LookupSwitch {
                default: 28,
                pairs: vec![(-5, 20)],
            })
        );
        assert_eq!(encode_instructions(&instructions).unwrap(), code.to_vec());
    }

    #[test]
    fn it_should_reject_non_zero_switch_padding() {
        assert_eq!(
            decode(&[0xaa, 0x00, 0x01, 0x00]),
            Err(ClassFileError::MalformedSwitchTable {
                offset: 1,
                reason: "non-zero padding"
            })
        );
    }

    #[test]
    fn it_should_reject_inverted_table_bounds() {
        let code = [
            0xaa, 0x00, 0x00, 0x00, // tableswitch + padding
            0x00, 0x00, 0x00, 0x00, // default
            0x00, 0x00, 0x00, 0x02, // low
            0x00, 0x00, 0x00, 0x01, // high
        ];
        assert_eq!(
            decode(&code),
            Err(ClassFileError::MalformedSwitchTable {
                offset: 4,
                reason: "low exceeds high"
            })
        );
    }

    #[test]
    fn it_should_decode_wide_forms_as_one_instruction() {
        let code = [
            0xc4, 0x15, 0x01, 0x00, // wide iload 256
            0xc4, 0x84, 0x00, 0x05, 0xff, 0x00, // wide iinc 5 -256
        ];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions,
            vec![
                (
                    0,
                    Instruction::Local {
                        opcode: Opcode::Iload,
                        index: 256,
                        wide: true
                    }
                ),
                (
                    4,
                    Instruction::Iinc {
                        index: 5,
                        delta: -256,
                        wide: true
                    }
                ),
            ]
        );
        assert_eq!(encode_instructions(&instructions).unwrap(), code.to_vec());
    }

    #[test]
    fn it_should_keep_non_canonical_wide_forms() {
        let code = [0xc4, 0x3a, 0x00, 0x01];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions[0].1,
            Instruction::Local {
                opcode: Opcode::Astore,
                index: 1,
                wide: true
            }
        );
        assert_eq!(encode_instructions(&instructions).unwrap(), code.to_vec());
    }

    #[test]
    fn it_should_reject_wide_before_other_opcodes() {
        assert_eq!(
            decode(&[0xc4, 0x60]),
            Err(ClassFileError::UnknownOpcode {
                offset: 1,
                opcode: 0x60
            })
        );
    }

    #[test]
    fn it_should_fail_on_unknown_opcodes() {
        assert_eq!(
            decode(&[0x00, 0xca]),
            Err(ClassFileError::UnknownOpcode {
                offset: 1,
                opcode: 0xca
            })
        );
    }

    #[test]
    fn it_should_fail_on_truncated_operands() {
        assert_eq!(
            decode(&[0xb7, 0x00]),
            Err(ClassFileError::TruncatedInput {
                offset: 1,
                needed: 2
            })
        );
    }

    #[test]
    fn it_should_report_absolute_offsets() {
        assert_eq!(
            decode_instructions(&[0x00, 0xfe], 100),
            Err(ClassFileError::UnknownOpcode {
                offset: 101,
                opcode: 0xfe
            })
        );
    }

    #[test]
    fn it_should_decode_invoke_operands() {
        let code = [
            0xb9, 0x00, 0x07, 0x02, 0x00, // invokeinterface #7 count 2
            0xba, 0x00, 0x09, 0x00, 0x00, // invokedynamic #9
            0xc5, 0x00, 0x03, 0x02, // multianewarray #3 dim 2
            0xbc, 0x0a, // newarray int
        ];
        let instructions = decode(&code).unwrap();
        assert_eq!(
            instructions.iter().map(|(_, i)| i.clone()).collect::<Vec<_>>(),
            vec![
                Instruction::InvokeInterface { index: 7, count: 2 },
                Instruction::InvokeDynamic { index: 9 },
                Instruction::MultiANewArray {
                    index: 3,
                    dimensions: 2
                },
                Instruction::NewArray(ArrayType::Int),
            ]
        );
        assert_eq!(encode_instructions(&instructions).unwrap(), code.to_vec());
    }

    #[test]
    fn it_should_reject_non_zero_invokedynamic_padding() {
        assert_eq!(
            decode(&[0xba, 0x00, 0x09, 0x00, 0x01]),
            Err(ClassFileError::MalformedInstruction {
                offset: 0,
                opcode: 0xba
            })
        );
    }
}
