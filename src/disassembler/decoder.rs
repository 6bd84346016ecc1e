use crate::{
    disassembler::{
        instruction::{FlowType, Immediate, Operand, OperandType, RawInstruction},
        instructions::{lookup, unsupported_name},
    },
    metadata::Token,
    stream::parser::Parser,
    Error, Result,
};

/// Decodes a single instruction at the parser's current position.
///
/// Branch displacements are converted to absolute targets relative to the end of the
/// instruction, as ECMA-335 defines them.
///
/// # Arguments
/// * `parser` - Cursor positioned on the first opcode byte
///
/// # Errors
/// [`Error::UnsupportedInstruction`] for opcodes outside the supported subset,
/// [`Error::OutOfBounds`] if the operand is truncated.
///
/// # Examples
///
/// ```rust
/// use dotinline::{disassembler::decode_instruction, Parser};
///
/// // ldfld 0x04000002
/// let mut parser = Parser::new(&[0x7B, 0x02, 0x00, 0x00, 0x04]);
/// let instruction = decode_instruction(&mut parser)?;
/// assert_eq!(instruction.mnemonic, "ldfld");
/// assert_eq!(instruction.size, 5);
/// # Ok::<(), dotinline::Error>(())
/// ```
pub fn decode_instruction(parser: &mut Parser) -> Result<RawInstruction> {
    let offset = stream_offset(parser)?;
    let first_byte = parser.read_le::<u8>()?;

    let (prefix, opcode) = match first_byte {
        0xFE => (0xFE, parser.read_le::<u8>()?),
        _ => (0x00, first_byte),
    };

    let Some(info) = lookup(prefix, opcode) else {
        return Err(Error::UnsupportedInstruction {
            opcode: unsupported_name(prefix, opcode),
            offset,
        });
    };

    let operand = match info.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
    };
    let size = stream_offset(parser)? - offset;

    let mut instruction = RawInstruction {
        offset,
        size,
        opcode,
        prefix,
        mnemonic: info.mnemonic,
        kind: info.kind,
        flow_type: info.flow,
        operand,
        implicit: info.implicit.clone(),
        branch_targets: Vec::new(),
    };

    if matches!(
        instruction.flow_type,
        FlowType::ConditionalBranch | FlowType::UnconditionalBranch
    ) {
        if let Operand::Immediate(value) = instruction.operand {
            let next = i64::from(offset + size);
            let displacement = value
                .as_i64()
                .ok_or_else(|| malformed_error!("Branch displacement is not an integer"))?;
            let target = u32::try_from(next + displacement).map_err(|_| {
                malformed_error!(
                    "Branch at IL_{:04x} targets negative offset {}",
                    offset,
                    next + displacement
                )
            })?;
            instruction.branch_targets.push(target);
        }
    }

    Ok(instruction)
}

/// Decodes every instruction in the parser's remaining data.
///
/// # Errors
/// Propagates the first decoding error.
pub fn decode_stream(parser: &mut Parser) -> Result<Vec<RawInstruction>> {
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(parser)?);
    }

    Ok(instructions)
}

fn stream_offset(parser: &Parser) -> Result<u32> {
    u32::try_from(parser.pos()).map_err(|_| malformed_error!("Method body exceeds u32 range"))
}
