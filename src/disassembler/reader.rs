use std::collections::HashSet;

use crate::{
    disassembler::{
        decoder::decode_stream,
        instruction::{
            Immediate, Implicit, Instruction, OpKind, Operand, RawInstruction, ResolvedOperand,
        },
    },
    metadata::{MetadataResolver, Token},
    stream::parser::Parser,
    Result,
};

/// Reads a method body into resolved instructions.
///
/// Every field, method, type and string token is resolved through `resolver`, short forms
/// are folded into their long-form operation with the implied operand made explicit, and
/// every branch displacement is replaced by its absolute target. The reader has no side
/// effects.
///
/// # Arguments
/// * `code` - CIL instruction bytes of one method
/// * `resolver` - Metadata lookup for operand tokens
///
/// # Errors
/// - [`crate::Error::UnsupportedInstruction`] for opcodes outside the supported subset
/// - [`crate::Error::UnresolvedToken`] / [`crate::Error::AmbiguousMemberResolution`] from
///   the resolver
/// - [`crate::Error::Malformed`] when a branch lands between instructions
///
/// # Examples
///
/// ```rust
/// use dotinline::{
///     disassembler::{read_method, OpKind, ResolvedOperand},
///     metadata::MetadataTable,
/// };
///
/// let table = MetadataTable::new();
/// // ldarg.1 ; ldc.i4.s 10 ; add ; ret
/// let instructions = read_method(&[0x03, 0x1F, 0x0A, 0x58, 0x2A], &table)?;
/// assert_eq!(instructions[0].operand, ResolvedOperand::Index(1));
/// assert_eq!(instructions[1].kind, OpKind::LdcI4);
/// assert_eq!(instructions[1].operand, ResolvedOperand::Int32(10));
/// # Ok::<(), dotinline::Error>(())
/// ```
pub fn read_method(code: &[u8], resolver: &dyn MetadataResolver) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let raw = decode_stream(&mut parser)?;

    let starts = raw.iter().map(|i| i.offset).collect::<HashSet<_>>();
    let mut instructions = Vec::with_capacity(raw.len());
    for instruction in &raw {
        for target in &instruction.branch_targets {
            if !starts.contains(target) {
                return Err(malformed_error!(
                    "Branch at IL_{:04x} targets IL_{:04x}, which is not an instruction boundary",
                    instruction.offset,
                    target
                ));
            }
        }

        let operand = resolve_operand(instruction, resolver)?;
        log::trace!("IL_{:04x}: {} {:?}", instruction.offset, instruction.mnemonic, operand);
        instructions.push(Instruction {
            offset: instruction.offset,
            size: instruction.size,
            kind: instruction.kind,
            operand,
        });
    }

    Ok(instructions)
}

fn resolve_operand(
    instruction: &RawInstruction,
    resolver: &dyn MetadataResolver,
) -> Result<ResolvedOperand> {
    if let Some(target) = instruction.branch_targets.first() {
        return Ok(ResolvedOperand::Target(*target));
    }

    match (&instruction.implicit, &instruction.operand) {
        (Implicit::Index(index), _) => return Ok(ResolvedOperand::Index(*index)),
        (Implicit::Int(value), _) => return Ok(ResolvedOperand::Int32(*value)),
        (Implicit::Type(ty), _) => return Ok(ResolvedOperand::Type(ty.clone())),
        (Implicit::None, _) => {}
    }

    let resolved = match &instruction.operand {
        Operand::None => ResolvedOperand::None,
        Operand::Immediate(immediate) => match (instruction.kind, *immediate) {
            (
                OpKind::Ldarg | OpKind::Ldarga | OpKind::Ldloc | OpKind::Ldloca | OpKind::Stloc,
                Immediate::UInt8(index),
            ) => ResolvedOperand::Index(u16::from(index)),
            (
                OpKind::Ldarg | OpKind::Ldarga | OpKind::Ldloc | OpKind::Ldloca | OpKind::Stloc,
                Immediate::UInt16(index),
            ) => ResolvedOperand::Index(index),
            (_, Immediate::Int8(value)) => ResolvedOperand::Int32(i32::from(value)),
            (_, Immediate::Int32(value)) => ResolvedOperand::Int32(value),
            (_, Immediate::Int64(value)) => ResolvedOperand::Int64(value),
            (_, Immediate::Float32(value)) => ResolvedOperand::Float32(value),
            (_, Immediate::Float64(value)) => ResolvedOperand::Float64(value),
            (kind, other) => {
                return Err(malformed_error!(
                    "Unexpected immediate {:?} for {}",
                    other,
                    kind
                ))
            }
        },
        Operand::Token(token) => resolve_token(instruction.kind, *token, resolver)?,
    };

    Ok(resolved)
}

fn resolve_token(
    kind: OpKind,
    token: Token,
    resolver: &dyn MetadataResolver,
) -> Result<ResolvedOperand> {
    Ok(match kind {
        OpKind::Ldfld | OpKind::Ldflda | OpKind::Ldsfld | OpKind::Ldsflda => {
            ResolvedOperand::Field(resolver.resolve_field(token)?)
        }
        OpKind::Call | OpKind::Callvirt => ResolvedOperand::Method(resolver.resolve_method(token)?),
        OpKind::Ldstr => ResolvedOperand::String(resolver.resolve_string(token)?),
        OpKind::Box
        | OpKind::UnboxAny
        | OpKind::Castclass
        | OpKind::Newarr
        | OpKind::Constrained => ResolvedOperand::Type(resolver.resolve_type(token)?),
        other => {
            return Err(malformed_error!(
                "Token operand {} on {}",
                token,
                other
            ))
        }
    })
}
