//! CIL instruction encoding for the supported subset.
//!
//! The encoder is the reverse of the decoder and shares its opcode table. Hosts use it to
//! build method bodies for in-memory metadata, and the test suites use it to assemble the
//! exact IL shapes a compiler emits.
//!
//! # Label Resolution
//!
//! ```rust
//! use dotinline::disassembler::InstructionEncoder;
//!
//! let mut encoder = InstructionEncoder::new();
//!
//! encoder.emit_instruction("ldarg.1", None)?;
//! encoder.emit_branch("brtrue.s", "one")?;
//! encoder.emit_instruction("ldc.i4.0", None)?;
//! encoder.emit_instruction("ret", None)?;
//! encoder.define_label("one")?;
//! encoder.emit_instruction("ldc.i4.1", None)?;
//! encoder.emit_instruction("ret", None)?;
//!
//! let bytecode = encoder.finalize()?;
//! assert_eq!(bytecode, vec![0x03, 0x2D, 0x02, 0x16, 0x2A, 0x17, 0x2A]);
//! # Ok::<(), dotinline::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    disassembler::{
        instruction::{FlowType, Immediate, Operand, OperandType},
        instructions::lookup_mnemonic,
    },
    metadata::Token,
    Error, Result,
};

/// A branch whose displacement is written once its label is known.
#[derive(Debug, Clone)]
struct LabelFixup {
    /// Target label name
    label: String,
    /// Position of the displacement bytes
    fixup_position: usize,
    /// Size of the displacement (1 or 4)
    offset_size: u8,
}

/// Assembles CIL bytecode from mnemonics.
///
/// # Examples
///
/// ```rust
/// use dotinline::{disassembler::InstructionEncoder, metadata::Token};
///
/// let mut encoder = InstructionEncoder::new();
/// encoder.emit_ldarg(0)?;
/// encoder.emit_token("ldfld", Token::new(0x0400_0001))?;
/// encoder.emit_instruction("ret", None)?;
///
/// assert_eq!(encoder.finalize()?, vec![0x02, 0x7B, 0x01, 0x00, 0x00, 0x04, 0x2A]);
/// # Ok::<(), dotinline::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
}

impl InstructionEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits an instruction with an optional inline operand.
    ///
    /// # Arguments
    /// * `mnemonic` - Instruction mnemonic (`"ldarg.0"`, `"ldc.i4.s"`, `"callvirt"`)
    /// * `operand` - Operand matching the instruction's operand type
    ///
    /// # Errors
    /// [`Error::InvalidMnemonic`] for mnemonics outside the supported subset,
    /// [`Error::WrongOperandType`] when the operand does not fit the instruction.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let info =
            lookup_mnemonic(mnemonic).ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))?;

        if info.prefix != 0 {
            self.bytecode.push(info.prefix);
        }
        self.bytecode.push(info.code);
        self.emit_operand(operand, info.op_type)
    }

    /// Emits an instruction whose operand is a metadata token.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_token(&mut self, mnemonic: &str, token: Token) -> Result<()> {
        self.emit_instruction(mnemonic, Some(Operand::Token(token)))
    }

    /// Emits a branch to `label`. The displacement is filled in by
    /// [`InstructionEncoder::finalize`].
    ///
    /// # Errors
    /// [`Error::InvalidMnemonic`] for unknown mnemonics or instructions that do not branch.
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let info =
            lookup_mnemonic(mnemonic).ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))?;

        if !matches!(
            info.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        ) {
            return Err(Error::InvalidMnemonic(format!(
                "{mnemonic} is not a branch instruction"
            )));
        }

        let offset_size = match info.op_type {
            OperandType::Int8 => 1,
            OperandType::Int32 => 4,
            other => {
                return Err(Error::WrongOperandType {
                    expected: format!("{other:?}"),
                })
            }
        };

        self.bytecode.push(info.code);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
        });
        self.bytecode
            .extend(std::iter::repeat(0).take(usize::from(offset_size)));

        Ok(())
    }

    /// Emits `ldarg` in its most compact form.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        self.emit_indexed(["ldarg.0", "ldarg.1", "ldarg.2", "ldarg.3"], "ldarg.s", "ldarg", index)
    }

    /// Emits `ldloc` in its most compact form.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        self.emit_indexed(["ldloc.0", "ldloc.1", "ldloc.2", "ldloc.3"], "ldloc.s", "ldloc", index)
    }

    /// Emits `stloc` in its most compact form.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        self.emit_indexed(["stloc.0", "stloc.1", "stloc.2", "stloc.3"], "stloc.s", "stloc", index)
    }

    /// Emits an `int32` constant load in its most compact form.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        match value {
            -1 => self.emit_instruction("ldc.i4.m1", None),
            0 => self.emit_instruction("ldc.i4.0", None),
            1 => self.emit_instruction("ldc.i4.1", None),
            2 => self.emit_instruction("ldc.i4.2", None),
            3 => self.emit_instruction("ldc.i4.3", None),
            4 => self.emit_instruction("ldc.i4.4", None),
            5 => self.emit_instruction("ldc.i4.5", None),
            6 => self.emit_instruction("ldc.i4.6", None),
            7 => self.emit_instruction("ldc.i4.7", None),
            8 => self.emit_instruction("ldc.i4.8", None),
            x => match i8::try_from(x) {
                Ok(short) => {
                    self.emit_instruction("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(short))))
                }
                Err(_) => self.emit_instruction("ldc.i4", Some(Operand::Immediate(Immediate::Int32(x)))),
            },
        }
    }

    /// Defines `name` at the current position.
    ///
    /// # Errors
    /// [`Error::DuplicateLabel`] if the label already exists.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }

        let position = self.current_position()?;
        self.labels.insert(name.to_string(), position);
        Ok(())
    }

    /// Resolves every branch and returns the bytecode.
    ///
    /// # Errors
    /// [`Error::UndefinedLabel`] for branches to labels never defined,
    /// [`Error::Malformed`] when a short branch cannot reach its label.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let label_position = self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let next_instruction = fixup.fixup_position + usize::from(fixup.offset_size);
            let label_pos = i64::from(*label_position);
            let next_pos = i64::try_from(next_instruction)
                .map_err(|_| malformed_error!("Instruction position exceeds i64 range"))?;
            let offset = label_pos - next_pos;

            let start = fixup.fixup_position;
            if fixup.offset_size == 1 {
                let short = i8::try_from(offset).map_err(|_| {
                    malformed_error!(
                        "Branch to '{}' needs offset {}, out of range for a short form",
                        fixup.label,
                        offset
                    )
                })?;
                self.bytecode[start] = short.to_le_bytes()[0];
            } else {
                let long = i32::try_from(offset)
                    .map_err(|_| malformed_error!("Branch offset {} exceeds i32 range", offset))?;
                self.bytecode[start..start + 4].copy_from_slice(&long.to_le_bytes());
            }
        }

        Ok(self.bytecode)
    }

    fn emit_indexed(
        &mut self,
        short: [&str; 4],
        byte_form: &str,
        long_form: &str,
        index: u16,
    ) -> Result<()> {
        if let Some(mnemonic) = short.get(usize::from(index)) {
            return self.emit_instruction(mnemonic, None);
        }
        match u8::try_from(index) {
            Ok(byte) => {
                self.emit_instruction(byte_form, Some(Operand::Immediate(Immediate::UInt8(byte))))
            }
            Err(_) => {
                self.emit_instruction(long_form, Some(Operand::Immediate(Immediate::UInt16(index))))
            }
        }
    }

    fn current_position(&self) -> Result<u32> {
        u32::try_from(self.bytecode.len())
            .map_err(|_| malformed_error!("Bytecode length exceeds u32 range"))
    }

    fn emit_operand(&mut self, operand: Option<Operand>, expected: OperandType) -> Result<()> {
        let wrong = || Error::WrongOperandType {
            expected: format!("{expected:?}"),
        };

        match (expected, operand) {
            (OperandType::None, None) => {}
            (OperandType::Int8, Some(Operand::Immediate(Immediate::Int8(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt8, Some(Operand::Immediate(Immediate::UInt8(val)))) => {
                self.bytecode.push(val);
            }
            (OperandType::UInt16, Some(Operand::Immediate(Immediate::UInt16(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int32, Some(Operand::Immediate(Immediate::Int32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int64, Some(Operand::Immediate(Immediate::Int64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Float32, Some(Operand::Immediate(Immediate::Float32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Float64, Some(Operand::Immediate(Immediate::Float64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Token, Some(Operand::Token(token))) => {
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            _ => return Err(wrong()),
        }

        Ok(())
    }
}
