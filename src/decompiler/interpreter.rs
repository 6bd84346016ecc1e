//! Symbolic execution of a method body.
//!
//! The interpreter walks the blocks of a [`ControlFlow`] with a [`SymbolicFrame`] whose stack
//! holds expression trees. Straight-line instructions pop their operands and push the node
//! they denote. At a conditional branch both arms are interpreted separately up to their join
//! point and the two resulting values (or frames) are handed to [`reconstruct`], which reads
//! them as `&&`, `||`, `?:` or `??`. No constant is ever evaluated: `1 + 2` stays a tree.
//!
//! Before the arms are evaluated, chains of blocks that only test the entry frame are folded
//! into one compound condition, so a tail shared by several clauses of `(a || b) && c` is read
//! once instead of once per path.

use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
};

use crate::{
    decompiler::{
        flow::ControlFlow,
        frame::SymbolicFrame,
        idioms::{coerce_to, connective, invert, negate, reconstruct, value_of, Guard},
    },
    disassembler::{Instruction, OpKind, ResolvedOperand},
    expression::{BinaryOp, ConstValue, Expr, ParameterExpr, UnaryOp},
    metadata::{MethodRc, MethodRef, TypeSignature},
    Error, Result,
};

/// Decides whether a call site is replaced by the callee's decompiled body.
///
/// The [`crate::decompiler::Decompiler`] supplies an implementation that expands calls to
/// registered members while a body is being read.
pub trait CallInliner {
    /// Returns the inlined expression for `method` applied to `args` (receiver first), or
    /// `None` to keep the call.
    ///
    /// # Errors
    /// Failures decompiling the callee propagate and fail the caller.
    fn try_inline(&self, method: &MethodRc, args: &[Expr]) -> Result<Option<Expr>>;
}

/// A [`CallInliner`] that never inlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInlining;

impl CallInliner for NoInlining {
    fn try_inline(&self, _method: &MethodRc, _args: &[Expr]) -> Result<Option<Expr>> {
        Ok(None)
    }
}

/// Instructions the interpreter may step per instruction of the body before giving up.
const WORK_PER_INSTRUCTION: usize = 64;

enum Flow {
    Returned(Expr),
    Reached(SymbolicFrame),
}

/// A conditional branch, possibly folded from several condition blocks.
#[derive(Debug, Clone)]
struct Branch {
    guard: Guard,
    jump: usize,
    fall: usize,
}

impl Branch {
    fn compound(value: Expr, jump: usize, fall: usize, offset: u32) -> Self {
        Branch {
            guard: Guard {
                value,
                jump_when: true,
                offset,
            },
            jump,
            fall,
        }
    }
}

type Conditions = HashMap<usize, Option<Branch>>;

/// Interprets one method body.
pub struct Interpreter<'a> {
    instructions: &'a [Instruction],
    flow: ControlFlow,
    method: &'a MethodRef,
    params: &'a [ParameterExpr],
    locals: &'a [TypeSignature],
    inliner: &'a dyn CallInliner,
    work: Cell<usize>,
}

impl<'a> Interpreter<'a> {
    /// Prepares the interpretation of `instructions`.
    ///
    /// `params` are the formals in argument order, `this` first for instance methods.
    ///
    /// # Errors
    /// Any error raised while building the control flow of the body.
    pub fn new(
        instructions: &'a [Instruction],
        method: &'a MethodRef,
        params: &'a [ParameterExpr],
        locals: &'a [TypeSignature],
        inliner: &'a dyn CallInliner,
    ) -> Result<Self> {
        Ok(Interpreter {
            instructions,
            flow: ControlFlow::build(instructions)?,
            method,
            params,
            locals,
            inliner,
            work: Cell::new(0),
        })
    }

    /// Returns the expression the body computes.
    ///
    /// # Errors
    /// - [`Error::UnsupportedInstruction`] for instructions without an expression meaning
    /// - [`Error::UnsupportedControlFlow`] for branch shapes outside the known idioms
    /// - [`Error::StackUnderflow`] for inconsistent stack usage
    pub fn evaluate(&self) -> Result<Expr> {
        match self.run(0, None, SymbolicFrame::new())? {
            Flow::Returned(expr) => Ok(expr),
            Flow::Reached(_) => Err(control_flow_error!(0, "body does not return a value")),
        }
    }

    fn run(&self, mut block: usize, stop: Option<usize>, mut frame: SymbolicFrame) -> Result<Flow> {
        'blocks: loop {
            if Some(block) == stop {
                return Ok(Flow::Reached(frame));
            }
            let current = self
                .flow
                .block(block)
                .ok_or_else(|| malformed_error!("Block {} does not exist", block))?;

            for instruction in &self.instructions[current.start..current.end] {
                match instruction.kind {
                    OpKind::Ret => {
                        let value = frame.pop(instruction.offset)?;
                        return Ok(Flow::Returned(coerce_to(value, &self.method.return_type)));
                    }
                    OpKind::Br => {
                        block = self.target_block(instruction)?;
                        continue 'blocks;
                    }
                    _ if instruction.is_conditional_branch() => {
                        let join = self.flow.join_point(block);
                        let until = (join != self.flow.exit()).then_some(join);
                        let mut branch = Branch {
                            guard: self.guard(instruction, &mut frame)?,
                            jump: self.target_block(instruction)?,
                            fall: block + 1,
                        };
                        self.extend(&mut branch, join, &frame, &mut HashMap::new());
                        let guard = branch.guard;

                        let jump = self.run(branch.jump, until, frame.clone())?;
                        let fall = self.run(branch.fall, until, frame)?;

                        match (jump, fall) {
                            (Flow::Returned(jump), Flow::Returned(fall)) => {
                                let ret = &self.method.return_type;
                                let value = reconstruct(&guard, jump, fall, Some(ret))?;
                                return Ok(Flow::Returned(coerce_to(value, ret)));
                            }
                            (Flow::Reached(jump), Flow::Reached(fall)) => {
                                frame = self.merge(&guard, jump, fall)?;
                                block = join;
                                continue 'blocks;
                            }
                            _ => {
                                return Err(control_flow_error!(
                                    instruction.offset,
                                    "one arm returns while the other continues"
                                ))
                            }
                        }
                    }
                    _ => self.step(instruction, &mut frame)?,
                }
            }

            block += 1;
        }
    }

    fn target_block(&self, instruction: &Instruction) -> Result<usize> {
        instruction
            .target()
            .and_then(|target| self.flow.block_at(target))
            .ok_or_else(|| malformed_error!("Branch at IL_{:04x} has no target", instruction.offset))
    }

    fn guard(&self, instruction: &Instruction, frame: &mut SymbolicFrame) -> Result<Guard> {
        let offset = instruction.offset;
        let (value, jump_when) = match instruction.kind {
            OpKind::Brtrue => (frame.pop(offset)?, true),
            OpKind::Brfalse => (frame.pop(offset)?, false),
            kind => {
                let op = match kind {
                    OpKind::Beq => BinaryOp::Equal,
                    OpKind::BneUn => BinaryOp::NotEqual,
                    OpKind::Bge | OpKind::BgeUn => BinaryOp::GreaterThanOrEqual,
                    OpKind::Bgt | OpKind::BgtUn => BinaryOp::GreaterThan,
                    OpKind::Ble | OpKind::BleUn => BinaryOp::LessThanOrEqual,
                    OpKind::Blt | OpKind::BltUn => BinaryOp::LessThan,
                    other => {
                        return Err(Error::UnsupportedInstruction {
                            opcode: other.to_string(),
                            offset,
                        })
                    }
                };
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                (compare(op, left, right), true)
            }
        };

        Ok(Guard {
            value,
            jump_when,
            offset,
        })
    }

    /// Folds the condition blocks that follow `branch` into its guard.
    ///
    /// A condition block tests values computed from `frame` and leaves it unchanged, so
    /// `a || b` lowered as `brtrue T ; b ; brfalse F ; T:` reads as one branch on
    /// `Not(a) AndAlso Not(b)` to `F`. Folding stops at `join`.
    fn extend(
        &self,
        branch: &mut Branch,
        join: usize,
        frame: &SymbolicFrame,
        seen: &mut Conditions,
    ) {
        let offset = branch.guard.offset;
        loop {
            let taken = branch.guard.condition();

            if let Some(next) = self.condition(branch.fall, join, frame, seen) {
                let then = next.guard.condition();
                if next.jump == branch.jump {
                    let value = connective(BinaryOp::OrElse, taken, then);
                    *branch = Branch::compound(value, next.jump, next.fall, offset);
                    continue;
                }
                if next.fall == branch.jump {
                    let value = connective(BinaryOp::AndAlso, invert(taken), then);
                    *branch = Branch::compound(value, next.jump, next.fall, offset);
                    continue;
                }
            }

            if let Some(next) = self.condition(branch.jump, join, frame, seen) {
                let then = next.guard.condition();
                if next.fall == branch.fall {
                    let value = connective(BinaryOp::AndAlso, taken, then);
                    *branch = Branch::compound(value, next.jump, branch.fall, offset);
                    continue;
                }
                if next.jump == branch.fall {
                    let value = connective(BinaryOp::AndAlso, taken, invert(then));
                    *branch = Branch::compound(value, next.fall, branch.fall, offset);
                    continue;
                }
            }

            return;
        }
    }

    /// The folded branch starting at `block` when it is a condition block.
    fn condition(
        &self,
        block: usize,
        join: usize,
        frame: &SymbolicFrame,
        seen: &mut Conditions,
    ) -> Option<Branch> {
        if block == join {
            return None;
        }
        if let Some(known) = seen.get(&block) {
            return known.clone();
        }

        let mut branch = self.test_block(block, frame);
        if let Some(branch) = branch.as_mut() {
            self.extend(branch, join, frame, seen);
        }
        seen.insert(block, branch.clone());
        branch
    }

    /// Reads `block` as a single test of `frame`.
    fn test_block(&self, block: usize, frame: &SymbolicFrame) -> Option<Branch> {
        let current = self.flow.block(block)?;
        let (last, body) = self.instructions[current.start..current.end].split_last()?;
        if !last.is_conditional_branch() {
            return None;
        }

        // Errors surface again when the block is interpreted as an arm.
        let mut probe = frame.clone();
        for instruction in body {
            self.step(instruction, &mut probe).ok()?;
        }
        let guard = self.guard(last, &mut probe).ok()?;
        if probe != *frame {
            return None;
        }

        Some(Branch {
            guard,
            jump: self.target_block(last).ok()?,
            fall: block + 1,
        })
    }

    /// Joins the frames two arms left at their common successor.
    fn merge(&self, guard: &Guard, jump: SymbolicFrame, fall: SymbolicFrame) -> Result<SymbolicFrame> {
        if jump.depth() != fall.depth() {
            return Err(control_flow_error!(
                guard.offset,
                "arms leave {} and {} values on the stack",
                jump.depth(),
                fall.depth()
            ));
        }

        let stack = jump
            .stack()
            .iter()
            .zip(fall.stack())
            .map(|(j, f)| {
                if j == f {
                    Ok(j.clone())
                } else {
                    reconstruct(guard, j.clone(), f.clone(), None)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut locals = BTreeMap::new();
        for (slot, j) in jump.locals() {
            // A local assigned on one arm only has no value after the join.
            let Some(f) = fall.locals().get(slot) else {
                continue;
            };
            let value = if j == f {
                j.clone()
            } else {
                reconstruct(guard, j.clone(), f.clone(), self.locals.get(usize::from(*slot)))?
            };
            locals.insert(*slot, value);
        }

        Ok(SymbolicFrame::from_parts(stack, locals))
    }

    fn step(&self, instruction: &Instruction, frame: &mut SymbolicFrame) -> Result<()> {
        let offset = instruction.offset;
        let unsupported = || Error::UnsupportedInstruction {
            opcode: instruction.kind.to_string(),
            offset,
        };

        let work = self.work.get() + 1;
        if work > self.instructions.len().saturating_mul(WORK_PER_INSTRUCTION) {
            return Err(control_flow_error!(
                offset,
                "branch arms repeat the body more than {} times",
                WORK_PER_INSTRUCTION
            ));
        }
        self.work.set(work);

        match (instruction.kind, &instruction.operand) {
            (OpKind::Nop | OpKind::Constrained, _) => {}
            (OpKind::Ldarg | OpKind::Ldarga, ResolvedOperand::Index(index)) => {
                let param = self
                    .params
                    .get(usize::from(*index))
                    .ok_or_else(|| malformed_error!("Argument {} does not exist", index))?;
                frame.push(param.expr());
            }
            (OpKind::Ldloc | OpKind::Ldloca, ResolvedOperand::Index(index)) => {
                frame.push(frame.load(*index, offset)?);
            }
            (OpKind::Stloc, ResolvedOperand::Index(index)) => {
                let value = frame.pop(offset)?;
                let value = match self.locals.get(usize::from(*index)) {
                    Some(ty) => coerce_to(value, ty),
                    None => value,
                };
                frame.store(*index, value);
            }
            (OpKind::Ldnull, _) => frame.push(Expr::null()),
            (OpKind::LdcI4, ResolvedOperand::Int32(value)) => frame.push(Expr::int(*value)),
            (OpKind::LdcI8, ResolvedOperand::Int64(value)) => {
                frame.push(Expr::constant(ConstValue::I64(*value)));
            }
            (OpKind::LdcR4, ResolvedOperand::Float32(value)) => {
                frame.push(Expr::constant(ConstValue::F32(*value)));
            }
            (OpKind::LdcR8, ResolvedOperand::Float64(value)) => {
                frame.push(Expr::constant(ConstValue::F64(*value)));
            }
            (OpKind::Ldstr, ResolvedOperand::String(value)) => {
                frame.push(Expr::constant(ConstValue::String(value.clone())));
            }
            (OpKind::Dup, _) => {
                let top = frame.peek(offset)?.clone();
                frame.push(top);
            }
            (OpKind::Pop, _) => {
                frame.pop(offset)?;
            }
            (
                kind @ (OpKind::Add
                | OpKind::Sub
                | OpKind::Mul
                | OpKind::Div
                | OpKind::DivUn
                | OpKind::Rem
                | OpKind::RemUn
                | OpKind::And
                | OpKind::Or
                | OpKind::Xor
                | OpKind::Shl
                | OpKind::Shr
                | OpKind::ShrUn),
                _,
            ) => {
                let op = arithmetic(kind).ok_or_else(unsupported)?;
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                frame.push(Expr::binary(op, left, right));
            }
            (OpKind::Neg, _) => {
                let operand = frame.pop(offset)?;
                frame.push(Expr::unary(UnaryOp::Negate, operand));
            }
            (OpKind::Not, _) => {
                let operand = frame.pop(offset)?;
                frame.push(Expr::not(operand));
            }
            (OpKind::Ceq, _) => {
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                let against_zero = matches!(
                    right,
                    Expr::Constant(ConstValue::I32(0) | ConstValue::Bool(false))
                );
                if against_zero && left.ty().is_boolean() {
                    frame.push(negate(left));
                } else {
                    frame.push(compare(BinaryOp::Equal, left, right));
                }
            }
            (OpKind::Cgt | OpKind::CgtUn, _) => {
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                if instruction.kind == OpKind::CgtUn
                    && matches!(right, Expr::Constant(ConstValue::Null))
                {
                    frame.push(Expr::binary(BinaryOp::NotEqual, left, right));
                } else {
                    frame.push(compare(BinaryOp::GreaterThan, left, right));
                }
            }
            (OpKind::Clt | OpKind::CltUn, _) => {
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                frame.push(compare(BinaryOp::LessThan, left, right));
            }
            (OpKind::Conv, ResolvedOperand::Type(ty)) => {
                let operand = frame.pop(offset)?;
                frame.push(Expr::convert(operand, ty.clone()));
            }
            (OpKind::Box, ResolvedOperand::Type(ty)) => {
                let operand = coerce_to(frame.pop(offset)?, ty);
                frame.push(Expr::convert(operand, TypeSignature::Object));
            }
            (OpKind::UnboxAny | OpKind::Castclass, ResolvedOperand::Type(ty)) => {
                let operand = frame.pop(offset)?;
                frame.push(Expr::convert(operand, ty.clone()));
            }
            (OpKind::Ldfld | OpKind::Ldflda, ResolvedOperand::Field(field)) => {
                let target = frame.pop(offset)?;
                frame.push(Expr::field(Some(target), field.clone()));
            }
            (OpKind::Ldsfld | OpKind::Ldsflda, ResolvedOperand::Field(field)) => {
                frame.push(Expr::field(None, field.clone()));
            }
            (OpKind::Newarr, ResolvedOperand::Type(ty)) => {
                // Every element needs its own stelem.ref later in the body.
                let length = match frame.pop(offset)? {
                    Expr::Constant(ConstValue::I32(length)) => usize::try_from(length)
                        .ok()
                        .filter(|&length| length <= self.instructions.len())
                        .ok_or_else(unsupported)?,
                    _ => return Err(unsupported()),
                };
                frame.push(Expr::NewArray {
                    element_type: ty.clone(),
                    items: vec![Expr::null(); length],
                });
            }
            (OpKind::StelemRef, _) => {
                let value = frame.pop(offset)?;
                let index = frame.pop(offset)?;
                frame.pop(offset)?;

                let Expr::Constant(ConstValue::I32(index)) = index else {
                    return Err(unsupported());
                };
                let Expr::NewArray { items, .. } = frame.peek_mut(offset)? else {
                    return Err(unsupported());
                };
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|index| items.get_mut(index))
                    .ok_or_else(unsupported)?;
                *slot = value;
            }
            (OpKind::Call | OpKind::Callvirt, ResolvedOperand::Method(method)) => {
                if method.return_type == TypeSignature::Void {
                    return Err(unsupported());
                }

                let count = method.params.len() + usize::from(method.has_this());
                let args = frame
                    .pop_n(count, offset)?
                    .into_iter()
                    .enumerate()
                    .map(|(index, arg)| match method.arg_type(index) {
                        Some(ty) => coerce_to(arg, &ty),
                        None => arg,
                    })
                    .collect::<Vec<_>>();

                let value = match self.inliner.try_inline(method, &args)? {
                    Some(inlined) => inlined,
                    None => lower_call(method, args),
                };
                frame.push(value);
            }
            _ => return Err(unsupported()),
        }

        log::trace!("{} -> depth {}", instruction, frame.depth());
        Ok(())
    }
}

fn arithmetic(kind: OpKind) -> Option<BinaryOp> {
    Some(match kind {
        OpKind::Add => BinaryOp::Add,
        OpKind::Sub => BinaryOp::Subtract,
        OpKind::Mul => BinaryOp::Multiply,
        OpKind::Div | OpKind::DivUn => BinaryOp::Divide,
        OpKind::Rem | OpKind::RemUn => BinaryOp::Modulo,
        OpKind::And => BinaryOp::And,
        OpKind::Or => BinaryOp::Or,
        OpKind::Xor => BinaryOp::ExclusiveOr,
        OpKind::Shl => BinaryOp::LeftShift,
        OpKind::Shr | OpKind::ShrUn => BinaryOp::RightShift,
        _ => return None,
    })
}

/// A comparison, with `int32` constants read at the type of the other operand.
fn compare(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let left_ty = left.ty();
    let right_ty = right.ty();
    Expr::binary(op, coerce_to(left, &right_ty), coerce_to(right, &left_ty))
}

/// The expression for a call that is not inlined.
fn lower_call(method: &MethodRc, args: Vec<Expr>) -> Expr {
    let name = method.name.as_str();

    if method.declaring_type == TypeSignature::String && name == "Concat" {
        if let Some(concat) = concat(&args) {
            return concat;
        }
    }

    if method.is_static() {
        if let (Some(op), [left, right]) = (BinaryOp::from_operator_method(name), args.as_slice()) {
            return Expr::binary(op, left.clone(), right.clone());
        }
        if let ("op_Implicit" | "op_Explicit", [operand]) = (name, args.as_slice()) {
            return Expr::convert(operand.clone(), method.return_type.clone());
        }
    }

    if let (Some(underlying), "GetValueOrDefault") =
        (method.declaring_type.nullable_underlying(), name)
    {
        match args.as_slice() {
            [nullable] => {
                let fallback = ConstValue::default_for(underlying).unwrap_or(ConstValue::Null);
                return Expr::coalesce(nullable.clone(), Expr::constant(fallback));
            }
            [nullable, fallback] => {
                return Expr::coalesce(nullable.clone(), coerce_to(fallback.clone(), underlying));
            }
            _ => {}
        }
    }

    if method.property_name().is_some() {
        match (method.has_this(), args.as_slice()) {
            (true, [target]) => {
                if method.declaring_type.is_nullable() && name == "get_Value" {
                    return value_of(target);
                }
                return Expr::property(Some(target.clone()), method.clone());
            }
            (false, []) => return Expr::property(None, method.clone()),
            _ => {}
        }
    }

    let mut args = args;
    if method.has_this() && !args.is_empty() {
        let target = args.remove(0);
        Expr::call(Some(target), method.clone(), args)
    } else {
        Expr::call(None, method.clone(), args)
    }
}

/// `String.Concat` as a left-associated chain of `+`.
fn concat(args: &[Expr]) -> Option<Expr> {
    let parts = match args {
        [Expr::NewArray { items, .. }] => items.as_slice(),
        parts if (2..=4).contains(&parts.len()) => parts,
        _ => return None,
    };

    let (first, rest) = parts.split_first()?;
    Some(rest.iter().fold(first.clone(), |acc, part| {
        Expr::binary(BinaryOp::Add, acc, part.clone())
    }))
}

/// Builds the formals of `method`: `this` first for instance methods, then the declared
/// parameters.
#[must_use]
pub fn formals(method: &MethodRef) -> Vec<ParameterExpr> {
    let receiver = method
        .has_this()
        .then(|| ParameterExpr::new("this", method.declaring_type.clone()));
    receiver
        .into_iter()
        .chain(
            method
                .params
                .iter()
                .map(|p| ParameterExpr::new(&p.name, p.param_type.clone())),
        )
        .collect()
}

/// Convenience for reading a method whose body has already been decoded.
///
/// # Errors
/// See [`Interpreter::evaluate`].
pub fn interpret(
    instructions: &[Instruction],
    method: &MethodRef,
    params: &[ParameterExpr],
    locals: &[TypeSignature],
    inliner: &dyn CallInliner,
) -> Result<Expr> {
    Interpreter::new(instructions, method, params, locals, inliner)?.evaluate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::{read_method, InstructionEncoder},
        metadata::{FieldRef, MetadataTable, MethodFlags},
    };

    struct Fixture {
        table: MetadataTable,
        employee: TypeSignature,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                table: MetadataTable::new(),
                employee: TypeSignature::class("Employee"),
            }
        }

        fn run(
            &self,
            method: &MethodRef,
            locals: &[TypeSignature],
            build: impl FnOnce(&mut InstructionEncoder) -> Result<()>,
        ) -> Result<Expr> {
            let mut encoder = InstructionEncoder::new();
            build(&mut encoder)?;
            let code = encoder.finalize()?;
            let instructions = read_method(&code, &self.table)?;
            let params = formals(method);
            interpret(&instructions, method, &params, locals, &NoInlining)
        }
    }

    #[test]
    fn test_string_concatenation_chain() {
        let mut fx = Fixture::new();
        let first = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "FirstName", TypeSignature::String));
        let last = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "LastName", TypeSignature::String));
        let space = fx.table.add_string(" ");
        let concat = fx.table.add_method(
            MethodRef::new(TypeSignature::String, "Concat")
                .param("a", TypeSignature::String)
                .param("b", TypeSignature::String)
                .param("c", TypeSignature::String)
                .returns(TypeSignature::String)
                .with_flags(MethodFlags::STATIC),
        );
        let getter = MethodRef::getter(fx.employee.clone(), "FullName", TypeSignature::String);

        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", first.token)?;
                e.emit_token("ldstr", space)?;
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", last.token)?;
                e.emit_token("call", concat.token)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();

        assert_eq!(body.to_string(), "((this.FirstName + \" \") + this.LastName)");
    }

    #[test]
    fn test_no_constant_folding() {
        let fx = Fixture::new();
        let method = MethodRef::new(fx.employee.clone(), "Three")
            .returns(TypeSignature::I4)
            .with_flags(MethodFlags::STATIC);
        let body = fx
            .run(&method, &[], |e| {
                e.emit_ldc_i4(1)?;
                e.emit_ldc_i4(2)?;
                e.emit_instruction("add", None)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "(1 + 2)");
    }

    #[test]
    fn test_boolean_constant_return() {
        let fx = Fixture::new();
        let getter = MethodRef::getter(fx.employee.clone(), "IsActive", TypeSignature::Boolean);
        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldc_i4(1)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body, Expr::bool(true));
    }

    #[test]
    fn test_ceq_zero_negates_comparison() {
        let mut fx = Fixture::new();
        let id = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "Id", TypeSignature::I4));
        let getter = MethodRef::getter(fx.employee.clone(), "Small", TypeSignature::Boolean);
        // !(Id > 3)
        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", id.token)?;
                e.emit_ldc_i4(3)?;
                e.emit_instruction("cgt", None)?;
                e.emit_ldc_i4(0)?;
                e.emit_instruction("ceq", None)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "(this.Id <= 3)");
    }

    #[test]
    fn test_ternary_through_join() {
        let mut fx = Fixture::new();
        let id = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "Id", TypeSignature::I4));
        let getter = MethodRef::getter(fx.employee.clone(), "Rank", TypeSignature::I4);
        // Id > 3 ? 2 : 1, with the value merged at the join and stored through a local
        let body = fx
            .run(&getter, &[TypeSignature::I4], |e| {
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", id.token)?;
                e.emit_ldc_i4(3)?;
                e.emit_branch("bgt.s", "two")?;
                e.emit_ldc_i4(1)?;
                e.emit_branch("br.s", "join")?;
                e.define_label("two")?;
                e.emit_ldc_i4(2)?;
                e.define_label("join")?;
                e.emit_stloc(0)?;
                e.emit_ldloc(0)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "IIF((this.Id > 3), 2, 1)");
    }

    #[test]
    fn test_and_also_with_returns() {
        let mut fx = Fixture::new();
        let active = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "Active", TypeSignature::Boolean));
        let id = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "Id", TypeSignature::I4));
        let getter = MethodRef::getter(fx.employee.clone(), "Eligible", TypeSignature::Boolean);
        // Active && Id == 7
        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", active.token)?;
                e.emit_branch("brfalse.s", "no")?;
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", id.token)?;
                e.emit_ldc_i4(7)?;
                e.emit_instruction("ceq", None)?;
                e.emit_instruction("ret", None)?;
                e.define_label("no")?;
                e.emit_ldc_i4(0)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "(this.Active AndAlso (this.Id == 7))");
    }

    fn flags(names: &[String]) -> MethodRef {
        names
            .iter()
            .fold(MethodRef::new(TypeSignature::class("Employee"), "M"), |method, name| {
                method.param(name, TypeSignature::Boolean)
            })
            .returns(TypeSignature::Boolean)
            .with_flags(MethodFlags::STATIC)
    }

    #[test]
    fn test_shared_tail_after_or_else() {
        let fx = Fixture::new();
        let method = flags(&["a".into(), "b".into(), "c".into()]);
        // (a || b) && c
        let body = fx
            .run(&method, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_branch("brtrue.s", "tail")?;
                e.emit_ldarg(1)?;
                e.emit_branch("brfalse.s", "no")?;
                e.define_label("tail")?;
                e.emit_ldarg(2)?;
                e.emit_instruction("ret", None)?;
                e.define_label("no")?;
                e.emit_ldc_i4(0)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "((a OrElse b) AndAlso c)");
    }

    #[test]
    fn test_two_or_else_clauses() {
        let fx = Fixture::new();
        let method = flags(&["a".into(), "b".into(), "c".into(), "d".into()]);
        // (a || b) && (c || d), the second clause as a value
        let body = fx
            .run(&method, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_branch("brtrue.s", "second")?;
                e.emit_ldarg(1)?;
                e.emit_branch("brfalse.s", "no")?;
                e.define_label("second")?;
                e.emit_ldarg(2)?;
                e.emit_branch("brtrue.s", "yes")?;
                e.emit_ldarg(3)?;
                e.emit_instruction("ret", None)?;
                e.define_label("yes")?;
                e.emit_ldc_i4(1)?;
                e.emit_instruction("ret", None)?;
                e.define_label("no")?;
                e.emit_ldc_i4(0)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "((a OrElse b) AndAlso (c OrElse d))");
    }

    #[test]
    fn test_long_clause_chain_is_read_once() {
        const CLAUSES: usize = 24;
        let fx = Fixture::new();
        let names = (0..CLAUSES * 2).map(|i| format!("p{i}")).collect::<Vec<_>>();
        let method = flags(&names);

        let body = fx
            .run(&method, &[], |e| {
                for clause in 0..CLAUSES {
                    let next = format!("clause{clause}");
                    e.emit_ldarg(u16::try_from(clause * 2).unwrap())?;
                    e.emit_branch("brtrue", &next)?;
                    e.emit_ldarg(u16::try_from(clause * 2 + 1).unwrap())?;
                    e.emit_branch("brfalse", "no")?;
                    e.define_label(&next)?;
                }
                e.emit_ldc_i4(1)?;
                e.emit_instruction("ret", None)?;
                e.define_label("no")?;
                e.emit_ldc_i4(0)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();

        let clause = |i: usize| format!("(p{} OrElse p{})", i * 2, i * 2 + 1);
        let expected = (1..CLAUSES).fold(clause(0), |acc, i| {
            format!("({acc} AndAlso {})", clause(i))
        });
        assert_eq!(body.to_string(), expected);
    }

    #[test]
    fn test_boolean_ternary_jumps_to_consequence() {
        let fx = Fixture::new();
        let method = MethodRef::new(fx.employee.clone(), "Level")
            .param("flag", TypeSignature::Boolean)
            .returns(TypeSignature::I4)
            .with_flags(MethodFlags::STATIC);
        // flag ? 10 : 20
        let body = fx
            .run(&method, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_branch("brtrue.s", "ten")?;
                e.emit_ldc_i4(20)?;
                e.emit_branch("br.s", "end")?;
                e.define_label("ten")?;
                e.emit_ldc_i4(10)?;
                e.define_label("end")?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "IIF(flag, 10, 20)");
    }

    #[test]
    fn test_oversized_array_is_unsupported() {
        let mut fx = Fixture::new();
        let object = fx.table.add_type(TypeSignature::Object);
        let method = MethodRef::new(fx.employee.clone(), "Huge")
            .returns(TypeSignature::Object)
            .with_flags(MethodFlags::STATIC);
        let result = fx.run(&method, &[], |e| {
            e.emit_ldc_i4(0x7fff_ffff)?;
            e.emit_token("newarr", object)?;
            e.emit_instruction("ret", None)
        });
        match result {
            Err(Error::UnsupportedInstruction { opcode, .. }) => assert_eq!(opcode, "newarr"),
            other => panic!("expected an unsupported instruction, got {other:?}"),
        }
    }

    #[test]
    fn test_boxing_and_array_concat() {
        let mut fx = Fixture::new();
        let from = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "From", TypeSignature::I4));
        let int = fx.table.add_type(TypeSignature::I4);
        let object = fx.table.add_type(TypeSignature::Object);
        let dash = fx.table.add_string("-");
        let concat = fx.table.add_method(
            MethodRef::new(TypeSignature::String, "Concat")
                .param("args", TypeSignature::SzArray(Box::new(TypeSignature::Object)))
                .returns(TypeSignature::String)
                .with_flags(MethodFlags::STATIC),
        );
        let getter = MethodRef::getter(fx.employee.clone(), "Range", TypeSignature::String);

        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldc_i4(2)?;
                e.emit_token("newarr", object)?;
                e.emit_instruction("dup", None)?;
                e.emit_ldc_i4(0)?;
                e.emit_ldarg(0)?;
                e.emit_token("ldfld", from.token)?;
                e.emit_token("box", int)?;
                e.emit_instruction("stelem.ref", None)?;
                e.emit_instruction("dup", None)?;
                e.emit_ldc_i4(1)?;
                e.emit_token("ldstr", dash)?;
                e.emit_instruction("stelem.ref", None)?;
                e.emit_token("call", concat.token)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "(Convert(this.From, Object) + \"-\")");
    }

    #[test]
    fn test_void_call_is_unsupported() {
        let mut fx = Fixture::new();
        let log = fx.table.add_method(
            MethodRef::new(TypeSignature::class("Console"), "WriteLine")
                .with_flags(MethodFlags::STATIC),
        );
        let method = MethodRef::new(fx.employee.clone(), "Noisy").returns(TypeSignature::I4);
        let result = fx.run(&method, &[], |e| {
            e.emit_token("call", log.token)?;
            e.emit_ldc_i4(0)?;
            e.emit_instruction("ret", None)
        });
        assert_eq!(
            result,
            Err(Error::UnsupportedInstruction {
                opcode: "call".to_string(),
                offset: 0
            })
        );
    }

    #[test]
    fn test_local_assigned_on_one_arm() {
        let fx = Fixture::new();
        let method = MethodRef::new(fx.employee.clone(), "Partial")
            .param("flag", TypeSignature::Boolean)
            .returns(TypeSignature::I4);
        let result = fx.run(&method, &[TypeSignature::I4], |e| {
            e.emit_ldarg(1)?;
            e.emit_branch("brfalse.s", "skip")?;
            e.emit_ldc_i4(5)?;
            e.emit_stloc(0)?;
            e.define_label("skip")?;
            e.emit_ldloc(0)?;
            e.emit_instruction("ret", None)
        });
        assert!(matches!(result, Err(Error::UnsupportedControlFlow { .. })));
    }

    #[test]
    fn test_nullable_members() {
        let mut fx = Fixture::new();
        let short = TypeSignature::nullable(TypeSignature::I2);
        let field = fx
            .table
            .add_field(FieldRef::new(fx.employee.clone(), "MyField", short.clone()));
        let get_or_default = fx.table.add_method(
            MethodRef::new(short.clone(), "GetValueOrDefault").returns(TypeSignature::I2),
        );
        let getter = MethodRef::getter(fx.employee.clone(), "Value", TypeSignature::I2);

        let body = fx
            .run(&getter, &[], |e| {
                e.emit_ldarg(0)?;
                e.emit_token("ldflda", field.token)?;
                e.emit_token("call", get_or_default.token)?;
                e.emit_instruction("ret", None)
            })
            .unwrap();
        assert_eq!(body.to_string(), "(this.MyField ?? 0)");
    }
}
