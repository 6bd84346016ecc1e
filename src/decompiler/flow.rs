//! Basic blocks and join points of a method body.
//!
//! Expression-shaped bodies are acyclic: every branch goes forward. With block indices in
//! offset order this makes the index order a topological order, so the post-dominator sets
//! come out of a single backward sweep and the immediate post-dominator of a block is simply
//! its lowest-indexed strict post-dominator. That block is where both arms of a conditional
//! meet again, and it is the point the interpreter runs each arm up to.

use std::collections::{BTreeSet, HashMap};

use crate::{
    disassembler::{Instruction, OpKind},
    Result,
};

/// A maximal run of instructions entered only at its first instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Position in [`ControlFlow::blocks`]
    pub index: usize,
    /// Index of the first instruction
    pub start: usize,
    /// Index one past the last instruction
    pub end: usize,
    /// Offset of the first instruction
    pub offset: u32,
    /// Successor blocks; a conditional branch lists its target first, then the fall-through
    pub successors: Vec<usize>,
}

/// Block structure and post-dominator information of one body.
#[derive(Debug, Clone)]
pub struct ControlFlow {
    blocks: Vec<BasicBlock>,
    ipdom: Vec<usize>,
    by_offset: HashMap<u32, usize>,
}

impl ControlFlow {
    /// Partitions `instructions` into blocks and computes their join points.
    ///
    /// # Errors
    /// [`crate::Error::UnsupportedControlFlow`] for backward branches (loops) and for paths
    /// that run past the last instruction without returning.
    pub fn build(instructions: &[Instruction]) -> Result<Self> {
        if instructions.is_empty() {
            return Err(malformed_error!("Method body has no instructions"));
        }

        let mut leaders = BTreeSet::from([0usize]);
        let position = instructions
            .iter()
            .enumerate()
            .map(|(i, instr)| (instr.offset, i))
            .collect::<HashMap<_, _>>();

        for (i, instr) in instructions.iter().enumerate() {
            if let Some(target) = instr.target() {
                let index = position
                    .get(&target)
                    .ok_or_else(|| malformed_error!("Branch target IL_{:04x} is unknown", target))?;
                leaders.insert(*index);
            }
            if instr.ends_block() && i + 1 < instructions.len() {
                leaders.insert(i + 1);
            }
        }

        let starts = leaders.into_iter().collect::<Vec<_>>();
        let mut blocks = Vec::with_capacity(starts.len());
        let mut by_offset = HashMap::with_capacity(starts.len());
        for (index, &start) in starts.iter().enumerate() {
            let end = starts.get(index + 1).copied().unwrap_or(instructions.len());
            by_offset.insert(instructions[start].offset, index);
            blocks.push(BasicBlock {
                index,
                start,
                end,
                offset: instructions[start].offset,
                successors: Vec::new(),
            });
        }

        for index in 0..blocks.len() {
            let last = &instructions[blocks[index].end - 1];
            let fall_through = || {
                if index + 1 < blocks.len() {
                    Ok(index + 1)
                } else {
                    Err(control_flow_error!(
                        last.offset,
                        "execution runs past the end of the body"
                    ))
                }
            };
            let target = || {
                last.target()
                    .and_then(|t| by_offset.get(&t).copied())
                    .ok_or_else(|| malformed_error!("Branch at IL_{:04x} has no target", last.offset))
            };

            let successors = if last.kind == OpKind::Ret {
                Vec::new()
            } else if last.is_unconditional_branch() {
                vec![target()?]
            } else if last.is_conditional_branch() {
                vec![target()?, fall_through()?]
            } else {
                vec![fall_through()?]
            };

            if successors.iter().any(|&succ| succ <= index) {
                return Err(control_flow_error!(last.offset, "backward branch (loop)"));
            }
            blocks[index].successors = successors;
        }

        let ipdom = immediate_post_dominators(&blocks);
        Ok(ControlFlow {
            blocks,
            ipdom,
            by_offset,
        })
    }

    /// All blocks in offset order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// The block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&BasicBlock> {
        self.blocks.get(index)
    }

    /// The block starting at `offset`.
    #[must_use]
    pub fn block_at(&self, offset: u32) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// The virtual exit node every `ret` flows into.
    #[must_use]
    pub fn exit(&self) -> usize {
        self.blocks.len()
    }

    /// Where the paths leaving `block` meet again; [`ControlFlow::exit`] when they only
    /// meet by returning.
    #[must_use]
    pub fn join_point(&self, block: usize) -> usize {
        self.ipdom.get(block).copied().unwrap_or(self.exit())
    }
}

fn immediate_post_dominators(blocks: &[BasicBlock]) -> Vec<usize> {
    let exit = blocks.len();
    let mut pdom: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); blocks.len()];

    for block in blocks.iter().rev() {
        let mut set = match block.successors.split_first() {
            None => BTreeSet::from([exit]),
            Some((first, rest)) => rest.iter().fold(pdom[*first].clone(), |acc, succ| {
                acc.intersection(&pdom[*succ]).copied().collect()
            }),
        };
        set.insert(block.index);
        pdom[block.index] = set;
    }

    pdom.iter()
        .enumerate()
        .map(|(index, set)| {
            set.iter()
                .copied()
                .find(|&candidate| candidate != index)
                .unwrap_or(exit)
        })
        .collect()
}
