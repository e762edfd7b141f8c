use core::fmt;

use rustc_hash::FxHashMap;

use super::{instr::IrInstr, opcode::Opcode};
use crate::{
    arena_handle,
    collections::storage::{Arena, ArenaHandle, Handle},
    ice,
    utils::cfg::{CfgNode, CfgRegion},
};

/// The data of a basic block.
///
/// Edges are kept in insertion order and always come in pairs: a successor
/// edge `a -> b` is mirrored by a predecessor edge `b <- a`.
#[derive(Debug)]
pub struct BasicBlockData {
    self_ptr: Block,
    /// The label, unique within the body.
    label: String,
    instrs: Vec<IrInstr>,
    succs: Vec<Block>,
    preds: Vec<Block>,
}

impl PartialEq for BasicBlockData {
    fn eq(&self, other: &Self) -> bool { self.label == other.label }
}

impl Eq for BasicBlockData {}

impl BasicBlockData {
    pub fn self_ptr(&self) -> Block { self.self_ptr }

    pub fn label(&self) -> &str { &self.label }

    pub fn instrs(&self) -> &[IrInstr] { &self.instrs }
}

/// The basic blocks of one operation.
#[derive(Debug, Default)]
pub struct Body {
    blocks: Arena<BasicBlockData>,
    labels: FxHashMap<String, Block>,
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub struct Block(Handle<BasicBlockData>);

arena_handle!(Body, BasicBlockData, Block, blocks);

impl Body {
    pub fn new() -> Self { Self::default() }

    /// The entry block, which is the first block created.
    pub fn entry(&self) -> Option<Block> { self.blocks.handles().next().map(Block) }

    pub fn block(&self, label: &str) -> Option<Block> { self.labels.get(label).copied() }

    /// All blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.handles().map(Block)
    }

    pub fn len(&self) -> usize { self.blocks.len() }

    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// Every top level instruction of every block, in block creation order.
    pub fn instrs(&self) -> impl Iterator<Item = &IrInstr> + '_ {
        self.blocks.values().flat_map(|data| data.instrs.iter())
    }
}

impl Block {
    /// Create a new, empty block.
    ///
    /// # Panics
    ///
    /// Panics if the label is empty or already used in the body.
    pub fn new(body: &mut Body, label: impl Into<String>) -> Block {
        let label = label.into();
        if label.is_empty() {
            ice!("basic block label cannot be empty");
        }
        if body.labels.contains_key(&label) {
            ice!("duplicate basic block label `{}`", label);
        }
        let block = Block(body.blocks.push_with(|handle| BasicBlockData {
            self_ptr: Block(handle),
            label: label.clone(),
            instrs: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
        }));
        body.labels.insert(label, block);
        block
    }

    pub fn id(self) -> usize { self.0.index() }

    pub fn label(self, body: &Body) -> &str { &self.resolve(body).label }

    pub fn push_instr(self, body: &mut Body, instr: IrInstr) { self.resolve_mut(body).instrs.push(instr); }

    pub fn extend_instrs(self, body: &mut Body, instrs: impl IntoIterator<Item = IrInstr>) {
        self.resolve_mut(body).instrs.extend(instrs);
    }

    pub fn instrs(self, body: &Body) -> &[IrInstr] { &self.resolve(body).instrs }

    pub(crate) fn instrs_mut(self, body: &mut Body) -> &mut Vec<IrInstr> { &mut self.resolve_mut(body).instrs }

    pub fn last_instr(self, body: &Body) -> Option<&IrInstr> { self.resolve(body).instrs.last() }

    /// Replace the instruction at `idx`, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub fn replace_instr(self, body: &mut Body, idx: usize, instr: IrInstr) -> IrInstr {
        std::mem::replace(&mut self.resolve_mut(body).instrs[idx], instr)
    }

    /// Insert an instruction before `idx`.
    pub fn insert_instr(self, body: &mut Body, idx: usize, instr: IrInstr) {
        self.resolve_mut(body).instrs.insert(idx, instr);
    }

    /// Mutable access to an instruction, for attaching escape metadata.
    pub fn instr_mut(self, body: &mut Body, idx: usize) -> Option<&mut IrInstr> {
        self.resolve_mut(body).instrs.get_mut(idx)
    }

    /// Add an edge to `succ`, together with the reverse predecessor edge.
    ///
    /// Adding an existing edge does nothing.
    pub fn add_successor(self, body: &mut Body, succ: Block) {
        if !self.resolve(body).succs.contains(&succ) {
            self.resolve_mut(body).succs.push(succ);
        }
        if !succ.resolve(body).preds.contains(&self) {
            succ.resolve_mut(body).preds.push(self);
        }
    }

    /// A snapshot of the successors.
    pub fn successors(self, body: &Body) -> Vec<Block> { self.resolve(body).succs.clone() }

    /// A snapshot of the predecessors.
    pub fn predecessors(self, body: &Body) -> Vec<Block> { self.resolve(body).preds.clone() }

    /// Whether the last instruction returns.
    pub fn is_terminator(self, body: &Body) -> bool {
        self.last_instr(body)
            .map(|instr| instr.opcode() == Opcode::Return)
            .unwrap_or(false)
    }

    /// Whether the last instruction returns or branches.
    pub fn ends_with_control_flow(self, body: &Body) -> bool {
        self.last_instr(body)
            .map(|instr| instr.opcode() == Opcode::Return || instr.opcode().is_branch())
            .unwrap_or(false)
    }

    pub fn display(self, body: &Body) -> DisplayBlock<'_> { DisplayBlock { body, block: self } }
}

impl CfgNode for Block {
    fn succs(self, body: &Body) -> Vec<Self> { self.successors(body) }
}

impl CfgRegion for Body {
    type Node = Block;

    fn entry_node(&self) -> Option<Self::Node> { self.entry() }
}

pub struct DisplayBlock<'a> {
    body: &'a Body,
    block: Block,
}

impl fmt::Display for DisplayBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.block.label(self.body))?;
        for instr in self.block.instrs(self.body) {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_and_control_flow() {
        let mut body = Body::new();
        let entry = Block::new(&mut body, "_entry_1");
        let next = Block::new(&mut body, "next_1");

        entry.push_instr(&mut body, IrInstr::branch("next_1"));
        next.push_instr(&mut body, IrInstr::ret(None));

        assert!(entry.ends_with_control_flow(&body));
        assert!(!entry.is_terminator(&body));
        assert!(next.is_terminator(&body));
        assert!(next.ends_with_control_flow(&body));
        assert_eq!(body.entry(), Some(entry));
        assert_eq!(body.block("next_1"), Some(next));
    }

    #[test]
    fn test_empty_block_has_no_terminator() {
        let mut body = Body::new();
        let entry = Block::new(&mut body, "_entry_1");
        assert!(!entry.is_terminator(&body));
        assert!(!entry.ends_with_control_flow(&body));
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_duplicate_label() {
        let mut body = Body::new();
        Block::new(&mut body, "_entry_1");
        Block::new(&mut body, "_entry_1");
    }
}
