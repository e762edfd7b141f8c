use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::collections::storage::ArenaHandle;

/// A node in a control flow graph.
pub trait CfgNode: ArenaHandle + Hash {
    /// Get the successors of the node, in edge insertion order.
    fn succs(self, owner: &Self::Owner) -> Vec<Self>;
}

/// A region owning a control flow graph, e.g., the body of an operation.
///
/// The region owns the arena of its nodes.
pub trait CfgRegion: Sized {
    /// The node type associated with the region.
    type Node: CfgNode<Owner = Self>;

    /// Get the entry node of the region, if the region has any node.
    fn entry_node(&self) -> Option<Self::Node>;

    /// Generate the control flow information for the region.
    fn cfg_info(&self) -> CfgInfo<Self::Node> { CfgInfo::new(self, self.entry_node()) }
}

/// Control flow graph information.
///
/// This is a snapshot: modifying the graph afterwards does not update it.
pub struct CfgInfo<N>
where
    N: CfgNode,
{
    /// The successors of each reachable node.
    succs: FxHashMap<N, Vec<N>>,
    /// The predecessors of each reachable node.
    preds: FxHashMap<N, Vec<N>>,
    /// Reachable nodes in reverse post order.
    rpo: Vec<N>,
}

impl<N> CfgInfo<N>
where
    N: CfgNode,
{
    /// Derive the control flow graph information starting from `entry`.
    pub fn new(owner: &N::Owner, entry: Option<N>) -> Self {
        let mut succs: FxHashMap<N, Vec<N>> = FxHashMap::default();
        let mut preds: FxHashMap<N, Vec<N>> = FxHashMap::default();
        let mut postorder = Vec::new();

        let Some(entry) = entry else {
            return Self {
                succs,
                preds,
                rpo: postorder,
            };
        };

        // iterative dfs, the bool marks whether the children are already pushed
        let mut stack: Vec<(N, bool)> = vec![(entry, false)];
        let mut visited = FxHashSet::default();

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                postorder.push(node);
                continue;
            }

            if !visited.insert(node) {
                continue;
            }

            preds.entry(node).or_default();

            stack.push((node, true));

            let node_succs = node.succs(owner);
            let entry = succs.entry(node).or_default();
            for succ in node_succs.iter() {
                if !entry.contains(succ) {
                    entry.push(*succ);
                }
                let succ_preds = preds.entry(*succ).or_default();
                if !succ_preds.contains(&node) {
                    succ_preds.push(node);
                }
            }
            // reversed, so the first successor is visited first
            for succ in node_succs.iter().rev() {
                if !visited.contains(succ) {
                    stack.push((*succ, false));
                }
            }
        }

        postorder.reverse();

        Self {
            succs,
            preds,
            rpo: postorder,
        }
    }

    /// Get the successors of a node.
    ///
    /// # Returns
    ///
    /// - `Some(succs)`: The successors of the node.
    /// - `None`: The node is not reachable.
    pub fn succs(&self, node: N) -> Option<&[N]> { self.succs.get(&node).map(|v| v.as_slice()) }

    /// Get the predecessors of a node.
    ///
    /// Only reachable predecessors are recorded.
    pub fn preds(&self, node: N) -> Option<&[N]> { self.preds.get(&node).map(|v| v.as_slice()) }

    pub fn is_reachable(&self, node: N) -> bool { self.succs.contains_key(&node) }

    /// Get the reachable nodes in the control flow graph.
    pub fn reachable_nodes(&self) -> FxHashSet<N> { self.succs.keys().copied().collect() }

    /// Reachable nodes in reverse post order, starting with the entry.
    pub fn reverse_postorder(&self) -> &[N] { &self.rpo }
}
