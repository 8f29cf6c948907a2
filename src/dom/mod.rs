//! Dominator analysis: immediate dominators, dominance frontiers, and
//! dominator-tree successors, computed with the Cooper–Harvey–Kennedy
//! iterative algorithm over a reverse-post-order block numbering.
//!
//! RPO + `intersect` is used (rather than a BFS-worklist/chain-walk
//! formulation) because the codegen module reuses the same numbering for
//! deterministic block ordering in emitted labels.

use log::debug;

use crate::common::fx_hash::{FxHashMap, FxHashSet};
use crate::ir::ir::{BlockId, Function};

/// The three dominator maps for one function. Unreachable blocks are
/// absent from all three.
#[derive(Debug, Clone, Default)]
pub struct Dominators {
    pub idom: FxHashMap<BlockId, BlockId>,
    pub dom_front: FxHashMap<BlockId, FxHashSet<BlockId>>,
    pub dom_succ: FxHashMap<BlockId, FxHashSet<BlockId>>,
}

impl Dominators {
    /// `a` strictly dominates `b`: walk `b`'s idom chain, excluding `b`
    /// itself, looking for `a`.
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return false;
        }
        self.dominates(a, b)
    }

    /// `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            let Some(&next) = self.idom.get(&cur) else { return false };
            if next == cur {
                // reached the entry (its own idom) without finding a
                return cur == a;
            }
            cur = next;
        }
    }
}

/// Compute a reverse post-order numbering of the blocks reachable from
/// `entry`, as a `BlockId -> index` map plus the RPO-ordered list itself.
fn reverse_post_order(func: &Function) -> (Vec<BlockId>, FxHashMap<BlockId, usize>) {
    let mut visited = FxHashSet::default();
    let mut post_order = Vec::new();

    fn visit(func: &Function, b: BlockId, visited: &mut FxHashSet<BlockId>, post_order: &mut Vec<BlockId>) {
        if !visited.insert(b) {
            return;
        }
        for succ in func.successors(b) {
            visit(func, succ, visited, post_order);
        }
        post_order.push(b);
    }

    if !func.blocks.is_empty() {
        visit(func, func.entry(), &mut visited, &mut post_order);
    }

    post_order.reverse();
    let index: FxHashMap<BlockId, usize> = post_order.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    (post_order, index)
}

/// Run the full dominator analysis for one function. Empty functions (no
/// blocks — an extern declaration) yield empty maps.
pub fn analyze(func: &Function) -> Dominators {
    let mut doms = Dominators::default();
    if func.blocks.is_empty() {
        return doms;
    }

    let (rpo, rpo_index) = reverse_post_order(func);
    let entry = func.entry();
    let preds = func.predecessors();

    // idom[entry] = entry; everything else starts undefined.
    doms.idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().filter(|&&b| b != entry) {
            let mut new_idom: Option<BlockId> = None;
            for &p in preds.get(&b).into_iter().flatten() {
                if !doms.idom.contains_key(&p) {
                    continue; // predecessor not yet processed (or unreachable)
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &doms.idom, &rpo_index),
                });
            }
            if let Some(new_idom) = new_idom {
                if doms.idom.get(&b) != Some(&new_idom) {
                    doms.idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }

    // Dominance frontiers: for every block with >= 2 predecessors, walk
    // each predecessor's idom chain up to (not including) idom[b].
    for &b in &rpo {
        let block_preds = preds.get(&b).cloned().unwrap_or_default();
        if block_preds.len() < 2 {
            continue;
        }
        let Some(&b_idom) = doms.idom.get(&b) else { continue };
        for p in block_preds {
            if !doms.idom.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while runner != b_idom {
                doms.dom_front.entry(runner).or_default().insert(b);
                let Some(&next) = doms.idom.get(&runner) else { break };
                if next == runner {
                    break; // reached entry without hitting b_idom: b_idom must be entry
                }
                runner = next;
            }
        }
    }

    // Dominator-tree successors: for every non-entry block, it is a child
    // of its idom.
    for &b in &rpo {
        if b == entry {
            continue;
        }
        if let Some(&idom) = doms.idom.get(&b) {
            doms.dom_succ.entry(idom).or_default().insert(b);
        }
    }

    // Ensure every reachable block has a (possibly empty) entry in each map.
    for &b in &rpo {
        doms.dom_front.entry(b).or_default();
        doms.dom_succ.entry(b).or_default();
    }

    debug!(
        "dominators for `{}`: {} reachable blocks, {} dom-tree edges",
        func.name,
        rpo.len(),
        doms.dom_succ.values().map(|s| s.len()).sum::<usize>()
    );

    doms
}

/// Nearest common ancestor of `b1`/`b2` in the (partially built) dominator
/// tree: walk both pointers toward the root, always advancing the one
/// with the larger RPO index, until they meet.
fn intersect(
    mut b1: BlockId,
    mut b2: BlockId,
    idom: &FxHashMap<BlockId, BlockId>,
    rpo_index: &FxHashMap<BlockId, usize>,
) -> BlockId {
    while b1 != b2 {
        while rpo_index[&b1] > rpo_index[&b2] {
            b1 = idom[&b1];
        }
        while rpo_index[&b2] > rpo_index[&b1] {
            b2 = idom[&b2];
        }
    }
    b1
}
