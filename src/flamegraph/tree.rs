//! The flame tree: a prefix tree over folded stacks.
//!
//! Nodes live in an index-addressed arena; parent links are plain indices,
//! which sidesteps ownership cycles and makes teardown a flat buffer drop
//! no matter how wide the tree gets. Each node tracks its exclusive count
//! (`self_count`), inclusive count (`total`), and subtree `height`, all
//! maintained incrementally by the two upward walks in
//! [`FlameTree::insert`]; there is no second fix-up pass.

use indexmap::IndexMap;
use log::debug;

use crate::collapse::{CollapsedMultiset, Frame};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// The arena index of the synthetic root.
pub const ROOT: NodeId = 0;

/// One node of the aggregation tree.
#[derive(Debug)]
pub struct FlameNode<'a> {
    /// The frame this node aggregates; `None` only at the synthetic root.
    frame: Option<Frame<'a>>,
    /// Samples whose stack ends exactly here.
    self_count: usize,
    /// Samples whose stack passes through here: `self + Σ children.total`.
    total: usize,
    /// `1 + max(children.height)`; 1 for leaves.
    height: usize,
    /// Back-pointer for the upward count/height walks.
    parent: Option<NodeId>,
    /// Children keyed by frame identity, in first-insertion order so layout
    /// and JSON output are deterministic.
    children: IndexMap<Frame<'a>, NodeId, ahash::RandomState>,
}

impl<'a> FlameNode<'a> {
    fn new(frame: Option<Frame<'a>>, parent: Option<NodeId>) -> Self {
        FlameNode {
            frame,
            self_count: 0,
            total: 0,
            height: 1,
            parent,
            children: IndexMap::default(),
        }
    }

    /// The aggregated frame; `None` at the root.
    pub fn frame(&self) -> Option<&Frame<'a>> {
        self.frame.as_ref()
    }

    /// The frame name, or `"all"` for the root.
    pub fn name(&self) -> &'a str {
        match &self.frame {
            Some(frame) => frame.name(),
            None => "all",
        }
    }

    /// Exclusive sample count.
    pub fn self_count(&self) -> usize {
        self.self_count
    }

    /// Inclusive sample count.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Subtree height: 1 for leaves, `1 + max(children)` otherwise.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The parent's arena index; `None` at the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child indices in insertion order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// The aggregation tree over a folded multiset.
#[derive(Debug)]
pub struct FlameTree<'a> {
    nodes: Vec<FlameNode<'a>>,
}

impl<'a> FlameTree<'a> {
    /// An empty tree holding only the synthetic root.
    pub fn new() -> Self {
        FlameTree {
            nodes: vec![FlameNode::new(None, None)],
        }
    }

    /// Materialises the multiset as a tree.
    ///
    /// Stacks are inserted in sorted key order, so sibling order (and with
    /// it the layout) is reproducible across runs for the same input.
    pub fn from_multiset(set: &CollapsedMultiset<'a>) -> Self {
        let mut entries: Vec<_> = set.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut tree = FlameTree::new();
        for (key, count) in entries {
            tree.insert(key.frames(), count);
        }
        debug!(
            "built flame tree: {} nodes, depth {}, {} samples",
            tree.nodes.len(),
            tree.depth(),
            tree.root().total()
        );
        tree
    }

    /// Access a node by index.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of bounds.
    pub fn node(&self, id: NodeId) -> &FlameNode<'a> {
        &self.nodes[id]
    }

    /// The synthetic root.
    pub fn root(&self) -> &FlameNode<'a> {
        &self.nodes[ROOT]
    }

    /// Number of frame levels below the root, i.e. the depth of the deepest
    /// frame. The rendered image has `depth() + 1` rows (the root row plus
    /// one per frame level).
    pub fn depth(&self) -> usize {
        self.root().height - 1
    }

    /// Inserts one folded stack, walking or creating the path from root to leaf,
    /// bumping the leaf's exclusive count, and propagating `total` and
    /// `height` upward.
    pub fn insert(&mut self, frames: &[Frame<'a>], count: usize) {
        if frames.is_empty() || count == 0 {
            return;
        }
        let mut cur = ROOT;
        for frame in frames {
            cur = match self.nodes[cur].children.get(frame).copied() {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(FlameNode::new(Some(frame.clone()), Some(cur)));
                    self.nodes[cur].children.insert(frame.clone(), child);
                    self.bubble_height(cur, 2);
                    child
                }
            };
        }

        self.nodes[cur].self_count += count;
        let mut at = Some(cur);
        while let Some(id) = at {
            self.nodes[id].total += count;
            at = self.nodes[id].parent;
        }
    }

    // Sets `nodes[at].height = max(height, floor)` and climbs while the
    // update is strict.
    fn bubble_height(&mut self, at: NodeId, floor: usize) {
        let mut at = Some(at);
        let mut floor = floor;
        while let Some(id) = at {
            if self.nodes[id].height >= floor {
                break;
            }
            self.nodes[id].height = floor;
            floor += 1;
            at = self.nodes[id].parent;
        }
    }

    /// The node's share of its parent's inclusive count, in `[0, 1]`;
    /// 1 for the root. Distinct from the depth-based heat the colour
    /// schemes see; this one is what pruning tests against.
    pub fn heat_ratio(&self, id: NodeId) -> f64 {
        match self.nodes[id].parent {
            Some(p) if self.nodes[p].total > 0 => {
                self.nodes[id].total as f64 / self.nodes[p].total as f64
            }
            _ => 1.0,
        }
    }

    /// Removes every child whose [`heat_ratio`](FlameTree::heat_ratio)
    /// falls below `threshold`, recursively. Ancestor totals are left as
    /// they are, so pruning changes what is drawn, not the percentages.
    pub fn prune(&mut self, threshold: f64) {
        if threshold <= 0.0 {
            return;
        }
        let mut pending = vec![ROOT];
        while let Some(id) = pending.pop() {
            let keep: Vec<NodeId> = self.nodes[id]
                .children
                .values()
                .copied()
                .filter(|&c| self.heat_ratio(c) >= threshold)
                .collect();
            if keep.len() != self.nodes[id].children.len() {
                let kept: IndexMap<Frame<'a>, NodeId, ahash::RandomState> = self.nodes[id]
                    .children
                    .drain(..)
                    .filter(|(_, c)| keep.contains(c))
                    .collect();
                self.nodes[id].children = kept;
            }
            pending.extend(keep);
        }
    }

    /// Walks the tree depth-first with an explicit stack, yielding
    /// `(node id, depth)` pairs; children are visited in insertion order.
    /// The root is depth 0.
    pub fn walk(&self) -> Walk<'_, 'a> {
        Walk {
            tree: self,
            stack: vec![(ROOT, 0)],
        }
    }
}

impl<'a> Default for FlameTree<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first pre-order traversal over a [`FlameTree`].
pub struct Walk<'t, 'a> {
    tree: &'t FlameTree<'a>,
    stack: Vec<(NodeId, usize)>,
}

impl<'t, 'a> Iterator for Walk<'t, 'a> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<(NodeId, usize)> {
        let (id, depth) = self.stack.pop()?;
        let node = &self.tree.nodes[id];
        // reversed so the first child is popped first
        for child in node.children.values().rev() {
            self.stack.push((*child, depth + 1));
        }
        Some((id, depth))
    }
}
