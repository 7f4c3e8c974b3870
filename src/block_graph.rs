//! Block adjacency graph for staircase reordering.
//!
//! Nodes are blocks. An edge between two blocks carries the number of
//! linking variables that appear in exactly those two blocks. A block order
//! in which every weighted edge joins consecutive blocks turns all those
//! variables into stairlinking variables.
//!
//! ## Orders
//!
//! | Method | Result |
//! |--------|--------|
//! | `perfect_order` | every edge between consecutive blocks, or `None` |
//! | `greedy_order` | always a permutation; heavy edges kept consecutive where possible |
//!
//! A perfect order exists iff every block has degree at most two and the
//! graph has no cycle, i.e. every component is a path.

use std::collections::BTreeMap;

/// Weighted undirected graph over blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockGraph {
    n_blocks: usize,
    /// Edge weights keyed by `(smaller, larger)` block.
    edges: BTreeMap<(usize, usize), usize>,
}

impl BlockGraph {
    /// Graph with `n_blocks` isolated nodes.
    pub fn new(n_blocks: usize) -> Self {
        Self {
            n_blocks,
            edges: BTreeMap::new(),
        }
    }

    /// Add one unit of weight between two distinct blocks.
    ///
    /// Self-loops and unknown blocks are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a == b || a >= self.n_blocks || b >= self.n_blocks {
            return;
        }
        *self.edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
    }

    /// Number of nodes.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// Number of distinct edges.
    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Edge weight, zero if absent.
    pub fn weight(&self, a: usize, b: usize) -> usize {
        self.edges.get(&(a.min(b), a.max(b))).copied().unwrap_or(0)
    }

    /// Neighbors of a block with edge weights, in increasing block order.
    pub fn neighbors(&self, block: usize) -> Vec<(usize, usize)> {
        let mut out: Vec<(usize, usize)> = self
            .edges
            .iter()
            .filter_map(|(&(a, b), &w)| {
                if a == block {
                    Some((b, w))
                } else if b == block {
                    Some((a, w))
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Number of distinct neighbors.
    pub fn degree(&self, block: usize) -> usize {
        self.edges.keys().filter(|&&(a, b)| a == block || b == block).count()
    }

    fn adjacency(&self) -> Vec<Vec<(usize, usize)>> {
        let mut adj = vec![Vec::new(); self.n_blocks];
        for (&(a, b), &w) in &self.edges {
            adj[a].push((b, w));
            adj[b].push((a, w));
        }
        for list in &mut adj {
            list.sort_unstable();
        }
        adj
    }

    /// Order placing every edge between consecutive blocks, if one exists.
    ///
    /// Paths are laid out starting from their smaller endpoint, in order of
    /// that endpoint; isolated blocks follow in increasing order.
    pub fn perfect_order(&self) -> Option<Vec<usize>> {
        let adj = self.adjacency();
        if adj.iter().any(|n| n.len() > 2) {
            return None;
        }

        let mut visited = vec![false; self.n_blocks];
        let mut order = Vec::with_capacity(self.n_blocks);

        for start in 0..self.n_blocks {
            if visited[start] || adj[start].len() != 1 {
                continue;
            }
            let mut prev = None;
            let mut current = start;
            loop {
                visited[current] = true;
                order.push(current);
                let next = adj[current]
                    .iter()
                    .map(|&(n, _)| n)
                    .find(|&n| Some(n) != prev && !visited[n]);
                match next {
                    Some(n) => {
                        prev = Some(current);
                        current = n;
                    }
                    None => break,
                }
            }
        }

        // Unvisited nodes of degree two lie on cycles.
        if (0..self.n_blocks).any(|b| !visited[b] && !adj[b].is_empty()) {
            return None;
        }
        order.extend((0..self.n_blocks).filter(|&b| !visited[b]));
        Some(order)
    }

    /// Greedy order for graphs without a perfect order.
    ///
    /// Starting from the unvisited block of smallest degree, repeatedly step
    /// to the unvisited neighbor with the heaviest edge (ties to the smaller
    /// block); when stuck, restart from the next smallest-degree block.
    pub fn greedy_order(&self) -> Vec<usize> {
        let adj = self.adjacency();
        let mut visited = vec![false; self.n_blocks];
        let mut order = Vec::with_capacity(self.n_blocks);

        while order.len() < self.n_blocks {
            let start = (0..self.n_blocks)
                .filter(|&b| !visited[b])
                .min_by_key(|&b| (adj[b].len(), b));
            let Some(mut current) = start else { break };
            loop {
                visited[current] = true;
                order.push(current);
                let next = adj[current]
                    .iter()
                    .filter(|&&(n, _)| !visited[n])
                    .max_by(|&&(na, wa), &&(nb, wb)| wa.cmp(&wb).then(nb.cmp(&na)))
                    .map(|&(n, _)| n);
                match next {
                    Some(n) => current = n,
                    None => break,
                }
            }
        }
        order
    }

    /// Number of edges whose blocks end up consecutive under `order`.
    pub fn consecutive_edges(&self, order: &[usize]) -> usize {
        let mut position = vec![usize::MAX; self.n_blocks];
        for (i, &b) in order.iter().enumerate() {
            if let Some(p) = position.get_mut(b) {
                *p = i;
            }
        }
        self.edges
            .keys()
            .filter(|&&(a, b)| position[a].abs_diff(position[b]) == 1)
            .count()
    }
}
