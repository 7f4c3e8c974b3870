//! Stairlinking detection and block reordering.

use serde::{Deserialize, Serialize};

use crate::block_graph::BlockGraph;
use crate::incidence::IncidenceProvider;
use crate::policy::RefinementPolicy;
use crate::types::ConsRole;

use super::{Candidate, CandidateError};

/// Outcome of [`Candidate::find_stairlinking`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StairlinkingReport {
    /// Applied block order (`order[i]` is the old index of new block `i`),
    /// `None` if detection was abandoned.
    pub order: Option<Vec<usize>>,
    /// Whether the order places every candidate edge between consecutive blocks.
    pub perfect: bool,
    /// Linking variables turned into stairlinking variables.
    pub to_stairlinking: usize,
    /// Linking variables moved into a single block.
    pub to_block: usize,
    /// Linking variables moved to the master.
    pub to_master: usize,
}

impl StairlinkingReport {
    fn abandoned() -> Self {
        Self {
            order: None,
            perfect: false,
            to_stairlinking: 0,
            to_block: 0,
            to_master: 0,
        }
    }

    /// Whether detection was abandoned without changes.
    pub fn is_abandoned(&self) -> bool {
        self.order.is_none()
    }

    /// Whether the block order changed.
    pub fn reordered(&self) -> bool {
        self.order
            .as_ref()
            .is_some_and(|o| o.iter().enumerate().any(|(i, &b)| i != b))
    }
}

/// Where a rescanned linking variable goes.
enum LinkingFate {
    Stairlinking(usize),
    Block(usize),
    Master,
    Stay,
}

impl Candidate {
    /// Blocks hit by a variable's constraints, if they are all block constraints.
    fn blocks_of_block_only_var<P: IncidenceProvider + ?Sized>(
        provider: &P,
        cons_roles: &[ConsRole],
        var: usize,
    ) -> Option<Vec<usize>> {
        let mut blocks = Vec::new();
        for &c in provider.conss_of(var) {
            let b = cons_roles[c].block()?;
            if let Err(pos) = blocks.binary_search(&b) {
                blocks.insert(pos, b);
            }
        }
        Some(blocks)
    }

    /// Linking variables whose constraints all lie in exactly two blocks,
    /// with the two blocks.
    pub fn potential_stairlinking_vars<P: IncidenceProvider + ?Sized>(&self, provider: &P) -> Vec<(usize, usize, usize)> {
        let cons_roles = self.cons_roles();
        self.linking_vars
            .iter()
            .filter_map(|&v| {
                let blocks = Self::blocks_of_block_only_var(provider, &cons_roles, v)?;
                match blocks.as_slice() {
                    &[a, b] => Some((v, a, b)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Block adjacency graph over the potential stairlinking variables.
    pub fn block_graph<P: IncidenceProvider + ?Sized>(&self, provider: &P) -> BlockGraph {
        let mut graph = BlockGraph::new(self.n_blocks);
        for (_, a, b) in self.potential_stairlinking_vars(provider) {
            graph.add_edge(a, b);
        }
        graph
    }

    /// Reorder blocks into a staircase and reclassify linking variables.
    ///
    /// Requires that no stairlinking variable exists yet. If no perfect
    /// order exists and the policy disables the greedy heuristic, detection
    /// is abandoned and the candidate is left unchanged. Otherwise the order
    /// is applied and every linking variable is rescanned: two consecutive
    /// blocks make it stairlinking, a single block makes it a variable of
    /// that block, only master constraints make it a master variable.
    pub fn find_stairlinking<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<StairlinkingReport, CandidateError> {
        self.check_dimensions(provider)?;
        self.flush()?;
        let count = self.n_total_stairlinking_vars();
        if count > 0 {
            return Err(CandidateError::StairlinkingAlreadyPresent { count });
        }

        let graph = self.block_graph(provider);
        let (order, perfect) = match graph.perfect_order() {
            Some(order) => (order, true),
            None if policy.stairlinking_heuristic => (graph.greedy_order(), false),
            None => {
                tracing::warn!(
                    candidate = %self.id,
                    n_blocks = self.n_blocks,
                    edges = graph.n_edges(),
                    "no perfect staircase order and heuristic disabled, stairlinking detection abandoned"
                );
                return Ok(StairlinkingReport::abandoned());
            }
        };

        let report = self.with_step("stairlinking", |cand| {
            cand.permute_blocks(&order)?;
            let (to_stairlinking, to_block, to_master) = cand.reclassify_linking_vars(provider);
            Ok(StairlinkingReport {
                order: Some(order),
                perfect,
                to_stairlinking,
                to_block,
                to_master,
            })
        })?;

        if report.reordered() {
            tracing::info!(
                candidate = %self.id,
                perfect,
                consecutive = report.order.as_ref().map(|o| graph.consecutive_edges(o)).unwrap_or(0),
                edges = graph.n_edges(),
                "blocks reordered for stairlinking"
            );
        }
        tracing::debug!(
            candidate = %self.id,
            to_stairlinking = report.to_stairlinking,
            to_block = report.to_block,
            to_master = report.to_master,
            "find_stairlinking"
        );

        self.verify_if(policy.verify_after_refinement, provider)?;
        Ok(report)
    }

    fn reclassify_linking_vars<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> (usize, usize, usize) {
        let cons_roles = self.cons_roles();
        let fates: Vec<(usize, LinkingFate)> = self
            .linking_vars
            .iter()
            .map(|&v| {
                let fate = match Self::blocks_of_block_only_var(provider, &cons_roles, v) {
                    Some(blocks) => match blocks.as_slice() {
                        &[a, b] if a + 1 == b => LinkingFate::Stairlinking(a),
                        &[b] => LinkingFate::Block(b),
                        &[] => LinkingFate::Master,
                        _ => LinkingFate::Stay,
                    },
                    None => {
                        let only_master = provider.conss_of(v).iter().all(|&c| cons_roles[c] == ConsRole::Master);
                        if only_master {
                            LinkingFate::Master
                        } else {
                            LinkingFate::Stay
                        }
                    }
                };
                (v, fate)
            })
            .collect();

        let (mut to_stairlinking, mut to_block, mut to_master) = (0, 0, 0);
        let mut keep = Vec::with_capacity(self.linking_vars.len());
        for (v, fate) in fates {
            match fate {
                LinkingFate::Stairlinking(b) => {
                    self.stairlinking_vars[b].push(v);
                    to_stairlinking += 1;
                }
                LinkingFate::Block(b) => {
                    self.vars_for_blocks[b].push(v);
                    to_block += 1;
                }
                LinkingFate::Master => {
                    self.master_vars.push(v);
                    to_master += 1;
                }
                LinkingFate::Stay => keep.push(v),
            }
        }
        self.linking_vars = keep;
        self.master_vars.sort_unstable();
        for list in self.vars_for_blocks.iter_mut().chain(self.stairlinking_vars.iter_mut()) {
            list.sort_unstable();
        }
        self.touch();
        (to_stairlinking, to_block, to_master)
    }
}
