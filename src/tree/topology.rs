/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Mapping from participant identities to positions in a complete tree with a fixed branch factor.
//!
//! ## Structural rule
//!
//! The tree is stored as a flat array of positions `0..N`. Position 0 is the root. For a node at
//! position `p > 0`, its parent is at position `(p - 1) / B`, and its children are at positions
//! `B*p + 1 ..= B*p + B` (the ones that are smaller than `N`). For example, with `B = 3` and
//! `N = 13`:
//!
//! ```text
//!                 0
//!       1         2         3
//!    4  5  6   7  8  9  10 11 12
//! ```

use std::collections::{HashMap, VecDeque};

use crate::types::{data_types::ReplicaID, participant_set::ParticipantSet};

/// A bijection between a set of identities and the positions `0..N` of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeTopology {
    branch_factor: usize,
    positions: Vec<ReplicaID>,
    index: HashMap<ReplicaID, usize>,
}

impl TreeTopology {
    /// Create a topology where `positions[p]` is the identity placed at position `p`.
    pub fn new(branch_factor: usize, positions: Vec<ReplicaID>) -> Result<Self, TopologyError> {
        if branch_factor == 0 {
            return Err(TopologyError::ZeroBranchFactor);
        }
        if positions.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut index = HashMap::with_capacity(positions.len());
        for (position, id) in positions.iter().enumerate() {
            if index.insert(*id, position).is_some() {
                return Err(TopologyError::DuplicateIdentity(*id));
            }
        }

        Ok(Self {
            branch_factor,
            positions,
            index,
        })
    }

    /// Create a topology from an identity → position map. Fails unless the map is a bijection onto
    /// `0..map.len()`.
    pub fn from_assignment(
        branch_factor: usize,
        assignment: &HashMap<ReplicaID, usize>,
    ) -> Result<Self, TopologyError> {
        let mut positions: Vec<Option<ReplicaID>> = vec![None; assignment.len()];
        for (id, position) in assignment {
            match positions.get_mut(*position) {
                Some(slot @ None) => *slot = Some(*id),
                Some(Some(_)) => return Err(TopologyError::PositionTaken(*position)),
                None => {
                    return Err(TopologyError::PositionOutOfRange {
                        position: *position,
                        size: assignment.len(),
                    })
                }
            }
        }
        // Every slot is filled: there are as many distinct positions as entries.
        Self::new(branch_factor, positions.into_iter().flatten().collect())
    }

    /// Number of nodes in a full three-level tree with the given branch factor: `1 + B + B²`.
    pub fn tree_size(branch_factor: usize) -> usize {
        1 + branch_factor + branch_factor * branch_factor
    }

    /// Replace the position assignment. The new assignment is fully validated before it replaces the
    /// current one, so on error the topology is unchanged.
    pub fn reinitialize(&mut self, positions: Vec<ReplicaID>) -> Result<(), TopologyError> {
        *self = Self::new(self.branch_factor, positions)?;
        Ok(())
    }

    pub fn branch_factor(&self) -> usize {
        self.branch_factor
    }

    pub fn size(&self) -> usize {
        self.positions.len()
    }

    /// Identities ordered by position.
    pub fn identities(&self) -> &[ReplicaID] {
        &self.positions
    }

    pub fn root(&self) -> ReplicaID {
        self.positions[0]
    }

    pub fn position_of(&self, id: &ReplicaID) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn identity_at(&self, position: usize) -> Option<ReplicaID> {
        self.positions.get(position).copied()
    }

    pub fn contains(&self, id: &ReplicaID) -> bool {
        self.index.contains_key(id)
    }

    /// Position of the parent of the node at `position`, or `None` for the root.
    pub fn parent_position(&self, position: usize) -> Option<usize> {
        if position == 0 {
            None
        } else {
            Some((position - 1) / self.branch_factor)
        }
    }

    /// Positions of the children of the node at `position`.
    pub fn child_positions(&self, position: usize) -> std::ops::Range<usize> {
        let first = (self.branch_factor * position + 1).min(self.size());
        let end = (self.branch_factor * position + self.branch_factor + 1).min(self.size());
        first..end
    }

    pub fn parent(&self, id: &ReplicaID) -> Option<ReplicaID> {
        let position = self.position_of(id)?;
        self.parent_position(position)
            .map(|parent| self.positions[parent])
    }

    pub fn children(&self, id: &ReplicaID) -> Vec<ReplicaID> {
        match self.position_of(id) {
            Some(position) => self
                .child_positions(position)
                .map(|child| self.positions[child])
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_leaf(&self, id: &ReplicaID) -> bool {
        self.children(id).is_empty()
    }

    /// Every identity below `id` in the tree, in breadth-first order. Does not include `id` itself.
    pub fn subtree_identities(&self, id: &ReplicaID) -> Vec<ReplicaID> {
        let mut subtree = Vec::new();
        let Some(position) = self.position_of(id) else {
            return subtree;
        };
        let mut frontier: VecDeque<usize> = self.child_positions(position).collect();
        while let Some(position) = frontier.pop_front() {
            subtree.push(self.positions[position]);
            frontier.extend(self.child_positions(position));
        }
        subtree
    }

    /// Number of levels in the tree. A tree holding only a root has height 1.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut level_start = 0;
        let mut level_width = 1;
        while level_start < self.size() {
            height += 1;
            level_start += level_width;
            level_width *= self.branch_factor;
        }
        height
    }

    /// Move `leader` to the root by swapping it with the current occupant of position 0, which takes
    /// the leader's former position.
    pub fn place_leader(&mut self, leader: &ReplicaID) -> Result<(), TopologyError> {
        let leader_position = self
            .position_of(leader)
            .ok_or(TopologyError::UnknownIdentity(*leader))?;
        self.swap_positions(0, leader_position);
        Ok(())
    }

    /// Push each of `faulty` to the deepest free position: the first to position `N-1`, the second to
    /// `N-2`, and so on. Each faulty identity swaps places with whoever held that position. Identities
    /// that are not in the tree are skipped.
    pub fn move_to_leaves(&mut self, faulty: &ParticipantSet) {
        let mut last = self.size();
        for id in faulty.iter() {
            let Some(position) = self.position_of(id) else {
                continue;
            };
            if last == 0 {
                break;
            }
            last -= 1;
            self.swap_positions(position, last);
        }
    }

    fn swap_positions(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.positions.swap(a, b);
        self.index.insert(self.positions[a], a);
        self.index.insert(self.positions[b], b);
    }
}

/// Enumerates the ways in which a [`TreeTopology`] can be invalid.
#[derive(Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// A tree needs a branch factor of at least 1.
    ZeroBranchFactor,

    /// A tree needs at least a root.
    Empty,

    /// The identity appears at more than one position.
    DuplicateIdentity(ReplicaID),

    /// Two identities were assigned the same position.
    PositionTaken(usize),

    /// An identity was assigned a position outside `0..size`.
    PositionOutOfRange { position: usize, size: usize },

    /// The identity is not part of the tree.
    UnknownIdentity(ReplicaID),
}
