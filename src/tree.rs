//! Roster and per-view signing trees.
//!
//! A [`Tree`] is an arena of nodes addressed by index, with parent and children stored as
//! indices, built fresh for every view.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::group::{add_points, identity, GroupPoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Member {
    pub id: NodeId,
    pub public: GroupPoint,
}

/// The ordered list of every participant and its long-term public key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new(members: Vec<Member>) -> Self {
        Roster { members }
    }

    /// Number the keys `0..n` in order.
    pub fn from_keys(keys: impl IntoIterator<Item = GroupPoint>) -> Self {
        Roster {
            members: keys
                .into_iter()
                .enumerate()
                .map(|(i, public)| Member {
                    id: NodeId(i as u32),
                    public,
                })
                .collect(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().map(|member| member.id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.iter().any(|member| member.id == id)
    }

    pub fn public_of(&self, id: NodeId) -> Option<GroupPoint> {
        self.members
            .iter()
            .find(|member| member.id == id)
            .map(|member| member.public)
    }

    /// Views rotate the root through the roster.
    pub fn root_for(&self, view: u64) -> Option<NodeId> {
        if self.members.is_empty() {
            return None;
        }
        Some(self.members[(view % self.members.len() as u64) as usize].id)
    }

    pub fn aggregate_public(&self) -> GroupPoint {
        self.members
            .iter()
            .fold(identity(), |acc, member| add_points(&acc, &member.public))
    }
}

#[derive(Clone, Debug, PartialEq)]
struct TreeNode {
    member: Member,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    view: u64,
    nodes: Vec<TreeNode>,
    index: BTreeMap<NodeId, usize>,
}

impl Tree {
    /// Lay a `branching`-ary tree over the roster rotated so that [`Roster::root_for`] comes
    /// first. A branching factor of one gives a chain.
    ///
    /// Returns `None` for an empty roster or a zero branching factor.
    pub fn for_view(roster: &Roster, view: u64, branching: usize) -> Option<Tree> {
        if roster.is_empty() || branching == 0 {
            return None;
        }
        let n = roster.len();
        let offset = (view % n as u64) as usize;
        let mut tree = Tree::empty(view);
        for i in 0..n {
            let member = roster.members[(offset + i) % n];
            let parent = if i == 0 { None } else { Some((i - 1) / branching) };
            tree.push(member, parent);
        }
        Some(tree)
    }

    /// Build an explicit shape from `(parent, child)` edges listed top-down.
    ///
    /// Returns `None` if a node is unknown to the roster, appears twice, or is attached to a
    /// parent that is not yet in the tree.
    pub fn from_edges(
        roster: &Roster,
        view: u64,
        root: NodeId,
        edges: &[(NodeId, NodeId)],
    ) -> Option<Tree> {
        let mut tree = Tree::empty(view);
        tree.push(member_of(roster, root)?, None);
        for (parent, child) in edges {
            if tree.index.contains_key(child) {
                return None;
            }
            let parent = *tree.index.get(parent)?;
            tree.push(member_of(roster, *child)?, Some(parent));
        }
        Some(tree)
    }

    fn empty(view: u64) -> Tree {
        Tree {
            view,
            nodes: vec![],
            index: BTreeMap::new(),
        }
    }

    fn push(&mut self, member: Member, parent: Option<usize>) {
        let at = self.nodes.len();
        self.nodes.push(TreeNode {
            member,
            parent,
            children: vec![],
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(at);
        }
        self.index.insert(member.id, at);
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn root(&self) -> NodeId {
        self.nodes[0].member.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|node| node.member.id)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        node.parent.map(|parent| self.nodes[parent].member.id)
    }

    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| {
                node.children
                    .iter()
                    .map(|child| self.nodes[*child].member.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn public_of(&self, id: NodeId) -> Option<GroupPoint> {
        self.node(id).map(|node| node.member.public)
    }

    /// Every member of the subtree rooted at `id`, `id` first.
    pub fn subtree_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![];
        let mut stack: Vec<usize> = self.index.get(&id).copied().into_iter().collect();
        while let Some(at) = stack.pop() {
            out.push(self.nodes[at].member.id);
            stack.extend(self.nodes[at].children.iter().rev());
        }
        out
    }

    /// Aggregate public key of the subtree rooted at `id`; the identity for unknown ids.
    pub fn subtree_public(&self, id: NodeId) -> GroupPoint {
        self.subtree_of(id)
            .into_iter()
            .filter_map(|member| self.public_of(member))
            .fold(identity(), |acc, public| add_points(&acc, &public))
    }

    pub fn aggregate_public(&self) -> GroupPoint {
        self.subtree_public(self.root())
    }

    /// Longest path down to a leaf; leaves have height zero.
    pub fn height_of(&self, id: NodeId) -> u32 {
        match self.index.get(&id) {
            Some(at) => self.height_at(*at),
            None => 0,
        }
    }

    fn height_at(&self, at: usize) -> u32 {
        self.nodes[at]
            .children
            .iter()
            .map(|child| self.height_at(*child) + 1)
            .max()
            .unwrap_or(0)
    }

    fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.index.get(&id).map(|at| &self.nodes[*at])
    }
}

fn member_of(roster: &Roster, id: NodeId) -> Option<Member> {
    roster.members().iter().find(|member| member.id == id).copied()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::group::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn roster(n: usize) -> Roster {
        let mut rng = ChaCha20Rng::seed_from_u64(n as u64);
        Roster::from_keys((0..n).map(|_| KeyPair::generate(&mut rng).public()))
    }

    #[test]
    fn views_rotate_the_root() {
        let roster = roster(5);
        for view in 0..10 {
            let tree = Tree::for_view(&roster, view, 2).unwrap();
            assert_eq!(Some(tree.root()), roster.root_for(view));
            assert_eq!(tree.len(), 5);
            assert_eq!(tree.parent_of(tree.root()), None);
        }
    }

    #[test]
    fn branching_one_is_a_chain() {
        let roster = roster(4);
        let tree = Tree::for_view(&roster, 1, 1).unwrap();
        assert_eq!(tree.root(), NodeId(1));
        assert_eq!(tree.children_of(NodeId(1)), vec![NodeId(2)]);
        assert_eq!(tree.children_of(NodeId(3)), vec![NodeId(0)]);
        assert_eq!(tree.height_of(NodeId(1)), 3);
        assert_eq!(tree.height_of(NodeId(0)), 0);
    }

    #[test]
    fn subtree_keys_add_up() {
        let roster = roster(7);
        let tree = Tree::for_view(&roster, 0, 2).unwrap();
        assert_eq!(tree.aggregate_public(), roster.aggregate_public());
        let children = tree.children_of(tree.root());
        let sum = children
            .iter()
            .fold(tree.public_of(tree.root()).unwrap(), |acc, child| {
                add_points(&acc, &tree.subtree_public(*child))
            });
        assert_eq!(sum, tree.aggregate_public());
        assert_eq!(tree.subtree_public(NodeId(99)), identity());
    }

    #[test]
    fn explicit_edges() {
        let roster = roster(3);
        let tree = Tree::from_edges(
            &roster,
            0,
            NodeId(2),
            &[(NodeId(2), NodeId(0)), (NodeId(2), NodeId(1))],
        )
        .unwrap();
        assert_eq!(tree.root(), NodeId(2));
        assert_eq!(tree.children_of(NodeId(2)), vec![NodeId(0), NodeId(1)]);
        assert!(Tree::from_edges(&roster, 0, NodeId(0), &[(NodeId(1), NodeId(2))]).is_none());
        assert!(Tree::from_edges(&roster, 0, NodeId(0), &[(NodeId(0), NodeId(0))]).is_none());
    }
}
