use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::Bodies;
use crate::comm::{Communicator, Division};
use crate::error::{Error, Result};
use crate::space::Space;
use crate::vector::{accumulate_centroid_into, Real, Vector};

/// Shape of a tree node: a leaf holds one body, an inner node holds up to
/// 2^D children addressed by part index. Children are pool indices, never
/// references, which keeps trees cheap to copy, merge and serialise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Inner { children: Vec<Option<usize>> },
    Leaf { body: usize },
}

/// One node of the body tree. `mass` and `center_of_mass` aggregate every
/// leaf underneath, so an inner node can stand in for its whole subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node<T, const D: usize> {
    pub space: Space<T, D>,
    pub mass: T,
    pub center_of_mass: Vector<T, D>,
    pub kind: NodeKind,
}

impl<T: Real, const D: usize> Node<T, D> {
    fn leaf(space: Space<T, D>, mass: T, center_of_mass: Vector<T, D>, body: usize) -> Self {
        Self {
            space,
            mass,
            center_of_mass,
            kind: NodeKind::Leaf { body },
        }
    }
}

/// A 2^D-way spatial decomposition over a pool of nodes. Index 0, if the
/// pool is non-empty, is the root. The pool is rebuilt from scratch every
/// step; nodes are never mutated across steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyTree<T, const D: usize> {
    pub nodes: Vec<Node<T, D>>,
}

impl<T: Real, const D: usize> Default for BodyTree<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real, const D: usize> BodyTree<T, D> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &Node<T, D> {
        &self.nodes[index]
    }

    /// Pool index of child `part` of an inner node, if present.
    pub fn child_of(&self, index: usize, part: usize) -> Option<usize> {
        match &self.nodes[index].kind {
            NodeKind::Inner { children } => children[part],
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Body index held by a leaf node.
    pub fn body_of(&self, index: usize) -> Option<usize> {
        match self.nodes[index].kind {
            NodeKind::Leaf { body } => Some(body),
            NodeKind::Inner { .. } => None,
        }
    }

    /// Insert one body. An empty tree gains a single leaf spanning the root
    /// space; otherwise the body sinks from the root, splitting any leaf it
    /// lands on.
    pub fn push(
        &mut self,
        bodies: &Bodies<T, D>,
        root_space: &Space<T, D>,
        body: usize,
    ) -> Result<()> {
        self.try_push(bodies, root_space, body)
            .map_err(|body| Error::CoincidentBodies { body })
    }

    /// Merge `other` into `self`, equivalent to inserting every leaf of
    /// `other`. Both trees must be rooted at the same space.
    pub fn merge(&mut self, other: &BodyTree<T, D>, bodies: &Bodies<T, D>) -> Result<()> {
        self.try_merge(other, bodies)
            .map_err(|body| Error::CoincidentBodies { body })
    }

    // The internal insert/merge paths report only the offending body index;
    // the collective build carries that through the reduction and maps it
    // back to an error at the end.

    fn try_push(
        &mut self,
        bodies: &Bodies<T, D>,
        root_space: &Space<T, D>,
        body: usize,
    ) -> std::result::Result<(), usize> {
        if self.nodes.is_empty() {
            self.nodes.push(Node::leaf(
                *root_space,
                bodies[body].mass,
                bodies[body].position,
                body,
            ));
            return Ok(());
        }
        self.push_at(bodies, 0, body)
    }

    fn push_at(
        &mut self,
        bodies: &Bodies<T, D>,
        start: usize,
        body: usize,
    ) -> std::result::Result<(), usize> {
        let position = bodies[body].position;
        let mass = bodies[body].mass;

        let mut current = start;
        loop {
            if matches!(self.nodes[current].kind, NodeKind::Leaf { .. }) {
                if self.nodes[current].center_of_mass == position {
                    // The acceptance criterion cannot separate two bodies at
                    // the same point.
                    return Err(body);
                }
                self.expand_leaf(current);
            }

            let part = self.nodes[current].space.part_of(&position);
            let node = &mut self.nodes[current];
            accumulate_centroid_into(&mut node.center_of_mass, &mut node.mass, position, mass);

            match self.child_of(current, part) {
                Some(child) => current = child,
                None => {
                    let space = self.nodes[current].space.subspace(part);
                    let leaf = self.nodes.len();
                    self.nodes.push(Node::leaf(space, mass, position, body));
                    self.set_child(current, part, leaf);
                    return Ok(());
                }
            }
        }
    }

    /// Turn a leaf into an inner node whose only child is a new leaf holding
    /// the displaced body. The node keeps its aggregate, which still
    /// describes that one body; the caller retries at the same index.
    fn expand_leaf(&mut self, index: usize) {
        let node = &self.nodes[index];
        let body = match node.kind {
            NodeKind::Leaf { body } => body,
            NodeKind::Inner { .. } => return,
        };
        let part = node.space.part_of(&node.center_of_mass);
        let leaf = Node::leaf(
            node.space.subspace(part),
            node.mass,
            node.center_of_mass,
            body,
        );

        let child = self.nodes.len();
        self.nodes.push(leaf);
        let mut children = vec![None; Space::<T, D>::PARTS];
        children[part] = Some(child);
        self.nodes[index].kind = NodeKind::Inner { children };
    }

    fn set_child(&mut self, index: usize, part: usize, child: usize) {
        match &mut self.nodes[index].kind {
            NodeKind::Inner { children } => children[part] = Some(child),
            NodeKind::Leaf { .. } => unreachable!("leaf nodes hold no children"),
        }
    }

    fn try_merge(
        &mut self,
        other: &BodyTree<T, D>,
        bodies: &Bodies<T, D>,
    ) -> std::result::Result<(), usize> {
        if other.nodes.is_empty() {
            return Ok(());
        }
        if self.nodes.is_empty() {
            self.nodes = other.nodes.clone();
            return Ok(());
        }
        debug_assert_eq!(self.nodes[0].space, other.nodes[0].space);
        self.merge_at(0, other, 0, bodies)
    }

    fn merge_at(
        &mut self,
        a: usize,
        other: &BodyTree<T, D>,
        b: usize,
        bodies: &Bodies<T, D>,
    ) -> std::result::Result<(), usize> {
        match &other.nodes[b].kind {
            // A foreign leaf takes the single-body insertion path into our
            // subtree.
            NodeKind::Leaf { body } => self.push_at(bodies, a, *body),
            NodeKind::Inner {
                children: other_children,
            } => {
                if let NodeKind::Leaf { body: displaced } = self.nodes[a].kind {
                    // Replace our leaf with the foreign subtree, then sink
                    // the displaced body back into it.
                    self.graft(other, b, a);
                    return self.push_at(bodies, a, displaced);
                }

                let node = &mut self.nodes[a];
                accumulate_centroid_into(
                    &mut node.center_of_mass,
                    &mut node.mass,
                    other.nodes[b].center_of_mass,
                    other.nodes[b].mass,
                );

                for (part, other_child) in other_children.iter().enumerate() {
                    let Some(other_child) = *other_child else {
                        continue;
                    };
                    match self.child_of(a, part) {
                        Some(our_child) => self.merge_at(our_child, other, other_child, bodies)?,
                        None => {
                            let copied = self.copy_subtree(other, other_child);
                            self.set_child(a, part, copied);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Overwrite node `dest` with a deep copy of `other`'s subtree at `b`;
    /// copied children land at the end of the pool.
    fn graft(&mut self, other: &BodyTree<T, D>, b: usize, dest: usize) {
        let mut node = other.nodes[b].clone();
        if let NodeKind::Inner { children } = &mut node.kind {
            for slot in children.iter_mut() {
                if let Some(child) = *slot {
                    *slot = Some(self.copy_subtree(other, child));
                }
            }
        }
        self.nodes[dest] = node;
    }

    /// Append a deep copy of `other`'s subtree at `b` and return the index
    /// of its copied root.
    fn copy_subtree(&mut self, other: &BodyTree<T, D>, b: usize) -> usize {
        let mut node = other.nodes[b].clone();
        if let NodeKind::Inner { children } = &mut node.kind {
            for slot in children.iter_mut() {
                if let Some(child) = *slot {
                    *slot = Some(self.copy_subtree(other, child));
                }
            }
        }
        let index = self.nodes.len();
        self.nodes.push(node);
        index
    }

    /// Wire encoding: pool length followed by the nodes in pool order. The
    /// encoding round-trips bit-identically.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Failure(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Failure(e.to_string()))
    }
}

/// A rank's contribution to the tree reduction: its partial tree, or the
/// body that made the local phase fail. Failures must still travel through
/// the collective so every rank leaves the reduction with the same outcome.
#[derive(Clone, Serialize, Deserialize)]
enum Partial<T, const D: usize> {
    Tree(BodyTree<T, D>),
    Coincident(usize),
}

impl<T: Real, const D: usize> Partial<T, D> {
    fn from_build(result: std::result::Result<BodyTree<T, D>, usize>) -> Self {
        match result {
            Ok(tree) => Partial::Tree(tree),
            Err(body) => Partial::Coincident(body),
        }
    }
}

/// Collective tree construction: every rank inserts its slice of the bodies
/// into a local tree rooted at the shared bounding box, then the group merge
/// reduces the partial trees over a fixed binary tree of ranks. Every rank
/// ends with the identical tree.
pub fn build_tree<C, T, const D: usize>(
    comm: &C,
    root_space: &Space<T, D>,
    bodies: &Bodies<T, D>,
) -> Result<BodyTree<T, D>>
where
    C: Communicator,
    T: Real,
{
    let division = Division::new(comm, bodies.len())?;

    let local: std::result::Result<BodyTree<T, D>, usize> = (|| {
        let mut tree = BodyTree::new();
        for body in division.begin..division.end {
            tree.try_push(bodies, root_space, body)?;
        }
        Ok(tree)
    })();
    trace!(
        rank = comm.rank(),
        nodes = local.as_ref().map(BodyTree::len).unwrap_or(0),
        "local tree built"
    );

    let reduced = comm.all_reduce(Partial::from_build(local), |a, b| match (a, b) {
        (Partial::Tree(mut a), Partial::Tree(b)) => {
            Partial::from_build(a.try_merge(&b, bodies).map(|()| a))
        }
        (Partial::Coincident(body), _) | (_, Partial::Coincident(body)) => {
            Partial::Coincident(body)
        }
    });

    match reduced {
        Partial::Tree(tree) => Ok(tree),
        Partial::Coincident(body) => Err(Error::CoincidentBodies { body }),
    }
}
