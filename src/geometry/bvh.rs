use crate::geometry::Aabb;
use crate::math::Vec3;

const NULL: u32 = u32::MAX;

/// Index of a node inside an [`AabbTree`]. Leaves keep their id for as long as
/// they are in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    parent: u32,
    left: u32,
    right: u32,
    height: i32,
    data: Option<T>,
}

impl<T> Node<T> {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == NULL
    }
}

/// Incrementally built bounding volume hierarchy.
///
/// Leaves carry a small payload (a triangle index for meshes, a body handle for
/// the tree broadphase). Insertion picks the sibling with the lowest surface
/// area cost; leaf boxes can be fattened by a margin so small motions do not
/// force a reinsert.
#[derive(Debug, Clone)]
pub struct AabbTree<T> {
    nodes: Vec<Node<T>>,
    root: u32,
    free: Vec<u32>,
    margin: f32,
    leaf_count: usize,
}

impl<T: Copy> Default for AabbTree<T> {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl<T: Copy> AabbTree<T> {
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL,
            free: Vec::new(),
            margin,
            leaf_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL
    }

    pub fn root(&self) -> Option<NodeId> {
        (self.root != NULL).then_some(NodeId(self.root))
    }

    /// Fattened box stored for `node`.
    pub fn aabb(&self, node: NodeId) -> Aabb {
        self.nodes[node.0 as usize].aabb
    }

    /// Child pair of an internal node, `None` for leaves.
    pub fn children(&self, node: NodeId) -> Option<(NodeId, NodeId)> {
        let n = &self.nodes[node.0 as usize];
        (!n.is_leaf()).then_some((NodeId(n.left), NodeId(n.right)))
    }

    /// Payload of a leaf, `None` for internal nodes.
    pub fn data(&self, node: NodeId) -> Option<T> {
        self.nodes[node.0 as usize].data
    }

    pub fn insert(&mut self, data: T, aabb: Aabb) -> NodeId {
        let leaf = self.allocate(Node {
            aabb: aabb.expand(self.margin),
            parent: NULL,
            left: NULL,
            right: NULL,
            height: 0,
            data: Some(data),
        });
        self.leaf_count += 1;

        if self.root == NULL {
            self.root = leaf;
            return NodeId(leaf);
        }

        let sibling = self.best_sibling(self.nodes[leaf as usize].aabb);
        let old_parent = self.nodes[sibling as usize].parent;
        let parent = self.allocate(Node {
            aabb: self.nodes[leaf as usize]
                .aabb
                .union(self.nodes[sibling as usize].aabb),
            parent: old_parent,
            left: sibling,
            right: leaf,
            height: self.nodes[sibling as usize].height + 1,
            data: None,
        });
        self.nodes[sibling as usize].parent = parent;
        self.nodes[leaf as usize].parent = parent;

        if old_parent == NULL {
            self.root = parent;
        } else {
            let p = &mut self.nodes[old_parent as usize];
            if p.left == sibling {
                p.left = parent;
            } else {
                p.right = parent;
            }
        }

        self.refit(parent);
        NodeId(leaf)
    }

    pub fn remove(&mut self, node: NodeId) {
        let leaf = node.0;
        match self.nodes.get(leaf as usize) {
            Some(n) if n.is_leaf() && n.data.is_some() => {}
            _ => return,
        }
        self.leaf_count = self.leaf_count.saturating_sub(1);

        if leaf == self.root {
            self.root = NULL;
            self.release(leaf);
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        self.nodes[sibling as usize].parent = grandparent;
        if grandparent == NULL {
            self.root = sibling;
        } else {
            let g = &mut self.nodes[grandparent as usize];
            if g.left == parent {
                g.left = sibling;
            } else {
                g.right = sibling;
            }
            self.refit(grandparent);
        }

        self.release(leaf);
        self.release(parent);
    }

    /// Moves a leaf to a new box. Returns the (possibly new) leaf id and whether
    /// the tree changed; nothing happens while the fat box still holds `aabb`.
    pub fn update(&mut self, node: NodeId, aabb: Aabb) -> (NodeId, bool) {
        let n = &self.nodes[node.0 as usize];
        if n.aabb.contains(aabb) {
            return (node, false);
        }
        let Some(data) = n.data else {
            return (node, false);
        };
        self.remove(node);
        (self.insert(data, aabb), true)
    }

    /// Calls `visit` with every leaf whose box overlaps `aabb`.
    pub fn query(&self, aabb: Aabb, mut visit: impl FnMut(NodeId, T)) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let n = &self.nodes[current as usize];
            if !n.aabb.intersects(aabb) {
                continue;
            }
            if let Some(data) = n.data {
                visit(NodeId(current), data);
            } else {
                stack.push(n.left);
                stack.push(n.right);
            }
        }
    }

    /// Calls `visit` with every leaf whose box the segment `start -> end` crosses.
    pub fn query_segment(&self, start: Vec3, end: Vec3, mut visit: impl FnMut(NodeId, T)) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let n = &self.nodes[current as usize];
            if n.aabb.segment_intersection(start, end).is_none() {
                continue;
            }
            if let Some(data) = n.data {
                visit(NodeId(current), data);
            } else {
                stack.push(n.left);
                stack.push(n.right);
            }
        }
    }

    fn best_sibling(&self, aabb: Aabb) -> u32 {
        let mut best = self.root;
        let mut best_cost = aabb.union(self.nodes[best as usize].aabb).surface_area();
        let mut stack = vec![(self.root, 0.0f32)];

        while let Some((current, inherited)) = stack.pop() {
            let n = &self.nodes[current as usize];
            let combined = aabb.union(n.aabb).surface_area();
            let cost = combined + inherited;
            if cost < best_cost {
                best = current;
                best_cost = cost;
            }
            if n.is_leaf() {
                continue;
            }
            // Lower bound for anything placed below this node.
            let inherited = inherited + combined - n.aabb.surface_area();
            if aabb.surface_area() + inherited < best_cost {
                stack.push((n.left, inherited));
                stack.push((n.right, inherited));
            }
        }

        best
    }

    fn refit(&mut self, mut current: u32) {
        while current != NULL {
            let (left, right) = {
                let n = &self.nodes[current as usize];
                (n.left, n.right)
            };
            let (l, r) = (&self.nodes[left as usize], &self.nodes[right as usize]);
            let aabb = l.aabb.union(r.aabb);
            let height = 1 + l.height.max(r.height);
            let n = &mut self.nodes[current as usize];
            n.aabb = aabb;
            n.height = height;
            current = n.parent;
        }
    }

    fn allocate(&mut self, node: Node<T>) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = node;
                index
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, index: u32) {
        let n = &mut self.nodes[index as usize];
        n.data = None;
        n.left = NULL;
        n.right = NULL;
        n.parent = NULL;
        self.free.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_at(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn query_finds_overlapping_leaves() {
        let mut tree = AabbTree::new(0.0);
        for i in 0..16u32 {
            tree.insert(i, unit_at(i as f32 * 2.0));
        }
        assert_eq!(tree.len(), 16);

        let mut hits = Vec::new();
        tree.query(Aabb::new(Vec3::new(3.5, 0.2, 0.2), Vec3::new(6.5, 0.8, 0.8)), |_, i| {
            hits.push(i)
        });
        hits.sort_unstable();
        assert_eq!(hits, vec![2, 3]);
    }

    #[test]
    fn remove_keeps_remaining_leaves() {
        let mut tree = AabbTree::new(0.0);
        let ids: Vec<_> = (0..5u32).map(|i| tree.insert(i, unit_at(i as f32 * 2.0))).collect();
        tree.remove(ids[1]);
        tree.remove(ids[3]);
        assert_eq!(tree.len(), 3);

        let mut hits = Vec::new();
        tree.query(Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0)), |_, i| hits.push(i));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 2, 4]);
    }

    #[test]
    fn update_inside_fat_box_is_free() {
        let mut tree = AabbTree::new(0.5);
        let id = tree.insert(7u32, unit_at(0.0));
        let (same, moved) = tree.update(id, unit_at(0.25));
        assert_eq!(same, id);
        assert!(!moved);

        let (_, moved) = tree.update(id, unit_at(10.0));
        assert!(moved);
        let mut hits = Vec::new();
        tree.query(unit_at(10.0), |_, i| hits.push(i));
        assert_eq!(hits, vec![7]);
    }

    #[test]
    fn segment_query() {
        let mut tree = AabbTree::new(0.0);
        tree.insert(0u32, unit_at(0.0));
        tree.insert(1u32, unit_at(5.0));
        tree.insert(2u32, Aabb::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(1.0, 6.0, 1.0)));

        let mut hits = Vec::new();
        tree.query_segment(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(10.0, 0.5, 0.5), |_, i| {
            hits.push(i)
        });
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }
}
