use std::collections::{BTreeMap, HashMap};

use nalgebra::{Point3, Vector3};

use crate::view::ViewId;

use super::aggregate::CorrespondingPair;

/// Identity of one landmark: the view it was detected in, its label and its
/// index in that view's list.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LandmarkKey {
    pub view: ViewId,
    pub label: String,
    pub index: usize,
}

/// Union-find over dense element indices, with path compression and union
/// by rank.
#[derive(Clone, Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Add a new singleton set and return its index.
    pub fn push(&mut self) -> usize {
        let idx = self.parent.len();
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// One landmark contributing to a reference point.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceMember {
    pub key: LandmarkKey,
    /// Position in the view's local image coordinates.
    pub local: Point3<f64>,
    /// Position in world (output) coordinates under the rigid registration.
    pub world: Point3<f64>,
}

/// Estimated world location of one physical structure, seen in several
/// views.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencePoint {
    pub world: Point3<f64>,
    /// Members sorted by key; each landmark appears once.
    pub members: Vec<ReferenceMember>,
}

/// A reference point as seen from one view: where it sits in the view's
/// image and where it has to end up in output space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceAnchor {
    pub local: Point3<f64>,
    pub target: Point3<f64>,
}

/// Group corresponding landmark pairs into connected components and average
/// each component with two or more members into a reference point.
///
/// The result does not depend on the order in which pairs are supplied:
/// members are sorted by key before averaging and the reference points are
/// sorted by their first member.
pub fn compute_reference_points<'a, I>(pairs: I) -> Vec<ReferencePoint>
where
    I: IntoIterator<Item = &'a CorrespondingPair>,
{
    let mut index_of: HashMap<LandmarkKey, usize> = HashMap::new();
    let mut members: Vec<ReferenceMember> = Vec::new();
    let mut sets = DisjointSet::new(0);

    let mut intern = |m: &super::aggregate::LandmarkRef,
                      sets: &mut DisjointSet,
                      members: &mut Vec<ReferenceMember>|
     -> usize {
        *index_of.entry(m.key.clone()).or_insert_with(|| {
            members.push(ReferenceMember {
                key: m.key.clone(),
                local: m.local,
                world: m.world,
            });
            sets.push()
        })
    };

    for pair in pairs {
        let a = intern(&pair.a, &mut sets, &mut members);
        let b = intern(&pair.b, &mut sets, &mut members);
        sets.union(a, b);
    }

    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..members.len() {
        let root = sets.find(i);
        components.entry(root).or_default().push(i);
    }

    let mut points: Vec<ReferencePoint> = components
        .into_values()
        .filter(|c| c.len() >= 2)
        .map(|component| {
            let mut group: Vec<ReferenceMember> =
                component.into_iter().map(|i| members[i].clone()).collect();
            group.sort_by(|x, y| x.key.cmp(&y.key));

            let mut sum = Vector3::zeros();
            for m in &group {
                sum += m.world.coords;
            }
            ReferencePoint {
                world: Point3::from(sum / group.len() as f64),
                members: group,
            }
        })
        .collect();

    points.sort_by(|x, y| x.members[0].key.cmp(&y.members[0].key));
    points
}

/// Anchors of every reference point, grouped by the view they were detected
/// in. Views are returned in sorted order.
pub fn anchors_per_view(points: &[ReferencePoint]) -> BTreeMap<ViewId, Vec<ReferenceAnchor>> {
    let mut anchors: BTreeMap<ViewId, Vec<ReferenceAnchor>> = BTreeMap::new();
    for point in points {
        for member in &point.members {
            anchors
                .entry(member.key.view)
                .or_default()
                .push(ReferenceAnchor {
                    local: member.local,
                    target: point.world,
                });
        }
    }
    anchors
}
