use {crate::Node, smallvec::SmallVec};

/// Difference between the local and the remote states of a set of [`Node`]s,
/// produced by a reconciliation pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Diff {
    /// List of added [`Node`]s.
    pub added: SmallVec<[Node; 1]>,

    /// List of updated [`Node`]s.
    pub updated: SmallVec<[NodeDiff; 1]>,

    /// List of removed [`Node`]s.
    pub removed: SmallVec<[Node; 1]>,
}

impl Diff {
    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Moves all changes of `other` into this [`Diff`].
    pub fn merge(&mut self, other: Self) {
        self.added.extend(other.added);
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
    }
}

/// Difference between two [`Node`] states.
#[derive(Debug, PartialEq, Eq)]
pub struct NodeDiff {
    /// Old state of the [`Node`].
    pub old: Node,

    /// New state of the [`Node`].
    pub new: Node,
}

/// Brings `local` in line with `remote`, matching [`Node`]s by `key`.
///
/// Matched nodes are updated in place and keep their position, nodes only
/// present in `remote` are appended in the remote order.
pub(crate) fn reconcile<K, F>(local: &mut Vec<Node>, mut remote: Vec<Node>, key: F) -> Diff
where
    K: PartialEq,
    F: Fn(&Node) -> K,
{
    let mut diff = Diff::default();

    local.retain_mut(|node| {
        let node_key = key(node);
        let Some(idx) = remote.iter().position(|new| key(new) == node_key) else {
            diff.removed.push(node.clone());
            return false;
        };

        let new = remote.remove(idx);
        if !node.same_state(&new) {
            let old = node.clone();
            node.update_from(new);
            diff.updated.push(NodeDiff {
                old,
                new: node.clone(),
            });
        }

        true
    });

    for new in remote {
        diff.added.push(new.clone());
        local.push(new);
    }

    diff
}
