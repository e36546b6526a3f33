//! Bank tree construction and bottom-up usage aggregation.
//!
//! Banks are stored in an arena indexed by name. Construction validates the
//! tree: exactly one root, every parent known, every bank reachable from the
//! root (an unreachable bank can only sit on a `parent_bank` cycle).
//! Traversals use an explicit stack, so depth is bounded by memory only.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use fairshare_core::error::IntegrityError;
use fairshare_core::store::LedgerWrite;
use fairshare_core::types::{AssociationKey, Bank};

#[derive(Debug, Clone)]
struct BankNode {
    name: String,
    children: Vec<usize>,
}

/// A validated, acyclic bank tree.
#[derive(Debug, Clone)]
pub struct BankTree {
    nodes: Vec<BankNode>,
    index: HashMap<String, usize>,
    root: usize,
}

impl BankTree {
    /// Build and validate the tree.
    ///
    /// # Errors
    ///
    /// - [`IntegrityError::NoRootBank`] / [`IntegrityError::MultipleRootBanks`]
    /// - [`IntegrityError::UnknownParentBank`] if a parent name is not a bank
    /// - [`IntegrityError::CyclicBankTree`] if a bank is unreachable from the root
    pub fn build(banks: &[Bank]) -> Result<Self, IntegrityError> {
        let mut sorted: Vec<&Bank> = banks.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes = Vec::with_capacity(sorted.len());
        let mut index = HashMap::with_capacity(sorted.len());
        for bank in &sorted {
            index.insert(bank.name.clone(), nodes.len());
            nodes.push(BankNode {
                name: bank.name.clone(),
                children: Vec::new(),
            });
        }

        let roots: Vec<&str> = sorted
            .iter()
            .filter(|b| b.is_root())
            .map(|b| b.name.as_str())
            .collect();
        let root = match roots.as_slice() {
            [] => return Err(IntegrityError::NoRootBank),
            [only] => index[*only],
            _ => {
                return Err(IntegrityError::MultipleRootBanks(
                    roots.iter().map(|r| r.to_string()).collect(),
                ));
            }
        };

        // Children end up in name order because `sorted` is.
        for bank in sorted.iter().filter(|b| !b.is_root()) {
            let parent = bank.parent_bank.as_deref().unwrap_or_default();
            let parent_idx = *index.get(parent).ok_or_else(|| IntegrityError::UnknownParentBank {
                bank: bank.name.clone(),
                parent: parent.to_string(),
            })?;
            let child_idx = index[&bank.name];
            nodes[parent_idx].children.push(child_idx);
        }

        let tree = Self { nodes, index, root };
        tree.check_reachable()?;
        Ok(tree)
    }

    fn check_reachable(&self) -> Result<(), IntegrityError> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                return Err(IntegrityError::CyclicBankTree(self.nodes[idx].name.clone()));
            }
            stack.extend(self.nodes[idx].children.iter().copied());
        }
        match seen.iter().position(|s| !s) {
            Some(idx) => Err(IntegrityError::CyclicBankTree(self.nodes[idx].name.clone())),
            None => Ok(()),
        }
    }

    pub fn root(&self) -> &str {
        &self.nodes[self.root].name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, bank: &str) -> bool {
        self.index.contains_key(bank)
    }

    /// Direct sub-banks of `bank`, in name order. Empty for unknown banks.
    pub fn children(&self, bank: &str) -> Vec<&str> {
        self.index
            .get(bank)
            .map(|&idx| {
                self.nodes[idx]
                    .children
                    .iter()
                    .map(|&c| self.nodes[c].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `bank` has no sub-banks, i.e. its usage comes from associations.
    pub fn is_leaf(&self, bank: &str) -> bool {
        self.index
            .get(bank)
            .is_some_and(|&idx| self.nodes[idx].children.is_empty())
    }

    /// Every bank with its depth (root = 0), parents before children,
    /// siblings in name order.
    pub fn pre_order(&self) -> Vec<(usize, &str)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, self.root)];
        while let Some((depth, idx)) = stack.pop() {
            out.push((depth, self.nodes[idx].name.as_str()));
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Recompute every bank's usage from association usage.
    ///
    /// A bank with sub-banks totals its children; a bank without totals the
    /// associations whose bank it is. Associations attached directly to a
    /// bank that has sub-banks do not count.
    ///
    /// # Errors
    ///
    /// [`IntegrityError::OrphanAssociation`] if an association names a bank
    /// that is not in the tree.
    pub fn aggregate<'a, I>(&self, association_usage: I) -> Result<BankUsage, IntegrityError>
    where
        I: IntoIterator<Item = (&'a AssociationKey, f64)>,
    {
        let mut direct = vec![0.0f64; self.nodes.len()];
        for (key, usage) in association_usage {
            let idx = *self
                .index
                .get(&key.bank)
                .ok_or_else(|| IntegrityError::OrphanAssociation {
                    username: key.username.clone(),
                    bank: key.bank.clone(),
                })?;
            if !self.nodes[idx].children.is_empty() {
                debug!(association = %key, "association under non-leaf bank not aggregated");
            }
            direct[idx] += usage;
        }

        // Post-order: a node is finalized after all of its children.
        let mut totals = vec![0.0f64; self.nodes.len()];
        let mut stack = vec![(self.root, false)];
        while let Some((idx, expanded)) = stack.pop() {
            let node = &self.nodes[idx];
            if node.children.is_empty() {
                totals[idx] = direct[idx];
            } else if expanded {
                totals[idx] = node.children.iter().map(|&c| totals[c]).sum();
            } else {
                stack.push((idx, true));
                stack.extend(node.children.iter().map(|&c| (c, false)));
            }
        }

        let totals = self
            .nodes
            .iter()
            .zip(totals)
            .map(|(node, total)| (node.name.clone(), total))
            .collect();
        Ok(BankUsage {
            root: self.root().to_string(),
            totals,
        })
    }
}

/// Aggregated usage of every bank after one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct BankUsage {
    root: String,
    totals: BTreeMap<String, f64>,
}

impl BankUsage {
    pub fn get(&self, bank: &str) -> Option<f64> {
        self.totals.get(bank).copied()
    }

    pub fn root_usage(&self) -> f64 {
        self.get(&self.root).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.totals.iter().map(|(name, total)| (name.as_str(), *total))
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// One `SetBankUsage` per bank.
    pub fn writes(&self) -> Vec<LedgerWrite> {
        self.totals
            .iter()
            .map(|(bank, total)| LedgerWrite::SetBankUsage {
                bank: bank.clone(),
                job_usage: *total,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bank(name: &str, parent: Option<&str>) -> Bank {
        Bank::new(name, parent.map(str::to_string))
    }

    /// root -> {A -> {D, E}, B, C}
    fn sample_banks() -> Vec<Bank> {
        vec![
            bank("root", None),
            bank("A", Some("root")),
            bank("B", Some("root")),
            bank("C", Some("root")),
            bank("D", Some("A")),
            bank("E", Some("A")),
        ]
    }

    fn usage(pairs: &[(&str, &str, f64)]) -> Vec<(AssociationKey, f64)> {
        pairs
            .iter()
            .map(|(user, bank, u)| (AssociationKey::new(*user, *bank), *u))
            .collect()
    }

    #[test]
    fn builds_valid_tree() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        assert_eq!(tree.root(), "root");
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.children("root"), vec!["A", "B", "C"]);
        assert_eq!(tree.children("A"), vec!["D", "E"]);
        assert!(tree.is_leaf("D"));
        assert!(!tree.is_leaf("A"));
        assert!(!tree.is_leaf("nope"));
        assert!(tree.contains("E"));
    }

    #[test]
    fn no_root_is_fatal() {
        let banks = vec![bank("A", Some("B")), bank("B", Some("A"))];
        assert_eq!(BankTree::build(&banks).unwrap_err(), IntegrityError::NoRootBank);
    }

    #[test]
    fn multiple_roots_are_fatal() {
        let banks = vec![bank("r1", None), bank("r2", Some(""))];
        assert_eq!(
            BankTree::build(&banks).unwrap_err(),
            IntegrityError::MultipleRootBanks(vec!["r1".into(), "r2".into()])
        );
    }

    #[test]
    fn unknown_parent_is_fatal() {
        let banks = vec![bank("root", None), bank("A", Some("ghost"))];
        assert!(matches!(
            BankTree::build(&banks).unwrap_err(),
            IntegrityError::UnknownParentBank { .. }
        ));
    }

    #[test]
    fn cycle_below_root_is_detected() {
        let banks = vec![
            bank("root", None),
            bank("A", Some("root")),
            bank("X", Some("Y")),
            bank("Y", Some("X")),
        ];
        assert!(matches!(
            BankTree::build(&banks).unwrap_err(),
            IntegrityError::CyclicBankTree(_)
        ));
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let banks = vec![bank("root", None), bank("S", Some("S"))];
        assert_eq!(
            BankTree::build(&banks).unwrap_err(),
            IntegrityError::CyclicBankTree("S".into())
        );
    }

    #[test]
    fn three_level_tree_aggregates() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        let assoc = usage(&[
            ("u1", "D", 20.0),
            ("u2", "D", 5.0),
            ("u3", "E", 10.0),
            ("u4", "B", 7.0),
            ("u5", "C", 3.0),
        ]);
        let totals = tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))).unwrap();
        assert_eq!(totals.get("D"), Some(25.0));
        assert_eq!(totals.get("E"), Some(10.0));
        assert_eq!(totals.get("A"), Some(35.0));
        assert_eq!(totals.get("B"), Some(7.0));
        assert_eq!(totals.root_usage(), 45.0);
        assert_eq!(totals.len(), 6);
        assert_eq!(totals.writes().len(), 6);
    }

    #[test]
    fn association_on_inner_bank_is_ignored() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        let assoc = usage(&[("u1", "A", 100.0), ("u2", "D", 1.0)]);
        let totals = tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))).unwrap();
        assert_eq!(totals.get("A"), Some(1.0));
    }

    #[test]
    fn orphan_association_is_fatal() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        let assoc = usage(&[("u1", "Z", 1.0)]);
        assert!(matches!(
            tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))),
            Err(IntegrityError::OrphanAssociation { .. })
        ));
    }

    #[test]
    fn empty_leaves_total_zero() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        let totals = tree.aggregate(std::iter::empty()).unwrap();
        assert!(totals.iter().all(|(_, t)| t == 0.0));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        let assoc = usage(&[("u1", "D", 2.5), ("u2", "E", 4.0)]);
        let first = tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))).unwrap();
        let second = tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pre_order_lists_parents_first() {
        let tree = BankTree::build(&sample_banks()).unwrap();
        assert_eq!(
            tree.pre_order(),
            vec![(0, "root"), (1, "A"), (2, "D"), (2, "E"), (1, "B"), (1, "C")]
        );
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let mut banks = vec![bank("b0", None)];
        for i in 1..20_000 {
            banks.push(Bank::new(format!("b{i}"), Some(format!("b{}", i - 1))));
        }
        let tree = BankTree::build(&banks).unwrap();
        let leaf = AssociationKey::new("u", "b19999");
        let totals = tree.aggregate([(&leaf, 3.0)]).unwrap();
        assert_eq!(totals.root_usage(), 3.0);
    }

    proptest! {
        #[test]
        fn root_equals_sum_of_leaf_usage(
            leaf_usage in prop::collection::vec(0.0f64..1e6, 1..12),
        ) {
            // root -> mid -> leaf_i
            let mut banks = vec![bank("root", None), bank("mid", Some("root"))];
            let mut assoc = Vec::new();
            for (i, u) in leaf_usage.iter().enumerate() {
                let name = format!("leaf{i:02}");
                banks.push(Bank::new(name.clone(), Some("mid".into())));
                assoc.push((AssociationKey::new("user", name), *u));
            }
            let tree = BankTree::build(&banks).unwrap();
            let totals = tree.aggregate(assoc.iter().map(|(k, u)| (k, *u))).unwrap();
            let expected: f64 = assoc.iter().map(|(_, u)| u).sum();
            prop_assert!((totals.root_usage() - expected).abs() <= 1e-6 * expected.max(1.0));
            prop_assert_eq!(totals.get("mid"), totals.get("root"));
        }
    }
}
