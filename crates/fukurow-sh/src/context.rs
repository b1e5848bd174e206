//! 飽和コンテキスト
//!
//! (入力ロール, コア概念) の組ごとに一つ存在し、受理済みの節、
//! 保留中の節、グラフ辺、全称制約を保持します。

use crate::clause::Clause;
use crate::config::ReasonerConfig;
use crate::model::{ConceptId, Literal, RoleId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Stable arena index of a context
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub(crate) usize);

impl ContextId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Context {
    /// Incoming role; `None` for goal contexts
    pub(crate) role: Option<RoleId>,
    pub(crate) core: ConceptId,
    /// The existential literal through which predecessors reach this context
    pub(crate) via: Option<Literal>,
    /// Shared Top context standing for every context with the same incoming role
    pub(crate) top: bool,
    /// Private successor of a single predecessor core that carries universals
    pub(crate) secondary: bool,
    pub(crate) satisfiable: bool,
    pub(crate) processing: bool,
    pub(crate) queued: bool,
    /// One disjunction may still be split (goal contexts only)
    pub(crate) split_available: bool,
    index: HashMap<Literal, Vec<Clause>>,
    pending: BTreeMap<(usize, u64), Clause>,
    sequence: u64,
    /// Clauses already sent to predecessors
    pub(crate) pushed: HashSet<Clause>,
    pub(crate) forward: BTreeSet<(RoleId, ContextId)>,
    pub(crate) backward: BTreeSet<ContextId>,
    /// Universal obligations `(role, clause)` for every successor over a sub-role
    pub(crate) universals: BTreeSet<(RoleId, Clause)>,
    pub(crate) subsumers: Vec<ConceptId>,
    /// Every clause admitted so far, in admission order
    #[cfg(test)]
    pub(crate) history: Vec<Clause>,
}

impl Context {
    pub(crate) fn new(role: Option<RoleId>, core: ConceptId, via: Option<Literal>, top: bool) -> Self {
        Self {
            role,
            core,
            via,
            top,
            secondary: false,
            satisfiable: true,
            processing: false,
            queued: false,
            split_available: role.is_none() && !top,
            index: HashMap::new(),
            pending: BTreeMap::new(),
            sequence: 0,
            pushed: HashSet::new(),
            forward: BTreeSet::new(),
            backward: BTreeSet::new(),
            universals: BTreeSet::new(),
            subsumers: Vec::new(),
            #[cfg(test)]
            history: Vec::new(),
        }
    }

    pub fn role(&self) -> Option<RoleId> {
        self.role
    }

    pub fn core(&self) -> ConceptId {
        self.core
    }

    pub fn is_satisfiable(&self) -> bool {
        self.satisfiable
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    pub fn is_root(&self) -> bool {
        self.role.is_none()
    }

    /// Atomic subsumers found so far (goal contexts only)
    pub fn subsumers(&self) -> &[ConceptId] {
        &self.subsumers
    }

    pub(crate) fn enqueue(&mut self, clause: Clause) {
        self.sequence += 1;
        self.pending.insert((clause.len(), self.sequence), clause);
    }

    /// Smallest pending clause, oldest first among equal sizes
    pub(crate) fn next_pending(&mut self) -> Option<Clause> {
        self.pending.pop_first().map(|(_, clause)| clause)
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Accepted clauses whose first literal, without its structural marker, is `key`
    pub(crate) fn indexed(&self, key: Literal) -> &[Clause] {
        self.index.get(&key.without_structure()).map_or(&[], Vec::as_slice)
    }

    /// Redundancy check and insertion; `false` when the clause is already implied
    pub(crate) fn admit(&mut self, clause: &Clause, config: &ReasonerConfig) -> bool {
        let Some(front) = clause.first() else {
            return false;
        };
        if config.subset_elimination {
            for literal in clause.iter() {
                if self.indexed(literal).iter().any(|accepted| accepted.subset(clause)) {
                    return false;
                }
            }
        } else if self.indexed(front).iter().any(|accepted| accepted == clause) {
            return false;
        }

        if config.backward_subsumption {
            for bucket in self.index.values_mut() {
                bucket.retain(|accepted| !clause.subset(accepted));
            }
            self.index.retain(|_, bucket| !bucket.is_empty());
        }

        self.index
            .entry(front.without_structure())
            .or_default()
            .push(clause.clone());
        #[cfg(test)]
        self.history.push(clause.clone());
        true
    }

    /// Clauses currently held in the index
    pub fn index_size(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn clauses(&self) -> impl Iterator<Item = &Clause> + '_ {
        self.index.values().flatten()
    }

    /// Drop all derived state after the empty clause was derived
    pub(crate) fn clear(&mut self) {
        self.satisfiable = false;
        self.index.clear();
        self.pending.clear();
        self.pushed.clear();
        self.pushed.insert(Clause::empty());
        self.forward.clear();
        self.backward.clear();
        self.universals.clear();
        self.subsumers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TermFactory;

    fn clause(literals: &[ConceptId]) -> Clause {
        Clause::from_literals(literals.iter().map(|&c| Literal::plain(c)))
    }

    #[test]
    fn test_pending_pops_smallest_first() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let b = terms.atomic("B");
        let c = terms.atomic("C");
        let mut context = Context::new(None, a, None, false);
        context.enqueue(clause(&[a, b]));
        context.enqueue(clause(&[c]));
        context.enqueue(clause(&[b]));
        assert_eq!(context.next_pending(), Some(clause(&[c])));
        assert_eq!(context.next_pending(), Some(clause(&[b])));
        assert_eq!(context.next_pending(), Some(clause(&[a, b])));
        assert!(!context.has_pending());
    }

    #[test]
    fn test_forward_subsumption() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let b = terms.atomic("B");
        let c = terms.atomic("C");
        let config = ReasonerConfig::default();
        let mut context = Context::new(None, a, None, false);
        assert!(context.admit(&clause(&[b]), &config));
        assert!(!context.admit(&clause(&[a, b]), &config));
        assert!(!context.admit(&clause(&[b]), &config));
        assert!(context.admit(&clause(&[a, c]), &config));
        assert_eq!(context.index_size(), 2);
    }

    #[test]
    fn test_duplicate_check_without_subset_elimination() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let b = terms.atomic("B");
        let config = ReasonerConfig { subset_elimination: false, ..ReasonerConfig::default() };
        let mut context = Context::new(None, a, None, false);
        assert!(context.admit(&clause(&[b]), &config));
        assert!(!context.admit(&clause(&[b]), &config));
        assert!(context.admit(&clause(&[a, b]), &config));
    }

    #[test]
    fn test_backward_subsumption_evicts_supersets() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let b = terms.atomic("B");
        let c = terms.atomic("C");
        let config = ReasonerConfig { backward_subsumption: true, ..ReasonerConfig::default() };
        let mut context = Context::new(None, a, None, false);
        assert!(context.admit(&clause(&[a, b]), &config));
        assert!(context.admit(&clause(&[a, c]), &config));
        assert!(context.admit(&clause(&[b]), &config));
        assert_eq!(context.index_size(), 2);
        assert!(context.indexed(Literal::plain(a)).iter().all(|kept| kept == &clause(&[a, c])));
    }

    #[test]
    fn test_clear_leaves_only_falsity() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let config = ReasonerConfig::default();
        let mut context = Context::new(None, a, None, false);
        context.admit(&clause(&[a]), &config);
        context.enqueue(clause(&[a]));
        context.clear();
        assert!(!context.is_satisfiable());
        assert_eq!(context.index_size(), 0);
        assert!(!context.has_pending());
        assert!(context.pushed.contains(&Clause::empty()));
    }
}
