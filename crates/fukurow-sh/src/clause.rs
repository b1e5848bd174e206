//! 節 (clause)
//!
//! ソート済み・重複なしのリテラル列。規則本体としても、コンテキスト内の
//! 導出事実としても使われます。内容は構築後に変更されないため、
//! `Arc` で安価に共有できます。

use crate::model::{ConceptId, Literal, TermFactory};
use crate::{Result, ShError};
use itertools::Itertools;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::iter;
use std::sync::Arc;

/// Polarity under which a concept list becomes a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Entailed side: complex concepts get the structural marker
    Positive,
    /// Trigger side: plain literals
    Negative,
}

/// Immutable disjunction of literals
#[derive(Clone, Debug)]
pub struct Clause {
    literals: Arc<[Literal]>,
}

impl Clause {
    /// The empty clause (falsity)
    pub fn empty() -> Self {
        Self { literals: Arc::from(Vec::new()) }
    }

    pub fn unit(literal: Literal) -> Self {
        Self { literals: Arc::from(vec![literal]) }
    }

    pub fn pair(first: Literal, second: Literal) -> Self {
        Self::from_literals([first, second])
    }

    /// Canonical clause over an arbitrary literal collection.
    ///
    /// Literals of the same concept merge into one: it stays plain if either
    /// occurrence is plain and is structural if either occurrence is. The plain
    /// literal remains open to rule resolution, and `annotate` derives the
    /// annotated copy again once it reaches the front of an accepted clause.
    pub fn from_literals<I>(literals: I) -> Self
    where
        I: IntoIterator<Item = Literal>,
    {
        let mut by_concept: Vec<Literal> = literals.into_iter().collect();
        by_concept.sort_unstable_by_key(|l| l.normalize());
        let mut merged: Vec<Literal> = by_concept
            .into_iter()
            .coalesce(|a, b| {
                if a.normalize() == b.normalize() {
                    Ok(Literal::with_markers(
                        a.normalize(),
                        a.is_annotated() && b.is_annotated(),
                        a.is_structural() || b.is_structural(),
                    ))
                } else {
                    Err((a, b))
                }
            })
            .collect();
        merged.sort_unstable();
        Self { literals: Arc::from(merged) }
    }

    pub fn from_concepts(terms: &TermFactory, concepts: &[ConceptId], polarity: Polarity) -> Self {
        Self::from_literals(concepts.iter().map(|&c| match polarity {
            Polarity::Positive => terms.decompose(c),
            Polarity::Negative => Literal::plain(c),
        }))
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn first(&self) -> Option<Literal> {
        self.literals.first().copied()
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn iter(&self) -> impl Iterator<Item = Literal> + '_ {
        self.literals.iter().copied()
    }

    /// Every literal except the first
    pub fn tail(&self) -> impl Iterator<Item = Literal> + '_ {
        self.literals.iter().skip(1).copied()
    }

    /// This clause joined with the tail of `antecedent`, whose first literal fired the rule
    pub fn resolve(&self, antecedent: &Clause) -> Clause {
        if antecedent.len() == 1 {
            return self.clone();
        }
        Self::from_literals(self.iter().chain(antecedent.tail()))
    }

    /// Three-way resolution used when a binary rule fires on two antecedents
    pub fn resolve_pair(&self, first: &Clause, second: &Clause) -> Clause {
        if first.len() == 1 && second.len() == 1 {
            return self.clone();
        }
        Self::from_literals(self.iter().chain(first.tail()).chain(second.tail()))
    }

    /// Whether every literal of this clause occurs in `rhs`.
    ///
    /// Linear merge over both sorted sequences; the structural marker is ignored.
    pub fn subset(&self, rhs: &Clause) -> bool {
        if self.len() > rhs.len() {
            return false;
        }
        let mut candidates = rhs.literals.iter();
        'outer: for literal in self.literals.iter() {
            for candidate in candidates.by_ref() {
                match candidate.rank().cmp(&literal.rank()) {
                    Ordering::Less => continue,
                    Ordering::Equal => continue 'outer,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    /// Same clause with its first literal annotated
    pub fn annotate(&self) -> Result<Clause> {
        let Some((front, tail)) = self.literals.split_first() else {
            return Err(ShError::InvariantViolation("cannot annotate the empty clause".to_string()));
        };
        if front.is_annotated() {
            return Err(ShError::InvariantViolation(
                "clause is already annotated at the front".to_string(),
            ));
        }
        Ok(Self::from_literals(iter::once(front.annotate()).chain(tail.iter().copied())))
    }

    /// Length of the trailing run of annotated literals
    pub fn trailing_annotated(&self) -> usize {
        self.literals.iter().rev().take_while(|l| l.is_annotated()).count()
    }

    pub fn render(&self, terms: &TermFactory) -> String {
        let body = self
            .literals
            .iter()
            .map(|l| {
                let mark = if l.is_annotated() { "*" } else { "" };
                format!("{}{}", terms.display(l.normalize()), mark)
            })
            .join(" | ");
        format!("[{}]", body)
    }
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.literals.iter().zip(other.literals.iter()).all(|(a, b)| a.rank() == b.rank())
    }
}

impl Eq for Clause {}

impl Hash for Clause {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for literal in self.literals.iter() {
            literal.rank().hash(state);
        }
    }
}

impl PartialOrd for Clause {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Clause {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len().cmp(&other.len()).then_with(|| {
            self.literals
                .iter()
                .map(|l| l.rank())
                .cmp(other.literals.iter().map(|l| l.rank()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn atoms(count: usize) -> (TermFactory, Vec<ConceptId>) {
        let mut terms = TermFactory::new();
        let atoms = (0..count).map(|i| terms.atomic(&format!("A{}", i))).collect();
        (terms, atoms)
    }

    fn clause_of(atoms: &[ConceptId], picks: &[usize]) -> Clause {
        Clause::from_literals(picks.iter().map(|&i| Literal::plain(atoms[i])))
    }

    fn concepts(clause: &Clause) -> BTreeSet<ConceptId> {
        clause.iter().map(Literal::normalize).collect()
    }

    #[test]
    fn test_literals_are_sorted_and_deduplicated() {
        let (_, a) = atoms(3);
        let clause = clause_of(&a, &[2, 0, 2, 1, 0]);
        assert_eq!(clause.len(), 3);
        assert!(clause.literals().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_merge_keeps_plain_and_structural() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let r = terms.role("r");
        let some = terms.existential(r, a);
        let clause = Clause::from_literals([
            Literal::plain(a).annotate(),
            Literal::plain(a),
            Literal::plain(some),
            Literal::structural(some),
        ]);
        assert_eq!(clause.len(), 2);
        assert!(clause.iter().all(|l| !l.is_annotated()));
        assert!(clause.iter().any(|l| l.normalize() == some && l.is_structural()));
    }

    #[test]
    fn test_resolve_merges_annotated_and_plain_copies() {
        let (_, a) = atoms(3);
        let body = Clause::from_literals([Literal::plain(a[1]), Literal::plain(a[2]).annotate()]);
        let antecedent = Clause::from_literals([Literal::plain(a[0]), Literal::plain(a[2])]);
        let resolved = body.resolve(&antecedent);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.trailing_annotated(), 0);
        assert_eq!(resolved, clause_of(&a, &[1, 2]));
    }

    #[test]
    fn test_resolve_with_fact_returns_self() {
        let (_, a) = atoms(3);
        let body = clause_of(&a, &[1, 2]);
        let fact = clause_of(&a, &[0]);
        assert_eq!(body.resolve(&fact), body);
        assert_eq!(body.resolve_pair(&fact, &fact), body);
    }

    #[test]
    fn test_resolve_drops_trigger_literal() {
        let (_, a) = atoms(4);
        let body = clause_of(&a, &[3]);
        let antecedent = clause_of(&a, &[0, 1, 2]);
        let resolved = body.resolve(&antecedent);
        assert_eq!(resolved, clause_of(&a, &[1, 2, 3]));

        let other = clause_of(&a, &[1, 3]);
        assert_eq!(Clause::empty().resolve_pair(&antecedent, &other), clause_of(&a, &[1, 2, 3]));
    }

    #[test]
    fn test_subset() {
        let (_, a) = atoms(5);
        assert!(Clause::empty().subset(&clause_of(&a, &[1])));
        assert!(clause_of(&a, &[1, 3]).subset(&clause_of(&a, &[0, 1, 2, 3])));
        assert!(!clause_of(&a, &[1, 4]).subset(&clause_of(&a, &[0, 1, 2, 3])));
        assert!(!clause_of(&a, &[0, 1]).subset(&clause_of(&a, &[1])));
    }

    #[test]
    fn test_subset_distinguishes_annotation() {
        let (_, a) = atoms(2);
        let plain = Clause::from_literals([Literal::plain(a[0]), Literal::plain(a[1])]);
        let annotated = plain.annotate().unwrap();
        assert!(!plain.subset(&annotated));
        assert_ne!(plain, annotated);
    }

    #[test]
    fn test_annotate_moves_front_to_back() {
        let (_, a) = atoms(3);
        let clause = clause_of(&a, &[0, 1, 2]);
        let annotated = clause.annotate().unwrap();
        assert_eq!(annotated.len(), 3);
        assert_eq!(annotated.first().map(Literal::normalize), Some(a[1]));
        assert_eq!(annotated.trailing_annotated(), 1);

        let twice = Clause::from_literals(
            annotated.iter().skip(1).map(|l| l.annotate()).chain(annotated.first()),
        );
        assert_eq!(twice.trailing_annotated(), 2);
    }

    #[test]
    fn test_annotate_rejects_invalid_clauses() {
        let (_, a) = atoms(1);
        assert!(matches!(Clause::empty().annotate(), Err(ShError::InvariantViolation(_))));
        let annotated = clause_of(&a, &[0]).annotate().unwrap();
        assert!(annotated.annotate().is_err());
    }

    #[test]
    fn test_ordering_by_length_first() {
        let (_, a) = atoms(3);
        let short = clause_of(&a, &[2]);
        let long = clause_of(&a, &[0, 1]);
        assert!(Clause::empty() < short);
        assert!(short < long);
        assert!(clause_of(&a, &[0]) < short);
    }

    #[test]
    fn test_from_concepts_polarity() {
        let mut terms = TermFactory::new();
        let a = terms.atomic("A");
        let b = terms.atomic("B");
        let conj = terms.conjunction(vec![a, b]);
        let positive = Clause::from_concepts(&terms, &[conj, a], Polarity::Positive);
        let negative = Clause::from_concepts(&terms, &[conj, a], Polarity::Negative);
        assert!(positive.iter().any(|l| l.is_structural()));
        assert!(negative.iter().all(|l| !l.is_structural()));
        assert_eq!(positive, negative);
    }

    proptest! {
        #[test]
        fn prop_resolve_is_union_without_trigger(
            x in prop::collection::vec(0usize..12, 0..6),
            a in prop::collection::vec(0usize..12, 1..6),
        ) {
            let (_, atoms) = atoms(12);
            let this = clause_of(&atoms, &x);
            let antecedent = clause_of(&atoms, &a);
            let resolved = this.resolve(&antecedent);
            if antecedent.len() == 1 {
                prop_assert_eq!(resolved, this);
            } else {
                let mut expected = concepts(&this);
                expected.extend(antecedent.tail().map(Literal::normalize));
                prop_assert_eq!(concepts(&resolved), expected);
                prop_assert!(resolved.len() < this.len() + antecedent.len());
                prop_assert!(resolved.literals().windows(2).all(|w| w[0] < w[1]));
            }
        }

        #[test]
        fn prop_subset_matches_set_inclusion(
            x in prop::collection::vec(0usize..8, 0..6),
            y in prop::collection::vec(0usize..8, 0..6),
        ) {
            let (_, atoms) = atoms(8);
            let lhs = clause_of(&atoms, &x);
            let rhs = clause_of(&atoms, &y);
            prop_assert_eq!(lhs.subset(&rhs), concepts(&lhs).is_subset(&concepts(&rhs)));
        }
    }
}
