//! 公理データベースと構造的正規化
//!
//! 包含公理 `C ⊑ D` と排他公理を、飽和エンジンが消費する単項/二項規則に
//! 変換します。否定側 (トリガー側) と肯定側 (帰結側) の二つの
//! 相互再帰トラバーサルは極性ごとにメモ化されます。

use crate::clause::{Clause, Polarity};
use crate::hierarchy::RoleHierarchy;
use crate::model::{Concept, ConceptId, Literal, RoleId, TermFactory};
use crate::{Result, ShError};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::iter;
use tracing::debug;

/// Normalized axiom database
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    /// Rules "if the key holds, the clause holds"
    unary: HashMap<Literal, Vec<Clause>>,
    /// Rules "if the key and the partner hold, the clause holds" (stored from both sides)
    binary: HashMap<Literal, Vec<(Literal, Clause)>>,
    /// (concept, role) -> existentials to expose to predecessors across that role
    interactions: HashMap<(ConceptId, RoleId), Vec<ConceptId>>,
    /// Value ranges attached to Top: every successor over the role gets the clause
    role_ranges: BTreeSet<(RoleId, Clause)>,
    hierarchy: RoleHierarchy,
    transitive_roles: BTreeSet<RoleId>,
    negative_existentials: BTreeSet<ConceptId>,
    positive_roles: BTreeSet<RoleId>,
    seen_negative: HashSet<ConceptId>,
    seen_positive: HashSet<ConceptId>,
    bottom_rule: bool,
    split: Option<(ConceptId, ConceptId)>,
    top_present: bool,
    normalized: bool,
    axiom_count: usize,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.normalized {
            return Err(ShError::InvariantViolation(
                "axioms cannot be added after normalization".to_string(),
            ));
        }
        Ok(())
    }

    /// Assert `sub ⊑ sup`
    pub fn subsumption(&mut self, terms: &mut TermFactory, sub: ConceptId, sup: ConceptId) -> Result<()> {
        self.ensure_open()?;
        self.axiom_count += 1;
        if sub == terms.bottom() || sup == terms.top() {
            return Ok(());
        }
        if sub == terms.top() {
            if let Concept::Universal(role, filler) = *terms.concept(sup) {
                self.role_ranges.insert((role, Clause::unit(terms.decompose(filler))));
                self.positive(terms, filler);
                return Ok(());
            }
        }
        self.negative(terms, sub);
        self.positive(terms, sup);
        self.unary_rule(Literal::plain(sub), Clause::unit(terms.decompose(sup)));
        Ok(())
    }

    /// Assert that `first` and `second` share no instance
    pub fn disjoint(&mut self, terms: &mut TermFactory, first: ConceptId, second: ConceptId) -> Result<()> {
        self.ensure_open()?;
        self.axiom_count += 1;
        self.negative(terms, first);
        self.negative(terms, second);
        self.binary_rule(Literal::plain(first), Literal::plain(second), Clause::empty());
        Ok(())
    }

    /// Assert `sub ⊑ sup` between roles
    pub fn role_inclusion(&mut self, terms: &TermFactory, sub: RoleId, sup: RoleId) -> Result<()> {
        self.ensure_open()?;
        self.axiom_count += 1;
        self.hierarchy.add(terms, sub, sup);
        Ok(())
    }

    pub fn transitive_role(&mut self, role: RoleId) -> Result<()> {
        self.ensure_open()?;
        self.axiom_count += 1;
        self.transitive_roles.insert(role);
        Ok(())
    }

    fn unary_rule(&mut self, key: Literal, clause: Clause) {
        self.unary.entry(key).or_default().push(clause);
    }

    fn binary_rule(&mut self, first: Literal, second: Literal, clause: Clause) {
        self.binary.entry(first).or_default().push((second, clause.clone()));
        if first != second {
            self.binary.entry(second).or_default().push((first, clause));
        }
    }

    fn nullary(&mut self, terms: &TermFactory, clause: Clause) {
        self.unary_rule(Literal::plain(terms.top()), clause);
    }

    fn interaction(&mut self, trigger: ConceptId, role: RoleId, target: ConceptId) {
        let targets = self.interactions.entry((trigger, role)).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    fn bottom(&mut self, terms: &TermFactory) {
        if !self.bottom_rule {
            self.bottom_rule = true;
            self.unary_rule(Literal::plain(terms.bottom()), Clause::empty());
        }
    }

    /// `∃role.¬filler`, the dual of `∀role.filler`
    fn dual(terms: &mut TermFactory, role: RoleId, filler: ConceptId) -> ConceptId {
        let negated = terms.negation(filler);
        terms.existential(role, negated)
    }

    fn negative(&mut self, terms: &mut TermFactory, concept: ConceptId) {
        if !self.seen_negative.insert(concept) {
            return;
        }
        match terms.concept(concept).clone() {
            Concept::Atomic(_) | Concept::Top | Concept::Dummy(_) => {}
            Concept::Bottom => self.bottom(terms),
            Concept::Negation(inner) => {
                let clause = Clause::pair(Literal::plain(concept), terms.decompose(inner));
                self.nullary(terms, clause);
                self.positive(terms, inner);
            }
            Concept::Conjunction(_) => self.negative_conjunction(terms, concept),
            Concept::Disjunction(operands) => {
                for operand in operands {
                    self.unary_rule(Literal::plain(operand), Clause::unit(Literal::plain(concept)));
                    self.negative(terms, operand);
                }
            }
            Concept::Existential(_, filler) => {
                self.negative_existentials.insert(concept);
                self.negative(terms, filler);
            }
            Concept::Universal(role, filler) => {
                let dual = Self::dual(terms, role, filler);
                self.nullary(terms, Clause::pair(Literal::plain(concept), Literal::structural(dual)));
                self.positive(terms, dual);
            }
        }
    }

    fn negative_conjunction(&mut self, terms: &mut TermFactory, concept: ConceptId) {
        let mut side = vec![Literal::plain(concept)];
        let mut undecomposed: Vec<ConceptId> = Vec::new();
        let mut queue = VecDeque::from([concept]);
        while let Some(current) = queue.pop_front() {
            match terms.concept(current).clone() {
                Concept::Conjunction(operands) => queue.extend(operands),
                Concept::Negation(inner) => {
                    side.push(terms.decompose(inner));
                    self.positive(terms, inner);
                }
                Concept::Universal(role, filler) => {
                    let dual = Self::dual(terms, role, filler);
                    side.push(Literal::structural(dual));
                    self.positive(terms, dual);
                }
                _ => {
                    if !undecomposed.contains(&current) {
                        undecomposed.push(current);
                        self.negative(terms, current);
                    }
                }
            }
        }

        let side = Clause::from_literals(side);
        match undecomposed.as_slice() {
            [] => self.nullary(terms, side),
            [only] => self.unary_rule(Literal::plain(*only), side),
            [first, middle @ .., last] => {
                let mut accumulated = *first;
                let mut operands = vec![*first];
                for &operand in middle {
                    operands.push(operand);
                    let partial = terms.conjunction(operands.clone());
                    self.binary_rule(
                        Literal::plain(accumulated),
                        Literal::plain(operand),
                        Clause::unit(Literal::plain(partial)),
                    );
                    accumulated = partial;
                }
                self.binary_rule(Literal::plain(accumulated), Literal::plain(*last), side);
            }
        }
    }

    fn positive(&mut self, terms: &mut TermFactory, concept: ConceptId) {
        if !self.seen_positive.insert(concept) {
            return;
        }
        match terms.concept(concept).clone() {
            Concept::Atomic(_) | Concept::Top | Concept::Dummy(_) => {}
            Concept::Bottom => self.bottom(terms),
            Concept::Negation(inner) => {
                self.binary_rule(Literal::structural(concept), Literal::plain(inner), Clause::empty());
                self.negative(terms, inner);
            }
            Concept::Conjunction(operands) => {
                for operand in operands {
                    self.unary_rule(Literal::structural(concept), Clause::unit(terms.decompose(operand)));
                    self.positive(terms, operand);
                }
            }
            Concept::Disjunction(operands) => {
                let clause = Clause::from_concepts(terms, &operands, Polarity::Positive);
                self.unary_rule(Literal::structural(concept), clause);
                for operand in operands {
                    self.positive(terms, operand);
                }
            }
            Concept::Existential(role, filler) => {
                self.positive_roles.insert(role);
                self.positive(terms, filler);
            }
            Concept::Universal(role, filler) => {
                let dual = Self::dual(terms, role, filler);
                self.binary_rule(Literal::structural(concept), Literal::plain(dual), Clause::empty());
                // the dual only ever arrives from successors, its filler needs no rules
                if self.seen_negative.insert(dual) {
                    self.negative_existentials.insert(dual);
                }
                self.positive(terms, filler);
            }
        }
    }

    /// Finish the database: role closure, interaction tables, fan-out reduction.
    ///
    /// Idempotent; the Term Model only gains synthetic helper concepts.
    pub fn normalize(&mut self, terms: &mut TermFactory, fanout_threshold: usize) {
        if self.normalized {
            return;
        }
        self.hierarchy.close();
        self.unfold_role_hierarchy(terms);
        self.unfold_transitive_roles(terms);
        self.reduce_fanout(terms, fanout_threshold);

        let split0 = terms.dummy(Some("_:split0"));
        let split1 = terms.dummy(Some("_:split1"));
        self.binary_rule(Literal::plain(split0), Literal::plain(split1), Clause::empty());
        self.split = Some((split0, split1));

        let top = Literal::plain(terms.top());
        self.top_present = self.unary.contains_key(&top)
            || self.binary.contains_key(&top)
            || self.interactions.keys().any(|(trigger, _)| *trigger == terms.top());
        self.normalized = true;

        debug!(
            "Normalized {} axioms: {} role inclusions, {} unary keys, {} binary keys, {} interaction keys, {} role ranges",
            self.axiom_count,
            self.hierarchy.direct_count(),
            self.unary.len(),
            self.binary.len(),
            self.interactions.len(),
            self.role_ranges.len()
        );
    }

    fn existential_parts(terms: &TermFactory, concept: ConceptId) -> Option<(RoleId, ConceptId)> {
        match *terms.concept(concept) {
            Concept::Existential(role, filler) => Some((role, filler)),
            _ => None,
        }
    }

    fn unfold_role_hierarchy(&mut self, terms: &TermFactory) {
        let mut entries = Vec::new();
        for &existential in &self.negative_existentials {
            let Some((role, filler)) = Self::existential_parts(terms, existential) else {
                continue;
            };
            for &positive in &self.positive_roles {
                if self.hierarchy.includes(positive, role) {
                    entries.push((filler, positive, existential));
                }
            }
        }
        for (trigger, role, target) in entries {
            self.interaction(trigger, role, target);
        }
    }

    fn unfold_transitive_roles(&mut self, terms: &mut TermFactory) {
        if self.transitive_roles.is_empty() {
            return;
        }
        let existentials: Vec<ConceptId> = self.negative_existentials.iter().copied().collect();
        let positives: Vec<RoleId> = self.positive_roles.iter().copied().collect();
        let transitive: Vec<RoleId> = self.transitive_roles.iter().copied().collect();
        for existential in existentials {
            let Some((role, filler)) = Self::existential_parts(terms, existential) else {
                continue;
            };
            if self.transitive_roles.contains(&role) {
                for &s in &positives {
                    if self.hierarchy.includes(s, role) {
                        self.interaction(existential, s, existential);
                    }
                }
            }
            for &t in &transitive {
                if t == role || !self.hierarchy.includes(t, role) {
                    continue;
                }
                let chained = terms.existential(t, filler);
                for &s in &positives {
                    if self.hierarchy.includes(s, t) {
                        self.interaction(filler, s, chained);
                        self.interaction(chained, s, chained);
                        self.interaction(chained, s, existential);
                    }
                }
            }
        }
    }

    fn reduce_fanout(&mut self, terms: &mut TermFactory, threshold: usize) {
        let crowded: Vec<Literal> = self
            .binary
            .iter()
            .filter(|(_, partners)| partners.len() > threshold)
            .map(|(key, _)| *key)
            .sorted()
            .collect();
        if crowded.is_empty() {
            return;
        }

        let mut placeholders: BTreeMap<Literal, ConceptId> = BTreeMap::new();
        for key in crowded {
            let placeholder = terms.placeholder();
            let partners = self.binary.get(&key).cloned().unwrap_or_default();
            debug!("Rerouting {} binary rules of {} through a placeholder", partners.len(), terms.display(key.normalize()));
            for (partner, body) in partners {
                let rerouted = Clause::from_literals(iter::once(Literal::plain(placeholder)).chain(body.iter()));
                self.unary_rule(partner, rerouted);
            }
            placeholders.insert(key, placeholder);
        }

        self.binary.retain(|key, _| !placeholders.contains_key(key));
        for partners in self.binary.values_mut() {
            partners.retain(|(partner, _)| !placeholders.contains_key(partner));
        }
        self.binary.retain(|_, partners| !partners.is_empty());
        for (key, placeholder) in placeholders {
            self.binary_rule(key, Literal::plain(placeholder), Clause::empty());
        }
    }

    pub fn unary_rules(&self, key: Literal) -> &[Clause] {
        self.unary.get(&key).map_or(&[], Vec::as_slice)
    }

    pub fn binary_rules(&self, key: Literal) -> &[(Literal, Clause)] {
        self.binary.get(&key).map_or(&[], Vec::as_slice)
    }

    pub fn interaction_targets(&self, trigger: ConceptId, role: RoleId) -> &[ConceptId] {
        self.interactions.get(&(trigger, role)).map_or(&[], Vec::as_slice)
    }

    /// Whether a literal of `concept` can travel back over a `role` edge
    pub fn is_pushable(&self, concept: ConceptId, role: RoleId) -> bool {
        !self.interaction_targets(concept, role).is_empty()
    }

    /// Every clause an annotated clause turns into on the predecessor side of a `role` edge
    pub fn push_targets(&self, clause: &Clause, role: RoleId) -> Result<Vec<Clause>> {
        let choices = clause
            .iter()
            .map(|literal| {
                let targets = self.interaction_targets(literal.normalize(), role);
                if targets.is_empty() {
                    Err(ShError::InvariantViolation(format!(
                        "literal {:?} cannot be pushed over role {:?}",
                        literal.normalize(),
                        role
                    )))
                } else {
                    Ok(targets.iter().copied())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(choices
            .into_iter()
            .multi_cartesian_product()
            .map(|combination| Clause::from_literals(combination.into_iter().map(Literal::plain)))
            .collect())
    }

    pub fn role_ranges(&self) -> impl Iterator<Item = &(RoleId, Clause)> {
        self.role_ranges.iter()
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    pub fn positive_roles(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.positive_roles.iter().copied()
    }

    pub fn is_transitive(&self, role: RoleId) -> bool {
        self.transitive_roles.contains(&role)
    }

    /// The two split markers and the rule making them exclusive
    pub fn split_markers(&self) -> Option<(ConceptId, ConceptId)> {
        self.split
    }

    /// Whether any rule is triggered by Top
    pub fn top_present(&self) -> bool {
        self.top_present
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn axiom_count(&self) -> usize {
        self.axiom_count
    }

    pub fn unary_count(&self) -> usize {
        self.unary.values().map(Vec::len).sum()
    }

    pub fn binary_count(&self) -> usize {
        self.binary.values().map(Vec::len).sum()
    }
}
