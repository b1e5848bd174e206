//! 概念・ロールの項モデル
//!
//! すべての概念とロールはインターン化され、小さな整数 ID を持ちます。
//! 同じ構造の式は常に同じ ID を返します。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Ordering tier of a concept.
///
/// Declaration order is the order literals take inside a clause: fan-out
/// placeholders first, goal and split dummies last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Placeholder,
    Bottom,
    Negation,
    Conjunction,
    Disjunction,
    Universal,
    Existential,
    Top,
    Atomic,
    Dummy,
}

/// Interned concept identity; `index` is the arena position
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConceptId {
    tier: Tier,
    index: usize,
}

impl ConceptId {
    pub fn tier(self) -> Tier {
        self.tier
    }

    pub fn index(self) -> usize {
        self.index
    }
}

/// Interned role identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(usize);

impl RoleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Concept expression
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Concept {
    Atomic(String),
    Top,
    Bottom,
    Negation(ConceptId),
    Conjunction(Vec<ConceptId>),
    Disjunction(Vec<ConceptId>),
    Existential(RoleId, ConceptId),
    Universal(RoleId, ConceptId),
    /// Synthetic helper concept (goal conjunctions, split markers, fan-out placeholders)
    Dummy(Option<String>),
}

impl Concept {
    /// Direct sub-concepts of this expression
    pub fn children(&self) -> &[ConceptId] {
        match self {
            Concept::Negation(c) | Concept::Existential(_, c) | Concept::Universal(_, c) => {
                std::slice::from_ref(c)
            }
            Concept::Conjunction(operands) | Concept::Disjunction(operands) => operands,
            Concept::Atomic(_) | Concept::Top | Concept::Bottom | Concept::Dummy(_) => &[],
        }
    }

    /// Whether a literal of this concept carries the structural marker
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Concept::Negation(_)
                | Concept::Conjunction(_)
                | Concept::Disjunction(_)
                | Concept::Existential(..)
                | Concept::Universal(..)
        )
    }

    fn tier(&self) -> Tier {
        match self {
            Concept::Atomic(_) => Tier::Atomic,
            Concept::Top => Tier::Top,
            Concept::Bottom => Tier::Bottom,
            Concept::Negation(_) => Tier::Negation,
            Concept::Conjunction(_) => Tier::Conjunction,
            Concept::Disjunction(_) => Tier::Disjunction,
            Concept::Existential(..) => Tier::Existential,
            Concept::Universal(..) => Tier::Universal,
            Concept::Dummy(_) => Tier::Dummy,
        }
    }
}

/// Role expression
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Atomic(String),
    Inverse(RoleId),
}

#[derive(Debug, Clone)]
struct RoleEntry {
    role: Role,
    inverse: RoleId,
}

/// A concept occurrence inside a clause.
///
/// The annotated and structural markers are not part of the concept's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    concept: ConceptId,
    annotated: bool,
    structural: bool,
}

impl Literal {
    pub fn plain(concept: ConceptId) -> Self {
        Self { concept, annotated: false, structural: false }
    }

    pub fn structural(concept: ConceptId) -> Self {
        Self { concept, annotated: false, structural: true }
    }

    /// Underlying concept with both markers stripped
    pub fn normalize(self) -> ConceptId {
        self.concept
    }

    pub fn is_annotated(self) -> bool {
        self.annotated
    }

    pub fn is_structural(self) -> bool {
        self.structural
    }

    pub fn annotate(self) -> Self {
        Self { annotated: true, ..self }
    }

    /// The literal without its structural marker; used as index key
    pub fn without_structure(self) -> Self {
        Self { structural: false, ..self }
    }

    pub(crate) fn with_markers(concept: ConceptId, annotated: bool, structural: bool) -> Self {
        Self { concept, annotated, structural }
    }

    /// Comparison key inside clauses: annotated literals sort after plain ones
    pub fn rank(self) -> (bool, ConceptId) {
        (self.annotated, self.concept)
    }
}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then(self.structural.cmp(&other.structural))
    }
}

/// Interning table for concepts and roles
#[derive(Debug, Clone)]
pub struct TermFactory {
    concepts: Vec<Concept>,
    tiers: Vec<Tier>,
    concept_index: HashMap<Concept, ConceptId>,
    roles: Vec<RoleEntry>,
    role_names: HashMap<String, RoleId>,
}

impl Default for TermFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TermFactory {
    pub fn new() -> Self {
        let mut factory = Self {
            concepts: Vec::new(),
            tiers: Vec::new(),
            concept_index: HashMap::new(),
            roles: Vec::new(),
            role_names: HashMap::new(),
        };
        factory.intern(Concept::Top);
        factory.intern(Concept::Bottom);
        factory
    }

    pub fn top(&self) -> ConceptId {
        ConceptId { tier: Tier::Top, index: 0 }
    }

    pub fn bottom(&self) -> ConceptId {
        ConceptId { tier: Tier::Bottom, index: 1 }
    }

    fn intern(&mut self, concept: Concept) -> ConceptId {
        if let Some(&id) = self.concept_index.get(&concept) {
            return id;
        }
        let id = self.push(concept.tier(), concept.clone());
        self.concept_index.insert(concept, id);
        id
    }

    fn push(&mut self, tier: Tier, concept: Concept) -> ConceptId {
        let id = ConceptId { tier, index: self.concepts.len() };
        self.concepts.push(concept);
        self.tiers.push(tier);
        id
    }

    /// Intern an atomic concept by name
    pub fn atomic(&mut self, name: &str) -> ConceptId {
        self.intern(Concept::Atomic(name.to_string()))
    }

    pub fn find_atomic(&self, name: &str) -> Option<ConceptId> {
        self.concept_index.get(&Concept::Atomic(name.to_string())).copied()
    }

    pub fn negation(&mut self, concept: ConceptId) -> ConceptId {
        self.intern(Concept::Negation(concept))
    }

    pub fn find_negation(&self, concept: ConceptId) -> Option<ConceptId> {
        self.concept_index.get(&Concept::Negation(concept)).copied()
    }

    pub fn conjunction(&mut self, mut operands: Vec<ConceptId>) -> ConceptId {
        operands.sort_unstable();
        self.intern(Concept::Conjunction(operands))
    }

    pub fn disjunction(&mut self, mut operands: Vec<ConceptId>) -> ConceptId {
        operands.sort_unstable();
        self.intern(Concept::Disjunction(operands))
    }

    /// Conjunction that collapses to Top for no operands and to the operand itself for one
    pub fn improper_conjunction(&mut self, operands: Vec<ConceptId>) -> ConceptId {
        match operands.len() {
            0 => self.top(),
            1 => operands[0],
            _ => self.conjunction(operands),
        }
    }

    /// Disjunction that collapses to Bottom for no operands and to the operand itself for one
    pub fn improper_disjunction(&mut self, operands: Vec<ConceptId>) -> ConceptId {
        match operands.len() {
            0 => self.bottom(),
            1 => operands[0],
            _ => self.disjunction(operands),
        }
    }

    pub fn existential(&mut self, role: RoleId, filler: ConceptId) -> ConceptId {
        self.intern(Concept::Existential(role, filler))
    }

    pub fn find_existential(&self, role: RoleId, filler: ConceptId) -> Option<ConceptId> {
        self.concept_index.get(&Concept::Existential(role, filler)).copied()
    }

    pub fn universal(&mut self, role: RoleId, filler: ConceptId) -> ConceptId {
        self.intern(Concept::Universal(role, filler))
    }

    /// Fresh synthetic concept ordered after every other concept
    pub fn dummy(&mut self, name: Option<&str>) -> ConceptId {
        self.push(Tier::Dummy, Concept::Dummy(name.map(str::to_string)))
    }

    /// Fresh synthetic concept ordered before every other concept
    pub fn placeholder(&mut self) -> ConceptId {
        self.push(Tier::Placeholder, Concept::Dummy(None))
    }

    pub fn concept(&self, id: ConceptId) -> &Concept {
        &self.concepts[id.index()]
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Literal asserting `concept`, structural when the concept can be decomposed further
    pub fn decompose(&self, concept: ConceptId) -> Literal {
        if self.concept(concept).is_structural() {
            Literal::structural(concept)
        } else {
            Literal::plain(concept)
        }
    }

    pub fn is_atomic(&self, concept: ConceptId) -> bool {
        matches!(self.concept(concept), Concept::Atomic(_))
    }

    /// Named atomic concepts in alphabetical order
    pub fn atomics_ordered(&self) -> Vec<ConceptId> {
        let mut atomics: Vec<(&str, ConceptId)> = self
            .concepts
            .iter()
            .enumerate()
            .filter_map(|(index, concept)| match concept {
                Concept::Atomic(name) => Some((
                    name.as_str(),
                    ConceptId { tier: self.tiers[index], index },
                )),
                _ => None,
            })
            .collect();
        atomics.sort();
        atomics.into_iter().map(|(_, id)| id).collect()
    }

    /// Intern an atomic role by name; its inverse is created alongside
    pub fn role(&mut self, name: &str) -> RoleId {
        if let Some(&id) = self.role_names.get(name) {
            return id;
        }
        let id = RoleId(self.roles.len());
        let inverse = RoleId(id.0 + 1);
        self.roles.push(RoleEntry { role: Role::Atomic(name.to_string()), inverse });
        self.roles.push(RoleEntry { role: Role::Inverse(id), inverse: id });
        self.role_names.insert(name.to_string(), id);
        id
    }

    pub fn find_role(&self, name: &str) -> Option<RoleId> {
        self.role_names.get(name).copied()
    }

    pub fn inverse(&self, role: RoleId) -> RoleId {
        self.roles[role.index()].inverse
    }

    pub fn role_expression(&self, role: RoleId) -> &Role {
        &self.roles[role.index()].role
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn display(&self, concept: ConceptId) -> ConceptDisplay<'_> {
        ConceptDisplay { factory: self, concept }
    }

    pub fn display_role(&self, role: RoleId) -> RoleDisplay<'_> {
        RoleDisplay { factory: self, role }
    }

    pub fn render(&self, concept: ConceptId) -> String {
        self.display(concept).to_string()
    }
}

/// OWL functional-syntax rendering of a concept
pub struct ConceptDisplay<'a> {
    factory: &'a TermFactory,
    concept: ConceptId,
}

impl fmt::Display for ConceptDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factory = self.factory;
        let list = |f: &mut fmt::Formatter<'_>, head: &str, operands: &[ConceptId]| {
            write!(f, "{}(", head)?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", factory.display(*operand))?;
            }
            write!(f, ")")
        };
        match factory.concept(self.concept) {
            Concept::Atomic(name) => write!(f, "{}", name),
            Concept::Top => write!(f, "owl:Thing"),
            Concept::Bottom => write!(f, "owl:Nothing"),
            Concept::Negation(c) => write!(f, "ObjectComplementOf({})", factory.display(*c)),
            Concept::Conjunction(operands) => list(f, "ObjectIntersectionOf", operands),
            Concept::Disjunction(operands) => list(f, "ObjectUnionOf", operands),
            Concept::Existential(r, c) => write!(
                f,
                "ObjectSomeValuesFrom({} {})",
                factory.display_role(*r),
                factory.display(*c)
            ),
            Concept::Universal(r, c) => write!(
                f,
                "ObjectAllValuesFrom({} {})",
                factory.display_role(*r),
                factory.display(*c)
            ),
            Concept::Dummy(Some(name)) => write!(f, "{}", name),
            Concept::Dummy(None) => write!(f, "_:dummy{}", self.concept.index()),
        }
    }
}

/// OWL functional-syntax rendering of a role
pub struct RoleDisplay<'a> {
    factory: &'a TermFactory,
    role: RoleId,
}

impl fmt::Display for RoleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.factory.role_expression(self.role) {
            Role::Atomic(name) => write!(f, "{}", name),
            Role::Inverse(r) => write!(f, "ObjectInverseOf({})", self.factory.display_role(*r)),
        }
    }
}
