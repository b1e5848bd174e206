//! 階層出力
//!
//! 分類結果を推移簡約した OWL 関数型構文の階層として書き出します。

use crate::model::{Concept, ConceptId, TermFactory};
use crate::reasoner::Classification;
use crate::{Result, ShError};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Collects subsumption events and writes the reduced hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyFormatter {
    order: Vec<ConceptId>,
    position: HashMap<ConceptId, usize>,
    supers: Vec<Vec<usize>>,
    unsatisfiable: BTreeSet<usize>,
    equivalent_to_top: BTreeSet<usize>,
    consistent: bool,
}

impl HierarchyFormatter {
    /// `ordered` fixes the output order of atomic classes
    pub fn new(ordered: Vec<ConceptId>) -> Self {
        let position = ordered.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self {
            supers: vec![Vec::new(); ordered.len()],
            order: ordered,
            position,
            unsatisfiable: BTreeSet::new(),
            equivalent_to_top: BTreeSet::new(),
            consistent: true,
        }
    }

    fn position(&self, terms: &TermFactory, concept: ConceptId) -> Result<usize> {
        self.position.get(&concept).copied().ok_or_else(|| {
            ShError::InvariantViolation(format!("{} is not a classified class", terms.display(concept)))
        })
    }

    pub fn unsatisfiable(&mut self, terms: &TermFactory, concept: ConceptId) -> Result<()> {
        match terms.concept(concept) {
            Concept::Top => self.consistent = false,
            Concept::Bottom => {}
            _ => {
                let index = self.position(terms, concept)?;
                self.unsatisfiable.insert(index);
            }
        }
        Ok(())
    }

    /// Record `concept ⊑ superclass`
    pub fn subsumption(&mut self, terms: &TermFactory, concept: ConceptId, superclass: ConceptId) -> Result<()> {
        if concept == superclass {
            return Ok(());
        }
        let target = self.position(terms, superclass)?;
        match terms.concept(concept) {
            Concept::Top => {
                self.equivalent_to_top.insert(target);
            }
            _ => {
                let source = self.position(terms, concept)?;
                self.supers[source].push(target);
            }
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, terms: &TermFactory, mut out: W) -> Result<()> {
        writeln!(out, "Ontology(")?;
        if !self.consistent {
            writeln!(out, "EquivalentClasses(owl:Nothing owl:Thing)")?;
            writeln!(out, ")")?;
            return Ok(());
        }

        let name = |index: usize| terms.display(self.order[index]);
        let mut representative = vec![true; self.order.len()];

        for (anchor, group) in [("owl:Nothing", &self.unsatisfiable), ("owl:Thing", &self.equivalent_to_top)] {
            if group.is_empty() {
                continue;
            }
            write!(out, "EquivalentClasses({}", anchor)?;
            for &index in group {
                write!(out, " {}", name(index))?;
                representative[index] = false;
            }
            writeln!(out, ")")?;
        }

        let supers: Vec<Vec<usize>> = self
            .supers
            .iter()
            .map(|targets| {
                let mut targets = targets.clone();
                targets.sort_unstable();
                targets.dedup();
                targets
            })
            .collect();

        for class in 0..supers.len() {
            if !representative[class] {
                continue;
            }
            let equivalents: Vec<usize> = supers[class]
                .iter()
                .copied()
                .filter(|&other| representative[other] && supers[other].binary_search(&class).is_ok())
                .collect();
            if equivalents.is_empty() {
                continue;
            }
            write!(out, "EquivalentClasses({}", name(class))?;
            for other in equivalents {
                write!(out, " {}", name(other))?;
                representative[other] = false;
            }
            writeln!(out, ")")?;
        }

        // marker[k] == class once k is reachable through another superclass
        let mut marker = vec![usize::MAX; supers.len()];
        for class in 0..supers.len() {
            if !representative[class] {
                continue;
            }
            for &direct in &supers[class] {
                if representative[direct] && marker[direct] != class {
                    for &indirect in &supers[direct] {
                        marker[indirect] = class;
                    }
                }
            }
            for &direct in &supers[class] {
                if representative[direct] && marker[direct] != class {
                    writeln!(out, "SubClassOf({} {})", name(class), name(direct))?;
                }
            }
        }

        writeln!(out, ")")?;
        Ok(())
    }
}

/// Goal-mode output: a blank line, the query, then its subsumers indented
pub fn write_goal_report<W: Write>(
    classification: &Classification,
    terms: &TermFactory,
    mut out: W,
) -> Result<()> {
    for outcome in &classification.goals {
        writeln!(out)?;
        writeln!(out, "{}", terms.display(outcome.goal))?;
        if !outcome.satisfiable {
            writeln!(out, "  owl:Nothing")?;
            continue;
        }
        for &subsumer in &outcome.subsumers {
            writeln!(out, "  {}", terms.display(subsumer))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(formatter: &HierarchyFormatter, terms: &TermFactory) -> String {
        let mut buffer = Vec::new();
        formatter.write(terms, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn setup(names: &[&str]) -> (TermFactory, Vec<ConceptId>, HierarchyFormatter) {
        let mut terms = TermFactory::new();
        for name in names {
            terms.atomic(name);
        }
        let ordered = terms.atomics_ordered();
        let formatter = HierarchyFormatter::new(ordered.clone());
        (terms, ordered, formatter)
    }

    #[test]
    fn test_transitive_reduction() {
        let (terms, ids, mut formatter) = setup(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        for (sub, sup) in [(a, a), (a, b), (a, c), (b, b), (b, c), (c, c)] {
            formatter.subsumption(&terms, sub, sup).unwrap();
        }
        assert_eq!(
            render(&formatter, &terms),
            "Ontology(\nSubClassOf(A B)\nSubClassOf(B C)\n)\n"
        );
    }

    #[test]
    fn test_equivalence_group() {
        let (terms, ids, mut formatter) = setup(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        for (sub, sup) in [(a, b), (b, a), (a, c), (b, c)] {
            formatter.subsumption(&terms, sub, sup).unwrap();
        }
        assert_eq!(
            render(&formatter, &terms),
            "Ontology(\nEquivalentClasses(A B)\nSubClassOf(A C)\n)\n"
        );
    }

    #[test]
    fn test_unsatisfiable_and_top_groups() {
        let (terms, ids, mut formatter) = setup(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        formatter.unsatisfiable(&terms, a).unwrap();
        formatter.subsumption(&terms, terms.top(), c).unwrap();
        formatter.subsumption(&terms, b, c).unwrap();
        assert_eq!(
            render(&formatter, &terms),
            "Ontology(\nEquivalentClasses(owl:Nothing A)\nEquivalentClasses(owl:Thing C)\n)\n"
        );
    }

    #[test]
    fn test_inconsistent_output() {
        let (terms, _, mut formatter) = setup(&["A"]);
        formatter.unsatisfiable(&terms, terms.top()).unwrap();
        assert_eq!(
            render(&formatter, &terms),
            "Ontology(\nEquivalentClasses(owl:Nothing owl:Thing)\n)\n"
        );
    }

    #[test]
    fn test_unknown_class_rejected() {
        let (mut terms, _, mut formatter) = setup(&["A"]);
        let a = terms.atomic("A");
        let stray = terms.atomic("Z");
        assert!(formatter.subsumption(&terms, a, stray).is_err());
    }
}
