//! SH リーナー
//!
//! 推論セッション: 項モデル、公理データベース、設定を所有し、
//! ゴールごとに飽和を実行して結果を収集します。

use crate::config::ReasonerConfig;
use crate::formatter::HierarchyFormatter;
use crate::model::{ConceptId, RoleId, TermFactory};
use crate::ontology::Ontology;
use crate::saturation::{Saturation, SaturationStats};
use crate::{Result, ShError};
use serde::Serialize;
use tracing::{debug, info};

/// Reasoning session
#[derive(Debug, Clone, Default)]
pub struct ShReasoner {
    terms: TermFactory,
    ontology: Ontology,
    config: ReasonerConfig,
}

/// Result of saturating one goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalOutcome {
    pub goal: ConceptId,
    pub satisfiable: bool,
    /// Atomic subsumers in alphabetical order, including the goal itself when atomic
    pub subsumers: Vec<ConceptId>,
}

/// Result of a classification pass
#[derive(Debug, Clone)]
pub struct Classification {
    pub goals: Vec<GoalOutcome>,
    /// Atomic classes equivalent to owl:Thing
    pub top_subsumers: Vec<ConceptId>,
    pub consistent: bool,
    pub stats: SaturationStats,
}

/// Serializable view of a classification with concept names
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub consistent: bool,
    pub equivalent_to_thing: Vec<String>,
    pub classes: Vec<ClassReport>,
    pub stats: SaturationStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub class: String,
    pub satisfiable: bool,
    pub superclasses: Vec<String>,
}

impl ShReasoner {
    pub fn new(config: ReasonerConfig) -> Self {
        Self { terms: TermFactory::new(), ontology: Ontology::new(), config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReasonerConfig::default())
    }

    pub fn terms(&self) -> &TermFactory {
        &self.terms
    }

    pub fn terms_mut(&mut self) -> &mut TermFactory {
        &mut self.terms
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// Assert `sub ⊑ sup`
    pub fn subsumption(&mut self, sub: ConceptId, sup: ConceptId) -> Result<()> {
        self.ontology.subsumption(&mut self.terms, sub, sup)
    }

    /// Assert that all `concepts` are equivalent to the first one
    pub fn equivalent(&mut self, concepts: &[ConceptId]) -> Result<()> {
        let Some((&first, rest)) = concepts.split_first() else {
            return Ok(());
        };
        for &other in rest {
            self.subsumption(first, other)?;
            self.subsumption(other, first)?;
        }
        Ok(())
    }

    pub fn disjoint(&mut self, first: ConceptId, second: ConceptId) -> Result<()> {
        self.ontology.disjoint(&mut self.terms, first, second)
    }

    pub fn role_inclusion(&mut self, sub: RoleId, sup: RoleId) -> Result<()> {
        self.ontology.role_inclusion(&self.terms, sub, sup)
    }

    pub fn transitive_role(&mut self, role: RoleId) -> Result<()> {
        self.ontology.transitive_role(role)
    }

    /// Goal concept for a query line: the class itself, or a named helper
    /// concept implying every listed class
    pub fn conjunctive_goal(&mut self, names: &[&str]) -> Result<ConceptId> {
        match names {
            [] => Err(ShError::Loader("empty goal".to_string())),
            [name] => Ok(self.terms.atomic(name)),
            _ => {
                let goal = self.terms.dummy(Some(&names.join(" ")));
                for name in names {
                    let class = self.terms.atomic(name);
                    self.subsumption(goal, class)?;
                }
                Ok(goal)
            }
        }
    }

    /// Finish the axiom database; further axioms are rejected afterwards
    pub fn normalize(&mut self) {
        self.ontology.normalize(&mut self.terms, self.config.fanout_threshold);
    }

    /// Classify every named class
    pub fn classify(&mut self) -> Result<Classification> {
        let goals = self.terms.atomics_ordered();
        self.run(&goals, true)
    }

    /// Saturate an explicit goal list
    pub fn classify_goals(&mut self, goals: &[ConceptId]) -> Result<Classification> {
        self.run(goals, false)
    }

    fn run(&mut self, goals: &[ConceptId], check_top: bool) -> Result<Classification> {
        self.config.validate()?;
        self.normalize();
        info!(
            "Classifying {} goals ({} axioms, {} unary rules, {} binary rules)",
            goals.len(),
            self.ontology.axiom_count(),
            self.ontology.unary_count(),
            self.ontology.binary_count()
        );

        let terms = &self.terms;
        let mut saturation = Saturation::new(terms, &self.ontology, &self.config)?;
        saturation.share_top()?;

        let mut top_outcome = None;
        if saturation.top_root().is_none() && check_top {
            let root = saturation.open_root(terms.top());
            saturation.run()?;
            top_outcome = saturation
                .context(root)
                .map(|c| (c.is_satisfiable(), c.subsumers().to_vec()));
            saturation.dispose(root);
        }

        let mut outcomes = Vec::with_capacity(goals.len());
        for &goal in goals {
            let root = saturation.open_root(goal);
            saturation.run()?;
            let Some(context) = saturation.context(root) else {
                return Err(ShError::InvariantViolation(format!(
                    "goal context for {} disappeared",
                    terms.display(goal)
                )));
            };
            outcomes.push(GoalOutcome {
                goal,
                satisfiable: context.is_satisfiable(),
                subsumers: context.subsumers().to_vec(),
            });
            debug!("Goal {} done", terms.display(goal));
            saturation.dispose(root);
        }

        // the shared Top root keeps collecting until the last goal is done
        if let Some(shared) = saturation.top_root().and_then(|id| saturation.context(id)) {
            top_outcome = Some((shared.is_satisfiable(), shared.subsumers().to_vec()));
        }
        let (consistent, mut top_subsumers) = top_outcome.unwrap_or((true, Vec::new()));
        sort_by_name(terms, &mut top_subsumers);

        let shared = saturation.is_top_shared();
        for outcome in &mut outcomes {
            if !consistent {
                outcome.satisfiable = false;
            }
            if !outcome.satisfiable {
                outcome.subsumers.clear();
                continue;
            }
            if shared {
                outcome.subsumers.extend(top_subsumers.iter().copied());
            }
            sort_by_name(terms, &mut outcome.subsumers);
        }

        let stats = saturation.stats().clone();
        info!(
            "Classification finished: {} root contexts, {} successor contexts, {} clauses",
            stats.root_contexts,
            stats.successor_contexts,
            stats.root_clauses + stats.successor_clauses
        );
        Ok(Classification { goals: outcomes, top_subsumers, consistent, stats })
    }
}

fn sort_by_name(terms: &TermFactory, concepts: &mut Vec<ConceptId>) {
    concepts.sort_by_cached_key(|&c| terms.render(c));
    concepts.dedup();
}

impl Classification {
    pub fn outcome(&self, goal: ConceptId) -> Option<&GoalOutcome> {
        self.goals.iter().find(|outcome| outcome.goal == goal)
    }

    pub fn is_satisfiable(&self, goal: ConceptId) -> Option<bool> {
        self.outcome(goal).map(|outcome| outcome.satisfiable)
    }

    /// Whether `sub ⊑ sup` was derived (unsatisfiable goals are subsumed by everything)
    pub fn is_subsumed_by(&self, sub: ConceptId, sup: ConceptId) -> bool {
        self.outcome(sub)
            .is_some_and(|outcome| !outcome.satisfiable || outcome.subsumers.contains(&sup))
    }

    /// Replay the results as formatter events
    pub fn feed(&self, terms: &TermFactory, formatter: &mut HierarchyFormatter) -> Result<()> {
        if !self.consistent {
            formatter.unsatisfiable(terms, terms.top())?;
        }
        for &superclass in &self.top_subsumers {
            formatter.subsumption(terms, terms.top(), superclass)?;
        }
        for outcome in &self.goals {
            if !outcome.satisfiable {
                formatter.unsatisfiable(terms, outcome.goal)?;
                continue;
            }
            for &superclass in &outcome.subsumers {
                formatter.subsumption(terms, outcome.goal, superclass)?;
            }
        }
        Ok(())
    }

    pub fn report(&self, terms: &TermFactory) -> ClassificationReport {
        let names = |concepts: &[ConceptId]| concepts.iter().map(|&c| terms.render(c)).collect();
        ClassificationReport {
            consistent: self.consistent,
            equivalent_to_thing: names(&self.top_subsumers),
            classes: self
                .goals
                .iter()
                .map(|outcome| ClassReport {
                    class: terms.render(outcome.goal),
                    satisfiable: outcome.satisfiable,
                    superclasses: names(&outcome.subsumers),
                })
                .collect(),
            stats: self.stats.clone(),
        }
    }
}
