//! 飽和エンジン
//!
//! コンテキストグラフ上のワークリスト不動点計算。コンテキストはアリーナに
//! 格納され、(ロール, 概念) からのメモ表で一意に参照されます。
//! 単一スレッドで、アクティブリストから一つずつコンテキストを取り出し、
//! そのワークリストが空になるまで処理します。
//!
//! `secondary_contexts` を有効にすると、全称制約を持つコンテキストの後続は
//! (前任のコア, ロール, 充填子) ごとの二次コンテキストへ付け替えられます。

use crate::clause::Clause;
use crate::config::ReasonerConfig;
use crate::context::{Context, ContextId};
use crate::model::{Concept, ConceptId, Literal, RoleId, TermFactory};
use crate::ontology::Ontology;
use crate::{Result, ShError};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Counters collected during saturation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaturationStats {
    pub root_contexts: usize,
    pub successor_contexts: usize,
    pub root_clauses: usize,
    pub successor_clauses: usize,
    pub max_index_size: usize,
    pub max_clause_len: usize,
    pub links: usize,
    pub pushed_clauses: usize,
    pub unsatisfiable_contexts: usize,
    pub secondary_contexts: usize,
    pub redirected_links: usize,
}

fn slot(contexts: &[Option<Context>], id: ContextId) -> Option<&Context> {
    contexts.get(id.0).and_then(Option::as_ref)
}

fn slot_mut(contexts: &mut [Option<Context>], id: ContextId) -> Option<&mut Context> {
    contexts.get_mut(id.0).and_then(Option::as_mut)
}

/// Context graph and global active list for one classification pass
pub struct Saturation<'a> {
    terms: &'a TermFactory,
    ontology: &'a Ontology,
    config: &'a ReasonerConfig,
    contexts: Vec<Option<Context>>,
    successors: HashMap<(RoleId, ConceptId), ContextId>,
    /// Secondary successors keyed by (predecessor core, role, filler)
    secondaries: HashMap<(ConceptId, RoleId, ConceptId), ContextId>,
    by_role: HashMap<Option<RoleId>, Vec<ContextId>>,
    top_contexts: HashMap<Option<RoleId>, ContextId>,
    active: VecDeque<ContextId>,
    top_sharing: bool,
    stats: SaturationStats,
}

impl<'a> Saturation<'a> {
    pub fn new(terms: &'a TermFactory, ontology: &'a Ontology, config: &'a ReasonerConfig) -> Result<Self> {
        if !ontology.is_normalized() {
            return Err(ShError::InvariantViolation(
                "saturation requires a normalized ontology".to_string(),
            ));
        }
        Ok(Self {
            terms,
            ontology,
            config,
            contexts: Vec::new(),
            successors: HashMap::new(),
            secondaries: HashMap::new(),
            by_role: HashMap::new(),
            top_contexts: HashMap::new(),
            active: VecDeque::new(),
            top_sharing: config.top_sharing && ontology.top_present(),
            stats: SaturationStats::default(),
        })
    }

    pub fn stats(&self) -> &SaturationStats {
        &self.stats
    }

    pub fn context(&self, id: ContextId) -> Option<&Context> {
        slot(&self.contexts, id)
    }

    /// Whether shared Top contexts are in use for this pass
    pub fn is_top_shared(&self) -> bool {
        self.top_sharing
    }

    /// Shared goal-level Top context, if Top sharing is in effect
    pub fn top_root(&self) -> Option<ContextId> {
        self.top_contexts.get(&None).copied()
    }

    /// Create and saturate the shared Top contexts (one per positive role plus the root one)
    pub fn share_top(&mut self) -> Result<()> {
        if !self.top_sharing || !self.top_contexts.is_empty() {
            return Ok(());
        }
        let top = self.terms.top();
        let root = self.create(None, top, None, true);
        self.top_contexts.insert(None, root);
        let ontology = self.ontology;
        for role in ontology.positive_roles() {
            let shared = self.create(Some(role), top, None, true);
            self.top_contexts.insert(Some(role), shared);
        }
        debug!("Created {} shared top contexts", self.top_contexts.len());
        self.run()
    }

    /// Open a goal context for `goal`; it is saturated by the next `run`
    pub fn open_root(&mut self, goal: ConceptId) -> ContextId {
        self.create(None, goal, None, false)
    }

    /// Drop a goal context and its graph edges
    pub fn dispose(&mut self, id: ContextId) {
        self.unlink(id);
        if let Some(entry) = self.contexts.get_mut(id.0) {
            *entry = None;
        }
        if let Some(roots) = self.by_role.get_mut(&None) {
            roots.retain(|root| *root != id);
        }
    }

    /// Process active contexts until every worklist is drained
    pub fn run(&mut self) -> Result<()> {
        while let Some(id) = self.active.pop_front() {
            self.process(id)?;
        }
        Ok(())
    }

    fn create(&mut self, role: Option<RoleId>, core: ConceptId, via: Option<Literal>, top: bool) -> ContextId {
        let terms = self.terms;
        let ontology = self.ontology;
        let id = ContextId(self.contexts.len());
        let mut context = Context::new(role, core, via, top);
        context.enqueue(Clause::unit(terms.decompose(core)));
        if !self.top_sharing && ontology.top_present() {
            context.enqueue(Clause::unit(Literal::plain(terms.top())));
        }
        match role {
            Some(role) => {
                if top || !self.top_sharing {
                    for (range_role, range) in ontology.role_ranges() {
                        if ontology.hierarchy().includes(role, *range_role) {
                            context.enqueue(range.clone());
                        }
                    }
                }
                self.stats.successor_contexts += 1;
            }
            None => self.stats.root_contexts += 1,
        }
        context.queued = true;
        self.contexts.push(Some(context));
        self.by_role.entry(role).or_default().push(id);
        if top {
            self.active.push_front(id);
        } else {
            self.active.push_back(id);
        }
        trace!("Created context {}", self.describe(id));
        id
    }

    fn successor(&mut self, role: RoleId, filler: ConceptId, via: Literal) -> ContextId {
        if let Some(&id) = self.successors.get(&(role, filler)) {
            return id;
        }
        let id = self.create(Some(role), filler, Some(via), false);
        self.successors.insert((role, filler), id);
        id
    }

    fn secondary_successor(&mut self, source: ConceptId, role: RoleId, filler: ConceptId, via: Literal) -> ContextId {
        if let Some(&id) = self.secondaries.get(&(source, role, filler)) {
            return id;
        }
        let id = self.create(Some(role), filler, Some(via), false);
        if let Some(context) = slot_mut(&mut self.contexts, id) {
            context.secondary = true;
        }
        self.secondaries.insert((source, role, filler), id);
        self.stats.secondary_contexts += 1;
        id
    }

    /// Whether an existential over `role` opened in `id` leads to a secondary successor
    fn wants_secondary(&self, id: ContextId, role: RoleId) -> bool {
        if !self.config.secondary_contexts {
            return false;
        }
        let hierarchy = self.ontology.hierarchy();
        self.context(id).is_some_and(|context| {
            !context.top && context.universals.iter().any(|(universal, _)| hierarchy.includes(role, *universal))
        })
    }

    fn contexts_with_role(&self, role: Option<RoleId>) -> Vec<ContextId> {
        self.by_role.get(&role).cloned().unwrap_or_default()
    }

    fn describe(&self, id: ContextId) -> String {
        match self.context(id) {
            Some(context) => match context.role {
                Some(role) => format!(
                    "({}, {})",
                    self.terms.display_role(role),
                    self.terms.display(context.core)
                ),
                None => format!("(-, {})", self.terms.display(context.core)),
            },
            None => format!("#{}", id.0),
        }
    }

    fn add(&mut self, id: ContextId, clause: Clause) {
        let Some(context) = slot_mut(&mut self.contexts, id) else {
            return;
        };
        if !context.satisfiable {
            return;
        }
        if context.is_root() && clause.trailing_annotated() > 1 {
            return;
        }
        context.enqueue(clause);
        if !context.processing && !context.queued {
            context.queued = true;
            if context.top {
                self.active.push_front(id);
            } else {
                self.active.push_back(id);
            }
        }
    }

    fn process(&mut self, id: ContextId) -> Result<()> {
        match slot_mut(&mut self.contexts, id) {
            Some(context) => {
                context.queued = false;
                context.processing = true;
            }
            None => return Ok(()),
        }
        loop {
            let Some(context) = slot_mut(&mut self.contexts, id) else {
                break;
            };
            let Some(clause) = context.next_pending() else {
                break;
            };
            if !context.satisfiable {
                return Err(ShError::InvariantViolation(format!(
                    "unsatisfiable context {} still has pending clauses",
                    id.0
                )));
            }
            if clause.is_empty() {
                self.refute(id);
                continue;
            }
            if !context.admit(&clause, self.config) {
                continue;
            }
            let (root, indexed) = (context.is_root(), context.index_size());
            if root {
                self.stats.root_clauses += 1;
            } else {
                self.stats.successor_clauses += 1;
            }
            self.stats.max_index_size = self.stats.max_index_size.max(indexed);
            self.stats.max_clause_len = self.stats.max_clause_len.max(clause.len());
            trace!("{} accepted {}", self.describe(id), clause.render(self.terms));
            self.dispatch(id, &clause)?;
        }
        if let Some(context) = slot_mut(&mut self.contexts, id) {
            context.processing = false;
        }
        Ok(())
    }

    /// The empty clause was derived: report falsity upward and release the context
    fn refute(&mut self, id: ContextId) {
        debug!("Unsatisfiable context {}", self.describe(id));
        self.stats.unsatisfiable_contexts += 1;
        let empty = Clause::empty();
        self.push(id, &empty);
        let shared_role = self.context(id).filter(|c| c.top).and_then(|c| c.role);
        if shared_role.is_some() {
            for other in self.contexts_with_role(shared_role) {
                if other != id {
                    self.push(other, &empty);
                }
            }
        }
        self.unlink(id);
        if let Some(context) = slot_mut(&mut self.contexts, id) {
            context.clear();
        }
    }

    fn unlink(&mut self, id: ContextId) {
        let Some(context) = slot_mut(&mut self.contexts, id) else {
            return;
        };
        let role = context.role;
        let forward = std::mem::take(&mut context.forward);
        let backward = std::mem::take(&mut context.backward);
        for (_, target) in forward {
            if let Some(successor) = slot_mut(&mut self.contexts, target) {
                successor.backward.remove(&id);
            }
        }
        if let Some(role) = role {
            for source in backward {
                if let Some(predecessor) = slot_mut(&mut self.contexts, source) {
                    predecessor.forward.remove(&(role, id));
                }
            }
        }
    }

    fn dispatch(&mut self, id: ContextId, clause: &Clause) -> Result<()> {
        let Some(head) = clause.first() else {
            return Ok(());
        };
        let Some((role, top)) = self.context(id).map(|c| (c.role, c.top)) else {
            return Ok(());
        };

        if head.is_annotated() {
            return match role {
                Some(role) => self.push_annotated(id, role, top, clause),
                None => self.record_subsumer(id, clause),
            };
        }

        let plain = head.without_structure();
        self.resolve_unary(id, clause, plain);
        self.resolve_binary_scoped(id, clause, plain, role, top);

        if head.is_structural() {
            let terms = self.terms;
            match terms.concept(head.normalize()) {
                Concept::Disjunction(_) => self.split_or_resolve(id, clause, head),
                Concept::Negation(_) => {
                    self.resolve_unary(id, clause, head);
                    self.resolve_binary_scoped(id, clause, head, role, top);
                }
                Concept::Universal(r, filler) => {
                    self.resolve_unary(id, clause, head);
                    self.resolve_binary_scoped(id, clause, head, role, top);
                    self.record_universal(id, role, top, *r, *filler)?;
                }
                Concept::Existential(r, filler) => {
                    self.resolve_unary(id, clause, head);
                    self.open_existential(id, clause, head, *r, *filler);
                }
                _ => self.resolve_unary(id, clause, head),
            }
        }

        let annotate = match role {
            Some(role) => self.ontology.is_pushable(head.normalize(), role),
            None => self.terms.is_atomic(head.normalize()),
        };
        if annotate {
            self.add(id, clause.annotate()?);
        }
        Ok(())
    }

    fn resolve_unary(&mut self, id: ContextId, clause: &Clause, key: Literal) {
        let ontology = self.ontology;
        for body in ontology.unary_rules(key) {
            self.add(id, body.resolve(clause));
        }
    }

    /// Fire binary rules keyed by `key` against the clauses of `source`, adding to `target`
    fn resolve_binary(&mut self, target: ContextId, clause: &Clause, key: Literal, source: ContextId) {
        let ontology = self.ontology;
        let rules = ontology.binary_rules(key);
        if rules.is_empty() {
            return;
        }
        let mut derived = Vec::new();
        if let Some(partner_context) = self.context(source) {
            for (partner, body) in rules {
                for antecedent in partner_context.indexed(*partner) {
                    let front_structural = antecedent.first().is_some_and(Literal::is_structural);
                    if !partner.is_structural() || front_structural {
                        derived.push(body.resolve_pair(clause, antecedent));
                    }
                }
            }
        }
        for resolvent in derived {
            self.add(target, resolvent);
        }
    }

    fn resolve_binary_scoped(
        &mut self,
        id: ContextId,
        clause: &Clause,
        key: Literal,
        role: Option<RoleId>,
        top: bool,
    ) {
        if top {
            for other in self.contexts_with_role(role) {
                self.resolve_binary(other, clause, key, other);
            }
        } else {
            self.resolve_binary(id, clause, key, id);
            if self.top_sharing {
                if let Some(&shared) = self.top_contexts.get(&role) {
                    self.resolve_binary(id, clause, key, shared);
                }
            }
        }
    }

    /// Positive disjunction: split once per goal context, otherwise resolve as a unary rule
    fn split_or_resolve(&mut self, id: ContextId, clause: &Clause, head: Literal) {
        let ontology = self.ontology;
        let split = clause.len() == 1 && self.context(id).is_some_and(|c| c.split_available);
        let cases = ontology.unary_rules(head).first();
        match (split, cases, ontology.split_markers()) {
            (true, Some(cases), Some((left, right))) if !cases.is_empty() => {
                if let Some(context) = slot_mut(&mut self.contexts, id) {
                    context.split_available = false;
                }
                if let Some(first) = cases.first() {
                    self.add(id, Clause::pair(first, Literal::plain(left)));
                }
                self.add(id, Clause::unit(Literal::plain(right)).resolve(cases));
            }
            _ => self.resolve_unary(id, clause, head),
        }
    }

    fn open_existential(&mut self, id: ContextId, clause: &Clause, head: Literal, role: RoleId, filler: ConceptId) {
        let core = self.context(id).map(|c| c.core);
        let target = match core {
            Some(core) if self.wants_secondary(id, role) => self.secondary_successor(core, role, filler, head),
            _ => self.successor(role, filler, head),
        };
        if self.context(target).is_some_and(Context::is_satisfiable) {
            self.link(id, role, target);
        }
        let mut pulled: Vec<Clause> = self
            .context(target)
            .map(|successor| successor.pushed.iter().cloned().collect())
            .unwrap_or_default();
        if self.top_sharing {
            if let Some(shared) = self.top_contexts.get(&Some(role)).and_then(|&s| self.context(s)) {
                pulled.extend(shared.pushed.iter().cloned());
            }
        }
        for pushed in pulled {
            self.add(id, pushed.resolve(clause));
        }
    }

    fn link(&mut self, id: ContextId, role: RoleId, target: ContextId) {
        let Some((source_role, top)) = self.context(id).map(|c| (c.role, c.top)) else {
            return;
        };
        if let Some(context) = slot_mut(&mut self.contexts, id) {
            context.forward.insert((role, target));
        }
        if let Some(successor) = slot_mut(&mut self.contexts, target) {
            successor.backward.insert(id);
        }
        self.stats.links += 1;

        let mut sources = if top { self.contexts_with_role(source_role) } else { vec![id] };
        if self.top_sharing && !top {
            sources.extend(self.top_contexts.get(&source_role).copied());
        }
        let ontology = self.ontology;
        let hierarchy = ontology.hierarchy();
        let obligations: Vec<Clause> = sources
            .iter()
            .filter_map(|&source| self.context(source))
            .flat_map(|context| context.universals.iter())
            .filter(|(universal_role, _)| hierarchy.includes(role, *universal_role))
            .map(|(_, obligation)| obligation.clone())
            .collect();
        for obligation in obligations {
            self.add(target, obligation);
        }
    }

    fn record_universal(
        &mut self,
        id: ContextId,
        context_role: Option<RoleId>,
        top: bool,
        role: RoleId,
        filler: ConceptId,
    ) -> Result<()> {
        let terms = self.terms;
        let negated = terms.find_negation(filler).ok_or_else(|| {
            ShError::InvariantViolation(format!(
                "negation of {} was never interned",
                terms.display(filler)
            ))
        })?;
        let obligation = Clause::pair(terms.decompose(filler), Literal::plain(negated).annotate());
        if let Some(context) = slot_mut(&mut self.contexts, id) {
            context.universals.insert((role, obligation.clone()));
        }

        let redirect = self.config.secondary_contexts && !top;
        let mut sources = if top {
            self.contexts_with_role(context_role)
        } else if redirect {
            Vec::new()
        } else {
            vec![id]
        };
        if self.top_sharing && !top {
            sources.extend(self.top_contexts.get(&context_role).copied());
        }
        let ontology = self.ontology;
        let hierarchy = ontology.hierarchy();
        let targets: Vec<ContextId> = sources
            .iter()
            .filter_map(|&source| self.context(source))
            .flat_map(|context| context.forward.iter())
            .filter(|(link_role, _)| hierarchy.includes(*link_role, role))
            .map(|(_, target)| *target)
            .collect();
        for target in targets {
            self.add(target, obligation.clone());
        }
        if redirect {
            self.redirect_successors(id, role, &obligation);
        }
        Ok(())
    }

    /// Move the successors of `id` reached over a sub-role of `role` to its secondary contexts
    fn redirect_successors(&mut self, id: ContextId, role: RoleId, obligation: &Clause) {
        let ontology = self.ontology;
        let hierarchy = ontology.hierarchy();
        let Some(context) = self.context(id) else {
            return;
        };
        let core = context.core;
        let affected: Vec<(RoleId, ContextId)> = context
            .forward
            .iter()
            .copied()
            .filter(|(link_role, _)| hierarchy.includes(*link_role, role))
            .collect();
        for (link_role, target) in affected {
            let Some((secondary, filler, via)) = self.context(target).map(|c| (c.secondary, c.core, c.via)) else {
                continue;
            };
            if secondary {
                self.add(target, obligation.clone());
                continue;
            }
            let Some(via) = via else {
                continue;
            };
            let replacement = self.secondary_successor(core, link_role, filler, via);
            if let Some(context) = slot_mut(&mut self.contexts, id) {
                context.forward.remove(&(link_role, target));
            }
            if let Some(successor) = slot_mut(&mut self.contexts, target) {
                successor.backward.remove(&id);
            }
            self.stats.redirected_links += 1;
            trace!("{} redirected to secondary {}", self.describe(id), self.describe(replacement));
            if self.context(replacement).is_some_and(Context::is_satisfiable) {
                self.link(id, link_role, replacement);
            }
            self.pull(id, replacement);
        }
    }

    /// Resolve what `target` already pushed against the clauses of `id` headed by its existential
    fn pull(&mut self, id: ContextId, target: ContextId) {
        let mut derived = Vec::new();
        if let (Some(context), Some(successor)) = (self.context(id), self.context(target)) {
            if let Some(via) = successor.via {
                for antecedent in context.indexed(via).iter().filter(|a| a.first() == Some(via)) {
                    derived.extend(successor.pushed.iter().map(|pushed| pushed.resolve(antecedent)));
                }
            }
        }
        for resolvent in derived {
            self.add(id, resolvent);
        }
    }

    /// An annotated clause in a successor: translate and forward it to predecessors once
    fn push_annotated(&mut self, id: ContextId, role: RoleId, top: bool, clause: &Clause) -> Result<()> {
        for pushed in self.ontology.push_targets(clause, role)? {
            let fresh = slot_mut(&mut self.contexts, id).is_some_and(|c| c.pushed.insert(pushed.clone()));
            if !fresh {
                continue;
            }
            if top {
                for other in self.contexts_with_role(Some(role)) {
                    self.push(other, &pushed);
                }
            } else {
                self.push(id, &pushed);
            }
        }
        Ok(())
    }

    /// Resolve `clause` into every predecessor against the existential that reached `id`
    fn push(&mut self, id: ContextId, clause: &Clause) {
        let mut derived = Vec::new();
        if let Some(context) = self.context(id) {
            if let Some(via) = context.via {
                for &source in &context.backward {
                    let Some(predecessor) = self.context(source) else {
                        continue;
                    };
                    for antecedent in predecessor.indexed(via) {
                        if antecedent.first() == Some(via) {
                            derived.push((source, clause.resolve(antecedent)));
                        }
                    }
                }
            }
        }
        self.stats.pushed_clauses += derived.len();
        for (source, resolvent) in derived {
            self.add(source, resolvent);
        }
    }

    fn record_subsumer(&mut self, id: ContextId, clause: &Clause) -> Result<()> {
        let terms = self.terms;
        match clause.first() {
            Some(head) if clause.len() == 1 && terms.is_atomic(head.normalize()) => {
                if let Some(context) = slot_mut(&mut self.contexts, id) {
                    if !context.subsumers.contains(&head.normalize()) {
                        context.subsumers.push(head.normalize());
                    }
                }
                Ok(())
            }
            _ => Err(ShError::InvariantViolation(format!(
                "unexpected annotated clause {} in goal context",
                clause.render(terms)
            ))),
        }
    }
}
