//! ロール階層
//!
//! 直接の包含関係から反射・推移・逆閉包を計算します。

use crate::model::{RoleId, TermFactory};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Role inclusion relation `sub ⊑ sup`
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    direct: HashMap<RoleId, BTreeSet<RoleId>>,
    closure: HashMap<RoleId, HashSet<RoleId>>,
}

impl RoleHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert `sub ⊑ sup`; the inverse inclusion is recorded alongside
    pub fn add(&mut self, terms: &TermFactory, sub: RoleId, sup: RoleId) {
        if sub == sup {
            return;
        }
        self.direct.entry(sub).or_default().insert(sup);
        self.direct
            .entry(terms.inverse(sub))
            .or_default()
            .insert(terms.inverse(sup));
    }

    /// Compute the transitive closure of the asserted inclusions
    pub fn close(&mut self) {
        self.closure.clear();
        for &role in self.direct.keys() {
            let mut reached = HashSet::new();
            let mut queue: VecDeque<RoleId> = VecDeque::from([role]);
            while let Some(current) = queue.pop_front() {
                if let Some(supers) = self.direct.get(&current) {
                    for &sup in supers {
                        if sup != role && reached.insert(sup) {
                            queue.push_back(sup);
                        }
                    }
                }
            }
            self.closure.insert(role, reached);
        }
    }

    /// Whether `sub ⊑ sup` holds in the closed hierarchy (reflexive)
    pub fn includes(&self, sub: RoleId, sup: RoleId) -> bool {
        sub == sup || self.closure.get(&sub).is_some_and(|supers| supers.contains(&sup))
    }

    pub fn direct_count(&self) -> usize {
        self.direct.values().map(BTreeSet::len).sum()
    }
}
