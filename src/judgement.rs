//! The unit of search, and its construction from resolved hole facts.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use crate::hyp::{HyInfo, Hypothesis, Provenance};
use crate::lex::Span;
use crate::syntax::{Module, Pat};
use crate::tt::{Name, Type, TypeEnv};

/// A goal with everything known at it. Tactics derive new judgements and
/// never change existing ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub goal: Type,
    pub hypothesis: Hypothesis,
    /// The hole is the entire right-hand side of a top-level equation.
    pub is_top_hole: bool,
    /// Bindings already case split on along this branch.
    pub destructed: BTreeSet<Name>,
}

impl Judgement {
    pub fn new(goal: Type, hypothesis: Hypothesis, is_top_hole: bool) -> Self {
        Judgement {
            goal,
            hypothesis,
            is_top_hole,
            destructed: BTreeSet::new(),
        }
    }

    /// A judgement for a strictly nested position.
    pub fn subgoal(&self, goal: Type) -> Judgement {
        Judgement {
            goal,
            hypothesis: self.hypothesis.clone(),
            is_top_hole: false,
            destructed: self.destructed.clone(),
        }
    }

    pub fn with_hypotheses(mut self, infos: impl IntoIterator<Item = HyInfo>) -> Judgement {
        self.hypothesis = self.hypothesis.extend(infos);
        self
    }

    pub fn with_destructed(mut self, name: Name) -> Judgement {
        self.destructed.insert(name);
        self
    }

    pub fn is_destructed(&self, name: &Name) -> bool {
        self.destructed.contains(name)
    }
}

impl Display for Judgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for info in self.hypothesis.iter() {
            writeln!(f, "{info}")?;
        }
        write!(f, "⊢ {}", self.goal)
    }
}

/// Facts about the surroundings of a hole that do not change during a run.
#[derive(Debug, Clone)]
pub struct Context {
    pub local_bindings: Vec<(Name, Type)>,
    pub class_method_hypothesis: Hypothesis,
    pub types: Arc<TypeEnv>,
}

impl Context {
    pub fn new(types: Arc<TypeEnv>) -> Self {
        Context {
            local_bindings: vec![],
            class_method_hypothesis: Hypothesis::default(),
            types,
        }
    }
}

/// What the front end could find out about one hole. A missing field means
/// the corresponding fact is unavailable.
#[derive(Debug, Clone)]
pub struct HoleFacts<'a> {
    pub span: Span,
    pub goal: Option<Type>,
    pub bindings: Option<Vec<HyInfo>>,
    pub module: Option<&'a Module>,
    pub class_methods: Option<Hypothesis>,
    pub types: Option<Arc<TypeEnv>>,
}

/// Pattern variables of the top-level equation whose body is exactly the
/// hole at `span`, keyed to their argument position.
pub fn get_rhs_pos_vals(span: &Span, module: &Module) -> HashMap<Name, Provenance> {
    let Some(eq) = module.top_hole_equation(span) else {
        return HashMap::new();
    };
    eq.pats
        .iter()
        .enumerate()
        .filter_map(|(index, pat)| match pat {
            Pat::Var(name, _) => Some((
                name.clone(),
                Provenance::TopLevelArg {
                    def: eq.name.clone(),
                    index,
                },
            )),
            _ => None,
        })
        .collect()
}

pub fn mk_judgement_and_context(facts: HoleFacts<'_>) -> Option<(Judgement, Context)> {
    let goal = facts.goal?;
    let bindings = facts.bindings?;
    let module = facts.module?;
    let class_methods = facts.class_methods?;
    let types = facts.types?;

    let rhs_pos_vals = get_rhs_pos_vals(&facts.span, module);
    let is_top_hole = module.top_hole_equation(&facts.span).is_some();
    let local: Hypothesis = bindings.iter().cloned().collect();
    // local bindings shadow class methods of the same name
    let hypothesis = class_methods.union(&local.splice_provenance(&rhs_pos_vals));
    log::debug!(
        "judgement at {}:{}: {} hypotheses, top hole: {is_top_hole}",
        facts.span.line_column().0,
        facts.span.line_column().1,
        hypothesis.len()
    );

    let ctx = Context {
        local_bindings: bindings.into_iter().map(|info| (info.name, info.ty)).collect(),
        class_method_hypothesis: class_methods,
        types,
    };
    Some((Judgement::new(goal, hypothesis, is_top_hole), ctx))
}
