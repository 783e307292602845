//! Backtracking search over tactic expansions.
//!
//! A tactic run keeps a frontier of partial derivations. Each one holds an
//! agenda of goals still to be refined, the solutions of holes filled so
//! far, and the goals left open. The frontier is explored depth-first,
//! earlier alternatives first, with iterative deepening on the number of
//! rule applications along a branch.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::Config;
use crate::hyp::Hypothesis;
use crate::judgement::{Context, Judgement};
use crate::tt::{mk_hole, Id, Name, Term, Type, TypeEnv};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TacticError {
    #[error("variable not in scope: {0}")]
    NotInScope(Name),
    #[error("{rule} does not apply to goal {goal}")]
    NoApplicableRule { rule: &'static str, goal: Type },
    #[error("{command} needs a binding")]
    MissingBinding { command: &'static str },
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("hole cannot be resolved: {0}")]
    ResolutionUnavailable(String),
    #[error("tactic makes no progress")]
    NoProgress,
}

// nesting of tactic combinators expanded without a rule application
const MAX_NESTING: usize = 512;

pub type RuleFn = dyn Fn(&Judgement, &mut RuleEnv<'_>) -> Result<Vec<Refinement>, TacticError>;

pub struct TacticRule {
    pub name: &'static str,
    apply: Box<RuleFn>,
}

#[derive(Clone)]
pub enum Tactic {
    /// One refinement step. Each refinement is an alternative.
    Rule(Rc<TacticRule>),
    /// Runs the second tactic on every subgoal the first one leaves.
    Then(Rc<(Tactic, Tactic)>),
    /// Runs the second tactic when the first fails or offers nothing.
    Or(Rc<(Tactic, Tactic)>),
    /// Every alternative of every tactic, in order.
    Choice(Rc<[Tactic]>),
    /// Leaves the goal as it is.
    Idle,
    Fail(TacticError),
    Lazy(Rc<dyn Fn() -> Tactic>),
    WithGoal(Rc<dyn Fn(&Judgement) -> Tactic>),
}

impl Debug for Tactic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tactic::Rule(rule) => write!(f, "{}", rule.name),
            Tactic::Then(inner) => write!(f, "then({:?}, {:?})", inner.0, inner.1),
            Tactic::Or(inner) => write!(f, "or({:?}, {:?})", inner.0, inner.1),
            Tactic::Choice(ts) => f.debug_list().entries(ts.iter()).finish(),
            Tactic::Idle => write!(f, "idle"),
            Tactic::Fail(err) => write!(f, "fail({err})"),
            Tactic::Lazy(_) => write!(f, "lazy"),
            Tactic::WithGoal(_) => write!(f, "with_goal"),
        }
    }
}

pub fn rule(
    name: &'static str,
    apply: impl Fn(&Judgement, &mut RuleEnv<'_>) -> Result<Vec<Refinement>, TacticError> + 'static,
) -> Tactic {
    Tactic::Rule(Rc::new(TacticRule {
        name,
        apply: Box::new(apply),
    }))
}

pub fn then(first: Tactic, rest: Tactic) -> Tactic {
    Tactic::Then(Rc::new((first, rest)))
}

pub fn or(first: Tactic, fallback: Tactic) -> Tactic {
    Tactic::Or(Rc::new((first, fallback)))
}

pub fn choice(tactics: impl IntoIterator<Item = Tactic>) -> Tactic {
    Tactic::Choice(tactics.into_iter().collect())
}

pub fn idle() -> Tactic {
    Tactic::Idle
}

pub fn fail(err: TacticError) -> Tactic {
    Tactic::Fail(err)
}

pub fn lazy(f: impl Fn() -> Tactic + 'static) -> Tactic {
    Tactic::Lazy(Rc::new(f))
}

/// Builds the tactic from the judgement it is run on.
pub fn with_goal(f: impl Fn(&Judgement) -> Tactic + 'static) -> Tactic {
    Tactic::WithGoal(Rc::new(f))
}

/// A partial term for a goal. `extract` mentions the hole of every subgoal.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub extract: Term,
    pub subgoals: Vec<Subgoal>,
}

impl Refinement {
    pub fn closed(extract: Term) -> Self {
        Refinement {
            extract,
            subgoals: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subgoal {
    pub id: Id,
    pub judgement: Judgement,
    /// Runs before the rest of the enclosing tactic when present.
    pub tactic: Option<Tactic>,
}

/// What a rule may consult or allocate while refining one goal.
pub struct RuleEnv<'a> {
    pub ctx: &'a Context,
    next_hole: usize,
}

impl<'a> RuleEnv<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        RuleEnv { ctx, next_hole: 0 }
    }

    pub fn types(&self) -> &TypeEnv {
        &self.ctx.types
    }

    pub fn fresh_hole(&mut self) -> Id {
        let id = Id::new(self.next_hole);
        self.next_hole += 1;
        id
    }

    pub fn subgoal(&mut self, judgement: Judgement) -> (Term, Subgoal) {
        self.subgoal_with(judgement, None)
    }

    pub fn subgoal_with(&mut self, judgement: Judgement, tactic: Option<Tactic>) -> (Term, Subgoal) {
        let id = self.fresh_hole();
        (
            mk_hole(id),
            Subgoal {
                id,
                judgement,
                tactic,
            },
        )
    }
}

/// Fresh binder names that avoid every name of a hypothesis.
#[derive(Debug, Clone)]
pub struct NameSupply {
    used: HashSet<Name>,
}

impl NameSupply {
    pub fn new(hypothesis: &Hypothesis) -> Self {
        NameSupply {
            used: hypothesis.names().cloned().collect(),
        }
    }

    /// `f` for functions, the variable for type variables, and the lowercase
    /// initial of the type constructor otherwise; numbered on collision.
    pub fn fresh(&mut self, ty: &Type) -> Name {
        let base = match ty {
            Type::Arrow(_) => "f".to_owned(),
            Type::Local(inner) => inner.name.as_str().to_owned(),
            _ => ty
                .unapply()
                .and_then(|(head, _)| head.as_str().chars().next())
                .map(|c| c.to_lowercase().collect())
                .unwrap_or_else(|| "x".to_owned()),
        };
        let mut name = Name::from_str(&base);
        let mut suffix = 0;
        while self.used.contains(&name) {
            suffix += 1;
            name = Name::from_str(&format!("{base}{suffix}"));
        }
        self.used.insert(name.clone());
        name
    }
}

/// A complete expansion of the root goal. `open` lists the goals whose holes
/// remain in `term`.
#[derive(Debug, Clone)]
pub struct Derivation {
    pub term: Term,
    pub open: Vec<Judgement>,
}

/// Persistent stack shared between sibling branches.
struct Stack<T>(Option<Rc<(T, Stack<T>)>>);

impl<T> Clone for Stack<T> {
    fn clone(&self) -> Self {
        Stack(self.0.clone())
    }
}

impl<T> Stack<T> {
    fn nil() -> Self {
        Stack(None)
    }

    fn push(&self, value: T) -> Self {
        Stack(Some(Rc::new((value, self.clone()))))
    }

    fn pop(&self) -> Option<(&T, &Stack<T>)> {
        self.0.as_deref().map(|cell| (&cell.0, &cell.1))
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::successors(self.pop(), |&(_, rest)| rest.pop()).map(|(value, _)| value)
    }
}

#[derive(Clone)]
struct Item {
    id: Id,
    judgement: Rc<Judgement>,
    tactic: Tactic,
    cont: Stack<Tactic>,
    depth: usize,
}

#[derive(Clone)]
struct State {
    agenda: Stack<Item>,
    fills: Stack<(Id, Term)>,
    open: Stack<Rc<Judgement>>,
}

impl State {
    fn finish(&self, root: Id) -> Derivation {
        let solution: HashMap<Id, Term> = self.fills.iter().cloned().collect();
        let mut open: Vec<Judgement> = self.open.iter().map(|j| (**j).clone()).collect();
        open.reverse();
        Derivation {
            term: mk_hole(root).instantiate(&solution),
            open,
        }
    }
}

#[derive(Default)]
struct Alternative {
    fill: Option<(Id, Term)>,
    items: Vec<Item>,
    open: Vec<Rc<Judgement>>,
}

impl Alternative {
    /// Hands a goal to `tactic`, or else to the rest of the enclosing tactic.
    fn schedule(
        &mut self,
        id: Id,
        judgement: Rc<Judgement>,
        tactic: Option<Tactic>,
        cont: &Stack<Tactic>,
        depth: usize,
    ) {
        let (tactic, cont) = match (tactic, cont.pop()) {
            (Some(tactic), _) => (tactic, cont.clone()),
            (None, Some((next, rest))) => (next.clone(), rest.clone()),
            (None, None) => {
                self.open.push(judgement);
                return;
            }
        };
        self.items.push(Item {
            id,
            judgement,
            tactic,
            cont,
            depth,
        });
    }
}

struct Search<'a> {
    env: RuleEnv<'a>,
    deadline: Instant,
    timeout: Duration,
    max_depth: usize,
    max_solutions: usize,
    // a branch was pruned at the depth bound
    cut: bool,
    failure: Option<TacticError>,
}

impl<'a> Search<'a> {
    fn check_deadline(&self) -> Result<(), TacticError> {
        if Instant::now() >= self.deadline {
            log::debug!("search timed out at depth bound {}", self.max_depth);
            return Err(TacticError::Timeout(self.timeout));
        }
        Ok(())
    }

    fn run(&mut self, judgement: &Judgement, tactic: &Tactic) -> Result<Vec<Derivation>, TacticError> {
        let root = self.env.fresh_hole();
        let item = Item {
            id: root,
            judgement: Rc::new(judgement.clone()),
            tactic: tactic.clone(),
            cont: Stack::nil(),
            depth: 0,
        };
        let mut frontier = vec![State {
            agenda: Stack::nil().push(item),
            fills: Stack::nil(),
            open: Stack::nil(),
        }];
        let mut derivations: Vec<Derivation> = vec![];

        while let Some(state) = frontier.pop() {
            self.check_deadline()?;
            let Some((item, agenda)) = state.agenda.pop() else {
                let derivation = state.finish(root);
                if derivations.iter().all(|d| d.term != derivation.term) {
                    log::trace!("derivation found: {}", derivation.term);
                    derivations.push(derivation);
                    if derivations.len() >= self.max_solutions {
                        break;
                    }
                }
                continue;
            };
            let alternatives = match self.expand(item, &item.tactic, &item.cont, 0) {
                Ok(alternatives) => alternatives,
                Err(err) => {
                    log::trace!("branch failed: {err}");
                    self.failure.get_or_insert(err);
                    continue;
                }
            };
            for alternative in alternatives.into_iter().rev() {
                let mut next = State {
                    agenda: agenda.clone(),
                    fills: state.fills.clone(),
                    open: state.open.clone(),
                };
                if let Some(fill) = alternative.fill {
                    next.fills = next.fills.push(fill);
                }
                for judgement in alternative.open {
                    next.open = next.open.push(judgement);
                }
                for item in alternative.items.into_iter().rev() {
                    next.agenda = next.agenda.push(item);
                }
                frontier.push(next);
            }
        }
        Ok(derivations)
    }

    fn expand(
        &mut self,
        item: &Item,
        tactic: &Tactic,
        cont: &Stack<Tactic>,
        nesting: usize,
    ) -> Result<Vec<Alternative>, TacticError> {
        if nesting > MAX_NESTING {
            return Err(TacticError::NoProgress);
        }
        match tactic {
            Tactic::Idle => {
                let mut alternative = Alternative::default();
                alternative.schedule(item.id, Rc::clone(&item.judgement), None, cont, item.depth);
                Ok(vec![alternative])
            }
            Tactic::Fail(err) => Err(err.clone()),
            Tactic::Then(inner) => {
                self.expand(item, &inner.0, &cont.push(inner.1.clone()), nesting + 1)
            }
            Tactic::Or(inner) => {
                let cut = std::mem::replace(&mut self.cut, false);
                let first = self.expand(item, &inner.0, cont, nesting + 1);
                let first_cut = self.cut;
                self.cut |= cut;
                match first {
                    Ok(alternatives) if !alternatives.is_empty() || first_cut => Ok(alternatives),
                    _ => self.expand(item, &inner.1, cont, nesting + 1),
                }
            }
            Tactic::Choice(tactics) => {
                let mut alternatives = vec![];
                let mut error = None;
                let mut succeeded = false;
                for tactic in tactics.iter() {
                    match self.expand(item, tactic, cont, nesting + 1) {
                        Ok(more) => {
                            succeeded = true;
                            alternatives.extend(more);
                        }
                        Err(err) => {
                            error.get_or_insert(err);
                        }
                    }
                }
                match error {
                    Some(err) if !succeeded => Err(err),
                    _ => Ok(alternatives),
                }
            }
            Tactic::Lazy(f) => self.expand(item, &f(), cont, nesting + 1),
            Tactic::WithGoal(f) => self.expand(item, &f(&item.judgement), cont, nesting + 1),
            Tactic::Rule(rule) => {
                if item.depth >= self.max_depth {
                    self.cut = true;
                    return Ok(vec![]);
                }
                let refinements = (rule.apply)(&item.judgement, &mut self.env)?;
                log::trace!(
                    "{} offers {} refinements for {}",
                    rule.name,
                    refinements.len(),
                    item.judgement.goal
                );
                Ok(refinements
                    .into_iter()
                    .map(|refinement| {
                        let mut alternative = Alternative {
                            fill: Some((item.id, refinement.extract)),
                            ..Default::default()
                        };
                        for subgoal in refinement.subgoals {
                            alternative.schedule(
                                subgoal.id,
                                Rc::new(subgoal.judgement),
                                subgoal.tactic,
                                cont,
                                item.depth + 1,
                            );
                        }
                        alternative
                    })
                    .collect())
            }
        }
    }
}

/// Runs `tactic` on `judgement` until derivations are found, the search space
/// is exhausted, or the budget of `config` elapses.
///
/// Returns the derivations of the shallowest depth bound that has any, in
/// search order. When there are none, the first branch failure is reported.
pub fn search(
    config: &Config,
    ctx: &Context,
    judgement: &Judgement,
    tactic: &Tactic,
) -> Result<Vec<Derivation>, TacticError> {
    let deadline = Instant::now() + config.timeout;
    let mut max_depth = 1;
    loop {
        let mut search = Search {
            env: RuleEnv::new(ctx),
            deadline,
            timeout: config.timeout,
            max_depth,
            max_solutions: config.max_solutions.max(1),
            cut: false,
            failure: None,
        };
        let derivations = search.run(judgement, tactic)?;
        if !derivations.is_empty() {
            log::debug!(
                "{} derivations within depth bound {max_depth}",
                derivations.len()
            );
            return Ok(derivations);
        }
        if !search.cut {
            return Err(search.failure.unwrap_or_else(|| TacticError::NoApplicableRule {
                rule: "search",
                goal: judgement.goal.clone(),
            }));
        }
        max_depth += 1;
        log::trace!("deepening to {max_depth}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyp::{HyInfo, Provenance};
    use crate::tt::{mk_type_arrow, mk_type_const, mk_var};
    use std::sync::Arc;

    fn ty(name: &str) -> Type {
        mk_type_const(Name::from_str(name))
    }

    fn ctx() -> Context {
        Context::new(Arc::new(TypeEnv::default()))
    }

    fn jdg(goal: Type) -> Judgement {
        Judgement::new(goal, Hypothesis::default(), true)
    }

    fn constant(name: &'static str) -> Tactic {
        rule(name, move |_, _| Ok(vec![Refinement::closed(mk_var(Name::from_str(name)))]))
    }

    // `s _`, one subgoal of the same type
    fn succ() -> Tactic {
        rule("succ", |jdg, env| {
            let (hole, subgoal) = env.subgoal(jdg.subgoal(jdg.goal.clone()));
            Ok(vec![Refinement {
                extract: mk_var(Name::from_str("s")).apply([hole]),
                subgoals: vec![subgoal],
            }])
        })
    }

    fn terms(derivations: &[Derivation]) -> Vec<String> {
        derivations.iter().map(|d| d.term.to_string()).collect()
    }

    #[test]
    fn choice_keeps_declaration_order() {
        let tactic = choice([constant("a"), fail(TacticError::NoProgress), constant("b")]);
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &tactic).unwrap();
        assert_eq!(terms(&result), vec!["a", "b"]);
    }

    #[test]
    fn or_falls_back_only_on_failure() {
        let config = Config::default();
        let tactic = or(fail(TacticError::NoProgress), constant("b"));
        let result = search(&config, &ctx(), &jdg(ty("T")), &tactic).unwrap();
        assert_eq!(terms(&result), vec!["b"]);

        let tactic = or(constant("a"), constant("b"));
        let result = search(&config, &ctx(), &jdg(ty("T")), &tactic).unwrap();
        assert_eq!(terms(&result), vec!["a"]);
    }

    #[test]
    fn then_runs_on_every_subgoal() {
        let tactic = then(succ(), then(succ(), constant("z")));
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &tactic).unwrap();
        assert_eq!(terms(&result), vec!["s (s z)"]);
        assert!(result[0].open.is_empty());
    }

    #[test]
    fn idle_leaves_goals_open() {
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &succ()).unwrap();
        assert_eq!(terms(&result), vec!["s _"]);
        assert_eq!(result[0].open.len(), 1);
        assert!(!result[0].open[0].is_top_hole);
    }

    #[test]
    fn deepening_finds_shallow_solutions_first() {
        fn nat() -> Tactic {
            lazy(|| choice([then(succ(), nat()), constant("z")]))
        }
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &nat()).unwrap();
        assert_eq!(terms(&result)[0], "z");
    }

    #[test]
    fn max_solutions_bounds_the_search() {
        let config = Config {
            max_solutions: 2,
            ..Config::default()
        };
        let tactic = choice([constant("a"), constant("b"), constant("c")]);
        let result = search(&config, &ctx(), &jdg(ty("T")), &tactic).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn sole_branch_failure_surfaces() {
        let x = Name::from_str("x");
        let tactic = fail(TacticError::NotInScope(x.clone()));
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &tactic);
        assert_eq!(result.unwrap_err(), TacticError::NotInScope(x));
    }

    #[test]
    fn endless_search_times_out() {
        fn spin() -> Tactic {
            then(idle(), lazy(spin))
        }
        let config = Config::default().with_timeout(Duration::from_millis(50));
        let result = search(&config, &ctx(), &jdg(ty("T")), &spin());
        assert_eq!(result.unwrap_err(), TacticError::Timeout(Duration::from_millis(50)));
    }

    #[test]
    fn unbounded_nesting_is_no_progress() {
        fn nest() -> Tactic {
            lazy(nest)
        }
        let result = search(&Config::default(), &ctx(), &jdg(ty("T")), &nest());
        assert_eq!(result.unwrap_err(), TacticError::NoProgress);
    }

    #[test]
    fn fresh_names_avoid_the_hypothesis() {
        let hy: Hypothesis = [HyInfo::new(Name::from_str("f"), ty("T"), Provenance::User)]
            .into_iter()
            .collect();
        let mut names = NameSupply::new(&hy);
        let fun = mk_type_arrow(ty("Int"), ty("Int"));
        assert_eq!(names.fresh(&fun).as_str(), "f1");
        assert_eq!(names.fresh(&fun).as_str(), "f2");
        assert_eq!(names.fresh(&ty("List")).as_str(), "l");
        assert_eq!(names.fresh(&ty("List")).as_str(), "l1");
    }
}
