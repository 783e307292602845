//! The catalogue of synthesis strategies.

use crate::hyp::{HyInfo, Provenance};
use crate::judgement::Judgement;
use crate::tactic::{
    choice, idle, lazy, or, rule, then, with_goal, NameSupply, Refinement, RuleEnv, Subgoal,
    Tactic, TacticError,
};
use crate::tt::{mk_abs, mk_case, mk_lam_case, mk_var, Alt, DataCon, Name, Term, Type};

fn no_rule(rule: &'static str, jdg: &Judgement) -> TacticError {
    TacticError::NoApplicableRule {
        rule,
        goal: jdg.goal.clone(),
    }
}

fn lookup<'a>(jdg: &'a Judgement, name: &Name) -> Result<&'a HyInfo, TacticError> {
    jdg.hypothesis
        .lookup(name)
        .ok_or_else(|| TacticError::NotInScope(name.clone()))
}

/// A judgement for one argument of a constructor or function application.
/// Locals in scope are settled there: a case split on them belongs above the
/// application, where every argument shares it.
fn argument(jdg: &Judgement, goal: Type) -> Judgement {
    jdg.hypothesis
        .iter()
        .filter(|info| info.provenance.is_local())
        .fold(jdg.subgoal(goal), |arg, info| {
            arg.with_destructed(info.name.clone())
        })
}

/// Uses any hypothesis of exactly the goal type.
pub fn assumption() -> Tactic {
    rule("assumption", |jdg, _| {
        let refinements: Vec<Refinement> = jdg
            .hypothesis
            .iter()
            .filter(|info| info.ty == jdg.goal && info.provenance != Provenance::Recursive)
            .map(|info| Refinement::closed(mk_var(info.name.clone())))
            .collect();
        if refinements.is_empty() {
            return Err(no_rule("assumption", jdg));
        }
        Ok(refinements)
    })
}

pub fn assume(name: Name) -> Tactic {
    rule("assume", move |jdg, _| {
        let info = lookup(jdg, &name)?;
        if info.ty != jdg.goal {
            return Err(no_rule("assume", jdg));
        }
        Ok(vec![Refinement::closed(mk_var(name.clone()))])
    })
}

pub fn intros() -> Tactic {
    rule("intros", |jdg, env| {
        let (doms, res) = jdg.goal.unarrow();
        if doms.is_empty() {
            return Err(no_rule("intros", jdg));
        }
        let mut names = NameSupply::new(&jdg.hypothesis);
        let binders: Vec<HyInfo> = doms
            .into_iter()
            .map(|ty| HyInfo::new(names.fresh(&ty), ty, Provenance::User))
            .collect();
        let vars = binders.iter().map(|info| info.name.clone()).collect();
        let (body, subgoal) = env.subgoal(jdg.subgoal(res).with_hypotheses(binders));
        Ok(vec![Refinement {
            extract: mk_abs(vars, body),
            subgoals: vec![subgoal],
        }])
    })
}

/// One alternative per constructor of the goal type.
pub fn split() -> Tactic {
    rule("split", |jdg, env| {
        let ctors = env
            .types()
            .algebraic(&jdg.goal)
            .ok_or_else(|| no_rule("split", jdg))?;
        Ok(ctors
            .into_iter()
            .map(|ctor| {
                let (args, subgoals): (Vec<_>, Vec<_>) = ctor
                    .fields
                    .into_iter()
                    .map(|field| env.subgoal(argument(jdg, field)))
                    .unzip();
                Refinement {
                    extract: mk_var(ctor.name).apply(args),
                    subgoals,
                }
            })
            .collect())
    })
}

/// Applies a function whose final result is the goal to fresh subgoals.
pub fn apply() -> Tactic {
    rule("apply", |jdg, env| {
        let candidates: Vec<HyInfo> = jdg
            .hypothesis
            .iter()
            .filter(|info| {
                info.provenance != Provenance::Recursive
                    && info.ty.is_arrow()
                    && info.ty.unarrow().1 == jdg.goal
            })
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(no_rule("apply", jdg));
        }
        Ok(candidates
            .into_iter()
            .map(|info| {
                let (doms, _) = info.ty.unarrow();
                let (args, subgoals): (Vec<_>, Vec<_>) = doms
                    .into_iter()
                    .map(|dom| env.subgoal(argument(jdg, dom)))
                    .unzip();
                Refinement {
                    extract: mk_var(info.name).apply(args),
                    subgoals,
                }
            })
            .collect())
    })
}

/// Builds one case alternative per constructor. `body` receives the branch
/// judgement, whose hypothesis holds the constructor's fields.
fn case_alts(
    jdg: &Judgement,
    env: &mut RuleEnv<'_>,
    scrutinee: Option<&Name>,
    ctors: Vec<DataCon>,
    goal: &Type,
    mut body: impl FnMut(&DataCon, &[Name], Judgement, &mut RuleEnv<'_>) -> (Term, Vec<Subgoal>),
) -> (Vec<Alt>, Vec<Subgoal>) {
    let mut alts = vec![];
    let mut subgoals = vec![];
    for ctor in ctors {
        let mut names = NameSupply::new(&jdg.hypothesis);
        let binders: Vec<Name> = ctor.fields.iter().map(|ty| names.fresh(ty)).collect();
        let fields = binders
            .iter()
            .zip(&ctor.fields)
            .enumerate()
            .map(|(index, (name, ty))| {
                HyInfo::new(
                    name.clone(),
                    ty.clone(),
                    Provenance::PatternMatch {
                        scrutinee: scrutinee.cloned(),
                        ctor: ctor.name.clone(),
                        index,
                    },
                )
            });
        let mut branch = jdg.subgoal(goal.clone()).with_hypotheses(fields);
        if let Some(scrutinee) = scrutinee {
            branch = branch.with_destructed(scrutinee.clone());
        }
        let (term, more) = body(&ctor, &binders, branch, env);
        alts.push(Alt {
            ctor: ctor.name.clone(),
            binders,
            body: term,
        });
        subgoals.extend(more);
    }
    (alts, subgoals)
}

fn hole_body(
    _: &DataCon,
    _: &[Name],
    branch: Judgement,
    env: &mut RuleEnv<'_>,
) -> (Term, Vec<Subgoal>) {
    let (hole, subgoal) = env.subgoal(branch);
    (hole, vec![subgoal])
}

/// A call of the definition being written on `field`, with every other
/// argument passed through unchanged.
fn recursive_call(
    branch: &Judgement,
    scrutinee: Option<&Name>,
    field: &Name,
    field_ty: &Type,
) -> Option<Term> {
    let rec = branch
        .hypothesis
        .find_provenance(|p| *p == Provenance::Recursive)?;
    let (doms, res) = rec.ty.unarrow();
    if res != *field_ty {
        return None;
    }
    let scrutinee = scrutinee.and_then(|name| branch.hypothesis.lookup(name));
    let position = match scrutinee.map(|info| &info.provenance) {
        Some(Provenance::TopLevelArg { def, index }) if *def == rec.name => *index,
        _ if doms.len() == 1 => 0,
        _ => return None,
    };
    if doms.get(position) != Some(field_ty) {
        return None;
    }
    let args = doms
        .iter()
        .enumerate()
        .map(|(i, dom)| {
            if i == position {
                return Some(mk_var(field.clone()));
            }
            branch
                .hypothesis
                .find_provenance(|p| {
                    matches!(p, Provenance::TopLevelArg { def, index } if *def == rec.name && *index == i)
                })
                .filter(|info| info.ty == *dom)
                .map(|info| mk_var(info.name.clone()))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(mk_var(rec.name.clone()).apply(args))
}

/// Rebuilds the matched constructor. Recursive positions become recursive
/// calls when one can be formed; other fields are kept unless a later tactic
/// finds something better.
fn homomorphic_body(
    scrutinee: Option<&Name>,
    ctor: &DataCon,
    binders: &[Name],
    branch: Judgement,
    env: &mut RuleEnv<'_>,
) -> (Term, Vec<Subgoal>) {
    let mut args = vec![];
    let mut subgoals = vec![];
    for (binder, field_ty) in binders.iter().zip(&ctor.fields) {
        if *field_ty == branch.goal {
            if let Some(call) = recursive_call(&branch, scrutinee, binder, field_ty) {
                args.push(call);
                continue;
            }
        }
        let tactic = or(assume(binder.clone()), idle());
        let (hole, subgoal) = env.subgoal_with(branch.subgoal(field_ty.clone()), Some(tactic));
        args.push(hole);
        subgoals.push(subgoal);
    }
    (mk_var(ctor.name.clone()).apply(args), subgoals)
}

/// Case analysis on `name`, one subgoal per constructor.
pub fn destruct(name: Name) -> Tactic {
    rule("destruct", move |jdg, env| {
        let info = lookup(jdg, &name)?;
        let ctors = env
            .types()
            .algebraic(&info.ty)
            .ok_or_else(|| no_rule("destruct", jdg))?;
        let (alts, subgoals) = case_alts(jdg, env, Some(&name), ctors, &jdg.goal, hole_body);
        Ok(vec![Refinement {
            extract: mk_case(mk_var(name.clone()), alts),
            subgoals,
        }])
    })
}

/// Structural recursion over `name`, whose type must be the goal.
pub fn homomorphism(name: Name) -> Tactic {
    rule("homomorphism", move |jdg, env| {
        let info = lookup(jdg, &name)?;
        if info.ty != jdg.goal {
            return Err(no_rule("homomorphism", jdg));
        }
        let ctors = env
            .types()
            .algebraic(&info.ty)
            .ok_or_else(|| no_rule("homomorphism", jdg))?;
        let (alts, subgoals) =
            case_alts(jdg, env, Some(&name), ctors, &jdg.goal, |ctor, binders, branch, env| {
                homomorphic_body(Some(&name), ctor, binders, branch, env)
            });
        Ok(vec![Refinement {
            extract: mk_case(mk_var(name.clone()), alts),
            subgoals,
        }])
    })
}

pub fn destruct_lambda_case() -> Tactic {
    rule("destruct_lambda_case", |jdg, env| {
        let (dom, cod) = jdg
            .goal
            .as_arrow()
            .ok_or_else(|| no_rule("destruct_lambda_case", jdg))?;
        let ctors = env
            .types()
            .algebraic(dom)
            .ok_or_else(|| no_rule("destruct_lambda_case", jdg))?;
        let (alts, subgoals) = case_alts(jdg, env, None, ctors, cod, hole_body);
        Ok(vec![Refinement {
            extract: mk_lam_case(alts),
            subgoals,
        }])
    })
}

pub fn homomorphism_lambda_case() -> Tactic {
    rule("homomorphism_lambda_case", |jdg, env| {
        let (dom, cod) = jdg
            .goal
            .as_arrow()
            .ok_or_else(|| no_rule("homomorphism_lambda_case", jdg))?;
        if dom != cod {
            return Err(no_rule("homomorphism_lambda_case", jdg));
        }
        let ctors = env
            .types()
            .algebraic(dom)
            .ok_or_else(|| no_rule("homomorphism_lambda_case", jdg))?;
        let (alts, subgoals) =
            case_alts(jdg, env, None, ctors, cod, |ctor, binders, branch, env| {
                homomorphic_body(None, ctor, binders, branch, env)
            });
        Ok(vec![Refinement {
            extract: mk_lam_case(alts),
            subgoals,
        }])
    })
}

fn destruct_any() -> Tactic {
    with_goal(|jdg| {
        let targets: Vec<Tactic> = jdg
            .hypothesis
            .iter()
            .filter(|info| {
                info.provenance.is_local()
                    && !info.ty.is_arrow()
                    && !jdg.is_destructed(&info.name)
            })
            .map(|info| destruct(info.name.clone()))
            .collect();
        choice(targets)
    })
}

fn homomorphism_any() -> Tactic {
    with_goal(|jdg| {
        let targets: Vec<Tactic> = jdg
            .hypothesis
            .iter()
            .filter(|info| {
                info.provenance.is_local() && info.ty == jdg.goal && !jdg.is_destructed(&info.name)
            })
            .map(|info| homomorphism(info.name.clone()))
            .collect();
        choice(targets)
    })
}

/// Fully automatic search. Bounded only by the run's budget.
pub fn auto() -> Tactic {
    lazy(|| {
        choice([
            assumption(),
            then(intros(), auto()),
            then(split(), auto()),
            then(homomorphism_any(), auto()),
            then(destruct_any(), auto()),
            then(apply(), auto()),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::elab::Resolved;
    use crate::lex::File;
    use crate::tactic::{search, Derivation};
    use std::sync::Arc;
    use std::time::Duration;

    const PRELUDE: &str = "\
type Int
type Bool
data List a = Nil | Cons a (List a)
data Shape = Dot | Circle Int | Rect Int Bool
";

    fn resolve(source: &str) -> Resolved {
        let program = crate::load(Arc::new(File::new("<test>", format!("{PRELUDE}{source}"))))
            .expect("load failed");
        program.resolve(0).expect("hole does not resolve")
    }

    fn run(resolved: &Resolved, tactic: &Tactic) -> Result<Vec<Derivation>, TacticError> {
        search(
            &Config::default(),
            &resolved.context,
            &resolved.judgement,
            tactic,
        )
    }

    fn first(resolved: &Resolved, tactic: &Tactic) -> String {
        run(resolved, tactic).expect("search failed")[0]
            .term
            .to_string()
    }

    #[test]
    fn auto_uses_a_matching_hypothesis() {
        let resolved = resolve("f : Int -> Bool -> Int\nf x b = _\n");
        let result = run(&resolved, &auto()).unwrap();
        assert_eq!(result[0].term.to_string(), "x");
        assert!(result[0].open.is_empty());
    }

    #[test]
    fn auto_times_out_on_unsolvable_goals() {
        let resolved = resolve("g : a -> a\nf : a\nf = _\n");
        let config = Config::default().with_timeout(Duration::from_millis(50));
        let result = search(&config, &resolved.context, &resolved.judgement, &auto());
        assert_eq!(
            result.unwrap_err(),
            TacticError::Timeout(Duration::from_millis(50))
        );
    }

    #[test]
    fn destruct_makes_one_subgoal_per_constructor() {
        let resolved = resolve("area : Shape -> Int\narea s = _\n");
        let result = run(&resolved, &destruct(Name::from_str("s"))).unwrap();
        assert_eq!(result.len(), 1);
        insta::assert_snapshot!(
            result[0].term,
            @"case s of { Dot -> _; Circle i -> _; Rect i b -> _ }"
        );
        let open = &result[0].open;
        assert_eq!(open.len(), 3);
        let before = &resolved.judgement.hypothesis;
        for (jdg, fields) in open.iter().zip([0, 1, 2]) {
            assert_eq!(jdg.hypothesis.len(), before.len() + fields);
            assert!(before.iter().all(|info| jdg.hypothesis.lookup(&info.name) == Some(info)));
            assert!(jdg.is_destructed(&Name::from_str("s")));
            assert_eq!(jdg.goal, resolved.judgement.goal);
        }
        let rect = &open[2];
        let b = rect.hypothesis.lookup(&Name::from_str("b")).unwrap();
        assert_eq!(b.ty.to_string(), "Bool");
        assert!(matches!(
            &b.provenance,
            Provenance::PatternMatch { ctor, index: 1, .. } if ctor.as_str() == "Rect"
        ));
    }

    #[test]
    fn destruct_unknown_name_is_not_in_scope() {
        let resolved = resolve("area : Shape -> Int\narea s = _\n");
        let result = run(&resolved, &destruct(Name::from_str("t")));
        assert_eq!(
            result.unwrap_err(),
            TacticError::NotInScope(Name::from_str("t"))
        );
    }

    #[test]
    fn destruct_rejects_non_algebraic_bindings() {
        let resolved = resolve("f : Int -> Int\nf n = _\n");
        let result = run(&resolved, &destruct(Name::from_str("n")));
        assert!(matches!(
            result,
            Err(TacticError::NoApplicableRule { rule: "destruct", .. })
        ));
    }

    #[test]
    fn intros_names_arguments_by_type() {
        let resolved = resolve("f : List Int -> (Int -> Int) -> Int\nf = _\n");
        let result = run(&resolved, &intros()).unwrap();
        assert_eq!(result[0].term.to_string(), "\\l f1 -> _");
        let body = &result[0].open[0];
        assert!(!body.is_top_hole);
        assert_eq!(body.goal.to_string(), "Int");
        let l = body.hypothesis.lookup(&Name::from_str("l")).unwrap();
        assert_eq!(l.provenance, Provenance::User);
    }

    #[test]
    fn homomorphism_recurses_on_smaller_fields() {
        let resolved = resolve("copy : List Int -> List Int\ncopy xs = _\n");
        let term = first(&resolved, &homomorphism(Name::from_str("xs")));
        assert_eq!(
            term,
            "case xs of { Nil -> Nil; Cons i l -> Cons i (copy l) }"
        );
    }

    #[test]
    fn homomorphism_passes_other_arguments_through() {
        let resolved = resolve("pad : Int -> List Int -> List Int\npad n xs = _\n");
        let term = first(&resolved, &homomorphism(Name::from_str("xs")));
        assert_eq!(
            term,
            "case xs of { Nil -> Nil; Cons i l -> Cons i (pad n l) }"
        );
    }

    #[test]
    fn homomorphism_requires_the_goal_type() {
        let resolved = resolve("len : List Int -> Int\nlen xs = _\n");
        let result = run(&resolved, &homomorphism(Name::from_str("xs")));
        assert!(matches!(
            result,
            Err(TacticError::NoApplicableRule { rule: "homomorphism", .. })
        ));
    }

    #[test]
    fn lambda_case_variants() {
        let resolved = resolve("copy : List Int -> List Int\ncopy = _\n");
        assert_eq!(
            first(&resolved, &destruct_lambda_case()),
            "\\case { Nil -> _; Cons i l -> _ }"
        );
        assert_eq!(
            first(&resolved, &homomorphism_lambda_case()),
            "\\case { Nil -> Nil; Cons i l -> Cons i (copy l) }"
        );

        let resolved = resolve("len : List Int -> Int\nlen = _\n");
        assert!(run(&resolved, &homomorphism_lambda_case()).is_err());
    }

    #[test]
    fn auto_prefers_shallow_solutions() {
        let resolved = resolve("inc : Int -> Int\nbump : List Int -> List Int\nbump xs = _\n");
        let result = run(&resolved, &auto()).unwrap();
        let terms: Vec<String> = result.iter().map(|d| d.term.to_string()).collect();
        assert_eq!(terms, vec!["xs", "Nil"]);
        assert!(result.iter().all(|d| d.open.is_empty()));
    }

    #[test]
    fn auto_introduces_arguments() {
        let resolved = resolve("zero : Int\nconst : Bool -> Int\nconst = _\n");
        let result = run(&resolved, &auto()).unwrap();
        assert_eq!(result[0].term.to_string(), "\\b -> zero");
    }

    #[test]
    fn auto_splits_once_above_constructors() {
        let pairs = "data Pair = P Int Bool\ndata Swap = S Bool Int\n";
        let resolved = resolve(&format!("{pairs}swap : Pair -> Swap\nswap p = _\n"));
        let result = run(&resolved, &auto()).unwrap();
        let terms: Vec<String> = result.iter().map(|d| d.term.to_string()).collect();
        assert_eq!(terms, vec!["case p of { P i b -> S b i }"]);

        let resolved = resolve(&format!("{pairs}k : Pair -> Pair -> Swap\nk p q = _\n"));
        let result = run(&resolved, &auto()).unwrap();
        let terms: Vec<String> = result.iter().map(|d| d.term.to_string()).collect();
        assert_eq!(
            terms,
            vec!["case p of { P i b -> S b i }", "case q of { P i b -> S b i }"]
        );
    }

    #[test]
    fn auto_sees_lambda_binders() {
        let resolved = resolve("f : Int -> Bool -> Bool\nf x = \\y -> _\n");
        assert_eq!(first(&resolved, &auto()), "y");
    }

    #[test]
    fn apply_skips_the_definition_being_written() {
        let resolved = resolve("loop : Int -> Int\nloop n = (_ : Int)\n");
        let result = run(&resolved, &apply());
        assert!(matches!(
            result,
            Err(TacticError::NoApplicableRule { rule: "apply", .. })
        ));
    }
}
