//! Which tactic commands are offered at a hole, and how they are invoked.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;

use crate::config::{Config, Extension};
use crate::judgement::{Context, Judgement};
use crate::lex::Span;
use crate::tactic::{Tactic, TacticError};
use crate::tactics;
use crate::tt::{Name, Type, TypeEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TacticCommand {
    Auto,
    Intros,
    Destruct,
    Homomorphism,
    DestructLambdaCase,
    HomomorphismLambdaCase,
}

impl TacticCommand {
    pub const ALL: [TacticCommand; 6] = [
        TacticCommand::Auto,
        TacticCommand::Intros,
        TacticCommand::Destruct,
        TacticCommand::Homomorphism,
        TacticCommand::DestructLambdaCase,
        TacticCommand::HomomorphismLambdaCase,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TacticCommand::Auto => "Auto",
            TacticCommand::Intros => "Intros",
            TacticCommand::Destruct => "Destruct",
            TacticCommand::Homomorphism => "Homomorphism",
            TacticCommand::DestructLambdaCase => "DestructLambdaCase",
            TacticCommand::HomomorphismLambdaCase => "HomomorphismLambdaCase",
        }
    }

    /// Identifier under which invocations are routed back to this command.
    pub fn command_id(self) -> String {
        format!("tactics{}Command", self.tag())
    }

    pub fn takes_binding(self) -> bool {
        matches!(self, TacticCommand::Destruct | TacticCommand::Homomorphism)
    }

    pub fn title(self, binding: Option<&Name>) -> String {
        let binding = binding.map(Name::as_str).unwrap_or("_");
        match self {
            TacticCommand::Auto => "Attempt to fill hole".to_owned(),
            TacticCommand::Intros => "Introduce lambda".to_owned(),
            TacticCommand::Destruct => format!("Case split on {binding}"),
            TacticCommand::Homomorphism => format!("Homomorphic case split on {binding}"),
            TacticCommand::DestructLambdaCase => "Lambda case split".to_owned(),
            TacticCommand::HomomorphismLambdaCase => "Homomorphic lambda case split".to_owned(),
        }
    }
}

impl Display for TacticCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for TacticCommand {
    type Err = anyhow::Error;

    /// Accepts the tag, the command identifier, or the tag in kebab case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for cmd in TacticCommand::ALL {
            let kebab = cmd
                .tag()
                .chars()
                .enumerate()
                .flat_map(|(i, c)| {
                    let dash = (i > 0 && c.is_uppercase()).then_some('-');
                    dash.into_iter().chain(c.to_lowercase())
                })
                .collect::<String>();
            if s == cmd.tag() || s == cmd.command_id() || s == kebab {
                return Ok(cmd);
            }
        }
        bail!("unknown tactic: {s}")
    }
}

/// The parameters needed to invoke an action later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParams {
    pub location: Span,
    /// Empty for commands without a binding.
    pub binding: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub command: TacticCommand,
    pub binding: Option<Name>,
    pub title: String,
    pub params: ActionParams,
}

pub fn destruct_filter(types: &TypeEnv, _goal: &Type, ty: &Type) -> bool {
    types.is_algebraic(ty)
}

pub fn homo_filter(types: &TypeEnv, goal: &Type, ty: &Type) -> bool {
    types.is_algebraic(goal) && types.is_algebraic(ty) && goal == ty
}

/// `None` unless the goal is a function out of an algebraic type. Otherwise
/// whether the argument and the result types agree, which is what a
/// homomorphic split needs. An algebraic result of another type is not
/// enough: rebuilding the matched constructor only type checks when the
/// result is the argument type itself.
pub fn lambda_caseable(types: &TypeEnv, goal: &Type) -> Option<bool> {
    let (dom, cod) = goal.as_arrow()?;
    if !types.is_algebraic(dom) {
        return None;
    }
    Some(dom == cod)
}

fn action(command: TacticCommand, binding: Option<Name>, location: &Span) -> Action {
    Action {
        command,
        title: command.title(binding.as_ref()),
        params: ActionParams {
            location: location.clone(),
            binding: binding.as_ref().map(|b| b.to_string()).unwrap_or_default(),
        },
        binding,
    }
}

/// Actions applicable at a hole, grouped by command in declaration order.
pub fn list_actions(
    config: &Config,
    ctx: &Context,
    jdg: &Judgement,
    location: &Span,
) -> Vec<Action> {
    let types = &ctx.types;
    let goal = &jdg.goal;
    let mut actions = vec![];
    for command in TacticCommand::ALL {
        match command {
            TacticCommand::Auto => actions.push(action(command, None, location)),
            TacticCommand::Intros => {
                if goal.is_arrow() {
                    actions.push(action(command, None, location));
                }
            }
            TacticCommand::Destruct | TacticCommand::Homomorphism => {
                let filter: fn(&TypeEnv, &Type, &Type) -> bool = match command {
                    TacticCommand::Destruct => destruct_filter,
                    _ => homo_filter,
                };
                for info in jdg.hypothesis.iter() {
                    if info.provenance.is_local() && filter(types, goal, &info.ty) {
                        actions.push(action(command, Some(info.name.clone()), location));
                    }
                }
            }
            TacticCommand::DestructLambdaCase | TacticCommand::HomomorphismLambdaCase => {
                if !config.has_extension(Extension::LambdaCase) {
                    continue;
                }
                let offered = match (command, lambda_caseable(types, goal)) {
                    (TacticCommand::DestructLambdaCase, Some(_)) => true,
                    (_, Some(homomorphic)) => homomorphic,
                    (_, None) => false,
                };
                if offered {
                    actions.push(action(command, None, location));
                }
            }
        }
    }
    log::debug!("{} actions offered for goal {goal}", actions.len());
    actions
}

/// The tactic a command runs. Commands that take a binding fail without one.
pub fn command_tactic(command: TacticCommand, binding: Option<&Name>) -> Result<Tactic, TacticError> {
    let required = || {
        binding.cloned().ok_or(TacticError::MissingBinding {
            command: command.tag(),
        })
    };
    Ok(match command {
        TacticCommand::Auto => tactics::auto(),
        TacticCommand::Intros => tactics::intros(),
        TacticCommand::Destruct => tactics::destruct(required()?),
        TacticCommand::Homomorphism => tactics::homomorphism(required()?),
        TacticCommand::DestructLambdaCase => tactics::destruct_lambda_case(),
        TacticCommand::HomomorphismLambdaCase => tactics::homomorphism_lambda_case(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::File;
    use crate::tt::{mk_type_arrow, mk_type_const, DataCon, DataDecl};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn ty(name: &str) -> Type {
        mk_type_const(Name::from_str(name))
    }

    fn list(t: Type) -> Type {
        ty("List").apply([t])
    }

    fn types() -> TypeEnv {
        let mut env = TypeEnv::default();
        env.add_opaque(Name::from_str("Int")).unwrap();
        env.add_opaque(Name::from_str("Bool")).unwrap();
        let a = Name::from_str("a");
        let var = crate::tt::mk_type_local(a.clone());
        env.add_data(DataDecl {
            name: Name::from_str("List"),
            params: vec![a],
            ctors: vec![
                DataCon {
                    name: Name::from_str("Nil"),
                    fields: vec![],
                },
                DataCon {
                    name: Name::from_str("Cons"),
                    fields: vec![var.clone(), list(var)],
                },
            ],
        })
        .unwrap();
        env.add_data(DataDecl {
            name: Name::from_str("Either"),
            params: vec![],
            ctors: vec![
                DataCon {
                    name: Name::from_str("L"),
                    fields: vec![ty("Int")],
                },
                DataCon {
                    name: Name::from_str("R"),
                    fields: vec![ty("Bool")],
                },
            ],
        })
        .unwrap();
        env
    }

    #[test]
    fn destruct_filter_ignores_the_goal() {
        let env = types();
        let fun = mk_type_arrow(ty("Int"), ty("Int"));
        for goal in [ty("Int"), fun.clone(), ty("Either")] {
            assert!(destruct_filter(&env, &goal, &ty("Either")));
            assert!(!destruct_filter(&env, &goal, &fun));
            assert!(!destruct_filter(&env, &goal, &ty("Int")));
        }
    }

    #[test]
    fn homo_filter_needs_the_same_algebraic_type() {
        let env = types();
        let fun = mk_type_arrow(ty("Int"), ty("Int"));
        assert!(homo_filter(&env, &list(ty("Int")), &list(ty("Int"))));
        assert!(!homo_filter(&env, &list(ty("Int")), &list(ty("Bool"))));
        assert!(!homo_filter(&env, &fun, &fun));
        assert!(!homo_filter(&env, &fun, &list(ty("Int"))));
        assert!(!homo_filter(&env, &ty("Int"), &ty("Int")));
    }

    #[test]
    fn lambda_caseable_classification() {
        let env = types();
        let endo = mk_type_arrow(list(ty("Int")), list(ty("Int")));
        let fold = mk_type_arrow(list(ty("Int")), ty("Int"));
        assert_eq!(lambda_caseable(&env, &endo), Some(true));
        assert_eq!(lambda_caseable(&env, &fold), Some(false));
        assert_eq!(lambda_caseable(&env, &mk_type_arrow(ty("Int"), ty("Int"))), None);
        assert_eq!(lambda_caseable(&env, &list(ty("Int"))), None);
    }

    #[test]
    fn command_ids_are_distinct_and_parse_back() {
        let ids: HashSet<String> = TacticCommand::ALL.iter().map(|c| c.command_id()).collect();
        assert_eq!(ids.len(), TacticCommand::ALL.len());
        assert_eq!(TacticCommand::Auto.command_id(), "tacticsAutoCommand");
        for command in TacticCommand::ALL {
            assert_eq!(command.command_id().parse::<TacticCommand>().unwrap(), command);
        }
        assert_eq!(
            "destruct-lambda-case".parse::<TacticCommand>().unwrap(),
            TacticCommand::DestructLambdaCase
        );
        assert!("refine".parse::<TacticCommand>().is_err());
    }

    #[test]
    fn missing_binding_is_reported() {
        let err = command_tactic(TacticCommand::Destruct, None).unwrap_err();
        assert_eq!(err, TacticError::MissingBinding { command: "Destruct" });
        assert!(command_tactic(TacticCommand::Auto, None).is_ok());
    }

    fn actions(source: &str, config: &Config) -> Vec<String> {
        let program = crate::load(Arc::new(File::new("<test>", source))).unwrap();
        let resolved = program.resolve(0).unwrap();
        let config = program.config(config);
        list_actions(&config, &resolved.context, &resolved.judgement, &resolved.span)
            .into_iter()
            .map(|a| a.title)
            .collect()
    }

    const SOURCE: &str = "\
type Int
data List a = Nil | Cons a (List a)
copy : List Int -> List Int
copy = _
";

    #[test]
    fn actions_follow_the_goal() {
        let titles = actions(SOURCE, &Config::default());
        assert_eq!(titles, vec!["Attempt to fill hole", "Introduce lambda"]);

        let titles = actions(&format!("extension LambdaCase\n{SOURCE}"), &Config::default());
        assert_eq!(
            titles,
            vec![
                "Attempt to fill hole",
                "Introduce lambda",
                "Lambda case split",
                "Homomorphic lambda case split"
            ]
        );
    }

    #[test]
    fn binding_actions_carry_their_binding() {
        let source = "\
type Int
data List a = Nil | Cons a (List a)
copy : List Int -> List Int
copy xs = _
";
        let program = crate::load(Arc::new(File::new("<test>", source))).unwrap();
        let resolved = program.resolve(0).unwrap();
        let actions = list_actions(
            &Config::default(),
            &resolved.context,
            &resolved.judgement,
            &resolved.span,
        );
        let titles: Vec<&str> = actions.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Attempt to fill hole",
                "Case split on xs",
                "Homomorphic case split on xs"
            ]
        );
        assert_eq!(actions[0].params.binding, "");
        assert_eq!(actions[1].params.binding, "xs");
        assert_eq!(actions[1].params.location, resolved.span);
    }

    #[test]
    fn the_definition_itself_is_never_split() {
        let source = "\
type Int
data List a = Nil | Cons a (List a)
xs0 : List Int
xs0 = _
";
        let titles = actions(source, &Config::default());
        assert_eq!(titles, vec!["Attempt to fill hole"]);
    }
}
