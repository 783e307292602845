use std::time::Instant;

use crate::config::Config;
use crate::judgement::{Context, Judgement};
use crate::provider::{command_tactic, TacticCommand};
use crate::tactic::{search, Derivation, Tactic, TacticError};
use crate::tt::{Name, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTacticResult {
    pub extract: Term,
    /// Complete alternatives found by the same search, best first.
    pub other_solutions: Vec<Term>,
}

/// Fewer open holes first, then smaller terms. The sort is stable, so ties
/// keep search order.
fn rank(derivations: &mut [Derivation]) {
    derivations.sort_by_key(|d| (d.open.len(), d.term.size()));
}

pub fn run_tactic(
    config: &Config,
    ctx: &Context,
    jdg: &Judgement,
    tactic: &Tactic,
) -> Result<RunTacticResult, TacticError> {
    let started = Instant::now();
    let mut derivations = search(config, ctx, jdg, tactic)?;
    rank(&mut derivations);
    let mut derivations = derivations.into_iter();
    let Some(best) = derivations.next() else {
        return Err(TacticError::NoApplicableRule {
            rule: "search",
            goal: jdg.goal.clone(),
        });
    };
    let other_solutions: Vec<Term> = derivations
        .filter(|d| d.open.is_empty())
        .map(|d| d.term)
        .collect();
    log::info!(
        "extract {} with {} alternatives in {}ms",
        best.term,
        other_solutions.len(),
        started.elapsed().as_millis()
    );
    Ok(RunTacticResult {
        extract: best.term,
        other_solutions,
    })
}

pub fn invoke(
    config: &Config,
    command: TacticCommand,
    binding: Option<&Name>,
    jdg: &Judgement,
    ctx: &Context,
) -> Result<RunTacticResult, TacticError> {
    log::debug!("invoking {command} on goal {}", jdg.goal);
    let tactic = command_tactic(command, binding)?;
    run_tactic(config, ctx, jdg, &tactic)
}
