use std::sync::Arc;

use anyhow::Context as _;

pub mod config;
pub mod elab;
pub mod hyp;
pub mod judgement;
pub mod lex;
pub mod parse;
pub mod provider;
pub mod runner;
pub mod syntax;
pub mod tactic;
pub mod tactics;
pub mod tt;

pub use config::{Config, Extension};
pub use elab::{Program, Resolved};
pub use lex::File;
pub use provider::{list_actions, Action, TacticCommand};
pub use runner::{invoke, run_tactic, RunTacticResult};
pub use tactic::TacticError;

pub fn load(file: Arc<File>) -> anyhow::Result<Program> {
    let mut lex = lex::Lex::new(file);
    let module = parse::Parser::new(&mut lex)
        .module()
        .context("parse error")?;
    Program::new(module).context("elaboration error")
}
