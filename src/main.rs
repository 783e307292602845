use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};

use holefill::{invoke, list_actions, Config, Extension, File, TacticCommand};

const HELP: &str = "\
Usage: holefill [OPTIONS] FILE

Lists the tactic actions available at every hole of FILE, or runs one.

Options:
  -t, --tactic NAME      run NAME (e.g. auto, destruct, homomorphism-lambda-case)
  -b, --binding NAME     the binding a destruct or homomorphism works on
  -n, --hole N           the hole to work on, counted from 0 [default: 0]
      --timeout MS       search budget in milliseconds [default: 200]
  -x, --extension NAME   enable a language extension (e.g. LambdaCase)
  -h, --help             print this help
  -v, --version          print the version
";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }
    if args.contains(["-v", "--version"]) {
        println!("holefill {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::default();
    let command: Option<TacticCommand> = args.opt_value_from_str(["-t", "--tactic"])?;
    let binding: Option<String> = args.opt_value_from_str(["-b", "--binding"])?;
    let hole: usize = args.opt_value_from_str(["-n", "--hole"])?.unwrap_or(0);
    if let Some(ms) = args.opt_value_from_str::<_, u64>("--timeout")? {
        config.timeout = Duration::from_millis(ms);
    }
    let extensions: Vec<Extension> = args.values_from_str(["-x", "--extension"])?;
    config.enabled_extensions.extend(extensions);
    let path: String = args
        .free_from_str()
        .context("missing FILE argument, see --help")?;
    let rest = args.finish();
    if !rest.is_empty() {
        bail!("unexpected arguments: {rest:?}");
    }

    log::info!("loading {path}");
    let contents =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read `{path}`"))?;
    let program = holefill::load(Arc::new(File::new(path.clone(), contents)))?;
    let config = program.config(&config);

    let Some(command) = command else {
        for index in 0..program.holes().len() {
            let (span, _) = &program.holes()[index];
            let (line, column) = span.line_column();
            match program.resolve(index) {
                Ok(resolved) => {
                    println!("hole #{index} at {line}:{column}: {}", resolved.judgement.goal);
                    let actions = list_actions(
                        &config,
                        &resolved.context,
                        &resolved.judgement,
                        &resolved.span,
                    );
                    for action in actions {
                        println!("  {}: {}", action.command.command_id(), action.title);
                    }
                }
                Err(err) => println!("hole #{index} at {line}:{column}: {err}"),
            }
        }
        return Ok(());
    };

    if command.takes_binding() && binding.is_none() {
        bail!("{command} needs --binding NAME");
    }
    let binding = binding.map(|b| holefill::tt::Name::from_str(&b));
    let resolved = program.resolve(hole)?;
    let result = invoke(
        &config,
        command,
        binding.as_ref(),
        &resolved.judgement,
        &resolved.context,
    )
    .with_context(|| format!("{command} failed at hole #{hole}"))?;
    println!("{}", result.extract);
    println!("-- {} other solutions", result.other_solutions.len());
    for term in &result.other_solutions {
        println!("-- {term}");
    }
    Ok(())
}
