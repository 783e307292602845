use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;

/// Source language extensions that change which actions are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extension {
    LambdaCase,
}

impl FromStr for Extension {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LambdaCase" => Ok(Extension::LambdaCase),
            _ => bail!("unknown extension: {s}"),
        }
    }
}

impl Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extension::LambdaCase => write!(f, "LambdaCase"),
        }
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_SOLUTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub enabled_extensions: BTreeSet<Extension>,
    /// Wall-clock budget of one tactic run.
    pub timeout: Duration,
    /// Closed derivations collected before the search stops.
    pub max_solutions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled_extensions: BTreeSet::new(),
            timeout: DEFAULT_TIMEOUT,
            max_solutions: DEFAULT_MAX_SOLUTIONS,
        }
    }
}

impl Config {
    pub fn has_extension(&self, ext: Extension) -> bool {
        self.enabled_extensions.contains(&ext)
    }

    pub fn with_extension(mut self, ext: Extension) -> Self {
        self.enabled_extensions.insert(ext);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
