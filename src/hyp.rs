use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use crate::tt::{Name, Type};

/// Why a hypothesis entry is known. Only naming and ranking heuristics look
/// at it; it never decides whether a term is well typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// The `index`-th pattern argument of the top-level equation of `def`.
    TopLevelArg { def: Name, index: usize },
    /// A method of `class` available through an instance at `instance`.
    ClassMethod { class: Name, instance: Type },
    /// The definition whose right-hand side is being synthesized.
    Recursive,
    /// The `index`-th field of `ctor` bound by a case split on `scrutinee`.
    PatternMatch {
        scrutinee: Option<Name>,
        ctor: Name,
        index: usize,
    },
    /// Another top-level definition.
    Global,
    /// Introduced by a tactic step, or not traceable.
    User,
}

impl Provenance {
    /// Bound inside the definition being written, so a case split may
    /// target it.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Provenance::TopLevelArg { .. } | Provenance::PatternMatch { .. } | Provenance::User
        )
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::TopLevelArg { def, index } => write!(f, "argument {index} of {def}"),
            Provenance::ClassMethod { class, instance } => {
                write!(f, "method of {class} ({instance})")
            }
            Provenance::Recursive => write!(f, "recursive"),
            Provenance::PatternMatch {
                scrutinee: Some(scrutinee),
                ctor,
                index,
            } => write!(f, "field {index} of {ctor} in {scrutinee}"),
            Provenance::PatternMatch {
                scrutinee: None,
                ctor,
                index,
            } => write!(f, "field {index} of {ctor}"),
            Provenance::Global => write!(f, "global"),
            Provenance::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyInfo {
    pub name: Name,
    pub ty: Type,
    pub provenance: Provenance,
}

impl HyInfo {
    pub fn new(name: Name, ty: Type, provenance: Provenance) -> Self {
        HyInfo {
            name,
            ty,
            provenance,
        }
    }
}

impl Display for HyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} : {} [{}]", self.name, self.ty, self.provenance)
    }
}

/// What is known at a hole, keyed by name. Iteration is in name order so that
/// the search explores hypotheses deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hypothesis {
    entries: BTreeMap<Name, HyInfo>,
}

impl FromIterator<HyInfo> for Hypothesis {
    fn from_iter<I: IntoIterator<Item = HyInfo>>(iter: I) -> Self {
        let mut hy = Hypothesis::default();
        for info in iter {
            hy.insert(info);
        }
        hy
    }
}

impl Hypothesis {
    /// Later entries for the same name replace earlier ones.
    pub fn insert(&mut self, info: HyInfo) {
        self.entries.insert(info.name.clone(), info);
    }

    pub fn lookup(&self, name: &Name) -> Option<&HyInfo> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HyInfo> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    /// Entries of `other` override same-named entries of `self` entirely.
    pub fn union(&self, other: &Hypothesis) -> Hypothesis {
        let mut hy = self.clone();
        for info in other.iter() {
            hy.insert(info.clone());
        }
        hy
    }

    pub fn extend(&self, infos: impl IntoIterator<Item = HyInfo>) -> Hypothesis {
        let mut hy = self.clone();
        for info in infos {
            hy.insert(info);
        }
        hy
    }

    /// Overrides the provenance of every entry named in `provenances`. Types,
    /// other entries and the set of names are left as they are.
    pub fn splice_provenance(&self, provenances: &HashMap<Name, Provenance>) -> Hypothesis {
        let mut hy = self.clone();
        for (name, info) in hy.entries.iter_mut() {
            if let Some(provenance) = provenances.get(name) {
                info.provenance = provenance.clone();
            }
        }
        hy
    }

    pub fn find_provenance(&self, pred: impl Fn(&Provenance) -> bool) -> Option<&HyInfo> {
        self.iter().find(|info| pred(&info.provenance))
    }
}

impl Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, info) in self.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{info}")?;
        }
        Ok(())
    }
}
