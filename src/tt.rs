use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::iter::zip;
use std::sync::{Arc, Mutex, Weak};

use anyhow::{bail, ensure};
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Ord, PartialOrd, Default)]
pub struct Name(Arc<String>);

static NAME_TABLE: Lazy<Mutex<HashMap<String, Weak<String>>>> = Lazy::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Name {
    pub fn from_str(value: &str) -> Name {
        let mut table = NAME_TABLE.lock().unwrap();
        if let Some(existing) = table.get(value).and_then(|weak| weak.upgrade()) {
            return Name(existing);
        }

        let owned = Arc::new(value.to_owned());
        table.insert(value.to_owned(), Arc::downgrade(&owned));
        Name(owned)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Constructor and type constructor names start with an uppercase letter.
    pub fn is_capitalized(&self) -> bool {
        self.0.chars().next().is_some_and(char::is_uppercase)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

/// Identifies a metavariable (an unsolved position) of a synthesized term.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Id(usize);

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Id {
    pub fn new(index: usize) -> Id {
        Id(index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum Type {
    Const(Arc<TypeConst>),
    Arrow(Arc<TypeArrow>),
    App(Arc<TypeApp>),
    Local(Arc<TypeLocal>),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeConst {
    pub name: Name,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeArrow {
    pub dom: Type,
    pub cod: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeApp {
    pub fun: Type,
    pub arg: Type,
}

/// A rigid type variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeLocal {
    pub name: Name,
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TYPE_PREC_ARROW: u8 = 0;
        const TYPE_PREC_APP: u8 = 1;
        const TYPE_PREC_ATOM: u8 = 2;

        fn fmt_type(ty: &Type, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match ty {
                Type::Const(inner) => write!(f, "{}", inner.name),
                Type::Local(inner) => write!(f, "{}", inner.name),
                Type::Arrow(inner) => {
                    let needs_paren = prec > TYPE_PREC_ARROW;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_type(&inner.dom, f, TYPE_PREC_APP)?;
                    write!(f, " -> ")?;
                    fmt_type(&inner.cod, f, TYPE_PREC_ARROW)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Type::App(inner) => {
                    let needs_paren = prec > TYPE_PREC_APP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_type(&inner.fun, f, TYPE_PREC_APP)?;
                    write!(f, " ")?;
                    fmt_type(&inner.arg, f, TYPE_PREC_ATOM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        fmt_type(self, f, TYPE_PREC_ARROW)
    }
}

#[inline]
pub fn mk_type_arrow(dom: Type, cod: Type) -> Type {
    Type::Arrow(Arc::new(TypeArrow { dom, cod }))
}

#[inline]
pub fn mk_type_const(name: Name) -> Type {
    Type::Const(Arc::new(TypeConst { name }))
}

#[inline]
pub fn mk_type_app(fun: Type, arg: Type) -> Type {
    Type::App(Arc::new(TypeApp { fun, arg }))
}

#[inline]
pub fn mk_type_local(name: Name) -> Type {
    Type::Local(Arc::new(TypeLocal { name }))
}

impl Type {
    /// t.arrow([t1, t2]) // => t1 -> t2 -> t
    pub fn arrow(&self, cs: impl IntoIterator<Item = Type>) -> Type {
        let domains: Vec<Type> = cs.into_iter().collect();
        let mut cod = self.clone();
        for dom in domains.into_iter().rev() {
            cod = mk_type_arrow(dom, cod);
        }
        cod
    }

    /// Splits self into domains and the terminal codomain.
    pub fn unarrow(&self) -> (Vec<Type>, Type) {
        let mut doms = Vec::new();
        let mut current = self;
        while let Type::Arrow(inner) = current {
            doms.push(inner.dom.clone());
            current = &inner.cod;
        }
        (doms, current.clone())
    }

    pub fn is_arrow(&self) -> bool {
        matches!(self, Type::Arrow(_))
    }

    pub fn as_arrow(&self) -> Option<(&Type, &Type)> {
        match self {
            Type::Arrow(inner) => Some((&inner.dom, &inner.cod)),
            _ => None,
        }
    }

    pub fn apply(&self, args: impl IntoIterator<Item = Type>) -> Type {
        let mut fun = self.clone();
        for arg in args {
            fun = mk_type_app(fun, arg);
        }
        fun
    }

    /// `T a₁ ⋯ aₙ` is split into `(T, [a₁, ⋯, aₙ])` when the head is a constant.
    pub fn unapply(&self) -> Option<(&Name, Vec<&Type>)> {
        let mut args = vec![];
        let mut current = self;
        loop {
            match current {
                Type::App(inner) => {
                    args.push(&inner.arg);
                    current = &inner.fun;
                }
                Type::Const(inner) => {
                    args.reverse();
                    return Some((&inner.name, args));
                }
                Type::Arrow(_) | Type::Local(_) => return None,
            }
        }
    }

    /// Simultaneously substitute `t₁ ⋯ tₙ` for type variables `x₁ ⋯ xₙ`.
    pub fn subst(&self, subst: &[(Name, Type)]) -> Type {
        match self {
            Type::Const(_) => self.clone(),
            Type::Local(inner) => {
                for (x, t) in subst {
                    if *x == inner.name {
                        return t.clone();
                    }
                }
                self.clone()
            }
            Type::Arrow(inner) => mk_type_arrow(inner.dom.subst(subst), inner.cod.subst(subst)),
            Type::App(inner) => mk_type_app(inner.fun.subst(subst), inner.arg.subst(subst)),
        }
    }
}

/// A synthesized program term. Constructors are referred to by `Var`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Var(Arc<TermVar>),
    App(Arc<TermApp>),
    Abs(Arc<TermAbs>),
    Case(Arc<TermCase>),
    LamCase(Arc<TermLamCase>),
    Hole(Arc<TermHole>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermVar {
    pub name: Name,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermApp {
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermAbs {
    pub binders: Vec<Name>,
    pub body: Term,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermCase {
    pub scrutinee: Term,
    pub alts: Vec<Alt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermLamCase {
    pub alts: Vec<Alt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermHole {
    pub id: Id,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alt {
    pub ctor: Name,
    pub binders: Vec<Name>,
    pub body: Term,
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TERM_PREC_LAM: u8 = 0;
        const TERM_PREC_APP: u8 = 1;
        const TERM_PREC_ATOM: u8 = 2;

        fn fmt_alts(alts: &[Alt], f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{{")?;
            for (idx, alt) in alts.iter().enumerate() {
                if idx > 0 {
                    write!(f, ";")?;
                }
                write!(f, " {}", alt.ctor)?;
                for binder in &alt.binders {
                    write!(f, " {binder}")?;
                }
                write!(f, " -> ")?;
                fmt_term(&alt.body, f, TERM_PREC_LAM)?;
            }
            write!(f, " }}")
        }

        fn fmt_term(term: &Term, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match term {
                Term::Var(inner) => write!(f, "{}", inner.name),
                Term::Hole(_) => write!(f, "_"),
                Term::App(inner) => {
                    let needs_paren = prec > TERM_PREC_APP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_term(&inner.fun, f, TERM_PREC_APP)?;
                    write!(f, " ")?;
                    fmt_term(&inner.arg, f, TERM_PREC_ATOM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Abs(inner) => {
                    let needs_paren = prec > TERM_PREC_LAM;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "\\")?;
                    for (idx, binder) in inner.binders.iter().enumerate() {
                        if idx > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{binder}")?;
                    }
                    write!(f, " -> ")?;
                    fmt_term(&inner.body, f, TERM_PREC_LAM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Case(inner) => {
                    let needs_paren = prec > TERM_PREC_LAM;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "case ")?;
                    fmt_term(&inner.scrutinee, f, TERM_PREC_APP)?;
                    write!(f, " of ")?;
                    fmt_alts(&inner.alts, f)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::LamCase(inner) => {
                    let needs_paren = prec > TERM_PREC_LAM;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "\\case ")?;
                    fmt_alts(&inner.alts, f)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        fmt_term(self, f, TERM_PREC_LAM)
    }
}

pub fn mk_var(name: Name) -> Term {
    Term::Var(Arc::new(TermVar { name }))
}

pub fn mk_app(fun: Term, arg: Term) -> Term {
    Term::App(Arc::new(TermApp { fun, arg }))
}

pub fn mk_abs(binders: Vec<Name>, body: Term) -> Term {
    Term::Abs(Arc::new(TermAbs { binders, body }))
}

pub fn mk_case(scrutinee: Term, alts: Vec<Alt>) -> Term {
    Term::Case(Arc::new(TermCase { scrutinee, alts }))
}

pub fn mk_lam_case(alts: Vec<Alt>) -> Term {
    Term::LamCase(Arc::new(TermLamCase { alts }))
}

pub fn mk_hole(id: Id) -> Term {
    Term::Hole(Arc::new(TermHole { id }))
}

impl Term {
    pub fn apply(&self, args: impl IntoIterator<Item = Term>) -> Term {
        let mut fun = self.clone();
        for arg in args {
            fun = mk_app(fun, arg);
        }
        fun
    }

    /// The number of nodes, counting binders.
    pub fn size(&self) -> usize {
        fn alts_size(alts: &[Alt]) -> usize {
            alts.iter()
                .map(|alt| alt.binders.len() + alt.body.size())
                .sum()
        }
        match self {
            Term::Var(_) | Term::Hole(_) => 1,
            Term::App(inner) => 1 + inner.fun.size() + inner.arg.size(),
            Term::Abs(inner) => 1 + inner.binders.len() + inner.body.size(),
            Term::Case(inner) => 1 + inner.scrutinee.size() + alts_size(&inner.alts),
            Term::LamCase(inner) => 1 + alts_size(&inner.alts),
        }
    }

    pub fn holes(&self) -> Vec<Id> {
        let mut ids = vec![];
        self.collect_holes(&mut ids);
        ids
    }

    fn collect_holes(&self, ids: &mut Vec<Id>) {
        match self {
            Term::Var(_) => {}
            Term::Hole(inner) => ids.push(inner.id),
            Term::App(inner) => {
                inner.fun.collect_holes(ids);
                inner.arg.collect_holes(ids);
            }
            Term::Abs(inner) => inner.body.collect_holes(ids),
            Term::Case(inner) => {
                inner.scrutinee.collect_holes(ids);
                for alt in &inner.alts {
                    alt.body.collect_holes(ids);
                }
            }
            Term::LamCase(inner) => {
                for alt in &inner.alts {
                    alt.body.collect_holes(ids);
                }
            }
        }
    }

    /// Replaces every solved hole by its solution, repeatedly.
    pub fn instantiate(&self, solution: &HashMap<Id, Term>) -> Term {
        match self {
            Term::Var(_) => self.clone(),
            Term::Hole(inner) => match solution.get(&inner.id) {
                Some(m) => m.instantiate(solution),
                None => self.clone(),
            },
            Term::App(inner) => mk_app(
                inner.fun.instantiate(solution),
                inner.arg.instantiate(solution),
            ),
            Term::Abs(inner) => mk_abs(inner.binders.clone(), inner.body.instantiate(solution)),
            Term::Case(inner) => mk_case(
                inner.scrutinee.instantiate(solution),
                instantiate_alts(&inner.alts, solution),
            ),
            Term::LamCase(inner) => mk_lam_case(instantiate_alts(&inner.alts, solution)),
        }
    }
}

fn instantiate_alts(alts: &[Alt], solution: &HashMap<Id, Term>) -> Vec<Alt> {
    alts.iter()
        .map(|alt| Alt {
            ctor: alt.ctor.clone(),
            binders: alt.binders.clone(),
            body: alt.body.instantiate(solution),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCon {
    pub name: Name,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone)]
pub struct DataDecl {
    pub name: Name,
    pub params: Vec<Name>,
    pub ctors: Vec<DataCon>,
}

/// Algebraic data types visible to the search.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    data_table: HashMap<Name, Arc<DataDecl>>,
    // constructor name to its data type
    ctor_table: HashMap<Name, Name>,
    // types without constructors that are not algebraic, e.g. `Int`
    opaque_table: Vec<Name>,
}

impl TypeEnv {
    pub fn add_opaque(&mut self, name: Name) -> anyhow::Result<()> {
        if self.has_type(&name) {
            bail!("type already defined: {name}");
        }
        self.opaque_table.push(name);
        Ok(())
    }

    pub fn add_data(&mut self, decl: DataDecl) -> anyhow::Result<()> {
        if self.has_type(&decl.name) {
            bail!("type already defined: {}", decl.name);
        }
        for i in 0..decl.params.len() {
            for j in i + 1..decl.params.len() {
                ensure!(decl.params[i] != decl.params[j], "duplicate type variables");
            }
        }
        for ctor in &decl.ctors {
            if self.ctor_table.contains_key(&ctor.name)
                || decl.ctors.iter().filter(|c| c.name == ctor.name).count() > 1
            {
                bail!("duplicate constructor: {}", ctor.name);
            }
        }
        for ctor in &decl.ctors {
            self.ctor_table.insert(ctor.name.clone(), decl.name.clone());
        }
        self.data_table.insert(decl.name.clone(), Arc::new(decl));
        Ok(())
    }

    pub fn has_type(&self, name: &Name) -> bool {
        self.data_table.contains_key(name) || self.opaque_table.contains(name)
    }

    pub fn data(&self, name: &Name) -> Option<&DataDecl> {
        self.data_table.get(name).map(|decl| &**decl)
    }

    /// The constructors of an algebraic type, with their fields instantiated
    /// at the type's arguments.
    pub fn algebraic(&self, ty: &Type) -> Option<Vec<DataCon>> {
        let (head, args) = ty.unapply()?;
        let decl = self.data(head)?;
        if decl.params.len() != args.len() {
            return None;
        }
        let subst: Vec<(Name, Type)> = zip(decl.params.iter().cloned(), args.into_iter().cloned())
            .collect();
        Some(
            decl.ctors
                .iter()
                .map(|ctor| DataCon {
                    name: ctor.name.clone(),
                    fields: ctor.fields.iter().map(|t| t.subst(&subst)).collect(),
                })
                .collect(),
        )
    }

    pub fn is_algebraic(&self, ty: &Type) -> bool {
        self.algebraic(ty).is_some()
    }

    /// Checks that every constant in `ty` names a known type of the right arity.
    pub fn check_type(&self, ty: &Type) -> anyhow::Result<()> {
        match ty {
            Type::Local(_) => Ok(()),
            Type::Arrow(inner) => {
                self.check_type(&inner.dom)?;
                self.check_type(&inner.cod)
            }
            Type::Const(_) | Type::App(_) => {
                let Some((head, args)) = ty.unapply() else {
                    bail!("type variables cannot be applied: {ty}");
                };
                let arity = match self.data(head) {
                    Some(decl) => decl.params.len(),
                    None if self.opaque_table.contains(head) => 0,
                    None => bail!("unknown type: {head}"),
                };
                ensure!(
                    arity == args.len(),
                    "type {head} expects {arity} arguments, but got {}",
                    args.len()
                );
                for arg in args {
                    self.check_type(arg)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_env() -> TypeEnv {
        let a = Name::from_str("a");
        let list_a = mk_type_const(Name::from_str("List")).apply([mk_type_local(a.clone())]);
        let mut env = TypeEnv::default();
        env.add_opaque(Name::from_str("Int")).unwrap();
        env.add_data(DataDecl {
            name: Name::from_str("List"),
            params: vec![a.clone()],
            ctors: vec![
                DataCon {
                    name: Name::from_str("Nil"),
                    fields: vec![],
                },
                DataCon {
                    name: Name::from_str("Cons"),
                    fields: vec![mk_type_local(a), list_a],
                },
            ],
        })
        .unwrap();
        env
    }

    fn int() -> Type {
        mk_type_const(Name::from_str("Int"))
    }

    fn list(t: Type) -> Type {
        mk_type_const(Name::from_str("List")).apply([t])
    }

    #[test]
    fn names_are_interned() {
        let x = Name::from_str("x");
        let y = Name::from_str("x");
        assert_eq!(x, y);
        assert_ne!(x, Name::from_str("y"));
    }

    #[test]
    fn display_type_parenthesizes_arrows_and_applications() {
        let t = mk_type_arrow(mk_type_arrow(int(), int()), list(list(int())));
        assert_eq!(t.to_string(), "(Int -> Int) -> List (List Int)");
    }

    #[test]
    fn algebraic_instantiates_fields() {
        let env = list_env();
        let ctors = env.algebraic(&list(int())).expect("List Int is algebraic");
        assert_eq!(ctors.len(), 2);
        assert_eq!(ctors[1].fields, vec![int(), list(int())]);
        assert!(env.algebraic(&int()).is_none());
        assert!(env.algebraic(&mk_type_arrow(int(), int())).is_none());
    }

    #[test]
    fn check_type_rejects_unknown_and_bad_arity() {
        let env = list_env();
        assert!(env.check_type(&list(int())).is_ok());
        assert!(env.check_type(&mk_type_const(Name::from_str("List"))).is_err());
        assert!(env.check_type(&mk_type_const(Name::from_str("Nope"))).is_err());
    }

    #[test]
    fn duplicate_constructors_are_rejected() {
        let mut env = list_env();
        let result = env.add_data(DataDecl {
            name: Name::from_str("Other"),
            params: vec![],
            ctors: vec![DataCon {
                name: Name::from_str("Nil"),
                fields: vec![],
            }],
        });
        assert!(result.is_err());
    }

    #[test]
    fn display_term_uses_haskell_layout() {
        let x = Name::from_str("x");
        let body = mk_case(
            mk_var(x.clone()),
            vec![
                Alt {
                    ctor: Name::from_str("Nil"),
                    binders: vec![],
                    body: mk_var(Name::from_str("Nil")),
                },
                Alt {
                    ctor: Name::from_str("Cons"),
                    binders: vec![Name::from_str("a"), Name::from_str("l")],
                    body: mk_var(Name::from_str("Cons"))
                        .apply([mk_hole(Id::new(0)), mk_app(mk_var(Name::from_str("f")), mk_var(Name::from_str("l")))]),
                },
            ],
        );
        let term = mk_abs(vec![x], body);
        assert_eq!(
            term.to_string(),
            "\\x -> case x of { Nil -> Nil; Cons a l -> Cons _ (f l) }"
        );
    }

    #[test]
    fn instantiate_follows_chains() {
        let mut solution = HashMap::new();
        solution.insert(Id::new(0), mk_app(mk_var(Name::from_str("f")), mk_hole(Id::new(1))));
        solution.insert(Id::new(1), mk_var(Name::from_str("y")));
        let term = mk_hole(Id::new(0)).instantiate(&solution);
        assert_eq!(term.to_string(), "f y");
        assert!(term.holes().is_empty());
    }
}
