//! Elaboration of a parsed module and resolution of its holes.

use std::collections::{BTreeSet, HashMap};
use std::iter::zip;
use std::sync::Arc;

use anyhow::{bail, ensure, Context as _};

use crate::config::{Config, Extension};
use crate::hyp::{HyInfo, Hypothesis, Provenance};
use crate::judgement::{mk_judgement_and_context, Context, HoleFacts, Judgement};
use crate::lex::Span;
use crate::syntax::{Decl, DeclClass, DeclInstance, Equation, Expr, Module, Pat};
use crate::tactic::TacticError;
use crate::tt::{DataCon, DataDecl, Name, Type, TypeEnv};

#[derive(Debug)]
pub struct Program {
    module: Module,
    types: Arc<TypeEnv>,
    sigs: Vec<(Name, Type)>,
    classes: HashMap<Name, DeclClass>,
    instances: Vec<DeclInstance>,
    extensions: BTreeSet<Extension>,
    holes: Vec<(Span, Option<Type>)>,
}

/// A hole together with what the search needs to know about it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub span: Span,
    pub judgement: Judgement,
    pub context: Context,
}

fn check_type_vars(ty: &Type, params: &[Name]) -> anyhow::Result<()> {
    match ty {
        Type::Const(_) => Ok(()),
        Type::Local(inner) => {
            ensure!(
                params.contains(&inner.name),
                "unbound type variable: {}",
                inner.name
            );
            Ok(())
        }
        Type::Arrow(inner) => {
            check_type_vars(&inner.dom, params)?;
            check_type_vars(&inner.cod, params)
        }
        Type::App(inner) => {
            check_type_vars(&inner.fun, params)?;
            check_type_vars(&inner.arg, params)
        }
    }
}

/// Types the variables of `pat` matched against a value of type `ty`.
/// The binders of the lambdas heading the right-hand side of `eq` whose
/// bodies contain `span`, outermost first, and the innermost such body.
fn enclosing_lambdas<'a>(eq: &'a Equation, span: &Span) -> (Vec<&'a Name>, &'a Expr) {
    let mut binders = vec![];
    let mut expr = &eq.rhs;
    while let Expr::Lam(lam) = expr {
        if !lam.body.span().contains(span) {
            break;
        }
        binders.extend(&lam.binders);
        expr = &lam.body;
    }
    (binders, expr)
}

fn bind_pat(
    types: &TypeEnv,
    pat: &Pat,
    ty: &Type,
    provenance: Provenance,
    out: &mut Vec<HyInfo>,
) -> anyhow::Result<()> {
    match pat {
        Pat::Var(name, _) => out.push(HyInfo::new(name.clone(), ty.clone(), provenance)),
        Pat::Wildcard(_) => {}
        Pat::Ctor(inner) => {
            let Some(ctors) = types.algebraic(ty) else {
                bail!("constructor {} cannot match a value of type {ty}", inner.ctor);
            };
            let Some(ctor) = ctors.into_iter().find(|c| c.name == inner.ctor) else {
                bail!("constructor {} does not belong to type {ty}", inner.ctor);
            };
            ensure!(
                inner.args.len() == ctor.fields.len(),
                "constructor {} expects {} arguments, but got {}",
                ctor.name,
                ctor.fields.len(),
                inner.args.len()
            );
            for (index, (arg, field)) in zip(&inner.args, &ctor.fields).enumerate() {
                let provenance = Provenance::PatternMatch {
                    scrutinee: None,
                    ctor: ctor.name.clone(),
                    index,
                };
                bind_pat(types, arg, field, provenance, out)?;
            }
        }
    }
    Ok(())
}

impl Program {
    pub fn new(module: Module) -> anyhow::Result<Program> {
        let mut types = TypeEnv::default();
        // every type is declared before any is checked, so declaration order
        // does not matter
        for decl in &module.decls {
            match decl {
                Decl::Opaque(decl) => types.add_opaque(decl.name.clone())?,
                Decl::Data(decl) => types.add_data(DataDecl {
                    name: decl.name.clone(),
                    params: decl.params.clone(),
                    ctors: decl
                        .ctors
                        .iter()
                        .map(|(name, fields)| DataCon {
                            name: name.clone(),
                            fields: fields.clone(),
                        })
                        .collect(),
                })?,
                _ => {}
            }
        }

        let mut sigs: Vec<(Name, Type)> = vec![];
        let mut classes: HashMap<Name, DeclClass> = HashMap::new();
        let mut instances = vec![];
        let mut extensions = BTreeSet::new();
        for decl in &module.decls {
            match decl {
                Decl::Data(decl) => {
                    for (ctor, fields) in &decl.ctors {
                        for field in fields {
                            types
                                .check_type(field)
                                .and_then(|()| check_type_vars(field, &decl.params))
                                .with_context(|| format!("in constructor {ctor}"))?;
                        }
                    }
                }
                Decl::Opaque(_) => {}
                Decl::Class(decl) => {
                    if classes.contains_key(&decl.name) {
                        bail!("class already defined: {}", decl.name);
                    }
                    for (method, ty) in &decl.methods {
                        types
                            .check_type(ty)
                            .with_context(|| format!("in method {method}"))?;
                    }
                    classes.insert(decl.name.clone(), decl.clone());
                }
                Decl::Instance(decl) => {
                    ensure!(
                        classes.contains_key(&decl.class),
                        "unknown class: {}",
                        decl.class
                    );
                    types.check_type(&decl.ty)?;
                    instances.push(decl.clone());
                }
                Decl::Extension(decl) => {
                    let ext = decl
                        .name
                        .as_str()
                        .parse::<Extension>()
                        .with_context(|| format!("at {}", decl.span))?;
                    extensions.insert(ext);
                }
                Decl::Sig(decl) => {
                    if sigs.iter().any(|(name, _)| *name == decl.name) {
                        bail!("signature already given: {}", decl.name);
                    }
                    types
                        .check_type(&decl.ty)
                        .with_context(|| format!("in the signature of {}", decl.name))?;
                    sigs.push((decl.name.clone(), decl.ty.clone()));
                }
                Decl::Equation(eq) => {
                    let Some((_, ty)) = sigs.iter().find(|(name, _)| *name == eq.name) else {
                        continue;
                    };
                    let (doms, _) = ty.unarrow();
                    ensure!(
                        eq.pats.len() <= doms.len(),
                        "{} has {} arguments but its type has {}",
                        eq.name,
                        eq.pats.len(),
                        doms.len()
                    );
                    let mut out = vec![];
                    for (pat, dom) in zip(&eq.pats, &doms) {
                        bind_pat(&types, pat, dom, Provenance::User, &mut out)
                            .with_context(|| format!("at {}", pat.span()))?;
                    }
                }
            }
        }

        let holes = module.holes();
        for (span, ty) in &holes {
            if let Some(ty) = ty {
                types
                    .check_type(ty)
                    .with_context(|| format!("in the annotation at {span}"))?;
            }
        }
        log::debug!(
            "elaborated {} signatures, {} instances, {} holes",
            sigs.len(),
            instances.len(),
            holes.len()
        );

        Ok(Program {
            module,
            types: Arc::new(types),
            sigs,
            classes,
            instances,
            extensions,
            holes,
        })
    }

    pub fn holes(&self) -> &[(Span, Option<Type>)] {
        &self.holes
    }

    /// `base` with the extensions enabled by the source.
    pub fn config(&self, base: &Config) -> Config {
        let mut config = base.clone();
        config
            .enabled_extensions
            .extend(self.extensions.iter().copied());
        config
    }

    fn sig(&self, name: &Name) -> Option<&Type> {
        self.sigs
            .iter()
            .find(|(x, _)| x == name)
            .map(|(_, ty)| ty)
    }

    /// Methods of every instance, instantiated at the instance type. On a
    /// name clash the later instance wins.
    pub fn class_methods(&self) -> Hypothesis {
        let mut hy = Hypothesis::default();
        for instance in &self.instances {
            let Some(class) = self.classes.get(&instance.class) else {
                continue;
            };
            let subst = [(class.param.clone(), instance.ty.clone())];
            for (method, ty) in &class.methods {
                hy.insert(HyInfo::new(
                    method.clone(),
                    ty.subst(&subst),
                    Provenance::ClassMethod {
                        class: class.name.clone(),
                        instance: instance.ty.clone(),
                    },
                ));
            }
        }
        hy
    }

    fn bindings(&self, eq: &Equation, span: &Span) -> Option<Vec<HyInfo>> {
        let mut bindings: Vec<HyInfo> = self
            .sigs
            .iter()
            .filter(|(name, _)| *name != eq.name)
            .map(|(name, ty)| HyInfo::new(name.clone(), ty.clone(), Provenance::Global))
            .collect();
        if let Some(ty) = self.sig(&eq.name) {
            bindings.push(HyInfo::new(eq.name.clone(), ty.clone(), Provenance::Recursive));
            let (doms, _) = ty.unarrow();
            for (pat, dom) in zip(&eq.pats, &doms) {
                bind_pat(&self.types, pat, dom, Provenance::User, &mut bindings).ok()?;
            }
            let (binders, _) = enclosing_lambdas(eq, span);
            for (binder, dom) in zip(binders, doms.iter().skip(eq.pats.len())) {
                bindings.push(HyInfo::new(binder.clone(), dom.clone(), Provenance::User));
            }
        }
        Some(bindings)
    }

    /// The annotation of the hole, or else the result type of the equation
    /// when the hole is its whole right-hand side, possibly under lambdas.
    fn goal(&self, span: &Span, annotation: Option<&Type>) -> Option<Type> {
        if let Some(ty) = annotation {
            return Some(ty.clone());
        }
        if let Some(eq) = self.module.top_hole_equation(span) {
            let (doms, cod) = self.sig(&eq.name)?.unarrow();
            return Some(cod.arrow(doms.into_iter().skip(eq.pats.len())));
        }
        let eq = self.module.enclosing_equation(span)?;
        let (binders, body) = enclosing_lambdas(eq, span);
        match body {
            Expr::Hole(_, hole_span) if hole_span == span && !binders.is_empty() => {
                let (doms, cod) = self.sig(&eq.name)?.unarrow();
                let bound = eq.pats.len() + binders.len();
                (bound <= doms.len()).then(|| cod.arrow(doms.into_iter().skip(bound)))
            }
            _ => None,
        }
    }

    pub fn hole_facts(&self, index: usize) -> Option<HoleFacts<'_>> {
        let (span, annotation) = self.holes.get(index)?;
        let eq = self.module.enclosing_equation(span);
        Some(HoleFacts {
            span: span.clone(),
            goal: self.goal(span, annotation.as_ref()),
            bindings: eq.and_then(|eq| self.bindings(eq, span)),
            module: Some(&self.module),
            class_methods: Some(self.class_methods()),
            types: Some(Arc::clone(&self.types)),
        })
    }

    pub fn resolve(&self, index: usize) -> Result<Resolved, TacticError> {
        let facts = self.hole_facts(index).ok_or_else(|| {
            TacticError::ResolutionUnavailable(format!(
                "there is no hole #{index}, the file has {}",
                self.holes.len()
            ))
        })?;
        let span = facts.span.clone();
        let (line, column) = span.line_column();
        let (judgement, context) = mk_judgement_and_context(facts).ok_or_else(|| {
            TacticError::ResolutionUnavailable(format!(
                "the goal or the bindings of the hole at {line}:{column} are unknown"
            ))
        })?;
        Ok(Resolved {
            span,
            judgement,
            context,
        })
    }
}
