use thiserror::Error;

use crate::lex::{Lex, LexError, LexState, SourceInfo, Span, Token, TokenKind};
use crate::syntax::{
    is_hole_name, Decl, DeclClass, DeclData, DeclExtension, DeclInstance, DeclOpaque, DeclSig,
    Equation, Expr, ExprAnn, ExprApp, ExprBinOp, ExprLam, Module, Pat, PatCtor,
};
use crate::tt::{mk_type_app, mk_type_arrow, mk_type_const, mk_type_local, Name, Type};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tokenize error")]
    Lex {
        #[from]
        lex_error: LexError,
    },
    #[error("parse error: {message} at {source_info}")]
    Parse {
        message: String,
        source_info: String,
    },
    #[error("unexpected end of input at {source_info}")]
    Eof { source_info: String },
}

// symbols that never name an infix operator
const RESERVED_SYMBOLS: &[&str] = &[
    "=", "|", "->", "→", ":", ",", "(", ")", "{", "}", "\\", "λ",
];

pub struct Parser<'b> {
    lex: &'b mut Lex,
    // end of the last consumed token
    last_end: usize,
}

impl<'b> Parser<'b> {
    pub fn new(lex: &'b mut Lex) -> Self {
        Self { lex, last_end: 0 }
    }

    fn fail<R>(token: Token, message: impl Into<String>) -> Result<R, ParseError> {
        Err(ParseError::Parse {
            message: message.into(),
            source_info: token.source_info.to_string(),
        })
    }

    fn eof_error(&self) -> ParseError {
        ParseError::Eof {
            source_info: SourceInfo::eof(self.lex.input()).to_string(),
        }
    }

    fn optional<F, R>(&mut self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Self) -> Result<R, ParseError>,
    {
        let state = self.lex.save();
        let last_end = self.last_end;
        match f(self) {
            Ok(m) => Some(m),
            Err(_err) => {
                self.lex.restore(state);
                self.last_end = last_end;
                None
            }
        }
    }

    fn peek_opt(&mut self) -> Option<Token> {
        self.optional(|this| this.peek())
    }

    /// The next token, unless it starts a new declaration.
    fn peek_cont(&mut self) -> Option<Token> {
        self.peek_opt().filter(|token| !token.is_line_head())
    }

    fn peek(&mut self) -> Result<Token, ParseError> {
        self.lex
            .clone()
            .next()
            .transpose()?
            .ok_or_else(|| self.eof_error())
    }

    fn advance(&mut self) {
        let token = self
            .lex
            .next()
            .expect("unchecked advance")
            .expect("impossible lex error! probably due to unchecked advance");
        self.last_end = token.source_info.span().end;
    }

    pub fn eof(&mut self) -> Result<(), ParseError> {
        if let Some(token) = self.peek_opt() {
            Self::fail(token, "expected EOF but tokens remain")?;
        }
        Ok(())
    }

    fn any_token(&mut self) -> Result<Token, ParseError> {
        let token = self
            .lex
            .next()
            .transpose()?
            .ok_or_else(|| self.eof_error())?;
        self.last_end = token.source_info.span().end;
        Ok(token)
    }

    fn ident(&mut self) -> Result<Token, ParseError> {
        let token = self.any_token()?;
        if !token.is_ident() {
            return Self::fail(token, "expected identifier");
        }
        Ok(token)
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        let token = self.any_token()?;
        if token.kind == TokenKind::Symbol && token.as_str() == sym {
            return Ok(());
        }
        Self::fail(token, format!("expected symbol '{}'", sym))
    }

    fn expect_symbol_opt(&mut self, sym: &str) -> Option<Token> {
        if let Some(token) = self.peek_opt() {
            if token.kind == TokenKind::Symbol && token.as_str() == sym {
                self.advance();
                return Some(token);
            }
        }
        None
    }

    fn arrow_opt(&mut self) -> bool {
        match self.peek_cont() {
            Some(token) if token.is_symbol() && matches!(token.as_str(), "->" | "→") => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect_arrow(&mut self) -> Result<(), ParseError> {
        let token = self.any_token()?;
        if token.is_symbol() && matches!(token.as_str(), "->" | "→") {
            return Ok(());
        }
        Self::fail(token, "expected '->'")
    }

    fn name(&mut self) -> Result<Name, ParseError> {
        Ok(Name::from_str(self.ident()?.as_str()))
    }

    fn capitalized_name(&mut self) -> Result<Name, ParseError> {
        let token = self.ident()?;
        let name = Name::from_str(token.as_str());
        if !name.is_capitalized() {
            return Self::fail(token, "expected a capitalized name");
        }
        Ok(name)
    }

    fn span_since(&self, start: LexState) -> Span {
        self.lex.span_since(start, self.last_end)
    }

    fn starts_atom(token: &Token) -> bool {
        token.is_ident() || token.is_num_lit() || (token.is_symbol() && token.as_str() == "(")
    }

    fn type_atom(&mut self) -> Result<Type, ParseError> {
        let token = self.any_token()?;
        if token.is_ident() {
            let name = Name::from_str(token.as_str());
            if name.is_capitalized() {
                Ok(mk_type_const(name))
            } else {
                Ok(mk_type_local(name))
            }
        } else if token.is_symbol() && token.as_str() == "(" {
            let t = self.ty()?;
            self.expect_symbol(")")?;
            Ok(t)
        } else {
            Self::fail(token, "expected a primary type expression")
        }
    }

    fn type_app(&mut self) -> Result<Type, ParseError> {
        let mut t = self.type_atom()?;
        while let Some(token) = self.peek_cont() {
            if token.is_ident() || (token.is_symbol() && token.as_str() == "(") {
                t = mk_type_app(t, self.type_atom()?);
            } else {
                break;
            }
        }
        Ok(t)
    }

    /// Arrows associate to the right.
    pub fn ty(&mut self) -> Result<Type, ParseError> {
        let t = self.type_app()?;
        if self.arrow_opt() {
            return Ok(mk_type_arrow(t, self.ty()?));
        }
        Ok(t)
    }

    fn pat_atom(&mut self) -> Result<Pat, ParseError> {
        let start = self.lex.token_start();
        let token = self.any_token()?;
        if token.is_ident() {
            let name = Name::from_str(token.as_str());
            let span = self.span_since(start);
            if is_hole_name(name.as_str()) {
                Ok(Pat::Wildcard(span))
            } else if name.is_capitalized() {
                Ok(Pat::Ctor(PatCtor {
                    ctor: name,
                    args: vec![],
                    span,
                }))
            } else {
                Ok(Pat::Var(name, span))
            }
        } else if token.is_symbol() && token.as_str() == "(" {
            let head = self.peek()?;
            if head.is_ident() && Name::from_str(head.as_str()).is_capitalized() {
                let ctor = self.capitalized_name()?;
                let mut args = vec![];
                while self.expect_symbol_opt(")").is_none() {
                    args.push(self.pat_atom()?);
                }
                return Ok(Pat::Ctor(PatCtor {
                    ctor,
                    args,
                    span: self.span_since(start),
                }));
            }
            let pat = self.pat_atom()?;
            self.expect_symbol(")")?;
            Ok(pat)
        } else {
            Self::fail(token, "expected a pattern")
        }
    }

    fn expr_atom(&mut self) -> Result<Expr, ParseError> {
        let start = self.lex.token_start();
        let token = self.any_token()?;
        if token.is_ident() {
            let name = Name::from_str(token.as_str());
            let span = self.span_since(start);
            if is_hole_name(name.as_str()) {
                Ok(Expr::Hole(name, span))
            } else {
                Ok(Expr::Var(name, span))
            }
        } else if token.is_num_lit() {
            Ok(Expr::NumLit(token.as_str().to_owned(), self.span_since(start)))
        } else if token.is_symbol() && token.as_str() == "(" {
            let expr = self.expr()?;
            if self.expect_symbol_opt(":").is_some() {
                let ty = self.ty()?;
                self.expect_symbol(")")?;
                return Ok(Expr::Ann(Box::new(ExprAnn {
                    expr,
                    ty,
                    span: self.span_since(start),
                })));
            }
            self.expect_symbol(")")?;
            Ok(expr)
        } else {
            Self::fail(token, "expected an expression")
        }
    }

    fn expr_app(&mut self) -> Result<Expr, ParseError> {
        let start = self.lex.token_start();
        let mut fun = self.expr_atom()?;
        while let Some(token) = self.peek_cont() {
            if !Self::starts_atom(&token) {
                break;
            }
            let arg = self.expr_atom()?;
            fun = Expr::App(Box::new(ExprApp {
                fun,
                arg,
                span: self.span_since(start),
            }));
        }
        Ok(fun)
    }

    /// Infix operators share one precedence and associate to the left.
    pub fn expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.lex.token_start();
        if let Some(token) = self.peek_opt() {
            if token.is_symbol() && matches!(token.as_str(), "\\" | "λ") {
                self.advance();
                return self.expr_lam(start);
            }
        }
        let mut lhs = self.expr_app()?;
        while let Some(token) = self.peek_cont() {
            if !token.is_symbol() || RESERVED_SYMBOLS.contains(&token.as_str()) {
                break;
            }
            self.advance();
            let rhs = self.expr_app()?;
            lhs = Expr::BinOp(Box::new(ExprBinOp {
                op: Name::from_str(token.as_str()),
                lhs,
                rhs,
                span: self.span_since(start),
            }));
        }
        Ok(lhs)
    }

    fn expr_lam(&mut self, start: LexState) -> Result<Expr, ParseError> {
        let mut binders = vec![self.name()?];
        while let Some(token) = self.peek_cont() {
            if !token.is_ident() {
                break;
            }
            binders.push(self.name()?);
        }
        self.expect_arrow()?;
        let body = self.expr()?;
        Ok(Expr::Lam(Box::new(ExprLam {
            binders,
            body,
            span: self.span_since(start),
        })))
    }

    pub fn module(&mut self) -> Result<Module, ParseError> {
        let mut decls = vec![];
        while !self.lex.is_eof() {
            decls.push(self.decl()?);
        }
        Ok(Module { decls })
    }

    pub fn decl(&mut self) -> Result<Decl, ParseError> {
        let start = self.lex.token_start();
        let token = self.any_token()?;
        match token.kind {
            TokenKind::Keyword => match token.as_str() {
                "data" => Ok(Decl::Data(self.data_decl()?)),
                "type" => Ok(Decl::Opaque(DeclOpaque {
                    name: self.capitalized_name()?,
                })),
                "class" => Ok(Decl::Class(self.class_decl()?)),
                "instance" => {
                    let class = self.capitalized_name()?;
                    let ty = self.type_atom()?;
                    Ok(Decl::Instance(DeclInstance { class, ty }))
                }
                "extension" => {
                    let name = self.name()?;
                    Ok(Decl::Extension(DeclExtension {
                        name,
                        span: self.span_since(start),
                    }))
                }
                _ => Self::fail(token, "unknown declaration"),
            },
            TokenKind::Ident => {
                let name = Name::from_str(token.as_str());
                if self.expect_symbol_opt(":").is_some() {
                    let ty = self.ty()?;
                    return Ok(Decl::Sig(DeclSig { name, ty }));
                }
                let mut pats = vec![];
                while self.expect_symbol_opt("=").is_none() {
                    pats.push(self.pat_atom()?);
                }
                let rhs = self.expr()?;
                Ok(Decl::Equation(Equation {
                    name,
                    pats,
                    rhs,
                    span: self.span_since(start),
                }))
            }
            _ => Self::fail(token, "expected a declaration"),
        }
    }

    fn data_decl(&mut self) -> Result<DeclData, ParseError> {
        let name = self.capitalized_name()?;
        let mut params = vec![];
        while let Some(token) = self.peek_cont() {
            if !token.is_ident() {
                break;
            }
            params.push(self.name()?);
        }
        let mut ctors = vec![];
        if self.expect_symbol_opt("=").is_some() {
            loop {
                let ctor = self.capitalized_name()?;
                let mut fields = vec![];
                while let Some(token) = self.peek_cont() {
                    if !(token.is_ident() || (token.is_symbol() && token.as_str() == "(")) {
                        break;
                    }
                    fields.push(self.type_atom()?);
                }
                ctors.push((ctor, fields));
                if self.expect_symbol_opt("|").is_none() {
                    break;
                }
            }
        }
        Ok(DeclData {
            name,
            params,
            ctors,
        })
    }

    fn class_decl(&mut self) -> Result<DeclClass, ParseError> {
        let name = self.capitalized_name()?;
        let param = self.name()?;
        self.expect_symbol("{")?;
        let mut methods = vec![];
        if self.expect_symbol_opt("}").is_none() {
            loop {
                let method = self.name()?;
                self.expect_symbol(":")?;
                let ty = self.ty()?;
                methods.push((method, ty));
                if self.expect_symbol_opt(",").is_none() {
                    break;
                }
            }
            self.expect_symbol("}")?;
        }
        Ok(DeclClass {
            name,
            param,
            methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::File;
    use std::sync::Arc;

    fn parse(input: &str) -> Module {
        let file = Arc::new(File::new("<test>", input));
        let mut lex = Lex::new(file);
        let mut parser = Parser::new(&mut lex);
        let module = parser.module().expect("parse failed");
        parser.eof().expect("trailing tokens");
        module
    }

    #[test]
    fn parse_data_declaration() {
        let module = parse("data List a = Nil | Cons a (List a)\n");
        let Decl::Data(data) = &module.decls[0] else {
            panic!("expected data declaration");
        };
        assert_eq!(data.name.as_str(), "List");
        assert_eq!(data.params.len(), 1);
        assert_eq!(data.ctors.len(), 2);
        assert_eq!(data.ctors[1].1.len(), 2);
        assert_eq!(data.ctors[1].1[1].to_string(), "List a");
    }

    #[test]
    fn parse_signature_with_arrows() {
        let module = parse("map : (a -> b) -> List a -> List b\n");
        let Decl::Sig(sig) = &module.decls[0] else {
            panic!("expected signature");
        };
        insta::assert_snapshot!(sig.ty, @"(a -> b) -> List a -> List b");
    }

    #[test]
    fn declarations_end_at_column_one() {
        let module = parse("f x = g x\n  y\ng : Int\n");
        assert_eq!(module.decls.len(), 2);
        let Decl::Equation(eq) = &module.decls[0] else {
            panic!("expected equation");
        };
        // `y` is indented, so it continues the application
        assert!(matches!(&eq.rhs, Expr::App(app) if matches!(app.arg, Expr::Var(..))));
        assert!(matches!(&module.decls[1], Decl::Sig(_)));
    }

    #[test]
    fn parse_equation_with_hole_and_patterns() {
        let module = parse("f (Cons x xs) _ y = x + (_h : Int)\n");
        let Decl::Equation(eq) = &module.decls[0] else {
            panic!("expected equation");
        };
        assert_eq!(eq.pats.len(), 3);
        assert!(matches!(&eq.pats[0], Pat::Ctor(c) if c.args.len() == 2));
        assert!(matches!(&eq.pats[1], Pat::Wildcard(_)));
        let Expr::BinOp(op) = &eq.rhs else {
            panic!("expected an operator");
        };
        assert_eq!(op.op.as_str(), "+");
        assert!(matches!(&op.rhs, Expr::Ann(_)));
        assert_eq!(module.holes().len(), 1);
        assert!(module.holes()[0].1.is_some());
    }

    #[test]
    fn parse_class_and_instance() {
        let module = parse("class Monoid a { mempty : a, mappend : a -> a -> a }\ninstance Monoid (List b)\n");
        let Decl::Class(class) = &module.decls[0] else {
            panic!("expected class");
        };
        assert_eq!(class.methods.len(), 2);
        let Decl::Instance(instance) = &module.decls[1] else {
            panic!("expected instance");
        };
        assert_eq!(instance.ty.to_string(), "List b");
    }

    #[test]
    fn parse_lambda() {
        let module = parse("k = \\x y -> x\n");
        let Decl::Equation(eq) = &module.decls[0] else {
            panic!("expected equation");
        };
        assert!(matches!(&eq.rhs, Expr::Lam(lam) if lam.binders.len() == 2));
    }

    #[test]
    fn missing_equals_is_an_error() {
        let file = Arc::new(File::new("<test>", "f x"));
        let mut lex = Lex::new(file);
        let result = Parser::new(&mut lex).module();
        assert!(matches!(result, Err(ParseError::Eof { .. })));
    }
}
