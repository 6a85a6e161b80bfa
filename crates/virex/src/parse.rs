//! Recursive-descent parser producing the [`crate::ast`] tree.
//!
//! Precedence climbs through assignment → `||` → `&&` → equality →
//! comparison → term → factor → unary → postfix → primary. Declarations
//! recover by synchronizing to the next declaration keyword so one syntax
//! error does not cascade through the whole file.

use crate::ast::{
    Decl, DeclKind, EnumDecl, Expr, ExprKind, Field, FunctionDecl, GlobalDecl, Import, Literal, Loc, MatchArm,
    Param, Program, Stmt, StmtKind, StructDecl, VarDecl,
};
use crate::errors::{Diagnostic, ErrorReporter, Level};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind, TokenValue};
use crate::types::{Prim, Type, TypeArgs};

pub struct Parser<'r> {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    had_error: bool,
    reporter: &'r mut ErrorReporter,
}

impl<'r> Parser<'r> {
    pub fn new(source: &str, filename: &str, reporter: &'r mut ErrorReporter) -> Self {
        let tokens = Lexer::new(source, filename).tokenize();
        Self {
            tokens,
            pos: 0,
            filename: filename.to_owned(),
            had_error: false,
            reporter,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    /// Kind of the token after the lookahead, for the generic-argument
    /// heuristic in postfix position.
    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Option<Token> {
        if self.check(kind) {
            let token = self.current().clone();
            self.advance();
            return Some(token);
        }
        self.error(message);
        None
    }

    fn loc(&self) -> Loc {
        Loc::new(self.current().line, self.current().column)
    }

    fn prev_loc(&self) -> Loc {
        Loc::new(self.previous().line, self.previous().column)
    }

    fn error(&mut self, message: &str) {
        self.had_error = true;
        let loc = self.loc();
        self.reporter.report(Diagnostic {
            level: Level::Error,
            code: None,
            file: self.filename.clone(),
            line: loc.line,
            column: loc.column,
            message: format!("syntax error: {message}"),
            suggestion: None,
            note: None,
        });
    }

    /// Skips forward to the next plausible declaration start.
    fn synchronize(&mut self) {
        while !self.check(TokenKind::Eof) {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.current().kind {
                TokenKind::Func
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::Extern
                | TokenKind::Import
                | TokenKind::Module
                | TokenKind::Public => return,
                _ => self.advance(),
            }
        }
    }

    // --- Types ---

    pub fn parse_type(&mut self) -> Option<Type> {
        // Prefix []T (slice) and [N]T (array)
        if self.check(TokenKind::LBracket) {
            self.advance();
            if self.matches(TokenKind::RBracket) {
                let elem = self.parse_type()?;
                return Some(self.parse_type_suffixes(Type::slice(elem)));
            }
            if !self.check(TokenKind::Integer) {
                self.error("expected array size or ']' for slice");
                return None;
            }
            let size = self.current().int_value().max(0) as usize;
            self.advance();
            self.expect(TokenKind::RBracket, "expected ']'")?;
            let elem = self.parse_type()?;
            return Some(self.parse_type_suffixes(Type::array(elem, size)));
        }

        let mut ty = if self.matches(TokenKind::Lt) {
            // Generic placeholder <T>: a bare named reference.
            let param = self.expect(TokenKind::Identifier, "expected type parameter name");
            self.expect(TokenKind::Gt, "expected '>' after type parameter");
            Type::named_struct(param.map_or_else(|| "T".to_owned(), |t| t.lexeme), TypeArgs::new())
        } else if self.matches(TokenKind::Func) {
            self.expect(TokenKind::LParen, "expected '(' for function type")?;
            let mut params = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    params.push(self.parse_type()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "expected ')' after function parameters")?;
            let ret = if self.matches(TokenKind::Arrow) {
                self.parse_type()?
            } else {
                Type::prim(Prim::Void)
            };
            Type::function(ret, params)
        } else if self.matches(TokenKind::Result) {
            self.expect(TokenKind::Lt, "expected '<' after result")?;
            let ok = self.parse_type()?;
            self.expect(TokenKind::Comma, "expected ',' between result types")?;
            let err = self.parse_type()?;
            self.expect(TokenKind::Gt, "expected '>' after result types")?;
            Type::result(ok, err)
        } else if self.current().kind.is_type_name() {
            let prim = Prim::from_token(self.current().kind).expect("type-name token maps to a primitive");
            self.advance();
            Type::prim(prim)
        } else if self.check(TokenKind::Identifier) {
            let mut name = self.current().lexeme.clone();
            self.advance();
            while self.matches(TokenKind::Dot) {
                name.push('.');
                if let Some(member) = self.expect(TokenKind::Identifier, "expected member name after '.'") {
                    name.push_str(&member.lexeme);
                }
            }
            let mut args = TypeArgs::new();
            if self.matches(TokenKind::Lt) {
                loop {
                    args.push(self.parse_type()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::Gt, "expected '>' after generic arguments")?;
            }
            // Enum references parse as struct types; the analyzer flips the
            // kind once the symbol is known.
            Type::named_struct(name, args)
        } else {
            self.error("expected type");
            return None;
        };

        ty = self.parse_type_suffixes(ty);
        Some(ty)
    }

    /// Postfix `[N]` (array) and `*` / `*!` (pointer / non-null pointer).
    fn parse_type_suffixes(&mut self, mut ty: Type) -> Type {
        loop {
            if self.check(TokenKind::LBracket) && self.peek_next_kind() == TokenKind::Integer {
                self.advance();
                let size = self.current().int_value().max(0) as usize;
                self.advance();
                self.expect(TokenKind::RBracket, "expected ']'");
                ty = Type::array(ty, size);
            } else if self.matches(TokenKind::Star) {
                let non_null = self.matches(TokenKind::Bang);
                ty = Type::pointer(ty, non_null);
            } else {
                return ty;
            }
        }
    }

    // --- Expressions ---

    pub fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        let expr = self.parse_logical_or()?;
        if self.matches(TokenKind::Eq) {
            let loc = self.prev_loc();
            let value = self.parse_assignment()?;
            return Some(Expr::new(
                ExprKind::Binary {
                    op: TokenKind::Eq,
                    left: Box::new(expr),
                    right: Box::new(value),
                },
                loc,
            ));
        }
        Some(expr)
    }

    fn binary_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Self) -> Option<Expr>,
    ) -> Option<Expr> {
        let mut expr = next(self)?;
        while ops.iter().any(|&op| self.matches(op)) {
            let op = self.previous().kind;
            let loc = self.prev_loc();
            let right = next(self)?;
            expr = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Some(expr)
    }

    fn parse_logical_or(&mut self) -> Option<Expr> {
        self.binary_level(&[TokenKind::PipePipe], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Option<Expr> {
        self.binary_level(&[TokenKind::AmpAmp], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        self.binary_level(&[TokenKind::EqEq, TokenKind::BangEq], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        self.binary_level(
            &[TokenKind::Lt, TokenKind::LtEq, TokenKind::Gt, TokenKind::GtEq],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Option<Expr> {
        self.binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Option<Expr> {
        self.binary_level(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        for op in [TokenKind::Minus, TokenKind::Bang, TokenKind::Amp, TokenKind::Star] {
            if self.matches(op) {
                let loc = self.prev_loc();
                let operand = self.parse_unary()?;
                return Some(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    loc,
                ));
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        let mut generic_args: Vec<Type> = Vec::new();

        loop {
            if self.matches(TokenKind::LParen) {
                let loc = self.prev_loc();
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "expected ')' after arguments")?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                        generic_args: std::mem::take(&mut generic_args),
                    },
                    loc,
                );
            } else if self.check(TokenKind::Lt) {
                // `f<i32>(x)` vs `a < b`: only a primitive type name after
                // `<` is treated as an explicit generic argument list.
                if !self.peek_next_kind().is_type_name() {
                    break;
                }
                self.advance(); // consume '<'
                if !self.check(TokenKind::Gt) {
                    loop {
                        generic_args.push(self.parse_type()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::Gt, "expected '>' after generic arguments")?;
            } else if self.matches(TokenKind::LBracket) {
                let loc = self.prev_loc();
                if self.matches(TokenKind::DotDot) {
                    // [..end] or [..]
                    let end = if self.check(TokenKind::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    self.expect(TokenKind::RBracket, "expected ']'")?;
                    expr = Expr::new(
                        ExprKind::SliceOf {
                            base: Box::new(expr),
                            start: None,
                            end,
                        },
                        loc,
                    );
                } else {
                    let start = self.parse_expression()?;
                    if self.matches(TokenKind::DotDot) {
                        let end = if self.check(TokenKind::RBracket) {
                            None
                        } else {
                            Some(Box::new(self.parse_expression()?))
                        };
                        self.expect(TokenKind::RBracket, "expected ']'")?;
                        expr = Expr::new(
                            ExprKind::SliceOf {
                                base: Box::new(expr),
                                start: Some(Box::new(start)),
                                end,
                            },
                            loc,
                        );
                    } else {
                        self.expect(TokenKind::RBracket, "expected ']'")?;
                        expr = Expr::new(
                            ExprKind::Index {
                                base: Box::new(expr),
                                index: Box::new(start),
                            },
                            loc,
                        );
                    }
                }
            } else if self.matches(TokenKind::Dot) {
                let loc = self.prev_loc();
                if let Some(member) = self.expect(TokenKind::Identifier, "expected member name") {
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member: member.lexeme,
                            arrow: false,
                        },
                        loc,
                    );
                }
            } else if self.matches(TokenKind::Arrow) {
                let loc = self.prev_loc();
                if let Some(member) = self.expect(TokenKind::Identifier, "expected member name") {
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member: member.lexeme,
                            arrow: true,
                        },
                        loc,
                    );
                }
            } else {
                break;
            }
        }

        // Generic arguments without a following call are silently dropped,
        // matching `max<i32>;` being syntactically inert.
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        // cast<Type>(expr)
        if self.matches(TokenKind::Cast) {
            let loc = self.prev_loc();
            self.expect(TokenKind::Lt, "expected '<' after cast")?;
            let target = self.parse_type()?;
            self.expect(TokenKind::Gt, "expected '>' after target type")?;
            self.expect(TokenKind::LParen, "expected '(' after cast type")?;
            let inner = self.parse_expression()?;
            self.expect(TokenKind::RParen, "expected ')' after cast expression")?;
            return Some(Expr::new(
                ExprKind::Cast {
                    target,
                    expr: Box::new(inner),
                },
                loc,
            ));
        }

        let token = self.current().clone();
        let loc = Loc::new(token.line, token.column);

        let literal = match token.kind {
            TokenKind::Integer => Some(Literal::Int(token.int_value())),
            TokenKind::Float => Some(Literal::Float(match token.value {
                TokenValue::Float(v) => v,
                _ => 0.0,
            })),
            TokenKind::Str => Some(Literal::Str(match token.value {
                TokenValue::Str(s) => s,
                _ => String::new(),
            })),
            TokenKind::True => Some(Literal::Bool(true)),
            TokenKind::False => Some(Literal::Bool(false)),
            TokenKind::Null => Some(Literal::Null),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Some(Expr::new(ExprKind::Literal(literal), loc));
        }

        if self.check(TokenKind::Identifier) {
            let name = self.current().lexeme.clone();
            self.advance();
            return Some(Expr::new(ExprKind::Variable { name }, loc));
        }

        if self.matches(TokenKind::LParen) {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::RParen, "expected ')' after expression")?;
            return Some(expr);
        }

        // result::ok(v) / result::err(v), recognized regardless of imports.
        if self.matches(TokenKind::Result) {
            self.expect(TokenKind::ColonColon, "expected '::' after result")?;
            let ctor = self.expect(TokenKind::Identifier, "expected 'ok' or 'err'")?;
            let callee_name = format!("result::{}", ctor.lexeme);
            self.expect(TokenKind::LParen, "expected '('")?;
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "expected ')'")?;
            let callee = Expr::new(ExprKind::Variable { name: callee_name }, loc);
            return Some(Expr::new(
                ExprKind::Call {
                    callee: Box::new(callee),
                    args,
                    generic_args: Vec::new(),
                },
                loc,
            ));
        }

        self.error("expected expression");
        None
    }

    // --- Statements ---

    pub fn parse_statement(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::Var) || self.matches(TokenKind::Const) {
            return self.parse_var_decl_stmt();
        }
        if self.matches(TokenKind::If) {
            return self.parse_if();
        }
        if self.matches(TokenKind::While) {
            return self.parse_while();
        }
        if self.matches(TokenKind::For) {
            return self.parse_for();
        }
        if self.matches(TokenKind::Match) {
            return self.parse_match();
        }
        if self.matches(TokenKind::Fail) {
            let loc = self.prev_loc();
            let message = if self.check(TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::Semicolon, "expected ';' after fail")?;
            return Some(Stmt::new(StmtKind::Fail(message), loc));
        }
        if self.matches(TokenKind::Unsafe) {
            let loc = self.prev_loc();
            let body = self.parse_statement()?;
            return Some(Stmt::new(StmtKind::Unsafe(Box::new(body)), loc));
        }
        if self.matches(TokenKind::Return) {
            let loc = self.prev_loc();
            let value = if self.check(TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::Semicolon, "expected ';' after return")?;
            return Some(Stmt::new(StmtKind::Return(value), loc));
        }
        if self.matches(TokenKind::Break) {
            let loc = self.prev_loc();
            self.expect(TokenKind::Semicolon, "expected ';' after break")?;
            return Some(Stmt::new(StmtKind::Break, loc));
        }
        if self.matches(TokenKind::Continue) {
            let loc = self.prev_loc();
            self.expect(TokenKind::Semicolon, "expected ';' after continue")?;
            return Some(Stmt::new(StmtKind::Continue, loc));
        }
        if self.matches(TokenKind::LBrace) {
            return self.parse_block();
        }

        let loc = self.loc();
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "expected ';' after expression")?;
        Some(Stmt::new(StmtKind::Expr(expr), loc))
    }

    fn parse_var_decl_stmt(&mut self) -> Option<Stmt> {
        let is_const = self.previous().kind == TokenKind::Const;
        let loc = self.prev_loc();

        let ty = self.parse_type()?;
        let name = self
            .expect(TokenKind::Identifier, "expected variable name")
            .map(|t| t.lexeme)
            .unwrap_or_default();

        let init = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after variable declaration")?;

        Some(Stmt::new(
            StmtKind::VarDecl(VarDecl {
                is_const,
                ty,
                name,
                init,
            }),
            loc,
        ))
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let loc = self.prev_loc();
        self.expect(TokenKind::LParen, "expected '(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "expected ')' after condition")?;

        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Some(Stmt::new(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            loc,
        ))
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let loc = self.prev_loc();
        self.expect(TokenKind::LParen, "expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "expected ')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::new(StmtKind::While { cond, body }, loc))
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let loc = self.prev_loc();
        self.expect(TokenKind::LParen, "expected '(' after 'for'")?;

        let mut init: Option<Box<Stmt>> = None;
        if self.matches(TokenKind::Var) || self.matches(TokenKind::Const) {
            let is_const = self.previous().kind == TokenKind::Const;
            let ty = self.parse_type()?;
            let name = self
                .expect(TokenKind::Identifier, "expected variable name")
                .map(|t| t.lexeme)
                .unwrap_or_default();

            // `for (var T x in expr)` desugars to an index loop over a
            // slice of the collection.
            if self.matches(TokenKind::In) {
                let collection = self.parse_expression()?;
                self.expect(TokenKind::RParen, "expected ')' after for-in")?;
                let body = self.parse_statement()?;
                return Some(desugar_for_in(ty, &name, collection, body, loc));
            }

            let init_expr = if self.matches(TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(TokenKind::Semicolon, "expected ';'")?;
            init = Some(Box::new(Stmt::new(
                StmtKind::VarDecl(VarDecl {
                    is_const,
                    ty,
                    name,
                    init: init_expr,
                }),
                loc,
            )));
        } else if !self.matches(TokenKind::Semicolon) {
            let expr_loc = self.loc();
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "expected ';'")?;
            init = Some(Box::new(Stmt::new(StmtKind::Expr(expr), expr_loc)));
        }

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "expected ';'")?;

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen, "expected ')'")?;

        let body = Box::new(self.parse_statement()?);
        Some(Stmt::new(StmtKind::For { init, cond, step, body }, loc))
    }

    fn parse_match(&mut self) -> Option<Stmt> {
        let loc = self.prev_loc();
        let scrutinee = self.parse_expression()?;
        self.expect(TokenKind::LBrace, "expected '{' after match expression")?;

        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            // `_` lexes as an identifier, so one expect covers wildcards too.
            let tag = self
                .expect(TokenKind::Identifier, "expected pattern tag")
                .map(|t| t.lexeme)
                .unwrap_or_default();

            let capture = if self.matches(TokenKind::LParen) {
                let name = self
                    .expect(TokenKind::Identifier, "expected capture variable name")
                    .map(|t| t.lexeme);
                self.expect(TokenKind::RParen, "expected ')'")?;
                name
            } else {
                None
            };

            self.expect(TokenKind::FatArrow, "expected '=>'")?;
            let body = self.parse_statement()?;
            arms.push(MatchArm { tag, capture, body });
            self.matches(TokenKind::Comma);
        }

        self.expect(TokenKind::RBrace, "expected '}' after match cases")?;
        Some(Stmt::new(StmtKind::Match { scrutinee, arms }, loc))
    }

    fn parse_block(&mut self) -> Option<Stmt> {
        let loc = self.prev_loc();
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => break,
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after block")?;
        Some(Stmt::new(StmtKind::Block(statements), loc))
    }

    // --- Declarations ---

    fn parse_declaration(&mut self) -> Option<ParsedItem> {
        if self.matches(TokenKind::Extern) {
            // Bare `extern func` declarations default to public.
            return self.parse_extern(true).map(ParsedItem::Decl);
        }
        if self.matches(TokenKind::Module) {
            return self.parse_module_decl();
        }
        if self.matches(TokenKind::Import) {
            return self.parse_import_decl();
        }

        let is_public = self.matches(TokenKind::Public);

        if self.matches(TokenKind::Var) || self.matches(TokenKind::Const) {
            return self.parse_global_var(is_public).map(ParsedItem::Decl);
        }
        if self.matches(TokenKind::Extern) {
            return self.parse_extern(is_public).map(ParsedItem::Decl);
        }
        if self.matches(TokenKind::Func) {
            return self.parse_function(is_public).map(ParsedItem::Decl);
        }

        let is_packed = self.matches(TokenKind::Packed);
        if self.matches(TokenKind::Struct) {
            return self.parse_struct(is_public, is_packed).map(ParsedItem::Decl);
        }
        if is_packed {
            self.error("'packed' modifier can only be used with structs");
            return None;
        }
        if self.matches(TokenKind::Enum) {
            return self.parse_enum(is_public).map(ParsedItem::Decl);
        }

        self.error("expected declaration");
        self.synchronize();
        None
    }

    fn parse_module_decl(&mut self) -> Option<ParsedItem> {
        let name = self.expect(TokenKind::Str, "expected module path string")?;
        self.expect(TokenKind::Semicolon, "expected ';' after module declaration")?;
        Some(ParsedItem::Module(name.lexeme))
    }

    fn parse_import_decl(&mut self) -> Option<ParsedItem> {
        let path = self.expect(TokenKind::Str, "expected import path string")?;
        let alias = if self.matches(TokenKind::As) {
            self.expect(TokenKind::Identifier, "expected alias name after 'as'")
                .map(|t| t.lexeme)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after import statement")?;
        Some(ParsedItem::Import(Import {
            path: path.lexeme,
            alias,
        }))
    }

    fn parse_type_params(&mut self) -> Vec<String> {
        let mut type_params = Vec::new();
        if self.matches(TokenKind::Lt) {
            loop {
                if let Some(param) = self.expect(TokenKind::Identifier, "expected type parameter name") {
                    type_params.push(param.lexeme);
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "expected '>' after type parameters");
        }
        type_params
    }

    fn parse_function(&mut self, is_public: bool) -> Option<Decl> {
        let loc = self.prev_loc();
        let name = self
            .expect(TokenKind::Identifier, "expected function name")
            .map(|t| t.lexeme)
            .unwrap_or_default();
        let type_params = self.parse_type_params();

        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_loc = self.loc();
                let ty = self.parse_type()?;
                let pname = self
                    .expect(TokenKind::Identifier, "expected parameter name")
                    .map(|t| t.lexeme)
                    .unwrap_or_default();
                params.push(Param {
                    ty,
                    name: pname,
                    loc: param_loc,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameters")?;

        let ret = if self.matches(TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::prim(Prim::Void)
        };

        self.expect(TokenKind::LBrace, "expected '{' before function body")?;
        let body = self.parse_block()?;

        Some(Decl::new(
            DeclKind::Function(FunctionDecl {
                name,
                type_params,
                params,
                ret,
                body: Some(body),
                is_public,
                is_extern: false,
                is_variadic: false,
            }),
            loc,
        ))
    }

    fn parse_extern(&mut self, is_public: bool) -> Option<Decl> {
        let loc = self.prev_loc();
        self.expect(TokenKind::Func, "expected 'func' after 'extern'")?;
        let name = self
            .expect(TokenKind::Identifier, "expected function name")
            .map(|t| t.lexeme)
            .unwrap_or_default();
        let type_params = self.parse_type_params();

        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        let mut is_variadic = false;
        if !self.check(TokenKind::RParen) {
            loop {
                if self.matches(TokenKind::Ellipsis) {
                    is_variadic = true;
                    break;
                }
                let param_loc = self.loc();
                let ty = self.parse_type()?;
                let pname = self
                    .expect(TokenKind::Identifier, "expected parameter name")
                    .map(|t| t.lexeme)
                    .unwrap_or_default();
                params.push(Param {
                    ty,
                    name: pname,
                    loc: param_loc,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameters")?;

        let ret = if self.matches(TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::prim(Prim::Void)
        };
        self.expect(TokenKind::Semicolon, "expected ';' after extern declaration")?;

        Some(Decl::new(
            DeclKind::Function(FunctionDecl {
                name,
                type_params,
                params,
                ret,
                body: None,
                is_public,
                is_extern: true,
                is_variadic,
            }),
            loc,
        ))
    }

    fn parse_global_var(&mut self, is_public: bool) -> Option<Decl> {
        let is_const = self.previous().kind == TokenKind::Const;
        let loc = self.prev_loc();

        let ty = self.parse_type()?;
        let name = self
            .expect(TokenKind::Identifier, "expected variable name")
            .map(|t| t.lexeme)
            .unwrap_or_default();
        let init = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after variable declaration")?;

        Some(Decl::new(
            DeclKind::Global(GlobalDecl {
                var: VarDecl {
                    is_const,
                    ty,
                    name,
                    init,
                },
                is_public,
            }),
            loc,
        ))
    }

    fn parse_struct(&mut self, is_public: bool, is_packed: bool) -> Option<Decl> {
        let loc = self.prev_loc();
        let name = self
            .expect(TokenKind::Identifier, "expected struct name")
            .map(|t| t.lexeme)
            .unwrap_or_default();
        let type_params = self.parse_type_params();

        self.expect(TokenKind::LBrace, "expected '{' after struct name")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let ty = self.parse_type()?;
            let fname = self
                .expect(TokenKind::Identifier, "expected field name")
                .map(|t| t.lexeme)
                .unwrap_or_default();
            self.expect(TokenKind::Semicolon, "expected ';' after field")?;
            fields.push(Field { ty, name: fname });
        }
        self.expect(TokenKind::RBrace, "expected '}' after struct fields")?;
        self.expect(TokenKind::Semicolon, "expected ';' after struct declaration")?;

        Some(Decl::new(
            DeclKind::Struct(StructDecl {
                name,
                type_params,
                fields,
                is_public,
                is_packed,
            }),
            loc,
        ))
    }

    fn parse_enum(&mut self, is_public: bool) -> Option<Decl> {
        let loc = self.prev_loc();
        let name = self
            .expect(TokenKind::Identifier, "expected enum name")
            .map(|t| t.lexeme)
            .unwrap_or_default();
        let type_params = self.parse_type_params();

        self.expect(TokenKind::LBrace, "expected '{' after enum name")?;
        let mut variants = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                if let Some(variant) = self.expect(TokenKind::Identifier, "expected variant name") {
                    variants.push(variant.lexeme);
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after enum variants")?;
        self.expect(TokenKind::Semicolon, "expected ';' after enum declaration")?;

        Some(Decl::new(
            DeclKind::Enum(EnumDecl {
                name,
                type_params,
                variants,
                is_public,
            }),
            loc,
        ))
    }

    /// Parses a whole module. Returns `None` if any syntax error occurred.
    pub fn parse_program(mut self) -> Option<Program> {
        let mut module_name: Option<String> = None;
        let mut imports = Vec::new();
        let mut decls = Vec::new();
        let mut metadata_phase = true;

        while !self.check(TokenKind::Eof) {
            let before = self.pos;
            let Some(item) = self.parse_declaration() else {
                // Recovery must always make progress.
                if self.pos == before {
                    self.advance();
                }
                continue;
            };
            match item {
                ParsedItem::Module(name) => {
                    if !metadata_phase || module_name.is_some() || !imports.is_empty() || !decls.is_empty() {
                        self.error("module declaration must be the first statement in the file");
                    } else {
                        module_name = Some(name);
                    }
                }
                ParsedItem::Import(import) => {
                    if !metadata_phase || !decls.is_empty() {
                        self.error("import statements must precede other declarations");
                    }
                    imports.push(import);
                }
                ParsedItem::Decl(decl) => {
                    metadata_phase = false;
                    decls.push(decl);
                }
            }
        }

        if self.had_error {
            return None;
        }
        Some(Program {
            module_name,
            imports,
            decls,
        })
    }
}

enum ParsedItem {
    Module(String),
    Import(Import),
    Decl(Decl),
}

/// Rewrites `for (var T elem in expr) body` into
/// `{ var []T __slice = expr[..]; for (var i64 __i = 0; __i < __slice.len;
/// __i = __i + 1) { var T elem = __slice[__i]; body } }`.
fn desugar_for_in(elem_ty: Type, elem_name: &str, collection: Expr, body: Stmt, loc: Loc) -> Stmt {
    let var = |name: &str| Expr::new(ExprKind::Variable { name: name.to_owned() }, loc);
    let int = |value: i64| Expr::new(ExprKind::Literal(Literal::Int(value)), loc);

    let full_slice = Expr::new(
        ExprKind::SliceOf {
            base: Box::new(collection),
            start: None,
            end: None,
        },
        loc,
    );
    let slice_decl = Stmt::new(
        StmtKind::VarDecl(VarDecl {
            is_const: false,
            ty: Type::slice(elem_ty.clone()),
            name: "__slice".to_owned(),
            init: Some(full_slice),
        }),
        loc,
    );

    let init = Stmt::new(
        StmtKind::VarDecl(VarDecl {
            is_const: false,
            ty: Type::prim(Prim::I64),
            name: "__i".to_owned(),
            init: Some(int(0)),
        }),
        loc,
    );
    let cond = Expr::new(
        ExprKind::Binary {
            op: TokenKind::Lt,
            left: Box::new(var("__i")),
            right: Box::new(Expr::new(
                ExprKind::Member {
                    object: Box::new(var("__slice")),
                    member: "len".to_owned(),
                    arrow: false,
                },
                loc,
            )),
        },
        loc,
    );
    let step = Expr::new(
        ExprKind::Binary {
            op: TokenKind::Eq,
            left: Box::new(var("__i")),
            right: Box::new(Expr::new(
                ExprKind::Binary {
                    op: TokenKind::Plus,
                    left: Box::new(var("__i")),
                    right: Box::new(int(1)),
                },
                loc,
            )),
        },
        loc,
    );

    let elem_decl = Stmt::new(
        StmtKind::VarDecl(VarDecl {
            is_const: false,
            ty: elem_ty,
            name: elem_name.to_owned(),
            init: Some(Expr::new(
                ExprKind::Index {
                    base: Box::new(var("__slice")),
                    index: Box::new(var("__i")),
                },
                loc,
            )),
        }),
        loc,
    );
    let loop_body = Stmt::new(StmtKind::Block(vec![elem_decl, body]), loc);

    let for_loop = Stmt::new(
        StmtKind::For {
            init: Some(Box::new(init)),
            cond: Some(cond),
            step: Some(step),
            body: Box::new(loop_body),
        },
        loc,
    );

    Stmt::new(StmtKind::Block(vec![slice_decl, for_loop]), loc)
}

/// Convenience entry point: lex + parse one source buffer.
pub fn parse_source(source: &str, filename: &str, reporter: &mut ErrorReporter) -> Option<Program> {
    Parser::new(source, filename, reporter).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let mut reporter = ErrorReporter::quiet();
        parse_source(source, "test.vx", &mut reporter).expect("parse should succeed")
    }

    fn parse_err(source: &str) -> ErrorReporter {
        let mut reporter = ErrorReporter::quiet();
        let result = parse_source(source, "test.vx", &mut reporter);
        assert!(result.is_none(), "expected a parse failure");
        reporter
    }

    #[test]
    fn function_with_params_and_return_type() {
        let program = parse_ok("func add(i32 a, i32 b) -> i32 { return a + b; }");
        assert_eq!(program.decls.len(), 1);
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!("expected function");
        };
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.ret, Type::prim(Prim::I32));
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let program = parse_ok("func f() -> i32 { return 1 + 2 * 3; }");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        let Some(Stmt {
            kind: StmtKind::Block(stmts),
            ..
        }) = &f.body
        else {
            panic!()
        };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!()
        };
        assert_eq!(*op, TokenKind::Plus);
        assert!(matches!(
            &right.kind,
            ExprKind::Binary {
                op: TokenKind::Star,
                ..
            }
        ));
    }

    #[test]
    fn pointer_and_slice_types() {
        let program = parse_ok("func f(i32* p, i32*! q, []u8 s, [4]i32 a) { }");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        assert_eq!(f.params[0].ty, Type::pointer(Type::prim(Prim::I32), false));
        assert_eq!(f.params[1].ty, Type::pointer(Type::prim(Prim::I32), true));
        assert_eq!(f.params[2].ty, Type::slice(Type::prim(Prim::U8)));
        assert_eq!(f.params[3].ty, Type::array(Type::prim(Prim::I32), 4));
    }

    #[test]
    fn generic_call_heuristic_only_fires_on_type_names() {
        // `max<i32>(1, 2)` carries explicit generics; `a < b` stays a comparison.
        let program = parse_ok("func f(i32 a, i32 b) -> bool { max<i32>(1, 2); return a < b; }");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        let Some(Stmt {
            kind: StmtKind::Block(stmts),
            ..
        }) = &f.body
        else {
            panic!()
        };
        let StmtKind::Expr(call) = &stmts[0].kind else { panic!() };
        let ExprKind::Call { generic_args, .. } = &call.kind else {
            panic!()
        };
        assert_eq!(generic_args.as_slice(), &[Type::prim(Prim::I32)]);
        let StmtKind::Return(Some(cmp)) = &stmts[1].kind else {
            panic!()
        };
        assert!(matches!(&cmp.kind, ExprKind::Binary { op: TokenKind::Lt, .. }));
    }

    #[test]
    fn for_in_desugars_to_slice_index_loop() {
        let program = parse_ok("func f([]i32 xs) { for (var i32 x in xs) { } }");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        let Some(Stmt {
            kind: StmtKind::Block(stmts),
            ..
        }) = &f.body
        else {
            panic!()
        };
        // Outer block containing the __slice decl and the for loop.
        let StmtKind::Block(inner) = &stmts[0].kind else { panic!() };
        assert!(matches!(&inner[0].kind, StmtKind::VarDecl(v) if v.name == "__slice"));
        assert!(matches!(&inner[1].kind, StmtKind::For { .. }));
    }

    #[test]
    fn match_arms_with_captures() {
        let program = parse_ok(
            "func f(result<i32, i32> r) { match r { ok(v) => { } err(e) => { } } }",
        );
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        let Some(Stmt {
            kind: StmtKind::Block(stmts),
            ..
        }) = &f.body
        else {
            panic!()
        };
        let StmtKind::Match { arms, .. } = &stmts[0].kind else {
            panic!()
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].tag, "ok");
        assert_eq!(arms[0].capture.as_deref(), Some("v"));
    }

    #[test]
    fn module_must_come_first() {
        let reporter = parse_err("func f() { } module \"m\";");
        assert!(reporter.rendered().contains("module declaration must be the first statement"));
    }

    #[test]
    fn imports_precede_declarations() {
        let reporter = parse_err("func f() { } import \"other.vx\";");
        assert!(reporter.rendered().contains("import statements must precede"));
    }

    #[test]
    fn extern_variadic() {
        let program = parse_ok("extern func printf(cstring fmt, ...) -> i32;");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!()
        };
        assert!(f.is_extern);
        assert!(f.is_variadic);
        assert!(f.is_public);
        assert!(f.body.is_none());
    }

    #[test]
    fn packed_struct_modifier() {
        let program = parse_ok("public packed struct Header { u8 tag; u32 len; };");
        let DeclKind::Struct(s) = &program.decls[0].kind else {
            panic!()
        };
        assert!(s.is_packed);
        assert!(s.is_public);
        assert_eq!(s.fields.len(), 2);
    }
}
