//! Statement parsing.

use std::rc::Rc;

use crate::ast::{
    BinOp, Block, ExceptHandler, Expr, ExprKind, FunctionDef, ImportName, Param, Stmt, StmtKind,
    Target,
};
use crate::error::{ScriptError, ScriptResult};
use crate::parser::Parser;
use crate::token::TokenKind;

impl Parser {
    /// Parse one compound statement or one line of simple statements.
    pub(crate) fn parse_statement(&mut self) -> ScriptResult<Vec<Stmt>> {
        let line = self.line();
        let compound = match self.peek() {
            TokenKind::If => Some(self.parse_if()?),
            TokenKind::While => Some(self.parse_while()?),
            TokenKind::For => Some(self.parse_for()?),
            TokenKind::Def => Some(self.parse_def()?),
            TokenKind::Try => Some(self.parse_try()?),
            TokenKind::Class => return Err(self.syntax("class definitions are not supported")),
            TokenKind::With => return Err(self.syntax("'with' blocks are not supported")),
            _ => None,
        };
        if let Some(kind) = compound {
            return Ok(vec![Stmt { kind, line }]);
        }
        self.parse_simple_line()
    }

    /// `simple (';' simple)* NEWLINE`
    fn parse_simple_line(&mut self) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.parse_simple()?;
            stmts.push(Stmt { kind, line });
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        if !self.eat(&TokenKind::Newline) && !self.check(&TokenKind::Eof) {
            return Err(self.unexpected("end of line"));
        }
        Ok(stmts)
    }

    fn parse_simple(&mut self) -> ScriptResult<StmtKind> {
        match self.peek() {
            TokenKind::Pass => {
                self.advance();
                Ok(StmtKind::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(StmtKind::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(StmtKind::Continue)
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.parse_testlist()?)))
                }
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_from_import(),
            TokenKind::Global | TokenKind::Nonlocal => {
                let global = self.advance() == TokenKind::Global;
                let mut names = vec![self.expect_name()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_name()?);
                }
                Ok(if global {
                    StmtKind::Global(names)
                } else {
                    StmtKind::Nonlocal(names)
                })
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let message = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Ok(StmtKind::Assert { test, message })
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = vec![self.parse_target()?];
                while self.eat(&TokenKind::Comma) {
                    if self.at_statement_end() {
                        break;
                    }
                    targets.push(self.parse_target()?);
                }
                Ok(StmtKind::Del(targets))
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    Ok(StmtKind::Raise(None))
                } else {
                    Ok(StmtKind::Raise(Some(self.parse_test()?)))
                }
            }
            TokenKind::Yield => Err(self.syntax("generators ('yield') are not supported")),
            _ => self.parse_expression_statement(),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn parse_expression_statement(&mut self) -> ScriptResult<StmtKind> {
        let first = self.parse_testlist()?;

        if let Some(op) = augmented_op(self.peek()) {
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.syntax("illegal expression for augmented assignment"));
            }
            let value = self.parse_testlist()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if self.eat(&TokenKind::Colon) {
            let target = self.to_target(first)?;
            self.parse_test()?;
            let value = if self.eat(&TokenKind::Assign) {
                Some(self.parse_testlist()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign { target, value });
        }

        if !self.check(&TokenKind::Assign) {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat(&TokenKind::Assign) {
            exprs.push(self.parse_testlist()?);
        }
        let value = exprs.pop().ok_or_else(|| self.syntax("invalid assignment"))?;
        let targets = exprs
            .into_iter()
            .map(|e| self.to_target(e))
            .collect::<ScriptResult<Vec<_>>>()?;
        Ok(StmtKind::Assign { targets, value })
    }

    /// Convert a parsed expression into an assignment target.
    pub(crate) fn to_target(&self, expr: Expr) -> ScriptResult<Target> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name)),
            ExprKind::Subscript { value, index } => Ok(Target::Subscript { value, index }),
            ExprKind::Tuple(items) | ExprKind::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<ScriptResult<_>>()?,
            )),
            ExprKind::Attribute { attr, .. } => {
                Err(ScriptError::Syntax(format!("cannot assign to attribute '{attr}'")).at(expr.line))
            }
            _ => Err(ScriptError::Syntax("cannot assign to expression".into()).at(expr.line)),
        }
    }

    fn parse_target(&mut self) -> ScriptResult<Target> {
        let expr = self.parse_bitor()?;
        self.to_target(expr)
    }

    /// Comma-separated targets stopping before `in` (for `for` loops and
    /// comprehensions).
    pub(crate) fn parse_target_list(&mut self) -> ScriptResult<Target> {
        let first = self.parse_target()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_target()?);
        }
        Ok(Target::Tuple(items))
    }

    // ── Imports ───────────────────────────────────────────────

    fn parse_dotted_name(&mut self) -> ScriptResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self) -> ScriptResult<Option<String>> {
        if self.eat(&TokenKind::As) {
            Ok(Some(self.expect_name()?))
        } else {
            Ok(None)
        }
    }

    fn parse_import(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::Import)?;
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let alias = self.parse_alias()?;
            names.push(ImportName { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::From)?;
        let module = self.parse_dotted_name()?;
        self.expect(&TokenKind::Import)?;
        if self.check(&TokenKind::Star) {
            return Err(self.syntax("'from ... import *' is not supported"));
        }
        let parenthesised = self.eat(&TokenKind::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let alias = self.parse_alias()?;
            names.push(ImportName { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if parenthesised && self.check(&TokenKind::RParen) {
                break;
            }
        }
        if parenthesised {
            self.expect(&TokenKind::RParen)?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    // ── Compound statements ───────────────────────────────────

    /// `':' (NEWLINE INDENT stmt+ DEDENT | simple_line)`
    pub(crate) fn parse_block(&mut self) -> ScriptResult<Block> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.syntax("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.check(&TokenKind::Eof) {
                break;
            }
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::If)?;
        let mut branches = Vec::new();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        branches.push((test, body));

        let mut orelse = None;
        loop {
            if self.eat(&TokenKind::Elif) {
                let test = self.parse_test()?;
                let body = self.parse_block()?;
                branches.push((test, body));
            } else if self.eat(&TokenKind::Else) {
                orelse = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn parse_while(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::While)?;
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StmtKind::While { test, body, orelse })
    }

    fn parse_for(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::For)?;
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_def(&mut self) -> ScriptResult<StmtKind> {
        let line = self.line();
        self.expect(&TokenKind::Def)?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_test()?;
        }
        let body = self.parse_block()?;
        Ok(StmtKind::FunctionDef(Rc::new(FunctionDef {
            name,
            params,
            body,
            line,
        })))
    }

    /// Parameter list up to (not including) `end`. Annotations are allowed
    /// only in `def` headers.
    pub(crate) fn parse_params(
        &mut self,
        end: &TokenKind,
        annotations: bool,
    ) -> ScriptResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.check(end) {
            if self.check(&TokenKind::DoubleStar) {
                return Err(self.syntax("'**' parameters are not supported"));
            }
            let variadic = self.eat(&TokenKind::Star);
            let name = self.expect_name()?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.syntax(format!("duplicate argument '{name}' in function definition")));
            }
            if annotations && self.eat(&TokenKind::Colon) {
                self.parse_test()?;
            }
            let default = if !variadic && self.eat(&TokenKind::Assign) {
                Some(self.parse_test()?)
            } else {
                None
            };
            if default.is_none()
                && !variadic
                && params.iter().any(|p| p.default.is_some())
            {
                return Err(self.syntax("non-default argument follows default argument"));
            }
            params.push(Param {
                name,
                default,
                variadic,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_try(&mut self) -> ScriptResult<StmtKind> {
        self.expect(&TokenKind::Try)?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            let line = self.line();
            self.advance();
            let mut kinds = Vec::new();
            let mut name = None;
            if !self.check(&TokenKind::Colon) {
                if self.eat(&TokenKind::LParen) {
                    loop {
                        kinds.push(self.expect_name()?);
                        if !self.eat(&TokenKind::Comma) || self.check(&TokenKind::RParen) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                } else {
                    kinds.push(self.expect_name()?);
                }
                if self.eat(&TokenKind::As) {
                    name = Some(self.expect_name()?);
                }
            }
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kinds,
                name,
                body,
                line,
            });
        }
        let orelse = if !handlers.is_empty() && self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        let finally = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handlers.is_empty() && finally.is_none() {
            return Err(self.syntax("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finally,
        })
    }
}

pub(crate) fn augmented_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::PlusAssign => BinOp::Add,
        TokenKind::MinusAssign => BinOp::Sub,
        TokenKind::StarAssign => BinOp::Mul,
        TokenKind::SlashAssign => BinOp::Div,
        TokenKind::DoubleSlashAssign => BinOp::FloorDiv,
        TokenKind::PercentAssign => BinOp::Mod,
        TokenKind::DoubleStarAssign => BinOp::Pow,
        TokenKind::AmpAssign => BinOp::BitAnd,
        TokenKind::PipeAssign => BinOp::BitOr,
        TokenKind::CaretAssign => BinOp::BitXor,
        _ => return None,
    })
}
