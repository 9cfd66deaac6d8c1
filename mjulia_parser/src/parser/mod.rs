//! Recursive-descent parser for the Julia subset.
//!
//! Precedence follows Julia: assignment < `->` < ternary < pairs (`=>`)
//! < `||` < `&&` < comparisons < range `:` < additive < multiplicative
//! < unary < `^` < postfix (call, index, field, adjoint, splat).
//!
//! Newlines are statement terminators at block level and insignificant
//! inside delimiters; the parser skips them explicitly wherever an
//! element list continues.

mod literal;

use crate::ast::{SynExpr, SynNode};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, SpannedToken};
use crate::span::Span;
use crate::token::Token;

pub struct Parser<'a> {
    toks: Vec<SpannedToken<'a>>,
    pos: usize,
    /// Set while parsing the then-branch of `?:` so that range `:` does
    /// not swallow the ternary separator.
    no_range: bool,
    /// Depth of `[ … ]` nesting; `end` is an operand inside brackets.
    index_depth: usize,
}

/// Parse a whole source file into top-level statements.
pub fn parse_program(source: &str) -> ParseResult<Vec<SynNode>> {
    let mut parser = Parser::new(source)?;
    parser.program()
}

/// Parse exactly one expression (used for string interpolation and for
/// host-side `eval` of fragments).
pub fn parse_expression(source: &str) -> ParseResult<SynNode> {
    let mut parser = Parser::new(source)?;
    parser.skip_terminators();
    let expr = parser.expr_statement()?;
    parser.skip_terminators();
    if let Some(tok) = parser.peek() {
        return Err(ParseError::UnexpectedToken {
            found: tok.text.to_string(),
            expected: "end of input".to_string(),
            span: tok.span,
        });
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> ParseResult<Self> {
        Ok(Self {
            toks: tokenize(source)?,
            pos: 0,
            no_range: false,
            index_depth: 0,
        })
    }

    // ── token cursor ──────────────────────────────────────────────────

    fn peek(&self) -> Option<&SpannedToken<'a>> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&SpannedToken<'a>> {
        self.toks.get(self.pos + offset)
    }

    fn at(&self, tok: Token) -> bool {
        self.peek().is_some_and(|t| t.tok == tok)
    }

    fn bump(&mut self) -> SpannedToken<'a> {
        let tok = self.toks[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: Token) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, expected: &str) -> ParseResult<SpannedToken<'a>> {
        match self.peek() {
            Some(t) if t.tok == tok => Ok(self.bump()),
            Some(t) => Err(ParseError::UnexpectedToken {
                found: t.text.to_string(),
                expected: expected.to_string(),
                span: t.span,
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: expected.to_string(),
            }),
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_terminators(&mut self) {
        while self.at(Token::Newline) || self.at(Token::Semicolon) {
            self.pos += 1;
        }
    }

    /// True when the previous token touches the current one (no space),
    /// which distinguishes `f(x)` from `f (x)` and `A'` from `A '`.
    fn adjacent(&self) -> bool {
        if self.pos == 0 {
            return false;
        }
        match (self.toks.get(self.pos - 1), self.toks.get(self.pos)) {
            (Some(prev), Some(cur)) => prev.span.end == cur.span.start,
            _ => false,
        }
    }

    fn here(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .or_else(|| self.toks.last().map(|t| t.span))
            .unwrap_or_default()
    }

    fn eof_err(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedEof {
            expected: expected.to_string(),
        }
    }

    // ── program / statements ──────────────────────────────────────────

    fn program(&mut self) -> ParseResult<Vec<SynNode>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_terminators();
            if self.peek().is_none() {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        match self.peek().map(|t| t.tok.clone()) {
            Some(Token::Function) => self.definition("function"),
            Some(Token::Macro) => self.definition("macro"),
            Some(Token::Struct) => self.struct_definition(false),
            Some(Token::Mutable) => {
                self.bump();
                self.struct_definition(true)
            }
            Some(Token::Abstract) => {
                self.bump();
                self.expect(Token::Type, "`type` after `abstract`")?;
                let sig = self.expr()?;
                self.skip_newlines();
                self.expect(Token::End, "`end` closing abstract type")?;
                Ok(SynNode::expr("abstract", vec![sig], span))
            }
            Some(Token::Const) => {
                self.bump();
                let inner = self.expr_statement()?;
                Ok(SynNode::expr("const", vec![inner], span))
            }
            Some(Token::Global) => {
                self.bump();
                let inner = self.expr_statement()?;
                Ok(SynNode::expr("global", vec![inner], span))
            }
            Some(Token::Local) => {
                self.bump();
                let inner = self.expr_statement()?;
                Ok(SynNode::expr("local", vec![inner], span))
            }
            Some(Token::Using) => self.module_names("using"),
            Some(Token::Import) => self.module_names("import"),
            Some(Token::Export) => self.module_names("export"),
            Some(Token::Module) => {
                self.bump();
                let name = self.ident_node("module name")?;
                let body = self.block(&[Token::End])?;
                self.expect(Token::End, "`end` closing module")?;
                Ok(SynNode::expr("module", vec![name, body], span))
            }
            Some(Token::For) => self.for_statement(),
            Some(Token::While) => self.while_statement(),
            Some(Token::Try) => self.try_statement(),
            Some(Token::Return) => {
                self.bump();
                let done = self
                    .peek()
                    .map(|t| t.tok.is_expression_terminator())
                    .unwrap_or(true);
                if done {
                    Ok(SynNode::expr("return", vec![], span))
                } else {
                    let val = self.expr_statement()?;
                    Ok(SynNode::expr("return", vec![val], span))
                }
            }
            Some(Token::Break) => {
                self.bump();
                Ok(SynNode::expr("break", vec![], span))
            }
            Some(Token::Continue) => {
                self.bump();
                Ok(SynNode::expr("continue", vec![], span))
            }
            Some(_) => self.expr_statement(),
            None => Err(self.eof_err("statement")),
        }
    }

    fn ident_node(&mut self, expected: &str) -> ParseResult<SynNode> {
        let tok = self.expect(Token::Ident, expected)?;
        Ok(SynNode::ident(tok.text, tok.span))
    }

    fn module_names(&mut self, head: &str) -> ParseResult<SynNode> {
        let span = self.here();
        self.bump();
        let mut names = Vec::new();
        loop {
            let name = self.ident_node("module name")?;
            // Swallow dotted paths (`LinearAlgebra.BLAS`); only the root
            // matters to the loader.
            let mut full = name;
            while self.at(Token::Dot) {
                self.bump();
                let part = self.ident_node("name after `.`")?;
                if let (SynNode::Ident(base, s1), SynNode::Ident(p, _)) = (&full, &part) {
                    full = SynNode::Ident(format!("{}.{}", base, p), *s1);
                }
            }
            names.push(full);
            if !self.eat(Token::Comma) {
                break;
            }
            self.skip_newlines();
        }
        Ok(SynNode::expr(head, names, span))
    }

    fn definition(&mut self, kind: &str) -> ParseResult<SynNode> {
        let span = self.here();
        self.bump();
        let sig = self.expr()?;
        let body = self.block(&[Token::End])?;
        self.expect(Token::End, "`end` closing definition")?;
        Ok(SynNode::expr(kind, vec![sig, body], span))
    }

    fn struct_definition(&mut self, mutable: bool) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::Struct, "`struct`")?;
        let sig = self.expr()?;
        let body = self.block(&[Token::End])?;
        self.expect(Token::End, "`end` closing struct")?;
        Ok(SynNode::expr(
            "struct",
            vec![SynNode::Bool(mutable), sig, body],
            span,
        ))
    }

    fn for_statement(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::For, "`for`")?;
        let mut bindings = vec![self.for_binding()?];
        while self.eat(Token::Comma) {
            bindings.push(self.for_binding()?);
        }
        let body = self.block(&[Token::End])?;
        self.expect(Token::End, "`end` closing for")?;
        let binding = if bindings.len() == 1 {
            bindings.pop().unwrap()
        } else {
            SynNode::expr("block", bindings, span)
        };
        Ok(SynNode::expr("for", vec![binding, body], span))
    }

    fn for_binding(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let var = self.range_expr()?;
        if !self.eat(Token::In) && !self.eat(Token::Assign) {
            return Err(ParseError::UnexpectedToken {
                found: self.peek().map(|t| t.text.to_string()).unwrap_or_default(),
                expected: "`in` or `=` in for binding".to_string(),
                span: self.here(),
            });
        }
        let iter = self.expr()?;
        Ok(SynNode::expr("=", vec![var, iter], span))
    }

    fn while_statement(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::While, "`while`")?;
        let cond = self.expr()?;
        let body = self.block(&[Token::End])?;
        self.expect(Token::End, "`end` closing while")?;
        Ok(SynNode::expr("while", vec![cond, body], span))
    }

    fn try_statement(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::Try, "`try`")?;
        let try_block = self.block(&[Token::Catch, Token::Finally, Token::End])?;
        let mut catch_var = SynNode::Bool(false);
        let mut catch_block = SynNode::Bool(false);
        if self.eat(Token::Catch) {
            if self.at(Token::Ident) {
                catch_var = self.ident_node("catch variable")?;
            }
            catch_block = self.block(&[Token::Finally, Token::End])?;
        }
        let mut args = vec![try_block, catch_var, catch_block];
        if self.eat(Token::Finally) {
            args.push(self.block(&[Token::End])?);
        }
        self.expect(Token::End, "`end` closing try")?;
        Ok(SynNode::expr("try", args, span))
    }

    /// Parse statements until (not including) one of `stop`.
    fn block(&mut self, stop: &[Token]) -> ParseResult<SynNode> {
        let span = self.here();
        let mut stmts = Vec::new();
        loop {
            self.skip_terminators();
            match self.peek() {
                None => return Err(self.eof_err("`end`")),
                Some(t) if stop.contains(&t.tok) => break,
                Some(_) => stmts.push(self.statement()?),
            }
        }
        Ok(SynNode::expr("block", stmts, span))
    }

    // ── expressions ───────────────────────────────────────────────────

    /// Expression statement: handles bare-comma tuples and (compound)
    /// assignment, both of which only exist at statement level.
    fn expr_statement(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let first = self.expr()?;
        let lhs = if self.at(Token::Comma) && !self.comma_ends_statement() {
            let mut elems = vec![first];
            while self.eat(Token::Comma) {
                if self
                    .peek()
                    .map(|t| t.tok.is_expression_terminator() || t.tok == Token::Assign)
                    .unwrap_or(true)
                {
                    break;
                }
                elems.push(self.expr()?);
            }
            SynNode::expr("tuple", elems, span)
        } else {
            first
        };
        if let Some(head) = self.assignment_head() {
            self.bump();
            self.skip_newlines();
            let rhs = self.expr_statement()?;
            return Ok(SynNode::expr(head, vec![lhs, rhs], span));
        }
        Ok(lhs)
    }

    fn comma_ends_statement(&self) -> bool {
        self.peek_at(1)
            .map(|t| t.tok.is_expression_terminator())
            .unwrap_or(true)
    }

    fn assignment_head(&self) -> Option<&'static str> {
        match self.peek().map(|t| &t.tok) {
            Some(Token::Assign) => Some("="),
            Some(Token::PlusEq) => Some("+="),
            Some(Token::MinusEq) => Some("-="),
            Some(Token::StarEq) => Some("*="),
            Some(Token::SlashEq) => Some("/="),
            Some(Token::CaretEq) => Some("^="),
            Some(Token::PercentEq) => Some("%="),
            Some(Token::IntDivEq) => Some("÷="),
            Some(Token::DotAssign) => Some(".="),
            Some(Token::DotPlusEq) => Some(".+="),
            Some(Token::DotMinusEq) => Some(".-="),
            Some(Token::DotStarEq) => Some(".*="),
            Some(Token::DotSlashEq) => Some("./="),
            Some(Token::DotCaretEq) => Some(".^="),
            _ => None,
        }
    }

    /// Full expression: `where` and `->` live at the bottom of the chain.
    pub(crate) fn expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.arrow_expr()?;
        while self.at(Token::Where) {
            self.bump();
            let mut vars = Vec::new();
            if self.eat(Token::LBrace) {
                loop {
                    self.skip_newlines();
                    vars.push(self.comparison_expr()?);
                    self.skip_newlines();
                    if !self.eat(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBrace, "`}` closing where clause")?;
            } else {
                vars.push(self.comparison_expr()?);
            }
            let mut args = vec![lhs];
            args.extend(vars);
            lhs = SynNode::expr("where", args, span);
        }
        Ok(lhs)
    }

    fn arrow_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let lhs = self.ternary_expr()?;
        if self.at(Token::Arrow) {
            self.bump();
            self.skip_newlines();
            let body = self.expr()?;
            return Ok(SynNode::expr("->", vec![lhs, body], span));
        }
        Ok(lhs)
    }

    fn ternary_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let cond = self.pair_expr()?;
        if self.at(Token::Question) {
            self.bump();
            self.skip_newlines();
            let saved = self.no_range;
            self.no_range = true;
            let then = self.ternary_expr()?;
            self.no_range = saved;
            self.expect(Token::Colon, "`:` in ternary expression")?;
            self.skip_newlines();
            let otherwise = self.ternary_expr()?;
            return Ok(SynNode::expr("if", vec![cond, then, otherwise], span));
        }
        Ok(cond)
    }

    fn pair_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let lhs = self.or_expr()?;
        if self.at(Token::FatArrow) {
            self.bump();
            self.skip_newlines();
            let rhs = self.pair_expr()?;
            return Ok(SynNode::expr(
                "call",
                vec![SynNode::ident("=>", span), lhs, rhs],
                span,
            ));
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.and_expr()?;
        while self.at(Token::OrOr) {
            self.bump();
            self.skip_newlines();
            let rhs = self.and_expr()?;
            lhs = SynNode::expr("||", vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.comparison_expr()?;
        while self.at(Token::AndAnd) {
            self.bump();
            self.skip_newlines();
            let rhs = self.comparison_expr()?;
            lhs = SynNode::expr("&&", vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn comparison_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.range_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Token::EqEq) => "==",
                Some(Token::NotEq) => "!=",
                Some(Token::EqEqEq) => "===",
                Some(Token::NotEqEq) => "!==",
                Some(Token::Lt) => "<",
                Some(Token::Le) => "<=",
                Some(Token::Gt) => ">",
                Some(Token::Ge) => ">=",
                Some(Token::In) => "in",
                Some(Token::Isa) => "isa",
                Some(Token::DotEqEq) => ".==",
                Some(Token::DotNotEq) => ".!=",
                Some(Token::DotLt) => ".<",
                Some(Token::DotLe) => ".<=",
                Some(Token::DotGt) => ".>",
                Some(Token::DotGe) => ".>=",
                Some(Token::SubtypeOp) => "<:",
                Some(Token::SupertypeOp) => ">:",
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let rhs = self.range_expr()?;
            lhs = if op == "<:" || op == ">:" {
                SynNode::expr(op, vec![lhs, rhs], span)
            } else {
                SynNode::expr("call", vec![SynNode::ident(op, span), lhs, rhs], span)
            };
        }
        Ok(lhs)
    }

    fn range_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let first = self.add_expr()?;
        if self.no_range || !self.at(Token::Colon) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.at(Token::Colon) && parts.len() < 3 {
            self.bump();
            parts.push(self.add_expr()?);
        }
        let mut args = vec![SynNode::ident(":", span)];
        args.extend(parts);
        Ok(SynNode::expr("call", args, span))
    }

    fn add_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Token::Plus) => "+",
                Some(Token::Minus) => "-",
                Some(Token::Pipe) => "|",
                Some(Token::DotPlus) => ".+",
                Some(Token::DotMinus) => ".-",
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let rhs = self.mul_expr()?;
            lhs = SynNode::expr("call", vec![SynNode::ident(op, span), lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Token::Star) => "*",
                Some(Token::Slash) => "/",
                Some(Token::Percent) => "%",
                Some(Token::IntDiv) => "÷",
                Some(Token::Amp) => "&",
                Some(Token::Backslash) => "\\",
                Some(Token::DotStar) => ".*",
                Some(Token::DotSlash) => "./",
                Some(Token::DotPercent) => ".%",
                Some(Token::DotBackslash) => ".\\",
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let rhs = self.unary_expr()?;
            lhs = SynNode::expr("call", vec![SynNode::ident(op, span), lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        match self.peek().map(|t| &t.tok) {
            Some(Token::Minus) => {
                self.bump();
                // Prefix-call form: `-(a, b)` is a call, not negation
                // of a tuple.
                if self.at(Token::LParen) && self.adjacent() {
                    return self.operator_prefix_call("-", span);
                }
                let operand = self.unary_expr()?;
                // Fold negative literals so `-3` is one constant.
                match operand {
                    SynNode::Int(v) => Ok(SynNode::Int(-v)),
                    SynNode::Int128(v) => Ok(SynNode::Int128(-v)),
                    SynNode::Float(v) => Ok(SynNode::Float(-v)),
                    SynNode::Float32(v) => Ok(SynNode::Float32(-v)),
                    other => Ok(SynNode::expr(
                        "call",
                        vec![SynNode::ident("-", span), other],
                        span,
                    )),
                }
            }
            Some(Token::Plus) => {
                self.bump();
                if self.at(Token::LParen) && self.adjacent() {
                    return self.operator_prefix_call("+", span);
                }
                self.unary_expr()
            }
            Some(Token::Bang) => {
                self.bump();
                let operand = self.unary_expr()?;
                Ok(SynNode::expr(
                    "call",
                    vec![SynNode::ident("!", span), operand],
                    span,
                ))
            }
            Some(Token::Dollar) => {
                self.bump();
                let operand = self.unary_expr()?;
                Ok(SynNode::expr("$", vec![operand], span))
            }
            _ => self.power_expr(),
        }
    }

    fn power_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let lhs = self.postfix_expr()?;
        let op = match self.peek().map(|t| &t.tok) {
            Some(Token::Caret) => "^",
            Some(Token::DotCaret) => ".^",
            _ => return Ok(lhs),
        };
        self.bump();
        self.skip_newlines();
        let rhs = self.unary_expr()?;
        Ok(SynNode::expr(
            "call",
            vec![SynNode::ident(op, span), lhs, rhs],
            span,
        ))
    }

    fn postfix_expr(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let mut base = self.atom()?;
        // Implicit multiplication: `2x`, `3sin(x)`.
        if matches!(
            base,
            SynNode::Int(_) | SynNode::Int128(_) | SynNode::Float(_) | SynNode::Float32(_)
        ) && self.at(Token::Ident)
            && self.adjacent()
        {
            let rhs = self.postfix_expr()?;
            return Ok(SynNode::expr(
                "call",
                vec![SynNode::ident("*", span), base, rhs],
                span,
            ));
        }
        loop {
            match self.peek().map(|t| &t.tok) {
                Some(Token::LParen) if self.adjacent() => {
                    self.bump();
                    let args = self.call_arguments(Token::RParen)?;
                    self.expect(Token::RParen, "`)` closing call")?;
                    let mut all = vec![base];
                    all.extend(args);
                    base = SynNode::expr("call", all, span);
                }
                Some(Token::LBracket) if self.adjacent() => {
                    self.bump();
                    self.index_depth += 1;
                    let saved_no_range = std::mem::replace(&mut self.no_range, false);
                    let mut args = vec![base];
                    loop {
                        self.skip_newlines();
                        if self.at(Token::RBracket) {
                            break;
                        }
                        args.push(self.expr()?);
                        self.skip_newlines();
                        if !self.eat(Token::Comma) {
                            break;
                        }
                    }
                    self.no_range = saved_no_range;
                    self.index_depth -= 1;
                    self.expect(Token::RBracket, "`]` closing index")?;
                    base = SynNode::expr("ref", args, span);
                }
                Some(Token::LBrace) if self.adjacent() => {
                    self.bump();
                    let mut args = vec![base];
                    loop {
                        self.skip_newlines();
                        if self.at(Token::RBrace) {
                            break;
                        }
                        args.push(self.expr()?);
                        self.skip_newlines();
                        if !self.eat(Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RBrace, "`}` closing type parameters")?;
                    base = SynNode::expr("curly", args, span);
                }
                Some(Token::Dot) => {
                    // `.` then identifier = field; `.` then `(` = dot call.
                    match self.peek_at(1).map(|t| &t.tok) {
                        Some(Token::Ident) => {
                            self.bump();
                            let field = self.bump();
                            let field_sym = SynNode::expr(
                                "symbol",
                                vec![SynNode::ident(field.text, field.span)],
                                field.span,
                            );
                            base = SynNode::expr(".", vec![base, field_sym], span);
                        }
                        Some(Token::LParen) => {
                            self.bump();
                            self.bump();
                            let args = self.call_arguments(Token::RParen)?;
                            self.expect(Token::RParen, "`)` closing dot call")?;
                            let tuple = SynNode::expr("tuple", args, span);
                            base = SynNode::expr(".", vec![base, tuple], span);
                        }
                        _ => break,
                    }
                }
                Some(Token::Adjoint) if self.adjacent() => {
                    self.bump();
                    base = SynNode::expr(
                        "call",
                        vec![SynNode::ident("adjoint", span), base],
                        span,
                    );
                }
                Some(Token::Ellipsis) => {
                    self.bump();
                    base = SynNode::expr("...", vec![base], span);
                }
                Some(Token::ColonColon) => {
                    self.bump();
                    let ty = self.postfix_expr()?;
                    base = SynNode::expr("::", vec![base, ty], span);
                }
                _ => break,
            }
        }
        Ok(base)
    }

    /// Arguments of `f( … )`: positionals, `name=value` keywords, and a
    /// `;`-introduced keyword section, with `...` splats anywhere.
    /// Delimited context: the ternary range restriction does not apply
    /// inside.
    fn call_arguments(&mut self, close: Token) -> ParseResult<Vec<SynNode>> {
        let saved_no_range = std::mem::replace(&mut self.no_range, false);
        let result = self.call_arguments_inner(close);
        self.no_range = saved_no_range;
        result
    }

    fn call_arguments_inner(&mut self, close: Token) -> ParseResult<Vec<SynNode>> {
        let span = self.here();
        let mut positional = Vec::new();
        let mut parameters: Option<Vec<SynNode>> = None;
        loop {
            self.skip_newlines();
            if self.at(close.clone()) {
                break;
            }
            if self.eat(Token::Semicolon) {
                parameters.get_or_insert_with(Vec::new);
                continue;
            }
            let arg = self.expr()?;
            let arg = if self.at(Token::Assign) {
                self.bump();
                self.skip_newlines();
                let value = self.expr()?;
                SynNode::expr("kw", vec![arg, value], span)
            } else {
                arg
            };
            match parameters {
                Some(ref mut kws) => kws.push(arg),
                None => positional.push(arg),
            }
            self.skip_newlines();
            if !self.eat(Token::Comma) && !self.at(Token::Semicolon) {
                break;
            }
        }
        let mut out = Vec::new();
        if let Some(kws) = parameters {
            out.push(SynNode::expr("parameters", kws, span));
        }
        out.extend(positional);
        Ok(out)
    }

    // ── atoms ─────────────────────────────────────────────────────────

    fn atom(&mut self) -> ParseResult<SynNode> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.eof_err("expression"));
        };
        let span = tok.span;
        match tok.tok {
            Token::Int => {
                self.bump();
                literal::decode_int(tok.text, span)
            }
            Token::Float => {
                self.bump();
                literal::decode_float(tok.text, span)
            }
            Token::Float32 => {
                self.bump();
                literal::decode_float32(tok.text, span)
            }
            Token::Char => {
                self.bump();
                literal::decode_char(tok.text, span)
            }
            Token::Str => {
                self.bump();
                string_literal(tok.text, span)
            }
            Token::True => {
                self.bump();
                Ok(SynNode::Bool(true))
            }
            Token::False => {
                self.bump();
                Ok(SynNode::Bool(false))
            }
            Token::Ident => {
                self.bump();
                Ok(SynNode::ident(tok.text, span))
            }
            Token::End if self.index_depth > 0 => {
                self.bump();
                Ok(SynNode::expr("end", vec![], span))
            }
            Token::At => self.macrocall(),
            Token::Colon => self.quoted_atom(),
            Token::LParen => self.paren_atom(),
            Token::LBracket => self.bracket_atom(),
            Token::Begin => {
                self.bump();
                let body = self.block(&[Token::End])?;
                self.expect(Token::End, "`end` closing begin")?;
                Ok(body)
            }
            Token::Quote => {
                self.bump();
                let body = self.block(&[Token::End])?;
                self.expect(Token::End, "`end` closing quote")?;
                Ok(SynNode::expr("quote", vec![body], span))
            }
            Token::If => self.if_expression(),
            // `try` is an expression: `x = try … catch … end`.
            Token::Try => self.try_statement(),
            Token::Let => {
                self.bump();
                let mut bindings = Vec::new();
                if !self.at(Token::Newline) && !self.at(Token::Semicolon) {
                    loop {
                        bindings.push(self.expr_binding()?);
                        if !self.eat(Token::Comma) {
                            break;
                        }
                    }
                }
                let body = self.block(&[Token::End])?;
                self.expect(Token::End, "`end` closing let")?;
                Ok(SynNode::expr(
                    "let",
                    vec![SynNode::expr("block", bindings, span), body],
                    span,
                ))
            }
            Token::ColonColon => {
                self.bump();
                let ty = self.postfix_expr()?;
                Ok(SynNode::expr("::", vec![ty], span))
            }
            // Operators in value position (`map(+, a, b)`) or heading a
            // prefix call (`*(a, b)`).
            Token::Plus | Token::Minus | Token::Star | Token::Slash | Token::Caret
                if self
                    .peek_at(1)
                    .map(|t| {
                        matches!(
                            t.tok,
                            Token::Comma
                                | Token::RParen
                                | Token::RBracket
                                | Token::Newline
                                | Token::LParen
                        )
                    })
                    .unwrap_or(false) =>
            {
                self.bump();
                Ok(SynNode::ident(tok.text, span))
            }
            _ => Err(ParseError::UnexpectedToken {
                found: tok.text.to_string(),
                expected: "expression".to_string(),
                span,
            }),
        }
    }

    /// `op(args…)` where an operator heads an ordinary call.
    fn operator_prefix_call(&mut self, op: &str, span: Span) -> ParseResult<SynNode> {
        self.expect(Token::LParen, "`(`")?;
        let args = self.call_arguments(Token::RParen)?;
        self.expect(Token::RParen, "`)` closing call")?;
        // A single argument is plain negation/identity: `-(3)`.
        let mut all = vec![SynNode::ident(op, span)];
        all.extend(args);
        Ok(SynNode::expr("call", all, span))
    }

    fn expr_binding(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        let lhs = self.expr()?;
        if self.eat(Token::Assign) {
            let rhs = self.expr()?;
            Ok(SynNode::expr("=", vec![lhs, rhs], span))
        } else {
            Ok(lhs)
        }
    }

    fn if_expression(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.bump(); // `if` or `elseif`
        let cond = self.expr()?;
        let then = self.block(&[Token::Elseif, Token::Else, Token::End])?;
        let mut args = vec![cond, then];
        match self.peek().map(|t| &t.tok) {
            Some(Token::Elseif) => {
                let nested = self.if_expression()?;
                // Rewrap the nested if as an elseif chain, Julia-style.
                if let SynNode::Expr(e) = nested {
                    args.push(SynNode::Expr(Box::new(SynExpr {
                        head: "elseif".to_string(),
                        args: e.args,
                        span: e.span,
                    })));
                }
                return Ok(SynNode::expr("if", args, span));
            }
            Some(Token::Else) => {
                self.bump();
                let otherwise = self.block(&[Token::End])?;
                args.push(otherwise);
            }
            _ => {}
        }
        self.expect(Token::End, "`end` closing if")?;
        Ok(SynNode::expr("if", args, span))
    }

    fn macrocall(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::At, "`@`")?;
        let name = match self.peek().map(|t| t.tok.clone()) {
            Some(Token::Ident) => {
                let tok = self.bump();
                format!("@{}", tok.text)
            }
            Some(Token::Dot) => {
                self.bump();
                "@__dot__".to_string()
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    found: self.peek().map(|t| t.text.to_string()).unwrap_or_default(),
                    expected: "macro name after `@`".to_string(),
                    span: self.here(),
                })
            }
        };
        let mut args = vec![SynNode::ident(&name, span)];
        if self.at(Token::LParen) && self.adjacent() {
            self.bump();
            args.extend(self.call_arguments(Token::RParen)?);
            self.expect(Token::RParen, "`)` closing macro call")?;
        } else {
            // Space-separated form: arguments run to the end of the line.
            loop {
                let done = match self.peek() {
                    None => true,
                    Some(t) => t.tok.is_expression_terminator() || t.tok == Token::End,
                };
                if done {
                    break;
                }
                args.push(self.expr()?);
            }
        }
        Ok(SynNode::expr("macrocall", args, span))
    }

    fn quoted_atom(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::Colon, "`:`")?;
        match self.peek().map(|t| t.tok.clone()) {
            Some(Token::LParen) => {
                self.bump();
                self.skip_newlines();
                let inner = self.expr_statement()?;
                self.skip_newlines();
                self.expect(Token::RParen, "`)` closing quote")?;
                Ok(SynNode::expr("quote", vec![inner], span))
            }
            Some(Token::Ident) => {
                let tok = self.bump();
                Ok(SynNode::expr(
                    "symbol",
                    vec![SynNode::ident(tok.text, tok.span)],
                    span,
                ))
            }
            // Operator symbols (`:+`, `:<=`) and quoted keywords.
            Some(_) if self.adjacent_next_is_symbolish() => {
                let tok = self.bump();
                Ok(SynNode::expr(
                    "symbol",
                    vec![SynNode::ident(tok.text, tok.span)],
                    span,
                ))
            }
            _ => Err(ParseError::UnexpectedToken {
                found: self.peek().map(|t| t.text.to_string()).unwrap_or_default(),
                expected: "symbol or `(` after `:`".to_string(),
                span: self.here(),
            }),
        }
    }

    fn adjacent_next_is_symbolish(&self) -> bool {
        if !self.adjacent() {
            return false;
        }
        !matches!(
            self.peek().map(|t| &t.tok),
            None | Some(Token::Newline)
                | Some(Token::LParen)
                | Some(Token::RParen)
                | Some(Token::LBracket)
                | Some(Token::RBracket)
                | Some(Token::Comma)
                | Some(Token::Semicolon)
        )
    }

    fn paren_atom(&mut self) -> ParseResult<SynNode> {
        let saved_no_range = std::mem::replace(&mut self.no_range, false);
        let result = self.paren_atom_inner();
        self.no_range = saved_no_range;
        result
    }

    fn paren_atom_inner(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::LParen, "`(`")?;
        self.skip_newlines();
        if self.eat(Token::RParen) {
            return Ok(SynNode::expr("tuple", vec![], span));
        }
        // `(+)`, `(==)`: operator used as a value.
        if let (Some(cur), Some(next)) = (self.peek(), self.peek_at(1)) {
            let is_op = matches!(
                cur.tok,
                Token::Plus
                    | Token::Minus
                    | Token::Star
                    | Token::Slash
                    | Token::Caret
                    | Token::Percent
                    | Token::EqEq
                    | Token::NotEq
                    | Token::Lt
                    | Token::Le
                    | Token::Gt
                    | Token::Ge
                    | Token::IntDiv
                    | Token::FatArrow
            );
            if is_op && next.tok == Token::RParen {
                let tok = self.bump();
                self.bump();
                return Ok(SynNode::ident(tok.text, tok.span));
            }
        }
        let first = self.expr()?;
        // Named tuple element: `(a = 1, …)`.
        let first = if self.at(Token::Assign) {
            self.bump();
            self.skip_newlines();
            let value = self.expr()?;
            SynNode::expr("=", vec![first, value], span)
        } else {
            first
        };
        self.skip_newlines();
        if self.at(Token::Comma) {
            let mut elems = vec![first];
            while self.eat(Token::Comma) {
                self.skip_newlines();
                if self.at(Token::RParen) {
                    break;
                }
                let elem = self.expr()?;
                let elem = if self.at(Token::Assign) {
                    self.bump();
                    self.skip_newlines();
                    let value = self.expr()?;
                    SynNode::expr("=", vec![elem, value], span)
                } else {
                    elem
                };
                elems.push(elem);
                self.skip_newlines();
            }
            self.expect(Token::RParen, "`)` closing tuple")?;
            return Ok(SynNode::expr("tuple", elems, span));
        }
        self.expect(Token::RParen, "`)`")?;
        if matches!(&first, SynNode::Expr(e) if e.head == "=") {
            // `(a = 1)` alone is still a named tuple.
            return Ok(SynNode::expr("tuple", vec![first], span));
        }
        Ok(first)
    }

    fn bracket_atom(&mut self) -> ParseResult<SynNode> {
        let span = self.here();
        self.expect(Token::LBracket, "`[`")?;
        self.index_depth += 1;
        let saved_no_range = std::mem::replace(&mut self.no_range, false);
        let result = self.bracket_body(span);
        self.no_range = saved_no_range;
        self.index_depth -= 1;
        result
    }

    fn bracket_body(&mut self, span: Span) -> ParseResult<SynNode> {
        self.skip_newlines();
        if self.eat(Token::RBracket) {
            return Ok(SynNode::expr("vect", vec![], span));
        }
        let first = self.expr()?;
        // Comprehension: `[body for var in iter]`.
        if self.at(Token::For) {
            self.bump();
            let binding = self.for_binding()?;
            let mut gen_args = vec![first, binding];
            if self.eat(Token::If) {
                let cond = self.expr()?;
                // Julia nests the filter inside the generator binding.
                let binding = gen_args.pop().unwrap();
                gen_args.push(SynNode::expr("filter", vec![cond, binding], span));
            }
            self.skip_newlines();
            self.expect(Token::RBracket, "`]` closing comprehension")?;
            let generator = SynNode::expr("generator", gen_args, span);
            return Ok(SynNode::expr("comprehension", vec![generator], span));
        }
        // Comma-separated vector.
        if self.at(Token::Comma) {
            let mut elems = vec![first];
            while self.eat(Token::Comma) {
                self.skip_newlines();
                if self.at(Token::RBracket) {
                    break;
                }
                elems.push(self.expr()?);
                self.skip_newlines();
            }
            self.expect(Token::RBracket, "`]` closing array")?;
            return Ok(SynNode::expr("vect", elems, span));
        }
        if self.eat(Token::RBracket) {
            return Ok(SynNode::expr("vect", vec![first], span));
        }
        // Space/semicolon separated: matrix literal.
        let mut rows: Vec<Vec<SynNode>> = vec![vec![first]];
        loop {
            if self.at(Token::Semicolon) || self.at(Token::Newline) {
                self.skip_terminators();
                if self.at(Token::RBracket) {
                    break;
                }
                rows.push(Vec::new());
                continue;
            }
            if self.at(Token::RBracket) {
                break;
            }
            let elem = self.expr()?;
            rows.last_mut().unwrap().push(elem);
        }
        self.expect(Token::RBracket, "`]` closing matrix")?;
        if rows.len() == 1 {
            let row = rows.pop().unwrap();
            return Ok(SynNode::expr("hcat", row, span));
        }
        let row_nodes = rows
            .into_iter()
            .map(|r| SynNode::expr("row", r, span))
            .collect();
        Ok(SynNode::expr("vcat", row_nodes, span))
    }

}

// ── string interpolation ──────────────────────────────────────────────

/// Split a raw string literal (quotes included) into literal chunks and
/// `$`-interpolations. A single literal chunk yields a plain `Str` node.
fn string_literal(text: &str, span: Span) -> ParseResult<SynNode> {
    let inner = &text[1..text.len() - 1];
    let bytes = inner.as_bytes();
    let mut parts: Vec<SynNode> = Vec::new();
    let mut lit_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        // Skip ahead to the next escape or interpolation marker.
        match memchr::memchr2(b'\\', b'$', &bytes[i..]) {
            None => break,
            Some(offset) => i += offset,
        }
        match bytes[i] {
            b'\\' => i += 2,
            b'$' => {
                if lit_start < i {
                    parts.push(SynNode::Str(literal::unescape_str(
                        &inner[lit_start..i],
                        span,
                    )?));
                }
                i += 1;
                if bytes.get(i) == Some(&b'(') {
                    let close = matching_paren(inner, i).ok_or(ParseError::Unterminated {
                        what: "string interpolation",
                        span,
                    })?;
                    let fragment = &inner[i + 1..close];
                    parts.push(parse_expression(fragment)?);
                    i = close + 1;
                } else {
                    let start = i;
                    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    if start == i {
                        return Err(ParseError::InvalidLiteral {
                            what: "string interpolation",
                            text: text.to_string(),
                            span,
                        });
                    }
                    parts.push(SynNode::ident(&inner[start..i], span));
                }
                lit_start = i;
            }
            _ => i += 1,
        }
    }
    if lit_start < inner.len() {
        parts.push(SynNode::Str(literal::unescape_str(&inner[lit_start..], span)?));
    }
    if parts.is_empty() {
        return Ok(SynNode::Str(String::new()));
    }
    if parts.len() == 1 && matches!(parts[0], SynNode::Str(_)) {
        return Ok(parts.pop().expect("non-empty"));
    }
    Ok(SynNode::expr("string", parts, span))
}

/// Index of the `)` matching the `(` at `open`, honoring nesting and
/// nested string quotes.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
