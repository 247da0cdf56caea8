//! Recursive-descent parser producing [`super::ast`] trees from the token
//! stream produced by [`super::lexer`].

use super::ast::{
    BinaryOp, BoolOp, CompareOp, Expr, ExceptHandler, FStringPart, FunctionDef, Stmt, Target,
    UnaryOp,
};
use super::lexer::{tokenize, Token};
use crate::Error;
use std::sync::Arc;

pub fn parse(source: &str, max_code_length: usize) -> crate::Result<Vec<Stmt>> {
    if source.len() > max_code_length {
        return Err(Error::interpreter(
            format!(
                "code block of {} characters exceeds the {max_code_length}-character limit",
                source.len()
            ),
            0,
        ));
    }
    let lexed = tokenize(source)?;
    let mut parser = Parser {
        tokens: lexed.tokens,
        lines: lexed.lines,
        pos: 0,
    };
    parser.parse_block_top()
}

struct Parser {
    tokens: Vec<Token>,
    lines: Vec<usize>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn line(&self) -> usize {
        self.lines.get(self.pos).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::interpreter(msg.into(), self.line())
    }

    fn expect_op(&mut self, op: &str) -> crate::Result<()> {
        match self.peek() {
            Token::Op(o) if *o == op => {
                self.advance();
                Ok(())
            }
            other => Err(self.err(format!("expected '{op}', found {other:?}"))),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> crate::Result<()> {
        match self.peek() {
            Token::Keyword(k) if *k == kw => {
                self.advance();
                Ok(())
            }
            other => Err(self.err(format!("expected keyword '{kw}', found {other:?}"))),
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Keyword(k) if *k == kw)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
    }

    fn parse_block_top(&mut self) -> crate::Result<Vec<Stmt>> {
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Token::Eof) {
            stmts.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(stmts)
    }

    /// Parses an indented block: INDENT stmt* DEDENT.
    fn parse_indented_block(&mut self) -> crate::Result<Vec<Stmt>> {
        self.skip_newlines();
        match self.peek() {
            Token::Indent => {
                self.advance();
            }
            other => return Err(self.err(format!("expected an indented block, found {other:?}"))),
        }
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Dedent) {
                self.advance();
                break;
            }
            if matches!(self.peek(), Token::Eof) {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> crate::Result<Stmt> {
        match self.peek().clone() {
            Token::Keyword("if") => self.parse_if(),
            Token::Keyword("for") => self.parse_for(),
            Token::Keyword("while") => self.parse_while(),
            Token::Keyword("def") => self.parse_def(false),
            Token::Keyword("async") => {
                self.advance();
                self.expect_keyword("def")?;
                self.parse_def(true)
            }
            Token::Keyword("return") => {
                self.advance();
                if matches!(self.peek(), Token::Newline | Token::Eof) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_tuple_or_expr()?)))
                }
            }
            Token::Keyword("break") => {
                self.advance();
                Ok(Stmt::Break)
            }
            Token::Keyword("continue") => {
                self.advance();
                Ok(Stmt::Continue)
            }
            Token::Keyword("pass") => {
                self.advance();
                Ok(Stmt::Pass)
            }
            Token::Keyword("raise") => {
                self.advance();
                if matches!(self.peek(), Token::Newline | Token::Eof) {
                    Ok(Stmt::Raise(None))
                } else {
                    Ok(Stmt::Raise(Some(self.parse_expr()?)))
                }
            }
            Token::Keyword("assert") => {
                self.advance();
                let test = self.parse_expr()?;
                let message = if self.at_op(",") {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::Assert { test, message })
            }
            Token::Keyword("import") => self.parse_import(),
            Token::Keyword("from") => self.parse_import_from(),
            Token::Keyword("try") => self.parse_try(),
            Token::Keyword("with") => self.parse_with(),
            Token::Keyword("class") => Err(self.err(
                "class definitions are not supported in sandboxed code".to_string(),
            )),
            Token::Name(name) if name == "final_answer" => self.parse_final_answer(),
            _ => self.parse_expr_or_assign(),
        }
    }

    fn parse_final_answer(&mut self) -> crate::Result<Stmt> {
        self.advance(); // name
        self.expect_op("(")?;
        let value = if self.at_op(")") {
            Expr::None
        } else {
            self.parse_expr()?
        };
        self.expect_op(")")?;
        Ok(Stmt::FinalAnswer(value))
    }

    fn parse_if(&mut self) -> crate::Result<Stmt> {
        self.advance(); // if
        let test = self.parse_expr()?;
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        let orelse = if self.at_keyword("elif") {
            vec![self.parse_if_as_elif()?]
        } else if self.at_keyword("else") {
            self.advance();
            self.expect_op(":")?;
            self.parse_indented_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn parse_if_as_elif(&mut self) -> crate::Result<Stmt> {
        self.advance(); // elif
        let test = self.parse_expr()?;
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        let orelse = if self.at_keyword("elif") {
            vec![self.parse_if_as_elif()?]
        } else if self.at_keyword("else") {
            self.advance();
            self.expect_op(":")?;
            self.parse_indented_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn parse_for(&mut self) -> crate::Result<Stmt> {
        self.advance(); // for
        let target = match self.advance() {
            Token::Name(n) => n,
            other => return Err(self.err(format!("expected loop variable name, found {other:?}"))),
        };
        self.expect_keyword("in")?;
        let iter = self.parse_expr()?;
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn parse_while(&mut self) -> crate::Result<Stmt> {
        self.advance(); // while
        let test = self.parse_expr()?;
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        Ok(Stmt::While { test, body })
    }

    fn parse_def(&mut self, is_async: bool) -> crate::Result<Stmt> {
        self.advance(); // def
        let name = match self.advance() {
            Token::Name(n) => n,
            other => return Err(self.err(format!("expected function name, found {other:?}"))),
        };
        self.expect_op("(")?;
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        while !self.at_op(")") {
            let pname = match self.advance() {
                Token::Name(n) => n,
                other => return Err(self.err(format!("expected parameter name, found {other:?}"))),
            };
            if self.at_op("=") {
                self.advance();
                let default = self.parse_expr()?;
                defaults.push((pname.clone(), default));
            }
            params.push(pname);
            if self.at_op(",") {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_op(")")?;
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        Ok(Stmt::FunctionDef(Arc::new(FunctionDef {
            name,
            params,
            defaults,
            body,
            is_async,
        })))
    }

    fn parse_import(&mut self) -> crate::Result<Stmt> {
        self.advance(); // import
        let module = self.parse_dotted_name()?;
        let alias = if self.at_keyword("as") {
            self.advance();
            match self.advance() {
                Token::Name(n) => Some(n),
                other => return Err(self.err(format!("expected alias name, found {other:?}"))),
            }
        } else {
            None
        };
        Ok(Stmt::Import { module, alias })
    }

    fn parse_import_from(&mut self) -> crate::Result<Stmt> {
        self.advance(); // from
        let module = self.parse_dotted_name()?;
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        loop {
            let name = match self.advance() {
                Token::Name(n) => n,
                Token::Op("*") => "*".to_string(),
                other => return Err(self.err(format!("expected imported name, found {other:?}"))),
            };
            let alias = if self.at_keyword("as") {
                self.advance();
                match self.advance() {
                    Token::Name(n) => Some(n),
                    other => return Err(self.err(format!("expected alias name, found {other:?}"))),
                }
            } else {
                None
            };
            names.push((name, alias));
            if self.at_op(",") {
                self.advance();
            } else {
                break;
            }
        }
        Ok(Stmt::ImportFrom { module, names })
    }

    fn parse_try(&mut self) -> crate::Result<Stmt> {
        self.advance(); // try
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            self.advance();
            let exc_type = if self.at_op(":") {
                None
            } else {
                match self.advance() {
                    Token::Name(n) => Some(n),
                    other => return Err(self.err(format!("expected exception type, found {other:?}"))),
                }
            };
            let binding = if self.at_keyword("as") {
                self.advance();
                match self.advance() {
                    Token::Name(n) => Some(n),
                    other => return Err(self.err(format!("expected binding name, found {other:?}"))),
                }
            } else {
                None
            };
            self.expect_op(":")?;
            let hbody = self.parse_indented_block()?;
            handlers.push(ExceptHandler {
                exc_type,
                binding,
                body: hbody,
            });
        }
        let orelse = if self.at_keyword("else") {
            self.advance();
            self.expect_op(":")?;
            self.parse_indented_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.at_keyword("finally") {
            self.advance();
            self.expect_op(":")?;
            self.parse_indented_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn parse_with(&mut self) -> crate::Result<Stmt> {
        self.advance(); // with
        let context = self.parse_expr()?;
        let binding = if self.at_keyword("as") {
            self.advance();
            match self.advance() {
                Token::Name(n) => Some(n),
                other => return Err(self.err(format!("expected binding name, found {other:?}"))),
            }
        } else {
            None
        };
        self.expect_op(":")?;
        let body = self.parse_indented_block()?;
        Ok(Stmt::With {
            context,
            binding,
            body,
        })
    }

    fn parse_dotted_name(&mut self) -> crate::Result<String> {
        let mut parts = Vec::new();
        loop {
            match self.advance() {
                Token::Name(n) => parts.push(n),
                other => return Err(self.err(format!("expected module name, found {other:?}"))),
            }
            if self.at_op(".") {
                self.advance();
            } else {
                break;
            }
        }
        Ok(parts.join("."))
    }

    fn parse_expr_or_assign(&mut self) -> crate::Result<Stmt> {
        let expr = self.parse_tuple_or_expr()?;
        if self.at_op("=") {
            self.advance();
            let target = expr_to_target(expr, &self.line())?;
            let value = self.parse_tuple_or_expr()?;
            return Ok(Stmt::Assign { target, value });
        }
        const AUG: &[(&str, BinaryOp)] = &[
            ("+=", BinaryOp::Add),
            ("-=", BinaryOp::Sub),
            ("*=", BinaryOp::Mul),
            ("/=", BinaryOp::Div),
            ("%=", BinaryOp::Mod),
            ("**=", BinaryOp::Pow),
            ("//=", BinaryOp::FloorDiv),
        ];
        if let Token::Op(op) = self.peek() {
            if let Some((_, bop)) = AUG.iter().find(|(o, _)| o == op) {
                let bop = *bop;
                self.advance();
                let target = expr_to_target(expr, &self.line())?;
                let value = self.parse_expr()?;
                return Ok(Stmt::AugAssign {
                    target,
                    op: bop,
                    value,
                });
            }
        }
        Ok(Stmt::Expr(expr))
    }

    // --- Expression grammar, lowest to highest precedence ---

    /// Parses a possibly comma-separated expression list with no enclosing
    /// brackets (`a, b = 1, 2`, `return a, b`), collapsing to a bare `Expr`
    /// when there's exactly one item and to `Expr::Tuple` otherwise.
    fn parse_tuple_or_expr(&mut self) -> crate::Result<Expr> {
        let first = self.parse_expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.at_op(",") {
            self.advance();
            if matches!(self.peek(), Token::Op("=") | Token::Newline | Token::Eof | Token::Op(":")) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_expr(&mut self) -> crate::Result<Expr> {
        let body = self.parse_or()?;
        if self.at_keyword("if") {
            self.advance();
            let test = self.parse_or()?;
            self.expect_keyword("else")?;
            let orelse = self.parse_expr()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> crate::Result<Expr> {
        let mut left = self.parse_and()?;
        if self.at_keyword("or") {
            let mut values = vec![left];
            while self.at_keyword("or") {
                self.advance();
                values.push(self.parse_and()?);
            }
            left = Expr::BoolOp {
                op: BoolOp::Or,
                values,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> crate::Result<Expr> {
        let mut left = self.parse_not()?;
        if self.at_keyword("and") {
            let mut values = vec![left];
            while self.at_keyword("and") {
                self.advance();
                values.push(self.parse_not()?);
            }
            left = Expr::BoolOp {
                op: BoolOp::And,
                values,
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> crate::Result<Expr> {
        if self.at_keyword("not") {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> crate::Result<Expr> {
        let left = self.parse_additive()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Op("==") => CompareOp::Eq,
                Token::Op("!=") => CompareOp::NotEq,
                Token::Op("<") => CompareOp::Lt,
                Token::Op("<=") => CompareOp::LtE,
                Token::Op(">") => CompareOp::Gt,
                Token::Op(">=") => CompareOp::GtE,
                Token::Keyword("in") => CompareOp::In,
                Token::Keyword("is") => {
                    self.advance();
                    ops.push(CompareOp::Eq);
                    comparators.push(self.parse_additive()?);
                    continue;
                }
                Token::Keyword("not") => {
                    // `not in`
                    let save = self.pos;
                    self.advance();
                    if self.at_keyword("in") {
                        self.advance();
                        ops.push(CompareOp::NotIn);
                        comparators.push(self.parse_additive()?);
                        continue;
                    }
                    self.pos = save;
                    break;
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_additive()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn parse_additive(&mut self) -> crate::Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinaryOp::Add,
                Token::Op("-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> crate::Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinaryOp::Mul,
                Token::Op("/") => BinaryOp::Div,
                Token::Op("//") => BinaryOp::FloorDiv,
                Token::Op("%") => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> crate::Result<Expr> {
        match self.peek() {
            Token::Keyword("await") => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Await(Box::new(operand)))
            }
            Token::Op("-") => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::Op("+") => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> crate::Result<Expr> {
        let left = self.parse_postfix()?;
        if self.at_op("**") {
            self.advance();
            let right = self.parse_unary()?;
            return Ok(Expr::BinaryOp {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> crate::Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::Op(".") => {
                    self.advance();
                    let attr = match self.advance() {
                        Token::Name(n) => n,
                        other => return Err(self.err(format!("expected attribute name, found {other:?}"))),
                    };
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                Token::Op("(") => {
                    self.advance();
                    let mut args = Vec::new();
                    let mut kwargs = Vec::new();
                    while !self.at_op(")") {
                        if let Token::Name(n) = self.peek().clone() {
                            if self.tokens.get(self.pos + 1) == Some(&Token::Op("=")) {
                                self.advance();
                                self.advance();
                                let value = self.parse_expr()?;
                                kwargs.push((n, value));
                                if self.at_op(",") {
                                    self.advance();
                                }
                                continue;
                            }
                        }
                        args.push(self.parse_expr()?);
                        if self.at_op(",") {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    self.expect_op(")")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::Op("[") => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect_op("]")?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses the `for target in iter [if cond]` tail shared by list, dict,
    /// and set comprehensions. Assumes the cursor is at `for`.
    fn parse_comprehension_clause(&mut self) -> crate::Result<(String, Expr, Option<Box<Expr>>)> {
        self.advance(); // for
        let target = match self.advance() {
            Token::Name(n) => n,
            other => return Err(self.err(format!("expected loop variable name, found {other:?}"))),
        };
        self.expect_keyword("in")?;
        let iter = self.parse_or()?;
        let condition = if self.at_keyword("if") {
            self.advance();
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };
        Ok((target, iter, condition))
    }

    fn parse_atom(&mut self) -> crate::Result<Expr> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Int(i)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::FStringStart => {
                // The following Str token holds the raw f-string body.
                match self.advance() {
                    Token::Str(raw) => Ok(Expr::FString(parse_fstring_parts(&raw)?)),
                    other => Err(self.err(format!("expected f-string body, found {other:?}"))),
                }
            }
            Token::Keyword("True") => Ok(Expr::Bool(true)),
            Token::Keyword("False") => Ok(Expr::Bool(false)),
            Token::Keyword("None") => Ok(Expr::None),
            Token::Name(n) => Ok(Expr::Name(n)),
            Token::Op("(") => {
                if self.at_op(")") {
                    self.advance();
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at_op(",") {
                    let mut items = vec![first];
                    while self.at_op(",") {
                        self.advance();
                        if self.at_op(")") {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    self.expect_op(")")?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect_op(")")?;
                Ok(first)
            }
            Token::Op("[") => {
                if self.at_op("]") {
                    self.advance();
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at_keyword("for") {
                    let (target, iter, condition) = self.parse_comprehension_clause()?;
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        element: Box::new(first),
                        target,
                        iter: Box::new(iter),
                        condition,
                    });
                }
                let mut items = vec![first];
                while self.at_op(",") {
                    self.advance();
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                if self.at_op("}") {
                    self.advance();
                    return Ok(Expr::Dict(Vec::new()));
                }
                let first_key = self.parse_expr()?;
                if self.at_op(":") {
                    self.advance();
                    let first_value = self.parse_expr()?;
                    if self.at_keyword("for") {
                        let (target, iter, condition) = self.parse_comprehension_clause()?;
                        self.expect_op("}")?;
                        return Ok(Expr::DictComp {
                            key: Box::new(first_key),
                            value: Box::new(first_value),
                            target,
                            iter: Box::new(iter),
                            condition,
                        });
                    }
                    let mut entries = vec![(first_key, first_value)];
                    while self.at_op(",") {
                        self.advance();
                        if self.at_op("}") {
                            break;
                        }
                        let k = self.parse_expr()?;
                        self.expect_op(":")?;
                        let v = self.parse_expr()?;
                        entries.push((k, v));
                    }
                    self.expect_op("}")?;
                    Ok(Expr::Dict(entries))
                } else if self.at_keyword("for") {
                    let (target, iter, condition) = self.parse_comprehension_clause()?;
                    self.expect_op("}")?;
                    Ok(Expr::SetComp {
                        element: Box::new(first_key),
                        target,
                        iter: Box::new(iter),
                        condition,
                    })
                } else {
                    let mut items = vec![first_key];
                    while self.at_op(",") {
                        self.advance();
                        if self.at_op("}") {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    self.expect_op("}")?;
                    Ok(Expr::Set(items))
                }
            }
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }
}

fn expr_to_target(expr: Expr, line: &usize) -> crate::Result<Target> {
    match expr {
        Expr::Name(n) => Ok(Target::Name(n)),
        Expr::Subscript { value, index } => Ok(Target::Subscript {
            value: *value,
            index: *index,
        }),
        Expr::Tuple(items) => Ok(Target::Tuple(
            items
                .into_iter()
                .map(|e| expr_to_target(e, line))
                .collect::<crate::Result<Vec<_>>>()?,
        )),
        _ => Err(Error::interpreter("invalid assignment target", *line)),
    }
}

/// Splits an f-string body into literal and `{expr}` parts, parsing each
/// expression part with a fresh sub-parser.
fn parse_fstring_parts(raw: &str) -> crate::Result<Vec<FStringPart>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if !literal.is_empty() {
                parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
            }
            let start = i + 1;
            let mut depth = 1;
            i += 1;
            while i < chars.len() && depth > 0 {
                match chars[i] {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    i += 1;
                }
            }
            let inner: String = chars[start..i].iter().collect();
            i += 1; // closing brace
            let lexed = tokenize(&format!("{inner}\n"))?;
            let mut sub = Parser {
                tokens: lexed.tokens,
                lines: lexed.lines,
                pos: 0,
            };
            let expr = sub.parse_expr()?;
            parts.push(FStringPart::Expr(expr));
        } else {
            literal.push(chars[i]);
            i += 1;
        }
    }
    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}
