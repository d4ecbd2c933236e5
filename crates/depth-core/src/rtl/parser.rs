//! Recursive descent parser producing a [`SourceUnit`]

use super::ast::*;
use super::lexer::{tokenize, Literal, Token, TokenKind};
use crate::error::{DepthError, Result};

/// Constructs recognized but outside the supported subset
const UNSUPPORTED: &[&str] = &[
    "generate", "genvar", "for", "while", "repeat", "forever", "fork", "interface", "package",
    "class", "program", "specify", "primitive",
];

pub fn parse(source: &str) -> Result<SourceUnit> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        nesting: 0,
    }
    .source_unit()
}

/// Deepest nesting of statements and parenthesized or unary expressions
const MAX_NESTING: usize = 256;

/// Tallest expression tree accepted; later passes walk expressions recursively
const MAX_EXPR_HEIGHT: usize = 1024;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_here(format!("nested deeper than {} levels", MAX_NESTING)));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        // The token stream always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> DepthError {
        let token = self.peek();
        DepthError::parse(token.line, token.column, message)
    }

    fn describe(kind: &TokenKind) -> String {
        match kind {
            TokenKind::Ident(s) | TokenKind::SystemIdent(s) => format!("'{}'", s),
            TokenKind::Number(_) => "number".to_string(),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Op(op) => format!("'{}'", op),
            TokenKind::Eof => "end of file".to_string(),
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Op(o) if *o == op)
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{}', found {}",
                op,
                Self::describe(&self.peek().kind)
            )))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{}', found {}",
                kw,
                Self::describe(&self.peek().kind)
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => {
                let found = Self::describe(other);
                Err(self.error_here(format!("expected identifier, found {}", found)))
            }
        }
    }

    fn reject_unsupported(&self) -> Result<()> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            if UNSUPPORTED.contains(&name.as_str()) {
                return Err(self.error_here(format!("unsupported construct '{}'", name)));
            }
        }
        Ok(())
    }

    // ---- structure -----------------------------------------------------

    fn source_unit(&mut self) -> Result<SourceUnit> {
        let mut modules = Vec::new();
        loop {
            if self.peek().kind == TokenKind::Eof {
                break;
            }
            self.reject_unsupported()?;
            if self.eat_keyword("module") || self.eat_keyword("macromodule") {
                modules.push(self.module()?);
            } else {
                return Err(self.error_here(format!(
                    "expected 'module', found {}",
                    Self::describe(&self.peek().kind)
                )));
            }
        }
        if modules.is_empty() {
            return Err(DepthError::parse(1, 1, "source contains no module"));
        }
        Ok(SourceUnit { modules })
    }

    fn module(&mut self) -> Result<ModuleDecl> {
        let line = self.peek().line;
        let name = self.expect_ident()?;
        let mut params = Vec::new();
        let mut ports = Vec::new();
        let mut items = Vec::new();

        if self.eat_op("#") {
            self.expect_op("(")?;
            if !self.is_op(")") {
                loop {
                    let local = self.is_keyword("localparam");
                    self.eat_keyword("parameter");
                    self.eat_keyword("localparam");
                    params.push(self.param_assignment(local)?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
            }
            self.expect_op(")")?;
        }

        if self.eat_op("(") {
            if !self.is_op(")") {
                if self.at_direction() {
                    self.ansi_ports(&mut ports, &mut items)?;
                } else {
                    loop {
                        ports.push(self.expect_ident()?);
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                }
            }
            self.expect_op(")")?;
        }
        self.expect_op(";")?;

        while !self.eat_keyword("endmodule") {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error_here(format!("module '{}' is missing 'endmodule'", name)));
            }
            self.module_item(&mut params, &mut items)?;
        }
        if self.eat_op(":") {
            self.expect_ident()?;
        }

        Ok(ModuleDecl {
            name,
            line,
            params,
            ports,
            items,
        })
    }

    fn at_direction(&self) -> bool {
        self.is_keyword("input") || self.is_keyword("output") || self.is_keyword("inout")
    }

    fn direction(&mut self) -> Option<Direction> {
        if self.eat_keyword("input") {
            Some(Direction::Input)
        } else if self.eat_keyword("output") {
            Some(Direction::Output)
        } else if self.eat_keyword("inout") {
            Some(Direction::Inout)
        } else {
            None
        }
    }

    fn net_kind(&mut self) -> Option<NetKind> {
        for (kw, kind) in [
            ("wire", NetKind::Wire),
            ("tri", NetKind::Wire),
            ("reg", NetKind::Reg),
            ("logic", NetKind::Logic),
            ("bit", NetKind::Logic),
            ("integer", NetKind::Integer),
            ("int", NetKind::Integer),
        ] {
            if self.eat_keyword(kw) {
                return Some(kind);
            }
        }
        None
    }

    fn optional_range(&mut self) -> Result<Option<Range>> {
        if !self.eat_op("[") {
            return Ok(None);
        }
        let msb = self.expr()?;
        self.expect_op(":")?;
        let lsb = self.expr()?;
        self.expect_op("]")?;
        Ok(Some(Range { msb, lsb }))
    }

    /// Unpacked array dimensions are accepted and ignored
    fn skip_unpacked_dims(&mut self) -> Result<()> {
        while self.is_op("[") {
            self.optional_range()?;
        }
        Ok(())
    }

    fn ansi_ports(&mut self, ports: &mut Vec<String>, items: &mut Vec<ModuleItem>) -> Result<()> {
        let mut direction = None;
        let mut kind = None;
        let mut range = None;
        let mut signed = false;
        loop {
            let (line, column) = (self.peek().line, self.peek().column);
            if let Some(dir) = self.direction() {
                direction = Some(dir);
                kind = self.net_kind();
                signed = self.eat_keyword("signed");
                range = self.optional_range()?;
            }
            let name = self.expect_ident()?;
            self.skip_unpacked_dims()?;
            ports.push(name.clone());
            items.push(ModuleItem::Decl(Declaration {
                name,
                direction,
                kind,
                range: range.clone(),
                signed,
                init: None,
                line,
                column,
            }));
            if !self.eat_op(",") {
                return Ok(());
            }
        }
    }

    fn param_assignment(&mut self, local: bool) -> Result<ParamDecl> {
        // Optional type and range are irrelevant to the value
        self.net_kind();
        self.eat_keyword("signed");
        self.eat_keyword("unsigned");
        self.optional_range()?;
        let name = self.expect_ident()?;
        self.expect_op("=")?;
        let value = self.expr()?;
        Ok(ParamDecl { name, value, local })
    }

    fn module_item(
        &mut self,
        params: &mut Vec<ParamDecl>,
        items: &mut Vec<ModuleItem>,
    ) -> Result<()> {
        self.reject_unsupported()?;
        let token = self.peek().clone();
        let keyword = match &token.kind {
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Op(";") => {
                self.advance();
                return Ok(());
            }
            other => {
                return Err(self.error_here(format!(
                    "unexpected {} in module body",
                    Self::describe(other)
                )))
            }
        };

        match keyword.as_str() {
            "input" | "output" | "inout" | "wire" | "tri" | "reg" | "logic" | "bit" | "integer"
            | "int" => self.declaration(items),
            "parameter" | "localparam" => {
                self.advance();
                let local = keyword == "localparam";
                loop {
                    let param = self.param_assignment(local)?;
                    params.push(param.clone());
                    items.push(ModuleItem::Param(param));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op(";")
            }
            "assign" => {
                self.advance();
                self.skip_delay()?;
                loop {
                    let line = self.peek().line;
                    let lhs = self.lvalue()?;
                    self.expect_op("=")?;
                    let rhs = self.expr()?;
                    items.push(ModuleItem::Assign { lhs, rhs, line });
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op(";")
            }
            "always" | "always_comb" | "always_ff" | "always_latch" => {
                self.advance();
                let kind = match keyword.as_str() {
                    "always_comb" => AlwaysKind::Comb,
                    "always_ff" => AlwaysKind::Ff,
                    "always_latch" => AlwaysKind::Latch,
                    _ => AlwaysKind::Always,
                };
                let sensitivity = if self.is_op("@") {
                    self.sensitivity()?
                } else if matches!(kind, AlwaysKind::Comb | AlwaysKind::Latch) {
                    Sensitivity::Star
                } else {
                    return Err(self.error_here("expected '@' after 'always'"));
                };
                let body = self.statement()?;
                items.push(ModuleItem::Always(AlwaysBlock {
                    kind,
                    sensitivity,
                    body,
                    line: token.line,
                }));
                Ok(())
            }
            "initial" | "final" => {
                self.advance();
                self.statement().map(|_| ())
            }
            "function" => self.skip_until_keyword("endfunction"),
            "task" => self.skip_until_keyword("endtask"),
            _ if matches!(self.peek_kind_at(1), TokenKind::Ident(_) | TokenKind::Op("#")) => {
                self.instances(items)
            }
            _ => Err(self.error_here(format!("unexpected '{}' in module body", keyword))),
        }
    }

    fn declaration(&mut self, items: &mut Vec<ModuleItem>) -> Result<()> {
        let direction = self.direction();
        let kind = self.net_kind();
        let signed = self.eat_keyword("signed");
        self.eat_keyword("unsigned");
        let range = self.optional_range()?;
        loop {
            let (line, column) = (self.peek().line, self.peek().column);
            let name = self.expect_ident()?;
            self.skip_unpacked_dims()?;
            let init = if self.eat_op("=") {
                Some(self.expr()?)
            } else {
                None
            };
            items.push(ModuleItem::Decl(Declaration {
                name,
                direction,
                kind,
                range: range.clone(),
                signed,
                init,
                line,
                column,
            }));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(";")
    }

    fn instances(&mut self, items: &mut Vec<ModuleItem>) -> Result<()> {
        let module = self.expect_ident()?;
        if self.eat_op("#") {
            // Parameter overrides do not change connectivity
            self.expect_op("(")?;
            self.skip_balanced(")")?;
        }
        loop {
            let line = self.peek().line;
            let name = self.expect_ident()?;
            self.skip_unpacked_dims()?;
            self.expect_op("(")?;
            let connections = self.connections()?;
            self.expect_op(")")?;
            items.push(ModuleItem::Instance(Instance {
                module: module.clone(),
                name,
                connections,
                line,
            }));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(";")
    }

    fn connections(&mut self) -> Result<Connections> {
        if self.is_op(")") {
            return Ok(Connections::Positional(Vec::new()));
        }
        if self.is_op(".") {
            let mut named = Vec::new();
            loop {
                self.expect_op(".")?;
                let port = self.expect_ident()?;
                let expr = if self.eat_op("(") {
                    let expr = if self.is_op(")") {
                        None
                    } else {
                        Some(self.expr()?)
                    };
                    self.expect_op(")")?;
                    expr
                } else {
                    // `.port` implicit connection
                    Some(Expr::Ident(port.clone()))
                };
                named.push((port, expr));
                if !self.eat_op(",") {
                    return Ok(Connections::Named(named));
                }
            }
        }
        let mut positional = Vec::new();
        loop {
            if self.is_op(",") || self.is_op(")") {
                positional.push(None);
            } else {
                positional.push(Some(self.expr()?));
            }
            if !self.eat_op(",") {
                return Ok(Connections::Positional(positional));
            }
        }
    }

    fn sensitivity(&mut self) -> Result<Sensitivity> {
        self.expect_op("@")?;
        if self.eat_op("*") {
            return Ok(Sensitivity::Star);
        }
        self.expect_op("(")?;
        if self.eat_op("*") {
            self.expect_op(")")?;
            return Ok(Sensitivity::Star);
        }
        let mut list = Vec::new();
        loop {
            let edge = if self.eat_keyword("posedge") {
                Some(Edge::Pos)
            } else if self.eat_keyword("negedge") {
                Some(Edge::Neg)
            } else {
                None
            };
            let expr = self.expr()?;
            list.push(SensItem { edge, expr });
            if !(self.eat_op(",") || self.eat_keyword("or")) {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Sensitivity::List(list))
    }

    fn skip_delay(&mut self) -> Result<()> {
        if self.eat_op("#") {
            if self.eat_op("(") {
                self.skip_balanced(")")?;
            } else {
                self.advance();
            }
        }
        Ok(())
    }

    /// Skip tokens up to and including the matching `close`
    fn skip_balanced(&mut self, close: &str) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match &self.peek().kind {
                TokenKind::Eof => return Err(self.error_here(format!("expected '{}'", close))),
                TokenKind::Op("(") | TokenKind::Op("[") | TokenKind::Op("{") => depth += 1,
                TokenKind::Op(op) if *op == close && depth == 0 => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::Op(")") | TokenKind::Op("]") | TokenKind::Op("}") => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_until_keyword(&mut self, end: &str) -> Result<()> {
        let start = self.advance();
        while !self.eat_keyword(end) {
            if self.peek().kind == TokenKind::Eof {
                return Err(DepthError::parse(
                    start.line,
                    start.column,
                    format!("missing '{}'", end),
                ));
            }
            self.advance();
        }
        Ok(())
    }

    // ---- statements ----------------------------------------------------

    fn statement(&mut self) -> Result<Statement> {
        self.nested(Self::statement_body)
    }

    fn statement_body(&mut self) -> Result<Statement> {
        self.reject_unsupported()?;
        if self.eat_op(";") {
            return Ok(Statement::Empty);
        }
        if self.is_op("#") {
            self.skip_delay()?;
            return self.statement();
        }
        if let TokenKind::SystemIdent(_) = self.peek().kind {
            // System tasks ($display, $finish, ...) have no hardware effect
            self.advance();
            if self.eat_op("(") {
                self.skip_balanced(")")?;
            }
            self.expect_op(";")?;
            return Ok(Statement::Empty);
        }
        if self.eat_keyword("begin") {
            if self.eat_op(":") {
                self.expect_ident()?;
            }
            let mut body = Vec::new();
            while !self.eat_keyword("end") {
                if self.peek().kind == TokenKind::Eof {
                    return Err(self.error_here("missing 'end'"));
                }
                if self.at_local_declaration() {
                    self.skip_local_declaration()?;
                    continue;
                }
                body.push(self.statement()?);
            }
            if self.eat_op(":") {
                self.expect_ident()?;
            }
            return Ok(Statement::Block(body));
        }
        if ["unique", "unique0", "priority"]
            .iter()
            .any(|kw| self.eat_keyword(kw))
        {
            return self.statement();
        }
        if self.eat_keyword("if") {
            self.expect_op("(")?;
            let cond = self.expr()?;
            self.expect_op(")")?;
            let then_branch = Box::new(self.statement()?);
            let else_branch = if self.eat_keyword("else") {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Statement::If {
                cond,
                then_branch,
                else_branch,
            });
        }
        if self.is_keyword("case") || self.is_keyword("casez") || self.is_keyword("casex") {
            self.advance();
            return self.case_statement();
        }

        let lhs = self.lvalue()?;
        let blocking = if self.eat_op("=") {
            true
        } else if self.eat_op("<=") {
            false
        } else {
            return Err(self.error_here(format!(
                "expected '=' or '<=', found {}",
                Self::describe(&self.peek().kind)
            )));
        };
        self.skip_delay()?;
        let rhs = self.expr()?;
        self.expect_op(";")?;
        Ok(Statement::Assign { lhs, rhs, blocking })
    }

    fn at_local_declaration(&self) -> bool {
        ["reg", "logic", "integer", "int", "bit"]
            .iter()
            .any(|kw| self.is_keyword(kw))
    }

    fn skip_local_declaration(&mut self) -> Result<()> {
        while !self.eat_op(";") {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error_here("expected ';'"));
            }
            self.advance();
        }
        Ok(())
    }

    fn case_statement(&mut self) -> Result<Statement> {
        self.expect_op("(")?;
        let selector = self.expr()?;
        self.expect_op(")")?;
        let mut items = Vec::new();
        let mut default = None;
        while !self.eat_keyword("endcase") {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error_here("missing 'endcase'"));
            }
            if self.eat_keyword("default") {
                self.eat_op(":");
                default = Some(Box::new(self.statement()?));
                continue;
            }
            let mut labels = Vec::new();
            loop {
                labels.push(self.expr()?);
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(":")?;
            let body = self.statement()?;
            items.push(CaseItem { labels, body });
        }
        Ok(Statement::Case {
            selector,
            items,
            default,
        })
    }

    // ---- expressions ---------------------------------------------------

    fn lvalue(&mut self) -> Result<Expr> {
        let (line, column) = (self.peek().line, self.peek().column);
        let (target, _) = self.postfix()?;
        if target.is_lvalue() {
            Ok(target)
        } else {
            Err(DepthError::parse(line, column, "invalid assignment target"))
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        Ok(self.expr_tree()?.0)
    }

    /// Rejects expressions taller than [`MAX_EXPR_HEIGHT`]
    fn node(&self, expr: Expr, height: usize) -> Result<(Expr, usize)> {
        if height > MAX_EXPR_HEIGHT {
            return Err(self.error_here(format!(
                "expression nested deeper than {} levels",
                MAX_EXPR_HEIGHT
            )));
        }
        Ok((expr, height))
    }

    /// Parses an expression along with the height of its tree
    fn expr_tree(&mut self) -> Result<(Expr, usize)> {
        self.nested(|p| {
            let (cond, cond_height) = p.binary(1)?;
            if !p.eat_op("?") {
                return Ok((cond, cond_height));
            }
            let (then_expr, then_height) = p.expr_tree()?;
            p.expect_op(":")?;
            let (else_expr, else_height) = p.expr_tree()?;
            let ternary = Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            };
            p.node(ternary, cond_height.max(then_height).max(else_height) + 1)
        })
    }

    fn peek_binary(&self) -> Option<(BinaryOp, u8)> {
        let op = match &self.peek().kind {
            TokenKind::Op(op) => *op,
            _ => return None,
        };
        let entry = match op {
            "||" => (BinaryOp::LogicalOr, 1),
            "&&" => (BinaryOp::LogicalAnd, 2),
            "|" => (BinaryOp::BitOr, 3),
            "^" => (BinaryOp::BitXor, 4),
            "~^" | "^~" => (BinaryOp::BitXnor, 4),
            "&" => (BinaryOp::BitAnd, 5),
            "==" => (BinaryOp::Eq, 6),
            "!=" => (BinaryOp::Ne, 6),
            "===" => (BinaryOp::CaseEq, 6),
            "!==" => (BinaryOp::CaseNe, 6),
            "<" => (BinaryOp::Lt, 7),
            "<=" => (BinaryOp::Le, 7),
            ">" => (BinaryOp::Gt, 7),
            ">=" => (BinaryOp::Ge, 7),
            "<<" => (BinaryOp::Shl, 8),
            ">>" => (BinaryOp::Shr, 8),
            "<<<" => (BinaryOp::AShl, 8),
            ">>>" => (BinaryOp::AShr, 8),
            "+" => (BinaryOp::Add, 9),
            "-" => (BinaryOp::Sub, 9),
            "*" => (BinaryOp::Mul, 10),
            "/" => (BinaryOp::Div, 10),
            "%" => (BinaryOp::Mod, 10),
            "**" => (BinaryOp::Pow, 11),
            _ => return None,
        };
        Some(entry)
    }

    fn binary(&mut self, min_prec: u8) -> Result<(Expr, usize)> {
        let (mut lhs, mut height) = self.unary()?;
        while let Some((op, prec)) = self.peek_binary() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let (rhs, rhs_height) = self.binary(prec + 1)?;
            let combined = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            (lhs, height) = self.node(combined, height.max(rhs_height) + 1)?;
        }
        Ok((lhs, height))
    }

    fn unary(&mut self) -> Result<(Expr, usize)> {
        let op = match &self.peek().kind {
            TokenKind::Op("+") => Some(UnaryOp::Plus),
            TokenKind::Op("-") => Some(UnaryOp::Minus),
            TokenKind::Op("!") => Some(UnaryOp::LogicalNot),
            TokenKind::Op("~") => Some(UnaryOp::BitNot),
            TokenKind::Op("&") => Some(UnaryOp::ReduceAnd),
            TokenKind::Op("|") => Some(UnaryOp::ReduceOr),
            TokenKind::Op("^") => Some(UnaryOp::ReduceXor),
            TokenKind::Op("~&") => Some(UnaryOp::ReduceNand),
            TokenKind::Op("~|") => Some(UnaryOp::ReduceNor),
            TokenKind::Op("~^") | TokenKind::Op("^~") => Some(UnaryOp::ReduceXnor),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let (operand, height) = self.nested(Self::unary)?;
                let unary = Expr::Unary {
                    op,
                    operand: Box::new(operand),
                };
                self.node(unary, height + 1)
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<(Expr, usize)> {
        let (mut expr, mut height) = self.primary()?;
        while self.eat_op("[") {
            let (first, first_height) = self.expr_tree()?;
            let (select, select_height) = if self.eat_op(":") {
                let (last, last_height) = self.expr_tree()?;
                (
                    Select::Part(Box::new(first), Box::new(last)),
                    first_height.max(last_height),
                )
            } else if self.eat_op("+:") || self.eat_op("-:") {
                let (width, width_height) = self.expr_tree()?;
                let select = Select::Indexed {
                    start: Box::new(first),
                    width: Box::new(width),
                };
                (select, first_height.max(width_height))
            } else {
                (Select::Bit(Box::new(first)), first_height)
            };
            self.expect_op("]")?;
            let selected = Expr::Select {
                base: Box::new(expr),
                select,
            };
            (expr, height) = self.node(selected, height.max(select_height) + 1)?;
        }
        Ok((expr, height))
    }

    /// Comma separated expressions and the tallest of them
    fn expr_list(&mut self, close: &str) -> Result<(Vec<Expr>, usize)> {
        let mut items = Vec::new();
        let mut height = 0;
        loop {
            let (item, item_height) = self.expr_tree()?;
            items.push(item);
            height = height.max(item_height);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(close)?;
        Ok((items, height))
    }

    fn call(&mut self, name: String) -> Result<(Expr, usize)> {
        let (args, height) = if self.eat_op(")") {
            (Vec::new(), 0)
        } else {
            self.expr_list(")")?
        };
        self.node(Expr::Call { name, args }, height + 1)
    }

    fn primary(&mut self) -> Result<(Expr, usize)> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(lit) => Ok((Expr::Number(lit), 1)),
            TokenKind::Str(_) => {
                let blank = Literal {
                    width: None,
                    value: None,
                };
                Ok((Expr::Number(blank), 1))
            }
            TokenKind::Ident(name) if !is_reserved(&name) => {
                if self.eat_op("(") {
                    self.call(name)
                } else {
                    Ok((Expr::Ident(name), 1))
                }
            }
            TokenKind::SystemIdent(name) => {
                if self.eat_op("(") {
                    self.call(name)
                } else {
                    Ok((Expr::Call { name, args: Vec::new() }, 1))
                }
            }
            TokenKind::Op("(") => {
                let inner = self.expr_tree()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            TokenKind::Op("{") => self.concat(),
            other => Err(DepthError::parse(
                token.line,
                token.column,
                format!("expected expression, found {}", Self::describe(&other)),
            )),
        }
    }

    /// Called after the opening `{`
    fn concat(&mut self) -> Result<(Expr, usize)> {
        let (first, first_height) = self.expr_tree()?;
        if self.eat_op("{") {
            let (items, items_height) = self.expr_list("}")?;
            self.expect_op("}")?;
            let replicate = Expr::Replicate {
                count: Box::new(first),
                items,
            };
            return self.node(replicate, first_height.max(items_height) + 1);
        }
        let mut items = vec![first];
        let mut height = first_height;
        if self.eat_op(",") {
            let (rest, rest_height) = self.expr_list("}")?;
            items.extend(rest);
            height = height.max(rest_height);
        } else {
            self.expect_op("}")?;
        }
        self.node(Expr::Concat(items), height + 1)
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "module"
            | "endmodule"
            | "input"
            | "output"
            | "inout"
            | "wire"
            | "reg"
            | "logic"
            | "assign"
            | "always"
            | "always_comb"
            | "always_ff"
            | "always_latch"
            | "begin"
            | "end"
            | "if"
            | "else"
            | "case"
            | "casez"
            | "casex"
            | "endcase"
            | "default"
            | "posedge"
            | "negedge"
            | "parameter"
            | "localparam"
            | "initial"
            | "function"
            | "endfunction"
            | "task"
            | "endtask"
    )
}
