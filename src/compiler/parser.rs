use crate::compiler::ast::*;
use crate::compiler::error::ParseError;
use crate::compiler::lexer::{Span, Token, TokenKind};

/// A recursive descent parser for sable.
pub struct Parser<'a> {
    filename: &'a str,
    tokens: Vec<Token>,
    current: usize,
}

impl<'a> Parser<'a> {
    pub fn new(filename: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            filename,
            tokens,
            current: 0,
        }
    }

    /// Parse a whole program into its top-level block.
    pub fn parse(&mut self) -> Result<Block, ParseError> {
        let span = self.current_span();
        let mut exprs = Vec::new();

        while !self.is_at_end() {
            exprs.push(self.expression()?);
            while self.match_token(&TokenKind::Semi) {}
        }

        Ok(Block { exprs, span })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut exprs = Vec::new();
        while self.match_token(&TokenKind::Semi) {}
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            exprs.push(self.expression()?);
            while self.match_token(&TokenKind::Semi) {}
        }

        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Block { exprs, span })
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.eq_expr()?;

        if self.match_token(&TokenKind::Eq) {
            let span = target.span();
            let value = self.assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
                span,
            });
        }

        Ok(target)
    }

    fn eq_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.cmp_expr()?;

        loop {
            let op = if self.match_token(&TokenKind::EqEq) {
                BinaryOp::Eq
            } else if self.match_token(&TokenKind::NotEq) {
                BinaryOp::Ne
            } else {
                break;
            };

            let right = self.cmp_expr()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.add_expr()?;

        loop {
            let op = if self.match_token(&TokenKind::Lt) {
                BinaryOp::Lt
            } else if self.match_token(&TokenKind::Le) {
                BinaryOp::Le
            } else if self.match_token(&TokenKind::Gt) {
                BinaryOp::Gt
            } else if self.match_token(&TokenKind::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };

            let right = self.add_expr()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.mul_expr()?;

        loop {
            let op = if self.match_token(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_token(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };

            let right = self.mul_expr()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary_expr()?;

        loop {
            let op = if self.match_token(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.match_token(&TokenKind::Slash) {
                BinaryOp::Div
            } else {
                break;
            };

            let right = self.unary_expr()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();

        let op = if self.match_token(&TokenKind::Minus) {
            UnaryOp::Neg
        } else if self.match_token(&TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.call_expr();
        };

        let operand = self.unary_expr()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    /// A `(` starts a call only on the line where the callee ends.
    fn call_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        while self.call_paren_follows() {
            self.advance();
            let args = self.arguments()?;
            let span = expr.span();
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
                span,
            };
        }

        Ok(expr)
    }

    fn call_paren_follows(&self) -> bool {
        let same_line = self.current_span().line == self.previous_span().line;
        self.check(&TokenKind::LParen) && same_line
    }

    /// Comma-separated expressions up to and including the closing `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if !self.check(&TokenKind::RParen) {
            args.push(self.expression()?);
            while self.match_token(&TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }

        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();

        let literal = match self.peek_kind() {
            Some(TokenKind::Int(value)) => Some(Literal::Int(*value)),
            Some(TokenKind::Float(value)) => Some(Literal::Float(*value)),
            Some(TokenKind::Str(value)) => Some(Literal::Str(value.clone())),
            Some(TokenKind::True) => Some(Literal::Bool(true)),
            Some(TokenKind::False) => Some(Literal::Bool(false)),
            Some(TokenKind::Nil) => Some(Literal::Unit),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::Literal { value, span });
        }

        if let Some(TokenKind::Ident(name)) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            return Ok(Expr::Ident { name, span });
        }

        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            Some(TokenKind::LBrace) => Ok(Expr::Block(self.block()?)),
            Some(TokenKind::If) => self.if_expr(),
            Some(TokenKind::While) => self.while_expr(),
            Some(TokenKind::Fn) => Ok(Expr::FnDef(self.fn_def()?)),
            Some(TokenKind::Try) => self.try_expr(),
            Some(TokenKind::Do) => self.do_expr(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn fn_def(&mut self) -> Result<FnDef, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::Fn, "'fn'")?;

        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.expect_ident()?);
            while self.match_token(&TokenKind::Comma) {
                params.push(self.expect_ident()?);
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;

        let body = self.block()?;

        Ok(FnDef {
            name,
            params,
            body,
            span,
        })
    }

    fn if_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::If, "'if'")?;

        let condition = self.expression()?;
        let then_block = self.block()?;

        let else_branch = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.if_expr()?))
            } else {
                Some(Box::new(Expr::Block(self.block()?)))
            }
        } else {
            None
        };

        Ok(Expr::If {
            condition: Box::new(condition),
            then_block,
            else_branch,
            span,
        })
    }

    fn while_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::While, "'while'")?;

        let condition = self.expression()?;
        let body = self.block()?;

        Ok(Expr::While {
            condition: Box::new(condition),
            body,
            span,
        })
    }

    fn try_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::Try, "'try'")?;

        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Handle) {
            let clause_span = self.current_span();
            self.advance();
            let effect = self.expect_ident()?;
            self.expect(&TokenKind::LParen, "'('")?;
            let param = self.expect_ident()?;
            self.expect(&TokenKind::RParen, "')'")?;
            let body = self.block()?;
            handlers.push(HandleClause {
                effect,
                param,
                body,
                span: clause_span,
            });
        }

        if handlers.is_empty() {
            return Err(self.error("expected 'handle' after try block"));
        }

        Ok(Expr::Try {
            body,
            handlers,
            span,
        })
    }

    /// `do effect(payload)`; the payload and the parentheses are optional.
    fn do_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();
        self.expect(&TokenKind::Do, "'do'")?;

        let effect = self.expect_ident()?;
        let mut payload = None;
        if self.call_paren_follows() {
            self.advance();
            if !self.check(&TokenKind::RParen) {
                payload = Some(Box::new(self.expression()?));
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        Ok(Expr::Do {
            effect,
            payload,
            span,
        })
    }

    // Helper methods

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens.get(self.current - 1)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        if let Some(TokenKind::Ident(name)) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("expected identifier"))
        }
    }

    fn current_span(&self) -> Span {
        self.peek().map(|t| t.span).unwrap_or(Span::new(1, 1))
    }

    fn previous_span(&self) -> Span {
        self.tokens
            .get(self.current.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(Span::new(1, 1))
    }

    fn error(&self, message: &str) -> ParseError {
        let span = self.current_span();
        let found = match self.peek_kind() {
            Some(TokenKind::Eof) | None => "end of input".to_string(),
            Some(kind) => format!("{:?}", kind),
        };
        ParseError::new(
            format!("{}, found {}", message, found),
            self.filename,
            span.line,
            span.column,
        )
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span();
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse(source: &str) -> Result<Block, ParseError> {
        let mut lexer = Lexer::new("test.sbl", source);
        let tokens = lexer.scan_tokens()?;
        let mut parser = Parser::new("test.sbl", tokens);
        parser.parse()
    }

    fn operands(expr: &Expr) -> (BinaryOp, &Expr) {
        match expr {
            Expr::Binary { op, left, .. } => (*op, left.as_ref()),
            other => panic!("expected binary expression, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment() {
        let program = parse("x = 1 + 2").unwrap();
        assert_eq!(program.exprs.len(), 1);
        match &program.exprs[0] {
            Expr::Assign { target, value, .. } => {
                assert!(matches!(target.as_ref(), Expr::Ident { name, .. } if name == "x"));
                assert_eq!(operands(value).0, BinaryOp::Add);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_function_definition() {
        let program = parse("fn add(a, b) { a + b }").unwrap();
        match &program.exprs[0] {
            Expr::FnDef(def) => {
                assert_eq!(def.name, "add");
                assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(def.body.exprs.len(), 1);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3 < 10 == true").unwrap();
        let (op, left) = operands(&program.exprs[0]);
        assert_eq!(op, BinaryOp::Eq);
        let (op, left) = operands(left);
        assert_eq!(op, BinaryOp::Lt);
        assert_eq!(operands(left).0, BinaryOp::Add);
    }

    #[test]
    fn test_curried_call() {
        let program = parse("f(1)(2)").unwrap();
        match &program.exprs[0] {
            Expr::Call { callee, args, .. } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(callee.as_ref(), Expr::Call { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_paren_on_next_line_is_not_a_call() {
        let program = parse("f\n(1)").unwrap();
        assert_eq!(program.exprs.len(), 2);
        assert!(matches!(program.exprs[0], Expr::Ident { .. }));
    }

    #[test]
    fn test_separators() {
        let program = parse("a = 1; b = 2;;\nc").unwrap();
        assert_eq!(program.exprs.len(), 3);
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if a { 1 } else if b { 2 } else { 3 }").unwrap();
        match &program.exprs[0] {
            Expr::If { else_branch, .. } => {
                let branch = else_branch.as_deref().unwrap();
                assert!(matches!(branch, Expr::If { else_branch, .. } if else_branch.is_some()));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_try_handle() {
        let source = "try { do ask() } handle ask(x) { resume(1) } handle log(m) { nil }";
        let program = parse(source).unwrap();
        match &program.exprs[0] {
            Expr::Try { body, handlers, .. } => {
                assert!(matches!(body.exprs[0], Expr::Do { payload: None, .. }));
                let names: Vec<&str> = handlers.iter().map(|h| h.effect.as_str()).collect();
                assert_eq!(names, vec!["ask", "log"]);
                assert_eq!(handlers[0].param, "x");
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_try_requires_handler() {
        let err = parse("try { 1 }").unwrap_err();
        assert!(err.message.starts_with("expected 'handle' after try block"));
    }

    #[test]
    fn test_spans() {
        let program = parse("x = 1\n\n  y").unwrap();
        assert_eq!(program.exprs[1].span(), Span::new(3, 3));
    }

    #[test]
    fn test_error_location() {
        let err = parse("fn f( { }").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 7);
        assert_eq!(err.message, "expected identifier, found LBrace");
    }
}
