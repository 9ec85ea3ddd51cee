use super::lexer::{Lexer, Token, TokenKind};
use super::ParsingError;
use crate::ast::{
    AssignOp, Ast, BinaryOp, Component, Expression, NodeId, Parameter, Statement,
};
use crate::{Primitive, Span, Type};

type Result<T> = std::result::Result<T, ParsingError>;

/// A recursive descent parser over the token stream.
///
/// Nodes are allocated in the [Ast] arena with their parent id known up
/// front: a production reserves its own slot first, parses its children
/// against that id and only then fills the slot in. Speculative productions
/// snapshot the lexer, the lookahead token and the arena length and roll all
/// three back on failure.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    lookahead: Option<Token>,
    ast: Ast,

    /// Set while parsing the header expression of a control flow construct,
    /// where a following `{` opens the construct's block rather than a
    /// struct instantiation
    in_control_header: bool,

    source_len: usize,
}

struct Checkpoint<'src> {
    lexer: Lexer<'src>,
    lookahead: Option<Token>,
    nodes: usize,
    in_control_header: bool,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(source),
            lookahead: None,
            ast: Ast::new(),
            in_control_header: false,
            source_len: source.len(),
        }
    }

    pub fn parse(mut self) -> Result<Ast> {
        self.advance()?;

        let program = self.ast.reserve(None);
        let mut body = Vec::new();
        while self.lookahead.is_some() {
            body.push(self.statement(program)?);
        }
        self.ast.complete(program, Component::Program { body });

        Ok(self.ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.lookahead = self.lexer.next_token()?;
        Ok(())
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.lookahead.as_ref().map(|token| token.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// The token after the current lookahead, read through a throwaway lexer
    fn peek_second(&self) -> Option<Token> {
        self.lexer.clone().next_token().ok().flatten()
    }

    fn eat(&mut self, kind: TokenKind) -> Result<Token> {
        match self.lookahead.take() {
            None => Err(ParsingError::UnexpectedEndOfInput {
                expected: kind.describe().to_string(),
                span: Span::marker(self.source_len),
            }),
            Some(token) if token.kind == kind => {
                self.advance()?;
                Ok(token)
            }
            Some(token) => {
                let err = ParsingError::UnexpectedToken {
                    token: token.text.clone(),
                    expected: kind.describe().to_string(),
                    span: token.span,
                };
                self.lookahead = Some(token);
                Err(err)
            }
        }
    }

    fn unexpected(&self, expected: &str) -> ParsingError {
        match &self.lookahead {
            Some(token) => ParsingError::UnexpectedToken {
                token: token.text.clone(),
                expected: expected.to_string(),
                span: token.span,
            },
            None => ParsingError::UnexpectedEndOfInput {
                expected: expected.to_string(),
                span: Span::marker(self.source_len),
            },
        }
    }

    fn checkpoint(&self) -> Checkpoint<'src> {
        Checkpoint {
            lexer: self.lexer.clone(),
            lookahead: self.lookahead.clone(),
            nodes: self.ast.len(),
            in_control_header: self.in_control_header,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<'src>) {
        self.lexer = checkpoint.lexer;
        self.lookahead = checkpoint.lookahead;
        self.ast.truncate(checkpoint.nodes);
        self.in_control_header = checkpoint.in_control_header;
    }

    /// Run a production speculatively; a parse failure rolls everything back
    /// and yields `None` instead of an error
    fn optionally<T>(&mut self, production: impl FnOnce(&mut Self) -> Result<T>) -> Option<T> {
        let checkpoint = self.checkpoint();
        match production(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.restore(checkpoint);
                None
            }
        }
    }

    /// Try two productions in order; the first that parses wins
    fn either<T>(
        &mut self,
        first: impl FnOnce(&mut Self) -> Result<T>,
        second: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        match self.optionally(first) {
            Some(value) => Ok(value),
            None => second(self),
        }
    }

    fn finish(&mut self, id: NodeId, component: Component, span: Span) {
        self.ast.complete(id, component);
        self.ast.set_span(id, span);
    }

    /* ------------------------------ statements ------------------------------ */

    fn statement(&mut self, parent: NodeId) -> Result<NodeId> {
        // struct instantiation suppression does not leak into nested statements
        let saved = std::mem::replace(&mut self.in_control_header, false);
        let result = self.statement_inner(parent);
        self.in_control_header = saved;
        result
    }

    fn statement_inner(&mut self, parent: NodeId) -> Result<NodeId> {
        let public = self.optionally(|p| p.eat(TokenKind::Pub)).is_some();

        let Some(kind) = self.peek_kind() else {
            return Err(self.unexpected("a statement"));
        };

        match kind {
            TokenKind::Semicolon => self.empty_statement(parent),
            TokenKind::NativeCode => self.native_code_statement(parent),
            TokenKind::BraceOpen => self.block_statement(parent),
            TokenKind::Take => self.take_statement(parent),
            TokenKind::If => self.if_statement(parent),
            TokenKind::Fn => self.function_declaration(parent, public),
            TokenKind::LoopOver => self.loop_over_statement(parent),
            TokenKind::Loop => self.loop_statement(parent),
            TokenKind::Return => self.return_statement(parent),
            TokenKind::Fire => self.fire_statement(parent),
            TokenKind::Continue => self.continue_statement(parent),
            TokenKind::Break => self.break_statement(parent),
            TokenKind::Defer => self.defer_statement(parent),
            TokenKind::Interface => self.aggregate_declaration(parent, TokenKind::Interface),
            TokenKind::Struct => self.aggregate_declaration(parent, TokenKind::Struct),
            TokenKind::Let | TokenKind::LetMut => self.variable_declaration(parent, public),
            TokenKind::Identifier => {
                // telling `name = ...` apart from an expression statement
                // needs one token more than the parser keeps around
                let second = self.peek_second().map(|token| token.kind);
                if matches!(
                    second,
                    Some(TokenKind::SimpleAssign | TokenKind::ComplexAssign)
                ) {
                    self.assignment_statement(parent)
                } else {
                    self.expression_statement(parent)
                }
            }
            _ => self.expression_statement(parent),
        }
    }

    fn statement_list(&mut self, parent: NodeId, stop: TokenKind) -> Result<Vec<NodeId>> {
        let mut statements = vec![self.statement(parent)?];
        while self.lookahead.is_some() && !self.at(stop) {
            statements.push(self.statement(parent)?);
        }
        Ok(statements)
    }

    fn empty_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Semicolon)?;
        let id = self.ast.reserve(Some(parent));
        self.finish(id, Component::Statement(Statement::Empty), token.span);
        Ok(id)
    }

    fn expression_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let id = self.ast.reserve(Some(parent));
        let expression = self.expression(id)?;
        let semicolon = self.eat(TokenKind::Semicolon)?;
        let span = self.ast.span(expression).unwrap_or(semicolon.span);
        self.finish(
            id,
            Component::Statement(Statement::Expression { expression }),
            span,
        );
        Ok(id)
    }

    fn block_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::BraceOpen)?;
        let id = self.ast.reserve(Some(parent));
        let body = if self.at(TokenKind::BraceClose) {
            Vec::new()
        } else {
            self.statement_list(id, TokenKind::BraceClose)?
        };
        self.eat(TokenKind::BraceClose)?;
        self.finish(id, Component::Statement(Statement::Block { body }), token.span);
        Ok(id)
    }

    fn take_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Take)?;
        let id = self.ast.reserve(Some(parent));
        let value = self.expression(id)?;
        self.eat(TokenKind::Semicolon)?;
        self.finish(id, Component::Statement(Statement::Take { value }), token.span);
        Ok(id)
    }

    fn return_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Return)?;
        let id = self.ast.reserve(Some(parent));
        let value = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression(id)?)
        };
        self.eat(TokenKind::Semicolon)?;
        self.finish(id, Component::Statement(Statement::Return { value }), token.span);
        Ok(id)
    }

    fn break_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Break)?;
        self.eat(TokenKind::Semicolon)?;
        let id = self.ast.reserve(Some(parent));
        self.finish(id, Component::Statement(Statement::Break), token.span);
        Ok(id)
    }

    fn continue_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Continue)?;
        self.eat(TokenKind::Semicolon)?;
        let id = self.ast.reserve(Some(parent));
        self.finish(id, Component::Statement(Statement::Continue), token.span);
        Ok(id)
    }

    fn if_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::If)?;
        let id = self.ast.reserve(Some(parent));
        let condition = self.control_header_expression(id)?;
        let then = self.block_statement(id)?;
        let otherwise = if self.optionally(|p| p.eat(TokenKind::Else)).is_some() {
            Some(self.block_statement(id)?)
        } else {
            None
        };
        self.finish(
            id,
            Component::Statement(Statement::If {
                condition,
                then,
                otherwise,
            }),
            token.span,
        );
        Ok(id)
    }

    fn loop_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Loop)?;
        let id = self.ast.reserve(Some(parent));

        let (condition, body) = match self.optionally(|p| p.block_statement(id)) {
            Some(body) => {
                // a bodiless condition defaults to `true`
                let condition = self.ast.reserve(Some(id));
                self.finish(condition, Component::Expression(Expression::Bool(true)), token.span);
                (condition, body)
            }
            None => {
                let condition = self.control_header_expression(id)?;
                let body = self.block_statement(id)?;
                (condition, body)
            }
        };

        self.finish(
            id,
            Component::Statement(Statement::Loop { condition, body }),
            token.span,
        );
        Ok(id)
    }

    fn loop_over_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::LoopOver)?;
        let id = self.ast.reserve(Some(parent));
        let iterable = self.control_header_expression(id)?;
        let alias = self
            .optionally(|p| {
                p.eat(TokenKind::As)?;
                p.eat(TokenKind::Identifier)
            })
            .map(|token| token.text)
            .unwrap_or_else(|| String::from("it"));
        let body = self.block_statement(id)?;
        self.finish(
            id,
            Component::Statement(Statement::LoopOver {
                iterable,
                alias,
                body,
            }),
            token.span,
        );
        Ok(id)
    }

    fn fire_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Fire)?;
        let id = self.ast.reserve(Some(parent));
        let call = self.expression(id)?;
        if !matches!(
            self.ast.component(call),
            Component::Expression(Expression::Call { .. })
        ) {
            return Err(ParsingError::Custom {
                msg: String::from("Expected a function call after 'fire'"),
                span: self.ast.span(call).unwrap_or(token.span),
            });
        }
        self.eat(TokenKind::Semicolon)?;
        self.finish(id, Component::Statement(Statement::Fire { call }), token.span);
        Ok(id)
    }

    fn defer_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Defer)?;
        let id = self.ast.reserve(Some(parent));
        let statement = self.statement(id)?;
        self.finish(
            id,
            Component::Statement(Statement::Defer { statement }),
            token.span,
        );
        Ok(id)
    }

    fn native_code_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::NativeCode)?;
        let id = self.ast.reserve(Some(parent));
        self.eat(TokenKind::Exposing)?;
        self.eat(TokenKind::ParenOpen)?;
        let exposing = self.parameter_list()?;
        self.eat(TokenKind::ParenClose)?;
        self.eat(TokenKind::Semicolon)?;
        self.finish(
            id,
            Component::Statement(Statement::NativeCode {
                code: token.text,
                exposing,
            }),
            token.span,
        );
        Ok(id)
    }

    fn variable_declaration(&mut self, parent: NodeId, public: bool) -> Result<NodeId> {
        let token = self.either(
            |p| p.eat(TokenKind::LetMut),
            |p| p.eat(TokenKind::Let),
        )?;
        let mutable = token.kind == TokenKind::LetMut;
        let id = self.ast.reserve(Some(parent));
        let name = self.eat(TokenKind::Identifier)?.text;
        let declared = self.type_annotation()?;
        let value = if self.optionally(|p| p.eat(TokenKind::SimpleAssign)).is_some() {
            Some(self.expression(id)?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        self.finish(
            id,
            Component::Statement(Statement::VariableDeclaration {
                name,
                declared,
                value,
                mutable,
                public,
            }),
            token.span,
        );
        Ok(id)
    }

    fn assignment_statement(&mut self, parent: NodeId) -> Result<NodeId> {
        let id = self.ast.reserve(Some(parent));
        let target = self.identifier_expression(id)?;
        let token = self.either(
            |p| p.eat(TokenKind::SimpleAssign),
            |p| p.eat(TokenKind::ComplexAssign),
        )?;
        let operator = AssignOp::from_symbol(&token.text).ok_or(ParsingError::Custom {
            msg: format!("Unknown assignment operator '{}'", token.text),
            span: token.span,
        })?;
        let value = self.expression(id)?;
        self.eat(TokenKind::Semicolon)?;
        self.finish(
            id,
            Component::Statement(Statement::Assignment {
                target,
                operator,
                value,
            }),
            token.span,
        );
        Ok(id)
    }

    fn function_declaration(&mut self, parent: NodeId, public: bool) -> Result<NodeId> {
        let token = self.eat(TokenKind::Fn)?;
        let id = self.ast.reserve(Some(parent));
        let name = self.eat(TokenKind::Identifier)?.text;
        self.eat(TokenKind::ParenOpen)?;
        let params = self.parameter_list()?;
        self.eat(TokenKind::ParenClose)?;
        let return_type = self.type_annotation()?.unwrap_or(Type::Empty);
        let body = self.block_statement(id)?;
        self.finish(
            id,
            Component::Statement(Statement::FunctionDeclaration {
                name,
                params,
                return_type,
                body,
                public,
            }),
            token.span,
        );
        Ok(id)
    }

    fn aggregate_declaration(&mut self, parent: NodeId, keyword: TokenKind) -> Result<NodeId> {
        let token = self.eat(keyword)?;
        let id = self.ast.reserve(Some(parent));
        let name = self.eat(TokenKind::Identifier)?.text;

        let mut implements = Vec::new();
        if self.optionally(|p| p.eat(TokenKind::Impl)).is_some() {
            loop {
                self.optionally(|p| p.eat(TokenKind::Comma));
                implements.push(self.eat(TokenKind::Identifier)?.text);
                if !self.at(TokenKind::Comma) {
                    break;
                }
            }
        }

        let mut attributes = Vec::new();
        self.eat(TokenKind::BraceOpen)?;
        while self.lookahead.is_some() && !self.at(TokenKind::BraceClose) {
            let attribute = self.eat(TokenKind::Identifier)?.text;
            let ty = match self.type_annotation()? {
                Some(ty) => ty,
                None => return Err(self.unexpected("a type")),
            };
            self.eat(TokenKind::Semicolon)?;
            attributes.push((attribute, ty));
        }
        self.eat(TokenKind::BraceClose)?;

        let component = if keyword == TokenKind::Struct {
            Statement::StructDeclaration {
                name,
                implements,
                attributes,
            }
        } else {
            Statement::InterfaceDeclaration {
                name,
                implements,
                attributes,
            }
        };
        self.finish(id, Component::Statement(component), token.span);
        Ok(id)
    }

    /* -------------------------------- types -------------------------------- */

    /// An optional type annotation; yields `None` when the lookahead cannot
    /// start a type
    fn type_annotation(&mut self) -> Result<Option<Type>> {
        match self.peek_kind() {
            Some(TokenKind::Primitive) => {
                let token = self.eat(TokenKind::Primitive)?;
                let primitive =
                    Primitive::from_name(&token.text).ok_or(ParsingError::Custom {
                        msg: format!("Unknown primitive type '{}'", token.text),
                        span: token.span,
                    })?;
                Ok(Some(Type::Primitive(primitive)))
            }
            Some(TokenKind::ParenOpen) => self.function_type().map(Some),
            Some(TokenKind::Identifier) => {
                let token = self.eat(TokenKind::Identifier)?;
                Ok(Some(Type::Named(token.text)))
            }
            _ => Ok(None),
        }
    }

    fn function_type(&mut self) -> Result<Type> {
        self.eat(TokenKind::ParenOpen)?;
        let params = self.parameter_list()?;
        self.eat(TokenKind::ParenClose)?;
        let ret = self.type_annotation()?.unwrap_or(Type::Empty);
        Ok(Type::Function {
            params: params.into_iter().map(|param| param.ty).collect(),
            ret: Box::new(ret),
        })
    }

    fn parameter_list(&mut self) -> Result<Vec<Parameter>> {
        let mut params = Vec::new();
        while self.at(TokenKind::Identifier) {
            let name = self.eat(TokenKind::Identifier)?.text;
            let ty = match self.type_annotation()? {
                Some(ty) => ty,
                None => return Err(self.unexpected("a type")),
            };
            params.push(Parameter {
                name,
                ty,
                mutable: false,
            });
            if self.optionally(|p| p.eat(TokenKind::Comma)).is_none() {
                break;
            }
        }
        Ok(params)
    }

    /* ----------------------------- expressions ----------------------------- */

    /// Parse a control flow header (if/loop condition, loop-over iterable):
    /// a `{` directly after it opens the construct's block
    fn control_header_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let saved = std::mem::replace(&mut self.in_control_header, true);
        let result = self.expression(parent);
        self.in_control_header = saved;
        result
    }

    /// Parse in a nested delimited context (call arguments, index
    /// expressions, field values) where struct instantiation is legal again
    fn nested_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let saved = std::mem::replace(&mut self.in_control_header, false);
        let result = self.expression(parent);
        self.in_control_header = saved;
        result
    }

    fn expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.logical_misc_expression(parent)
    }

    fn logical_misc_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::LogicalMisc, Self::logical_or_expression)
    }

    fn logical_or_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::LogicalOr, Self::logical_and_expression)
    }

    fn logical_and_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::LogicalAnd, Self::equality_expression)
    }

    fn equality_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::Equality, Self::relational_expression)
    }

    fn relational_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::Relational, Self::additive_expression)
    }

    fn additive_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::Additive, Self::multiplicative_expression)
    }

    fn multiplicative_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.binary_expression(parent, TokenKind::Multiplicative, Self::primary_expression)
    }

    /// Fold same-precedence operators into a left-leaning chain
    fn binary_expression(
        &mut self,
        parent: NodeId,
        operator_kind: TokenKind,
        next: fn(&mut Self, NodeId) -> Result<NodeId>,
    ) -> Result<NodeId> {
        let mut left = next(self, parent)?;

        while self.at(operator_kind) {
            let token = self.eat(operator_kind)?;
            let operator = BinaryOp::from_symbol(&token.text).ok_or(ParsingError::Custom {
                msg: format!("Unknown operator '{}'", token.text),
                span: token.span,
            })?;

            let id = self.ast.reserve(Some(parent));
            self.ast.set_parent(left, id);
            let right = next(self, id)?;
            self.finish(
                id,
                Component::Expression(Expression::Binary {
                    operator,
                    left,
                    right,
                }),
                token.span,
            );
            left = id;
        }

        Ok(left)
    }

    fn primary_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let base = self.primary_base(parent)?;
        self.postfix(parent, base, true)
    }

    /// The right-hand side of a pipe: a primary whose own postfix chain
    /// stops at the next `->`
    fn pipe_target(&mut self, parent: NodeId) -> Result<NodeId> {
        let base = self.primary_base(parent)?;
        self.postfix(parent, base, false)
    }

    fn primary_base(&mut self, parent: NodeId) -> Result<NodeId> {
        match self.peek_kind() {
            Some(TokenKind::ParenOpen) => self.parenthesized_expression(parent),
            Some(TokenKind::Do) => self.block_expression(parent),
            Some(TokenKind::If) => self.if_expression(parent),
            Some(TokenKind::Fn) => self.function_expression(parent),
            Some(TokenKind::Identifier) => self.identifier_expression(parent),
            _ => self.literal(parent),
        }
    }

    fn postfix(&mut self, parent: NodeId, mut expr: NodeId, allow_pipe: bool) -> Result<NodeId> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => expr = self.member_expression(parent, expr)?,
                Some(TokenKind::ParenOpen) => expr = self.function_call(parent, expr)?,
                Some(TokenKind::BracketOpen) => expr = self.index_expression(parent, expr)?,
                Some(TokenKind::Arrow) if allow_pipe => {
                    expr = self.piped_call(parent, expr)?;
                    break;
                }
                Some(TokenKind::BraceOpen) if !self.in_control_header => {
                    expr = self.struct_instantiation(parent, expr)?;
                    break;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parenthesized_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        self.eat(TokenKind::ParenOpen)?;
        let expr = self.expression(parent)?;
        self.eat(TokenKind::ParenClose)?;
        Ok(expr)
    }

    fn identifier_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Identifier)?;
        let id = self.ast.reserve(Some(parent));
        self.finish(
            id,
            Component::Expression(Expression::Identifier(token.text)),
            token.span,
        );
        Ok(id)
    }

    fn literal(&mut self, parent: NodeId) -> Result<NodeId> {
        match self.peek_kind() {
            Some(TokenKind::Number) => {
                let token = self.eat(TokenKind::Number)?;
                let value: f64 = token.text.parse().map_err(|_| ParsingError::Custom {
                    msg: format!("Invalid numeric literal '{}'", token.text),
                    span: token.span,
                })?;
                let id = self.ast.reserve(Some(parent));
                self.finish(id, Component::Expression(Expression::Number(value)), token.span);
                Ok(id)
            }
            Some(TokenKind::Str) => {
                let token = self.eat(TokenKind::Str)?;
                let id = self.ast.reserve(Some(parent));
                self.finish(
                    id,
                    Component::Expression(Expression::String(token.text)),
                    token.span,
                );
                Ok(id)
            }
            Some(TokenKind::Bool) => {
                let token = self.eat(TokenKind::Bool)?;
                let id = self.ast.reserve(Some(parent));
                self.finish(
                    id,
                    Component::Expression(Expression::Bool(token.text == "true")),
                    token.span,
                );
                Ok(id)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// An expression-valued `do { ... }` block; it must contain at least one
    /// direct `take` statement
    fn block_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Do)?;
        self.eat(TokenKind::BraceOpen)?;
        let id = self.ast.reserve(Some(parent));
        let body = if self.at(TokenKind::BraceClose) {
            Vec::new()
        } else {
            self.statement_list(id, TokenKind::BraceClose)?
        };
        self.eat(TokenKind::BraceClose)?;

        let has_take = body.iter().any(|&statement| {
            matches!(
                self.ast.component(statement),
                Component::Statement(Statement::Take { .. })
            )
        });
        if !has_take {
            return Err(ParsingError::Custom {
                msg: String::from("Block expressions must have at least one 'take' statement"),
                span: token.span,
            });
        }

        self.finish(id, Component::Expression(Expression::Block { body }), token.span);
        Ok(id)
    }

    /// An if expression branch: either a `do { ... }` block or a bare braced
    /// block. Take placement across branches is checked later.
    fn if_branch(&mut self, parent: NodeId) -> Result<NodeId> {
        if self.at(TokenKind::Do) {
            return self.block_expression(parent);
        }
        let token = self.eat(TokenKind::BraceOpen)?;
        let id = self.ast.reserve(Some(parent));
        let body = if self.at(TokenKind::BraceClose) {
            Vec::new()
        } else {
            self.statement_list(id, TokenKind::BraceClose)?
        };
        self.eat(TokenKind::BraceClose)?;
        self.finish(id, Component::Expression(Expression::Block { body }), token.span);
        Ok(id)
    }

    fn if_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::If)?;
        let id = self.ast.reserve(Some(parent));
        let condition = self.control_header_expression(id)?;
        let then = self.if_branch(id)?;
        self.eat(TokenKind::Else)?;

        let otherwise = if self.at(TokenKind::If) {
            // `else if` desugars into an else branch yielding the nested if
            let block = self.ast.reserve(Some(id));
            let take = self.ast.reserve(Some(block));
            let nested = self.if_expression(take)?;
            let span = self.ast.span(nested).unwrap_or(token.span);
            self.finish(take, Component::Statement(Statement::Take { value: nested }), span);
            self.finish(
                block,
                Component::Expression(Expression::Block { body: vec![take] }),
                span,
            );
            block
        } else {
            self.if_branch(id)?
        };

        self.finish(
            id,
            Component::Expression(Expression::If {
                condition,
                then,
                otherwise,
            }),
            token.span,
        );
        Ok(id)
    }

    /// An anonymous `fn (params) type -> expr-or-block` literal; the single
    /// expression form desugars into a block returning that expression
    fn function_expression(&mut self, parent: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Fn)?;
        let id = self.ast.reserve(Some(parent));
        self.eat(TokenKind::ParenOpen)?;
        let params = self.parameter_list()?;
        self.eat(TokenKind::ParenClose)?;
        let return_type = self.type_annotation()?;
        self.eat(TokenKind::Arrow)?;

        let body = if self.at(TokenKind::BraceOpen) {
            self.block_statement(id)?
        } else {
            let block = self.ast.reserve(Some(id));
            let ret = self.ast.reserve(Some(block));
            let value = self.expression(ret)?;
            let span = self.ast.span(value).unwrap_or(token.span);
            self.finish(
                ret,
                Component::Statement(Statement::Return { value: Some(value) }),
                span,
            );
            self.finish(
                block,
                Component::Statement(Statement::Block { body: vec![ret] }),
                span,
            );
            block
        };

        self.finish(
            id,
            Component::Expression(Expression::Function {
                params,
                return_type,
                body,
            }),
            token.span,
        );
        Ok(id)
    }

    fn member_expression(&mut self, parent: NodeId, object: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::Dot)?;
        let id = self.ast.reserve(Some(parent));
        self.ast.set_parent(object, id);
        let property = self.eat(TokenKind::Identifier)?.text;
        self.finish(
            id,
            Component::Expression(Expression::Member { object, property }),
            token.span,
        );
        Ok(id)
    }

    fn index_expression(&mut self, parent: NodeId, object: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::BracketOpen)?;
        let id = self.ast.reserve(Some(parent));
        self.ast.set_parent(object, id);
        let index = self.nested_expression(id)?;
        self.eat(TokenKind::BracketClose)?;
        self.finish(
            id,
            Component::Expression(Expression::Index { object, index }),
            token.span,
        );
        Ok(id)
    }

    fn function_call(&mut self, parent: NodeId, callee: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::ParenOpen)?;
        let id = self.ast.reserve(Some(parent));
        self.ast.set_parent(callee, id);

        let mut arguments = Vec::new();
        if let Some(first) = self.optionally(|p| p.nested_expression(id)) {
            arguments.push(first);
        }
        while self.lookahead.is_some() && !self.at(TokenKind::ParenClose) {
            self.eat(TokenKind::Comma)?;
            arguments.push(self.nested_expression(id)?);
        }
        self.eat(TokenKind::ParenClose)?;

        self.finish(
            id,
            Component::Expression(Expression::Call { callee, arguments }),
            token.span,
        );
        Ok(id)
    }

    /// `expr -> f(args)` becomes `f(expr, args)`, chainable
    fn piped_call(&mut self, parent: NodeId, mut piped: NodeId) -> Result<NodeId> {
        loop {
            let token = self.eat(TokenKind::Arrow)?;
            let call = self.pipe_target(parent)?;
            match self.ast.component_mut(call) {
                Component::Expression(Expression::Call { arguments, .. }) => {
                    arguments.insert(0, piped);
                }
                _ => {
                    return Err(ParsingError::Custom {
                        msg: String::from("The right-hand side of '->' must be a function call"),
                        span: token.span,
                    })
                }
            }
            self.ast.set_parent(piped, call);
            piped = call;
            if !self.at(TokenKind::Arrow) {
                break;
            }
        }
        Ok(piped)
    }

    fn struct_instantiation(&mut self, parent: NodeId, base: NodeId) -> Result<NodeId> {
        let token = self.eat(TokenKind::BraceOpen)?;
        let ty = match self.ast.component(base) {
            Component::Expression(Expression::Identifier(name)) => name.clone(),
            _ => {
                return Err(ParsingError::Custom {
                    msg: String::from("Expected a struct name before '{'"),
                    span: token.span,
                })
            }
        };

        let id = self.ast.reserve(Some(parent));
        let mut attributes = Vec::new();
        if self.at(TokenKind::Identifier) {
            loop {
                let field = self.eat(TokenKind::Identifier)?.text;
                self.eat(TokenKind::SimpleAssign)?;
                let value = self.nested_expression(id)?;
                attributes.push((field, value));
                if !self.at(TokenKind::Comma) {
                    break;
                }
                self.eat(TokenKind::Comma)?;
            }
        }
        self.eat(TokenKind::BraceClose)?;

        self.finish(
            id,
            Component::Expression(Expression::StructInstantiation { ty, attributes }),
            token.span,
        );
        Ok(id)
    }
}
