//! Parsing
//!
//! This module is responsible for turning the source code from its string
//! form into an AST. The main interface is [parse] which takes a string and
//! builds an [Ast] arena.
//!
//! Internally, parsing works in two phases:
//! - the [lexer] produces positioned tokens on demand
//! - the [parser] is a recursive descent parser that builds the tree,
//!   attaching parent ids and spans while it goes
//!
//! Ambiguous productions are parsed speculatively: a failed attempt rolls
//! the token cursor and the arena back before the next alternative runs.
//! Only [ParsingError] is ever swallowed by that machinery; everything else
//! propagates.

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Ast;
use crate::Span;

mod lexer;
mod parser;

#[derive(Debug, Error, Diagnostic)]
pub enum ParsingError {
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEndOfInput {
        expected: String,

        #[label("input ends here")]
        span: Span,
    },

    #[error("Unexpected token \"{token}\", expected {expected}")]
    UnexpectedToken {
        token: String,
        expected: String,

        #[label("here")]
        span: Span,
    },

    #[error("Unrecognized token sequence: {snippet}")]
    UnrecognizedInput {
        snippet: String,

        #[label("starting here")]
        span: Span,
    },

    #[error("{msg}")]
    Custom {
        msg: String,

        #[label("here")]
        span: Span,
    },
}

/// Parse Sae source code into an AST
pub fn parse(source: &str) -> Result<Ast, ParsingError> {
    parser::Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, BinaryOp, Component, Expression, NodeId, Statement};
    use crate::{Primitive, Type};

    fn parse_ok(source: &str) -> Ast {
        match parse(source) {
            Ok(ast) => ast,
            Err(err) => panic!("failed to parse {source:?}: {err}"),
        }
    }

    fn single_statement(ast: &Ast) -> NodeId {
        let body = ast.program_body();
        assert_eq!(body.len(), 1, "expected exactly one top-level statement");
        body[0]
    }

    fn expression_of(ast: &Ast, statement: NodeId) -> NodeId {
        match ast.component(statement) {
            Component::Statement(Statement::Expression { expression }) => *expression,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn binary_expression_shape() {
        let ast = parse_ok("42 + 1;");
        let statement = single_statement(&ast);
        let expression = expression_of(&ast, statement);

        let Component::Expression(Expression::Binary {
            operator,
            left,
            right,
        }) = ast.component(expression)
        else {
            panic!("expected a binary expression");
        };
        assert_eq!(*operator, BinaryOp::Add);
        assert!(matches!(
            ast.component(*left),
            Component::Expression(Expression::Number(value)) if *value == 42.0
        ));
        assert!(matches!(
            ast.component(*right),
            Component::Expression(Expression::Number(value)) if *value == 1.0
        ));

        // parent ids are assigned at construction time
        assert_eq!(ast.parent(expression), Some(statement));
        assert_eq!(ast.parent(*left), Some(expression));
        assert_eq!(ast.parent(*right), Some(expression));
    }

    #[test]
    fn binary_chain_is_left_leaning() {
        let ast = parse_ok("1 - 2 - 3;");
        let expression = expression_of(&ast, single_statement(&ast));

        let Component::Expression(Expression::Binary { left, right, .. }) =
            ast.component(expression)
        else {
            panic!("expected a binary expression");
        };
        assert!(matches!(
            ast.component(*left),
            Component::Expression(Expression::Binary { .. })
        ));
        assert!(matches!(
            ast.component(*right),
            Component::Expression(Expression::Number(value)) if *value == 3.0
        ));
    }

    #[test]
    fn precedence_cascade() {
        let ast = parse_ok("1 + 2 * 3 == 7;");
        let expression = expression_of(&ast, single_statement(&ast));

        let Component::Expression(Expression::Binary { operator, left, .. }) =
            ast.component(expression)
        else {
            panic!("expected a binary expression");
        };
        assert_eq!(*operator, BinaryOp::Equals);

        let Component::Expression(Expression::Binary {
            operator, right, ..
        }) = ast.component(*left)
        else {
            panic!("expected the sum on the left of ==");
        };
        assert_eq!(*operator, BinaryOp::Add);
        assert!(matches!(
            ast.component(*right),
            Component::Expression(Expression::Binary {
                operator: BinaryOp::Mul,
                ..
            })
        ));
    }

    #[test]
    fn misc_logical_operators() {
        for (source, expected) in [
            ("true !&& false;", BinaryOp::Nand),
            ("true !|| false;", BinaryOp::Nor),
            ("true ~|| false;", BinaryOp::Xor),
            ("true ~&& false;", BinaryOp::Xand),
        ] {
            let ast = parse_ok(source);
            let expression = expression_of(&ast, single_statement(&ast));
            assert!(matches!(
                ast.component(expression),
                Component::Expression(Expression::Binary { operator, .. }) if *operator == expected
            ));
        }
    }

    #[test]
    fn variable_declaration_shape() {
        let ast = parse_ok("let x = 42;");
        let statement = single_statement(&ast);

        let Component::Statement(Statement::VariableDeclaration {
            name,
            declared,
            value,
            mutable,
            public,
        }) = ast.component(statement)
        else {
            panic!("expected a variable declaration");
        };
        assert_eq!(name, "x");
        assert!(declared.is_none());
        assert!(!mutable);
        assert!(!public);
        assert!(matches!(
            ast.component(value.unwrap()),
            Component::Expression(Expression::Number(value)) if *value == 42.0
        ));
    }

    #[test]
    fn mutable_declaration_with_type() {
        let ast = parse_ok("let mut x i32 = 4;");
        let statement = single_statement(&ast);

        let Component::Statement(Statement::VariableDeclaration {
            declared, mutable, ..
        }) = ast.component(statement)
        else {
            panic!("expected a variable declaration");
        };
        assert!(mutable);
        assert_eq!(*declared, Some(Type::Primitive(Primitive::I32)));
    }

    #[test]
    fn assignment_needs_second_token_lookahead() {
        let ast = parse_ok("x = 1;");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::Assignment {
                operator: AssignOp::Assign,
                ..
            })
        ));

        let ast = parse_ok("x += 2;");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::Assignment {
                operator: AssignOp::AddAssign,
                ..
            })
        ));

        // `==` must stay an expression statement
        let ast = parse_ok("x == 1;");
        let expression = expression_of(&ast, single_statement(&ast));
        assert!(matches!(
            ast.component(expression),
            Component::Expression(Expression::Binary {
                operator: BinaryOp::Equals,
                ..
            })
        ));
    }

    #[test]
    fn block_expression_requires_take() {
        let err = parse("do { 1; };").unwrap_err();
        assert!(err.to_string().contains("take"), "got: {err}");

        let ast = parse_ok("do { take 5; };");
        let expression = expression_of(&ast, single_statement(&ast));
        let Component::Expression(Expression::Block { body }) = ast.component(expression) else {
            panic!("expected a block expression");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(
            ast.component(body[0]),
            Component::Statement(Statement::Take { .. })
        ));
    }

    #[test]
    fn statement_position_if_is_a_statement() {
        let ast = parse_ok("if 3 { take 5; } else { take 2; }");
        let statement = single_statement(&ast);

        let Component::Statement(Statement::If {
            then, otherwise, ..
        }) = ast.component(statement)
        else {
            panic!("expected an if statement");
        };
        assert!(matches!(
            ast.component(*then),
            Component::Statement(Statement::Block { .. })
        ));
        assert!(otherwise.is_some());
    }

    #[test]
    fn expression_position_if_is_an_expression() {
        let ast = parse_ok("let x = if 3 { take 5; } else { take 2; };");
        let statement = single_statement(&ast);

        let Component::Statement(Statement::VariableDeclaration { value, .. }) =
            ast.component(statement)
        else {
            panic!("expected a variable declaration");
        };
        let Component::Expression(Expression::If {
            then, otherwise, ..
        }) = ast.component(value.unwrap())
        else {
            panic!("expected an if expression");
        };
        assert!(matches!(
            ast.component(*then),
            Component::Expression(Expression::Block { .. })
        ));
        assert!(matches!(
            ast.component(*otherwise),
            Component::Expression(Expression::Block { .. })
        ));
    }

    #[test]
    fn if_expression_requires_else() {
        assert!(parse("let x = if 1 { take 1; };").is_err());
    }

    #[test]
    fn else_if_desugars_into_take() {
        let ast = parse_ok("let x = if 1 { take 1; } else if 2 { take 2; } else { take 3; };");
        let statement = single_statement(&ast);

        let Component::Statement(Statement::VariableDeclaration { value, .. }) =
            ast.component(statement)
        else {
            panic!("expected a variable declaration");
        };
        let Component::Expression(Expression::If { otherwise, .. }) =
            ast.component(value.unwrap())
        else {
            panic!("expected an if expression");
        };
        let Component::Expression(Expression::Block { body }) = ast.component(*otherwise) else {
            panic!("expected the else branch to be a block expression");
        };
        assert_eq!(body.len(), 1);
        let Component::Statement(Statement::Take { value }) = ast.component(body[0]) else {
            panic!("expected the synthesized take");
        };
        assert!(matches!(
            ast.component(*value),
            Component::Expression(Expression::If { .. })
        ));
    }

    #[test]
    fn do_branches_in_if_expression() {
        let ast = parse_ok("let x = if 1 do { take 1; } else do { take 2; };");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::VariableDeclaration { .. })
        ));
    }

    #[test]
    fn pipe_rewrites_into_calls() {
        let ast = parse_ok("a -> f(1) -> g();");
        let expression = expression_of(&ast, single_statement(&ast));

        // outermost: g(f(a, 1))
        let Component::Expression(Expression::Call { callee, arguments }) =
            ast.component(expression)
        else {
            panic!("expected a call");
        };
        assert!(matches!(
            ast.component(*callee),
            Component::Expression(Expression::Identifier(name)) if name == "g"
        ));
        assert_eq!(arguments.len(), 1);

        let Component::Expression(Expression::Call { callee, arguments }) =
            ast.component(arguments[0])
        else {
            panic!("expected the inner call");
        };
        assert!(matches!(
            ast.component(*callee),
            Component::Expression(Expression::Identifier(name)) if name == "f"
        ));
        assert_eq!(arguments.len(), 2);
        assert!(matches!(
            ast.component(arguments[0]),
            Component::Expression(Expression::Identifier(name)) if name == "a"
        ));
    }

    #[test]
    fn member_chain_and_call() {
        let ast = parse_ok("some.resource.free();");
        let expression = expression_of(&ast, single_statement(&ast));

        let Component::Expression(Expression::Call { callee, .. }) = ast.component(expression)
        else {
            panic!("expected a call");
        };
        let Component::Expression(Expression::Member { object, property }) =
            ast.component(*callee)
        else {
            panic!("expected a member access");
        };
        assert_eq!(property, "free");
        assert!(matches!(
            ast.component(*object),
            Component::Expression(Expression::Member { .. })
        ));
    }

    #[test]
    fn index_expression() {
        let ast = parse_ok("items[0];");
        let expression = expression_of(&ast, single_statement(&ast));
        assert!(matches!(
            ast.component(expression),
            Component::Expression(Expression::Index { .. })
        ));
    }

    #[test]
    fn struct_instantiation_and_suppression() {
        let ast = parse_ok("Point { x = 1, y = 2 };");
        let expression = expression_of(&ast, single_statement(&ast));
        let Component::Expression(Expression::StructInstantiation { ty, attributes }) =
            ast.component(expression)
        else {
            panic!("expected a struct instantiation");
        };
        assert_eq!(ty, "Point");
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].0, "x");

        // empty instantiation
        let ast = parse_ok("Number {};");
        let expression = expression_of(&ast, single_statement(&ast));
        assert!(matches!(
            ast.component(expression),
            Component::Expression(Expression::StructInstantiation { attributes, .. })
                if attributes.is_empty()
        ));

        // an identifier condition must not swallow the construct's block
        let ast = parse_ok("if flag { break; }");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::If { .. })
        ));
        let ast = parse_ok("loop flag { break; }");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::Loop { .. })
        ));
    }

    #[test]
    fn loop_forms() {
        let ast = parse_ok("loop {}");
        let Component::Statement(Statement::Loop { condition, .. }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a loop");
        };
        assert!(matches!(
            ast.component(*condition),
            Component::Expression(Expression::Bool(true))
        ));

        let ast = parse_ok("loop over my_items as item { break; continue; }");
        let Component::Statement(Statement::LoopOver { alias, body, .. }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a loop-over");
        };
        assert_eq!(alias, "item");
        let Component::Statement(Statement::Block { body }) = ast.component(*body) else {
            panic!("expected a block body");
        };
        assert_eq!(body.len(), 2);

        // the alias defaults to `it`
        let ast = parse_ok("loop over my_items {}");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::LoopOver { alias, .. }) if alias == "it"
        ));
    }

    #[test]
    fn function_declaration_forms() {
        let ast = parse_ok("fn empty() {}");
        let Component::Statement(Statement::FunctionDeclaration {
            name,
            params,
            return_type,
            public,
            ..
        }) = ast.component(single_statement(&ast))
        else {
            panic!("expected a function declaration");
        };
        assert_eq!(name, "empty");
        assert!(params.is_empty());
        assert_eq!(*return_type, Type::Empty);
        assert!(!public);

        let ast = parse_ok("pub fn greet(name str, age u8) i32 { return 1; }");
        let Component::Statement(Statement::FunctionDeclaration {
            params,
            return_type,
            public,
            ..
        }) = ast.component(single_statement(&ast))
        else {
            panic!("expected a function declaration");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "name");
        assert_eq!(params[0].ty, Type::Primitive(Primitive::Str));
        assert_eq!(*return_type, Type::Primitive(Primitive::I32));
        assert!(public);
    }

    #[test]
    fn function_expression_forms() {
        let ast = parse_ok("let f = fn (a i32) i32 -> a + 1;");
        let Component::Statement(Statement::VariableDeclaration { value, .. }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a variable declaration");
        };
        let Component::Expression(Expression::Function {
            params,
            return_type,
            body,
        }) = ast.component(value.unwrap())
        else {
            panic!("expected a function literal");
        };
        assert_eq!(params.len(), 1);
        assert_eq!(*return_type, Some(Type::Primitive(Primitive::I32)));

        // the single expression form desugars into a returning block
        let Component::Statement(Statement::Block { body }) = ast.component(*body) else {
            panic!("expected a block body");
        };
        assert!(matches!(
            ast.component(body[0]),
            Component::Statement(Statement::Return { value: Some(_) })
        ));

        let ast = parse_ok("let f = fn () -> { return 1; };");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::VariableDeclaration { .. })
        ));
    }

    #[test]
    fn defer_wraps_a_statement() {
        let ast = parse_ok("defer cleanup();");
        let Component::Statement(Statement::Defer { statement }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a defer statement");
        };
        assert!(matches!(
            ast.component(*statement),
            Component::Statement(Statement::Expression { .. })
        ));

        let ast = parse_ok("defer return 1 + 1;");
        let Component::Statement(Statement::Defer { statement }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a defer statement");
        };
        assert!(matches!(
            ast.component(*statement),
            Component::Statement(Statement::Return { .. })
        ));
    }

    #[test]
    fn fire_requires_a_call() {
        let ast = parse_ok("fire cpu_intensive_work();");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::Fire { .. })
        ));

        assert!(parse("fire 42;").is_err());
    }

    #[test]
    fn native_code_statement() {
        let source = r#"
$C++(
    int sum(int a, int b) {
        return a + b;
    }
) exposing(sum (a i32, b i32) i32);
        "#;
        let ast = parse_ok(source);
        let Component::Statement(Statement::NativeCode { code, exposing }) =
            ast.component(single_statement(&ast))
        else {
            panic!("expected a native code statement");
        };
        assert!(code.contains("int sum(int a, int b)"));
        assert_eq!(exposing.len(), 1);
        assert_eq!(exposing[0].name, "sum");
        assert!(matches!(exposing[0].ty, Type::Function { .. }));
    }

    #[test]
    fn aggregate_declarations() {
        let ast = parse_ok("type struct Point impl Entity { x i32; y i32; }");
        let Component::Statement(Statement::StructDeclaration {
            name,
            implements,
            attributes,
        }) = ast.component(single_statement(&ast))
        else {
            panic!("expected a struct declaration");
        };
        assert_eq!(name, "Point");
        assert_eq!(implements, &["Entity"]);
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].0, "y");

        let ast = parse_ok("type interface Entity { id i32; }");
        assert!(matches!(
            ast.component(single_statement(&ast)),
            Component::Statement(Statement::InterfaceDeclaration { .. })
        ));
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        assert!(parse("42").is_err());
    }

    #[test]
    fn unrecognized_input_is_an_error() {
        let err = parse("@").unwrap_err();
        assert!(matches!(err, ParsingError::UnrecognizedInput { .. }));

        assert!(parse("let x = @;").is_err());
    }

    #[test]
    fn spans_are_recorded() {
        let ast = parse_ok("let x = 1;");
        let statement = single_statement(&ast);
        let span = ast.span(statement).expect("declaration should carry a span");
        assert_eq!(span.start, 0);
    }
}
