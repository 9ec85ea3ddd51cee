//! Code generation
//!
//! This module lowers a checked AST to C++ source text. The main interface
//! is [lower], a pure projection: it never mutates the tree and it fails
//! instead of emitting partial output for anything it has no rule for.
//!
//! Sae's expression-oriented control flow has no direct C++ counterpart, so
//! every output starts with a fixed prelude of support constructs:
//! - a guard struct whose destructor runs a stored closure, which realizes
//!   `defer` with LIFO ordering at scope exit
//! - an immediately-invoked-lambda macro realizing expression-valued blocks,
//!   where `take` becomes the lambda's `return`
//! - a ternary over two such lambdas realizing if expressions
//!
//! The emitted text is re-indented by a line-based pass before it is
//! returned.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{Ast, BinaryOp, Component, Expression, NodeId, Parameter, Statement};
use crate::{Primitive, Type};

#[derive(Debug, Error, Diagnostic)]
pub enum CodegenError {
    #[error("There is no lowering rule for this construct: {construct}")]
    UnsupportedConstruct {
        construct: String,

        #[label("here")]
        span: Option<SourceSpan>,
    },
}

type Result<T> = std::result::Result<T, CodegenError>;

const PRELUDE: &str = r#"#ifndef __SAEC_PRELUDE
#define __SAEC_PRELUDE
#include <stdio.h>
#include <functional>

struct __SAEC_DEFERRED
{
    std::function<void()> stmt;

    __SAEC_DEFERRED(std::function<void()> stmt)
    {
        this->stmt = stmt;
    }

    ~__SAEC_DEFERRED()
    {
        this->stmt();
    }
};

#define __SAEC_CONCAT2(a, b) a##b
#define __SAEC_CONCAT(a, b) __SAEC_CONCAT2(a, b)

#define __SAEC_DEFER(block) __SAEC_DEFERRED __SAEC_CONCAT(__deferred_, __COUNTER__)([&]() { block; });

#define __SAEC_BLOCK_EXPR(block) ([&]() { block; })()
#define __SAEC_IF(cond, thn, els) ((cond) ? __SAEC_BLOCK_EXPR(thn) : __SAEC_BLOCK_EXPR(els))

#define __SAEC_TAKE return
#endif"#;

/// Lower a checked AST to C++ source text
pub fn lower(ast: &Ast) -> Result<String> {
    let generator = Generator { ast };

    let mut declarations = Vec::new();
    for &statement in ast.program_body() {
        declarations.push(generator.statement(statement)?);
    }

    let text = format!("{}\n\n{}", PRELUDE, declarations.join("\n\n"));
    Ok(reindent(&text))
}

struct Generator<'a> {
    ast: &'a Ast,
}

impl Generator<'_> {
    fn unsupported(&self, id: NodeId, construct: &str) -> CodegenError {
        CodegenError::UnsupportedConstruct {
            construct: construct.to_string(),
            span: self.ast.span(id).map(Into::into),
        }
    }

    fn statement(&self, id: NodeId) -> Result<String> {
        let statement = match self.ast.component(id) {
            Component::Statement(statement) => statement,
            Component::Expression(_) => {
                return Ok(format!("{};", self.expression(id)?));
            }
            Component::Program { .. } => return Err(self.unsupported(id, "nested program")),
            Component::Pending => return Err(self.unsupported(id, "unfinished node")),
        };

        match statement {
            Statement::Expression { expression } => {
                Ok(format!("{};", self.expression(*expression)?))
            }
            Statement::Empty => Ok(String::from(";")),
            Statement::Block { body } => {
                Ok(format!("{{\n{}\n}}", self.statement_sequence(body)?))
            }
            Statement::Take { value } => {
                Ok(format!("__SAEC_TAKE {};", self.expression(*value)?))
            }
            Statement::Return { value } => match value {
                Some(value) => Ok(format!("return {};", self.expression(*value)?)),
                None => Ok(String::from("return;")),
            },
            Statement::Break => Ok(String::from("break;")),
            Statement::Continue => Ok(String::from("continue;")),
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.expression(*condition)?;
                let then = self.statement(*then)?;
                match otherwise {
                    Some(otherwise) => Ok(format!(
                        "if ({} == true) {} else {}",
                        condition,
                        then,
                        self.statement(*otherwise)?
                    )),
                    None => Ok(format!("if ({} == true) {}", condition, then)),
                }
            }
            Statement::Loop { condition, body } => Ok(format!(
                "while ({}) {}",
                self.expression(*condition)?,
                self.statement(*body)?
            )),
            Statement::LoopOver {
                iterable,
                alias,
                body,
            } => Ok(format!(
                "for (const auto& {} : {}) {}",
                alias,
                self.expression(*iterable)?,
                self.statement(*body)?
            )),
            Statement::Fire { call } => Ok(format!(
                "static_cast<void>({});",
                self.expression(*call)?
            )),
            Statement::Defer { statement } => Ok(format!(
                "__SAEC_DEFER({{ {} }});",
                self.statement(*statement)?
            )),
            Statement::VariableDeclaration {
                name,
                value,
                mutable,
                ..
            } => {
                let qualifier = if *mutable { "" } else { "const " };
                let ty = match self.ast.ty(id) {
                    Some(ty) => self.cpp_type(ty),
                    None => String::from("auto"),
                };
                match value {
                    Some(value) => Ok(format!(
                        "{}{} {} = {};",
                        qualifier,
                        ty,
                        name,
                        self.expression(*value)?
                    )),
                    None => Ok(format!("{}{} {};", qualifier, ty, name)),
                }
            }
            Statement::Assignment {
                target,
                operator,
                value,
            } => Ok(format!(
                "{} {} {};",
                self.expression(*target)?,
                operator,
                self.expression(*value)?
            )),
            Statement::FunctionDeclaration {
                name,
                params,
                return_type,
                body,
                ..
            } => {
                // the entry point always gets the native exit type
                let return_type = if name == "main" {
                    String::from("int")
                } else {
                    self.cpp_type(return_type)
                };
                let params: Vec<String> =
                    params.iter().map(|param| self.parameter(param)).collect();
                Ok(format!(
                    "{} {}({}) {}",
                    return_type,
                    name,
                    params.join(", "),
                    self.statement(*body)?
                ))
            }
            Statement::StructDeclaration {
                name,
                implements,
                attributes,
            }
            | Statement::InterfaceDeclaration {
                name,
                implements,
                attributes,
            } => {
                let bases = if implements.is_empty() {
                    String::new()
                } else {
                    format!(" : {}", implements.join(", "))
                };
                let fields: Vec<String> = attributes
                    .iter()
                    .map(|(attribute, ty)| format!("{} {};", self.cpp_type(ty), attribute))
                    .collect();
                Ok(format!(
                    "struct {}{} {{\n{}\n}};",
                    name,
                    bases,
                    fields.join("\n")
                ))
            }
            Statement::NativeCode { code, .. } => Ok(code.clone()),
        }
    }

    fn statement_sequence(&self, body: &[NodeId]) -> Result<String> {
        let statements: Vec<String> = body
            .iter()
            .map(|&statement| self.statement(statement))
            .collect::<Result<_>>()?;
        Ok(statements.join("\n"))
    }

    fn expression(&self, id: NodeId) -> Result<String> {
        let expression = match self.ast.component(id) {
            Component::Expression(expression) => expression,
            _ => return Err(self.unsupported(id, "statement in expression position")),
        };

        match expression {
            Expression::Number(value) => {
                if value.fract() == 0.0 {
                    Ok(format!("{}", *value as i64))
                } else {
                    Ok(format!("{value}"))
                }
            }
            Expression::String(value) => Ok(format!("\"{value}\"")),
            Expression::Bool(value) => Ok(String::from(if *value { "1" } else { "0" })),
            Expression::Identifier(name) => Ok(name.clone()),
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.expression(*left)?;
                let right = self.expression(*right)?;
                Ok(match operator {
                    BinaryOp::Add => format!("({left} + {right})"),
                    BinaryOp::Sub => format!("({left} - {right})"),
                    BinaryOp::Mul => format!("({left} * {right})"),
                    BinaryOp::Div => format!("({left} / {right})"),
                    BinaryOp::Less => format!("({left} < {right})"),
                    BinaryOp::LessEq => format!("({left} <= {right})"),
                    BinaryOp::Greater => format!("({left} > {right})"),
                    BinaryOp::GreaterEq => format!("({left} >= {right})"),
                    BinaryOp::Equals => format!("({left} == {right})"),
                    BinaryOp::NotEquals => format!("({left} != {right})"),
                    BinaryOp::And => format!("({left} && {right})"),
                    BinaryOp::Or => format!("({left} || {right})"),
                    // no native spellings; `!` also normalizes the operands
                    BinaryOp::Nand => format!("(!({left} && {right}))"),
                    BinaryOp::Nor => format!("(!({left} || {right}))"),
                    BinaryOp::Xor => format!("(!({left}) != !({right}))"),
                    BinaryOp::Xand => format!("(!({left}) == !({right}))"),
                })
            }
            Expression::Member { object, property } => {
                Ok(format!("{}.{}", self.expression(*object)?, property))
            }
            Expression::Index { object, index } => Ok(format!(
                "{}[{}]",
                self.expression(*object)?,
                self.expression(*index)?
            )),
            Expression::Call { callee, arguments } => {
                let arguments: Vec<String> = arguments
                    .iter()
                    .map(|&argument| self.expression(argument))
                    .collect::<Result<_>>()?;
                Ok(format!(
                    "{}({})",
                    self.expression(*callee)?,
                    arguments.join(", ")
                ))
            }
            Expression::Function {
                params,
                return_type,
                body,
            } => {
                let params: Vec<String> =
                    params.iter().map(|param| self.parameter(param)).collect();
                let ret = match return_type {
                    Some(ty) => format!(" -> {}", self.cpp_type(ty)),
                    None => String::new(),
                };
                Ok(format!(
                    "[&]({}){} {}",
                    params.join(", "),
                    ret,
                    self.statement(*body)?
                ))
            }
            Expression::Block { body } => Ok(format!(
                "__SAEC_BLOCK_EXPR({{\n{}\n}})",
                self.statement_sequence(body)?
            )),
            Expression::If {
                condition,
                then,
                otherwise,
            } => Ok(format!(
                "__SAEC_IF(\n{},\n{{\n{}\n}},\n{{\n{}\n}})",
                self.expression(*condition)?,
                self.statement_sequence(self.branch_body(*then))?,
                self.statement_sequence(self.branch_body(*otherwise))?
            )),
            Expression::StructInstantiation { ty, attributes } => {
                let fields: Vec<String> = attributes
                    .iter()
                    .map(|(field, value)| {
                        Ok(format!(".{} = {}", field, self.expression(*value)?))
                    })
                    .collect::<Result<_>>()?;
                Ok(format!("{} {{ {} }}", ty, fields.join(", ")))
            }
        }
    }

    /// The statement list of an if expression branch
    fn branch_body(&self, id: NodeId) -> &[NodeId] {
        match self.ast.component(id) {
            Component::Expression(Expression::Block { body }) => body,
            _ => &[],
        }
    }

    fn parameter(&self, param: &Parameter) -> String {
        let qualifier = if param.mutable { "" } else { "const " };
        format!("{}{} {}", qualifier, self.cpp_type(&param.ty), param.name)
    }

    fn cpp_type(&self, ty: &Type) -> String {
        match ty {
            Type::Primitive(primitive) => primitive_type(primitive).to_string(),
            Type::Named(name) => name.clone(),
            Type::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(|ty| self.cpp_type(ty)).collect();
                format!("std::function<{}({})>", self.cpp_type(ret), params.join(", "))
            }
            Type::Empty => String::from("void"),
        }
    }
}

fn primitive_type(primitive: &Primitive) -> &'static str {
    match primitive {
        Primitive::I8 => "int8_t",
        Primitive::I16 => "int16_t",
        Primitive::I32 => "int32_t",
        Primitive::I64 => "int64_t",
        Primitive::I128 => "__int128_t",
        Primitive::U8 => "uint8_t",
        Primitive::U16 => "uint16_t",
        Primitive::U32 => "uint32_t",
        Primitive::U64 => "uint64_t",
        Primitive::U128 => "__uint128_t",
        Primitive::F32 => "float",
        Primitive::F64 => "double",
        Primitive::Bool => "bool",
        Primitive::Str => "const char*",
    }
}

/// Re-indent emitted text line by line: the nesting depth counts opening
/// minus closing bracket characters per line, and a line whose first
/// non-blank character is a closer sits one level shallower
fn reindent(text: &str) -> String {
    let mut depth: usize = 0;
    let mut lines = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.push(String::new());
            continue;
        }

        let opens = trimmed
            .chars()
            .filter(|c| matches!(c, '{' | '(' | '['))
            .count();
        let closes = trimmed
            .chars()
            .filter(|c| matches!(c, '}' | ')' | ']'))
            .count();
        let closes_first = matches!(trimmed.chars().next(), Some('}' | ')' | ']'));

        let level = if closes_first {
            depth.saturating_sub(1)
        } else {
            depth
        };
        lines.push(format!("{}{}", "    ".repeat(level), trimmed));

        depth = (depth + opens).saturating_sub(closes);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, type_check};

    fn lower_source(source: &str) -> String {
        let ast = parse(source).expect("source should parse");
        let ast = type_check(ast).expect("source should check");
        lower(&ast).expect("source should lower")
    }

    #[test]
    fn prelude_is_emitted() {
        let code = lower_source("fn main() {}");
        assert!(code.starts_with("#ifndef __SAEC_PRELUDE"));
        assert!(code.contains("#define __SAEC_TAKE return"));
        assert!(code.contains("struct __SAEC_DEFERRED"));
    }

    #[test]
    fn main_returns_the_native_exit_type() {
        let code = lower_source("fn main() {}");
        assert!(code.contains("int main() {"), "got:\n{code}");

        let code = lower_source("fn helper() {}");
        assert!(code.contains("void helper() {"), "got:\n{code}");
    }

    #[test]
    fn literals_and_declarations() {
        let code = lower_source("let x = 42;");
        assert!(code.contains("const int32_t x = 42;"), "got:\n{code}");

        let code = lower_source("let mut y f64 = 1.5;");
        assert!(code.contains("double y = 1.5;"), "got:\n{code}");
        assert!(!code.contains("const double y"), "got:\n{code}");

        let code = lower_source("let b = true;");
        assert!(code.contains("const bool b = 1;"), "got:\n{code}");

        let code = lower_source("let s = \"hello\";");
        assert!(code.contains("const char* s = \"hello\";"), "got:\n{code}");
    }

    #[test]
    fn untyped_declarations_lower_to_auto() {
        let code = lower_source("fn f() i32 { return 1; } fn main() { let x = f(); }");
        assert!(code.contains("const auto x = f();"), "got:\n{code}");
    }

    #[test]
    fn if_statement_compares_against_true() {
        let code = lower_source("fn main() { if 1 == 1 { return; } }");
        assert!(code.contains("if ((1 == 1) == true) {"), "got:\n{code}");
    }

    #[test]
    fn take_defer_and_block_expressions() {
        let code = lower_source(
            "fn main() { defer printf(\"last\"); let x = do { take 1; }; printf(\"%d\", x); }",
        );
        assert!(
            code.contains("__SAEC_DEFER({ printf(\"last\"); });"),
            "got:\n{code}"
        );
        assert!(code.contains("__SAEC_BLOCK_EXPR({"), "got:\n{code}");
        assert!(code.contains("__SAEC_TAKE 1;"), "got:\n{code}");
    }

    #[test]
    fn if_expression_lowers_into_the_evaluator_macro() {
        let code = lower_source(
            "fn factorial(nr i32) i32 { return if nr == 0 { take 1; } else { take nr * factorial(nr - 1); }; }",
        );
        assert!(code.contains("return __SAEC_IF("), "got:\n{code}");
        assert!(code.contains("__SAEC_TAKE 1;"), "got:\n{code}");
        assert!(
            code.contains("__SAEC_TAKE (nr * factorial((nr - 1)));"),
            "got:\n{code}"
        );
    }

    #[test]
    fn loops_and_loop_over() {
        let code = lower_source("fn main() { let mut i = 0; loop i < 3 { i += 1; } }");
        assert!(code.contains("while ((i < 3)) {"), "got:\n{code}");
        assert!(code.contains("i += 1;"), "got:\n{code}");

        let code = lower_source("fn f(items i32) { loop over items as item { break; } }");
        assert!(
            code.contains("for (const auto& item : items) {"),
            "got:\n{code}"
        );
    }

    #[test]
    fn fire_discards_the_result() {
        let code = lower_source("fn work() i32 { return 1; } fn main() { fire work(); }");
        assert!(code.contains("static_cast<void>(work());"), "got:\n{code}");
    }

    #[test]
    fn aggregates_and_instantiation() {
        let code = lower_source("type struct Point { x i32; y i32; }");
        assert!(code.contains("struct Point {"), "got:\n{code}");
        assert!(code.contains("int32_t x;"), "got:\n{code}");

        let code = lower_source("type interface Entity { id i32; }\ntype struct Dot impl Entity { x i32; }");
        assert!(code.contains("struct Dot : Entity {"), "got:\n{code}");

        let code = lower_source(
            "type struct Point { x i32; y i32; }\nfn main() { let p Point = Point { x = 1, y = 2 }; }",
        );
        assert!(
            code.contains("const Point p = Point { .x = 1, .y = 2 };"),
            "got:\n{code}"
        );
    }

    #[test]
    fn native_code_passes_through_verbatim() {
        let code = lower_source(
            "$C++( int add(int a, int b) { return a + b; } ) exposing(add (a i32, b i32) i32);",
        );
        assert!(code.contains("int add(int a, int b)"), "got:\n{code}");
    }

    #[test]
    fn misc_logical_operators_lower_normalized() {
        let code = lower_source("let x = true ~|| false;");
        assert!(code.contains("(!(1) != !(0))"), "got:\n{code}");

        let code = lower_source("let x = true !&& false;");
        assert!(code.contains("(!(1 && 0))"), "got:\n{code}");
    }

    #[test]
    fn function_literals_lower_to_lambdas() {
        let code = lower_source("fn main() { let f = fn (a i32) i32 -> a + 1; }");
        assert!(
            code.contains("const auto f = [&](const int32_t a) -> int32_t {"),
            "got:\n{code}"
        );
    }

    #[test]
    fn lowering_is_deterministic() {
        let source = "fn main() { let x = do { take 1; }; printf(\"%d\", x); }";
        assert_eq!(lower_source(source), lower_source(source));
    }

    #[test]
    fn reindent_tracks_bracket_depth() {
        let text = "int main() {\nreturn 0;\n}";
        assert_eq!(reindent(text), "int main() {\n    return 0;\n}");

        let text = "{\n{\nx;\n}\n}";
        assert_eq!(reindent(text), "{\n    {\n        x;\n    }\n}");
    }
}
