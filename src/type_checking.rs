//! Type checking and name resolution
//!
//! This module verifies the parsed tree and annotates it in place. The main
//! interface is [type_check] which consumes an [Ast] and returns it with
//! type information filled in.
//!
//! Checking runs in two passes:
//! 1. type resolution: every variable declaration, binary expression, if
//!    expression and block expression that lacks a cached type gets one
//!    computed and stored on its node
//! 2. identifier existence: every identifier use must resolve, through the
//!    parent chain, to a declaration that precedes it
//!
//! Visibility is strictly sequential: inside a statement list only
//! declarations before the use are visible. Function parameters (and a
//! function's own name) are visible throughout the function's body, and a
//! loop-over alias is visible in its loop body.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{Ast, Component, Expression, NodeId, Statement};
use crate::builtins::Builtin;
use crate::{Primitive, Type};

#[derive(Debug, Error, Diagnostic)]
pub enum TypeCheckError {
    #[error("Identifier '{name}' is undefined.")]
    UndefinedIdentifier {
        name: String,

        #[label("this identifier")]
        span: Option<SourceSpan>,
    },

    #[error("Right-side expression type '{right}' does not match left-side expression type '{left}'.")]
    OperandMismatch {
        left: Type,
        right: Type,

        #[label("in this expression")]
        span: Option<SourceSpan>,
    },

    #[error("Neither side of this expression has a deducible type.")]
    NoDeducibleType {
        #[label("here")]
        span: Option<SourceSpan>,
    },

    #[error("Uninitialised variable declarations must have a type.")]
    MissingType {
        #[label("this declaration")]
        span: Option<SourceSpan>,
    },

    #[error("The {branch} branch of this if expression must have at least one 'take' statement.")]
    MissingTake {
        branch: String,

        #[label("this branch")]
        span: Option<SourceSpan>,
    },
}

type Result<T> = std::result::Result<T, TypeCheckError>;

/// Annotate the AST with types and verify that every identifier resolves
pub fn type_check(mut ast: Ast) -> Result<Ast> {
    apply_types(&mut ast)?;
    check_identifiers(&ast)?;
    Ok(ast)
}

fn label(ast: &Ast, id: NodeId) -> Option<SourceSpan> {
    ast.span(id).map(Into::into)
}

/// Does this node kind carry a resolved-type slot?
fn wants_type(component: &Component) -> bool {
    matches!(
        component,
        Component::Statement(Statement::VariableDeclaration { .. })
            | Component::Expression(
                Expression::Binary { .. } | Expression::If { .. } | Expression::Block { .. }
            )
    )
}

fn apply_types(ast: &mut Ast) -> Result<()> {
    let targets: Vec<NodeId> = ast
        .walk()
        .into_iter()
        .filter(|&id| wants_type(ast.component(id)))
        .collect();

    for id in targets {
        if ast.ty(id).is_some() {
            continue;
        }
        if let Some(ty) = resolve_type(ast, id)? {
            ast.set_ty(id, ty);
        }
    }
    Ok(())
}

/// Compute a node's type, or `None` for constructs without a typing rule
/// (their declarations fall back to `auto` during lowering)
fn resolve_type(ast: &Ast, id: NodeId) -> Result<Option<Type>> {
    if let Some(ty) = ast.ty(id) {
        return Ok(Some(ty.clone()));
    }

    match ast.component(id) {
        Component::Expression(Expression::Binary {
            operator,
            left,
            right,
        }) => {
            if operator.is_comparison() || operator.is_logical() {
                return Ok(Some(Type::Primitive(Primitive::Bool)));
            }

            let lhs = resolve_type(ast, *left)?;
            let rhs = resolve_type(ast, *right)?;
            match (lhs, rhs) {
                (Some(lhs), Some(rhs)) => {
                    if lhs != rhs {
                        return Err(TypeCheckError::OperandMismatch {
                            left: lhs,
                            right: rhs,
                            span: label(ast, id),
                        });
                    }
                    Ok(Some(lhs))
                }
                (Some(ty), None) | (None, Some(ty)) => Ok(Some(ty)),
                (None, None) => Err(TypeCheckError::NoDeducibleType {
                    span: label(ast, id),
                }),
            }
        }

        Component::Statement(Statement::VariableDeclaration {
            declared, value, ..
        }) => {
            if let Some(declared) = declared {
                return Ok(Some(declared.clone()));
            }
            if let Some(value) = value {
                return resolve_type(ast, *value);
            }
            Err(TypeCheckError::MissingType {
                span: label(ast, id),
            })
        }

        Component::Expression(Expression::Block { body }) => match first_take(ast, body) {
            Some(value) => resolve_type(ast, value),
            None => Ok(Some(Type::Empty)),
        },

        Component::Expression(Expression::If {
            then, otherwise, ..
        }) => {
            let then_take = first_take(ast, block_body(ast, *then));
            let else_take = first_take(ast, block_body(ast, *otherwise));
            match (then_take, else_take) {
                (Some(value), Some(_)) => resolve_type(ast, value),
                (None, None) => Ok(Some(Type::Empty)),
                (Some(_), None) => Err(TypeCheckError::MissingTake {
                    branch: String::from("else"),
                    span: label(ast, *otherwise).or_else(|| label(ast, id)),
                }),
                (None, Some(_)) => Err(TypeCheckError::MissingTake {
                    branch: String::from("then"),
                    span: label(ast, *then).or_else(|| label(ast, id)),
                }),
            }
        }

        Component::Expression(Expression::Identifier(name)) => match lookup(ast, id, name) {
            Some(binding) => binding_type(ast, binding),
            None => Err(TypeCheckError::UndefinedIdentifier {
                name: name.clone(),
                span: label(ast, id),
            }),
        },

        Component::Expression(Expression::Number(value)) => {
            let primitive = if value.fract() == 0.0 {
                Primitive::I32
            } else {
                Primitive::F64
            };
            Ok(Some(Type::Primitive(primitive)))
        }
        Component::Expression(Expression::String(_)) => Ok(Some(Type::Primitive(Primitive::Str))),
        Component::Expression(Expression::Bool(_)) => Ok(Some(Type::Primitive(Primitive::Bool))),

        _ => Ok(None),
    }
}

/// The value of the first direct `take` statement in a statement list
fn first_take(ast: &Ast, body: &[NodeId]) -> Option<NodeId> {
    body.iter().find_map(|&statement| match ast.component(statement) {
        Component::Statement(Statement::Take { value }) => Some(*value),
        _ => None,
    })
}

fn block_body<'a>(ast: &'a Ast, id: NodeId) -> &'a [NodeId] {
    match ast.component(id) {
        Component::Expression(Expression::Block { body }) => body,
        Component::Statement(Statement::Block { body }) => body,
        _ => &[],
    }
}

/// What an identifier use can resolve to
enum Binding {
    Variable(NodeId),
    Function(NodeId),
    Parameter(Type),
    Native(Type),
    LoopAlias,
    Builtin,
}

/// Walk the parent chain outwards looking for a declaration of `name` that
/// is visible from `from`
fn lookup(ast: &Ast, from: NodeId, name: &str) -> Option<Binding> {
    let mut child = from;
    let mut parent = ast.parent(from);

    while let Some(scope) = parent {
        match ast.component(scope) {
            Component::Program { body }
            | Component::Statement(Statement::Block { body })
            | Component::Expression(Expression::Block { body }) => {
                if let Some(binding) = find_preceding(ast, body, child, name) {
                    return Some(binding);
                }
            }
            Component::Statement(Statement::FunctionDeclaration {
                name: function_name,
                params,
                ..
            }) => {
                // the function's own name enables recursion
                if function_name == name {
                    return Some(Binding::Function(scope));
                }
                if let Some(param) = params.iter().find(|param| param.name == name) {
                    return Some(Binding::Parameter(param.ty.clone()));
                }
            }
            Component::Expression(Expression::Function { params, .. }) => {
                if let Some(param) = params.iter().find(|param| param.name == name) {
                    return Some(Binding::Parameter(param.ty.clone()));
                }
            }
            Component::Statement(Statement::LoopOver { alias, .. }) => {
                if alias == name {
                    return Some(Binding::LoopAlias);
                }
            }
            _ => {}
        }
        child = scope;
        parent = ast.parent(scope);
    }

    if Builtin::from_name(name).is_some() {
        Some(Binding::Builtin)
    } else {
        None
    }
}

/// Scan the statements before `child` in `body`, nearest first
fn find_preceding(ast: &Ast, body: &[NodeId], child: NodeId, name: &str) -> Option<Binding> {
    let end = body.iter().position(|&statement| statement == child).unwrap_or(0);
    body[..end]
        .iter()
        .rev()
        .find_map(|&statement| match ast.component(statement) {
            Component::Statement(Statement::VariableDeclaration { name: found, .. })
                if found == name =>
            {
                Some(Binding::Variable(statement))
            }
            Component::Statement(Statement::FunctionDeclaration { name: found, .. })
                if found == name =>
            {
                Some(Binding::Function(statement))
            }
            Component::Statement(Statement::NativeCode { exposing, .. }) => exposing
                .iter()
                .find(|param| param.name == name)
                .map(|param| Binding::Native(param.ty.clone())),
            _ => None,
        })
}

fn binding_type(ast: &Ast, binding: Binding) -> Result<Option<Type>> {
    match binding {
        Binding::Variable(declaration) => resolve_type(ast, declaration),
        Binding::Function(declaration) => match ast.component(declaration) {
            Component::Statement(Statement::FunctionDeclaration { return_type, .. }) => {
                Ok(Some(return_type.clone()))
            }
            _ => Ok(None),
        },
        Binding::Parameter(ty) | Binding::Native(ty) => Ok(Some(ty)),
        Binding::LoopAlias | Binding::Builtin => Ok(None),
    }
}

fn check_identifiers(ast: &Ast) -> Result<()> {
    for id in ast.walk() {
        if let Component::Expression(Expression::Identifier(name)) = ast.component(id) {
            if lookup(ast, id, name).is_none() {
                return Err(TypeCheckError::UndefinedIdentifier {
                    name: name.clone(),
                    span: label(ast, id),
                });
            }
        }
    }
    Ok(())
}
