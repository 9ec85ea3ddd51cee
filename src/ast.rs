//! The abstract syntax tree
//!
//! All nodes live in one arena owned by [Ast] and are addressed through
//! stable [NodeId] handles. A node stores the id of its parent, so scope
//! walks can move outward through plain index lookups; child edges are the
//! ownership edges and are stored inside the node kinds themselves.

use crate::{Span, Type};

pub type Ident = String;

/// A cheap, stable handle to a node in the [Ast] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
pub struct Node {
    pub component: Component,
    pub parent: Option<NodeId>,
    pub span: Option<Span>,

    /// Filled in by the type checker for a subset of node kinds
    pub ty: Option<Type>,
}

/// Every node is one of these three families
#[derive(Debug)]
pub enum Component {
    Program { body: Vec<NodeId> },
    Statement(Statement),
    Expression(Expression),

    /// A freshly reserved slot whose production is still being parsed.
    /// The parser replaces every one of these before it returns.
    Pending,
}

#[derive(Debug)]
pub enum Statement {
    Expression {
        expression: NodeId,
    },
    Empty,
    Block {
        body: Vec<NodeId>,
    },
    Take {
        value: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Break,
    Continue,
    If {
        condition: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    Loop {
        condition: NodeId,
        body: NodeId,
    },
    LoopOver {
        iterable: NodeId,
        alias: Ident,
        body: NodeId,
    },
    Fire {
        call: NodeId,
    },
    Defer {
        statement: NodeId,
    },
    VariableDeclaration {
        name: Ident,
        declared: Option<Type>,
        value: Option<NodeId>,
        mutable: bool,
        public: bool,
    },
    Assignment {
        target: NodeId,
        operator: AssignOp,
        value: NodeId,
    },
    FunctionDeclaration {
        name: Ident,
        params: Vec<Parameter>,
        return_type: Type,
        body: NodeId,
        public: bool,
    },
    StructDeclaration {
        name: Ident,
        implements: Vec<Ident>,
        attributes: Vec<(Ident, Type)>,
    },
    InterfaceDeclaration {
        name: Ident,
        implements: Vec<Ident>,
        attributes: Vec<(Ident, Type)>,
    },
    /// Verbatim C++ source with the symbols it makes visible
    NativeCode {
        code: String,
        exposing: Vec<Parameter>,
    },
}

#[derive(Debug)]
pub enum Expression {
    Number(f64),
    String(String),
    Bool(bool),
    Identifier(Ident),
    Binary {
        operator: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Member {
        object: NodeId,
        property: Ident,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    Call {
        callee: NodeId,
        arguments: Vec<NodeId>,
    },
    /// An anonymous `fn (params) type -> body` literal
    Function {
        params: Vec<Parameter>,
        return_type: Option<Type>,
        body: NodeId,
    },
    /// An expression-valued `do { ... }` block
    Block {
        body: Vec<NodeId>,
    },
    If {
        condition: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    StructInstantiation {
        ty: Ident,
        attributes: Vec<(Ident, NodeId)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: Ident,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equals,
    NotEquals,
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xand,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessEq),
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterEq),
            "==" => Some(Self::Equals),
            "!=" => Some(Self::NotEquals),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            "!&&" => Some(Self::Nand),
            "!||" => Some(Self::Nor),
            "~||" => Some(Self::Xor),
            "~&&" => Some(Self::Xand),
            _ => None,
        }
    }

    /// Relational and equality operators
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Less
                | Self::LessEq
                | Self::Greater
                | Self::GreaterEq
                | Self::Equals
                | Self::NotEquals
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::And | Self::Or | Self::Nand | Self::Nor | Self::Xor | Self::Xand
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Nand => "!&&",
            Self::Nor => "!||",
            Self::Xor => "~||",
            Self::Xand => "~&&",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Assign),
            "+=" => Some(Self::AddAssign),
            "-=" => Some(Self::SubAssign),
            "*=" => Some(Self::MulAssign),
            "/=" => Some(Self::DivAssign),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssignOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot whose component is filled in later, so that children
    /// can be built with their parent's id already known
    pub fn reserve(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            component: Component::Pending,
            parent,
            span: None,
            ty: None,
        });
        id
    }

    pub fn complete(&mut self, id: NodeId, component: Component) {
        self.nodes[id.0].component = component;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn component(&self, id: NodeId) -> &Component {
        &self.nodes[id.0].component
    }

    pub fn component_mut(&mut self, id: NodeId) -> &mut Component {
        &mut self.nodes[id.0].component
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.nodes[id.0].parent = Some(parent);
    }

    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.nodes[id.0].span
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id.0].span = Some(span);
    }

    pub fn ty(&self, id: NodeId) -> Option<&Type> {
        self.nodes[id.0].ty.as_ref()
    }

    pub fn set_ty(&mut self, id: NodeId, ty: Type) {
        self.nodes[id.0].ty = Some(ty);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node allocated at or after `len`; used by the parser to
    /// roll back a speculative production
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    /// The program node; the parser allocates it first
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn program_body(&self) -> &[NodeId] {
        match self.component(self.root()) {
            Component::Program { body } => body,
            _ => &[],
        }
    }

    /// The child nodes of a component, in source order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.component(id) {
            Component::Program { body } => body.clone(),
            Component::Statement(statement) => match statement {
                Statement::Expression { expression } => vec![*expression],
                Statement::Empty | Statement::Break | Statement::Continue => Vec::new(),
                Statement::Block { body } => body.clone(),
                Statement::Take { value } => vec![*value],
                Statement::Return { value } => value.iter().copied().collect(),
                Statement::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let mut children = vec![*condition, *then];
                    children.extend(otherwise);
                    children
                }
                Statement::Loop { condition, body } => vec![*condition, *body],
                Statement::LoopOver { iterable, body, .. } => vec![*iterable, *body],
                Statement::Fire { call } => vec![*call],
                Statement::Defer { statement } => vec![*statement],
                Statement::VariableDeclaration { value, .. } => value.iter().copied().collect(),
                Statement::Assignment { target, value, .. } => vec![*target, *value],
                Statement::FunctionDeclaration { body, .. } => vec![*body],
                Statement::StructDeclaration { .. }
                | Statement::InterfaceDeclaration { .. }
                | Statement::NativeCode { .. } => Vec::new(),
            },
            Component::Expression(expression) => match expression {
                Expression::Number(_)
                | Expression::String(_)
                | Expression::Bool(_)
                | Expression::Identifier(_) => Vec::new(),
                Expression::Binary { left, right, .. } => vec![*left, *right],
                Expression::Member { object, .. } => vec![*object],
                Expression::Index { object, index } => vec![*object, *index],
                Expression::Call { callee, arguments } => {
                    let mut children = vec![*callee];
                    children.extend(arguments);
                    children
                }
                Expression::Function { body, .. } => vec![*body],
                Expression::Block { body } => body.clone(),
                Expression::If {
                    condition,
                    then,
                    otherwise,
                } => vec![*condition, *then, *otherwise],
                Expression::StructInstantiation { attributes, .. } => {
                    attributes.iter().map(|(_, value)| *value).collect()
                }
            },
            Component::Pending => Vec::new(),
        }
    }

    /// All nodes reachable from the root, in depth-first source order
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        order
    }
}

use ptree::{print_tree, Style, TreeItem};
use std::borrow::Cow;
use std::io;

/// A node handle that [ptree] can render
#[derive(Clone)]
pub struct AstNode<'a> {
    ast: &'a Ast,
    id: NodeId,
}

impl Ast {
    pub fn pretty_print(&self) -> io::Result<()> {
        for &statement in self.program_body() {
            print_tree(&AstNode {
                ast: self,
                id: statement,
            })?;
        }
        Ok(())
    }
}

impl TreeItem for AstNode<'_> {
    type Child = Self;

    fn write_self<W: io::Write>(&self, f: &mut W, style: &Style) -> io::Result<()> {
        let label = match self.ast.component(self.id) {
            Component::Program { .. } => String::from("PROGRAM"),
            Component::Pending => String::from("PENDING"),
            Component::Statement(statement) => match statement {
                Statement::Expression { .. } => String::from("STMT"),
                Statement::Empty => String::from("EMPTY"),
                Statement::Block { .. } => String::from("BLOCK"),
                Statement::Take { .. } => String::from("TAKE"),
                Statement::Return { .. } => String::from("RETURN"),
                Statement::Break => String::from("BREAK"),
                Statement::Continue => String::from("CONTINUE"),
                Statement::If { .. } => String::from("IF"),
                Statement::Loop { .. } => String::from("LOOP"),
                Statement::LoopOver { alias, .. } => format!("LOOP-OVER as {alias}"),
                Statement::Fire { .. } => String::from("FIRE"),
                Statement::Defer { .. } => String::from("DEFER"),
                Statement::VariableDeclaration { name, mutable, .. } => {
                    if *mutable {
                        format!("LET MUT {name}")
                    } else {
                        format!("LET {name}")
                    }
                }
                Statement::Assignment { operator, .. } => format!("ASSIGN {operator}"),
                Statement::FunctionDeclaration { name, params, .. } => {
                    let params: Vec<String> = params
                        .iter()
                        .map(|param| format!("{} {}", param.name, param.ty))
                        .collect();
                    format!("FN {name}({})", params.join(", "))
                }
                Statement::StructDeclaration { name, .. } => format!("STRUCT {name}"),
                Statement::InterfaceDeclaration { name, .. } => format!("INTERFACE {name}"),
                Statement::NativeCode { .. } => String::from("NATIVE C++"),
            },
            Component::Expression(expression) => match expression {
                Expression::Number(value) => format!("{value}"),
                Expression::String(value) => format!("{value:?}"),
                Expression::Bool(value) => format!("{value}"),
                Expression::Identifier(name) => name.clone(),
                Expression::Binary { operator, .. } => format!("{operator}"),
                Expression::Member { property, .. } => format!(".{property}"),
                Expression::Index { .. } => String::from("INDEX"),
                Expression::Call { .. } => String::from("CALL"),
                Expression::Function { .. } => String::from("FN-LITERAL"),
                Expression::Block { .. } => String::from("BLOCK-EXPR"),
                Expression::If { .. } => String::from("IF-EXPR"),
                Expression::StructInstantiation { ty, .. } => format!("NEW {ty}"),
            },
        };

        write!(f, "{}", style.paint(label))
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let children: Vec<AstNode<'_>> = self
            .ast
            .children(self.id)
            .into_iter()
            .map(|id| AstNode { ast: self.ast, id })
            .collect();
        Cow::from(children)
    }
}
