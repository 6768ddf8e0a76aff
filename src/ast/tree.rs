use crate::symbols::function::FuncId;
use crate::symbols::scope::ScopeId;
use crate::types::estype::TypeId;
use crate::Position;

/// Syntactic kind of a node.
///
/// Child shapes the annotator relies on:
///
/// - `ModuleStart`: optional `Package` / `Module` leaves, then statements
/// - `DefFunc`: `DefFuncModifiers`, `Name`, return `TypeName`,
///   `DefFuncArgs` (alternating `Name` / `TypeName`), optional `Block`
/// - `If`: alternating condition / `Block` pairs, optional trailing else
///   `Block`
/// - `For`: loop-variable `Name`, `Range` (stop, start+stop or
///   start+stop+step), `Block`
/// - `While`: condition, `Block`
/// - `CallFunc`: callee `Name`, then argument expressions
/// - `Assign`: assignee (`Variable`, `Dereference` or `MemberAccess`),
///   expression; `ListAssign`: `AssigneeList`, `ExpressionList`
/// - `Struct`: `Name`, then alternating member `Name` / `TypeName`
/// - `TypeName`: base `Name`, optional `Star` / `DoubleStar` suffixes;
///   `FunctionTypeName`: parameter `TypeName`s with the return type last
/// - literal nodes carry their raw lexeme in `text` and have no children
/// - operators: one or two operand children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    ModuleStart,
    Package,
    Module,
    ImportAll,
    DefFunc,
    DefFuncModifiers,
    DefFuncArgs,
    Block,
    Pass,
    Return,
    Assert,
    If,
    For,
    Range,
    While,
    Break,
    Continue,
    IntegerConstant,
    FloatConstant,
    StringConstant,
    BooleanConstant,
    NoneConstant,
    CallFunc,
    Variable,
    DefVar,
    Assign,
    ListAssign,
    AssigneeList,
    ExpressionList,
    Name,
    TypeName,
    FunctionTypeName,
    Struct,
    Alias,
    Typedef,
    Cast,
    ImplicitCast,
    Dereference,
    MemberAccess,
    AddressOf,
    New,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Not,
    And,
    Or,
    Xor,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

impl NodeKind {
    pub fn is_basic_operator(&self) -> bool {
        matches!(
            self,
            NodeKind::Plus
                | NodeKind::Minus
                | NodeKind::Star
                | NodeKind::DoubleStar
                | NodeKind::Slash
                | NodeKind::DoubleSlash
                | NodeKind::Percent
                | NodeKind::Not
                | NodeKind::And
                | NodeKind::Or
                | NodeKind::Xor
                | NodeKind::Less
                | NodeKind::LessEqual
                | NodeKind::Equal
                | NodeKind::NotEqual
                | NodeKind::GreaterEqual
                | NodeKind::Greater
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            NodeKind::Less
                | NodeKind::LessEqual
                | NodeKind::Equal
                | NodeKind::NotEqual
                | NodeKind::GreaterEqual
                | NodeKind::Greater
        )
    }
}

/// Handle to a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Width and signedness facts about an integer literal, retained for the
/// literal-narrowing exception of the conversion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerAttrs {
    pub signed: bool,
    /// Minimal bit width able to represent the literal's value.
    pub min_bits: u8,
    /// Width after default promotion / suffix selection.
    pub bits: u8,
}

/// One parse-tree node plus the annotations the type checker attaches.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub text: String,
    pub children: Vec<NodeId>,
    pub position: Position,
    /// Resolved type; present on every expression node after annotation.
    pub es_type: Option<TypeId>,
    /// Resolved callee / defined function on call and definition nodes.
    pub es_function: Option<FuncId>,
    /// Symbol table of the scope this node introduces, if any.
    pub scope: Option<ScopeId>,
    pub integer_attrs: Option<IntegerAttrs>,
}

impl Node {
    pub fn new(kind: NodeKind, text: &str, position: Position) -> Self {
        Node {
            kind,
            text: text.to_string(),
            children: Vec::new(),
            position,
            es_type: None,
            es_function: None,
            scope: None,
            integer_attrs: None,
        }
    }
}

/// Arena holding one module's parse tree.
///
/// The external parser builds the arena bottom-up and marks the
/// `ModuleStart` node as root; the annotator mutates nodes in place.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Adds a childless node.
    pub fn leaf(&mut self, kind: NodeKind, text: &str, position: Position) -> NodeId {
        self.add(Node::new(kind, text, position))
    }

    /// Adds a node with the given children.
    pub fn with_children(
        &mut self,
        kind: NodeKind,
        text: &str,
        position: Position,
        children: Vec<NodeId>,
    ) -> NodeId {
        let mut node = Node::new(kind, text, position);
        node.children = children;
        self.add(node)
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.node(id).text
    }

    pub fn position(&self, id: NodeId) -> Position {
        self.node(id).position
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
