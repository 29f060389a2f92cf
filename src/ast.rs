use crate::error::{Diagnostic, Span};
use crate::lexer::{Keyword, OperatorKind, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;
use std::fmt::{self, Write};

/// Node categories. A node's kind is settled while the tree-builder reduces
/// its stack (a bracket group becomes an expression, a keyword head becomes a
/// jump or declaration) and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A lone token: literal, identifier, keyword, pending operator or bracket marker.
    Single,
    /// `var a, b = 1;` with one child per declared name.
    Declare,
    /// A statement list. Token `{` means a scoped block, token `;` a single
    /// expression statement, no token a flat list.
    Statement,
    /// An operator application or a bracket group.
    Expression,
    /// `name(params) { body }`
    Function,
    /// `if`/`elif`/`else` chain as condition/body pairs.
    Branch,
    /// `while (cond) {}` or `for (init; cond; step) {}`
    Loop,
    /// `name:`
    Label,
    /// `goto`, `return`, `exit`, `break`, `continue`.
    Jump,
    Program,
}

#[derive(Debug, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub token: Option<Token>,
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn new(kind: NodeKind, token: Option<Token>, children: Vec<AstNode>) -> Self {
        Self {
            kind,
            token,
            children,
        }
    }

    pub fn single(token: Token) -> Self {
        Self::new(NodeKind::Single, Some(token), Vec::new())
    }

    pub fn expression(token: Token, children: Vec<AstNode>) -> Self {
        Self::new(NodeKind::Expression, Some(token), children)
    }

    /// The always-true condition attached to an `else` body.
    pub fn empty_condition() -> Self {
        Self::new(NodeKind::Expression, None, Vec::new())
    }

    pub fn operator(&self) -> Option<OperatorKind> {
        self.token.as_ref().and_then(Token::operator)
    }

    pub fn keyword(&self) -> Option<Keyword> {
        self.token.as_ref().and_then(Token::keyword)
    }

    /// Identifier text of a variable-reference node.
    pub fn name(&self) -> Option<&str> {
        match &self.token {
            Some(token) if self.kind == NodeKind::Single && token.kind == TokenKind::Variable => {
                Some(token.text.as_str())
            }
            _ => None,
        }
    }

    /// Completed value-producing nodes: literals, identifiers, dummies and
    /// reduced expressions.
    pub fn is_operand(&self) -> bool {
        match self.kind {
            NodeKind::Expression => true,
            NodeKind::Single => self.token.as_ref().map(Token::is_value).unwrap_or(false),
            _ => false,
        }
    }

    /// An operator token still waiting for its right operand.
    pub fn pending_operator(&self) -> Option<OperatorKind> {
        if self.kind != NodeKind::Single {
            return None;
        }
        match self.operator() {
            Some(op) if !op.is_open_bracket() && op != OperatorKind::Semicolon => Some(op),
            _ => None,
        }
    }

    pub fn open_bracket(&self) -> Option<OperatorKind> {
        if self.kind != NodeKind::Single {
            return None;
        }
        self.operator().filter(OperatorKind::is_open_bracket)
    }

    pub fn is_separator(&self) -> bool {
        self.kind == NodeKind::Single && self.operator() == Some(OperatorKind::Semicolon)
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Statement
                | NodeKind::Declare
                | NodeKind::Branch
                | NodeKind::Loop
                | NodeKind::Label
                | NodeKind::Jump
                | NodeKind::Function
        )
    }

    pub fn is_scoped_block(&self) -> bool {
        self.kind == NodeKind::Statement && self.operator() == Some(OperatorKind::LeftBrace)
    }

    pub fn span(&self) -> Option<Span> {
        self.token
            .as_ref()
            .map(|t| t.span)
            .or_else(|| ensure_sufficient_stack(|| self.children.iter().find_map(AstNode::span)))
    }

    /// Row/column of the node, falling back to its first located child.
    pub fn position(&self) -> (usize, usize) {
        if let Some(token) = &self.token {
            return (token.row, token.column);
        }
        self.children
            .iter()
            .map(AstNode::position)
            .find(|pos| *pos != (0, 0))
            .unwrap_or((0, 0))
    }

    fn dump(&self, out: &mut String, depth: usize) -> fmt::Result {
        let text = self.token.as_ref().map(|t| t.text.as_str()).unwrap_or("");
        writeln!(out, "{}{:?} {}", "  ".repeat(depth), self.kind, text)?;
        ensure_sufficient_stack(|| {
            for child in &self.children {
                child.dump(out, depth + 1)?;
            }
            Ok(())
        })
    }
}

impl Clone for AstNode {
    fn clone(&self) -> Self {
        ensure_sufficient_stack(|| Self::new(self.kind, self.token.clone(), self.children.clone()))
    }
}

/// Long operator chains nest one level per operator, so the subtree is
/// flattened onto a worklist instead of dropped recursively.
impl Drop for AstNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut out = String::new();
        self.dump(&mut out, 0)?;
        f.write_str(&out)
    }
}

/// Result of parsing: the program root, the source split into lines for
/// diagnostics, and every structural error found.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    root: AstNode,
    lines: Vec<String>,
    errors: Vec<Diagnostic>,
}

impl SyntaxTree {
    pub fn new(root: AstNode, source: &str, errors: Vec<Diagnostic>) -> Self {
        Self {
            root,
            lines: source.lines().map(str::to_string).collect(),
            errors,
        }
    }

    pub fn root(&self) -> &AstNode {
        &self.root
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Source line by 1-based row.
    pub fn line(&self, row: usize) -> Option<&str> {
        row.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Diagnostic::is_error)
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        for error in &self.errors {
            error.report(source, filename);
        }
    }
}
