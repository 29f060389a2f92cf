use crate::ast::{AstNode, NodeKind, SyntaxTree};
use crate::error::{Diagnostic, Span};
use crate::lexer::{Keyword, OperatorKind, Scanner, Token, TokenKind};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    LeftToRight,
    RightToLeft,
}

/// One row of the operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorInfo {
    pub precedence: i32,
    pub assoc: Assoc,
    /// Operands required on the left (0 or 1).
    pub left: u8,
    /// Operands required on the right (0 or 1).
    pub right: u8,
    /// Replacement operator when no left operand is present.
    pub zero_left: Option<OperatorKind>,
}

const fn info(precedence: i32, assoc: Assoc, left: u8, right: u8, zero_left: Option<OperatorKind>) -> OperatorInfo {
    OperatorInfo {
        precedence,
        assoc,
        left,
        right,
        zero_left,
    }
}

/// Precedence table; higher binds tighter. Brackets and statement
/// punctuation have no entry because the builder handles them directly.
pub fn operator_info(op: OperatorKind) -> Option<OperatorInfo> {
    use Assoc::*;
    use OperatorKind::*;

    let row = match op {
        PostIncrement => info(15, LeftToRight, 1, 0, Some(PreIncrement)),
        PostDecrement => info(15, LeftToRight, 1, 0, Some(PreDecrement)),
        Factorial => info(15, LeftToRight, 1, 0, Some(LogicNot)),
        Power => info(14, RightToLeft, 1, 1, None),
        PreIncrement | PreDecrement | Positive | Negative | LogicNot | BitNot => {
            info(13, RightToLeft, 0, 1, None)
        }
        Mul | Div | Mod => info(12, LeftToRight, 1, 1, None),
        Add => info(11, LeftToRight, 1, 1, Some(Positive)),
        Sub => info(11, LeftToRight, 1, 1, Some(Negative)),
        Less | Greater | LessEqual | GreaterEqual => info(10, LeftToRight, 1, 1, None),
        Equal | NotEqual => info(9, LeftToRight, 1, 1, None),
        BitAnd => info(8, LeftToRight, 1, 1, None),
        BitXor => info(7, LeftToRight, 1, 1, None),
        BitOr => info(6, LeftToRight, 1, 1, None),
        LogicAnd => info(5, LeftToRight, 1, 1, None),
        LogicXor => info(4, LeftToRight, 1, 1, None),
        LogicOr => info(3, LeftToRight, 1, 1, None),
        Assign => info(2, RightToLeft, 1, 1, None),
        Comma => info(1, LeftToRight, 1, 1, None),
        Colon | Semicolon | LeftParen | RightParen | LeftBracket | RightBracket | LeftBrace
        | RightBrace | Call | Access => return None,
    };
    Some(row)
}

fn is_boundary(node: Option<&AstNode>) -> bool {
    match node {
        None => true,
        Some(node) => node.is_statement() || node.open_bracket() == Some(OperatorKind::LeftBrace),
    }
}

/// Unfold a comma chain into its operands, left to right. Long argument
/// lists nest deeply, so this walks an explicit worklist.
fn flatten_comma(node: AstNode, out: &mut Vec<AstNode>) {
    let mut pending = vec![node];
    while let Some(mut node) = pending.pop() {
        if node.kind == NodeKind::Expression && node.operator() == Some(OperatorKind::Comma) {
            pending.extend(std::mem::take(&mut node.children).into_iter().rev());
        } else {
            out.push(node);
        }
    }
}

/// `else` already attached, no more `elif`/`else` allowed.
fn branch_closed(branch: &AstNode) -> bool {
    let n = branch.children.len();
    n >= 2 && branch.children[n - 2].token.is_none()
}

fn can_extend_branch(node: Option<&AstNode>) -> bool {
    matches!(node, Some(branch) if branch.kind == NodeKind::Branch
        && branch.children.len() % 2 == 0
        && !branch_closed(branch))
}

/// Operator-precedence tree builder. Tokens are shifted onto a working stack
/// one at a time and reduced ("meshed") into expression and statement nodes
/// as soon as precedence allows.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<AstNode>,
    errors: Vec<Diagnostic>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    fn error(&mut self, token: &Token, message: String) {
        debug!(row = token.row, column = token.column, %message, "parse error");
        self.errors.push(Diagnostic::parse_error(
            token.row,
            token.column,
            token.span,
            message,
        ));
    }

    fn error_at_node(&mut self, node: &AstNode, message: String) {
        let (row, column) = node.position();
        let span = node.span().unwrap_or_default();
        self.errors
            .push(Diagnostic::parse_error(row, column, span, message));
    }

    fn top(&self) -> Option<&AstNode> {
        self.stack.last()
    }

    fn top_is_operand(&self) -> bool {
        self.top().map(AstNode::is_operand).unwrap_or(false)
    }

    fn innermost_bracket(&self) -> Option<OperatorKind> {
        self.stack.iter().rev().find_map(AstNode::open_bracket)
    }

    fn push_dummy(&mut self, at: &Token) {
        let dummy = Token::dummy(at.row, at.column, Span::single(at.span.start));
        self.stack.push(AstNode::single(dummy));
    }

    pub fn push_token(&mut self, token: Token) {
        match token.kind {
            TokenKind::Comment => {}
            TokenKind::Decimal(_) | TokenKind::String(_) | TokenKind::Variable | TokenKind::Dummy => {
                self.push_value(token)
            }
            TokenKind::Keyword(kw) => self.push_keyword(token, kw),
            TokenKind::Operator(op) => match op {
                OperatorKind::LeftParen | OperatorKind::LeftBracket | OperatorKind::LeftBrace => {
                    self.push_open(token)
                }
                OperatorKind::RightParen => self.close_group(token, OperatorKind::LeftParen),
                OperatorKind::RightBracket => self.close_group(token, OperatorKind::LeftBracket),
                OperatorKind::RightBrace => self.close_block(token),
                OperatorKind::Semicolon => self.end_statement(token),
                OperatorKind::Colon => self.push_label(token),
                op => self.push_operator(token, op),
            },
        }
    }

    fn push_value(&mut self, token: Token) {
        if self.top_is_operand() {
            self.error(&token, format!("Expected operator before '{}'", token.text));
            return;
        }
        self.stack.push(AstNode::single(token));
    }

    fn push_keyword(&mut self, token: Token, kw: Keyword) {
        let allowed = match self.top() {
            None => true,
            Some(node) => {
                node.is_statement()
                    || node.open_bracket() == Some(OperatorKind::LeftBrace)
                    || (kw == Keyword::Var
                        && (node.open_bracket() == Some(OperatorKind::LeftParen) || node.is_separator()))
            }
        };
        if !allowed {
            self.error(&token, format!("Unexpected keyword '{}'", kw.as_str()));
            return;
        }
        self.stack.push(AstNode::single(token));
    }

    fn push_open(&mut self, token: Token) {
        if token.is_operator(OperatorKind::LeftBrace) {
            if let Some(op) = self.top().and_then(AstNode::pending_operator) {
                self.error(
                    &token,
                    format!("Expected expression after '{}', found '{{'", op.symbol()),
                );
                return;
            }
        }
        self.stack.push(AstNode::single(token));
    }

    fn push_operator(&mut self, mut token: Token, mut op: OperatorKind) {
        let Some(mut row) = operator_info(op) else {
            self.error(&token, format!("Unexpected '{}'", token.text));
            return;
        };

        let mut has_left = self.top_is_operand();

        // Keep empty positional slots: `f(a,,c)`.
        if op == OperatorKind::Comma
            && !has_left
            && matches!(
                self.innermost_bracket(),
                Some(OperatorKind::LeftParen | OperatorKind::LeftBracket)
            )
            && self.top().map(|n| n.is_separator() || n.open_bracket().is_some() || n.pending_operator() == Some(OperatorKind::Comma)).unwrap_or(false)
        {
            self.push_dummy(&token);
            has_left = true;
        }

        if row.left == 1 && !has_left {
            match row.zero_left.and_then(|unary| operator_info(unary).map(|r| (unary, r))) {
                Some((unary, unary_row)) => {
                    op = unary;
                    row = unary_row;
                    token.kind = TokenKind::Operator(unary);
                }
                None => {
                    self.error(&token, format!("Missing left operand for '{}'", token.text));
                    return;
                }
            }
        } else if row.left == 0 && has_left {
            self.error(&token, format!("Unexpected '{}' after a value", token.text));
            return;
        }

        if row.left == 1 {
            self.mesh(row.precedence, row.assoc);
        }

        trace!(op = op.symbol(), precedence = row.precedence, "shift operator");
        self.stack.push(AstNode::single(token));

        if row.right == 0 {
            self.fold_postfix();
        }
    }

    /// Reduce every pending operator that binds at least as tightly as an
    /// incoming operator of the given precedence and associativity.
    fn mesh(&mut self, precedence: i32, assoc: Assoc) {
        loop {
            let n = self.stack.len();
            if n < 2 || !self.stack[n - 1].is_operand() {
                break;
            }
            let Some(pending) = self.stack[n - 2].pending_operator() else {
                break;
            };
            let Some(row) = operator_info(pending) else {
                break;
            };
            let reduce = row.precedence > precedence
                || (row.precedence == precedence && assoc == Assoc::LeftToRight);
            if !reduce || !self.fold() {
                break;
            }
        }
    }

    fn reduce_all(&mut self) {
        self.mesh(i32::MIN, Assoc::LeftToRight);
    }

    /// Fold `[left?, op, right]` on top of the stack into one expression.
    fn fold(&mut self) -> bool {
        let (Some(right), Some(mut op_node)) = (self.stack.pop(), self.stack.pop()) else {
            return false;
        };
        let Some(row) = op_node.pending_operator().and_then(operator_info) else {
            self.stack.push(op_node);
            self.stack.push(right);
            return false;
        };

        let mut children = Vec::with_capacity(2);
        if row.left == 1 {
            match self.stack.pop() {
                Some(left) if left.is_operand() => children.push(left),
                other => {
                    if let Some(node) = other {
                        self.stack.push(node);
                    }
                    self.error_at_node(&op_node, "Missing left operand".to_string());
                    self.stack.push(right);
                    return false;
                }
            }
        }
        children.push(right);

        trace!(op = ?op_node.operator(), "mesh");
        let token = op_node.token.take();
        self.stack
            .push(AstNode::new(NodeKind::Expression, token, children));
        true
    }

    fn fold_postfix(&mut self) {
        let Some(mut op_node) = self.stack.pop() else {
            return;
        };
        match self.stack.pop() {
            Some(left) if left.is_operand() => {
                self.stack
                    .push(AstNode::new(NodeKind::Expression, op_node.token.take(), vec![left]));
            }
            other => {
                if let Some(node) = other {
                    self.stack.push(node);
                }
                self.error_at_node(&op_node, "Missing operand for postfix operator".to_string());
            }
        }
    }

    /// Reduce everything pending; drop dangling operators with an error.
    fn complete_expression(&mut self) {
        loop {
            self.reduce_all();
            if self.top().and_then(AstNode::pending_operator).is_none() {
                break;
            }
            if let Some(node) = self.stack.pop() {
                let symbol = node.token.as_ref().map(|t| t.text.clone()).unwrap_or_default();
                self.error_at_node(&node, format!("Expected expression after '{}'", symbol));
            }
        }
    }

    fn close_group(&mut self, token: Token, open: OperatorKind) {
        if self.top().and_then(AstNode::pending_operator) == Some(OperatorKind::Comma) {
            self.push_dummy(&token);
        }
        self.complete_expression();

        let has_separators = self
            .stack
            .iter()
            .rev()
            .take_while(|n| n.open_bracket().is_none())
            .any(AstNode::is_separator);

        if has_separators {
            self.finish_head_declaration();
            if self.top().map(AstNode::is_separator).unwrap_or(false) {
                self.push_dummy(&token);
            }
        }

        let mut items = Vec::new();
        let mut marker = loop {
            match self.stack.pop() {
                Some(node) if node.open_bracket() == Some(open) => break node,
                Some(node) if node.open_bracket().is_some() => {
                    let expected = node.operator().map(|o| o.symbol()).unwrap_or("");
                    self.error(
                        &token,
                        format!("Mismatched '{}': '{}' is still open", token.text, expected),
                    );
                    self.stack.push(node);
                    self.restore(items);
                    return;
                }
                Some(node) => items.push(node),
                None => {
                    self.error(&token, format!("Unmatched '{}'", token.text));
                    self.restore(items);
                    return;
                }
            }
        };
        items.reverse();

        let children = if has_separators {
            self.split_parts(items, &token)
        } else {
            self.group_children(items)
        };

        let Some(open_token) = marker.token.take() else {
            return;
        };
        let mut group = AstNode::expression(open_token, children);

        if !self.top_is_operand() {
            self.stack.push(group);
            return;
        }

        let Some(target) = self.stack.pop() else {
            return;
        };
        let Some(mut op_token) = group.token.clone() else {
            return;
        };

        if open == OperatorKind::LeftParen {
            op_token.kind = TokenKind::Operator(OperatorKind::Call);
            self.stack
                .push(AstNode::expression(op_token, vec![target, group]));
        } else {
            let mut index = std::mem::take(&mut group.children);
            if index.len() != 1 {
                self.error(&op_token, "Array index requires exactly one expression".to_string());
                self.stack.push(target);
                return;
            }
            op_token.kind = TokenKind::Operator(OperatorKind::Access);
            let index = index.remove(0);
            self.stack
                .push(AstNode::expression(op_token, vec![target, index]));
        }
    }

    fn restore(&mut self, mut items: Vec<AstNode>) {
        items.reverse();
        self.stack.extend(items);
    }

    fn group_children(&mut self, items: Vec<AstNode>) -> Vec<AstNode> {
        let mut children = Vec::new();
        let mut items = items.into_iter();
        if let Some(first) = items.next() {
            flatten_comma(first, &mut children);
        }
        for extra in items {
            self.error_at_node(&extra, "Missing operator between expressions".to_string());
        }
        children
    }

    /// `(init; cond; step)` parts separated by `;` markers.
    fn split_parts(&mut self, items: Vec<AstNode>, close: &Token) -> Vec<AstNode> {
        let mut parts = Vec::new();
        let mut current: Vec<AstNode> = Vec::new();
        for item in items {
            if item.is_separator() {
                let part = self.take_part(std::mem::take(&mut current), item.token.as_ref().unwrap_or(close));
                parts.push(part);
            } else {
                current.push(item);
            }
        }
        let last = self.take_part(current, close);
        parts.push(last);
        parts
    }

    fn take_part(&mut self, mut part: Vec<AstNode>, at: &Token) -> AstNode {
        if part.len() > 1 {
            self.error(at, "Expected ';' between expressions".to_string());
        }
        if part.is_empty() {
            AstNode::single(Token::dummy(at.row, at.column, Span::single(at.span.start)))
        } else {
            part.remove(0)
        }
    }

    fn end_statement(&mut self, token: Token) {
        match self.innermost_bracket() {
            Some(OperatorKind::LeftParen) => {
                if self.top().and_then(AstNode::pending_operator) == Some(OperatorKind::Comma) {
                    self.push_dummy(&token);
                }
                self.complete_expression();
                self.finish_head_declaration();
                let empty_part = self
                    .top()
                    .map(|n| n.is_separator() || n.open_bracket().is_some())
                    .unwrap_or(true);
                if empty_part {
                    self.push_dummy(&token);
                }
                self.stack.push(AstNode::single(token));
            }
            Some(OperatorKind::LeftBracket) => {
                self.error(&token, "Unexpected ';' inside '[]'".to_string());
            }
            _ => {
                self.complete_expression();
                self.finish_statement(token);
            }
        }
    }

    /// `var` declarations inside a `for` head.
    fn finish_head_declaration(&mut self) {
        let n = self.stack.len();
        if n >= 2 && self.stack[n - 1].is_operand() && self.stack[n - 2].keyword() == Some(Keyword::Var) {
            if let (Some(expr), Some(kw_node)) = (self.stack.pop(), self.stack.pop()) {
                self.build_keyword_statement(kw_node, Some(expr));
            }
        }
    }

    /// Turn whatever sits above the last statement boundary into a statement.
    fn finish_statement(&mut self, semicolon: Token) {
        if self.top_is_operand() {
            let Some(expr) = self.stack.pop() else {
                return;
            };
            let head = self
                .top()
                .filter(|n| n.kind == NodeKind::Single)
                .and_then(AstNode::keyword);
            if head.is_some() {
                if let Some(kw_node) = self.stack.pop() {
                    self.build_keyword_statement(kw_node, Some(expr));
                }
            } else {
                self.stack.push(AstNode::new(
                    NodeKind::Statement,
                    Some(semicolon),
                    vec![expr],
                ));
            }
        } else if self.top().map(|n| n.kind == NodeKind::Single && n.keyword().is_some()).unwrap_or(false) {
            if let Some(kw_node) = self.stack.pop() {
                self.build_keyword_statement(kw_node, None);
            }
        }
    }

    fn build_keyword_statement(&mut self, mut kw_node: AstNode, expr: Option<AstNode>) {
        let Some(kw) = kw_node.keyword() else {
            return;
        };
        let Some(token) = kw_node.token.take() else {
            return;
        };

        match (kw, expr) {
            (Keyword::Var, Some(expr)) => {
                let mut decls = Vec::new();
                flatten_comma(expr, &mut decls);
                for decl in &decls {
                    let valid = decl.name().is_some()
                        || (decl.operator() == Some(OperatorKind::Assign)
                            && decl.children.first().and_then(AstNode::name).is_some());
                    if !valid {
                        self.error_at_node(decl, "Expected a variable name in declaration".to_string());
                    }
                }
                self.stack
                    .push(AstNode::new(NodeKind::Declare, Some(token), decls));
            }
            (Keyword::Var, None) => {
                self.error(&token, "Expected a variable name after 'var'".to_string());
            }
            (Keyword::Goto, Some(label)) if label.name().is_some() => {
                self.stack
                    .push(AstNode::new(NodeKind::Jump, Some(token), vec![label]));
            }
            (Keyword::Goto, _) => {
                self.error(&token, "Expected a label name after 'goto'".to_string());
            }
            (Keyword::Return | Keyword::Exit, expr) => {
                self.stack
                    .push(AstNode::new(NodeKind::Jump, Some(token), expr.into_iter().collect()));
            }
            (Keyword::Break | Keyword::Continue, None) => {
                self.stack
                    .push(AstNode::new(NodeKind::Jump, Some(token), Vec::new()));
            }
            (Keyword::Break | Keyword::Continue, Some(_)) => {
                self.error(&token, format!("Unexpected expression after '{}'", kw.as_str()));
            }
            (Keyword::If | Keyword::Elif | Keyword::While | Keyword::For, _) => {
                self.error(
                    &token,
                    format!("Expected '{{' block after '{}' condition", kw.as_str()),
                );
            }
            (Keyword::Else, _) => {
                self.error(&token, "Expected '{' block after 'else'".to_string());
            }
        }
    }

    fn push_label(&mut self, token: Token) {
        let n = self.stack.len();
        let is_label = n >= 1
            && self.stack[n - 1].name().is_some()
            && is_boundary(if n >= 2 { Some(&self.stack[n - 2]) } else { None });
        if !is_label {
            self.error(&token, "Unexpected ':'".to_string());
            return;
        }
        if let Some(mut name) = self.stack.pop() {
            self.stack
                .push(AstNode::new(NodeKind::Label, name.token.take(), Vec::new()));
        }
    }

    fn close_block(&mut self, token: Token) {
        match self.innermost_bracket() {
            Some(OperatorKind::LeftBrace) => {}
            Some(open) => {
                self.error(
                    &token,
                    format!("Mismatched '}}': '{}' is still open", open.symbol()),
                );
                return;
            }
            None => {
                self.error(&token, "Unmatched '}'".to_string());
                return;
            }
        }

        // A final statement may omit its ';'.
        if !is_boundary(self.top()) {
            self.complete_expression();
            let semicolon = Token::new(
                TokenKind::Operator(OperatorKind::Semicolon),
                ";".to_string(),
                token.row,
                token.column,
                Span::single(token.span.start),
            );
            self.finish_statement(semicolon);
        }

        let mut body = Vec::new();
        let mut marker = loop {
            match self.stack.pop() {
                Some(node) if node.open_bracket() == Some(OperatorKind::LeftBrace) => break node,
                Some(node) if node.is_statement() => body.push(node),
                Some(node) => self.error_at_node(&node, "Incomplete statement in block".to_string()),
                None => {
                    self.error(&token, "Unmatched '}'".to_string());
                    self.restore(body);
                    return;
                }
            }
        };
        body.reverse();

        let block = AstNode::new(NodeKind::Statement, marker.token.take(), body);
        self.attach_block(block, &token);
    }

    /// Decide what a finished `{}` block belongs to.
    fn attach_block(&mut self, block: AstNode, close: &Token) {
        let top_keyword = self
            .top()
            .filter(|n| n.kind == NodeKind::Single)
            .and_then(AstNode::keyword);

        if top_keyword == Some(Keyword::Else) {
            let Some(else_node) = self.stack.pop() else {
                return;
            };
            if !can_extend_branch(self.top()) {
                self.error_at_node(&else_node, "'else' without a matching 'if'".to_string());
                return;
            }
            if let Some(branch) = self.stack.last_mut() {
                branch.children.push(AstNode::empty_condition());
                branch.children.push(block);
            }
            return;
        }

        if is_boundary(self.top()) {
            self.stack.push(block);
            return;
        }

        if !self.top_is_operand() {
            self.error(close, "Unexpected block".to_string());
            return;
        }

        let n = self.stack.len();
        let head = if n >= 2 && self.stack[n - 2].kind == NodeKind::Single {
            self.stack[n - 2].keyword()
        } else {
            None
        };

        if let Some(kw @ (Keyword::If | Keyword::Elif | Keyword::While | Keyword::For)) = head {
            let (Some(cond), Some(mut kw_node)) = (self.stack.pop(), self.stack.pop()) else {
                return;
            };
            if cond.operator() != Some(OperatorKind::LeftParen) || cond.kind != NodeKind::Expression {
                self.error_at_node(
                    &kw_node,
                    format!("Expected '(' condition after '{}'", kw.as_str()),
                );
                return;
            }
            match kw {
                Keyword::If => {
                    self.stack
                        .push(AstNode::new(NodeKind::Branch, kw_node.token.take(), vec![cond, block]));
                }
                Keyword::Elif => {
                    if !can_extend_branch(self.top()) {
                        self.error_at_node(&kw_node, "'elif' without a matching 'if'".to_string());
                        return;
                    }
                    if let Some(branch) = self.stack.last_mut() {
                        branch.children.push(cond);
                        branch.children.push(block);
                    }
                }
                Keyword::While => {
                    self.stack
                        .push(AstNode::new(NodeKind::Loop, kw_node.token.take(), vec![cond, block]));
                }
                _ => {
                    if cond.children.len() != 3 {
                        self.error_at_node(
                            &kw_node,
                            "'for' needs '(init; condition; step)'".to_string(),
                        );
                        return;
                    }
                    self.stack
                        .push(AstNode::new(NodeKind::Loop, kw_node.token.take(), vec![cond, block]));
                }
            }
            return;
        }

        let below_is_boundary = is_boundary(if n >= 2 { Some(&self.stack[n - 2]) } else { None });
        let is_call = self.top().and_then(AstNode::operator) == Some(OperatorKind::Call);
        if is_call && below_is_boundary {
            if let Some(call) = self.stack.pop() {
                self.define_function(call, block);
            }
            return;
        }

        self.error(close, "Unexpected block after expression".to_string());
    }

    fn define_function(&mut self, mut call: AstNode, body: AstNode) {
        let mut children = std::mem::take(&mut call.children);
        let name_ok = children.first().and_then(AstNode::name).is_some();
        let params_ok = children
            .get(1)
            .map(|params| params.children.iter().all(|p| p.name().is_some()))
            .unwrap_or(false);

        if !name_ok || !params_ok || children.len() != 2 {
            let message = if name_ok {
                "Function parameters must be plain names"
            } else {
                "Function name must be an identifier"
            };
            match children.first() {
                Some(first) => {
                    let first = first.clone();
                    self.error_at_node(&first, message.to_string());
                }
                None => self.errors.push(Diagnostic::parse_error(0, 0, Span::default(), message.to_string())),
            }
            return;
        }

        let name_token = children[0].token.clone();
        children.push(body);
        self.stack
            .push(AstNode::new(NodeKind::Function, name_token, children));
    }

    /// Close any open statement and collect the program root.
    pub fn finish(mut self, source: &str, extra: Vec<Diagnostic>) -> SyntaxTree {
        if self.innermost_bracket().is_none() && !is_boundary(self.top()) {
            self.complete_expression();
            let end = source.len();
            let (row, column) = self.top().map(AstNode::position).unwrap_or((1, 1));
            let semicolon = Token::new(
                TokenKind::Operator(OperatorKind::Semicolon),
                ";".to_string(),
                row,
                column,
                Span::single(end),
            );
            self.finish_statement(semicolon);
        }

        // Leftovers around an unclosed bracket are reported through the bracket.
        let unclosed = self.innermost_bracket().is_some();
        let mut statements = Vec::new();
        for node in std::mem::take(&mut self.stack) {
            if let Some(open) = node.open_bracket() {
                self.error_at_node(&node, format!("Unclosed '{}'", open.symbol()));
            } else if node.is_statement() {
                statements.push(node);
            } else if !unclosed {
                self.error_at_node(&node, "Incomplete statement".to_string());
            }
        }

        self.errors.extend(extra);
        self.errors.sort_by_key(|d| (d.row, d.column));

        let root = AstNode::new(NodeKind::Program, None, statements);
        SyntaxTree::new(root, source, self.errors)
    }
}

/// Drives the scanner into the tree builder.
pub struct Parser<'a> {
    source: &'a str,
    scanner: Scanner<'a>,
    builder: TreeBuilder,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            scanner: Scanner::new(source),
            builder: TreeBuilder::new(),
        }
    }

    /// Always returns a tree; check [`SyntaxTree::has_errors`] before running it.
    pub fn parse(mut self) -> SyntaxTree {
        loop {
            match self.scanner.next_token() {
                Ok(Some(token)) => self.builder.push_token(token),
                Ok(None) => break,
                Err(diagnostic) => {
                    self.builder.record(diagnostic);
                    break;
                }
            }
        }
        let scan_diagnostics = self.scanner.take_diagnostics();
        self.builder.finish(self.source, scan_diagnostics)
    }
}

pub fn parse(source: &str) -> SyntaxTree {
    Parser::new(source).parse()
}
