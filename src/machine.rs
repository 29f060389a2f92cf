//! Tree-walking execution machine.
//!
//! The machine owns the variable heap and the environment arena. Every
//! execution call threads a [`FlowControl`] through; errors travel in the
//! `Result`, control transfers (`return`, `break`, `goto`, `exit`, ...)
//! travel in the flow. An expression evaluation that observes `exit`
//! returns `Ok(None)` and leaves the flow at Exit for its caller.

use crate::ast::{AstNode, NodeKind, SyntaxTree};
use crate::builtins;
use crate::environment::{EnvId, Environments, FigureHandle};
use crate::error::{ExecError, ExecResult};
use crate::evaluator;
use crate::flow::{FlowControl, FlowKind};
use crate::function::{ext_arg_name, Function, FunctionBody};
use crate::lexer::{Keyword, OperatorKind, TokenKind};
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;
use crate::variable::{Heap, Owner, Payload, VarId};
use std::rc::Rc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Nested calls allowed before `StackOverflow`.
    pub max_call_depth: usize,
    /// Print `print(...)` output directly instead of collecting it.
    pub echo_output: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            echo_output: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Ran to the end or returned.
    Finished,
    /// Stopped by `exit`.
    Exited,
    /// Nothing to run.
    Empty,
}

/// Result of running a program: how it ended and the value it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub completion: Completion,
    pub value: Value,
}

/// Arguments for a call: raw syntax evaluated in the caller's environment
/// and bound by value, or live variables bound by link.
#[derive(Debug, Clone, Copy)]
pub enum CallArgs<'a> {
    Syntax(&'a [AstNode]),
    Values(&'a [VarId]),
}

pub struct Machine {
    config: MachineConfig,
    heap: Heap,
    envs: Environments,
    root: EnvId,
    depth: usize,
    output: Vec<String>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    /// Build the root environment and install the system library.
    pub fn with_config(config: MachineConfig) -> Self {
        let mut envs = Environments::new();
        let root = envs.create("root", None);
        let mut machine = Self {
            config,
            heap: Heap::new(),
            envs,
            root,
            depth: 0,
            output: Vec::new(),
        };
        if let Err(err) = builtins::install(&mut machine, root) {
            warn!(%err, "system library not fully installed");
        }
        debug!(max_call_depth = machine.config.max_call_depth, "machine initialised");
        machine
    }

    /// Tear down every environment. Returns how many variables were still
    /// allocated afterwards, which is zero unless temporaries leaked.
    pub fn shutdown(mut self) -> ExecResult<usize> {
        for env in self.envs.live_ids() {
            self.envs.destroy(env, &mut self.heap)?;
        }
        let leaked = self.heap.live_count();
        debug!(leaked, "machine shut down");
        Ok(leaked)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn envs(&self) -> &Environments {
        &self.envs
    }

    pub fn root(&self) -> EnvId {
        self.root
    }

    /// Current number of nested function calls.
    pub fn call_depth(&self) -> usize {
        self.depth
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn emit(&mut self, line: String) {
        if self.config.echo_output {
            println!("{}", line);
        } else {
            self.output.push(line);
        }
    }

    /// Store the host's figure context on the root environment. Environments
    /// created afterwards inherit it.
    pub fn set_figure_container(&mut self, figure: Option<FigureHandle>) -> ExecResult<()> {
        self.envs.set_figure(self.root, figure)
    }

    /// A long-lived environment under the root, e.g. for an interactive session.
    pub fn new_session(&mut self) -> ExecResult<EnvId> {
        self.envs.build_child_environment(self.root, "session")
    }

    pub fn end_session(&mut self, env: EnvId) -> ExecResult<()> {
        self.envs.destroy(env, &mut self.heap)
    }

    /// Bind `var` as a left-value called `name` in `env`. On failure the
    /// variable is freed.
    pub fn declare_variable(&mut self, env: EnvId, name: &str, var: VarId) -> ExecResult<()> {
        self.heap.set_left_value(var, true)?;
        if let Err(err) = self.envs.add_variable(env, name, var, &mut self.heap) {
            self.heap.free(var)?;
            return Err(err);
        }
        Ok(())
    }

    pub fn define_function(&mut self, env: EnvId, func: Function) -> ExecResult<()> {
        self.envs.add_function(env, Rc::new(func))
    }

    pub fn find_variable(&self, env: EnvId, name: &str) -> Option<VarId> {
        self.envs.find_variable(env, name)
    }

    pub fn find_function(&self, env: EnvId, name: &str) -> Option<Rc<Function>> {
        self.envs.find_function(env, name)
    }

    /// Run a program in a fresh environment under the root.
    pub fn run(&mut self, tree: &SyntaxTree) -> ExecResult<Outcome> {
        let env = self.envs.build_child_environment(self.root, "program")?;
        let result = self.run_in(tree, env);
        let destroyed = self.envs.destroy(env, &mut self.heap);
        let outcome = result?;
        destroyed?;
        Ok(outcome)
    }

    /// Run a program directly in `env`; declarations stay there afterwards.
    pub fn run_in(&mut self, tree: &SyntaxTree, env: EnvId) -> ExecResult<Outcome> {
        if tree.has_errors() {
            return Err(ExecError::read_error(format!(
                "cannot run a syntax tree with {} error(s)",
                tree.errors().iter().filter(|d| d.is_error()).count()
            )));
        }
        let program = tree.root();
        if program.kind != NodeKind::Program {
            return Err(ExecError::read_error("syntax tree root is not a program"));
        }
        if program.children.is_empty() {
            debug!("empty program");
            return Ok(Outcome {
                completion: Completion::Empty,
                value: Value::Null,
            });
        }

        debug!(statements = program.children.len(), env = %env, "program start");
        let mut flow = FlowControl::new();
        let mut last = None;
        let result = self
            .run_list(&program.children, env, &mut flow, Some(&mut last))
            .and_then(|_| flow.close_boundary());

        let outcome = match result {
            Ok(()) => {
                let completion = if flow.is_exit() {
                    Completion::Exited
                } else {
                    Completion::Finished
                };
                let value = match flow.return_variable().or(last) {
                    Some(id) if self.heap.contains(id) => self.heap.to_value(id),
                    _ => Ok(Value::Null),
                };
                value.map(|value| Outcome { completion, value })
            }
            Err(err) => {
                flow.set_kind(FlowKind::Error);
                Err(err)
            }
        };

        if let Some(id) = flow.take_return_variable() {
            self.heap.release(id)?;
        }
        if let Some(id) = last {
            self.heap.release(id)?;
        }
        debug!(flow = %flow.kind(), ok = outcome.is_ok(), "program finished");
        outcome
    }

    /// Execute one statement-level node.
    pub fn execute(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        let result = match node.kind {
            NodeKind::Statement => self.execute_statement(node, env, flow),
            NodeKind::Declare => self.declare(node, env, flow),
            NodeKind::Function => self.define_user_function(node, env),
            NodeKind::Branch => self.branch(node, env, flow),
            NodeKind::Loop => self.run_loop(node, env, flow),
            NodeKind::Label => Ok(()),
            NodeKind::Jump => self.jump(node, env, flow),
            NodeKind::Program => self.execute_program(node, env, flow),
            NodeKind::Single | NodeKind::Expression => match self.eval_expr(node, env, flow)? {
                Some(value) => self.heap.release(value),
                None => Ok(()),
            },
        };
        match node.span() {
            Some(span) => result.map_err(|err| err.at(span)),
            None => result,
        }
    }

    /// Run a statement list, resolving `goto` against its direct children.
    /// Labels in nested or enclosing blocks are out of reach, so a label
    /// missing here is a NotFound error.
    fn run_list(
        &mut self,
        list: &[AstNode],
        env: EnvId,
        flow: &mut FlowControl,
        mut last: Option<&mut Option<VarId>>,
    ) -> ExecResult<()> {
        let mut pc = 0;
        while pc < list.len() {
            let stmt = &list[pc];
            match last.as_deref_mut() {
                Some(slot) if is_expression_statement(stmt) => {
                    let value = self
                        .eval_expr(&stmt.children[0], env, flow)
                        .map_err(|err| match stmt.span() {
                            Some(span) => err.at(span),
                            None => err,
                        })?;
                    if let Some(value) = value {
                        if let Some(previous) = slot.replace(value) {
                            if previous != value {
                                self.heap.release(previous)?;
                            }
                        }
                    }
                }
                _ => self.execute(stmt, env, flow)?,
            }

            match flow.kind() {
                FlowKind::Next => pc += 1,
                FlowKind::Goto(label) => {
                    let label = label.clone();
                    match find_label(list, &label) {
                        Some(target) => {
                            trace!(%label, target, "goto");
                            flow.set_flow_next();
                            pc = target + 1;
                        }
                        None => {
                            flow.set_kind(FlowKind::Error);
                            return Err(ExecError::not_found(format!(
                                "label '{}' not found in this block",
                                label
                            )));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    fn execute_statement(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        if node.is_scoped_block() {
            let block_env = self.envs.build_child_environment(env, "block")?;
            let result = self.run_list(&node.children, block_env, flow, None);
            return self.leave_scope(block_env, flow, result);
        }
        if node.operator() == Some(OperatorKind::Semicolon) {
            for child in &node.children {
                match self.eval_expr(child, env, flow)? {
                    Some(value) => self.heap.release(value)?,
                    None => return Ok(()),
                }
            }
            return Ok(());
        }
        self.run_list(&node.children, env, flow, None)
    }

    fn execute_program(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        let program_env = self.envs.build_child_environment(env, "program")?;
        let result = self
            .run_list(&node.children, program_env, flow, None)
            .and_then(|_| flow.close_boundary());
        self.leave_scope(program_env, flow, result)
    }

    /// Move the in-flight return variable out of `env`, then destroy `env`.
    fn leave_scope(&mut self, env: EnvId, flow: &mut FlowControl, result: ExecResult<()>) -> ExecResult<()> {
        let result = result.and_then(|_| self.switch_return_env(flow, env));
        if result.is_err() {
            if let Some(ret) = flow.take_return_variable() {
                self.heap.release(ret)?;
            }
        }
        let destroyed = self.envs.destroy(env, &mut self.heap);
        result.and(destroyed)
    }

    /// A return variable owned by the environment about to be destroyed is
    /// replaced by a write-protected temporary copy. A link is replaced by
    /// its target.
    fn switch_return_env(&mut self, flow: &mut FlowControl, doomed: EnvId) -> ExecResult<()> {
        let Some(ret) = flow.return_variable() else {
            return Ok(());
        };
        let target = self.heap.resolve(ret)?;
        let replacement = if self.heap.owning_env(target)? == Some(doomed) {
            let copy = self.heap.deep_clone(target)?;
            self.heap.set_write_protected(copy, true)?;
            trace!(from = %target, to = %copy, env = %doomed, "return value copied out of scope");
            Some(copy)
        } else if target != ret {
            Some(target)
        } else {
            None
        };

        if let Some(new) = replacement {
            if let Some(old) = flow.set_return_variable(new) {
                self.heap.release(old)?;
            }
        }
        Ok(())
    }

    /// Reuse a detached temporary as is; anything else is deep-copied.
    fn take_ownership(&mut self, id: VarId) -> ExecResult<VarId> {
        let var = self.heap.get(id)?;
        let reusable = var.owner == Owner::Detached
            && !var.write_protected
            && !matches!(var.payload, Payload::Link(_));
        if reusable {
            return Ok(id);
        }
        let copy = self.heap.deep_clone(id)?;
        self.heap.release(id)?;
        Ok(copy)
    }

    fn declare(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        for decl in &node.children {
            let (name, init) = match decl.name() {
                Some(name) => (name, None),
                None => match decl.children.as_slice() {
                    [target, init] if decl.operator() == Some(OperatorKind::Assign) => {
                        let name = target
                            .name()
                            .ok_or_else(|| ExecError::read_error("declaration target is not a name"))?;
                        (name, Some(init))
                    }
                    _ => return Err(ExecError::read_error("malformed declaration")),
                },
            };

            let var = match init {
                None => self.heap.alloc_null(),
                Some(expr) => match self.eval_expr(expr, env, flow)? {
                    Some(value) => self.take_ownership(value)?,
                    None => return Ok(()),
                },
            };
            trace!(name, env = %env, "declare");
            self.declare_variable(env, name, var)?;
        }
        Ok(())
    }

    fn define_user_function(&mut self, node: &AstNode, env: EnvId) -> ExecResult<()> {
        let [name, params, body] = node.children.as_slice() else {
            return Err(ExecError::read_error("malformed function definition"));
        };
        let name = name
            .name()
            .ok_or_else(|| ExecError::read_error("function name is not an identifier"))?;
        let params = params
            .children
            .iter()
            .map(|p| {
                p.name()
                    .map(str::to_string)
                    .ok_or_else(|| ExecError::read_error("function parameter is not an identifier"))
            })
            .collect::<ExecResult<Vec<_>>>()?;

        let func = Function::user(name, params, body.clone());
        debug!(function = %func, env = %env, "define function");
        self.define_function(env, func)
    }

    fn eval_condition(&mut self, cond: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<bool>> {
        let Some(value) = self.eval_expr(cond, env, flow)? else {
            return Ok(None);
        };
        let truth = self.heap.to_bool(value);
        self.heap.release(value)?;
        truth.map(Some)
    }

    fn branch(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        for pair in node.children.chunks(2) {
            let [cond, body] = pair else {
                return Err(ExecError::read_error("branch without a body"));
            };
            match self.eval_condition(cond, env, flow)? {
                Some(true) => return self.execute(body, env, flow),
                Some(false) => {}
                None => return Ok(()),
            }
        }
        Ok(())
    }

    fn run_loop(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        let [head, body] = node.children.as_slice() else {
            return Err(ExecError::read_error("malformed loop"));
        };
        let loop_env = self.envs.build_child_environment(env, "loop")?;
        let result = self.iterate(node.keyword(), head, body, loop_env, flow);
        self.leave_scope(loop_env, flow, result)
    }

    fn iterate(
        &mut self,
        keyword: Option<Keyword>,
        head: &AstNode,
        body: &AstNode,
        env: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<()> {
        let (init, cond, step) = match keyword {
            Some(Keyword::For) => match head.children.as_slice() {
                [init, cond, step] => (Some(init), cond, Some(step)),
                _ => return Err(ExecError::read_error("'for' head needs three parts")),
            },
            Some(Keyword::While) => (None, head, None),
            _ => return Err(ExecError::read_error("loop without 'for' or 'while'")),
        };

        if let Some(init) = init {
            self.execute(init, env, flow)?;
            if !flow.is_next() {
                return Ok(());
            }
        }

        loop {
            if !is_empty_slot(cond) {
                match self.eval_condition(cond, env, flow)? {
                    Some(true) => {}
                    Some(false) => break,
                    None => return Ok(()),
                }
            }

            self.execute(body, env, flow)?;
            match flow.kind() {
                FlowKind::Next => {}
                FlowKind::Continue => flow.set_flow_next(),
                FlowKind::Break => {
                    flow.set_flow_next();
                    break;
                }
                _ => return Ok(()),
            }

            if let Some(step) = step {
                self.execute(step, env, flow)?;
                if !flow.is_next() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn jump(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<()> {
        match node.keyword() {
            Some(Keyword::Goto) => {
                let label = node
                    .children
                    .first()
                    .and_then(AstNode::name)
                    .ok_or_else(|| ExecError::read_error("'goto' without a label"))?;
                flow.set_goto(label);
            }
            Some(kw @ (Keyword::Return | Keyword::Exit)) => {
                if let Some(expr) = node.children.first() {
                    let Some(value) = self.eval_expr(expr, env, flow)? else {
                        return Ok(());
                    };
                    if let Some(old) = flow.set_return_variable(value) {
                        self.heap.release(old)?;
                    }
                }
                flow.set_kind(if kw == Keyword::Return {
                    FlowKind::Return
                } else {
                    FlowKind::Exit
                });
            }
            Some(Keyword::Break) => flow.set_kind(FlowKind::Break),
            Some(Keyword::Continue) => flow.set_kind(FlowKind::Continue),
            _ => return Err(ExecError::read_error("malformed jump statement")),
        }
        Ok(())
    }

    /// Evaluate an expression node. `Ok(None)` means `exit` interrupted it.
    pub fn eval_expr(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<VarId>> {
        ensure_sufficient_stack(|| match node.kind {
            NodeKind::Single => self.eval_single(node, env).map(Some),
            NodeKind::Expression => self.eval_expression(node, env, flow),
            other => Err(ExecError::read_error(format!(
                "expected an expression, found {:?}",
                other
            ))),
        })
    }

    fn eval_single(&mut self, node: &AstNode, env: EnvId) -> ExecResult<VarId> {
        let token = node
            .token
            .as_ref()
            .ok_or_else(|| ExecError::null_pointer("expression node without a token"))?;
        let id = match &token.kind {
            TokenKind::Decimal(n) => self.heap.alloc_numeric(*n),
            TokenKind::String(s) => self.heap.alloc_string(s.clone()),
            TokenKind::Dummy => self.heap.alloc_null(),
            TokenKind::Variable => self.envs.find_variable(env, &token.text).ok_or_else(|| {
                ExecError::not_found(format!("undefined variable '{}'", token.text)).at(token.span)
            })?,
            _ => {
                return Err(ExecError::read_error(format!(
                    "unexpected '{}' in expression",
                    token.text
                ))
                .at(token.span))
            }
        };
        Ok(id)
    }

    fn eval_expression(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<VarId>> {
        // The condition attached to `else`.
        let Some(token) = &node.token else {
            return Ok(Some(self.heap.alloc_numeric(1.0)));
        };
        let op = token
            .operator()
            .ok_or_else(|| ExecError::read_error(format!("'{}' is not an operator", token.text)))?;

        let result = match op {
            OperatorKind::LeftParen => self.eval_group(&node.children, env, flow),
            OperatorKind::LeftBracket => self.build_array(&node.children, env, flow),
            OperatorKind::Call => self.call(node, env, flow),
            _ => self.eval_operator(op, &node.children, env, flow),
        };
        result.map_err(|err| err.at(token.span))
    }

    /// `(a, b, c)` evaluates every item and yields the last; `()` is Null.
    fn eval_group(&mut self, items: &[AstNode], env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<VarId>> {
        let mut last: Option<VarId> = None;
        for item in items {
            let value = match self.eval_expr(item, env, flow) {
                Ok(value) => value,
                Err(err) => {
                    if let Some(previous) = last {
                        self.heap.release(previous)?;
                    }
                    return Err(err);
                }
            };
            if let Some(previous) = last.take() {
                if Some(previous) != value {
                    self.heap.release(previous)?;
                }
            }
            match value {
                Some(value) => last = Some(value),
                None => return Ok(None),
            }
        }
        match last {
            Some(value) => Ok(Some(value)),
            None => Ok(Some(self.heap.alloc_null())),
        }
    }

    fn build_array(&mut self, items: &[AstNode], env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<VarId>> {
        let array = self.heap.alloc(Payload::Array(Vec::new()));
        for item in items {
            let value = match self.eval_expr(item, env, flow) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    self.heap.release(array)?;
                    return Ok(None);
                }
                Err(err) => {
                    self.heap.release(array)?;
                    return Err(err);
                }
            };
            let owned = self.take_ownership(value)?;
            self.heap.push_element(array, owned)?;
        }
        Ok(Some(array))
    }

    fn eval_operator(
        &mut self,
        op: OperatorKind,
        children: &[AstNode],
        env: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<Option<VarId>> {
        let mut operands = Vec::with_capacity(children.len());
        for child in children {
            let value = match self.eval_expr(child, env, flow) {
                Ok(value) => value,
                Err(err) => {
                    self.release_all(&operands)?;
                    return Err(err);
                }
            };
            match value {
                Some(value) => operands.push(value),
                None => {
                    self.release_all(&operands)?;
                    return Ok(None);
                }
            }
            flow.check_expression()?;
        }

        let result = evaluator::calculate(op, &operands, &mut self.heap);
        let keep = result.as_ref().ok().copied();
        for id in operands {
            if Some(id) != keep {
                self.heap.release(id)?;
            }
        }
        result.map(Some)
    }

    fn release_all(&mut self, ids: &[VarId]) -> ExecResult<()> {
        for id in ids {
            self.heap.release(*id)?;
        }
        Ok(())
    }

    fn call(&mut self, node: &AstNode, env: EnvId, flow: &mut FlowControl) -> ExecResult<Option<VarId>> {
        let [callee, args] = node.children.as_slice() else {
            return Err(ExecError::read_error("malformed call"));
        };
        let name = callee
            .name()
            .ok_or_else(|| ExecError::invalid_param("only named functions can be called"))?;
        let func = self
            .envs
            .find_function(env, name)
            .ok_or_else(|| ExecError::not_found(format!("undefined function '{}'", name)))?;

        let mut call_flow = FlowControl::new();
        self.execute_function(&func, CallArgs::Syntax(&args.children), env, &mut call_flow)?;
        let ret = call_flow.take_return_variable();

        if call_flow.is_exit() {
            flow.set_kind(FlowKind::Exit);
            if let Some(ret) = ret {
                if let Some(old) = flow.set_return_variable(ret) {
                    self.heap.release(old)?;
                }
            }
            return Ok(None);
        }
        match ret {
            Some(ret) => Ok(Some(ret)),
            None => Ok(Some(self.heap.alloc_null())),
        }
    }

    /// Call `func` from `caller`. The callee gets a child environment of the
    /// caller marked as belonging to `func`; any return value is left in
    /// `flow`, moved out of the callee's environment before it is destroyed.
    #[tracing::instrument(level = "debug", skip_all, fields(function = %func.name()))]
    pub fn execute_function(
        &mut self,
        func: &Rc<Function>,
        args: CallArgs<'_>,
        caller: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<()> {
        if self.depth >= self.config.max_call_depth {
            return Err(ExecError::stack_overflow(self.config.max_call_depth));
        }
        let call_env = self.envs.build_child_environment(caller, func.name())?;
        self.envs.set_belongs_to(call_env, Rc::clone(func))?;

        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.invoke(func, args, caller, call_env, flow));
        self.depth -= 1;

        debug!(flow = %flow.kind(), ok = result.is_ok(), "call finished");
        self.leave_scope(call_env, flow, result)
    }

    fn invoke(
        &mut self,
        func: &Rc<Function>,
        args: CallArgs<'_>,
        caller: EnvId,
        call_env: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<()> {
        if !self.bind_arguments(func, args, caller, call_env, flow)? {
            return Ok(());
        }
        match func.body() {
            FunctionBody::System(native) => native(func.as_ref(), call_env, self, flow)?,
            FunctionBody::User(body) => self.run_list(&body.children, call_env, flow, None)?,
        }
        flow.close_boundary()
    }

    /// Returns false when `exit` interrupted argument evaluation.
    fn bind_arguments(
        &mut self,
        func: &Function,
        args: CallArgs<'_>,
        caller: EnvId,
        call_env: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<bool> {
        let params = func.params();
        let count = match args {
            CallArgs::Syntax(nodes) => {
                for (i, node) in nodes.iter().enumerate() {
                    let Some(value) = self.eval_expr(node, caller, flow)? else {
                        return Ok(false);
                    };
                    let owned = self.take_ownership(value)?;
                    self.declare_variable(call_env, &param_name(params, i), owned)?;
                }
                nodes.len()
            }
            CallArgs::Values(values) => {
                for (i, value) in values.iter().enumerate() {
                    let link = self.heap.alloc_link(*value)?;
                    self.declare_variable(call_env, &param_name(params, i), link)?;
                }
                values.len()
            }
        };

        for name in params.iter().skip(count) {
            let null = self.heap.alloc_null();
            self.declare_variable(call_env, name, null)?;
        }
        Ok(true)
    }
}

fn param_name(params: &[String], index: usize) -> String {
    match params.get(index) {
        Some(name) => name.clone(),
        None => ext_arg_name(index - params.len()),
    }
}

fn is_expression_statement(node: &AstNode) -> bool {
    node.kind == NodeKind::Statement
        && node.operator() == Some(OperatorKind::Semicolon)
        && node.children.len() == 1
}

fn is_empty_slot(node: &AstNode) -> bool {
    node.kind == NodeKind::Single
        && matches!(node.token.as_ref().map(|t| &t.kind), Some(TokenKind::Dummy))
}

fn find_label(list: &[AstNode], label: &str) -> Option<usize> {
    list.iter().position(|node| {
        node.kind == NodeKind::Label && node.token.as_ref().map(|t| t.text.as_str()) == Some(label)
    })
}
