use crate::ast::AstNode;
use crate::environment::EnvId;
use crate::error::ExecResult;
use crate::flow::FlowControl;
use crate::machine::{CallArgs, Machine};
use crate::variable::VarId;
use std::fmt;
use std::rc::Rc;

/// Native callback. It runs inside the call's own environment, where its
/// parameters and extended arguments are already bound, and must leave
/// `flow` at Next on success, optionally carrying a return variable.
pub type NativeFn = fn(&Function, EnvId, &mut Machine, &mut FlowControl) -> ExecResult<()>;

pub const EXT_ARG_PREFIX: &str = "__ext_arg_";

/// Variable name of the `index`-th argument past the declared parameters.
pub fn ext_arg_name(index: usize) -> String {
    format!("{}{}", EXT_ARG_PREFIX, index)
}

#[derive(Clone)]
pub enum FunctionBody {
    /// The `{}` block of a script-defined function.
    User(Rc<AstNode>),
    System(NativeFn),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FunctionBody::User(body) => write!(f, "User({} statements)", body.children.len()),
            FunctionBody::System(_) => write!(f, "System"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    params: Vec<String>,
    body: FunctionBody,
}

impl Function {
    pub fn user(name: impl Into<String>, params: Vec<String>, body: AstNode) -> Self {
        Self {
            name: name.into(),
            params,
            body: FunctionBody::User(Rc::new(body)),
        }
    }

    pub fn system(name: impl Into<String>, params: &[&str], native: NativeFn) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: FunctionBody::System(native),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn is_system(&self) -> bool {
        matches!(self.body, FunctionBody::System(_))
    }

    /// Invoke with live variables, bound by link in the callee.
    pub fn execute(
        self: &Rc<Self>,
        machine: &mut Machine,
        args: &[VarId],
        env: EnvId,
        flow: &mut FlowControl,
    ) -> ExecResult<()> {
        machine.execute_function(self, CallArgs::Values(args), env, flow)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}
