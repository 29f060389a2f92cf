use crate::error::{ExecError, ExecResult};
use crate::function::Function;
use crate::variable::{Heap, Owner, VarId};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId {
    index: u32,
    generation: u32,
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}.{}", self.index, self.generation)
    }
}

/// Opaque figure-output context supplied by the host. The core only stores
/// it and hands it to child environments.
pub type FigureHandle = Rc<dyn Any>;

pub struct Environment {
    name: String,
    vars: HashMap<String, VarId>,
    funcs: HashMap<String, Rc<Function>>,
    belongs_to: Option<Rc<Function>>,
    figure: Option<FigureHandle>,
    parent: Option<EnvId>,
}

impl Environment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }

    pub fn belongs_to(&self) -> Option<&Rc<Function>> {
        self.belongs_to.as_ref()
    }

    pub fn figure(&self) -> Option<&FigureHandle> {
        self.figure.as_ref()
    }

    pub fn variable(&self, name: &str) -> Option<VarId> {
        self.vars.get(name).copied()
    }

    pub fn function(&self, name: &str) -> Option<&Rc<Function>> {
        self.funcs.get(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.funcs.keys().map(String::as_str)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("funcs", &self.funcs.keys().collect::<Vec<_>>())
            .field("belongs_to", &self.belongs_to.as_ref().map(|f| f.name()))
            .field("has_figure", &self.figure.is_some())
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    env: Option<Environment>,
}

/// Arena of environments. Parent links are handles, so the scope chain
/// never holds a borrow.
#[derive(Debug, Default)]
pub struct Environments {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

fn missing(id: EnvId) -> ExecError {
    ExecError::null_pointer(format!("environment {} no longer exists", id))
}

impl Environments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Handles of every environment still alive.
    pub fn live_ids(&self) -> Vec<EnvId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.env.is_some())
            .map(|(index, slot)| EnvId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// A fresh environment. `parent == None` makes a root.
    pub fn create(&mut self, name: impl Into<String>, parent: Option<EnvId>) -> EnvId {
        let figure = parent
            .and_then(|p| self.get(p).ok())
            .and_then(|p| p.figure.clone());
        let env = Environment {
            name: name.into(),
            vars: HashMap::new(),
            funcs: HashMap::new(),
            belongs_to: None,
            figure,
            parent,
        };
        self.live += 1;

        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.env = Some(env);
            EnvId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                env: Some(env),
            });
            EnvId {
                index,
                generation: 0,
            }
        };
        debug!(env = %id, parent = ?parent, "create environment");
        id
    }

    /// A new scope under `parent`, sharing its figure context.
    pub fn build_child_environment(&mut self, parent: EnvId, name: impl Into<String>) -> ExecResult<EnvId> {
        self.get(parent)?;
        Ok(self.create(name, Some(parent)))
    }

    pub fn get(&self, id: EnvId) -> ExecResult<&Environment> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.env.as_ref())
            .ok_or_else(|| missing(id))
    }

    fn get_mut(&mut self, id: EnvId) -> ExecResult<&mut Environment> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.env.as_mut())
            .ok_or_else(|| missing(id))
    }

    pub fn contains(&self, id: EnvId) -> bool {
        self.get(id).is_ok()
    }

    pub fn parent(&self, id: EnvId) -> ExecResult<Option<EnvId>> {
        Ok(self.get(id)?.parent)
    }

    /// Destroy an environment together with every variable it owns.
    pub fn destroy(&mut self, id: EnvId, heap: &mut Heap) -> ExecResult<()> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or_else(|| missing(id))?;
        let env = slot.env.take().ok_or_else(|| missing(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        debug!(env = %id, name = %env.name, vars = env.vars.len(), "destroy environment");
        for (_, var) in env.vars {
            if heap.contains(var) {
                heap.free(var)?;
            }
        }
        Ok(())
    }

    /// Nearest variable called `name`, searching outward from `env`.
    pub fn find_variable(&self, env: EnvId, name: &str) -> Option<VarId> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.get(id).ok()?;
            if let Some(var) = scope.vars.get(name) {
                return Some(*var);
            }
            current = scope.parent;
        }
        None
    }

    pub fn find_function(&self, env: EnvId, name: &str) -> Option<Rc<Function>> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.get(id).ok()?;
            if let Some(func) = scope.funcs.get(name) {
                return Some(Rc::clone(func));
            }
            current = scope.parent;
        }
        None
    }

    /// Bind a left-value variable under `name` in `env`, taking ownership.
    /// Names only need to be unique within one environment.
    pub fn add_variable(&mut self, env: EnvId, name: &str, var: VarId, heap: &mut Heap) -> ExecResult<()> {
        if name.is_empty() {
            return Err(ExecError::invalid_param("variable name is empty"));
        }
        if !heap.is_left_value(var)? {
            return Err(ExecError::invalid_param(format!(
                "'{}' must be bound to a left-value",
                name
            )));
        }
        let scope = self.get_mut(env)?;
        if scope.vars.contains_key(name) {
            return Err(ExecError::duplicate(format!(
                "variable '{}' is already declared in this scope",
                name
            )));
        }
        scope.vars.insert(name.to_string(), var);
        heap.set_owner(var, Owner::Env(env))
    }

    pub fn add_function(&mut self, env: EnvId, func: Rc<Function>) -> ExecResult<()> {
        let scope = self.get_mut(env)?;
        if scope.funcs.contains_key(func.name()) {
            return Err(ExecError::duplicate(format!(
                "function '{}' is already defined in this scope",
                func.name()
            )));
        }
        scope.funcs.insert(func.name().to_string(), func);
        Ok(())
    }

    pub fn set_belongs_to(&mut self, env: EnvId, func: Rc<Function>) -> ExecResult<()> {
        self.get_mut(env)?.belongs_to = Some(func);
        Ok(())
    }

    pub fn set_figure(&mut self, env: EnvId, figure: Option<FigureHandle>) -> ExecResult<()> {
        self.get_mut(env)?.figure = figure;
        Ok(())
    }

    pub fn figure(&self, env: EnvId) -> Option<FigureHandle> {
        self.get(env).ok().and_then(|e| e.figure.clone())
    }

    /// The nearest environment at or above `env` that was opened by a call.
    pub fn enclosing_call(&self, env: EnvId) -> Option<EnvId> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.get(id).ok()?;
            if scope.belongs_to.is_some() {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    /// Functions whose calls are active at `env`, innermost first.
    pub fn call_stack(&self, env: EnvId) -> Vec<Rc<Function>> {
        let mut stack = Vec::new();
        let mut current = Some(env);
        while let Some(id) = current {
            let Ok(scope) = self.get(id) else {
                break;
            };
            if let Some(func) = &scope.belongs_to {
                stack.push(Rc::clone(func));
            }
            current = scope.parent;
        }
        stack
    }
}
