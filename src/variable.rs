//! The tagged-union variable model.
//!
//! Variables live in an arena ([`Heap`]) and are addressed by generational
//! [`VarId`] handles. An array owns the handles in its element list, and every
//! element records its parent through [`Owner::Array`]. Links are stored as a
//! target handle on the linking variable plus a reverse multimap on the heap,
//! so freeing a target can clear everything that pointed at it.

use crate::environment::EnvId;
use crate::error::{ExecError, ExecResult};
use crate::value::{Image, Value, BOOL_EPSILON};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId {
    index: u32,
    generation: u32,
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Null,
    Numeric,
    String,
    Image,
    Array,
    Link,
}

impl VarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarType::Null => "null",
            VarType::Numeric => "numeric",
            VarType::String => "string",
            VarType::Image => "image",
            VarType::Array => "array",
            VarType::Link => "link",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Numeric(f64),
    String(String),
    Image(Image),
    Array(Vec<VarId>),
    Link(VarId),
}

impl Payload {
    pub fn var_type(&self) -> VarType {
        match self {
            Payload::Null => VarType::Null,
            Payload::Numeric(_) => VarType::Numeric,
            Payload::String(_) => VarType::String,
            Payload::Image(_) => VarType::Image,
            Payload::Array(_) => VarType::Array,
            Payload::Link(_) => VarType::Link,
        }
    }
}

/// Who is responsible for freeing a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// A temporary; whoever holds the handle releases it.
    Detached,
    Env(EnvId),
    Array(VarId),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub payload: Payload,
    pub owner: Owner,
    pub left_value: bool,
    pub write_protected: bool,
}

impl Variable {
    fn temporary(payload: Payload) -> Self {
        Self {
            payload,
            owner: Owner::Detached,
            left_value: false,
            write_protected: false,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    var: Option<Variable>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    links: HashMap<VarId, Vec<VarId>>,
    live: usize,
}

fn stale(id: VarId) -> ExecError {
    ExecError::null_pointer(format!("variable {} no longer exists", id))
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of variables currently allocated.
    pub fn live_count(&self) -> usize {
        self.live
    }

    fn insert(&mut self, var: Variable) -> VarId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.var = Some(var);
            return VarId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            var: Some(var),
        });
        VarId {
            index,
            generation: 0,
        }
    }

    /// Allocate a detached temporary.
    pub fn alloc(&mut self, payload: Payload) -> VarId {
        let children = match &payload {
            Payload::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        let id = self.insert(Variable::temporary(payload));
        for child in children {
            if let Some(var) = self.var_mut(child) {
                var.owner = Owner::Array(id);
            }
        }
        id
    }

    pub fn alloc_null(&mut self) -> VarId {
        self.alloc(Payload::Null)
    }

    pub fn alloc_numeric(&mut self, n: f64) -> VarId {
        self.alloc(Payload::Numeric(n))
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> VarId {
        self.alloc(Payload::String(s.into()))
    }

    /// Allocate a detached temporary holding a copy of `value`.
    pub fn alloc_value(&mut self, value: &Value) -> VarId {
        self.build(value, Owner::Detached, false)
    }

    /// Allocate a Link variable pointing at `target` (or at what `target` links to).
    pub fn alloc_link(&mut self, target: VarId) -> ExecResult<VarId> {
        let id = self.alloc_null();
        self.set_link(id, target)?;
        Ok(id)
    }

    fn build(&mut self, value: &Value, owner: Owner, left_value: bool) -> VarId {
        let id = self.insert(Variable {
            payload: Payload::Null,
            owner,
            left_value,
            write_protected: false,
        });
        let payload = self.build_payload(value, id, left_value);
        if let Some(var) = self.var_mut(id) {
            var.payload = payload;
        }
        id
    }

    fn build_payload(&mut self, value: &Value, parent: VarId, left_value: bool) -> Payload {
        match value {
            Value::Null => Payload::Null,
            Value::Numeric(n) => Payload::Numeric(*n),
            Value::String(s) => Payload::String(s.clone()),
            Value::Image(image) => Payload::Image(image.clone()),
            Value::Array(items) => Payload::Array(
                items
                    .iter()
                    .map(|item| self.build(item, Owner::Array(parent), left_value))
                    .collect(),
            ),
        }
    }

    fn var(&self, id: VarId) -> Option<&Variable> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.var.as_ref())
    }

    fn var_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.var.as_mut())
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.var(id).is_some()
    }

    pub fn get(&self, id: VarId) -> ExecResult<&Variable> {
        self.var(id).ok_or_else(|| stale(id))
    }

    fn get_mut(&mut self, id: VarId) -> ExecResult<&mut Variable> {
        self.var_mut(id).ok_or_else(|| stale(id))
    }

    /// Follow a link to its target. Links never chain, so one step suffices.
    pub fn resolve(&self, id: VarId) -> ExecResult<VarId> {
        match self.get(id)?.payload {
            Payload::Link(target) if self.contains(target) => Ok(target),
            Payload::Link(target) => Err(stale(target)),
            _ => Ok(id),
        }
    }

    pub fn payload(&self, id: VarId) -> ExecResult<&Payload> {
        Ok(&self.get(self.resolve(id)?)?.payload)
    }

    /// Tag of the resolved variable.
    pub fn var_type(&self, id: VarId) -> ExecResult<VarType> {
        Ok(self.payload(id)?.var_type())
    }

    pub fn is_null(&self, id: VarId) -> ExecResult<bool> {
        Ok(self.var_type(id)? == VarType::Null)
    }

    pub fn is_left_value(&self, id: VarId) -> ExecResult<bool> {
        Ok(self.get(id)?.left_value)
    }

    pub fn is_write_protected(&self, id: VarId) -> ExecResult<bool> {
        let target = self.resolve(id)?;
        Ok(self.get(id)?.write_protected || self.get(target)?.write_protected)
    }

    pub fn owner(&self, id: VarId) -> ExecResult<Owner> {
        Ok(self.get(id)?.owner)
    }

    pub fn set_owner(&mut self, id: VarId, owner: Owner) -> ExecResult<()> {
        self.get_mut(id)?.owner = owner;
        Ok(())
    }

    pub fn set_write_protected(&mut self, id: VarId, protect: bool) -> ExecResult<()> {
        self.get_mut(id)?.write_protected = protect;
        Ok(())
    }

    /// Set the left-value flag on a variable and all of its elements.
    pub fn set_left_value(&mut self, id: VarId, left_value: bool) -> ExecResult<()> {
        let var = self.get_mut(id)?;
        var.left_value = left_value;
        if let Payload::Array(items) = &var.payload {
            for child in items.clone() {
                self.set_left_value(child, left_value)?;
            }
        }
        Ok(())
    }

    /// The environment that ultimately owns `id`, walking up through arrays.
    pub fn owning_env(&self, id: VarId) -> ExecResult<Option<EnvId>> {
        let mut current = id;
        loop {
            match self.get(current)?.owner {
                Owner::Detached => return Ok(None),
                Owner::Env(env) => return Ok(Some(env)),
                Owner::Array(parent) => current = parent,
            }
        }
    }

    fn writable(&mut self, id: VarId) -> ExecResult<(VarId, &mut Variable)> {
        let target = self.resolve(id)?;
        if self.get(id)?.write_protected {
            return Err(ExecError::state("variable is write-protected"));
        }
        let var = self.get_mut(target)?;
        if var.write_protected {
            return Err(ExecError::state("variable is write-protected"));
        }
        Ok((target, var))
    }

    /// Give a Null variable its tag. A tag is fixed once it leaves Null.
    pub fn set_type(&mut self, id: VarId, tag: VarType) -> ExecResult<()> {
        let (_, var) = self.writable(id)?;
        let current = var.payload.var_type();
        if current == tag {
            return Ok(());
        }
        if current != VarType::Null {
            return Err(ExecError::invalid_param(format!(
                "cannot change a {} variable into {}",
                current, tag
            )));
        }
        var.payload = match tag {
            VarType::Null => Payload::Null,
            VarType::Numeric => Payload::Numeric(0.0),
            VarType::String => Payload::String(String::new()),
            VarType::Image => Payload::Image(Image::default()),
            VarType::Array => Payload::Array(Vec::new()),
            VarType::Link => {
                return Err(ExecError::invalid_param("use set_link to create a link"));
            }
        };
        Ok(())
    }

    pub fn numeric(&self, id: VarId) -> ExecResult<f64> {
        match self.payload(id)? {
            Payload::Numeric(n) => Ok(*n),
            other => Err(ExecError::invalid_param(format!(
                "expected numeric, found {}",
                other.var_type()
            ))),
        }
    }

    pub fn string(&self, id: VarId) -> ExecResult<&str> {
        match self.payload(id)? {
            Payload::String(s) => Ok(s),
            other => Err(ExecError::invalid_param(format!(
                "expected string, found {}",
                other.var_type()
            ))),
        }
    }

    pub fn image(&self, id: VarId) -> ExecResult<&Image> {
        match self.payload(id)? {
            Payload::Image(image) => Ok(image),
            other => Err(ExecError::invalid_param(format!(
                "expected image, found {}",
                other.var_type()
            ))),
        }
    }

    fn set_scalar(&mut self, id: VarId, payload: Payload) -> ExecResult<()> {
        let (_, var) = self.writable(id)?;
        let current = var.payload.var_type();
        if current != VarType::Null && current != payload.var_type() {
            return Err(ExecError::invalid_param(format!(
                "cannot store {} into a {} variable",
                payload.var_type(),
                current
            )));
        }
        var.payload = payload;
        Ok(())
    }

    pub fn set_numeric(&mut self, id: VarId, n: f64) -> ExecResult<()> {
        self.set_scalar(id, Payload::Numeric(n))
    }

    pub fn set_string(&mut self, id: VarId, s: impl Into<String>) -> ExecResult<()> {
        self.set_scalar(id, Payload::String(s.into()))
    }

    pub fn set_image(&mut self, id: VarId, image: Image) -> ExecResult<()> {
        self.set_scalar(id, Payload::Image(image))
    }

    pub fn array_len(&self, id: VarId) -> ExecResult<usize> {
        match self.payload(id)? {
            Payload::Array(items) => Ok(items.len()),
            other => Err(ExecError::invalid_param(format!(
                "expected array, found {}",
                other.var_type()
            ))),
        }
    }

    pub fn array_items(&self, id: VarId) -> ExecResult<Vec<VarId>> {
        match self.payload(id)? {
            Payload::Array(items) => Ok(items.clone()),
            other => Err(ExecError::invalid_param(format!(
                "expected array, found {}",
                other.var_type()
            ))),
        }
    }

    /// Element `index` of an array, growing it with Null elements as needed.
    /// A Null variable is promoted to an empty array first.
    pub fn element(&mut self, id: VarId, index: usize) -> ExecResult<VarId> {
        let target = self.resolve(id)?;
        let (len, left_value, protected) = {
            let var = self.get(target)?;
            let len = match &var.payload {
                Payload::Null => 0,
                Payload::Array(items) => items.len(),
                other => {
                    return Err(ExecError::invalid_param(format!(
                        "cannot index a {} variable",
                        other.var_type()
                    )))
                }
            };
            (len, var.left_value, var.write_protected)
        };

        if index >= len && protected {
            return Err(ExecError::state("cannot grow a write-protected array"));
        }

        if index >= len {
            trace!(array = %target, from = len, to = index + 1, "grow array");
        }
        let mut fresh = Vec::new();
        for _ in len..=index {
            fresh.push(self.insert(Variable {
                payload: Payload::Null,
                owner: Owner::Array(target),
                left_value,
                write_protected: false,
            }));
        }

        let var = self.get_mut(target)?;
        if var.payload == Payload::Null {
            var.payload = Payload::Array(Vec::new());
        }
        match &mut var.payload {
            Payload::Array(items) => {
                items.extend(fresh);
                Ok(items[index])
            }
            _ => Err(ExecError::read_error("array storage vanished")),
        }
    }

    /// Append `child` to an array, taking ownership of it.
    pub fn push_element(&mut self, array: VarId, child: VarId) -> ExecResult<()> {
        let target = self.resolve(array)?;
        let (_, var) = self.writable(target)?;
        let left_value = var.left_value;
        if var.payload == Payload::Null {
            var.payload = Payload::Array(Vec::new());
        }
        match &mut var.payload {
            Payload::Array(items) => items.push(child),
            other => {
                return Err(ExecError::invalid_param(format!(
                    "cannot append to a {} variable",
                    other.var_type()
                )))
            }
        }
        self.set_owner(child, Owner::Array(target))?;
        self.set_left_value(child, left_value)
    }

    /// Take element `index` out of its array, leaving a Null in its place.
    /// The returned variable is a detached temporary.
    pub fn detach_element(&mut self, array: VarId, index: usize) -> ExecResult<VarId> {
        let target = self.resolve(array)?;
        let in_range = matches!(&self.get(target)?.payload, Payload::Array(items) if index < items.len());
        if !in_range {
            return Err(ExecError::invalid_param(format!("no element at index {}", index)));
        }
        let placeholder = self.insert(Variable {
            payload: Payload::Null,
            owner: Owner::Array(target),
            left_value: false,
            write_protected: false,
        });
        let taken = match &mut self.get_mut(target)?.payload {
            Payload::Array(items) => std::mem::replace(&mut items[index], placeholder),
            _ => return Err(ExecError::read_error("array storage vanished")),
        };
        self.set_owner(taken, Owner::Detached)?;
        self.set_left_value(taken, false)?;
        Ok(taken)
    }

    /// Point `link` at `target`. Linking to a link links to its target instead.
    pub fn set_link(&mut self, link: VarId, target: VarId) -> ExecResult<()> {
        let target = self.resolve(target)?;
        if target == link {
            return Err(ExecError::invalid_param("a variable cannot link to itself"));
        }
        self.unset_link(link)?;
        let var = self.get_mut(link)?;
        if var.payload != Payload::Null {
            return Err(ExecError::invalid_param(format!(
                "cannot turn a {} variable into a link",
                var.payload.var_type()
            )));
        }
        var.payload = Payload::Link(target);
        self.links.entry(target).or_default().push(link);
        Ok(())
    }

    /// Drop the link held by `link`, leaving it Null. Non-links are untouched.
    pub fn unset_link(&mut self, link: VarId) -> ExecResult<()> {
        let var = self.get_mut(link)?;
        if let Payload::Link(target) = var.payload {
            var.payload = Payload::Null;
            if let Some(linkers) = self.links.get_mut(&target) {
                linkers.retain(|l| *l != link);
                if linkers.is_empty() {
                    self.links.remove(&target);
                }
            }
        }
        Ok(())
    }

    /// Variables currently linking to `target`.
    pub fn links_to(&self, target: VarId) -> &[VarId] {
        self.links.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Free a temporary. Variables owned by an environment or an array are
    /// left alone; their owner frees them.
    pub fn release(&mut self, id: VarId) -> ExecResult<()> {
        match self.var(id) {
            Some(var) if var.owner == Owner::Detached => self.free(id),
            _ => Ok(()),
        }
    }

    /// Destroy a variable and its elements regardless of owner. Links to it
    /// become Null.
    pub fn free(&mut self, id: VarId) -> ExecResult<()> {
        self.unset_link(id)?;

        if let Some(linkers) = self.links.remove(&id) {
            for linker in linkers {
                if let Some(var) = self.var_mut(linker) {
                    var.payload = Payload::Null;
                }
            }
        }

        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or_else(|| stale(id))?;
        let var = slot.var.take().ok_or_else(|| stale(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        if let Payload::Array(items) = var.payload {
            for child in items {
                self.free(child)?;
            }
        }
        Ok(())
    }

    /// Snapshot the resolved value of `id`.
    pub fn to_value(&self, id: VarId) -> ExecResult<Value> {
        let value = match self.payload(id)? {
            Payload::Null | Payload::Link(_) => Value::Null,
            Payload::Numeric(n) => Value::Numeric(*n),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Image(image) => Value::Image(image.clone()),
            Payload::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.to_value(*item))
                    .collect::<ExecResult<_>>()?,
            ),
        };
        Ok(value)
    }

    /// Replace the contents of `dst` with `value`, keeping its flags.
    fn write_value(&mut self, dst: VarId, value: &Value) -> ExecResult<()> {
        let (target, var) = self.writable(dst)?;
        let left_value = var.left_value;
        let old = std::mem::replace(&mut var.payload, Payload::Null);
        if let Payload::Array(items) = old {
            for child in items {
                self.free(child)?;
            }
        }
        let payload = self.build_payload(value, target, left_value);
        self.get_mut(target)?.payload = payload;
        Ok(())
    }

    fn check_tags(&self, dst: VarId, src: VarId) -> ExecResult<()> {
        let dst_type = self.var_type(dst)?;
        let src_type = self.var_type(src)?;
        if dst_type != VarType::Null && dst_type != src_type {
            return Err(ExecError::invalid_param(format!(
                "cannot assign {} to a {} variable",
                src_type, dst_type
            )));
        }
        Ok(())
    }

    /// Deep-copy the value of `src` into `dst`. `dst` keeps its own flags.
    pub fn copy_value(&mut self, dst: VarId, src: VarId) -> ExecResult<()> {
        if self.resolve(dst)? == self.resolve(src)? {
            return Ok(());
        }
        self.check_tags(dst, src)?;
        let value = self.to_value(src)?;
        self.write_value(dst, &value)
    }

    /// Like [`copy_value`](Self::copy_value), but a temporary array source
    /// hands its elements over instead of being copied.
    pub fn smart_copy(&mut self, dst: VarId, src: VarId) -> ExecResult<()> {
        let src_target = self.resolve(src)?;
        let steal = {
            let var = self.get(src_target)?;
            !var.left_value && !var.write_protected && matches!(var.payload, Payload::Array(_))
        };
        if !steal || self.resolve(dst)? == src_target {
            return self.copy_value(dst, src);
        }

        self.check_tags(dst, src)?;
        let (target, var) = self.writable(dst)?;
        let left_value = var.left_value;
        let old = std::mem::replace(&mut var.payload, Payload::Null);
        if let Payload::Array(items) = old {
            for child in items {
                self.free(child)?;
            }
        }

        let items = match std::mem::replace(&mut self.get_mut(src_target)?.payload, Payload::Array(Vec::new())) {
            Payload::Array(items) => items,
            _ => Vec::new(),
        };
        for child in &items {
            self.set_owner(*child, Owner::Array(target))?;
            self.set_left_value(*child, left_value)?;
        }
        trace!(from = %src_target, to = %target, count = items.len(), "steal array elements");
        self.get_mut(target)?.payload = Payload::Array(items);
        Ok(())
    }

    /// A fresh detached temporary holding a deep copy of `src`.
    pub fn deep_clone(&mut self, src: VarId) -> ExecResult<VarId> {
        let value = self.to_value(src)?;
        Ok(self.alloc_value(&value))
    }

    /// Structural equality. Arrays compare element by element; mismatched
    /// tags are unequal; two Nulls are equal.
    pub fn equals(&self, a: VarId, b: VarId) -> ExecResult<bool> {
        Ok(self.to_value(a)? == self.to_value(b)?)
    }

    pub fn to_bool(&self, id: VarId) -> ExecResult<bool> {
        let truthy = match self.payload(id)? {
            Payload::Null | Payload::Link(_) => false,
            Payload::Numeric(n) => n.abs() > BOOL_EPSILON,
            Payload::String(s) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"),
            Payload::Image(image) => !image.is_empty(),
            Payload::Array(items) => !items.is_empty(),
        };
        Ok(truthy)
    }
}
