//! System constants and native functions installed in the root environment.

use crate::environment::EnvId;
use crate::error::{ExecError, ExecResult};
use crate::flow::{FlowControl, FlowKind};
use crate::function::{ext_arg_name, Function, NativeFn};
use crate::machine::Machine;
use crate::value::Image;
use crate::variable::{Payload, VarId};
use std::f64::consts;

/// 4096x4096 worth of pixels.
const MAX_IMAGE_PIXELS: usize = 1 << 24;

const CONSTANTS: &[(&str, f64)] = &[
    ("PI", consts::PI),
    ("E", consts::E),
    ("TRUE", 1.0),
    ("FALSE", 0.0),
];

const FUNCTIONS: &[(&str, &[&str], NativeFn)] = &[
    ("print", &[], native_print),
    ("len", &["x"], native_len),
    ("typeof", &["x"], native_typeof),
    ("ext_arg_count", &[], native_ext_arg_count),
    ("ext_arg", &["index"], native_ext_arg),
    ("call", &["name"], native_call),
    ("call_depth", &[], native_call_depth),
    ("image", &["width", "height"], native_image),
    ("sqrt", &["x"], native_math),
    ("abs", &["x"], native_math),
    ("floor", &["x"], native_math),
    ("ceil", &["x"], native_math),
    ("sin", &["x"], native_math),
    ("cos", &["x"], native_math),
    ("tan", &["x"], native_math),
    ("exp", &["x"], native_math),
    ("log", &["x"], native_math),
];

pub fn install(machine: &mut Machine, env: EnvId) -> ExecResult<()> {
    for (name, value) in CONSTANTS {
        let id = machine.heap_mut().alloc_numeric(*value);
        machine.declare_variable(env, name, id)?;
        machine.heap_mut().set_write_protected(id, true)?;
    }
    for (name, params, native) in FUNCTIONS {
        machine.define_function(env, Function::system(*name, params, *native))?;
    }
    Ok(())
}

fn arg(machine: &Machine, env: EnvId, name: &str) -> ExecResult<VarId> {
    machine
        .envs()
        .get(env)?
        .variable(name)
        .ok_or_else(|| ExecError::null_pointer(format!("missing argument '{}'", name)))
}

fn ext_args(machine: &Machine, env: EnvId) -> ExecResult<Vec<VarId>> {
    let scope = machine.envs().get(env)?;
    Ok((0..).map_while(|i| scope.variable(&ext_arg_name(i))).collect())
}

fn finish(machine: &mut Machine, flow: &mut FlowControl, ret: Option<VarId>) -> ExecResult<()> {
    flow.set_flow_next();
    if let Some(ret) = ret {
        if let Some(old) = flow.set_return_variable(ret) {
            machine.heap_mut().release(old)?;
        }
    }
    Ok(())
}

/// The call environment of the script function that called this native.
fn calling_function_env(machine: &Machine, env: EnvId) -> ExecResult<Option<EnvId>> {
    let parent = machine.envs().parent(env)?;
    Ok(parent.and_then(|p| machine.envs().enclosing_call(p)))
}

fn native_print(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let mut parts = Vec::new();
    for id in ext_args(machine, env)? {
        parts.push(machine.heap().to_value(id)?.to_string());
    }
    machine.emit(parts.join(" "));
    finish(machine, flow, None)
}

fn native_len(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let x = arg(machine, env, "x")?;
    let len = match machine.heap().payload(x)? {
        Payload::Null => 0,
        Payload::String(s) => s.chars().count(),
        Payload::Array(items) => items.len(),
        Payload::Image(image) => image.pixels().len(),
        other => {
            return Err(ExecError::invalid_param(format!(
                "len() is not defined for {}",
                other.var_type()
            )))
        }
    };
    let ret = machine.heap_mut().alloc_numeric(len as f64);
    finish(machine, flow, Some(ret))
}

fn native_typeof(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let x = arg(machine, env, "x")?;
    let name = machine.heap().var_type(x)?.as_str();
    let ret = machine.heap_mut().alloc_string(name);
    finish(machine, flow, Some(ret))
}

fn native_ext_arg_count(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let count = match calling_function_env(machine, env)? {
        Some(call_env) => ext_args(machine, call_env)?.len(),
        None => 0,
    };
    let ret = machine.heap_mut().alloc_numeric(count as f64);
    finish(machine, flow, Some(ret))
}

fn native_ext_arg(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let index = machine.heap().numeric(arg(machine, env, "index")?)?;
    if index < 0.0 || index.fract() != 0.0 {
        return Err(ExecError::invalid_param("ext_arg() needs a non-negative integer index"));
    }
    let call_env = calling_function_env(machine, env)?
        .ok_or_else(|| ExecError::state("ext_arg() called outside of a function"))?;
    let name = ext_arg_name(index as usize);
    let var = machine
        .envs()
        .get(call_env)?
        .variable(&name)
        .ok_or_else(|| ExecError::not_found(format!("no extended argument {}", index)))?;
    finish(machine, flow, Some(var))
}

/// `call(name, args...)` invokes `name` with the remaining arguments bound
/// by link.
fn native_call(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let name = machine.heap().string(arg(machine, env, "name")?)?.to_string();
    let func = machine
        .find_function(env, &name)
        .ok_or_else(|| ExecError::not_found(format!("undefined function '{}'", name)))?;
    let args = ext_args(machine, env)?;

    let mut inner = FlowControl::new();
    func.execute(machine, &args, env, &mut inner)?;
    let ret = inner.take_return_variable();
    if inner.is_exit() {
        if let Some(ret) = ret {
            if let Some(old) = flow.set_return_variable(ret) {
                machine.heap_mut().release(old)?;
            }
        }
        flow.set_kind(FlowKind::Exit);
        return Ok(());
    }
    finish(machine, flow, ret)
}

fn native_call_depth(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    // Exclude this native's own frame.
    let depth = machine.envs().call_stack(env).len().saturating_sub(1);
    let ret = machine.heap_mut().alloc_numeric(depth as f64);
    finish(machine, flow, Some(ret))
}

fn native_image(_: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let mut dims = [0usize; 2];
    for (slot, name) in dims.iter_mut().zip(["width", "height"]) {
        let n = machine.heap().numeric(arg(machine, env, name)?)?;
        if n < 0.0 || n.fract() != 0.0 || n > 65_536.0 {
            return Err(ExecError::invalid_param(format!(
                "image {} must be an integer in 0..=65536",
                name
            )));
        }
        *slot = n as usize;
    }
    if dims[0] * dims[1] > MAX_IMAGE_PIXELS {
        return Err(ExecError::invalid_param(format!(
            "image of {}x{} exceeds {} pixels",
            dims[0], dims[1], MAX_IMAGE_PIXELS
        )));
    }
    let ret = machine.heap_mut().alloc(Payload::Image(Image::new(dims[0], dims[1])));
    finish(machine, flow, Some(ret))
}

fn native_math(func: &Function, env: EnvId, machine: &mut Machine, flow: &mut FlowControl) -> ExecResult<()> {
    let x = machine.heap().numeric(arg(machine, env, "x")?)?;
    let y = match func.name() {
        "sqrt" if x < 0.0 => return Err(ExecError::invalid_param("sqrt() of a negative number")),
        "log" if x <= 0.0 => return Err(ExecError::invalid_param("log() of a non-positive number")),
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "exp" => x.exp(),
        "log" => x.ln(),
        other => return Err(ExecError::not_implemented(format!("no math function '{}'", other))),
    };
    let ret = machine.heap_mut().alloc_numeric(y);
    finish(machine, flow, Some(ret))
}
