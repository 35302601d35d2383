//! Tree-walking evaluator for generated procedures.
//!
//! Variables are function scoped: one map of locals per invocation, with
//! loop counters, temporaries and flags all living side by side. Names not
//! found there fall back to the instance's private variables, then to the
//! runtime globals (`queuedDeletes`, `flushDeletes`, `Math`, imports).

use std::collections::HashMap;
use std::sync::Arc;

use crate::ir::{BinaryOp, Expr, ForLoop, Literal, Property, Stmt};
use crate::value::Value;

use super::index::hash_values;
use super::ops;
use super::{ExecutionError, ExecutionResult, Instance};

const TYPED_ARRAYS: &[&str] = &[
    "Int8Array",
    "Uint8Array",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
];

/// Host side of `$callback` / `$empty`
pub(super) struct Host<'h> {
    pub on_row: Option<&'h mut dyn FnMut(&[Value])>,
    pub on_empty: Option<&'h mut dyn FnMut()>,
}

impl Host<'_> {
    pub fn none() -> Self {
        Host {
            on_row: None,
            on_empty: None,
        }
    }
}

/// Runtime operand: a plain value or one of the runtime's own objects
#[derive(Clone)]
enum Operand {
    Value(Value),
    This,
    Table(String),
    TableData(String),
    Indices(String),
    Index(String, usize),
    Queue,
    Namespace(String),
    Function(String),
    /// Method looked up on a receiver, waiting to be called
    Method(Box<Operand>, String),
}

impl Operand {
    fn describe(&self) -> String {
        match self {
            Operand::Value(v) => v.to_string(),
            Operand::This => "this".to_string(),
            Operand::Table(t) => format!("this.{t}"),
            Operand::TableData(t) => format!("this.{t}._data"),
            Operand::Indices(t) => format!("this.{t}._indices"),
            Operand::Index(t, k) => format!("this.{t}._indices[{k}]"),
            Operand::Queue => "queuedDeletes".to_string(),
            Operand::Namespace(n) | Operand::Function(n) => n.clone(),
            Operand::Method(recv, name) => format!("{}.{name}", recv.describe()),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
}

pub(super) struct Frame<'a, 'h> {
    instance: &'a mut Instance,
    host: Host<'h>,
    locals: HashMap<String, Value>,
}

impl<'a, 'h> Frame<'a, 'h> {
    pub fn new(instance: &'a mut Instance, host: Host<'h>) -> Self {
        Frame {
            instance,
            host,
            locals: HashMap::new(),
        }
    }

    /// Bind parameters. `$callback` stays a host hook; `$empty` is null
    /// when the host passed no empty handler.
    pub fn bind_params(&mut self, params: &[String]) {
        for param in params {
            match param.as_str() {
                "$callback" => {}
                "$empty" if self.host.on_empty.is_some() => {}
                _ => {
                    self.locals.insert(param.clone(), Value::Null);
                }
            }
        }
    }

    /// Run a procedure body; the value of the first `return`, else null
    pub fn run(&mut self, body: &[Stmt]) -> ExecutionResult<Value> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }

    /// Evaluate a standalone expression to a value
    pub fn value_of(&mut self, expr: &Expr) -> ExecutionResult<Value> {
        self.value(expr)
    }

    fn exec(&mut self, stmt: &Stmt) -> ExecutionResult<Flow> {
        match stmt {
            Stmt::Empty => {}
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign { target, value } => {
                let value = self.value(value)?;
                self.assign(target, value)?;
            }
            Stmt::Var(decls) => {
                for decl in decls {
                    let value = self.value(&decl.init)?;
                    self.locals.insert(decl.name.clone(), value);
                }
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    if let Flow::Return(value) = self.exec(stmt)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.truthy(test)? {
                    return self.exec(consequent);
                } else if let Some(alternate) = alternate {
                    return self.exec(alternate);
                }
            }
            Stmt::For(lp) => return self.exec_for(lp),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.value(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, lp: &ForLoop) -> ExecutionResult<Flow> {
        for decl in &lp.init {
            let value = self.value(&decl.init)?;
            self.locals.insert(decl.name.clone(), value);
        }
        while self.value(&lp.test)?.truthy() {
            if let Flow::Return(value) = self.exec(&lp.body)? {
                return Ok(Flow::Return(value));
            }
            let next = ops::binary(BinaryOp::Add, &self.lookup_local(&lp.counter)?, &Value::Int(1))?;
            self.locals.insert(lp.counter.clone(), next);
        }
        Ok(Flow::Normal)
    }

    fn lookup_local(&self, name: &str) -> ExecutionResult<Value> {
        self.locals
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownName(name.to_string()))
    }

    fn truthy(&mut self, expr: &Expr) -> ExecutionResult<bool> {
        Ok(match self.eval(expr)? {
            Operand::Value(value) => value.truthy(),
            _ => true,
        })
    }

    fn value(&mut self, expr: &Expr) -> ExecutionResult<Value> {
        match self.eval(expr)? {
            Operand::Value(value) => Ok(value),
            other => Err(ExecutionError::TypeError(format!(
                "{} is not a value",
                other.describe()
            ))),
        }
    }

    fn eval(&mut self, expr: &Expr) -> ExecutionResult<Operand> {
        let value = match expr {
            Expr::Literal(literal) => match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Str(s) => Value::string(s),
            },
            Expr::Ident(name) => return self.ident(name),
            Expr::This => return Ok(Operand::This),
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                let key = match property {
                    Property::Named(name) => Value::string(name),
                    Property::Computed(index) => self.value(index)?,
                };
                return self.member(object, &key);
            }
            Expr::Unary { op, arg } => ops::unary(*op, &self.value(arg)?),
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                let left = self.eval(left)?;
                // host functions and runtime objects are truthy
                let truthy = match &left {
                    Operand::Value(value) => value.truthy(),
                    _ => true,
                };
                return match (op, truthy) {
                    (BinaryOp::And, true) | (BinaryOp::Or, false) => self.eval(right),
                    _ => Ok(left),
                };
            }
            Expr::Binary { op, left, right } => {
                let left = self.value(left)?;
                ops::binary(*op, &left, &self.value(right)?)?
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.value(test)?.truthy() {
                    self.value(consequent)?
                } else {
                    self.value(alternate)?
                }
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<ExecutionResult<Vec<_>>>()?;
                self.call(callee, args)?
            }
            Expr::New { class, args } => {
                let length = match args.first() {
                    Some(arg) => ops::to_number(&self.value(arg)?),
                    None => 0.0,
                };
                if TYPED_ARRAYS.contains(&class.as_str()) && length >= 0.0 {
                    Value::vector(vec![0.0; length as usize])
                } else {
                    return Err(ExecutionError::NotCallable(format!("new {class}")));
                }
            }
            Expr::Object(fields) => {
                let mut record = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    record.push((key.clone(), self.value(value)?));
                }
                Value::Record(Arc::new(record))
            }
            Expr::Array(items) => {
                let mut data = Vec::with_capacity(items.len());
                for item in items {
                    data.push(ops::to_number(&self.value(item)?));
                }
                Value::vector(data)
            }
        };
        Ok(Operand::Value(value))
    }

    fn ident(&self, name: &str) -> ExecutionResult<Operand> {
        if let Some(value) = self.locals.get(name) {
            return Ok(Operand::Value(value.clone()));
        }
        if let Some(value) = self.instance.private_vars.get(name) {
            return Ok(Operand::Value(value.clone()));
        }
        match name {
            "$callback" | "$empty" | "flushDeletes" => Ok(Operand::Function(name.to_string())),
            "queuedDeletes" => Ok(Operand::Queue),
            "Math" => Ok(Operand::Namespace(name.to_string())),
            _ if self.instance.imports.iter().any(|i| i == name) => {
                Ok(Operand::Namespace(name.to_string()))
            }
            _ => Err(ExecutionError::UnknownName(name.to_string())),
        }
    }

    fn member(&mut self, object: Operand, key: &Value) -> ExecutionResult<Operand> {
        let name = key.as_str();
        let operand = match (&object, name) {
            (Operand::This, Some(prop)) => {
                if let Some(value) = self.instance.scalars.get(prop) {
                    Operand::Value(value.clone())
                } else if self.instance.tables.contains_key(prop) {
                    Operand::Table(prop.to_string())
                } else {
                    return Err(ExecutionError::UnknownName(format!("this.{prop}")));
                }
            }
            (Operand::Table(t), Some("_data")) => Operand::TableData(t.clone()),
            (Operand::Table(t), Some("_indices")) => Operand::Indices(t.clone()),
            (Operand::TableData(t), Some("length")) => {
                Operand::Value(Value::Int(self.instance.table(t)?.data.len() as i64))
            }
            (Operand::TableData(t), _) => {
                let position = position(key)?;
                let row = self.instance.table(t)?.data.get(position).cloned();
                Operand::Value(row.map_or(Value::Null, Value::Row))
            }
            (Operand::Indices(t), _) => {
                let slot = position(key)?;
                if slot >= self.instance.table(t)?.indices.len() {
                    return Err(ExecutionError::UnknownName(format!("this.{t}._indices[{slot}]")));
                }
                Operand::Index(t.clone(), slot)
            }
            (Operand::Index(..) | Operand::Queue | Operand::Namespace(_), Some(method)) => {
                Operand::Method(Box::new(object.clone()), method.to_string())
            }
            (Operand::Value(value), _) => Operand::Value(value_member(value, key)?),
            _ => {
                return Err(ExecutionError::TypeError(format!(
                    "Cannot read property {key} of {}",
                    object.describe()
                )))
            }
        };
        Ok(operand)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> ExecutionResult<()> {
        match target {
            Expr::Ident(name) => {
                if !self.locals.contains_key(name) {
                    if let Some(slot) = self.instance.private_vars.get_mut(name) {
                        *slot = value;
                        return Ok(());
                    }
                }
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                let key = match property {
                    Property::Named(name) => Value::string(name),
                    Property::Computed(index) => self.value(index)?,
                };
                match (&object, key.as_str()) {
                    (Operand::This, Some(prop)) => match self.instance.scalars.get_mut(prop) {
                        Some(slot) => {
                            *slot = value;
                            Ok(())
                        }
                        None => Err(ExecutionError::UnknownName(format!("this.{prop}"))),
                    },
                    (Operand::Value(Value::Row(row)), Some(column)) => {
                        row.set(column, value);
                        Ok(())
                    }
                    (Operand::Value(Value::Vector(data)), _) => {
                        let position = position(&key)?;
                        let mut data = data.lock();
                        match data.get_mut(position) {
                            Some(slot) => {
                                *slot = ops::to_number(&value);
                                Ok(())
                            }
                            None => Err(ExecutionError::TypeError(format!(
                                "index {position} out of bounds for vector of {}",
                                data.len()
                            ))),
                        }
                    }
                    _ => Err(ExecutionError::TypeError(format!(
                        "Cannot set property {key} of {}",
                        object.describe()
                    ))),
                }
            }
            other => Err(ExecutionError::TypeError(format!(
                "Invalid assignment target {other:?}"
            ))),
        }
    }

    fn call(&mut self, callee: Operand, args: Vec<Operand>) -> ExecutionResult<Value> {
        // flushDeletes receives the owning instance
        if matches!(&callee, Operand::Function(name) if name == "flushDeletes") {
            return match args.as_slice() {
                [Operand::This] => {
                    self.instance.flush_deletes()?;
                    Ok(Value::Null)
                }
                _ => Err(ExecutionError::TypeError(
                    "flushDeletes expects this".to_string(),
                )),
            };
        }
        let args = args
            .into_iter()
            .map(|arg| match arg {
                Operand::Value(value) => Ok(value),
                other => Err(ExecutionError::TypeError(format!(
                    "{} is not a value",
                    other.describe()
                ))),
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        let args = args.as_slice();
        match callee {
            Operand::Function(name) => match name.as_str() {
                "$callback" => match self.host.on_row.as_mut() {
                    Some(on_row) => {
                        on_row(args);
                        Ok(Value::Null)
                    }
                    None => Err(ExecutionError::NotCallable(name)),
                },
                "$empty" => match self.host.on_empty.as_mut() {
                    Some(on_empty) => {
                        on_empty();
                        Ok(Value::Null)
                    }
                    None => Err(ExecutionError::NotCallable(name)),
                },
                _ => Err(ExecutionError::NotCallable(name)),
            },
            Operand::Method(receiver, method) => match (*receiver, method.as_str()) {
                (Operand::Queue, "push") => {
                    self.instance.queued_deletes.extend(args.iter().cloned());
                    Ok(Value::Int(self.instance.queued_deletes.len() as i64))
                }
                (Operand::Index(..), "hash") => Ok(Value::string(&hash_values(args))),
                (Operand::Index(table, slot), "get") => {
                    let key = args.first().and_then(Value::as_str).unwrap_or_default();
                    let index = self.instance.table(&table)?.indices.get(slot);
                    Ok(index
                        .and_then(|index| index.get(key))
                        .cloned()
                        .map_or(Value::Null, Value::Row))
                }
                (Operand::Namespace(ns), method) if ns == "Math" => ops::math(method, args),
                (receiver, method) => Err(ExecutionError::NotCallable(format!(
                    "{}.{method}",
                    receiver.describe()
                ))),
            },
            other => Err(ExecutionError::NotCallable(other.describe())),
        }
    }
}

fn position(key: &Value) -> ExecutionResult<usize> {
    match key.as_i64() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(ExecutionError::TypeError(format!("{key} is not an index"))),
    }
}

/// `value.key` / `value[key]` on plain values
fn value_member(value: &Value, key: &Value) -> ExecutionResult<Value> {
    let result = match (value, key.as_str()) {
        (Value::Row(row), Some(column)) => row.get(column),
        (Value::Record(fields), Some(name)) => fields
            .iter()
            .find(|(k, _)| k == name)
            .map_or(Value::Null, |(_, v)| v.clone()),
        (Value::Vector(data), Some("length")) => Value::Int(data.lock().len() as i64),
        (Value::Vector(data), None) => {
            let position = position(key)?;
            data.lock().get(position).map_or(Value::Null, |v| Value::Float(*v))
        }
        (Value::String(s), Some("length")) => Value::Int(s.chars().count() as i64),
        (Value::Null, _) => {
            return Err(ExecutionError::TypeError(format!(
                "Cannot read property {key} of null"
            )))
        }
        _ => Value::Null,
    };
    Ok(result)
}
