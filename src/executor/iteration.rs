//! The iterator protocol

use super::errors::{ExcKind, ExecResult, Fault};
use super::types::values::{IterObj, IterState, Val, ViewKind};
use super::vm::VM;

/// Check the deadline once every this many items of a native loop
const DEADLINE_STRIDE: usize = 1024;

impl VM {
    /// `iter(value)`
    pub fn get_iter(&mut self, value: &Val) -> ExecResult<Val> {
        Ok(match value {
            Val::List(list) => IterObj::new(
                "list_iterator",
                IterState::List {
                    list: list.clone(),
                    idx: 0,
                },
            ),
            Val::Tuple(items) => IterObj::new(
                "tuple_iterator",
                IterState::Items {
                    items: items.to_vec(),
                    idx: 0,
                },
            ),
            Val::Str(s) => IterObj::new(
                "str_iterator",
                IterState::Items {
                    items: s.chars().map(|c| Val::str(c.encode_utf8(&mut [0; 4]))).collect(),
                    idx: 0,
                },
            ),
            Val::Range(r) => IterObj::new(
                "range_iterator",
                IterState::Range {
                    next: r.start,
                    remaining: r.len(),
                    step: r.step,
                },
            ),
            Val::Dict(map) => IterObj::new(
                "dict_keyiterator",
                IterState::Dict {
                    dict: map.clone(),
                    idx: 0,
                    len: map.borrow().len(),
                    kind: ViewKind::Keys,
                },
            ),
            Val::DictView(view) => {
                let kind = match view.kind {
                    ViewKind::Keys => "dict_keyiterator",
                    ViewKind::Values => "dict_valueiterator",
                    ViewKind::Items => "dict_itemiterator",
                };
                IterObj::new(
                    kind,
                    IterState::Dict {
                        dict: view.dict.clone(),
                        idx: 0,
                        len: view.dict.borrow().len(),
                        kind: view.kind,
                    },
                )
            }
            Val::Set(set) => IterObj::new(
                "set_iterator",
                IterState::Set {
                    set: set.clone(),
                    idx: 0,
                    len: set.borrow().len(),
                },
            ),
            Val::Iterator(_) => value.clone(),
            Val::Instance(_) => {
                if let Some(method) = self.lookup_special(value, "__iter__") {
                    let iter = self.call_method(&method, value, Vec::new())?;
                    let is_iterator = match &iter {
                        Val::Iterator(_) => true,
                        Val::Instance(_) => self.lookup_special(&iter, "__next__").is_some(),
                        _ => false,
                    };
                    if !is_iterator {
                        return Err(Fault::type_error(format!(
                            "iter() returned non-iterator of type '{}'",
                            iter.type_name()
                        )));
                    }
                    return Ok(iter);
                }
                if self.lookup_special(value, "__getitem__").is_some() {
                    return self.getitem_iter(value);
                }
                return Err(not_iterable(value));
            }
            other => return Err(not_iterable(other)),
        })
    }

    /// Snapshot iteration over an object implementing only `__getitem__`
    fn getitem_iter(&mut self, value: &Val) -> ExecResult<Val> {
        let mut items = Vec::new();
        for idx in 0.. {
            if idx % DEADLINE_STRIDE == 0 {
                self.check_deadline()?;
            }
            match self.get_item(value, &Val::Int(idx as i64)) {
                Ok(item) => items.push(item),
                Err(fault) if fault.matches(ExcKind::IndexError) => break,
                Err(fault) if fault.matches(ExcKind::StopIteration) => break,
                Err(fault) => return Err(fault),
            }
        }
        Ok(IterObj::new("iterator", IterState::Items { items, idx: 0 }))
    }

    /// Advance an iterator; `None` once it is exhausted
    pub fn next_item(&mut self, iter: &Val) -> ExecResult<Option<Val>> {
        let obj = match iter {
            Val::Iterator(obj) => obj.clone(),
            Val::Instance(_) => {
                let Some(method) = self.lookup_special(iter, "__next__") else {
                    return Err(not_an_iterator(iter));
                };
                return match self.call_method(&method, iter, Vec::new()) {
                    Ok(value) => Ok(Some(value)),
                    Err(fault) if fault.matches(ExcKind::StopIteration) => Ok(None),
                    Err(fault) => Err(fault),
                };
            }
            other => return Err(not_an_iterator(other)),
        };

        // States that call back into the VM release the borrow first
        let (func, inners) = {
            let mut state = obj.state.borrow_mut();
            match &mut *state {
                IterState::List { list, idx } => {
                    let item = list.borrow().get(*idx).cloned();
                    match item {
                        Some(item) => {
                            *idx += 1;
                            return Ok(Some(item));
                        }
                        None => {
                            *state = IterState::Exhausted;
                            return Ok(None);
                        }
                    }
                }
                IterState::Items { items, idx } => {
                    let item = items.get(*idx).cloned();
                    *idx += 1;
                    if item.is_none() {
                        *state = IterState::Exhausted;
                    }
                    return Ok(item);
                }
                IterState::Range {
                    next,
                    remaining,
                    step,
                } => {
                    if *remaining <= 0 {
                        return Ok(None);
                    }
                    let value = *next;
                    *remaining -= 1;
                    *next = next.wrapping_add(*step);
                    return Ok(Some(Val::Int(value)));
                }
                IterState::Dict {
                    dict,
                    idx,
                    len,
                    kind,
                } => {
                    let map = dict.borrow();
                    if map.len() != *len {
                        return Err(Fault::new(
                            ExcKind::RuntimeError,
                            "dictionary changed size during iteration",
                        ));
                    }
                    let Some((_, (key, value))) = map.get_index(*idx) else {
                        return Ok(None);
                    };
                    *idx += 1;
                    return Ok(Some(match kind {
                        ViewKind::Keys => key.clone(),
                        ViewKind::Values => value.clone(),
                        ViewKind::Items => Val::tuple(vec![key.clone(), value.clone()]),
                    }));
                }
                IterState::Set { set, idx, len } => {
                    let map = set.borrow();
                    if map.len() != *len {
                        return Err(Fault::new(
                            ExcKind::RuntimeError,
                            "Set changed size during iteration",
                        ));
                    }
                    let Some((_, item)) = map.get_index(*idx) else {
                        return Ok(None);
                    };
                    *idx += 1;
                    return Ok(Some(item.clone()));
                }
                IterState::Exhausted => return Ok(None),
                IterState::Enumerate { inner, .. } => (None, vec![inner.clone()]),
                IterState::Zip { inners } => (None, inners.clone()),
                IterState::Map { func, inners } => (Some(func.clone()), inners.clone()),
                IterState::Filter { func, inner } => (Some(func.clone()), vec![inner.clone()]),
            }
        };

        let kind = obj.kind;
        match kind {
            "enumerate" => {
                let Some(item) = self.next_item(&inners[0])? else {
                    *obj.state.borrow_mut() = IterState::Exhausted;
                    return Ok(None);
                };
                let mut state = obj.state.borrow_mut();
                if let IterState::Enumerate { count, .. } = &mut *state {
                    let index = *count;
                    *count += 1;
                    return Ok(Some(Val::tuple(vec![Val::Int(index), item])));
                }
                Ok(None)
            }
            "filter" => loop {
                let Some(item) = self.next_item(&inners[0])? else {
                    *obj.state.borrow_mut() = IterState::Exhausted;
                    return Ok(None);
                };
                let keep = match &func {
                    Some(Val::None) | None => self.truthy(&item)?,
                    Some(func) => {
                        let verdict = self.call(func, vec![item.clone()])?;
                        self.truthy(&verdict)?
                    }
                };
                if keep {
                    return Ok(Some(item));
                }
            },
            _ => {
                // zip and map pull one item from every inner iterator
                let mut items = Vec::with_capacity(inners.len());
                for inner in &inners {
                    match self.next_item(inner)? {
                        Some(item) => items.push(item),
                        None => {
                            *obj.state.borrow_mut() = IterState::Exhausted;
                            return Ok(None);
                        }
                    }
                }
                match func {
                    Some(func) => self.call(&func, items).map(Some),
                    None => Ok(Some(Val::tuple(items))),
                }
            }
        }
    }

    /// Drain any iterable into a vector
    pub fn collect(&mut self, iterable: &Val) -> ExecResult<Vec<Val>> {
        match iterable {
            Val::List(items) => return Ok(items.borrow().clone()),
            Val::Tuple(items) => return Ok(items.to_vec()),
            Val::Set(set) => return Ok(set.borrow().values().cloned().collect()),
            Val::Dict(map) => return Ok(map.borrow().values().map(|(k, _)| k.clone()).collect()),
            _ => {}
        }
        let iter = self.get_iter(iterable)?;
        let mut items = Vec::new();
        while let Some(item) = self.next_item(&iter)? {
            items.push(item);
            if items.len() % DEADLINE_STRIDE == 0 {
                self.check_deadline()?;
                if items.len() > super::operators::MAX_SEQUENCE_LEN {
                    return Err(Fault::memory_error());
                }
            }
        }
        Ok(items)
    }
}

pub(crate) fn not_iterable(value: &Val) -> Fault {
    Fault::type_error(format!("'{}' object is not iterable", value.type_name()))
}

fn not_an_iterator(value: &Val) -> Fault {
    Fault::type_error(format!("'{}' object is not an iterator", value.type_name()))
}
