//! `Parameter`: the shared box a trainable value lives in.

use crate::asg::Value;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// A trainable value, or an empty placeholder.
///
/// Clones share the same box, so code that holds a `Parameter` (an
/// optimizer, a test, another view of the tree) sees in-place updates made
/// through the module that owns it. Identity is the box, not the value:
/// compare with [`Parameter::ptr_eq`].
#[derive(Clone, Default)]
pub struct Parameter {
    data: Rc<RefCell<Option<Value>>>,
}

impl Parameter {
    pub fn new(data: Value) -> Self {
        Self { data: Rc::new(RefCell::new(Some(data))) }
    }

    /// Placeholder that holds no value yet.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.data.borrow().is_some()
    }

    /// Borrow of the current value; `None` for a placeholder.
    pub fn data(&self) -> Option<Ref<'_, Value>> {
        Ref::filter_map(self.data.borrow(), Option::as_ref).ok()
    }

    /// Copy of the current value.
    pub fn value(&self) -> Option<Value> {
        self.data.borrow().clone()
    }

    /// Replaces the content in place; the box keeps its identity.
    pub fn set(&self, data: Option<Value>) {
        *self.data.borrow_mut() = data;
    }

    /// Applies `f` to the value in place. Returns `false` for a placeholder.
    pub fn update(&self, f: impl FnOnce(&mut Value)) -> bool {
        match self.data.borrow_mut().as_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    pub fn shape(&self) -> Option<Vec<usize>> {
        self.data.borrow().as_ref().map(|v| v.shape().to_vec())
    }

    /// Number of scalars held; 0 for a placeholder.
    pub fn numel(&self) -> usize {
        self.data.borrow().as_ref().map_or(0, |v| v.len())
    }

    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn addr(&self) -> *const () {
        Rc::as_ptr(&self.data) as *const ()
    }
}

impl From<Value> for Parameter {
    fn from(data: Value) -> Self {
        Parameter::new(data)
    }
}

impl From<Option<Value>> for Parameter {
    fn from(data: Option<Value>) -> Self {
        data.map_or_else(Parameter::placeholder, Parameter::new)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape() {
            Some(shape) => write!(f, "Parameter(shape={shape:?})"),
            None => write!(f, "Parameter(<placeholder>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array};

    #[test]
    fn clones_share_the_box() {
        let p = Parameter::new(arr0(1.0f32).into_dyn());
        let alias = p.clone();
        p.set(Some(arr0(5.0f32).into_dyn()));
        assert!(alias.ptr_eq(&p));
        assert_eq!(alias.value(), Some(arr0(5.0f32).into_dyn()));
    }

    #[test]
    fn placeholder_has_no_value() {
        let p = Parameter::placeholder();
        assert!(!p.is_initialized());
        assert!(p.data().is_none());
        assert_eq!(p.numel(), 0);
        assert!(!p.update(|v| v.fill(0.0)));
    }

    #[test]
    fn update_mutates_in_place() {
        let p = Parameter::new(array![1.0f32, 2.0].into_dyn());
        assert!(p.update(|v| v.mapv_inplace(|x| x * 10.0)));
        assert_eq!(*p.data().unwrap(), array![10.0f32, 20.0].into_dyn());
        assert_eq!(p.shape(), Some(vec![2]));
    }

    #[test]
    fn distinct_boxes_are_not_identical() {
        let a = Parameter::new(arr0(1.0f32).into_dyn());
        let b = Parameter::new(arr0(1.0f32).into_dyn());
        assert!(!a.ptr_eq(&b));
    }
}
