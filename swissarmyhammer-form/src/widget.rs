//! Widget types and per-instance method overrides.
//!
//! Every concrete widget implements [`Widget`]; the shared [`Tag`] supplies
//! the rest of the behavior. [`TagMethods`] lets one tag instance replace
//! individual behaviors without defining a new widget type.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Result;
use crate::schema::AttrDecl;
use crate::tag::Tag;

/// A field widget type.
pub trait Widget {
    /// Widget type name, e.g. `input` or `select`.
    fn kind(&self) -> &str;

    /// Widget-specific attribute declarations. A `value` entry declares the
    /// bindable value; the rest become internal state.
    fn attrs(&self) -> IndexMap<String, AttrDecl> {
        IndexMap::new()
    }

    /// Runs once when the tag is mounted.
    fn init(&self, _tag: &mut Tag) -> Result<()> {
        Ok(())
    }

    /// Widget-level validation. Returning `Some` replaces the common rules.
    fn custom_validate(&self, _tag: &Tag) -> Option<Result<bool>> {
        None
    }
}

/// A widget that only declares attributes.
#[derive(Debug, Clone)]
pub struct PlainWidget {
    kind: String,
    attrs: IndexMap<String, AttrDecl>,
}

impl PlainWidget {
    /// A widget of type `kind` with no attributes.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: IndexMap::new(),
        }
    }

    /// Add an attribute declaration.
    pub fn attr(mut self, name: impl Into<String>, decl: AttrDecl) -> Self {
        self.attrs.insert(name.into(), decl);
        self
    }
}

impl Widget for PlainWidget {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn attrs(&self) -> IndexMap<String, AttrDecl> {
        self.attrs.clone()
    }
}

/// Replaces `validate`.
pub type ValidateMethod = Rc<dyn Fn(&mut Tag) -> Result<bool>>;
/// Replaces `get_value`.
pub type GetValueMethod = Rc<dyn Fn(&Tag, bool) -> Value>;
/// Replaces `set_value`.
pub type SetValueMethod = Rc<dyn Fn(&mut Tag, Value)>;
/// Replaces `on_change`.
pub type NotifyMethod = Rc<dyn Fn(&Tag)>;
/// Replaces `show` or `hide`.
pub type VisibilityMethod = Rc<dyn Fn(&mut Tag)>;
/// Replaces the widget's init hook.
pub type InitMethod = Rc<dyn Fn(&mut Tag) -> Result<()>>;

/// Per-instance behavior overrides, consulted before the defaults.
#[derive(Clone, Default)]
pub struct TagMethods {
    pub(crate) validate: Option<ValidateMethod>,
    pub(crate) get_value: Option<GetValueMethod>,
    pub(crate) set_value: Option<SetValueMethod>,
    pub(crate) on_change: Option<NotifyMethod>,
    pub(crate) show: Option<VisibilityMethod>,
    pub(crate) hide: Option<VisibilityMethod>,
    pub(crate) init: Option<InitMethod>,
}

impl TagMethods {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `validate`.
    pub fn validate(mut self, f: impl Fn(&mut Tag) -> Result<bool> + 'static) -> Self {
        self.validate = Some(Rc::new(f));
        self
    }

    /// Override `get_value`.
    pub fn get_value(mut self, f: impl Fn(&Tag, bool) -> Value + 'static) -> Self {
        self.get_value = Some(Rc::new(f));
        self
    }

    /// Override `set_value`.
    pub fn set_value(mut self, f: impl Fn(&mut Tag, Value) + 'static) -> Self {
        self.set_value = Some(Rc::new(f));
        self
    }

    /// Override `on_change`.
    pub fn on_change(mut self, f: impl Fn(&Tag) + 'static) -> Self {
        self.on_change = Some(Rc::new(f));
        self
    }

    /// Override `show`.
    pub fn show(mut self, f: impl Fn(&mut Tag) + 'static) -> Self {
        self.show = Some(Rc::new(f));
        self
    }

    /// Override `hide`.
    pub fn hide(mut self, f: impl Fn(&mut Tag) + 'static) -> Self {
        self.hide = Some(Rc::new(f));
        self
    }

    /// Replace the widget's mount-time initializer.
    pub fn init(mut self, f: impl Fn(&mut Tag) -> Result<()> + 'static) -> Self {
        self.init = Some(Rc::new(f));
        self
    }

    /// Names of the overridden methods.
    pub fn overridden(&self) -> Vec<&'static str> {
        [
            ("validate", self.validate.is_some()),
            ("get_value", self.get_value.is_some()),
            ("set_value", self.set_value.is_some()),
            ("on_change", self.on_change.is_some()),
            ("show", self.show.is_some()),
            ("hide", self.hide.is_some()),
            ("init", self.init.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for TagMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.overridden()).finish()
    }
}
