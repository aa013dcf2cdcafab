//! Attribute schemas for tag widgets.
//!
//! A widget declares its attributes as [`AttrDecl`]s. [`AttrSchema`] splits
//! them into the bindable `value` attribute and internal state, and seeds
//! per-instance state from caller overrides.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::trace;

/// Name of the two-way bindable attribute.
pub const VALUE_ATTR: &str = "value";

/// Zero-argument producer for attribute defaults.
pub type Producer = Arc<dyn Fn() -> Value>;

/// The declared type of an attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AttrType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Function,
}

/// How an attribute obtains its default.
#[derive(Clone)]
pub enum AttrDefault {
    Literal(Value),
    Producer(Producer),
}

impl fmt::Debug for AttrDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// The materialized value of an internal attribute.
#[derive(Clone)]
pub enum AttrValue {
    Data(Value),
    /// Function-typed attributes keep their producer uninvoked.
    Function(Producer),
}

impl AttrValue {
    /// The value, unless this is a function attribute.
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Function(_) => None,
        }
    }

    /// The producer of a function attribute.
    pub fn as_function(&self) -> Option<&Producer> {
        match self {
            Self::Function(f) => Some(f),
            Self::Data(_) => None,
        }
    }
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(v) => f.debug_tuple("Data").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A single attribute declaration.
#[derive(Debug, Clone)]
pub struct AttrDecl {
    /// Accepted types. Empty means any.
    pub types: Vec<AttrType>,
    pub default: Option<AttrDefault>,
    pub required: bool,
    /// Internal attributes are owned by the tag rather than set by the form.
    pub inner: bool,
    pub desc: Option<String>,
}

impl AttrDecl {
    /// Declare an optional attribute of one type.
    pub fn new(type_: AttrType) -> Self {
        Self {
            types: vec![type_],
            default: None,
            required: false,
            inner: false,
            desc: None,
        }
    }

    /// An attribute accepting any of the given types.
    pub fn any_of(types: &[AttrType]) -> Self {
        Self {
            types: types.to_vec(),
            ..Self::new(AttrType::String)
        }
    }

    /// Use `value` as the default.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(AttrDefault::Literal(value));
        self
    }

    /// Compute the default with `producer`.
    pub fn with_producer(mut self, producer: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(AttrDefault::Producer(Arc::new(producer)));
        self
    }

    /// Mark the attribute required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the attribute internal.
    pub fn inner(mut self) -> Self {
        self.inner = true;
        self
    }

    /// Attach a description.
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Whether the attribute is function-typed.
    pub fn is_function(&self) -> bool {
        self.types == [AttrType::Function]
    }

    /// Compute this declaration's default.
    ///
    /// Producers are invoked unless the attribute itself is function-typed.
    pub fn default_value(&self) -> AttrValue {
        match &self.default {
            None => AttrValue::Data(Value::Null),
            Some(AttrDefault::Literal(v)) => AttrValue::Data(v.clone()),
            Some(AttrDefault::Producer(p)) if self.is_function() => AttrValue::Function(p.clone()),
            Some(AttrDefault::Producer(p)) => AttrValue::Data(p()),
        }
    }
}

/// Per-instance internal attribute state.
pub type AttrState = IndexMap<String, AttrValue>;

/// Declarations shared by every tag regardless of widget type.
pub fn common_attrs() -> IndexMap<String, AttrDecl> {
    use AttrType::*;
    let polymorphic = [String, Number, Boolean, Array, Object];

    let mut attrs = IndexMap::new();
    attrs.insert("tagCode".into(), AttrDecl::new(String).required().inner());
    attrs.insert(
        "name".into(),
        AttrDecl::new(String).required().with_default(json!("")),
    );
    attrs.insert("hookable".into(), AttrDecl::new(Boolean).with_default(json!(true)));
    attrs.insert(
        "validation".into(),
        AttrDecl::new(Array)
            .with_producer(|| json!([]))
            .with_desc(
                "validation rules, e.g. [{type: required}, {type: custom, args: <validator>}]",
            ),
    );
    attrs.insert("default".into(), AttrDecl::any_of(&polymorphic));
    attrs.insert("hidden".into(), AttrDecl::new(Boolean).with_default(json!(false)));
    attrs.insert(
        "formEdit".into(),
        AttrDecl::new(Boolean).with_default(json!(true)).inner(),
    );
    attrs.insert(
        "formMode".into(),
        AttrDecl::new(Boolean).with_default(json!(true)).inner(),
    );
    // hide the tag while the form is not in edit mode
    attrs.insert(
        "formViewHidden".into(),
        AttrDecl::new(Boolean).with_default(json!(false)),
    );
    // grid columns out of 12
    attrs.insert("cols".into(), AttrDecl::new(Number).with_default(json!(0)));
    attrs.insert(
        "validateSet".into(),
        AttrDecl::new(Array).with_producer(|| json!([])).inner(),
    );
    attrs.insert("parentValue".into(), AttrDecl::any_of(&polymorphic).inner());
    attrs
}

/// A widget's attribute declarations, split into bindable and internal parts.
#[derive(Debug, Clone, Default)]
pub struct AttrSchema {
    bindable: Option<AttrDecl>,
    defaults: IndexMap<String, AttrValue>,
}

impl AttrSchema {
    /// Split `attrs` and precompute internal defaults.
    pub fn new(attrs: &IndexMap<String, AttrDecl>) -> Self {
        let mut bindable = None;
        let mut defaults = IndexMap::new();
        for (name, decl) in attrs {
            if name == VALUE_ATTR {
                bindable = Some(decl.clone());
            } else {
                defaults.insert(name.clone(), decl.default_value());
            }
        }
        Self { bindable, defaults }
    }

    /// The declaration of the bindable `value` attribute, if any.
    pub fn bindable(&self) -> Option<&AttrDecl> {
        self.bindable.as_ref()
    }

    /// Names of the internal attributes in declaration order.
    pub fn internal_names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Build fresh internal state for one instance.
    ///
    /// Each attribute takes the override when one is supplied, otherwise a
    /// copy of its computed default.
    pub fn instantiate(&self, overrides: &Map<String, Value>) -> AttrState {
        self.defaults
            .iter()
            .map(|(name, default)| {
                let value = match overrides.get(name) {
                    Some(v) => {
                        trace!(attr = %name, "attribute seeded from override");
                        AttrValue::Data(v.clone())
                    }
                    None => default.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Required attributes from `decls` that `attrs` lacks or leaves empty.
///
/// A required attribute with a declared default is satisfied by that default.
pub fn missing_required<'a>(
    decls: &'a IndexMap<String, AttrDecl>,
    attrs: &Map<String, Value>,
) -> Vec<&'a str> {
    decls
        .iter()
        .filter(|(_, decl)| decl.required && decl.default.is_none())
        .filter(|(name, _)| match attrs.get(name.as_str()) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        })
        .map(|(name, _)| name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn select_attrs() -> IndexMap<String, AttrDecl> {
        let mut attrs = IndexMap::new();
        attrs.insert(
            "value".into(),
            AttrDecl::new(AttrType::Array).with_producer(|| json!([])),
        );
        attrs.insert(
            "items".into(),
            AttrDecl::new(AttrType::Array).with_producer(|| json!([{"text": "a", "value": 1}])),
        );
        attrs.insert("placeholder".into(), AttrDecl::new(AttrType::String).with_default(json!("")));
        attrs.insert(
            "remote_data_init".into(),
            AttrDecl::new(AttrType::Function).with_producer(|| json!("resolved")),
        );
        attrs
    }

    #[test]
    fn value_is_kept_bindable() {
        let schema = AttrSchema::new(&select_attrs());
        assert!(schema.bindable().is_some());
        let names: Vec<_> = schema.internal_names().collect();
        assert_eq!(names, vec!["items", "placeholder", "remote_data_init"]);
    }

    #[test]
    fn function_attrs_keep_producer() {
        let schema = AttrSchema::new(&select_attrs());
        let state = schema.instantiate(&Map::new());
        let init = state["remote_data_init"].as_function().unwrap();
        assert_eq!(init(), json!("resolved"));
        assert_eq!(state["items"].as_data().unwrap()[0]["text"], json!("a"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let schema = AttrSchema::new(&select_attrs());
        let mut overrides = Map::new();
        overrides.insert("placeholder".into(), json!("pick one"));
        overrides.insert("unrelated".into(), json!(1));
        let state = schema.instantiate(&overrides);
        assert_eq!(state["placeholder"].as_data(), Some(&json!("pick one")));
        assert!(!state.contains_key("unrelated"));
    }

    #[test]
    fn instances_do_not_share_defaults() {
        let schema = AttrSchema::new(&select_attrs());
        let mut first = schema.instantiate(&Map::new());
        let second = schema.instantiate(&Map::new());
        if let Some(AttrValue::Data(Value::Array(items))) = first.get_mut("items") {
            items.push(json!({"text": "b", "value": 2}));
        }
        assert_eq!(first["items"].as_data().unwrap().as_array().unwrap().len(), 2);
        assert_eq!(second["items"].as_data().unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn producers_run_once_per_schema() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut attrs = IndexMap::new();
        attrs.insert(
            "options".into(),
            AttrDecl::new(AttrType::Array).with_producer(move || {
                counter.set(counter.get() + 1);
                json!([])
            }),
        );
        let schema = AttrSchema::new(&attrs);
        schema.instantiate(&Map::new());
        schema.instantiate(&Map::new());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn common_attrs_defaults() {
        let attrs = common_attrs();
        assert!(attrs["tagCode"].required && attrs["tagCode"].inner);
        assert!(matches!(
            attrs["hookable"].default_value(),
            AttrValue::Data(Value::Bool(true))
        ));
        assert!(attrs["validation"].desc.is_some());
        assert!(matches!(
            attrs["parentValue"].default_value(),
            AttrValue::Data(Value::Null)
        ));
    }

    #[test]
    fn missing_required_reports_empty_strings() {
        let attrs = common_attrs();
        let mut given = Map::new();
        given.insert("tagCode".into(), json!(""));
        assert_eq!(missing_required(&attrs, &given), vec!["tagCode"]);
    }

    #[test]
    fn defaulted_required_attrs_may_be_empty() {
        let attrs = common_attrs();
        let mut given = Map::new();
        given.insert("tagCode".into(), json!("ip"));
        given.insert("name".into(), json!(""));
        assert!(missing_required(&attrs, &given).is_empty());
        given.remove("name");
        assert!(missing_required(&attrs, &given).is_empty());
    }
}
