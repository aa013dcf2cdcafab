//! Tag — one configurable field instance in a form tree.
//!
//! A tag combines its [`TagConfig`], the widget type that renders it and the
//! [`TagEnv`] it was mounted into. It owns its value, validation outcome and
//! bus subscriptions:
//!
//! ```text
//! build()   → subscribe atomEvents on the bus           (constructed)
//! mount()   → widget init hook, queue `init`             (mounted)
//! flush     → publish `{tagCode}_init`, local `init`     (active)
//! destroy() → unsubscribe everything from build()        (destroyed)
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::{FormError, Result};
use crate::events::{
    event_key, AtomEvent, EventAction, EventBus, EventHandler, FieldSlot, FormDataAccessor,
    LocalEvent, LocalEventBus, SubscriptionId, TagWrapper,
};
use crate::lifecycle::{Deferred, FlushQueue, LifecycleState};
use crate::rules::{ValidationRule, ValidatorRegistry};
use crate::schema::{common_attrs, missing_required, AttrSchema, AttrState, AttrValue};
use crate::validation::{ValidateInfo, ValidationEngine, ValidationMode};
use crate::value::{lookup_path, placeholder_key, Constants};
use crate::variables::GlobalVariables;
use crate::widget::{TagMethods, Widget};

/// Shared handle to a live tag.
pub type TagHandle = Rc<RefCell<Tag>>;

fn default_true() -> bool {
    true
}

/// Per-instance configuration supplied by the form definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagConfig {
    /// Unique within the nearest enclosing form or group.
    pub tag_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub hookable: bool,
    #[serde(default)]
    pub validation: Vec<ValidationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub form_edit: bool,
    #[serde(default = "default_true")]
    pub form_mode: bool,
    #[serde(default)]
    pub form_view_hidden: bool,
    #[serde(default)]
    pub cols: u8,
    #[serde(default)]
    pub validate_set: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parent_value: Value,
    /// Resolve the value through the constants table.
    #[serde(default)]
    pub hook: bool,
    /// The bound value, when the form already has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Widget-specific attribute overrides.
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl TagConfig {
    /// A config with defaults for everything but the code and name.
    pub fn new(tag_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag_code: tag_code.into(),
            name: name.into(),
            hookable: true,
            validation: Vec::new(),
            default: None,
            hidden: false,
            form_edit: true,
            form_mode: true,
            form_view_hidden: false,
            cols: 0,
            validate_set: Vec::new(),
            parent_value: Value::Null,
            hook: false,
            value: None,
            attrs: Map::new(),
        }
    }

    /// Check that every required common attribute is present.
    pub fn check(&self) -> Result<()> {
        let mut given = self.attrs.clone();
        given.insert("tagCode".into(), Value::String(self.tag_code.clone()));
        given.insert("name".into(), Value::String(self.name.clone()));
        let decls = common_attrs();
        match missing_required(&decls, &given).first() {
            Some(attr) => Err(FormError::MissingAttribute {
                attr: attr.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// What a tag is mounted into: the ancestor bus, its wrapper and the
/// form-level collaborators.
#[derive(Clone)]
pub struct TagEnv {
    bus: Rc<dyn EventBus>,
    wrapper: Rc<dyn TagWrapper>,
    form_data: Rc<dyn FormDataAccessor>,
    constants: Option<Rc<Constants>>,
    flush: Rc<FlushQueue>,
    validators: ValidatorRegistry,
    mode: ValidationMode,
}

impl TagEnv {
    /// An environment over `bus` and `wrapper` with no constants.
    pub fn new(bus: Rc<dyn EventBus>, wrapper: Rc<dyn TagWrapper>) -> Self {
        Self {
            bus,
            wrapper,
            form_data: Rc::new(|| Value::Object(Map::new())),
            constants: None,
            flush: Rc::new(FlushQueue::new()),
            validators: ValidatorRegistry::new(),
            mode: ValidationMode::default(),
        }
    }

    /// An environment with its own private bus and wrapper.
    pub fn standalone() -> Self {
        Self::new(Rc::new(LocalEventBus::new()), Rc::new(FieldSlot::new()))
    }

    /// Source for the whole form's data.
    pub fn with_form_data(mut self, form_data: Rc<dyn FormDataAccessor>) -> Self {
        self.form_data = form_data;
        self
    }

    /// Constants table for hook mode.
    pub fn with_constants(mut self, constants: Rc<Constants>) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Share a flush queue with other tags in the same form.
    pub fn with_flush_queue(mut self, flush: Rc<FlushQueue>) -> Self {
        self.flush = flush;
        self
    }

    /// Named validators for `custom` rules.
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// How rule lists are walked.
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Same form-level collaborators, different wrapper.
    pub fn for_wrapper(&self, wrapper: Rc<dyn TagWrapper>) -> Self {
        Self {
            wrapper,
            ..self.clone()
        }
    }

    /// The ancestor bus.
    pub fn bus(&self) -> &Rc<dyn EventBus> {
        &self.bus
    }

    /// The queue deferred work is scheduled on.
    pub fn flush_queue(&self) -> &Rc<FlushQueue> {
        &self.flush
    }
}

impl fmt::Debug for TagEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagEnv")
            .field("constants", &self.constants.as_ref().map(|c| c.len()))
            .field("validators", &self.validators)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Tag`]. Created by [`Tag::builder`].
pub struct TagBuilder {
    config: TagConfig,
    widget: Rc<dyn Widget>,
    env: TagEnv,
    atom_events: Vec<AtomEvent>,
    methods: TagMethods,
}

impl TagBuilder {
    /// Mount into `env` instead of a standalone environment.
    pub fn env(mut self, env: TagEnv) -> Self {
        self.env = env;
        self
    }

    /// Bus events this tag reacts to.
    pub fn atom_events(mut self, events: impl IntoIterator<Item = AtomEvent>) -> Self {
        self.atom_events.extend(events);
        self
    }

    /// Per-instance method overrides.
    pub fn atom_methods(mut self, methods: TagMethods) -> Self {
        self.methods = methods;
        self
    }

    /// Build the tag and subscribe its atom events.
    pub fn build(self) -> Result<TagHandle> {
        self.config.check()?;

        let schema = AttrSchema::new(&self.widget.attrs());
        let state = schema.instantiate(&self.config.attrs);
        let value = self
            .config
            .value
            .clone()
            .or_else(|| {
                schema
                    .bindable()
                    .and_then(|decl| decl.default_value().as_data().cloned())
                    .filter(|v| !v.is_null())
            })
            .or_else(|| self.config.default.clone())
            .unwrap_or(Value::Null);

        let handle = Rc::new_cyclic(|this| {
            RefCell::new(Tag {
                editable: self.config.form_edit,
                config: self.config,
                widget: self.widget,
                value,
                state,
                validate_info: ValidateInfo::default(),
                env: self.env,
                methods: self.methods,
                atom_events: self.atom_events,
                event_actions: Vec::new(),
                lifecycle: LifecycleState::Constructed,
                this: this.clone(),
            })
        });

        handle.borrow_mut().wire();
        Ok(handle)
    }
}

/// A single field instance.
pub struct Tag {
    config: TagConfig,
    widget: Rc<dyn Widget>,
    value: Value,
    state: AttrState,
    editable: bool,
    validate_info: ValidateInfo,
    env: TagEnv,
    methods: TagMethods,
    atom_events: Vec<AtomEvent>,
    event_actions: Vec<(String, SubscriptionId)>,
    lifecycle: LifecycleState,
    this: Weak<RefCell<Tag>>,
}

impl Tag {
    /// Start building a tag of the given widget type.
    ///
    /// ```rust,ignore
    /// let tag = Tag::builder(config, PlainWidget::new("input"))
    ///     .env(env)
    ///     .atom_events([AtomEvent::new("region", "change", |tag, v| { /* ... */ })])
    ///     .build()?;
    /// tag.borrow_mut().mount()?;
    /// ```
    pub fn builder(config: TagConfig, widget: impl Widget + 'static) -> TagBuilder {
        TagBuilder {
            config,
            widget: Rc::new(widget),
            env: TagEnv::standalone(),
            atom_events: Vec::new(),
            methods: TagMethods::default(),
        }
    }

    // --- Accessors ---

    /// Unique code of this tag.
    pub fn tag_code(&self) -> &str {
        &self.config.tag_code
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration the tag was built from.
    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    /// Widget type name.
    pub fn widget_kind(&self) -> &str {
        self.widget.kind()
    }

    /// The stored value, never resolved through constants.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Value of the enclosing group.
    pub fn parent_value(&self) -> &Value {
        &self.config.parent_value
    }

    /// Containers push the enclosing group's value here.
    pub fn set_parent_value(&mut self, value: Value) {
        self.config.parent_value = value;
    }

    /// Outcome of the last validation.
    pub fn validate_info(&self) -> &ValidateInfo {
        &self.validate_info
    }

    /// Validators available to `custom` rules.
    pub fn validators(&self) -> &ValidatorRegistry {
        &self.env.validators
    }

    /// Internal attribute state by name.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.state.get(name)
    }

    /// Update internal widget state.
    pub fn set_attr(&mut self, name: impl Into<String>, value: Value) {
        self.state.insert(name.into(), AttrValue::Data(value));
    }

    /// Whether the tag is in edit mode.
    pub fn editable(&self) -> bool {
        self.editable
    }

    /// Switch edit mode.
    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Hidden tags and view-hidden tags outside edit mode are not shown.
    pub fn is_visible(&self) -> bool {
        !self.config.hidden && (self.editable || !self.config.form_view_hidden)
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Bus keys this tag is subscribed to, in registration order.
    pub fn event_keys(&self) -> impl Iterator<Item = &str> {
        self.event_actions.iter().map(|(key, _)| key.as_str())
    }

    /// The immediate wrapper.
    pub fn get_form_instance(&self) -> Rc<dyn TagWrapper> {
        self.env.wrapper.clone()
    }

    /// The enclosing form or group bus.
    pub fn get_parent(&self) -> Rc<dyn EventBus> {
        self.env.bus.clone()
    }

    // --- Lifecycle ---

    fn wire(&mut self) {
        let events = self.atom_events.clone();
        for event in events {
            let key = event.key();
            let handler = self.event_handler(event.action.clone());
            let id = self.env.bus.subscribe(&key, handler);
            self.event_actions.push((key, id));
        }
        debug!(
            tag = %self.config.tag_code,
            widget = %self.widget.kind(),
            events = self.event_actions.len(),
            overrides = ?self.methods,
            "tag constructed"
        );
    }

    fn unwire(&mut self) {
        for (key, id) in self.event_actions.drain(..) {
            if !self.env.bus.unsubscribe(&key, id) {
                warn!(tag = %self.config.tag_code, event = %key, "subscription already gone");
            }
        }
    }

    /// Wrap `action` as a bus callback bound to this tag.
    ///
    /// The callback does nothing once the tag is destroyed or dropped. An
    /// event arriving while the tag is borrowed, including one the tag just
    /// published itself, runs on the next flush.
    pub fn event_handler(&self, action: EventAction) -> EventHandler {
        let this = self.this.clone();
        let flush = self.env.flush.clone();
        let tag_code = self.config.tag_code.clone();
        Rc::new(move |payload: &Value| {
            let Some(handle) = this.upgrade() else {
                return;
            };
            let Ok(mut tag) = handle.try_borrow_mut() else {
                debug!(tag = %tag_code, "tag busy, event deferred");
                flush.schedule(
                    this.clone(),
                    Deferred::Deliver {
                        action: action.clone(),
                        payload: payload.clone(),
                    },
                );
                return;
            };
            if tag.lifecycle == LifecycleState::Destroyed {
                return;
            }
            action(&mut *tag, payload);
        })
    }

    /// Run the widget initializer and queue the `init` announcement.
    pub fn mount(&mut self) -> Result<()> {
        if self.lifecycle != LifecycleState::Constructed {
            return Err(self.lifecycle_error("mount"));
        }
        match self.methods.init.clone() {
            Some(init) => init(&mut *self)?,
            None => {
                let widget = self.widget.clone();
                widget.init(self)?;
            }
        }
        self.lifecycle = LifecycleState::Mounted;
        self.schedule(Deferred::Announce);
        debug!(tag = %self.config.tag_code, "tag mounted");
        Ok(())
    }

    /// Unsubscribe everything registered at construction.
    pub fn destroy(&mut self) {
        if self.lifecycle == LifecycleState::Destroyed {
            return;
        }
        self.unwire();
        self.lifecycle = LifecycleState::Destroyed;
        debug!(tag = %self.config.tag_code, "tag destroyed");
    }

    fn schedule(&self, work: Deferred) {
        self.env.flush.schedule(self.this.clone(), work);
    }

    /// Run deferred work. Returns `false` when the tag is already destroyed.
    pub(crate) fn run_deferred(&mut self, work: Deferred) -> Result<bool> {
        if self.lifecycle == LifecycleState::Destroyed {
            trace!(tag = %self.config.tag_code, ?work, "deferred work on destroyed tag ignored");
            return Ok(false);
        }
        match work {
            Deferred::Announce => {
                self.emit_event(&self.config.tag_code, "init", &self.value);
                self.env.wrapper.notify(LocalEvent::Init {
                    value: self.value.clone(),
                });
                if self.lifecycle == LifecycleState::Mounted {
                    self.lifecycle = LifecycleState::Active;
                }
            }
            Deferred::Settle => {
                self.on_change();
                self.validate()?;
            }
            Deferred::Deliver { action, payload } => action(&mut *self, &payload),
        }
        Ok(true)
    }

    fn lifecycle_error(&self, action: &'static str) -> FormError {
        FormError::Lifecycle {
            tag: self.config.tag_code.clone(),
            action,
            state: self.lifecycle.as_str(),
        }
    }

    // --- Validation ---

    /// Validate the current value and record the outcome.
    ///
    /// An instance override or widget-level validation replaces the common
    /// rules entirely.
    pub fn validate(&mut self) -> Result<bool> {
        if let Some(validate) = self.methods.validate.clone() {
            return validate(self);
        }
        let widget = self.widget.clone();
        if let Some(result) = widget.custom_validate(self) {
            return result;
        }
        if self.config.validation.is_empty() {
            return Ok(true);
        }

        let report = ValidationEngine::new(
            &self.config.validate_set,
            &self.env.validators,
            self.env.mode,
        )
        .run(
            self,
            &self.config.validation,
            &self.value,
            &self.config.parent_value,
        )?;

        if let Some(info) = report.info {
            self.validate_info = info;
        }
        Ok(report.valid)
    }

    /// Evaluate one rule against `value` without recording the outcome.
    pub fn validate_result(
        &self,
        rule: &ValidationRule,
        value: &Value,
        parent_value: &Value,
    ) -> Result<ValidateInfo> {
        ValidationEngine::new(&self.config.validate_set, &self.env.validators, self.env.mode)
            .rule_result(self, rule, value, parent_value)
    }

    // --- Values ---

    /// The tag's value. With `keep_val_key` the raw stored value is returned
    /// even in hook mode.
    pub fn get_value(&self, keep_val_key: bool) -> Value {
        match self.methods.get_value.clone() {
            Some(get_value) => get_value(self, keep_val_key),
            None => self.resolve_value(keep_val_key),
        }
    }

    /// Default value resolution, bypassing any override.
    pub fn resolve_value(&self, keep_val_key: bool) -> Value {
        if keep_val_key || !self.config.hook {
            return self.value.clone();
        }
        let Some(constants) = &self.env.constants else {
            return self.value.clone();
        };
        let key = placeholder_key(&self.config.tag_code);
        match constants.get(&key) {
            Some(variable) => variable.value.clone(),
            None => self.value.clone(),
        }
    }

    /// Set the value through the normal update path.
    ///
    /// A hooked tag rewrites its own stored value; the constants table is
    /// left untouched.
    pub fn set_value(&mut self, value: Value) {
        match self.methods.set_value.clone() {
            Some(set_value) => set_value(self, value),
            None => self.update_form(value),
        }
    }

    /// Push a new value to the wrapper, commit it, then queue `onChange`
    /// and `validate` for the next flush.
    pub fn update_form(&mut self, value: Value) {
        self.env.wrapper.notify(LocalEvent::Change {
            fields: vec![self.config.tag_code.clone()],
            value: value.clone(),
        });
        self.value = value;
        self.schedule(Deferred::Settle);
    }

    /// Value of any tag in the form, by key path.
    ///
    /// Looks in `data` when given, otherwise in the whole form's data.
    pub fn get_tag_value<S: AsRef<str>>(&self, path: &[S], data: Option<&Value>) -> Result<Value> {
        match data {
            Some(data) => lookup_path(path, data),
            None => lookup_path(path, &self.env.form_data.form_data()),
        }
    }

    /// Value of a process-global variable.
    pub fn get_variable_val(&self, key: &str) -> Result<Value> {
        GlobalVariables::global().get(key)
    }

    // --- Events ---

    /// Publish `data` on the bus as `{name}_{type_}`.
    pub fn emit_event(&self, name: &str, type_: &str, data: &Value) {
        let key = event_key(name, type_);
        trace!(tag = %self.config.tag_code, event = %key, "emit");
        self.env.bus.publish(&key, data);
    }

    /// Publish `{tagCode}_change` with the current value.
    pub fn on_change(&self) {
        match self.methods.on_change.clone() {
            Some(on_change) => on_change(self),
            None => self.emit_event(&self.config.tag_code, "change", &self.value),
        }
    }

    /// Show the tag.
    pub fn show(&mut self) {
        match self.methods.show.clone() {
            Some(show) => show(self),
            None => self.env.wrapper.notify(LocalEvent::Show),
        }
    }

    /// Hide the tag. A hidden tag is excluded from submission.
    pub fn hide(&mut self) {
        match self.methods.hide.clone() {
            Some(hide) => hide(self),
            None => {
                self.change_hook(false);
                self.env.wrapper.notify(LocalEvent::Hide);
            }
        }
    }

    /// Toggle whether this tag's value is included in submission.
    pub fn change_hook(&self, hooked: bool) {
        self.env.wrapper.on_hook_form(hooked);
    }
}

impl Drop for Tag {
    fn drop(&mut self) {
        if self.lifecycle != LifecycleState::Destroyed {
            self.unwire();
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("tag_code", &self.config.tag_code)
            .field("widget", &self.widget.kind())
            .field("value", &self.value)
            .field("lifecycle", &self.lifecycle)
            .field("validate_info", &self.validate_info)
            .finish_non_exhaustive()
    }
}
