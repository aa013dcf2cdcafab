//! Shared field behavior for dynamic form tags
//!
//! `swissarmyhammer-form` is the common layer every field widget ("tag") in a
//! configuration-driven form is built on. Concrete widgets declare their
//! attributes through [`Widget`]; everything else lives on [`Tag`].
//!
//! # Architecture
//!
//! - **Attribute schema**: Widgets split their declarations into a bindable
//!   `value` and internal state, seeded per instance
//! - **Lifecycle**: Bus subscriptions are made at build time and removed on
//!   destroy; `init` and post-change work run on a [`FlushQueue`]
//! - **Validation**: `required`, `regex` and `custom` rules, gated by the
//!   tag's `validateSet`
//! - **Value resolution**: Hooked tags resolve through a constants table
//!   keyed by `${tagCode}`
//! - **Event relay**: Tags talk over an [`EventBus`] owned by the enclosing
//!   form, keyed `{source}_{type}`

pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod rules;
pub mod schema;
pub mod tag;
pub mod validation;
pub mod value;
pub mod variables;
pub mod widget;

pub use config::{DefinitionFormat, FormDefinition};
pub use error::{FormError, Result, VariableLookupFailure};
pub use events::{
    event_key, AtomEvent, EventBus, EventHandler, FieldSlot, FormDataAccessor, LocalEvent,
    LocalEventBus, SubscriptionId, TagWrapper,
};
pub use lifecycle::{FlushQueue, LifecycleState};
pub use rules::{CustomOutcome, RuleArgs, RuleType, ValidationRule, ValidatorRegistry};
pub use schema::{common_attrs, AttrDecl, AttrSchema, AttrType, AttrValue};
pub use tag::{Tag, TagBuilder, TagConfig, TagEnv, TagHandle};
pub use validation::{ValidateInfo, ValidationEngine, ValidationMode, REQUIRED_MESSAGE};
pub use value::{Constants, Variable};
pub use variables::GlobalVariables;
pub use widget::{PlainWidget, TagMethods, Widget};
