//! End-to-end tests: several tags sharing one form bus and flush queue.

use std::cell::RefCell;
use std::rc::Rc;

use rstest::rstest;
use serde_json::{json, Value};
use swissarmyhammer_form::{
    AtomEvent, AttrDecl, AttrType, Constants, CustomOutcome, DefinitionFormat, EventBus,
    FieldSlot, FlushQueue, FormDefinition, LifecycleState, LocalEvent, LocalEventBus, PlainWidget,
    Tag, TagConfig, TagEnv, TagHandle, TagMethods, ValidationMode, ValidationRule,
    ValidatorRegistry, Variable, REQUIRED_MESSAGE,
};

/// A minimal form host: one bus, one flush queue, one slot per tag.
struct Form {
    bus: Rc<LocalEventBus>,
    flush: Rc<FlushQueue>,
    data: Rc<RefCell<Value>>,
    base: TagEnv,
}

impl Form {
    fn new() -> Self {
        let bus = Rc::new(LocalEventBus::new());
        let flush = Rc::new(FlushQueue::new());
        let data = Rc::new(RefCell::new(json!({})));
        let reader = data.clone();
        let base = TagEnv::new(bus.clone(), Rc::new(FieldSlot::new()))
            .with_flush_queue(flush.clone())
            .with_form_data(Rc::new(move || reader.borrow().clone()));
        Self {
            bus,
            flush,
            data,
            base,
        }
    }

    fn slot_env(&self) -> (Rc<FieldSlot>, TagEnv) {
        let slot = Rc::new(FieldSlot::new());
        let env = self.base.for_wrapper(slot.clone());
        (slot, env)
    }

    fn settle(&self) -> usize {
        self.flush.flush().unwrap()
    }
}

fn text_input() -> PlainWidget {
    PlainWidget::new("input")
        .attr("value", AttrDecl::new(AttrType::String).with_default(json!("")))
        .attr("placeholder", AttrDecl::new(AttrType::String).with_default(json!("")))
}

fn config(tag_code: &str, name: &str) -> TagConfig {
    TagConfig::new(tag_code, name)
}

#[test_log::test]
fn linked_fields_react_to_changes() {
    let form = Form::new();
    let (_, region_env) = form.slot_env();
    let (_, zone_env) = form.slot_env();

    let region = Tag::builder(config("region", "Region"), text_input())
        .env(region_env)
        .build()
        .unwrap();
    let zone = Tag::builder(config("zone", "Zone"), text_input())
        .env(zone_env)
        .atom_events([AtomEvent::new("region", "change", |tag, region| {
            tag.set_attr("placeholder", json!(format!("zones in {}", region.as_str().unwrap_or("?"))));
            tag.update_form(json!(""));
        })])
        .build()
        .unwrap();

    region.borrow_mut().mount().unwrap();
    zone.borrow_mut().mount().unwrap();
    assert_eq!(form.settle(), 2);
    assert_eq!(region.borrow().lifecycle(), LifecycleState::Active);

    region.borrow_mut().set_value(json!("eu-west"));
    // region settles, which queues zone's reset
    assert_eq!(form.settle(), 2);
    assert_eq!(
        zone.borrow().attr("placeholder").unwrap().as_data(),
        Some(&json!("zones in eu-west"))
    );
    assert_eq!(zone.borrow().value(), &json!(""));
}

#[test_log::test]
fn destroy_leaves_no_subscriptions_behind() {
    let form = Form::new();
    let before = form.bus.subscription_count();
    let (_, env) = form.slot_env();
    let sources = ["a", "b", "c", "a"];
    let tag = Tag::builder(config("watcher", "Watcher"), text_input())
        .env(env)
        .atom_events(
            sources
                .iter()
                .map(|s| AtomEvent::new(*s, "change", |_, _| {})),
        )
        .build()
        .unwrap();
    assert_eq!(form.bus.subscription_count(), before + sources.len());
    assert_eq!(form.bus.listener_count("a_change"), 2);

    tag.borrow_mut().destroy();
    tag.borrow_mut().destroy();
    assert_eq!(form.bus.subscription_count(), before);
    assert_eq!(tag.borrow().lifecycle(), LifecycleState::Destroyed);
}

#[test_log::test]
fn init_is_announced_once_per_mount() {
    let form = Form::new();
    let inits = Rc::new(RefCell::new(Vec::new()));
    let log = inits.clone();
    form.bus.subscribe(
        "host_init",
        Rc::new(move |v: &Value| log.borrow_mut().push(v.clone())),
    );

    let (slot, env) = form.slot_env();
    let mut cfg = config("host", "Host");
    cfg.value = Some(json!("db-1"));
    let tag = Tag::builder(cfg, text_input()).env(env).build().unwrap();
    tag.borrow_mut().mount().unwrap();
    form.settle();
    form.settle();

    assert_eq!(*inits.borrow(), vec![json!("db-1")]);
    assert_eq!(slot.events(), vec![LocalEvent::Init { value: json!("db-1") }]);
}

#[test_log::test]
fn value_changes_reach_the_wrapper_before_listeners() {
    let form = Form::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let log = order.clone();
    form.bus.subscribe(
        "port_change",
        Rc::new(move |v: &Value| log.borrow_mut().push(format!("bus:{v}"))),
    );

    let (slot, env) = form.slot_env();
    let tag = Tag::builder(config("port", "Port"), text_input())
        .env(env)
        .build()
        .unwrap();
    tag.borrow_mut().set_value(json!(8080));
    for event in slot.take_events() {
        order.borrow_mut().push(format!("slot:{event:?}"));
    }
    form.settle();

    let order = order.borrow();
    assert_eq!(order.len(), 2);
    assert!(order[0].starts_with("slot:Change"));
    assert_eq!(order[1], "bus:8080");
}

#[test_log::test]
fn lookups_follow_form_data() {
    let form = Form::new();
    *form.data.borrow_mut() = json!({"network": {"vpc": {"cidr": "10.0.0.0/16"}}});
    let (_, env) = form.slot_env();
    let tag = Tag::builder(config("subnet", "Subnet"), text_input())
        .env(env)
        .build()
        .unwrap();
    let tag = tag.borrow();

    assert_eq!(
        tag.get_tag_value(&["network", "vpc", "cidr"], None).unwrap(),
        json!("10.0.0.0/16")
    );
    assert!(tag.get_tag_value(&["network", "subnet"], None).is_err());
}

#[test_log::test]
fn hook_mode_round_trip() {
    let mut constants = Constants::new();
    constants.insert("${budget}".into(), Variable::new(json!(42)));
    let env = TagEnv::standalone().with_constants(Rc::new(constants));

    let mut cfg = config("budget", "Budget");
    cfg.hook = true;
    cfg.value = Some(json!("${budget}"));
    cfg.validate_set = vec!["regex".into()];
    cfg.validation = vec![ValidationRule::regex(r"^\d+$", "digits only")];
    let tag = Tag::builder(cfg, text_input()).env(env).build().unwrap();

    assert_eq!(tag.borrow().get_value(false), json!(42));
    assert_eq!(tag.borrow().get_value(true), json!("${budget}"));
    assert!(tag.borrow_mut().validate().unwrap());
}

#[test_log::test]
fn hidden_tags_drop_out_of_submission() {
    let form = Form::new();
    let (slot, env) = form.slot_env();
    let tag = Tag::builder(config("notes", "Notes"), text_input())
        .env(env)
        .build()
        .unwrap();
    assert!(slot.is_hooked());
    tag.borrow_mut().hide();
    assert!(!slot.is_hooked());
    tag.borrow().change_hook(true);
    assert!(slot.is_hooked());
}

#[test_log::test]
fn method_overrides_replace_defaults() {
    let form = Form::new();
    let (slot, env) = form.slot_env();
    let tag = Tag::builder(config("tags", "Tags"), text_input())
        .env(env)
        .atom_methods(
            TagMethods::new()
                .set_value(|tag, value| {
                    let wrapped = match value {
                        Value::Array(_) => value,
                        other => json!([other]),
                    };
                    tag.update_form(wrapped);
                })
                .hide(|tag| tag.set_attr("collapsed", json!(true))),
        )
        .build()
        .unwrap();

    tag.borrow_mut().set_value(json!("web"));
    assert_eq!(tag.borrow().value(), &json!(["web"]));
    tag.borrow_mut().hide();
    assert!(slot.is_hooked());
    assert_eq!(
        tag.borrow().attr("collapsed").unwrap().as_data(),
        Some(&json!(true))
    );
}

#[rstest]
#[case::empty_string(json!(""), false)]
#[case::whitespace(json!(" "), true)]
#[case::empty_object(json!({}), false)]
#[case::object(json!({"a": 1}), true)]
#[case::falsy_array(json!([0, "", null]), false)]
#[case::array(json!([0, "x"]), true)]
#[case::zero(json!(0), true)]
#[case::boolean(json!(false), true)]
#[case::null(json!(null), true)]
fn required_rule_outcomes(#[case] value: Value, #[case] valid: bool) {
    let mut cfg = config("field", "Field");
    cfg.value = Some(value);
    cfg.validate_set = vec!["required".into()];
    cfg.validation = vec![ValidationRule::required()];
    let tag = Tag::builder(cfg, PlainWidget::new("any")).build().unwrap();
    assert_eq!(tag.borrow_mut().validate().unwrap(), valid);
    let info = tag.borrow().validate_info().clone();
    assert_eq!(info.valid, valid);
    if !valid {
        assert_eq!(info.message, REQUIRED_MESSAGE);
    }
}

#[test_log::test]
fn named_validators_from_definition() {
    let definition = FormDefinition::from_str(
        r#"
validation_mode: evaluate-all
tags:
  - tagCode: cpu
    name: CPU
    value: 96
    validateSet: [custom, required]
    validation:
      - type: custom
        args: max_cores
      - type: required
"#,
        DefinitionFormat::Yaml,
    )
    .unwrap();

    let validators = ValidatorRegistry::new().register("max_cores", |_, value, _| {
        Ok(if value.as_u64().is_some_and(|n| n <= 64) {
            CustomOutcome::pass()
        } else {
            CustomOutcome::fail("too many cores")
        })
    });

    let env = definition
        .env_for(
            Rc::new(LocalEventBus::new()) as Rc<dyn EventBus>,
            Rc::new(FieldSlot::new()),
        )
        .with_validators(validators);
    assert_eq!(definition.validation_mode, ValidationMode::EvaluateAll);

    let tag: TagHandle = Tag::builder(definition.tag("cpu").unwrap().clone(), text_input())
        .env(env)
        .build()
        .unwrap();
    // the required rule runs last and passes, but the result is still false
    assert!(!tag.borrow_mut().validate().unwrap());
    assert!(tag.borrow().validate_info().valid);
}
