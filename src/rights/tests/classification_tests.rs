//! Classification of rights across resource types and the universal set

mod common;

use common::{load_school, School};
use cretoai_rights::{
    AuthzError, ConfigurationError, Definitions, EngineConfig, EvalMode, InMemoryResolver, Mode,
    PolicyRegistry, Principal, Resource, ResourceRef, Result, RuleBody, RuleOptions, RuleSet, SecurityContext,
    ALL_RESOURCES,
};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// SCHOOL RULES
// ============================================================================

#[test]
fn test_relation_modes() {
    let school = School::new();
    let table = school.registry.snapshot();

    let course = table.class("course").unwrap();
    let student = course.rule_set().classification_of("student").unwrap();
    assert!(student.is_static && !student.is_dynamic && student.requires_principal);

    let enrolled = course.rule_set().classification_of("enrolled").unwrap();
    assert!(!enrolled.is_static && enrolled.is_dynamic);

    let open = table.class("assignment").unwrap().rule_set().classification_of("open").unwrap();
    assert!(open.is_static && open.is_dynamic);

    let administrator = course.rule_set().classification_of("administrator").unwrap();
    assert!(administrator.is_static && !administrator.requires_principal);
}

#[test]
fn test_right_classification_follows_references() {
    let school = School::new();
    let table = school.registry.snapshot();
    let course = table.class("course").unwrap();

    let index = course.rule_set().classification_of("index").unwrap();
    assert!(index.is_static && !index.is_dynamic && index.requires_principal);

    let show = course.rule_set().classification_of("show").unwrap();
    assert!(!show.is_static && show.is_dynamic && show.requires_principal);

    let assignment = table.class("assignment").unwrap();
    let submit = assignment.rule_set().classification_of("submit").unwrap();
    assert!(!submit.is_static && submit.is_dynamic);

    // remote rights and paths need a resource but no principal of their own
    let advanced = assignment.rule_set().classification_of("advanced").unwrap();
    assert!(advanced.is_dynamic && !advanced.requires_principal);
}

#[test]
fn test_static_rules_are_reachable_dynamically() {
    let school = School::new();
    let table = school.registry.snapshot();
    let rules = Arc::clone(table.class("course").unwrap().rule_set());

    let index = rules.get_rule("index", EvalMode::Dynamic).unwrap();
    assert!(index.is_delegate());

    let show = rules.get_rule("show", EvalMode::Dynamic).unwrap();
    assert!(!show.is_delegate());
    assert!(matches!(
        rules.get_rule("show", EvalMode::Static),
        Err(AuthzError::RuleNotFound { .. })
    ));
}

#[test]
fn test_classify_all_succeeds_for_school() {
    let config = EngineConfig {
        classify_on_load: true,
        ..EngineConfig::default()
    };
    let registry = PolicyRegistry::build(load_school, config).unwrap();
    let table = registry.snapshot();
    let rules = Arc::clone(table.class("assignment_result").unwrap().rule_set());

    let grade = rules.get_rule("grade", EvalMode::Dynamic).unwrap();
    assert!(grade.classification().is_some_and(|c| c.is_dynamic));
}

// ============================================================================
// INHERITANCE FROM all_resources
// ============================================================================

fn inheriting(definitions: &mut Definitions) -> Result<()> {
    let universal = definitions.resource(ALL_RESOURCES);
    universal.relation("owner", Mode::System, RuleOptions::new(), |ctx| {
        Ok(ctx.principal().is_some_and(|principal| principal.is("owner")))
    })?;
    universal.right("manage", "if owner")?;

    definitions
        .resource("course")
        .relation("owner", Mode::Resource, RuleOptions::new(), |ctx| {
            Ok(ctx.resource().is_some_and(|resource| resource.resource_id() == "mine"))
        })?;
    definitions.resource("assignment");
    Ok(())
}

#[derive(Debug)]
struct Room(&'static str);

impl Resource for Room {
    fn resource_type(&self) -> &str {
        "course"
    }

    fn resource_id(&self) -> String {
        self.0.to_string()
    }
}

#[test]
fn test_inherited_right_is_reclassified_per_type() {
    let registry = PolicyRegistry::build(inheriting, EngineConfig::default()).unwrap();
    let table = registry.snapshot();

    // course sees the universal static owner next to its own dynamic one
    let on_course = table.class("course").unwrap().rule_set().classification_of("manage").unwrap();
    assert!(on_course.is_static && on_course.is_dynamic);

    let on_assignment = table
        .class("assignment")
        .unwrap()
        .rule_set()
        .classification_of("manage")
        .unwrap();
    assert!(on_assignment.is_static && !on_assignment.is_dynamic);
}

#[test]
fn test_missing_bucket_is_filled_from_universal() {
    let registry = PolicyRegistry::build(inheriting, EngineConfig::default()).unwrap();
    let table = registry.snapshot();
    let course = table.class("course").unwrap();

    let inherited = course.rule_set().get_rule("owner", EvalMode::Static).unwrap();
    assert_eq!(inherited.mode(), Mode::System);
    assert_eq!(inherited.resource_type(), "course");

    let local = course.rule_set().get_rule("owner", EvalMode::Dynamic).unwrap();
    assert_eq!(local.mode(), Mode::Resource);
}

#[test]
fn test_inherited_rules_are_independent_copies() {
    let registry = PolicyRegistry::build(inheriting, EngineConfig::default()).unwrap();
    let table = registry.snapshot();

    let course = table.class("course").unwrap();
    let rule = course.rule_set().get_rule("manage", EvalMode::Dynamic).unwrap();
    assert_eq!(rule.resource_type(), "course");
    assert_eq!(rule.qualified_name(), "course.manage");

    // the universal definition stays unclassified
    assert!(table.universal().contains("manage"));
    assert!(!Arc::ptr_eq(course.rule_set(), table.universal()));
}

#[test]
fn test_local_definition_shadows_universal_per_bucket() {
    let registry = PolicyRegistry::build(inheriting, EngineConfig::default()).unwrap();
    let resolver: Arc<dyn cretoai_rights::ResourceResolver> = Arc::new(InMemoryResolver::new());
    let mut holder = SecurityContext::with_principal(
        registry.snapshot(),
        Arc::clone(&resolver),
        Principal::new("user:alice").with_capability("owner"),
    );
    let mut plain = SecurityContext::with_principal(registry.snapshot(), resolver, Principal::new("user:bob"));
    let mine: ResourceRef = Arc::new(Room("mine"));
    let other: ResourceRef = Arc::new(Room("other"));

    // without a resource both types use the capability check
    assert!(holder.allowed("manage", "assignment", None).unwrap());
    assert!(holder.allowed("manage", "course", None).unwrap());
    assert!(!plain.allowed("manage", "course", None).unwrap());

    // against a course object the local relation decides
    assert!(!holder.allowed("manage", "course", Some(&other)).unwrap());
    assert!(plain.allowed("manage", "course", Some(&mine)).unwrap());
}

// ============================================================================
// DEFINITION ERRORS
// ============================================================================

#[test]
fn test_circular_rights() {
    let circular = |definitions: &mut Definitions| -> Result<()> {
        let course = definitions.resource("course");
        course.right("a", "if b")?;
        course.right("b", "if c or true")?;
        course.right("c", "if a")?;
        Ok(())
    };
    let registry = PolicyRegistry::build(circular, EngineConfig::default()).unwrap();
    let table = registry.snapshot();

    let err = table.class("course").unwrap().rule_set().classification_of("a").unwrap_err();
    match err {
        AuthzError::Configuration(ConfigurationError::CircularReference { path }) => {
            for name in ["a", "b", "c"] {
                assert!(path.contains(name), "path {path} misses {name}");
            }
        }
        other => panic!("expected circular reference, got {other:?}"),
    }
}

#[test]
fn test_undefined_reference_fails_on_first_use() {
    let registry = PolicyRegistry::build(
        |definitions: &mut Definitions| -> Result<()> {
            definitions.resource("course").right("show", "if enrolled or ghost")?;
            Ok(())
        },
        EngineConfig::default(),
    )
    .unwrap();
    let table = registry.snapshot();

    assert!(matches!(
        table.class("course").unwrap().rule_set().classification_of("show"),
        Err(AuthzError::RuleNotFound { ref name, .. }) if name == "enrolled"
    ));
}

fn syntax_error(definitions: &mut Definitions) -> Result<()> {
    definitions.resource("course").right("show", "if (enrolled")?;
    Ok(())
}

fn native_right(definitions: &mut Definitions) -> Result<()> {
    definitions
        .resource("course")
        .define("edit", Mode::Right, RuleOptions::new(), RuleBody::native(|_| Ok(true)))?;
    Ok(())
}

fn condition_relation(definitions: &mut Definitions) -> Result<()> {
    definitions.resource("course").define("member", Mode::System, RuleOptions::new(), "if true")?;
    Ok(())
}

fn reserved_name(definitions: &mut Definitions) -> Result<()> {
    definitions.resource("course").right("allowed", "true")?;
    Ok(())
}

fn unknown_mode(definitions: &mut Definitions) -> Result<()> {
    definitions.resource("course").define_parsed("member", "global", "", true)?;
    Ok(())
}

#[test]
fn test_invalid_definitions_fail_at_load() {
    let cases: [(&str, fn(&mut Definitions) -> Result<()>); 5] = [
        ("syntax", syntax_error),
        ("native right", native_right),
        ("condition relation", condition_relation),
        ("reserved", reserved_name),
        ("mode", unknown_mode),
    ];

    for (case, loader) in cases {
        let err = PolicyRegistry::build(loader, EngineConfig::default()).unwrap_err();
        assert!(err.is_configuration(), "{case}: {err}");
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn test_chained_rights_inherit_relation_mode(depth in 1usize..8, mode_index in 0usize..3) {
        let mode = [Mode::System, Mode::Resource, Mode::Pretest][mode_index];
        let rules = RuleSet::new("course", None);
        rules.define("base", mode, RuleOptions::new(), true).unwrap();
        for level in 0..depth {
            let referenced = if level == 0 { "base".to_string() } else { format!("r{}", level - 1) };
            rules.define(&format!("r{level}"), Mode::Right, RuleOptions::new(), format!("if {referenced}")).unwrap();
        }

        let base = rules.classification_of("base").unwrap();
        let top = rules.classification_of(&format!("r{}", depth - 1)).unwrap();
        prop_assert_eq!(top.is_static, base.is_static);
        prop_assert_eq!(top.is_dynamic, base.is_dynamic);
        prop_assert!(top.requires_principal);
    }

    #[test]
    fn test_static_right_is_also_dynamically_reachable(negate in any::<bool>()) {
        let rules = RuleSet::new("course", None);
        rules.define("staff", Mode::System, RuleOptions::new(), !negate).unwrap();
        rules.define("index", Mode::Right, RuleOptions::new(), "if staff").unwrap();

        prop_assert!(rules.classification_of("index").unwrap().is_static);
        prop_assert!(rules.get_rule("index", EvalMode::Dynamic).unwrap().is_delegate());
    }
}
