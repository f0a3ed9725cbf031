//! Shared fixtures: a small school with courses, assignments and results
#![allow(dead_code)]

use anyhow::anyhow;
use cretoai_rights::{
    ArgValue, Definitions, EngineConfig, InMemoryResolver, Mode, PolicyRegistry, Principal, Resource,
    ResourceRef, Result, RuleOptions, SecurityContext, ALL_RESOURCES,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// DOMAIN OBJECTS
// ============================================================================

#[derive(Debug)]
pub struct Course {
    pub id: String,
    pub students: Vec<String>,
    pub teachers: Vec<String>,
    pub level: i64,
}

impl Resource for Course {
    fn resource_type(&self) -> &str {
        "course"
    }

    fn resource_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug)]
pub struct Assignment {
    pub id: String,
    pub course: Option<Arc<Course>>,
    pub open: bool,
}

impl Resource for Assignment {
    fn resource_type(&self) -> &str {
        "assignment"
    }

    fn resource_id(&self) -> String {
        self.id.clone()
    }

    fn related(&self, field: &str) -> anyhow::Result<Option<ResourceRef>> {
        match field {
            "course" => Ok(self.course.clone().map(|course| course as ResourceRef)),
            other => Err(anyhow!("assignment has no field `{other}`")),
        }
    }
}

#[derive(Debug)]
pub struct AssignmentResult {
    pub id: String,
    pub assignment: Arc<Assignment>,
    /// Student id of the submitter
    pub owner: String,
}

impl Resource for AssignmentResult {
    fn resource_type(&self) -> &str {
        "assignment_result"
    }

    fn resource_id(&self) -> String {
        self.id.clone()
    }

    fn related(&self, field: &str) -> anyhow::Result<Option<ResourceRef>> {
        match field {
            "assignment" => Ok(Some(Arc::clone(&self.assignment) as ResourceRef)),
            other => Err(anyhow!("assignment result has no field `{other}`")),
        }
    }
}

/// Student profile; principals of type `student` are these objects
#[derive(Debug)]
pub struct Student {
    pub id: String,
}

impl Resource for Student {
    fn resource_type(&self) -> &str {
        "student"
    }

    fn resource_id(&self) -> String {
        self.id.clone()
    }
}

// ============================================================================
// PRINCIPALS
// ============================================================================

/// User acting as student 7
pub fn alice() -> Principal {
    Principal::new("user:alice").with_role("student", Principal::new("student:7"))
}

/// User acting as student 8
pub fn bob() -> Principal {
    Principal::new("user:bob").with_role("student", Principal::new("student:8"))
}

/// Teacher of the math course
pub fn carol() -> Principal {
    Principal::new("teacher:3")
}

/// Teacher without courses
pub fn dave() -> Principal {
    Principal::new("teacher:9")
}

pub fn root() -> Principal {
    Principal::new("user:root").with_capability("admin")
}

// ============================================================================
// RULES
// ============================================================================

pub fn load_school(definitions: &mut Definitions) -> Result<()> {
    definitions.resource(ALL_RESOURCES).relation(
        "administrator",
        Mode::System,
        RuleOptions::new().require_principal(false),
        |ctx| Ok(ctx.principal().is_some_and(|principal| principal.is("admin"))),
    )?;

    let course = definitions.resource("course");
    course.relation("student", Mode::System, RuleOptions::new().as_role("student"), |ctx| {
        Ok(ctx.subject().is_some())
    })?;
    course.relation("enrolled", Mode::Resource, RuleOptions::new().as_role("student"), |ctx| {
        let (Some(course), Some(student)) = (ctx.resource_as::<Course>(), ctx.subject()) else {
            return Ok(false);
        };
        Ok(course.students.iter().any(|id| id == student.local_id()))
    })?;
    course.relation("responsible", Mode::Resource, RuleOptions::new(), |ctx| {
        let (Some(course), Some(principal)) = (ctx.resource_as::<Course>(), ctx.principal()) else {
            return Ok(false);
        };
        Ok(principal.principal_type == "teacher" && course.teachers.iter().any(|id| id == principal.local_id()))
    })?;
    course.relation("at_level", Mode::Resource, RuleOptions::new(), |ctx| {
        let minimum = ctx.arg(0).and_then(ArgValue::as_int).unwrap_or(0);
        Ok(ctx.resource_as::<Course>().is_some_and(|course| course.level >= minimum))
    })?;
    course.right("index", "if student or administrator")?;
    course.right("show", "if enrolled or responsible or administrator")?;

    let assignment = definitions.resource("assignment");
    assignment.relation("open", Mode::Pretest, RuleOptions::new(), |ctx| {
        Ok(ctx.resource_as::<Assignment>().map_or(true, |assignment| assignment.open))
    })?;
    assignment.right("show", "if show: course")?;
    assignment.right("correct", "if responsible: course")?;
    assignment.right("advanced", "if course.at_level(course, 3)")?;
    assignment.right("submit", "if open and enrolled: course")?;

    let result = definitions.resource("assignment_result");
    result.relation("owner", Mode::Resource, RuleOptions::new().as_role("student"), |ctx| {
        let (Some(result), Some(student)) = (ctx.resource_as::<AssignmentResult>(), ctx.subject()) else {
            return Ok(false);
        };
        Ok(result.owner == student.local_id())
    })?;
    result.relation("broken", Mode::Resource, RuleOptions::new(), |ctx| {
        let divisor = ctx.args().len() as i64;
        Ok(100 / divisor > 1)
    })?;
    result.relation("failing", Mode::Resource, RuleOptions::new(), |_| {
        Err(anyhow!("grading service unavailable"))
    })?;
    result.right("edit", "if owner")?;
    result.right("grade", "if correct: assignment")?;
    result.right("linked", "if assignment.course")?;
    result.right("audit", "if broken")?;
    result.right("review", "unless failing")?;

    definitions.resource("student").right("view_profile", "if self or administrator")?;
    Ok(())
}

// ============================================================================
// SCHOOL
// ============================================================================

/// Registry plus a populated resolver
pub struct School {
    pub registry: PolicyRegistry,
    pub resolver: Arc<InMemoryResolver>,
    /// Course 1, student 7, teacher 3, level 4
    pub math: ResourceRef,
    /// Course 2, student 8, level 1
    pub physics: ResourceRef,
    /// Open assignment of math
    pub homework: ResourceRef,
    /// Closed assignment of physics
    pub lab: ResourceRef,
    /// Assignment without a course
    pub orphan: ResourceRef,
    /// Homework result of student 7
    pub alice_result: ResourceRef,
    /// Homework result of student 8
    pub bob_result: ResourceRef,
    /// Result of the orphan assignment, student 7
    pub orphan_result: ResourceRef,
}

impl School {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let registry = PolicyRegistry::build(load_school, config).expect("school rules load");

        let math = Arc::new(Course {
            id: "1".to_string(),
            students: vec!["7".to_string()],
            teachers: vec!["3".to_string()],
            level: 4,
        });
        let physics = Arc::new(Course {
            id: "2".to_string(),
            students: vec!["8".to_string()],
            teachers: Vec::new(),
            level: 1,
        });
        let homework = Arc::new(Assignment {
            id: "10".to_string(),
            course: Some(Arc::clone(&math)),
            open: true,
        });
        let lab = Arc::new(Assignment {
            id: "11".to_string(),
            course: Some(Arc::clone(&physics)),
            open: false,
        });
        let orphan = Arc::new(Assignment {
            id: "12".to_string(),
            course: None,
            open: true,
        });
        let result = |id: &str, assignment: &Arc<Assignment>, owner: &str| -> ResourceRef {
            Arc::new(AssignmentResult {
                id: id.to_string(),
                assignment: Arc::clone(assignment),
                owner: owner.to_string(),
            })
        };

        let school = Self {
            registry,
            resolver: Arc::new(InMemoryResolver::new()),
            alice_result: result("100", &homework, "7"),
            bob_result: result("101", &homework, "8"),
            orphan_result: result("102", &orphan, "7"),
            math,
            physics,
            homework,
            lab,
            orphan,
        };

        for object in [
            &school.math,
            &school.physics,
            &school.homework,
            &school.lab,
            &school.orphan,
            &school.alice_result,
            &school.bob_result,
            &school.orphan_result,
        ] {
            school.resolver.insert(Arc::clone(object));
        }
        school
    }

    pub fn context(&self, principal: Principal) -> SecurityContext {
        SecurityContext::with_principal(self.registry.snapshot(), self.resolver.clone(), principal)
    }

    pub fn anonymous(&self) -> SecurityContext {
        SecurityContext::new(self.registry.snapshot(), self.resolver.clone())
    }
}

impl Default for School {
    fn default() -> Self {
        Self::new()
    }
}

pub fn student(id: &str) -> ResourceRef {
    Arc::new(Student { id: id.to_string() })
}
