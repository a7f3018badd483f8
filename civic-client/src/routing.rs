//! Category routing
//!
//! Maps classifier categories to the department that handles them, the
//! dispatch alerts raised for the most severe reports and the emergency
//! service desks officials work from.

use shared::models::{Category, Department, Issue, Severity};
use std::fmt;

/// Department name handling `category`, `None` for unknown
pub fn department_name(category: Category) -> Option<&'static str> {
    match category {
        Category::Water => Some("Water Management"),
        Category::Roads => Some("Road maintainance service"),
        Category::Nature => Some("Nature Management"),
        Category::Electricity => Some("Electrical Department"),
        Category::Sanitation => Some("Sanitation & Waste Management"),
        Category::Accident => Some("Ambulance"),
        Category::Fire => Some("Fire brigade"),
        Category::Traffic => Some("Traffic Police"),
        Category::Unknown => None,
    }
}

/// Department for `category` among `departments`.
///
/// Stored names may carry stray whitespace.
pub fn route<'a>(category: Category, departments: &'a [Department]) -> Option<&'a Department> {
    let name = department_name(category)?;
    departments.iter().find(|d| d.matches_name(name))
}

// ============================================================================
// Dispatch alerts
// ============================================================================

/// Emergency service alerted on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAlert {
    Ambulance,
    FireBrigade,
    TrafficPolice,
}

impl DispatchAlert {
    /// Alert raised for a freshly classified report, if any
    pub fn for_report(severity: Severity, category: Category) -> Option<Self> {
        match (severity, category) {
            (Severity::Emergency, Category::Accident) => Some(Self::Ambulance),
            (Severity::Emergency, Category::Fire) => Some(Self::FireBrigade),
            (Severity::Urgent, Category::Traffic) => Some(Self::TrafficPolice),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Ambulance => "Emergency! Ambulance has been dispatched.",
            Self::FireBrigade => "Alert! Fire brigade is on the way.",
            Self::TrafficPolice => "Urgent! Traffic police notified.",
        }
    }
}

impl fmt::Display for DispatchAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

// ============================================================================
// Service desks
// ============================================================================

/// Emergency service working the issues of one category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDesk {
    pub name: &'static str,
    pub category: Category,
}

impl ServiceDesk {
    pub fn handles(&self, issue: &Issue) -> bool {
        issue.category == self.category
    }
}

pub const SERVICE_DESKS: [ServiceDesk; 3] = [
    ServiceDesk {
        name: "Ambulance",
        category: Category::Accident,
    },
    ServiceDesk {
        name: "Fire Brigade",
        category: Category::Fire,
    },
    ServiceDesk {
        name: "Traffic Police",
        category: Category::Traffic,
    },
];

/// Service desk by name, case-insensitive
pub fn service_desk(name: &str) -> Option<ServiceDesk> {
    SERVICE_DESKS
        .into_iter()
        .find(|d| d.name.eq_ignore_ascii_case(name.trim()))
}

/// Whether `department` is one of the emergency services, which officials
/// work from the service desks rather than the department list
pub fn is_service_department(department: &Department) -> bool {
    SERVICE_DESKS
        .iter()
        .filter_map(|desk| department_name(desk.category))
        .any(|name| department.matches_name(name))
}
