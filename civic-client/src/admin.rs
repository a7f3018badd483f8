//! Official console
//!
//! Triage views over all issues. Status changes are written first; local
//! state follows only once the gateway accepted them.

use shared::models::{Department, Issue, IssueStatus, IssueStatusPatch};
use shared::{RowId, Table};
use std::fmt;
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::feed::FilterCriteria;
use crate::gateway::{Gateway, Query, fetch};
use crate::routing::{self, ServiceDesk, SERVICE_DESKS};
use crate::types::SessionContext;

/// Official's view of every issue, grouped by department and service desk
///
/// Holds the snapshot from the last [`load`](AdminConsole::load); views read
/// it without touching the gateway.
pub struct AdminConsole {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
    issues: Vec<Issue>,
    departments: Vec<Department>,
}

impl fmt::Debug for AdminConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConsole")
            .field("session", &self.session)
            .field("issues", &self.issues.len())
            .field("departments", &self.departments.len())
            .finish()
    }
}

impl AdminConsole {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext) -> Self {
        Self {
            gateway,
            session,
            issues: Vec::new(),
            departments: Vec::new(),
        }
    }

    /// Fetch all issues (newest first) and departments (by name)
    pub async fn load(&mut self) -> ClientResult<()> {
        let issues = Query::new(Table::Issues).order_by("created_at", false);
        let departments = Query::new(Table::Departments).order_by("name", true);

        let (issues, departments) = futures::try_join!(
            fetch::<Issue>(self.gateway.as_ref(), &issues),
            fetch::<Department>(self.gateway.as_ref(), &departments),
        )?;

        tracing::info!(issues = issues.len(), departments = departments.len(), "Console loaded");
        self.issues = issues;
        self.departments = departments;
        Ok(())
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Departments worked from the department list (emergency services excluded)
    pub fn departments(&self) -> Vec<&Department> {
        self.departments
            .iter()
            .filter(|d| !routing::is_service_department(d))
            .collect()
    }

    /// Set the status of one issue.
    ///
    /// A rejected write leaves the local issue untouched.
    pub async fn update_status(&mut self, issue_id: &RowId, status: IssueStatus) -> ClientResult<()> {
        let user = self.session.require_user()?;
        if !self.issues.iter().any(|i| &i.id == issue_id) {
            return Err(ClientError::NotFound(format!("issue {issue_id}")));
        }

        let patch = serde_json::to_value(IssueStatusPatch { status })?;
        if let Err(e) = self.gateway.update(Table::Issues, issue_id, patch).await {
            tracing::error!(issue_id = %issue_id, error = %e, "Status update failed");
            return Err(e);
        }

        if let Some(issue) = self.issues.iter_mut().find(|i| &i.id == issue_id) {
            issue.status = status;
        }
        tracing::info!(issue_id = %issue_id, status = %status, official = %user.id, "Status updated");
        Ok(())
    }

    /// Issues routed to `department_id` matching `criteria`
    pub fn by_department(&self, department_id: &RowId, criteria: &FilterCriteria) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.department_id.as_ref() == Some(department_id) && criteria.matches(i))
            .collect()
    }

    /// Issues handled by `desk` matching `criteria`
    pub fn by_service_desk(&self, desk: &ServiceDesk, criteria: &FilterCriteria) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| desk.handles(i) && criteria.matches(i))
            .collect()
    }

    /// Issue count per listed department
    pub fn department_counts(&self) -> Vec<(&Department, usize)> {
        self.departments()
            .into_iter()
            .map(|d| (d, self.by_department(&d.id, &FilterCriteria::all()).len()))
            .collect()
    }

    /// Issue count per service desk
    pub fn desk_counts(&self) -> Vec<(ServiceDesk, usize)> {
        SERVICE_DESKS
            .into_iter()
            .map(|desk| (desk, self.by_service_desk(&desk, &FilterCriteria::all()).len()))
            .collect()
    }
}
