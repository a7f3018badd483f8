//! Citizen report submission
//!
//! Submission runs strictly in order and stops at the first failure:
//! 1. session user, pinned location and non-blank text
//! 2. optional image upload
//! 3. classification (failure aborts; nothing is written)
//! 4. department routing
//! 5. insert with status `Pending`

use chrono::Utc;
use serde_json::json;
use shared::models::{Department, Issue, IssueStatus, NearbyIssue, NewIssue};
use shared::{GeoPoint, Table};
use std::path::Path;
use std::sync::Arc;

use crate::classifier::{Classification, Classifier};
use crate::error::{ClientError, ClientResult};
use crate::gateway::{Gateway, Query, create, fetch};
use crate::routing::{self, DispatchAlert};
use crate::types::SessionContext;

/// Storage bucket for report photos
pub const IMAGE_BUCKET: &str = "issue-images";

/// Photo attached to a report
#[derive(Debug, Clone)]
pub struct ReportImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Report as filled in by the citizen
#[derive(Debug, Clone, Default)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub image: Option<ReportImage>,
}

impl ReportDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_image(mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.image = Some(ReportImage {
            file_name: file_name.into(),
            bytes,
        });
        self
    }

    /// Text sent to the classifier
    pub fn classifier_text(&self) -> String {
        format!("Issue Title: {}.", self.title.trim())
    }
}

/// Outcome of a successful submission
#[derive(Debug, Clone)]
pub struct SubmittedReport {
    pub issue: Issue,
    pub classification: Classification,
    pub department: Department,
    pub alert: Option<DispatchAlert>,
}

/// Submits reports for one session
#[derive(Clone)]
pub struct IssueReporter {
    gateway: Arc<dyn Gateway>,
    classifier: Arc<dyn Classifier>,
    session: SessionContext,
}

impl IssueReporter {
    pub fn new(gateway: Arc<dyn Gateway>, classifier: Arc<dyn Classifier>, session: SessionContext) -> Self {
        Self {
            gateway,
            classifier,
            session,
        }
    }

    /// All departments by name
    pub async fn departments(&self) -> ClientResult<Vec<Department>> {
        let query = Query::new(Table::Departments).order_by("name", true);
        fetch(self.gateway.as_ref(), &query).await
    }

    /// Closest existing issue near `point`, as a duplicate hint
    pub async fn check_nearby(&self, point: GeoPoint) -> ClientResult<Option<NearbyIssue>> {
        let args = json!({ "lat_query": point.lat, "lng_query": point.lng });
        let rows = self.gateway.remote_call("find_nearby_issues", args).await?;
        let nearby: Vec<NearbyIssue> =
            serde_json::from_value(rows).map_err(|e| ClientError::call("find_nearby_issues", e))?;

        if let Some(first) = nearby.first() {
            tracing::info!(issue_id = %first.id, "Similar issue reported nearby");
        }
        Ok(nearby.into_iter().next())
    }

    pub async fn submit(&self, draft: ReportDraft) -> ClientResult<SubmittedReport> {
        let user = self.session.require_user()?;
        let location = draft
            .location
            .ok_or_else(|| ClientError::Validation("pin the location on the map".into()))?;
        if draft.title.trim().is_empty() {
            return Err(ClientError::Validation("title is required".into()));
        }
        if draft.description.trim().is_empty() {
            return Err(ClientError::Validation("description is required".into()));
        }

        let image_url = match &draft.image {
            Some(image) => {
                let path = image_path(&user.id, &image.file_name);
                Some(self.gateway.upload(IMAGE_BUCKET, &path, image.bytes.clone()).await?)
            }
            None => None,
        };

        let classification = match self
            .classifier
            .classify(&draft.classifier_text(), image_url.as_deref())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Classification failed, report not submitted");
                return Err(e);
            }
        };
        let alert = DispatchAlert::for_report(classification.severity, classification.category);

        let departments = self.departments().await?;
        let department = routing::route(classification.category, &departments)
            .cloned()
            .ok_or_else(|| {
                ClientError::NotFound(format!("department for category \"{}\"", classification.category))
            })?;

        let row = NewIssue {
            title: draft.title,
            description: draft.description,
            status: IssueStatus::Pending,
            category: classification.category,
            severity: classification.severity,
            location: Some(location.to_string()),
            department_id: Some(department.id.clone()),
            user_id: user.id.clone(),
            user_full_name: user.display_name().to_string(),
            user_avatar_url: user.user_metadata.avatar_url.clone(),
            image_url,
        };
        let issue: Issue = create(self.gateway.as_ref(), Table::Issues, &row).await?;

        tracing::info!(
            issue_id = %issue.id,
            severity = %issue.severity,
            category = %issue.category,
            department = %department.name.trim(),
            "Issue submitted"
        );
        Ok(SubmittedReport {
            issue,
            classification,
            department,
            alert,
        })
    }
}

/// `{user}-{millis}.{ext}`
fn image_path(user_id: &str, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    format!("{}-{}.{}", user_id, Utc::now().timestamp_millis(), ext)
}
