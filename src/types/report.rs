use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::fmt;

/// Review state of a report; the backend uses the Spanish labels on the wire
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ReportStatus {
    #[default]
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Aprobado")]
    Approved,
    #[serde(rename = "Rechazado")]
    Rejected,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::Approved => write!(f, "approved"),
            ReportStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Inspection report as returned by `GET /api/reports`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Report {
    pub id: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub measurements: Option<String>,
    pub risk_level: Option<String>,
    #[serde(default)]
    pub status: ReportStatus,
    pub inspector_name: Option<String>,
    pub assigned_supervisor: Option<String>,
    pub recommendations: Option<String>,
    pub comments: Option<String>,
    pub evaluation: Option<String>,
    pub has_crack: Option<bool>,
    pub created_at: Option<String>,
    pub image_path_1: Option<String>,
    pub image_path_2: Option<String>,
    pub image_path_3: Option<String>,
}

impl Report {
    pub fn image_paths(&self) -> impl Iterator<Item = &str> {
        [&self.image_path_1, &self.image_path_2, &self.image_path_3]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }
}

/// Report submitted by an inspector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Validate)]
pub struct NewReport {
    #[validate(min_length = 1)]
    pub location: String,
    #[validate(min_length = 1)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Partial update sent with `PUT /api/reports/{id}`
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ReportUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
    /// `Some(None)` clears the recommendations on the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_crack: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeImagesRequest {
    pub image_urls: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageAnalysis {
    pub evaluation: String,
    pub has_crack: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_status_uses_backend_labels() {
        let report: Report = serde_json::from_value(json!({
            "id": "r-1",
            "status": "Aprobado",
            "image_path_2": "/uploads/r-1-2.jpg"
        }))
        .expect("report should parse");

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.image_paths().collect::<Vec<_>>(), ["/uploads/r-1-2.jpg"]);
    }

    #[test]
    fn review_with_empty_recommendations_sends_null() {
        let update = ReportUpdate {
            status: Some(ReportStatus::Rejected),
            recommendations: Some(None),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"status": "Rechazado", "recommendations": null})
        );
    }

    #[test]
    fn new_report_requires_location() {
        let report = NewReport {
            description: "crack in beam".to_string(),
            ..Default::default()
        };
        assert!(report.validate().is_err());
    }
}
