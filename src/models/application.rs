use serde::{Deserialize, Serialize};
use std::fmt;

/// `{status, message}` envelope returned by the user and application endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl ApiStatus {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub dorm_name: String,
    pub applicant_name: String,
    pub application_date: String,
    pub application_status: String,
}

/// Response of `viewRoomApplicationHistory/{dorm}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationHistory {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Application>>,
}

impl ApplicationHistory {
    /// Applications on record, empty unless the request succeeded.
    pub fn applications(&self) -> &[Application] {
        match (&self.data, self.status.as_str()) {
            (Some(data), "success") => data,
            _ => &[],
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dorm Name: {}", self.dorm_name)?;
        writeln!(f, "Applicant Name: {}", self.applicant_name)?;
        writeln!(f, "Application Date: {}", self.application_date)?;
        writeln!(f, "Application Status: {}", self.application_status)?;
        writeln!(f, "----------------------------------------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success() {
        let ok: ApiStatus =
            serde_json::from_str(r#"{"status": "success", "message": "Welcome"}"#).unwrap();
        let failed: ApiStatus = serde_json::from_str(r#"{"status": "error"}"#).unwrap();

        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert_eq!(failed.message, "");
    }

    #[test]
    fn test_history_only_lists_successful_data() {
        let json = r#"{
            "status": "success",
            "data": [{
                "dorm_name": "Lenton House",
                "applicant_name": "Sam",
                "application_date": "2025-01-02",
                "application_status": "pending"
            }]
        }"#;
        let history: ApplicationHistory = serde_json::from_str(json).unwrap();
        assert_eq!(history.applications().len(), 1);

        let empty: ApplicationHistory =
            serde_json::from_str(r#"{"status": "error", "message": "No such dorm"}"#).unwrap();
        assert!(empty.applications().is_empty());
    }

    #[test]
    fn test_application_display() {
        let application = Application {
            dorm_name: "Lenton House".to_string(),
            applicant_name: "Sam".to_string(),
            application_date: "2025-01-02".to_string(),
            application_status: "cancelled".to_string(),
        };

        let text = application.to_string();
        assert!(text.starts_with("Dorm Name: Lenton House\nApplicant Name: Sam\n"));
        assert!(text.contains("Application Status: cancelled\n"));
    }
}
