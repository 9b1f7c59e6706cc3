use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Active,
    Inactive,
    Graduated,
}

impl SectionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Graduated => "graduated",
        }
    }
}

impl Serialize for SectionStatus {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.as_str())
    }
}

/// Subjects and curriculums share the two-state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl Serialize for RecordStatus {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub grade_level: i64,
    pub strand: String,
    pub section_number: i64,
    pub status: SectionStatus,
    pub curriculum_id: Option<String>,
    pub created_at: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub lrn: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub teacher_id: Option<String>,
    pub room_number: Option<String>,
    pub status: RecordStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub id: String,
    pub grade_level: i64,
    pub strand: String,
    pub status: RecordStatus,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub key: String,
    pub section_id: String,
    pub subject_id: String,
    pub grade_level: i64,
    pub strand: String,
    pub section_number: i64,
    pub status: SectionStatus,
    pub subject_name: String,
    pub teacher: Option<String>,
    pub room_number: Option<String>,
    pub student_count: i64,
    pub schedule: Option<serde_json::Value>,
    pub attendance: Option<serde_json::Value>,
    pub assignments: Option<serde_json::Value>,
    pub created_at: String,
    pub last_updated: String,
}

/// Composite identifier for a derived class record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    pub section_id: String,
    pub subject_code: String,
}

impl ClassKey {
    pub fn new(section_id: &str, subject_code: &str) -> Self {
        Self {
            section_id: section_id.to_string(),
            subject_code: subject_code.to_string(),
        }
    }

    pub fn as_key(&self) -> String {
        format!("{}_{}", self.section_id, self.subject_code)
    }

    // Section ids are UUIDs (no underscore), so the first underscore is
    // always the separator; subject codes may contain underscores.
    pub fn parse(key: &str) -> Option<Self> {
        let (section_id, subject_code) = key.split_once('_')?;
        if section_id.is_empty() || subject_code.is_empty() {
            return None;
        }
        Some(Self::new(section_id, subject_code))
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_status_round_trips() {
        for s in ["active", "inactive", "graduated"] {
            assert_eq!(SectionStatus::parse(s).map(|v| v.as_str()), Some(s));
        }
        assert!(SectionStatus::parse("deleted").is_none());
        assert!(SectionStatus::parse("Active").is_none());
    }

    #[test]
    fn class_key_splits_on_first_underscore() {
        let key = ClassKey::new("6f9a2f47-1c", "CS_ELECT_1");
        assert_eq!(key.as_key(), "6f9a2f47-1c_CS_ELECT_1");
        let parsed = ClassKey::parse("6f9a2f47-1c_CS_ELECT_1").expect("parse");
        assert_eq!(parsed.section_id, "6f9a2f47-1c");
        assert_eq!(parsed.subject_code, "CS_ELECT_1");
    }

    #[test]
    fn class_key_rejects_degenerate_forms() {
        assert!(ClassKey::parse("no-separator").is_none());
        assert!(ClassKey::parse("_MATH101").is_none());
        assert!(ClassKey::parse("abc_").is_none());
    }
}
