use serde::{Deserialize, Deserializer, Serialize};

/// Which analysis shape an issue gets, chosen from its Jira issue type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisKind {
    Bug,
    Epic,
    Issue,
}

impl AnalysisKind {
    pub fn for_issue_type(issue_type: &str) -> Self {
        match issue_type.trim().to_ascii_lowercase().as_str() {
            "bug" => AnalysisKind::Bug,
            "epic" => AnalysisKind::Epic,
            _ => AnalysisKind::Issue,
        }
    }

    /// Validates model output against the shape for this kind.
    pub fn parse(self, value: serde_json::Value) -> Result<Analysis, serde_json::Error> {
        Ok(match self {
            AnalysisKind::Bug => Analysis::Bug(serde_json::from_value(value)?),
            AnalysisKind::Epic => Analysis::Epic(serde_json::from_value(value)?),
            AnalysisKind::Issue => Analysis::Issue(serde_json::from_value(value)?),
        })
    }

    pub(crate) fn schema(self) -> serde_json::Value {
        let empty = match self {
            AnalysisKind::Bug => serde_json::to_value(BugAnalysis::default()),
            AnalysisKind::Epic => serde_json::to_value(EpicAnalysis::default()),
            AnalysisKind::Issue => serde_json::to_value(IssueAnalysis::default()),
        };
        empty.unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BugAnalysis {
    pub ticket_number: String,
    pub visibility: String,
    pub executive_summary: String,
    pub technical_summary: String,
    pub cause: String,
    pub fix: String,
    pub reasoning: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpicAnalysis {
    pub executive_summary: String,
    pub technical_summary: String,
    #[serde(rename = "inferredCategories")]
    pub inferred_categories: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "list_or_map")]
    pub child_issues: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueAnalysis {
    pub visibility: String,
    pub probability_ranking: i64,
    pub confidence_range: String,
    pub inferred_categories: Vec<String>,
    pub keywords: Vec<String>,
    pub environments: Vec<String>,
    pub reasoning: String,
}

/// Models sometimes return `child_issues` as `{"KEY-1": "summary"}`; that is
/// flattened to `["KEY-1: summary"]`.
fn list_or_map<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrMap {
        List(Vec<String>),
        Map(serde_json::Map<String, serde_json::Value>),
    }

    Ok(match ListOrMap::deserialize(deserializer)? {
        ListOrMap::List(items) => items,
        ListOrMap::Map(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}: {s}"),
                other => format!("{k}: {other}"),
            })
            .collect(),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    Bug(BugAnalysis),
    Epic(EpicAnalysis),
    Issue(IssueAnalysis),
}

fn present(s: &str) -> bool {
    !s.trim().is_empty()
}

impl Analysis {
    /// Whether the analysis says enough to be worth a wiki page.
    pub fn has_meaningful_content(&self) -> bool {
        match self {
            Analysis::Bug(a) => {
                present(&a.technical_summary) && (present(&a.cause) || present(&a.fix))
            }
            Analysis::Epic(a) => present(&a.technical_summary) || present(&a.executive_summary),
            Analysis::Issue(a) => present(&a.reasoning) && !a.inferred_categories.is_empty(),
        }
    }

    pub fn executive_summary(&self) -> &str {
        match self {
            Analysis::Bug(a) => &a.executive_summary,
            Analysis::Epic(a) => &a.executive_summary,
            Analysis::Issue(_) => "",
        }
    }

    pub fn technical_summary(&self) -> &str {
        match self {
            Analysis::Bug(a) => &a.technical_summary,
            Analysis::Epic(a) => &a.technical_summary,
            Analysis::Issue(a) => &a.reasoning,
        }
    }

    /// Labelled text sections in display order, skipping empty ones.
    pub fn sections(&self) -> Vec<(&'static str, String)> {
        let mut sections: Vec<(&'static str, String)> = match self {
            Analysis::Bug(a) => vec![
                ("Ticket Number", a.ticket_number.clone()),
                ("Executive Summary", a.executive_summary.clone()),
                ("Technical Summary", a.technical_summary.clone()),
                ("Cause", a.cause.clone()),
                ("Fix", a.fix.clone()),
                ("Visibility", a.visibility.clone()),
                ("Reasoning", a.reasoning.clone()),
            ],
            Analysis::Epic(a) => vec![
                ("Executive Summary", a.executive_summary.clone()),
                ("Technical Summary", a.technical_summary.clone()),
                ("Categories", a.inferred_categories.join(", ")),
                ("Keywords", a.keywords.join(", ")),
                ("Child Issues", a.child_issues.join(", ")),
            ],
            Analysis::Issue(a) => vec![
                ("Visibility", a.visibility.clone()),
                ("Categories", a.inferred_categories.join(", ")),
                ("Keywords", a.keywords.join(", ")),
                ("Environments", a.environments.join(", ")),
                ("Confidence", a.confidence_range.clone()),
                ("Reasoning", a.reasoning.clone()),
            ],
        };
        sections.retain(|(_, text)| present(text));
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_issue_type() {
        assert_eq!(AnalysisKind::for_issue_type("Bug"), AnalysisKind::Bug);
        assert_eq!(AnalysisKind::for_issue_type(" EPIC "), AnalysisKind::Epic);
        assert_eq!(AnalysisKind::for_issue_type("Story"), AnalysisKind::Issue);
        assert_eq!(AnalysisKind::for_issue_type(""), AnalysisKind::Issue);
    }

    #[test]
    fn test_epic_child_issues_map() {
        let analysis = AnalysisKind::Epic
            .parse(json!({
                "technical_summary": "Rework storage",
                "child_issues": {"IP-2": "Split table", "IP-3": "Migrate"}
            }))
            .unwrap();

        let Analysis::Epic(epic) = analysis else {
            panic!("expected epic analysis");
        };
        assert_eq!(epic.child_issues, vec!["IP-2: Split table", "IP-3: Migrate"]);
        assert!(epic.keywords.is_empty());
    }

    #[test]
    fn test_meaningful_content() {
        let bug = AnalysisKind::Bug
            .parse(json!({"technical_summary": "Null deref", "fix": "Guard"}))
            .unwrap();
        assert!(bug.has_meaningful_content());

        let bug = AnalysisKind::Bug
            .parse(json!({"technical_summary": "Null deref", "cause": "  "}))
            .unwrap();
        assert!(!bug.has_meaningful_content());

        let issue = AnalysisKind::Issue
            .parse(json!({"reasoning": "Visible to users", "inferredCategories": []}))
            .unwrap();
        assert!(!issue.has_meaningful_content());

        let issue = AnalysisKind::Issue
            .parse(json!({"reasoning": "Visible to users", "inferredCategories": ["UI"]}))
            .unwrap();
        assert!(issue.has_meaningful_content());
    }

    #[test]
    fn test_schema_field_names() {
        let schema = AnalysisKind::Issue.schema();
        assert!(schema.get("inferredCategories").is_some());
        assert!(schema.get("probabilityRanking").is_some());

        let schema = AnalysisKind::Bug.schema();
        assert!(schema.get("technical_summary").is_some());
    }
}
