use crate::config::MAX_RESULTS_LIMIT;

pub const ISSUE_TYPES: &[&str] = &["Bug", "Issue", "Epic", "Comp"];

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[A-Za-z0-9_]+`
pub fn is_project_key(s: &str) -> bool {
    is_word(s)
}

/// `[A-Za-z0-9_]+-[0-9]+`
pub fn is_issue_key(s: &str) -> bool {
    match s.rsplit_once('-') {
        Some((project, number)) => {
            is_word(project) && !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

pub fn check_issue_key(key: &str) -> Result<(), String> {
    if is_issue_key(key) {
        Ok(())
    } else {
        Err(format!(
            "Invalid issue key format: {key}. Expected format like PROJECT-123"
        ))
    }
}

pub fn check_max_results(max_results: i64) -> Result<u32, String> {
    match u32::try_from(max_results) {
        Ok(n) if (1..=MAX_RESULTS_LIMIT).contains(&n) => Ok(n),
        _ => Err(format!(
            "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
        )),
    }
}

/// Validates the path parameters of the fix-version route, collecting every
/// problem instead of stopping at the first.
pub fn check_release_params(project: &str, fix_version: &str, issue_type: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_project_key(project) {
        errors.push("Invalid project key format".to_string());
    }
    if fix_version.trim().is_empty() {
        errors.push("Fix version cannot be empty".to_string());
    }
    if !ISSUE_TYPES.contains(&issue_type) {
        errors.push(format!(
            "Issue type must be one of: {}",
            ISSUE_TYPES.join(", ")
        ));
    }
    errors
}

fn quote_jql(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn release_jql(project: &str, fix_version: &str, issue_type: &str) -> String {
    format!(
        "project = {} AND fixversion = {} AND issuetype = {}",
        project,
        quote_jql(fix_version),
        issue_type
    )
}

pub fn with_issue_type(jql: &str, issue_type: Option<&str>) -> String {
    match issue_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => format!("({jql}) AND issuetype = {}", quote_jql(t)),
        None => jql.to_string(),
    }
}

pub fn keys_jql(keys: &[String]) -> String {
    format!("key in ({})", keys.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_keys() {
        assert!(is_issue_key("IP-51180"));
        assert!(is_issue_key("my_proj2-1"));
        assert!(!is_issue_key("IP-"));
        assert!(!is_issue_key("-12"));
        assert!(!is_issue_key("IP12"));
        assert!(!is_issue_key("IP-12a"));
        assert!(!is_issue_key("I P-12"));
        assert!(!is_issue_key("IP-1-2"));
        assert!(check_issue_key("bad").unwrap_err().contains("PROJECT-123"));
    }

    #[test]
    fn test_project_keys() {
        assert!(is_project_key("IP"));
        assert!(is_project_key("ip_2"));
        assert!(!is_project_key(""));
        assert!(!is_project_key("IP-1"));
        assert!(!is_project_key("I P"));
    }

    #[test]
    fn test_max_results() {
        assert_eq!(check_max_results(1), Ok(1));
        assert_eq!(check_max_results(1000), Ok(1000));
        assert!(check_max_results(0).is_err());
        assert!(check_max_results(-5).is_err());
        assert!(check_max_results(1001).is_err());
    }

    #[test]
    fn test_release_params() {
        assert!(check_release_params("IP", "2.0", "Bug").is_empty());
        let errors = check_release_params("I-P", " ", "Story");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2], "Issue type must be one of: Bug, Issue, Epic, Comp");
    }

    #[test]
    fn test_jql() {
        assert_eq!(
            release_jql("IP", "Release 2.0", "Bug"),
            "project = IP AND fixversion = \"Release 2.0\" AND issuetype = Bug"
        );
        assert_eq!(
            with_issue_type("project = IP", Some("Epic")),
            "(project = IP) AND issuetype = \"Epic\""
        );
        assert_eq!(with_issue_type("project = IP", Some(" ")), "project = IP");
        assert_eq!(
            keys_jql(&["IP-1".into(), "IP-2".into()]),
            "key in (IP-1,IP-2)"
        );
    }
}
