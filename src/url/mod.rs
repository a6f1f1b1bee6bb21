use crate::error::{Error, Result};

/// Identifiers parsed from a Jira board URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraUrlInfo {
    pub project_key: Option<String>,
    pub board_id: u64,
    pub sprint_id: Option<u64>,
}

/// Parse a Jira board URL into its component identifiers.
///
/// Supported URL patterns:
/// - `https://<site>/jira/software/projects/<KEY>/boards/<id>[?sprint=<id>]`
/// - `https://<site>/jira/software/c/projects/<KEY>/boards/<id>[/backlog]`
/// - `https://<site>/secure/RapidBoard.jspa?rapidView=<id>[&sprint=<id>]`
pub fn parse_jira_url(input: &str) -> Result<JiraUrlInfo> {
    let url = url::Url::parse(input).map_err(|e| Error::UrlParse(e.to_string()))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let query = |name: &str| -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    let sprint_id = match query("sprint") {
        Some(raw) => Some(parse_id(&raw, input)?),
        None => None,
    };

    if segments.last().copied() == Some("RapidBoard.jspa") {
        let raw = query("rapidView")
            .ok_or_else(|| Error::UrlParse(format!("missing rapidView in URL: {input}")))?;
        return Ok(JiraUrlInfo {
            project_key: None,
            board_id: parse_id(&raw, input)?,
            sprint_id,
        });
    }

    // .../projects/<KEY>/boards/<id>/...
    let projects_at = segments
        .iter()
        .position(|s| *s == "projects")
        .ok_or_else(|| Error::UrlParse(format!("unexpected URL format: {input}")))?;
    let project_key = segments
        .get(projects_at + 1)
        .ok_or_else(|| Error::UrlParse(format!("missing project key in URL: {input}")))?;
    if segments.get(projects_at + 2).copied() != Some("boards") {
        return Err(Error::UrlParse(format!("missing board in URL: {input}")));
    }
    let board = segments
        .get(projects_at + 3)
        .ok_or_else(|| Error::UrlParse(format!("missing board id in URL: {input}")))?;

    Ok(JiraUrlInfo {
        project_key: Some(project_key.to_string()),
        board_id: parse_id(board, input)?,
        sprint_id,
    })
}

fn parse_id(raw: &str, input: &str) -> Result<u64> {
    if !is_numeric_id(raw) {
        return Err(Error::UrlParse(format!("expected numeric id, got '{raw}' in URL: {input}")));
    }
    raw.parse()
        .map_err(|_| Error::UrlParse(format!("id out of range in URL: {input}")))
}

/// Check if a string looks like a Jira numeric id (all digits).
pub fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn raw_id(input: &str) -> Result<Option<u64>> {
    let input = input.trim();
    if !is_numeric_id(input) {
        return Ok(None);
    }
    input
        .parse()
        .map(Some)
        .map_err(|_| Error::InvalidIdentifier(input.to_string()))
}

/// Board id from a raw id or a Jira board URL.
pub fn resolve_board_id(input: &str) -> Result<u64> {
    if let Some(id) = raw_id(input)? {
        return Ok(id);
    }
    if input.contains("://") {
        return parse_jira_url(input.trim()).map(|info| info.board_id);
    }
    Err(Error::InvalidIdentifier(format!(
        "expected a board id or board URL, got '{input}'"
    )))
}

/// Sprint id from a raw id or a Jira board URL carrying `sprint=<id>`.
pub fn resolve_sprint_id(input: &str) -> Result<u64> {
    if let Some(id) = raw_id(input)? {
        return Ok(id);
    }
    if input.contains("://") {
        return parse_jira_url(input.trim())?.sprint_id.ok_or_else(|| {
            Error::InvalidIdentifier(format!("URL has no sprint parameter: {input}"))
        });
    }
    Err(Error::InvalidIdentifier(format!(
        "expected a sprint id or board URL, got '{input}'"
    )))
}
