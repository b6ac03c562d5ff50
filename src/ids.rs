use uuid::Uuid;

/// Pulls a database id out of a Notion URL, a bare 32-char id or a
/// hyphenated UUID, and returns it in hyphenated form.
pub fn parse_database_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if let Ok(id) = Uuid::parse_str(trimmed) {
        return Some(id.hyphenated().to_string());
    }

    let path = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    path.rsplit('/').find_map(|segment| {
        // Page links look like `Title-Words-<32 hex>`.
        let tail = segment.rsplit('-').next().unwrap_or(segment);
        let candidate = if tail.len() == 32 {
            tail
        } else {
            segment
                .len()
                .checked_sub(32)
                .and_then(|start| segment.get(start..))
                .unwrap_or(segment)
        };
        Uuid::parse_str(candidate)
            .or_else(|_| Uuid::parse_str(segment))
            .ok()
            .map(|id| id.hyphenated().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYPHENATED: &str = "373f0ed0-4d5b-4e8a-9e90-9bc8d7b5a16a";

    #[test]
    fn accepts_hyphenated_and_simple_ids() {
        assert_eq!(parse_database_id(HYPHENATED).as_deref(), Some(HYPHENATED));
        assert_eq!(
            parse_database_id("373f0ed04d5b4e8a9e909bc8d7b5a16a").as_deref(),
            Some(HYPHENATED)
        );
    }

    #[test]
    fn extracts_from_workspace_url() {
        let url = "https://www.notion.so/easyflow/373f0ed04d5b4e8a9e909bc8d7b5a16a?v=0123456789abcdef0123456789abcdef";
        assert_eq!(parse_database_id(url).as_deref(), Some(HYPHENATED));
    }

    #[test]
    fn extracts_from_titled_url() {
        let url = "https://www.notion.so/EasyFlow-Daily-Metrics-373f0ed04d5b4e8a9e909bc8d7b5a16a";
        assert_eq!(parse_database_id(url).as_deref(), Some(HYPHENATED));
    }

    #[test]
    fn extracts_hyphenated_segment() {
        let url = format!("https://www.notion.so/{HYPHENATED}");
        assert_eq!(parse_database_id(&url).as_deref(), Some(HYPHENATED));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_database_id("https://www.notion.so/my-integrations"), None);
        assert_eq!(parse_database_id(""), None);
    }
}
