//! Screenshot reconciliation: compare the name list an external parser
//! pulled out of a run screenshot against the members actually sitting in
//! the raid voice channel.

use crate::ports::ScreenshotParser;

/// One voice-channel member with every name they could plausibly appear
/// under in a screenshot (account name, nick, alternates).
#[derive(Debug, Clone)]
pub struct VcMember {
    pub id: u64,
    pub aliases: Vec<String>,
}

/// Outcome of one comparison. `valid` is false whenever the parser failed,
/// so a broken parser can never read as a clean run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// In the channel but nowhere in the screenshot.
    pub in_vc_unparsed: Vec<u64>,
    /// Parsed from the screenshot but not in the channel.
    pub parsed_not_in_vc: Vec<String>,
    pub valid: bool,
}

impl Reconciliation {
    fn invalid() -> Self {
        Self { in_vc_unparsed: Vec::new(), parsed_not_in_vc: Vec::new(), valid: false }
    }
}

/// Case-insensitive alias matching in both directions. A member matches if
/// any alias equals any parsed name; a parsed name matches if any member
/// carries it.
pub fn reconcile(members: &[VcMember], parsed: &[String]) -> Reconciliation {
    let parsed_lower: Vec<String> = parsed.iter().map(|p| p.to_lowercase()).collect();

    let in_vc_unparsed = members
        .iter()
        .filter(|m| {
            !m.aliases
                .iter()
                .any(|a| parsed_lower.iter().any(|p| p == &a.to_lowercase()))
        })
        .map(|m| m.id)
        .collect();

    let parsed_not_in_vc = parsed
        .iter()
        .filter(|p| {
            let pl = p.to_lowercase();
            !members
                .iter()
                .any(|m| m.aliases.iter().any(|a| a.to_lowercase() == pl))
        })
        .cloned()
        .collect();

    Reconciliation { in_vc_unparsed, parsed_not_in_vc, valid: true }
}

/// Runs the parser and reconciles. `None` or an empty name list from the
/// parser is a parse failure, never a report of zero mismatches.
pub async fn reconcile_with_parser(
    parser: &dyn ScreenshotParser,
    image_url: &str,
    members: &[VcMember],
) -> Reconciliation {
    match parser.parse(image_url).await {
        Some(names) if !names.is_empty() => reconcile(members, &names),
        _ => Reconciliation::invalid(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn member(id: u64, aliases: &[&str]) -> VcMember {
        VcMember { id, aliases: aliases.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn matching_is_case_insensitive_across_aliases() {
        let members = vec![member(1, &["MainName", "AltName"]), member(2, &["Solo"])];
        let parsed = vec!["altname".to_string(), "SOLO".to_string(), "Ghost".to_string()];
        let r = reconcile(&members, &parsed);
        assert!(r.valid);
        assert!(r.in_vc_unparsed.is_empty());
        assert_eq!(r.parsed_not_in_vc, vec!["Ghost".to_string()]);
    }

    #[test]
    fn members_missing_from_screenshot_are_reported() {
        let members = vec![member(1, &["Ana"]), member(2, &["Bo"])];
        let parsed = vec!["ana".to_string()];
        let r = reconcile(&members, &parsed);
        assert_eq!(r.in_vc_unparsed, vec![2]);
        assert!(r.parsed_not_in_vc.is_empty());
        assert!(r.valid);
    }

    struct FixedParser(Option<Vec<String>>);

    #[async_trait]
    impl ScreenshotParser for FixedParser {
        async fn parse(&self, _url: &str) -> Option<Vec<String>> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn parser_failure_is_never_a_clean_run() {
        let members = vec![member(1, &["Ana"])];
        let r = reconcile_with_parser(&FixedParser(None), "u", &members).await;
        assert!(!r.valid);
        assert!(r.in_vc_unparsed.is_empty());

        let r = reconcile_with_parser(&FixedParser(Some(Vec::new())), "u", &members).await;
        assert!(!r.valid);
    }

    #[tokio::test]
    async fn parser_success_reconciles() {
        let members = vec![member(1, &["Ana"]), member(2, &["Bo"])];
        let parser = FixedParser(Some(vec!["ana".into(), "Cy".into()]));
        let r = reconcile_with_parser(&parser, "u", &members).await;
        assert!(r.valid);
        assert_eq!(r.in_vc_unparsed, vec![2]);
        assert_eq!(r.parsed_not_in_vc, vec!["Cy".to_string()]);
    }
}
