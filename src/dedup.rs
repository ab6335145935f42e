//! Duplicate resolver.
//!
//! Multiple files often represent the same logical document — a native
//! doc plus a PDF export, or a re-uploaded "Report v2". This stage
//! groups filtered items by normalized display name and keeps exactly
//! one winner per group: best format first, newest modification time on
//! a format tie. Pure and order-independent apart from that documented
//! tie-break.

use std::collections::HashMap;

use crate::models::SourceItem;

/// Extensions stripped during name normalization. Matches the formats
/// the snapshot can tag.
const KNOWN_EXTENSIONS: &[&str] = &[
    "gdoc", "gslides", "gsheet", "docx", "pptx", "xlsx", "pdf", "md", "markdown", "txt",
];

/// A skipped duplicate, kept for the run report.
#[derive(Debug, Clone)]
pub struct SkippedDuplicate {
    pub item: SourceItem,
    pub winner_name: String,
}

/// Normalize a display name into a logical-document key: strip known
/// extension suffixes, strip copy/version-number suffixes, collapse
/// separators and whitespace, lower-case.
pub fn normalize_name(name: &str) -> String {
    let mut s = name.to_lowercase();

    if let Some((stem, ext)) = s.rsplit_once('.') {
        if KNOWN_EXTENSIONS.contains(&ext) {
            s = stem.to_string();
        }
    }

    // Separators become spaces so "q3_report" and "q3-report" collide.
    let s: String = s
        .chars()
        .map(|c| if c == '_' || c == '-' || c == '.' { ' ' } else { c })
        .collect();

    let mut words: Vec<&str> = s.split_whitespace().collect();

    // Trailing copy/version markers: "(2)", "copy", "v3", "version 3"
    loop {
        let Some(&last) = words.last() else { break };
        let is_marker = is_paren_number(last)
            || last == "copy"
            || is_version_token(last)
            || (last.chars().all(|c| c.is_ascii_digit())
                && words.len() >= 2
                && words[words.len() - 2] == "version");
        if !is_marker {
            break;
        }
        if last.chars().all(|c| c.is_ascii_digit()) {
            words.pop(); // the number
            words.pop(); // "version"
        } else {
            words.pop();
        }
    }

    words.join(" ")
}

fn is_paren_number(token: &str) -> bool {
    token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .map(|inner| !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_version_token(token: &str) -> bool {
    token
        .strip_prefix('v')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Collapse duplicate-name groups down to their winners.
pub fn resolve_duplicates(items: Vec<SourceItem>) -> (Vec<SourceItem>, Vec<SkippedDuplicate>) {
    let mut groups: HashMap<String, Vec<SourceItem>> = HashMap::new();
    for item in items {
        groups.entry(normalize_name(&item.name)).or_default().push(item);
    }

    let mut winners = Vec::with_capacity(groups.len());
    let mut skipped = Vec::new();

    for (_, mut group) in groups {
        if group.len() == 1 {
            winners.push(group.pop().unwrap());
            continue;
        }

        // Format priority first; newest modification wins a format tie.
        group.sort_by(|a, b| {
            a.format
                .priority()
                .cmp(&b.format.priority())
                .then(b.modified_at.cmp(&a.modified_at))
        });

        let mut drain = group.into_iter();
        let winner = drain.next().unwrap();
        for loser in drain {
            skipped.push(SkippedDuplicate {
                item: loser,
                winner_name: winner.name.clone(),
            });
        }
        winners.push(winner);
    }

    (winners, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatTag;
    use chrono::{Duration, Utc};

    fn item(name: &str, format: FormatTag, age_days: i64) -> SourceItem {
        SourceItem {
            id: Some(name.to_string()),
            name: name.to_string(),
            format,
            folder_path: String::new(),
            modified_at: Utc::now() - Duration::days(age_days),
            created_at: Utc::now() - Duration::days(age_days),
            size_bytes: Some(1),
            content_version: None,
            content_digest: None,
            web_link: None,
        }
    }

    #[test]
    fn normalization_strips_extension_and_markers() {
        assert_eq!(normalize_name("Q3 Report.pdf"), "q3 report");
        assert_eq!(normalize_name("Q3_Report (2).docx"), "q3 report");
        assert_eq!(normalize_name("q3-report v2"), "q3 report");
        assert_eq!(normalize_name("Q3 Report version 3"), "q3 report");
        assert_eq!(normalize_name("Q3   Report copy"), "q3 report");
    }

    #[test]
    fn unknown_extension_is_kept_as_title_text() {
        assert_eq!(normalize_name("release.notes"), "release notes");
    }

    #[test]
    fn native_format_wins_regardless_of_input_order() {
        let expected_winner = FormatTag::NativeSlides;
        let variants = [
            vec![
                item("Report.pdf", FormatTag::Pdf, 0),
                item("Report.pptx", FormatTag::SlideDeck, 0),
                item("Report", FormatTag::NativeSlides, 5),
            ],
            vec![
                item("Report", FormatTag::NativeSlides, 5),
                item("Report.pdf", FormatTag::Pdf, 0),
                item("Report.pptx", FormatTag::SlideDeck, 0),
            ],
            vec![
                item("Report.pptx", FormatTag::SlideDeck, 0),
                item("Report", FormatTag::NativeSlides, 5),
                item("Report.pdf", FormatTag::Pdf, 0),
            ],
        ];

        for input in variants {
            let (winners, skipped) = resolve_duplicates(input);
            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].format, expected_winner);
            assert_eq!(skipped.len(), 2);
            for s in &skipped {
                assert_eq!(s.winner_name, "Report");
            }
        }
    }

    #[test]
    fn format_tie_breaks_on_newest_modification() {
        let (winners, _) = resolve_duplicates(vec![
            item("Plan v1.docx", FormatTag::WordDoc, 10),
            item("Plan v2.docx", FormatTag::WordDoc, 1),
        ]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].name, "Plan v2.docx");
    }

    #[test]
    fn singleton_groups_pass_through() {
        let (winners, skipped) = resolve_duplicates(vec![
            item("Alpha.md", FormatTag::Markdown, 0),
            item("Beta.md", FormatTag::Markdown, 0),
        ]);
        assert_eq!(winners.len(), 2);
        assert!(skipped.is_empty());
    }
}
