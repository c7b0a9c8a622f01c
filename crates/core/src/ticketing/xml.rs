//! Issue body parsing.
//!
//! The `get` call answers with an XML document whose leaf elements carry the
//! issue fields. Element names are matched case-insensitively with `_` and
//! `-` ignored, at any depth; the first occurrence of a field wins.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{RemoteIssueRecord, TicketingError};

fn malformed(detail: impl Into<String>) -> TicketingError {
    TicketingError::EvApiFailure {
        status: None,
        detail: detail.into(),
    }
}

fn normalize(name: &[u8]) -> String {
    String::from_utf8_lossy(name)
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

struct Frame {
    name: String,
    text: String,
    has_children: bool,
}

fn leaf_values(body: &str) -> Result<HashMap<String, String>, TicketingError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Frame> = Vec::new();
    let mut values = HashMap::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_root = true;
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                stack.push(Frame {
                    name: normalize(e.name().as_ref()),
                    text: String::new(),
                    has_children: false,
                });
            }
            Ok(Event::Empty(e)) => {
                saw_root = true;
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                values
                    .entry(normalize(e.name().as_ref()))
                    .or_insert_with(String::new);
            }
            Ok(Event::Text(t)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = t.decode().map_err(|e| malformed(e.to_string()))?;
                    frame.text.push_str(&text);
                } else if !t.decode().map(|s| s.trim().is_empty()).unwrap_or(false) {
                    return Err(malformed("text outside of the root element"));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(frame) = stack.last_mut() {
                    if let Some(ch) = r.resolve_char_ref().map_err(|e| malformed(e.to_string()))? {
                        frame.text.push(ch);
                    } else {
                        let name = r.decode().map_err(|e| malformed(e.to_string()))?;
                        let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                            .ok_or_else(|| malformed(format!("unknown entity &{};", name)))?;
                        frame.text.push_str(resolved);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(frame) = stack.pop() {
                    if !frame.has_children {
                        values
                            .entry(frame.name)
                            .or_insert_with(|| frame.text.trim().to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(format!("invalid XML: {}", e))),
        }
    }

    if !saw_root || !stack.is_empty() {
        return Err(malformed("response is not an XML document"));
    }

    Ok(values)
}

/// Parse an issue body. `requested_id` fills in the id when the document
/// omits it.
pub fn parse_issue(body: &str, requested_id: &str) -> Result<RemoteIssueRecord, TicketingError> {
    let mut values = leaf_values(body)?;
    let mut take = |key: &str| values.remove(key).unwrap_or_default();

    let record = RemoteIssueRecord {
        id: take("id"),
        author: take("author"),
        company: take("company"),
        status: take("status"),
        priority: take("priority"),
        assigned_group: take("assignedgroup"),
        assignee: take("assignee"),
        short_description: take("shortdescription"),
        description: take("description"),
        time_created: take("timecreated"),
    };

    if record == RemoteIssueRecord::default() {
        return Err(malformed("response carries no issue fields"));
    }

    Ok(RemoteIssueRecord {
        id: if record.id.is_empty() {
            requested_id.to_string()
        } else {
            record.id
        },
        ..record
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<issue>
  <id>4711</id>
  <author>j.doe</author>
  <company>Acme &amp; Sons</company>
  <status>new</status>
  <priority>High</priority>
  <assigned_group></assigned_group>
  <Assignee/>
  <ShortDescription>Mail server down</ShortDescription>
  <description><![CDATA[Since 9:00 the <b>server down</b> alarm is on]]></description>
  <time-created>2024-03-01 09:12</time-created>
</issue>"#;

    #[test]
    fn test_parse_full_issue() {
        let record = parse_issue(ISSUE, "4711").unwrap();
        assert_eq!(record.id, "4711");
        assert_eq!(record.author, "j.doe");
        assert_eq!(record.company, "Acme & Sons");
        assert_eq!(record.priority, "High");
        assert_eq!(record.assigned_group, "");
        assert_eq!(record.assignee, "");
        assert_eq!(record.short_description, "Mail server down");
        assert_eq!(record.description, "Since 9:00 the <b>server down</b> alarm is on");
        assert_eq!(record.time_created, "2024-03-01 09:12");
    }

    #[test]
    fn test_nested_fields_and_missing_id() {
        let body = "<response><data><issue><company>Globex</company></issue></data></response>";
        let record = parse_issue(body, "99").unwrap();
        assert_eq!(record.id, "99");
        assert_eq!(record.company, "Globex");
    }

    #[test]
    fn test_character_references() {
        let body = "<issue><description>caf&#233; &lt;down&gt;</description></issue>";
        let record = parse_issue(body, "1").unwrap();
        assert_eq!(record.description, "café <down>");
    }

    #[test]
    fn test_plain_text_failure_body() {
        let result = parse_issue("Access denied for user", "1");
        assert!(matches!(
            result,
            Err(TicketingError::EvApiFailure { status: None, .. })
        ));
    }

    #[test]
    fn test_truncated_document() {
        assert!(parse_issue("<issue><company>Acme</company>", "1").is_err());
    }

    #[test]
    fn test_document_without_issue_fields() {
        assert!(parse_issue("<error><code>17</code></error>", "1").is_err());
    }
}
