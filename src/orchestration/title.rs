//! Title normalization for outbound requests.

use crate::constants::CAPTION_TITLE_MAX_CHARS;

const ENTITIES: &[(&str, &str)] = &[
    ("&#8217;", "'"),
    ("&#8216;", "'"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&#8211;", "-"),
    ("&#8212;", "-"),
    ("&quot;", "\""),
    ("&#039;", "'"),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
    // last, so "&amp;lt;" decodes to the literal "&lt;"
    ("&amp;", "&"),
];

/// Decode the HTML entities that content feeds put into titles
pub fn decode_entities(raw: &str) -> String {
    ENTITIES
        .iter()
        .fold(raw.to_string(), |acc, (entity, plain)| acc.replace(entity, plain))
        .trim()
        .to_string()
}

/// Decoded title cut to the caption service's limit (`47 chars + "..."`)
pub fn caption_project_title(raw: &str) -> String {
    let decoded = decode_entities(raw);
    if decoded.chars().count() <= CAPTION_TITLE_MAX_CHARS {
        return decoded;
    }
    let kept: String = decoded.chars().take(CAPTION_TITLE_MAX_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}
