use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{ContentType, LegalExcerpt};

/// Items kept per search response.
pub const MAX_ITEMS: usize = 2;
/// Body length (in characters) kept before the ellipsis.
pub const BODY_LIMIT: usize = 300;
pub const ELLIPSIS: &str = "...";

const NO_CONTENT: &str = "내용없음";
const NO_STATUTE_TITLE: &str = "법령명없음";
const NO_CASE_NAME: &str = "사건명없음";

/// Cut `text` to `BODY_LIMIT` characters plus `ELLIPSIS`; shorter text is returned as is.
pub fn truncate_body(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(BODY_LIMIT).collect();
    if chars.next().is_some() {
        format!("{head}{ELLIPSIS}")
    } else {
        head
    }
}

/// Parse the first `MAX_ITEMS` hits out of a raw search payload.
///
/// Returns `None` when the payload does not have the expected shape. A
/// missing top-level key is an empty result, not a mismatch.
pub fn excerpts(raw: &Value, content_type: ContentType) -> Option<Vec<LegalExcerpt>> {
    let (root_key, list_key) = match content_type {
        ContentType::Statute => ("LawSearch", "law"),
        ContentType::Precedent => ("PrecSearch", "prec"),
    };

    let root = match raw.get(root_key) {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(v) => v.as_object()?,
    };
    let items: Vec<&Value> = match root.get(list_key) {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(Value::Array(list)) => list.iter().take(MAX_ITEMS).collect(),
        // A single hit comes back as a bare object.
        Some(obj @ Value::Object(_)) => vec![obj],
        Some(_) => return None,
    };

    items
        .into_iter()
        .map(|item| item.as_object().map(|obj| excerpt_from(obj, content_type)))
        .collect()
}

fn excerpt_from(item: &Map<String, Value>, content_type: ContentType) -> LegalExcerpt {
    let text = |key: &str| item.get(key).and_then(Value::as_str);
    let (title, body) = match content_type {
        ContentType::Statute => (
            text("법령명한글")
                .or_else(|| text("법령명명"))
                .unwrap_or(NO_STATUTE_TITLE),
            text("법령본문"),
        ),
        ContentType::Precedent => (text("사건명").unwrap_or(NO_CASE_NAME), text("판결요지")),
    };
    LegalExcerpt {
        content_type,
        title: title.to_string(),
        body: truncate_body(body.unwrap_or(NO_CONTENT)),
    }
}

/// Render one excerpt as a labeled block.
pub fn render_excerpt(excerpt: &LegalExcerpt) -> String {
    let body_label = match excerpt.content_type {
        ContentType::Statute => "조문",
        ContentType::Precedent => "요지",
    };
    format!(
        "\n[{}] {}\n- {}: {}\n",
        excerpt.content_type.label(),
        excerpt.title,
        body_label,
        excerpt.body
    )
}

/// Summarize a raw search payload as text for the filter prompt.
///
/// Never fails: a malformed payload yields an empty string.
pub fn refine(raw: &Value, content_type: ContentType) -> String {
    match excerpts(raw, content_type) {
        Some(list) => list.iter().map(render_excerpt).collect(),
        None => {
            debug!(target_type = %content_type, "search payload shape mismatch, dropping");
            String::new()
        },
    }
}
