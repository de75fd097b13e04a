//! Hostex message attachments.
//!
//! The vendor sends the `attachment` field in several shapes: absent, `null`,
//! a bare URL string, or an object whose URL, name and type live under
//! varying keys. Everything is decoded into [`Attachment`] so the rest of the
//! connector never inspects raw JSON.

use {
    serde::{Deserialize, Deserializer},
    serde_json::{Map, Value},
};

/// URL keys in priority order.
const URL_FIELDS: &[&str] = &["original_url", "url", "file_url", "image_url", "src", "link"];

const FILENAME_FIELDS: &[&str] = &["filename", "name", "title"];

const TYPE_FIELDS: &[&str] = &["mime_type", "content_type", "type"];

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Attachment {
    #[default]
    None,
    /// Object form; keys are kept as sent.
    Structured(StructuredAttachment),
    /// Bare URL string.
    RawUrl(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredAttachment {
    fields: Map<String, Value>,
}

impl StructuredAttachment {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.fields
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
    }

    pub fn url(&self) -> Option<&str> {
        self.first_str(URL_FIELDS)
    }

    pub fn filename(&self) -> Option<&str> {
        self.first_str(FILENAME_FIELDS)
    }

    /// Declared type, normalized to a MIME type when possible.
    pub fn declared_mime(&self) -> Option<String> {
        self.first_str(TYPE_FIELDS).and_then(mime_from_declared)
    }
}

/// Maps a vendor type hint to a MIME type.
///
/// Full MIME types pass through lowercased; bare category words map to a
/// conventional default; anything else is unknown.
fn mime_from_declared(declared: &str) -> Option<String> {
    let lowered = declared.trim().to_ascii_lowercase();
    if lowered.contains('/') {
        return Some(lowered);
    }
    let mapped = match lowered.as_str() {
        "image" | "photo" | "picture" => "image/jpeg",
        "video" => "video/mp4",
        "audio" | "voice" => "audio/mpeg",
        _ => return None,
    };
    Some(mapped.to_string())
}

impl Attachment {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Self::None
                } else {
                    Self::RawUrl(trimmed.to_string())
                }
            },
            Value::Object(fields) if !fields.is_empty() => {
                Self::Structured(StructuredAttachment::new(fields))
            },
            _ => Self::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The download URL, if the shape carries one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Structured(s) => s.url(),
            Self::RawUrl(url) => Some(url),
        }
    }

    pub fn explicit_filename(&self) -> Option<&str> {
        match self {
            Self::Structured(s) => s.filename(),
            _ => None,
        }
    }

    pub fn declared_mime(&self) -> Option<String> {
        match self {
            Self::Structured(s) => s.declared_mime(),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.map(Self::from_value).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case::null(json!(null))]
    #[case::empty_string(json!(""))]
    #[case::blank_string(json!("   "))]
    #[case::empty_object(json!({}))]
    #[case::number(json!(42))]
    #[case::boolean(json!(true))]
    #[case::array(json!(["https://cdn.example.com/a.jpg"]))]
    fn degenerate_shapes_are_none(#[case] value: Value) {
        assert!(Attachment::from_value(value).is_none());
    }

    #[test]
    fn raw_string_is_url() {
        let attachment = Attachment::from_value(json!("https://cdn.example.com/a.jpg"));
        assert_eq!(attachment, Attachment::RawUrl("https://cdn.example.com/a.jpg".into()));
        assert_eq!(attachment.url(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(attachment.declared_mime(), None);
    }

    #[rstest]
    #[case::original_wins(json!({"url": "b", "original_url": "a"}), Some("a"))]
    #[case::url(json!({"url": "b", "file_url": "c"}), Some("b"))]
    #[case::file_url(json!({"file_url": "c", "link": "f"}), Some("c"))]
    #[case::image_url(json!({"image_url": "d"}), Some("d"))]
    #[case::src(json!({"src": "e", "link": "f"}), Some("e"))]
    #[case::link(json!({"link": "f"}), Some("f"))]
    #[case::blank_skipped(json!({"original_url": " ", "url": "b"}), Some("b"))]
    #[case::non_string_skipped(json!({"url": 7, "src": "e"}), Some("e"))]
    #[case::no_url(json!({"type": "image"}), None)]
    fn structured_url_priority(#[case] value: Value, #[case] expected: Option<&str>) {
        let attachment = Attachment::from_value(value);
        assert_eq!(attachment.url(), expected);
    }

    #[rstest]
    #[case::full_mime(json!({"mime_type": "Image/PNG"}), Some("image/png"))]
    #[case::content_type(json!({"content_type": "application/pdf"}), Some("application/pdf"))]
    #[case::bare_image(json!({"type": "image"}), Some("image/jpeg"))]
    #[case::bare_video(json!({"type": "video"}), Some("video/mp4"))]
    #[case::bare_audio(json!({"type": "audio"}), Some("audio/mpeg"))]
    #[case::bare_file(json!({"type": "file"}), None)]
    #[case::mime_type_wins(json!({"type": "image", "mime_type": "image/webp"}), Some("image/webp"))]
    fn structured_declared_mime(#[case] value: Value, #[case] expected: Option<&str>) {
        let attachment = Attachment::from_value(value);
        assert_eq!(attachment.declared_mime().as_deref(), expected);
    }

    #[test]
    fn structured_filename_lookup() {
        let attachment =
            Attachment::from_value(json!({"url": "u", "name": "Lease.pdf", "title": "Lease"}));
        assert_eq!(attachment.explicit_filename(), Some("Lease.pdf"));
    }

    #[test]
    fn deserializes_missing_and_null_fields() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            attachment: Attachment,
        }
        let missing: Holder = serde_json::from_value(json!({})).unwrap();
        assert!(missing.attachment.is_none());
        let null: Holder = serde_json::from_value(json!({"attachment": null})).unwrap();
        assert!(null.attachment.is_none());
        let object: Holder =
            serde_json::from_value(json!({"attachment": {"url": "https://x/y.png"}})).unwrap();
        assert_eq!(object.attachment.url(), Some("https://x/y.png"));
    }
}
