//! Converts one Hostex message into an ordered, non-empty list of content
//! parts, downloading and re-uploading attachments on the way.

use std::borrow::Cow;

use {
    hostex_portal::{ContentPart, MediaKind, PortalKey, PortalSink},
    reqwest::{Client, header::CONTENT_TYPE},
    tracing::{debug, warn},
};

use crate::{attachment::Attachment, types::Message};

pub const EMPTY_MESSAGE_PLACEHOLDER: &str = "(empty message)";

const FALLBACK_MIME: &str = "application/octet-stream";

/// Path segments CDNs append after the real filename to select a rendition.
const SIZE_TOKENS: &[&str] = &[
    "xlarge",
    "x_large",
    "large",
    "medium",
    "small",
    "thumb",
    "thumbnail",
    "original",
    "full",
    "xl",
    "square",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Download,
    Read,
    Upload,
}

impl Failure {
    fn label(self) -> &'static str {
        match self {
            Self::Download => "download failed",
            Self::Read => "read failed",
            Self::Upload => "upload failed",
        }
    }
}

struct Fetched {
    data: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    http: Client,
}

impl Normalizer {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Never fails: attachment problems degrade to a text part carrying the
    /// original URL, and a message with nothing usable yields a placeholder.
    pub async fn normalize(
        &self,
        message: &Message,
        key: &PortalKey,
        sink: &dyn PortalSink,
    ) -> Vec<ContentPart> {
        let mut parts = Vec::with_capacity(2);

        if message.has_text() {
            parts.push(ContentPart::text(message.content.as_str()));
        }

        match message.attachment.url() {
            Some(url) => {
                parts.push(self.attachment_part(&message.attachment, url, key, sink).await);
            },
            None if !message.attachment.is_none() => {
                debug!(
                    conversation_id = %key.conversation_id,
                    message_id = %message.id,
                    "attachment has no recognizable URL, ignoring"
                );
            },
            None => {},
        }

        if parts.is_empty() {
            parts.push(ContentPart::text(EMPTY_MESSAGE_PLACEHOLDER));
        }
        parts
    }

    async fn attachment_part(
        &self,
        attachment: &Attachment,
        url: &str,
        key: &PortalKey,
        sink: &dyn PortalSink,
    ) -> ContentPart {
        let explicit = attachment.explicit_filename();
        let declared = attachment.declared_mime();

        let fetched = match self.fetch(url).await {
            Ok(fetched) => fetched,
            Err(failure) => {
                let filename = resolve_filename(explicit, url, declared.as_deref());
                return failure_part(&filename, url, failure);
            },
        };

        let mime = declared
            .or(fetched.content_type)
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let filename = resolve_filename(explicit, url, Some(&mime));
        let size = fetched.data.len();

        match sink.upload_media(key, fetched.data, &filename, &mime).await {
            Ok(uri) => ContentPart::Media {
                kind: MediaKind::from_mime(&mime),
                filename,
                mime_type: mime,
                uri,
                size,
            },
            Err(e) => {
                warn!(
                    conversation_id = %key.conversation_id,
                    filename,
                    error = %e,
                    "attachment upload failed"
                );
                failure_part(&filename, url, Failure::Upload)
            },
        }
    }

    async fn fetch(&self, url: &str) -> Result<Fetched, Failure> {
        let resp = self.http.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "attachment download failed");
            Failure::Download
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "attachment download failed");
            return Err(Failure::Download);
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(mime_essence);

        let data = resp.bytes().await.map_err(|e| {
            warn!(url, error = %e, "attachment body read failed");
            Failure::Read
        })?;

        Ok(Fetched {
            data: data.to_vec(),
            content_type,
        })
    }
}

fn failure_part(filename: &str, url: &str, failure: Failure) -> ContentPart {
    ContentPart::text(format!("📎 {filename}: {url} ({})", failure.label()))
}

/// `image/png; charset=binary` → `image/png`.
fn mime_essence(header: &str) -> Option<String> {
    let essence = header.split(';').next().unwrap_or_default().trim();
    (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
}

/// Explicit name, else the last URL path segment, else (for a trailing
/// rendition token such as `.../photo.jpg/xlarge`) the segment before it,
/// else a generic name with an extension inferred from `mime`.
pub fn resolve_filename(explicit: Option<&str>, url: &str, mime: Option<&str>) -> String {
    if let Some(name) = explicit
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let segments = path_segments(url);
    if let Some((last, rest)) = segments.split_last() {
        if !is_size_token(last) {
            return last.clone();
        }
        if let Some(previous) = rest.last().filter(|s| has_extension(s)) {
            return previous.clone();
        }
    }

    generic_filename(mime)
}

fn path_segments(raw: &str) -> Vec<String> {
    let parsed = url::Url::parse(raw);
    let segments: Vec<&str> = match &parsed {
        Ok(parsed) => parsed
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default(),
        Err(_) => {
            let path = raw.split(['?', '#']).next().unwrap_or_default();
            path.split('/').collect()
        },
    };

    segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| s.to_string())
        })
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn has_extension(segment: &str) -> bool {
    segment.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && (1..=5).contains(&ext.len())
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

fn is_size_token(segment: &str) -> bool {
    if has_extension(segment) {
        return false;
    }
    let lowered = segment.to_ascii_lowercase();
    SIZE_TOKENS.contains(&lowered.as_str()) || is_dimension(&lowered)
}

/// `1024x768`
fn is_dimension(segment: &str) -> bool {
    segment.split_once('x').is_some_and(|(w, h)| {
        !w.is_empty()
            && !h.is_empty()
            && w.chars().all(|c| c.is_ascii_digit())
            && h.chars().all(|c| c.is_ascii_digit())
    })
}

fn generic_filename(mime: Option<&str>) -> String {
    let stem = match mime {
        Some(m) if m.starts_with("image/") => "image",
        _ => "attachment",
    };
    match mime.and_then(extension_for_mime) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        _ => return None,
    };
    Some(ext)
}
