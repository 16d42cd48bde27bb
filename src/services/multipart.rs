//! Minimal multipart/form-data reader over a fully buffered request body.
//!
//! The upload route receives the raw body as bytes, so parts are located by
//! scanning for the `--<boundary>` delimiter directly instead of streaming.

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Field names accepted as the uploaded file.
const FILE_FIELDS: [&str; 2] = ["image", "file"];

/// File pulled out of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// One part of a multipart body, borrowing from the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart<'a> {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: &'a [u8],
}

/// Read the `boundary` parameter from a `Content-Type` header value.
///
/// Accepts both `boundary=abc` and `boundary="abc"`.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("boundary=")? + "boundary=".len();
    let rest = content_type[start..].trim_start();

    let boundary = match rest.strip_prefix('"') {
        Some(quoted) => &quoted[..quoted.find('"')?],
        None => rest
            .split(|c: char| c == ';' || c.is_whitespace())
            .next()
            .unwrap_or_default(),
    };

    (!boundary.is_empty()).then(|| boundary.to_string())
}

/// Locate the first part named `image` or `file` that carries a non-empty filename.
///
/// Returns `None` when the header has no boundary or no qualifying part exists.
pub fn extract_file(body: &[u8], content_type: &str) -> Option<UploadedFile> {
    let boundary = boundary_from_content_type(content_type)?;

    parse_parts(body, &boundary)
        .into_iter()
        .find(|part| {
            part.name
                .as_deref()
                .is_some_and(|name| FILE_FIELDS.contains(&name))
                && part.filename.as_deref().is_some_and(|f| !f.is_empty())
        })
        .map(|part| UploadedFile {
            filename: part.filename.unwrap_or_default(),
            content_type: part
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            content: part.content.to_vec(),
        })
}

/// Value of the first plain (non-file) field called `field`, trimmed.
pub fn extract_text_field(body: &[u8], content_type: &str, field: &str) -> Option<String> {
    let boundary = boundary_from_content_type(content_type)?;

    parse_parts(body, &boundary)
        .into_iter()
        .find(|part| part.filename.is_none() && part.name.as_deref() == Some(field))
        .map(|part| String::from_utf8_lossy(part.content).trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Split `body` on `--<boundary>` and parse each part's headers.
///
/// Parts without a blank line between headers and content are skipped.
pub fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<FormPart<'a>> {
    split_parts(body, boundary)
        .into_iter()
        .filter_map(parse_part)
        .collect()
}

fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut parts = Vec::new();

    let Some(mut cursor) = find(body, &delimiter, 0) else {
        return parts;
    };

    loop {
        let after = cursor + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }
        let Some(next) = find(body, &delimiter, after) else {
            break;
        };

        let mut part = &body[after..next];
        part = part.strip_prefix(b"\r\n").unwrap_or(part);
        part = part.strip_suffix(b"\r\n").unwrap_or(part);
        parts.push(part);

        cursor = next;
    }

    parts
}

fn parse_part(raw: &[u8]) -> Option<FormPart<'_>> {
    let separator = find(raw, b"\r\n\r\n", 0)?;
    let headers = String::from_utf8_lossy(&raw[..separator]);
    let content = &raw[separator + 4..];

    let mut part = FormPart {
        name: None,
        filename: None,
        content_type: None,
        content,
    };

    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for (param, param_value) in disposition_params(value) {
                if param.eq_ignore_ascii_case("name") && part.name.is_none() {
                    part.name = Some(param_value);
                } else if param.eq_ignore_ascii_case("filename") && part.filename.is_none() {
                    part.filename = Some(param_value);
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            let value = value.trim();
            if !value.is_empty() {
                part.content_type = Some(value.to_string());
            }
        }
    }

    Some(part)
}

/// `form-data; name="a"; filename="b;c.png"` → `[("name","a"), ("filename","b;c.png")]`.
///
/// Semicolons inside quotes do not split parameters.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .iter()
        .filter_map(|segment| {
            let (key, raw) = segment.split_once('=')?;
            let raw = raw.trim();
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(raw);
            Some((key.trim().to_string(), unquoted.to_string()))
        })
        .collect()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
