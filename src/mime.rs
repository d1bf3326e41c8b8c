//! Extension-based content type lookup for stored objects.

pub const OCTET_STREAM: &str = "application/octet-stream";

// (extension, content type); extensions are compared case-insensitively.
const TABLE: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("java", "text/x-java-source"),
    ("py", "text/x-python"),
    ("c", "text/x-c"),
    ("h", "text/x-c"),
    ("cpp", "text/x-c++"),
    ("hpp", "text/x-c++"),
    ("js", "text/javascript"),
    ("ts", "text/x-typescript"),
    ("go", "text/x-go"),
    ("rs", "text/x-rust"),
    ("sh", "text/x-shellscript"),
    ("sql", "application/sql"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("tgz", "application/gzip"),
];

/// Guess a content type from the extension of `path`.
pub fn guess(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    TABLE
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, ct)| *ct)
        .unwrap_or(OCTET_STREAM)
}

/// Content type for UTF-8 text uploads (code submissions).
pub fn guess_text(path: &str) -> String {
    match guess(path) {
        ct if ct.starts_with("text/") => format!("{}; charset=utf-8", ct),
        _ => "text/plain; charset=utf-8".to_string(),
    }
}
