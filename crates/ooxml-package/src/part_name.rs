/// Normalize a zip entry name into a part path.
///
/// Backslashes become `/`, leading separators are dropped, empty and `.` segments are
/// skipped and `..` pops the previous segment. The result never starts or ends with `/`.
pub fn normalize_part_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    let mut out: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(segment),
        }
    }
    out.join("/")
}

/// Last segment of a part path (`word/document.xml` -> `document.xml`).
pub fn part_file_name(part: &str) -> &str {
    part.rsplit_once('/').map(|(_, name)| name).unwrap_or(part)
}
