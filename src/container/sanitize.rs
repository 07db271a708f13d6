//! Turning display text into a file name that is safe on every platform.

/// Longest file name in bytes.
const MAX_FILE_NAME_LENGTH: usize = 255;

/// Names Windows reserves for devices, with or without an extension.
const WINDOWS_RESERVED: [&str; 4] = ["con", "prn", "aux", "nul"];

fn is_illegal(c: char) -> bool {
    matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"')
}

/// C0 and C1 control characters.
fn is_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1f | 0x80..=0x9f)
}

fn is_windows_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    if WINDOWS_RESERVED.contains(&stem.as_str()) {
        return true;
    }
    match stem.as_bytes() {
        [b'c', b'o', b'm', digit] | [b'l', b'p', b't', digit] => digit.is_ascii_digit(),
        _ => false,
    }
}

/// Map arbitrary text to a file name token.
///
/// Path separators, reserved punctuation and control characters are
/// removed. Names consisting only of dots, Windows device names, and
/// trailing dots or spaces are dropped. The result is cut to 255 bytes on a
/// character boundary. Degenerate input yields the empty string, which the
/// caller must treat as an error.
pub fn sanitize_file_name(text: &str) -> String {
    let mut name: String = text
        .chars()
        .filter(|&c| !is_illegal(c) && !is_control(c))
        .collect();

    if name.chars().all(|c| c == '.') {
        name.clear();
    }
    if is_windows_reserved(&name) {
        name.clear();
    }
    let trimmed = name.trim_end_matches(['.', ' ']).len();
    name.truncate(trimmed);

    truncate_bytes(name, MAX_FILE_NAME_LENGTH)
}

fn truncate_bytes(mut name: String, max: usize) -> String {
    if name.len() > max {
        let mut end = max;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}
