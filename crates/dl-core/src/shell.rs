//! POSIX shell quoting for commands sent to a remote shell

/// Quote a string as a single POSIX shell word
///
/// Words made only of safe characters are returned as-is; anything else is
/// wrapped in single quotes with embedded quotes escaped.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
