//! Message framing for the chat wire format.
//!
//! A logical message becomes one or more newline-terminated wire chunks, each
//! at most [`MAX_FRAME_SIZE`] bytes. When a sender is given, every chunk is
//! prefixed with `"{sender}> "` so each chunk is a self-contained line from
//! the receiver's point of view -- including every chunk of a split line, not
//! only the first. That per-chunk header is the historical wire behavior and
//! is pinned by a test below.

use bytes::Bytes;

/// Maximum size of a single wire chunk, header and footer included.
pub const MAX_FRAME_SIZE: usize = 100;

/// Longest sender name whose header still leaves room for at least one body
/// byte in every chunk: `name + "> " + body + "\n"` must fit the frame.
pub const MAX_NAME_SIZE: usize = MAX_FRAME_SIZE - 4;

/// Encode a (possibly multi-line) message into wire chunks.
///
/// Trailing whitespace of the whole message is stripped, then each line is
/// framed independently. With `sender = None` the header is empty, which is
/// how server notices go out.
pub fn frame_message(message: &str, sender: Option<&str>) -> Vec<Bytes> {
    let header = match sender {
        Some(name) => format!("{name}> "),
        None => String::new(),
    };
    let footer = "\n";
    // A header at or beyond the frame size leaves a zero budget, under which
    // split_line drops every body byte and nothing is emitted.
    let body_budget = MAX_FRAME_SIZE.saturating_sub(header.len() + footer.len());

    message
        .trim_end()
        .split('\n')
        .flat_map(|line| split_line(line, body_budget))
        .map(|body| Bytes::from(format!("{header}{body}{footer}")))
        .collect()
}

/// Split one line into bodies of at most `budget` bytes, never cutting
/// through a multi-byte character.
///
/// A character wider than the whole budget cannot be emitted intact; it is
/// dropped so the split always makes progress.
fn split_line(line: &str, budget: usize) -> Vec<&str> {
    if line.len() <= budget {
        return vec![line];
    }

    let mut bodies = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        if rest.len() <= budget {
            bodies.push(rest);
            break;
        }
        let cut = floor_char_boundary(rest, budget);
        if cut == 0 {
            // First character alone exceeds the budget; drop it.
            let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            rest = &rest[width.min(rest.len())..];
            continue;
        }
        bodies.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    bodies
}

/// Largest index `<= max` that lands on a character boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Best-effort decode of raw peer bytes: invalid sequences are dropped, the
/// way `errors="ignore"` decoders behave. Never fails.
pub fn decode_dropping(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                    out.push_str(s);
                }
                // error_len() is None for a truncated sequence at the end.
                let skip = match e.error_len() {
                    Some(len) => len,
                    None => return out,
                };
                rest = &rest[valid + skip..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(chunk: &Bytes) -> &str {
        std::str::from_utf8(chunk).unwrap()
    }

    #[test]
    fn test_short_message_is_one_chunk() {
        let chunks = frame_message("hello\n", Some("Alice"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(text(&chunks[0]), "Alice> hello\n");
    }

    #[test]
    fn test_no_sender_has_no_header() {
        let chunks = frame_message("Bienvenue sur le tchat !", None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(text(&chunks[0]), "Bienvenue sur le tchat !\n");
    }

    #[test]
    fn test_chunks_never_exceed_frame_size() {
        let long = "x".repeat(1000);
        for chunk in frame_message(&long, Some("someone")) {
            assert!(chunk.len() <= MAX_FRAME_SIZE);
        }
    }

    #[test]
    fn test_round_trip_of_single_byte_text() {
        // 1 byte per character: concatenating stripped bodies must rebuild
        // the original exactly.
        let original = "abcdefghij".repeat(37);
        let header = "Bob> ";
        let rebuilt: String = frame_message(&original, Some("Bob"))
            .iter()
            .map(|chunk| {
                let line = std::str::from_utf8(chunk).unwrap();
                line.strip_prefix(header)
                    .unwrap()
                    .strip_suffix('\n')
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_every_chunk_carries_header_and_footer() {
        // Historical behavior: a split line repeats the header on each chunk.
        let long = "y".repeat(250);
        let chunks = frame_message(&long, Some("Alice"));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let line = text(chunk);
            assert!(line.starts_with("Alice> "));
            assert!(line.ends_with('\n'));
        }
    }

    #[test]
    fn test_split_backs_off_to_char_boundary() {
        // 'é' is 2 bytes; a budget of 5 over "aaaaé" must cut before it.
        let bodies = split_line("aaaaébb", 5);
        assert_eq!(bodies[0], "aaaa");
        assert_eq!(bodies.concat(), "aaaaébb");
    }

    #[test]
    fn test_oversized_character_is_dropped() {
        // A single character wider than the budget cannot be framed.
        let bodies = split_line("a🦀b", 1);
        assert_eq!(bodies.concat(), "ab");
    }

    #[test]
    fn test_header_wider_than_frame_emits_nothing() {
        // A 98-byte name plus "> " fills the whole frame; the budget bottoms
        // out at zero instead of underflowing, and no chunk goes out.
        let name = "n".repeat(MAX_NAME_SIZE + 2);
        let chunks = frame_message("hi", Some(&name));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_longest_allowed_name_still_carries_bodies() {
        // At MAX_NAME_SIZE the budget is exactly one byte per chunk.
        let name = "n".repeat(MAX_NAME_SIZE);
        let chunks = frame_message("abc", Some(&name));
        assert_eq!(chunks.len(), 3);
        for (chunk, body) in chunks.iter().zip(["a", "b", "c"]) {
            assert_eq!(chunk.len(), MAX_FRAME_SIZE);
            assert_eq!(text(chunk), format!("{name}> {body}\n"));
        }
    }

    #[test]
    fn test_budget_of_zero_drops_every_body_byte() {
        // One byte past MAX_NAME_SIZE: header + footer equal the frame size
        // and every body byte is dropped by the split.
        let name = "n".repeat(MAX_NAME_SIZE + 1);
        assert!(frame_message("silencieux", Some(&name)).is_empty());
    }

    #[test]
    fn test_multi_line_message_frames_each_line() {
        let chunks = frame_message("one\ntwo\n", Some("A"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(text(&chunks[0]), "A> one\n");
        assert_eq!(text(&chunks[1]), "A> two\n");
    }

    #[test]
    fn test_trailing_whitespace_stripped() {
        let chunks = frame_message("salut  \n", Some("A"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(text(&chunks[0]), "A> salut\n");
    }

    #[test]
    fn test_decode_dropping_valid_input() {
        assert_eq!(decode_dropping("héllo\n".as_bytes()), "héllo\n");
    }

    #[test]
    fn test_decode_dropping_skips_invalid_bytes() {
        assert_eq!(decode_dropping(b"ab\xffcd"), "abcd");
        assert_eq!(decode_dropping(b"\xfe\xff"), "");
    }

    #[test]
    fn test_decode_dropping_truncated_tail() {
        // First two bytes of a 4-byte sequence; dropped, no panic.
        assert_eq!(decode_dropping(b"ok\xf0\x9f"), "ok");
    }
}
