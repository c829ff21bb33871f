//! Minimal HTML scanning helpers for the timetable parser. The source pages
//! are machine-generated and regular enough that tag-level string scanning
//! is sufficient; no DOM is built.

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

/// Locates the next `<open ...> ... </close>` block at or after `from`,
/// matching tag names case-insensitively. Returns byte offsets of the whole
/// block including the closing tag.
pub fn next_tag_block_ci(s: &str, open: &str, close: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let ol = to_lower(open);
    let cl = to_lower(close);
    let start = lc.get(from..)?.find(&ol)? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&cl)?;
    let end = open_end + end_rel + close.len();
    Some((start, end))
}

/// Content of a block between the end of its opening tag and the start of
/// its closing tag.
pub fn inner_after_open_tag(block: &str) -> &str {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return &block[oe + 1..cs];
            }
        }
    }
    ""
}

/// The opening tag of a block, attributes included, without the brackets.
pub fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(oe) => block[..oe].trim_start_matches('<'),
        None => block,
    }
}

/// Extracts an attribute value from an opening tag. Handles `name="v"`,
/// `name='v'` and unquoted `name=v` forms; the attribute name is matched
/// case-insensitively.
pub fn tag_attr(tag: &str, name: &str) -> Option<String> {
    let lc = to_lower(tag);
    let needle = format!("{}=", to_lower(name));
    let mut search = 0usize;
    loop {
        let rel = lc[search..].find(&needle)?;
        let at = search + rel;
        // Must start an attribute name, not be a suffix of a longer one
        let ok_left = at == 0
            || lc[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_whitespace());
        if !ok_left {
            search = at + needle.len();
            continue;
        }
        let rest = &tag[at + needle.len()..];
        let mut chars = rest.chars();
        return match chars.next() {
            Some(q @ ('"' | '\'')) => {
                let body = &rest[1..];
                body.find(q).map(|e| body[..e].to_string())
            }
            Some(_) => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                    .unwrap_or(rest.len());
                Some(rest[..end].to_string())
            }
            None => None,
        };
    }
}

/// True when the tag's `class` attribute contains `token` as a whole word.
pub fn class_has(tag: &str, token: &str) -> bool {
    match tag_attr(tag, "class") {
        Some(classes) => classes.split_whitespace().any(|c| c == token),
        None => false,
    }
}

/// Text content of the first element inside `block` whose class list
/// contains `token`. The marked elements are leaves in the source markup,
/// so the content runs from the end of the marked tag to the next `</`.
pub fn marked_text(block: &str, token: &str) -> Option<String> {
    let bytes = block.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'<' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic() {
            let tag_end = block[i..].find('>')? + i;
            let tag = &block[i + 1..tag_end];
            if class_has(tag, token) {
                let content_start = tag_end + 1;
                let content_end = block[content_start..]
                    .find("</")
                    .map(|e| content_start + e)
                    .unwrap_or(block.len());
                let text = strip_tags(&block[content_start..content_end]);
                return Some(text);
            }
            i = tag_end + 1;
        } else {
            i += 1;
        }
    }
    None
}

/// Drops markup, leaving a space where each tag stood so that text on the
/// two sides of a `<br>` stays tokenized. Runs of whitespace collapse.
pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&decode_entities(&out))
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapses runs of whitespace (including NBSP) to single spaces and trims.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() || ch == '\u{a0}' {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
