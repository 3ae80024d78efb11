//! Minimal anchor extraction for catalog pages.
//!
//! Catalog pages are loosely structured HTML tables; the only thing the
//! pipeline reads from them is `<a href>` targets and the anchors' visible
//! text, in document order.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    /// Visible text with markup stripped, entities decoded and whitespace collapsed.
    pub text: String,
}

/// Every anchor carrying an `href` attribute, in document order.
pub fn scan_anchors(html: &str) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut cursor = 0usize;

    while let Some(offset) = html[cursor..].find('<') {
        let at = cursor + offset;
        let rest = &html[at..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            cursor = comment
                .find("-->")
                .map_or(html.len(), |end| at + 4 + end + 3);
            continue;
        }
        if !opens_anchor(rest) {
            cursor = at + 1;
            continue;
        }
        let Some(tag_len) = tag_length(rest) else {
            break;
        };
        let body_start = at + tag_len;
        let body_end = closing_anchor(html, body_start).unwrap_or(html.len());
        if let Some(href) = href_attribute(&rest[..tag_len]) {
            anchors.push(Anchor {
                href: decode_entities(&href).trim().to_string(),
                text: visible_text(&html[body_start..body_end]),
            });
        }
        cursor = body_end;
    }

    anchors
}

fn visible_text(fragment: &str) -> String {
    let mut stripped = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `<a` followed by whitespace, `>` or `/`; `<abbr>` and `<area>` do not count.
fn opens_anchor(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() > 2
        && bytes[1].eq_ignore_ascii_case(&b'a')
        && (bytes[2] == b'>' || bytes[2] == b'/' || bytes[2].is_ascii_whitespace())
}

/// Byte length of the opening tag at the start of `rest`, quotes respected.
fn tag_length(rest: &str) -> Option<usize> {
    let mut quote = None::<u8>;
    for (index, byte) in rest.bytes().enumerate() {
        match (quote, byte) {
            (Some(active), _) if byte == active => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(byte),
            (None, b'>') => return Some(index + 1),
            _ => {}
        }
    }
    None
}

fn closing_anchor(html: &str, from: usize) -> Option<usize> {
    let bytes = html.as_bytes();
    (from..bytes.len().saturating_sub(2)).find(|&index| {
        bytes[index..index + 3].eq_ignore_ascii_case(b"</a")
            && bytes
                .get(index + 3)
                .is_none_or(|next| *next == b'>' || next.is_ascii_whitespace())
    })
}

/// Raw value of the first `href` attribute in an opening tag.
fn href_attribute(tag: &str) -> Option<String> {
    let bytes = tag.as_bytes();
    let mut index = 2;

    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'>' {
            return None;
        }
        if byte == b'/' || byte.is_ascii_whitespace() {
            index += 1;
            continue;
        }

        let name_start = index;
        while index < bytes.len()
            && !matches!(bytes[index], b'=' | b'>' | b'/')
            && !bytes[index].is_ascii_whitespace()
        {
            index += 1;
        }
        if index == name_start {
            index += 1;
            continue;
        }
        let is_href = tag[name_start..index].eq_ignore_ascii_case("href");
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        if bytes.get(index) != Some(&b'=') {
            if is_href {
                return Some(String::new());
            }
            continue;
        }
        index += 1;
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }

        let (start, end) = match bytes.get(index) {
            Some(&quote @ (b'"' | b'\'')) => {
                let start = index + 1;
                let end = tag[start..]
                    .find(quote as char)
                    .map_or(tag.len(), |offset| start + offset);
                index = end + 1;
                (start, end)
            }
            _ => {
                let start = index;
                while index < bytes.len()
                    && bytes[index] != b'>'
                    && !bytes[index].is_ascii_whitespace()
                {
                    index += 1;
                }
                (start, index)
            }
        };
        if is_href {
            return Some(tag[start..end].to_string());
        }
    }

    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
