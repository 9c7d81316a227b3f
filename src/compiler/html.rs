/// A single `name="value"` authoring attribute found on an element, in
/// source order. Markup parsing proper is out of scope; this crate only
/// needs enough of a scanner to find `x-fir-*` directives on an element's
/// opening tag and splice the compiled `@fir:...` attributes back in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub value: String,
}

/// A parsed directive attribute: `x-fir-<action>[:<param>]="<expr>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirective {
    pub action_name: String,
    pub param: Option<String>,
    pub expr: String,
}

const DIRECTIVE_PREFIX: &str = "x-fir-";

/// Picks the `x-fir-*` attributes out of an element's authoring attribute
/// list; everything else passes through untouched.
pub fn parse_directives(attrs: &[RawAttribute]) -> Vec<RawDirective> {
    attrs
        .iter()
        .filter_map(|attr| {
            let rest = attr.name.strip_prefix(DIRECTIVE_PREFIX)?;
            let (action_name, param) = match rest.split_once(':') {
                Some((name, param)) => (name.to_owned(), Some(param.to_owned())),
                None => (rest.to_owned(), None),
            };
            Some(RawDirective {
                action_name,
                param,
                expr: attr.value.clone(),
            })
        })
        .collect()
}

/// True for any authoring attribute this compiler recognizes and consumes;
/// the caller drops these from the element's final attribute list and
/// splices in the compiled `@fir:...` attributes instead.
pub fn is_directive_attribute(name: &str) -> bool {
    name.starts_with(DIRECTIVE_PREFIX)
}

/// One `name`/`value` pair found on a scanned opening tag, with the quote
/// character it was written with (`'"'`, `'\''`, or `'\0'` for an unquoted
/// or valueless attribute) so it can be reproduced byte-for-byte on splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedAttribute {
    pub name: String,
    pub value: String,
    pub quote: char,
}

/// One opening tag found in a blob of rendered HTML, byte-indexed into the
/// source string so the caller can slice around it without re-parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedTag {
    pub start: usize,
    pub end: usize,
    pub tag_name_end: usize,
    pub self_closing: bool,
    pub attrs: Vec<ScannedAttribute>,
}

/// Finds every opening tag in `html`, skipping closing tags (`</...>`),
/// comments (`<!--...-->`), and declarations (`<!...>`). Not a markup
/// parser: it has no notion of nesting or void elements, it only needs to
/// locate tags and their attribute lists so directives can be spliced in.
pub(crate) fn scan_opening_tags(html: &str) -> Vec<ScannedTag> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if html[i..].starts_with("<!--") {
            i = html[i..].find("-->").map(|p| i + p + 3).unwrap_or(bytes.len());
            continue;
        }
        if i + 1 < bytes.len() && (bytes[i + 1] == b'!' || bytes[i + 1] == b'/' || bytes[i + 1] == b'?') {
            i = html[i..].find('>').map(|p| i + p + 1).unwrap_or(bytes.len());
            continue;
        }
        let Some(tag) = scan_one_tag(html, i) else {
            i += 1;
            continue;
        };
        i = tag.end;
        tags.push(tag);
    }
    tags
}

fn scan_one_tag(html: &str, start: usize) -> Option<ScannedTag> {
    let bytes = html.as_bytes();
    let mut i = start + 1;
    let name_start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let tag_name_end = i;
    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        if bytes[i] == b'/' {
            self_closing = true;
            i += 1;
            continue;
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }
        let attr_name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' && bytes[i] != b'>' && bytes[i] != b'/' {
            i += 1;
        }
        if i == attr_name_start {
            return None;
        }
        let name = html[attr_name_start..i].to_owned();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i] as char;
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] as char != quote {
                    i += 1;
                }
                let value = html.get(value_start..i)?.to_owned();
                i = (i + 1).min(bytes.len());
                attrs.push(ScannedAttribute { name, value, quote });
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                let value = html.get(value_start..i)?.to_owned();
                attrs.push(ScannedAttribute { name, value, quote: '\0' });
            }
        } else {
            attrs.push(ScannedAttribute { name, value: String::new(), quote: '\0' });
        }
    }
    Some(ScannedTag {
        start,
        end: i,
        tag_name_end,
        self_closing,
        attrs,
    })
}
