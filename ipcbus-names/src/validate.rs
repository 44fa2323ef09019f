//! Shared grammar helpers for the dotted, element-based D-Bus naming
//! conventions (bus, interface and error names all share this shape; only
//! the allowed character set per element differs slightly for unique
//! names).

pub(crate) const MAX_NAME_LEN: usize = 255;

fn is_element_start(b: u8, allow_digit_start: bool) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || (allow_digit_start && b.is_ascii_digit())
}

fn is_element_char(b: u8, allow_hyphen: bool) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || (allow_hyphen && b == b'-')
}

/// Validate a dot-separated name with at least two elements, as required
/// for well-known bus names, interface names and error names.
pub(crate) fn validate_dotted(name: &str, allow_hyphen: bool) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let elements: Vec<&str> = name.split('.').collect();
    if elements.len() < 2 {
        return false;
    }
    elements.iter().all(|e| validate_element(e, allow_hyphen, false))
}

/// Validate a single element (no dots): used for member names, and for
/// each `.`-separated component of a unique name.
pub(crate) fn validate_element(element: &str, allow_hyphen: bool, allow_digit_start: bool) -> bool {
    let bytes = element.as_bytes();
    match bytes.split_first() {
        None => false,
        Some((&first, rest)) => {
            is_element_start(first, allow_digit_start)
                && rest.iter().all(|b| is_element_char(*b, allow_hyphen))
        }
    }
}

/// Validate a unique name: `:` followed by one or more `.`-separated
/// elements, each allowed to start with a digit and contain hyphens (the
/// bus daemon commonly encodes its connection counter this way, e.g.
/// `:1.42`).
pub(crate) fn validate_unique(name: &str) -> bool {
    if name.len() > MAX_NAME_LEN || !name.starts_with(':') {
        return false;
    }
    let rest = &name[1..];
    if rest.is_empty() {
        return false;
    }
    rest.split('.').all(|e| validate_element(e, true, true))
}
