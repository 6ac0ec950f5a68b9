use crate::structs::{LabelId, NO_MATCH};

#[inline]
pub(crate) fn push_int(line: &mut String, value: impl itoa::Integer) {
    let mut buffer = itoa::Buffer::new();
    line.push_str(buffer.format(value));
}

/// Writes `label`, or the no-match marker.
#[inline]
pub(crate) fn push_label(line: &mut String, label: Option<LabelId>) {
    match label {
        Some(label) => push_int(line, label),
        None => push_int(line, NO_MATCH),
    }
}
