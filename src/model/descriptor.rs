//! Field and method descriptor helpers.
//!
//! Descriptors are kept as strings in the model; these helpers split and measure them where
//! the codec and the passes need it.

use crate::Result;

/// Returns the end (exclusive) of the field type starting at `start`.
fn type_end(desc: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while desc.get(i) == Some(&b'[') {
        i += 1;
    }
    match desc.get(i)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => Some(i + 1),
        b'L' => desc[i..].iter().position(|&b| b == b';').map(|p| i + p + 1),
        _ => None,
    }
}

/// Splits a method descriptor into its argument types and its return type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
pub fn split_method(desc: &str) -> Result<(Vec<&str>, &str)> {
    let bytes = desc.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(malformed_error!("Invalid method descriptor '{}'", desc));
    }

    let mut args = Vec::new();
    let mut i = 1;
    while bytes.get(i) != Some(&b')') {
        let Some(end) = type_end(bytes, i) else {
            return Err(malformed_error!("Invalid method descriptor '{}'", desc));
        };
        args.push(&desc[i..end]);
        i = end;
    }

    match type_end(bytes, i + 1) {
        Some(end) if end == bytes.len() => Ok((args, &desc[i + 1..])),
        _ => Err(malformed_error!("Invalid method descriptor '{}'", desc)),
    }
}

/// Returns the number of stack or local slots a value of field type `desc` occupies.
#[must_use]
pub fn slots(desc: &str) -> u16 {
    match desc.as_bytes().first() {
        Some(b'J' | b'D') => 2,
        Some(b'V') | None => 0,
        _ => 1,
    }
}

/// Returns the slots taken by the arguments of a method descriptor, excluding `this`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
pub fn arg_slots(desc: &str) -> Result<u16> {
    let (args, _) = split_method(desc)?;
    Ok(args.iter().map(|arg| slots(arg)).sum())
}

/// Returns the slots taken by the return value of a method descriptor.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
pub fn return_slots(desc: &str) -> Result<u16> {
    let (_, ret) = split_method(desc)?;
    Ok(slots(ret))
}

/// Returns the internal name of an object type descriptor such as `Ljava/lang/String;`.
#[must_use]
pub fn object_name(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}

/// Returns `true` if `desc` is a well-formed field descriptor.
#[must_use]
pub fn is_field_desc(desc: &str) -> bool {
    desc != "V" && type_end(desc.as_bytes(), 0) == Some(desc.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split() {
        let (args, ret) = split_method("(I[JLjava/lang/String;[[Lx;D)V").unwrap();
        assert_eq!(args, vec!["I", "[J", "Ljava/lang/String;", "[[Lx;", "D"]);
        assert_eq!(ret, "V");

        let (args, ret) = split_method("()Ljava/lang/Object;").unwrap();
        assert!(args.is_empty());
        assert_eq!(ret, "Ljava/lang/Object;");
    }

    #[test]
    fn split_rejects_garbage() {
        assert!(split_method("I").is_err());
        assert!(split_method("(I").is_err());
        assert!(split_method("(Q)V").is_err());
        assert!(split_method("()VV").is_err());
        assert!(split_method("(Ljava/lang/String)V").is_err());
    }

    #[test]
    fn slot_counts() {
        assert_eq!(arg_slots("(IJDLx;)V").unwrap(), 1 + 2 + 2 + 1);
        assert_eq!(return_slots("()J").unwrap(), 2);
        assert_eq!(return_slots("()V").unwrap(), 0);
        assert_eq!(slots("[D"), 1);
    }

    #[test]
    fn object_names() {
        assert_eq!(object_name("Ljava/lang/String;"), Some("java/lang/String"));
        assert_eq!(object_name("[Ljava/lang/String;"), None);
        assert!(is_field_desc("[[I"));
        assert!(!is_field_desc("V"));
        assert!(!is_field_desc("II"));
    }
}
