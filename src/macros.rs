#![allow(unused_macros)]

/// Builds a `(owner, name, descriptor)` display string for method-scoped errors
///
/// ```rust, ignore
///  return Err(Error::DanglingLabel { method: method_id!(owner, method) });
/// ```
macro_rules! method_id {
    ($owner:expr, $method:expr) => {
        format!("{}.{}{}", $owner, $method.name, $method.desc)
    };
}

/// Wraps an error with the pass that produced it
///
/// ```rust, ignore
///  pass.apply(&mut set, &mut ctx).map_err(|e| transform_error!(pass.name(), e))?;
/// ```
macro_rules! transform_error {
    ($pass:expr, $err:expr) => {
        crate::Error::Transform {
            pass: $pass,
            source: Box::new($err),
        }
    };
}
