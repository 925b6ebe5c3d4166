use crate::error::FileOpError;

/// The one way a remote destination path is built: ensure the base ends with
/// `/`, then append the leaf.
pub fn join_remote(base: &str, leaf: &str) -> String {
    let mut joined = directory_prefix(base);
    joined.push_str(leaf);
    joined
}

pub fn directory_prefix(base: &str) -> String {
    let mut prefix = base.to_string();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

pub fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None if path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

pub fn validate_leaf(name: &str) -> Result<(), FileOpError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(FileOpError::Invalid(format!(
            "{:?} is not a valid entry name",
            name
        )));
    }
    Ok(())
}

pub fn validate_path(path: &str) -> Result<(), FileOpError> {
    if path.is_empty() || path.contains('\0') {
        return Err(FileOpError::Invalid(format!("{:?} is not a valid path", path)));
    }
    Ok(())
}
