use crate::server::response::ApiError;

const MAX_NAME_LEN: usize = 64;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.'
}

/// Satellite and group names end up as repository path components, so they
/// follow the OCI component rules.
fn validate_name(name: &str, entity: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{entity} name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("{entity} name cannot exceed {MAX_NAME_LEN} characters"));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(format!(
            "{entity} name can only contain lowercase letters, digits, hyphens, underscores, and periods"
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        return Err(format!(
            "{entity} name must start and end with a letter or digit"
        ));
    }
    Ok(())
}

/// Names that would be shadowed by a static route segment.
fn check_reserved(name: &str, entity: &str, reserved: &[&str]) -> Result<(), String> {
    if reserved.contains(&name) {
        return Err(format!("{entity} name '{name}' is reserved"));
    }
    Ok(())
}

pub fn validate_satellite_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Satellite")
        .and_then(|()| check_reserved(name, "Satellite", &["ztr"]))
        .map_err(ApiError::bad_request)
}

pub fn validate_group_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Group")
        .and_then(|()| check_reserved(name, "Group", &["list", "satellite", "images"]))
        .map_err(ApiError::bad_request)
}

pub fn validate_label_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Label")
        .and_then(|()| check_reserved(name, "Label", &["list", "satellite", "images"]))
        .map_err(ApiError::bad_request)
}
