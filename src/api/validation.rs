//! Input validation for API requests.
//!
//! Validators return `Err(message)`; collect them into an `ApiError` with
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{LinkUserRequest, SyncOrganisationRequest};

lazy_static! {
    /// Identity provider ids such as `user_2abc` or `org_42`
    static ref EXTERNAL_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:.\-]*$").unwrap();

    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9]([a-zA-Z0-9\-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]*[a-zA-Z0-9])?)+$"
    ).unwrap();
}

pub fn validate_external_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("External id is required".to_string());
    }

    if id.len() > 255 {
        return Err("External id is too long (max 255 characters)".to_string());
    }

    if !EXTERNAL_ID_REGEX.is_match(id) {
        return Err("External id contains invalid characters".to_string());
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_organisation_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Organisation name is required".to_string());
    }

    if name.len() > 255 {
        return Err("Organisation name is too long (max 255 characters)".to_string());
    }

    Ok(())
}

/// The url is optional: an empty value falls back to a generated one.
pub fn validate_organisation_url(url: &str) -> Result<(), String> {
    if url.len() > 100 {
        return Err("Organisation url is too long (max 100 characters)".to_string());
    }

    Ok(())
}

pub fn validate_sync_request(request: &SyncOrganisationRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check(
            "external_organisation_id",
            validate_external_id(&request.external_organisation_id),
        )
        .check("name", validate_organisation_name(&request.name))
        .check("url", validate_organisation_url(&request.url));
    errors.finish()
}

pub fn validate_link_request(request: &LinkUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("external_user_id", validate_external_id(&request.external_user_id))
        .check("email", validate_email(&request.email));
    if let Some(name) = &request.name {
        if name.len() > 255 {
            errors.add("name", "Name is too long (max 255 characters)");
        }
    }
    errors.finish()
}
