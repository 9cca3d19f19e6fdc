//! Parsing of `ObjectId` values received as strings.

use bson::oid::ObjectId;

use crate::response::DomainError;

/// Parses a path or query parameter into an `ObjectId`.
///
/// On failure the error is a bad request carrying `message`, or
/// `"<name> is not a valid ObjectId"` when no message is given.
///
/// ```ignore
/// let store_id = parse_object_id("storeId", &raw_id, None)?;
/// ```
pub fn parse_object_id(name: &str, value: &str, message: Option<&str>) -> Result<ObjectId, DomainError> {
    ObjectId::parse_str(value).map_err(|err| {
        tracing::debug!(param = %name, value = %value, error = %err, "Invalid ObjectId parameter");

        match message {
            Some(message) => DomainError::bad_request(message),
            None => DomainError::bad_request(format!("{name} is not a valid ObjectId")),
        }
    })
}

/// Parses every string it can and counts the ones it cannot.
///
/// Invalid entries are logged and skipped, so the returned identifiers keep the relative
/// order of the valid inputs.
pub fn strings_to_object_ids<S: AsRef<str>>(values: &[S]) -> (Vec<ObjectId>, usize) {
    let mut ids = Vec::with_capacity(values.len());
    let mut errors = 0;

    for value in values {
        match ObjectId::parse_str(value.as_ref()) {
            Ok(id) => ids.push(id),
            Err(err) => {
                tracing::warn!(value = %value.as_ref(), error = %err, "Skipping invalid ObjectId");
                errors += 1;
            }
        }
    }

    (ids, errors)
}
