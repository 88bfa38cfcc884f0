use bson::{Bson, Document};

use crate::common::{
    add_numbers, get_field, is_number, remove_field, set_field, type_name, DOC_ID,
    FIELD_SEPARATOR, UPDATE_INC, UPDATE_SET, UPDATE_UNSET,
};
use crate::errors::{ErrorKind, VellumError, VellumResult};

/// Applies an operator update to a document.
///
/// The update is applied to a copy and only committed when every operator
/// succeeds, so a failing update leaves `document` untouched. Returns whether
/// the document changed.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> VellumResult<bool> {
    if update.is_empty() {
        log::error!("Update specification is empty");
        return Err(VellumError::new(
            "Update specification must contain at least one operator",
            ErrorKind::InvalidOperation,
        ));
    }

    let mut updated = document.clone();
    for (operator, operand) in update {
        let Bson::Document(fields) = operand else {
            log::error!("{} expects a document, found {}", operator, type_name(operand));
            return Err(VellumError::new(
                &format!("{} expects a document of fields", operator),
                ErrorKind::InvalidOperand,
            ));
        };

        match operator.as_str() {
            UPDATE_SET => {
                for (path, value) in fields {
                    guard_identity(operator, path)?;
                    set_field(&mut updated, path, value.clone())?;
                }
            }
            UPDATE_INC => {
                for (path, amount) in fields {
                    guard_identity(operator, path)?;
                    let next = increment(path, get_field(&updated, path), amount)?;
                    set_field(&mut updated, path, next)?;
                }
            }
            UPDATE_UNSET => {
                for (path, _) in fields {
                    guard_identity(operator, path)?;
                    remove_field(&mut updated, path);
                }
            }
            other => {
                log::error!("Unsupported update operator {}", other);
                return Err(VellumError::new(
                    &format!("Unsupported update operator {}", other),
                    ErrorKind::InvalidOperation,
                ));
            }
        }
    }

    let modified = updated != *document;
    *document = updated;
    Ok(modified)
}

fn guard_identity(operator: &str, path: &str) -> VellumResult<()> {
    let root = path.split(FIELD_SEPARATOR).next().unwrap_or(path);
    if root == DOC_ID {
        log::error!("{} may not modify the immutable field {}", operator, DOC_ID);
        return Err(VellumError::new(
            &format!("{} may not modify the immutable field {}", operator, DOC_ID),
            ErrorKind::InvalidOperation,
        ));
    }
    Ok(())
}

fn increment(path: &str, current: Option<Bson>, amount: &Bson) -> VellumResult<Bson> {
    if !is_number(amount) {
        log::error!("Cannot increment {} by a {} value", path, type_name(amount));
        return Err(VellumError::new(
            &format!("Cannot increment {} by a non-numeric {} value", path, type_name(amount)),
            ErrorKind::TypeMismatch,
        ));
    }

    match current {
        None | Some(Bson::Null) => Ok(amount.clone()),
        Some(value) => add_numbers(&value, amount).ok_or_else(|| {
            log::error!("Cannot increment non-numeric field {} ({})", path, type_name(&value));
            VellumError::new(
                &format!(
                    "Cannot increment field {} holding a {} value",
                    path,
                    type_name(&value)
                ),
                ErrorKind::TypeMismatch,
            )
        }),
    }
}
