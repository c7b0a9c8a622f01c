use super::{AuthError, Identity, Permission};

/// Check that `identity` holds `permission`.
///
/// Called at every control-operation boundary before the engine is touched.
pub fn check_capability(identity: &Identity, permission: Permission) -> Result<(), AuthError> {
    if identity.has_permission(permission) {
        Ok(())
    } else {
        tracing::warn!(
            operator_id = %identity.user_id,
            permission = permission.as_str(),
            "Capability check failed"
        );
        Err(AuthError::Forbidden {
            operator_id: identity.user_id.clone(),
            permission,
        })
    }
}
