//! Authorization decision for a resolved route.

use axum::http::StatusCode;

use crate::error::ErrorEntry;
use crate::routing::meta::Access;
use crate::security::auth::Caller;

/// Decide whether `caller` may invoke a route guarded by `access`.
///
/// `PermitAll` needs nobody, `DenyAll` refuses everybody (403), any other
/// policy needs a caller (401), and a role policy needs at least one of
/// the listed roles (403).
pub fn authorize(access: &Access, caller: Option<&Caller>) -> Result<(), ErrorEntry> {
    match access {
        Access::PermitAll => Ok(()),
        Access::DenyAll => Err(ErrorEntry::new(StatusCode::FORBIDDEN, "access denied to all callers")),
        Access::Authenticated | Access::AnyRole(_) => {
            let caller = caller.ok_or_else(|| ErrorEntry::new(StatusCode::UNAUTHORIZED, "authentication required"))?;
            match access {
                Access::AnyRole(roles) if !roles.iter().any(|r| caller.has_role(r)) => {
                    let required: Vec<&str> = roles.iter().map(String::as_str).collect();
                    Err(ErrorEntry::new(
                        StatusCode::FORBIDDEN,
                        format!("caller `{}` lacks any of the roles [{}]", caller.id, required.join(", ")),
                    ))
                }
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_check_is_or() {
        let access = Access::roles(["A", "B"]);
        assert!(authorize(&access, Some(&Caller::new("b", ["B"]))).is_ok());

        let denied = authorize(&access, Some(&Caller::new("carol", ["C"]))).unwrap_err();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert!(denied.message.contains("carol"));
        assert!(denied.message.contains("A, B"));
    }

    #[test]
    fn test_missing_caller_and_policies() {
        assert!(authorize(&Access::PermitAll, None).is_ok());
        assert_eq!(authorize(&Access::Authenticated, None).unwrap_err().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(authorize(&Access::roles(["A"]), None).unwrap_err().status(), StatusCode::UNAUTHORIZED);
        let admin = Caller::new("root", ["admin"]);
        assert_eq!(authorize(&Access::DenyAll, Some(&admin)).unwrap_err().status(), StatusCode::FORBIDDEN);
        assert!(authorize(&Access::Authenticated, Some(&admin)).is_ok());
    }
}
