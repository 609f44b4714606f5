//! Authentication and privilege evaluation.

use subtle::ConstantTimeEq;
use xuandb_commons::{Privilege, RequiredPrivileges};

use crate::catalog::Catalog;
use crate::error::{MetaError, Result};

/// Authenticate `name`/`password` and check the required privileges.
///
/// While the catalog holds no users at all, every call succeeds: this is
/// the affordance that lets the first administrator be created on a fresh
/// cluster. An unknown user fails exactly like a wrong password, so user
/// names cannot be probed.
pub fn authenticate(
    catalog: &Catalog,
    name: &str,
    password: &str,
    required: &RequiredPrivileges,
) -> Result<()> {
    let (user, no_users) = catalog.lookup_for_auth(name);
    if no_users {
        return Ok(());
    }

    if name.is_empty() {
        return Err(MetaError::AuthRequired);
    }

    let Some(user) = user else {
        return Err(MetaError::PasswordMismatch);
    };

    if !bool::from(password.as_bytes().ct_eq(user.password.as_bytes())) {
        return Err(MetaError::PasswordMismatch);
    }

    if user.privilege.is_admin() {
        return Ok(());
    }

    // `required.global` may be zero, which trivially passes here while the
    // database requirements below still apply.
    if user.privilege & required.global != required.global {
        return Err(MetaError::InsufficientPrivileges);
    }

    for (db, &needed) in &required.databases {
        let db_priv = user.db_priv.get(db).copied().unwrap_or(Privilege::NONE);
        if (user.privilege | db_priv) & needed != needed {
            return Err(MetaError::InsufficientPrivileges);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xuandb_commons::User;

    fn catalog_with_users() -> Catalog {
        let catalog = Catalog::new();
        // first user becomes the system admin
        catalog.create_user(User::new("root", "rootpw")).unwrap();

        let mut reader = User::new("reader", "readerpw");
        reader.privilege = Privilege::READ;
        reader
            .db_priv
            .insert("metrics".to_string(), Privilege::WRITE);
        catalog.create_user(reader).unwrap();
        catalog
    }

    #[test]
    fn test_empty_catalog_allows_everything() {
        let catalog = Catalog::new();
        let required = RequiredPrivileges::global(Privilege::ADMIN);
        assert_eq!(authenticate(&catalog, "", "", &required), Ok(()));
        assert_eq!(authenticate(&catalog, "anyone", "x", &required), Ok(()));
    }

    #[test]
    fn test_credentials_required_once_users_exist() {
        let catalog = catalog_with_users();
        assert_eq!(
            authenticate(&catalog, "", "", &RequiredPrivileges::default()),
            Err(MetaError::AuthRequired)
        );
        // unknown user and wrong password are indistinguishable
        assert_eq!(
            authenticate(&catalog, "ghost", "x", &RequiredPrivileges::default()),
            Err(MetaError::PasswordMismatch)
        );
        assert_eq!(
            authenticate(&catalog, "root", "wrong", &RequiredPrivileges::default()),
            Err(MetaError::PasswordMismatch)
        );
    }

    #[test]
    fn test_password_round_trip() {
        let catalog = catalog_with_users();
        assert_eq!(
            authenticate(&catalog, "root", "rootpw", &RequiredPrivileges::default()),
            Ok(())
        );

        catalog.set_password("root", "changed").unwrap();
        assert_eq!(
            authenticate(&catalog, "root", "changed", &RequiredPrivileges::default()),
            Ok(())
        );
        assert_eq!(
            authenticate(&catalog, "root", "rootpw", &RequiredPrivileges::default()),
            Err(MetaError::PasswordMismatch)
        );
    }

    #[test]
    fn test_admin_satisfies_everything() {
        let catalog = catalog_with_users();
        let mut required = RequiredPrivileges::global(Privilege::ADMIN);
        required
            .databases
            .insert("anything".to_string(), Privilege::WRITE);
        assert_eq!(authenticate(&catalog, "root", "rootpw", &required), Ok(()));
    }

    #[test]
    fn test_global_privilege_check() {
        let catalog = catalog_with_users();
        assert_eq!(
            authenticate(
                &catalog,
                "reader",
                "readerpw",
                &RequiredPrivileges::global(Privilege::READ)
            ),
            Ok(())
        );
        assert_eq!(
            authenticate(
                &catalog,
                "reader",
                "readerpw",
                &RequiredPrivileges::global(Privilege::WRITE)
            ),
            Err(MetaError::InsufficientPrivileges)
        );
    }

    #[test]
    fn test_database_privileges_combine_with_global() {
        let catalog = catalog_with_users();

        // global READ plus db-level WRITE on "metrics"
        let required = RequiredPrivileges::database("metrics", Privilege::READ | Privilege::WRITE);
        assert_eq!(
            authenticate(&catalog, "reader", "readerpw", &required),
            Ok(())
        );

        // no WRITE grant on other databases
        let required = RequiredPrivileges::database("events", Privilege::WRITE);
        assert_eq!(
            authenticate(&catalog, "reader", "readerpw", &required),
            Err(MetaError::InsufficientPrivileges)
        );
    }

    #[test]
    fn test_zero_global_still_checks_databases() {
        let catalog = catalog_with_users();
        let required = RequiredPrivileges {
            global: Privilege::NONE,
            databases: [("events".to_string(), Privilege::WRITE)].into(),
        };
        assert_eq!(
            authenticate(&catalog, "reader", "readerpw", &required),
            Err(MetaError::InsufficientPrivileges)
        );
    }
}
