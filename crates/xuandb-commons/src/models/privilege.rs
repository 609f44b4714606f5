//! User privileges.
//!
//! A privilege is a small bitset. `ADMIN` is a sentinel bit outside the
//! common mask: a user holding it passes every privilege check, including
//! checks for privileges added in the future.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A bitset of user capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Privilege(u32);

impl Privilege {
    /// No privilege at all.
    pub const NONE: Privilege = Privilege(0);
    /// Allows debug operations; global only, has no effect on databases.
    pub const DEBUG: Privilege = Privilege(1);
    /// Allows reading data from a database.
    pub const READ: Privilege = Privilege(2);
    /// Allows writing data to a database.
    pub const WRITE: Privilege = Privilege(4);
    /// Mask of all common privileges, used for validation.
    pub const MASK: Privilege = Privilege(7);
    /// Sentinel implying all common privileges, present and future.
    pub const ADMIN: Privilege = Privilege(1 << 31);

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is present in `self`.
    pub const fn contains(self, other: Privilege) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the admin sentinel is set.
    pub const fn is_admin(self) -> bool {
        self.0 & Self::ADMIN.0 != 0
    }

    /// A privilege supplied by a client is valid when it is exactly `ADMIN`
    /// or a combination of the common privileges.
    pub const fn is_valid(self) -> bool {
        self.0 == Self::ADMIN.0 || self.0 & !Self::MASK.0 == 0
    }
}

impl BitOr for Privilege {
    type Output = Privilege;

    fn bitor(self, rhs: Privilege) -> Privilege {
        Privilege(self.0 | rhs.0)
    }
}

impl BitOrAssign for Privilege {
    fn bitor_assign(&mut self, rhs: Privilege) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Privilege {
    type Output = Privilege;

    fn bitand(self, rhs: Privilege) -> Privilege {
        Privilege(self.0 & rhs.0)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_admin() {
            return f.write_str("ADMIN");
        }

        let mut first = true;
        for (bit, name) in [
            (Privilege::DEBUG, "DEBUG"),
            (Privilege::READ, "READ"),
            (Privilege::WRITE, "WRITE"),
        ] {
            if self.contains(bit) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl FromStr for Privilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Privilege, String> {
        let mut v = Privilege::NONE;
        for part in s.split(',') {
            match part.trim().to_ascii_uppercase().as_str() {
                "" | "NONE" => {}
                "DEBUG" => v |= Privilege::DEBUG,
                "READ" => v |= Privilege::READ,
                "WRITE" => v |= Privilege::WRITE,
                "ADMIN" => v |= Privilege::ADMIN,
                other => return Err(format!("invalid privilege: {other}")),
            }
        }
        Ok(v)
    }
}

impl Serialize for Privilege {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Privilege {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Privilege, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// The privileges an operation requires of the calling user.
///
/// A zero `global` field means "no global requirement"; database entries are
/// still checked in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredPrivileges {
    pub global: Privilege,
    pub databases: HashMap<String, Privilege>,
}

impl RequiredPrivileges {
    /// A requirement on the global privilege only.
    pub fn global(p: Privilege) -> Self {
        RequiredPrivileges {
            global: p,
            databases: HashMap::new(),
        }
    }

    /// A requirement on a single database.
    pub fn database(name: impl Into<String>, p: Privilege) -> Self {
        RequiredPrivileges {
            global: Privilege::NONE,
            databases: HashMap::from([(name.into(), p)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        assert_eq!("READ".parse::<Privilege>().unwrap(), Privilege::READ);
        assert_eq!("admin".parse::<Privilege>().unwrap(), Privilege::ADMIN);
        assert_eq!("".parse::<Privilege>().unwrap(), Privilege::NONE);
        assert_eq!("none".parse::<Privilege>().unwrap(), Privilege::NONE);
    }

    #[test]
    fn test_parse_list() {
        let p = "read, write".parse::<Privilege>().unwrap();
        assert!(p.contains(Privilege::READ));
        assert!(p.contains(Privilege::WRITE));
        assert!(!p.contains(Privilege::DEBUG));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("root".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Privilege::ADMIN.to_string(), "ADMIN");
        assert_eq!((Privilege::READ | Privilege::WRITE).to_string(), "READ,WRITE");
        assert_eq!(Privilege::NONE.to_string(), "");
        assert_eq!(
            (Privilege::DEBUG | Privilege::READ | Privilege::WRITE).to_string(),
            "DEBUG,READ,WRITE"
        );
    }

    #[test]
    fn test_validity() {
        assert!(Privilege::ADMIN.is_valid());
        assert!((Privilege::READ | Privilege::WRITE).is_valid());
        assert!(Privilege::NONE.is_valid());
        assert!(!(Privilege::ADMIN | Privilege::READ).is_valid());
    }

    #[test]
    fn test_json_round_trip() {
        let p = Privilege::DEBUG | Privilege::WRITE;
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, r#""DEBUG,WRITE""#);
        let back: Privilege = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
    }
}
