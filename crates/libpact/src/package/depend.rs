//! Dependency expressions and the matcher deciding whether a package
//! satisfies one.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::version::vercmp;
use super::Package;

/// Version predicate of a dependency expression.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DepMod {
    /// Match any version.
    Any,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

/// A dependency expression: a package name plus an optional version
/// constraint, e.g. `openssl>=3.0`.
///
/// The same shape is used for `depends`, `provides`, `conflicts` and
/// `replaces` entries.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Depend {
    pub name: String,
    pub depmod: DepMod,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl Depend {
    pub fn new(name: &str) -> Depend {
        Depend {
            name: name.to_owned(),
            depmod: DepMod::Any,
            version: None,
            description: None,
        }
    }

    /// A copy of this expression with the version predicate erased. Used
    /// when the transaction runs with `NoDepVersion`.
    pub(crate) fn any_version(&self) -> Depend {
        Depend {
            name: self.name.clone(),
            depmod: DepMod::Any,
            version: None,
            description: self.description.clone(),
        }
    }

    /// Does the given version fulfill this expression's predicate?
    fn version_ok(&self, version: &str) -> bool {
        let want = match self.version.as_deref() {
            Some(v) => v,
            None => return true,
        };
        let cmp = vercmp(version, want);
        match self.depmod {
            DepMod::Any => true,
            DepMod::Eq => cmp == Ordering::Equal,
            DepMod::Ge => cmp != Ordering::Less,
            DepMod::Le => cmp != Ordering::Greater,
            DepMod::Gt => cmp == Ordering::Greater,
            DepMod::Lt => cmp == Ordering::Less,
        }
    }

    /// Literal match: the package's own name and version against this
    /// expression, ignoring provides.
    pub fn satisfied_literally(&self, pkg: &Package) -> bool {
        pkg.name == self.name && self.version_ok(&pkg.version)
    }

    /// Full match: literal first, then the package's provides entries.
    ///
    /// A versioned provide is compared with the provided version; an
    /// unversioned provide only matches an "any version" expression.
    pub fn satisfied_by(&self, pkg: &Package) -> bool {
        if self.satisfied_literally(pkg) {
            return true;
        }
        pkg.provides.iter().any(|prov| {
            if prov.name != self.name {
                return false;
            }
            match prov.version.as_deref() {
                Some(v) => self.version_ok(v),
                None => self.depmod == DepMod::Any,
            }
        })
    }
}

impl fmt::Display for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.depmod {
            DepMod::Any => return write!(f, "{}", self.name),
            DepMod::Eq => "=",
            DepMod::Ge => ">=",
            DepMod::Le => "<=",
            DepMod::Gt => ">",
            DepMod::Lt => "<",
        };
        write!(
            f,
            "{}{}{}",
            self.name,
            op,
            self.version.as_deref().unwrap_or("")
        )
    }
}

impl FromStr for Depend {
    type Err = std::convert::Infallible;

    /// Parse `name`, `name=ver`, `name>=ver`, `name<=ver`, `name>ver`,
    /// `name<ver`. An optional `: description` suffix is carried along.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (expr, description) = match s.split_once(": ") {
            Some((expr, desc)) => (expr.trim(), Some(desc.trim().to_owned())),
            None => (s.trim(), None),
        };

        let ops: [(&str, DepMod); 5] = [
            (">=", DepMod::Ge),
            ("<=", DepMod::Le),
            (">", DepMod::Gt),
            ("<", DepMod::Lt),
            ("=", DepMod::Eq),
        ];

        for (op, depmod) in ops {
            if let Some(idx) = expr.find(op) {
                let (name, rest) = expr.split_at(idx);
                return Ok(Depend {
                    name: name.to_owned(),
                    depmod,
                    version: Some(rest[op.len()..].to_owned()),
                    description,
                });
            }
        }

        Ok(Depend {
            name: expr.to_owned(),
            depmod: DepMod::Any,
            version: None,
            description,
        })
    }
}

// Dependencies travel through the db codecs in their string form.
impl Serialize for Depend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Depend {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::Package;

    fn pkg(name: &str, version: &str, provides: &[&str]) -> Package {
        let mut p = Package::synthetic(name, version);
        p.provides = provides.iter().map(|s| s.parse().unwrap()).collect();
        p
    }

    #[test]
    fn test_parse() {
        let dep: Depend = "curl>=7.19.4".parse().unwrap();
        assert_eq!(dep.name, "curl");
        assert_eq!(dep.depmod, DepMod::Ge);
        assert_eq!(dep.version.as_deref(), Some("7.19.4"));
        assert_eq!(dep.to_string(), "curl>=7.19.4");

        let dep: Depend = "sh".parse().unwrap();
        assert_eq!(dep.depmod, DepMod::Any);
        assert_eq!(dep.to_string(), "sh");
    }

    #[test]
    fn test_literal_match() {
        let p = pkg("curl", "7.20.0-1", &[]);
        assert!("curl".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!("curl>=7.19".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!"curl<7.19".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!"wget".parse::<Depend>().unwrap().satisfied_by(&p));
    }

    #[test]
    fn test_provides() {
        let p = pkg("mariadb", "10.1.0-1", &["mysql=5.5"]);
        assert!("mysql".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!("mysql>=5.0".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!"mysql>=5.6".parse::<Depend>().unwrap().satisfied_by(&p));

        // an unversioned provide only satisfies an any-version expression
        let p = pkg("mariadb", "10.1.0-1", &["mysql"]);
        assert!("mysql".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!"mysql>=5.0".parse::<Depend>().unwrap().satisfied_by(&p));
    }
}
