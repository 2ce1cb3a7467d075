use crate::model::{Id, named_variants};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const USER_NAME_MAX_LEN: usize = 100;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Citizen,
    Municipal,
}

named_variants!(Role as "role" {
    Citizen => "citizen",
    Municipal => "municipal",
});

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub role: Role,
    pub department: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreateUser {
    pub name: UserName,
    pub role: Role,
    pub department: Option<String>,
}

/// A user reference with the display name joined in.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserRef {
    pub id: Id<UserMarker>,
    pub name: UserName,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct AssigneeRef {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub department: Option<String>,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

impl From<&User> for AssigneeRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            department: user.department.clone(),
        }
    }
}

/// The authenticated user behind a request.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Caller {
    pub id: Id<UserMarker>,
    pub role: Role,
}

impl Caller {
    /// Authors may manage their own posts, municipal staff may manage any post.
    #[must_use]
    pub fn may_manage(self, author: Id<UserMarker>) -> bool {
        self.id == author || self.role == Role::Municipal
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The user name is invalid: {0:?}")]
pub struct InvalidUserNameError(String);

impl UserName {
    pub fn new(name: String) -> Result<Self, InvalidUserNameError> {
        let len = name.chars().count();
        if len > 0 && len <= USER_NAME_MAX_LEN && !name.trim().is_empty() {
            Ok(UserName(name))
        } else {
            Err(InvalidUserNameError(name))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserName::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"UserName"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        user::{Caller, Role, USER_NAME_MAX_LEN, UserName},
    };

    #[test]
    fn user_names_must_be_present_and_bounded() {
        assert!(UserName::new("Ada".to_owned()).is_ok());
        assert!(UserName::new(String::new()).is_err());
        assert!(UserName::new("   ".to_owned()).is_err());
        assert!(UserName::new("x".repeat(USER_NAME_MAX_LEN)).is_ok());
        assert!(UserName::new("x".repeat(USER_NAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn roles_parse_from_their_names() {
        assert_eq!("municipal".parse::<Role>(), Ok(Role::Municipal));
        assert_eq!(Role::Citizen.as_str(), "citizen");
        assert!("mayor".parse::<Role>().is_err());
    }

    #[test]
    fn only_authors_and_municipal_staff_may_manage() {
        let author = Id::from(1_u64);
        let other = Id::from(2_u64);

        let own = Caller {
            id: author,
            role: Role::Citizen,
        };
        let stranger = Caller {
            id: other,
            role: Role::Citizen,
        };
        let staff = Caller {
            id: other,
            role: Role::Municipal,
        };

        assert!(own.may_manage(author));
        assert!(!stranger.may_manage(author));
        assert!(staff.may_manage(author));
    }
}
