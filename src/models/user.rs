//! User and council member models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record for anyone who has signed in at least once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub is_admin: bool,
    pub is_council_member: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub council_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub council_department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Absent for records imported without a creation date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A user with an assigned council role and department.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CouncilMember {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub council_role: String,
    pub council_department: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TryFrom<User> for CouncilMember {
    type Error = User;

    /// Narrow a user to a council member. Hands the user back when it is not
    /// flagged as a member or lacks a role or department.
    fn try_from(user: User) -> Result<Self, Self::Error> {
        if !user.is_council_member {
            return Err(user);
        }
        match (&user.council_role, &user.council_department) {
            (Some(role), Some(department)) => Ok(CouncilMember {
                council_role: role.clone(),
                council_department: department.clone(),
                id: user.id,
                name: user.name,
                email: user.email,
                photo_url: user.photo_url,
                description: user.description,
            }),
            _ => Err(user),
        }
    }
}

/// Fields written when a user signs in for the first time.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub photo_url: String,
    pub is_admin: bool,
}

/// Request body for editing one's own profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for assigning a user to the council.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilAssignment {
    pub council_role: String,
    pub council_department: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".into(),
            name: "Tux".into(),
            email: "tux@example.org".into(),
            photo_url: String::new(),
            is_admin: false,
            is_council_member: true,
            council_role: Some("Secretary".into()),
            council_department: Some("Outreach".into()),
            description: None,
            created_at: None,
        }
    }

    #[test]
    fn test_council_member_requires_role_and_department() {
        let member = CouncilMember::try_from(user()).unwrap();
        assert_eq!(member.council_role, "Secretary");
        assert_eq!(member.council_department, "Outreach");

        let mut no_department = user();
        no_department.council_department = None;
        assert!(CouncilMember::try_from(no_department).is_err());

        let mut not_member = user();
        not_member.is_council_member = false;
        assert!(CouncilMember::try_from(not_member).is_err());
    }

    #[test]
    fn test_user_serializes_photo_url_key() {
        let value = serde_json::to_value(user()).unwrap();
        assert!(value.get("photoURL").is_some());
        assert_eq!(value["isCouncilMember"], true);
        assert!(value.get("createdAt").is_none());
    }
}
