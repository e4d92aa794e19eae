use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::ApiError;

/// A row of the `users` table. `is_active` is the 1/0 soft-delete flag;
/// the timestamps are managed by storage.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub phonenumber: String,
    pub role_id: i32,
    pub is_active: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.is_active != 0
    }
}

/// Validated insert/update values, by name. The password here is already
/// hashed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub phonenumber: String,
    pub role_id: i32,
    pub is_active: i32,
}

/// Create payload. Every field is optional at the deserialization layer so
/// a missing field yields the handler's own 400 instead of a body-rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub phonenumber: Option<String>,
    pub role_id: Option<i32>,
    pub is_active: Option<i32>,
}

impl CreateUserRequest {
    /// Enforces the six required fields (empty strings count as missing)
    /// and fills the defaults: phonenumber "" and is_active 1.
    pub fn validate(self) -> Result<NewUser, ApiError> {
        let required = |field: Option<String>| field.filter(|value| !value.is_empty());

        match (
            required(self.username),
            required(self.password),
            required(self.email),
            required(self.name),
            required(self.lastname),
            self.role_id,
        ) {
            (Some(username), Some(password), Some(email), Some(name), Some(lastname), Some(role_id)) => {
                Ok(NewUser {
                    username,
                    password,
                    email,
                    name,
                    lastname,
                    phonenumber: self.phonenumber.unwrap_or_default(),
                    role_id,
                    is_active: self.is_active.unwrap_or(1),
                })
            }
            _ => Err(ApiError::Validation("Missing information".to_string())),
        }
    }
}

/// Update payload: same fields as create, nothing required.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub phonenumber: Option<String>,
    pub role_id: Option<i32>,
    pub is_active: Option<i32>,
}

impl UpdateUserRequest {
    pub fn supplied_username(&self) -> Option<&str> {
        self.username.as_deref().filter(|value| !value.is_empty())
    }

    pub fn supplied_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|value| !value.is_empty())
    }

    pub fn supplied_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|value| !value.is_empty())
    }

    /// Fallback-merge: each absent or empty field keeps the existing row's
    /// value. `password_hash` is the already-hashed replacement, if any;
    /// otherwise the stored hash is kept as-is.
    pub fn merge_into(self, existing: &User, password_hash: Option<String>) -> NewUser {
        let keep = |new: Option<String>, old: &str| match new {
            Some(value) if !value.is_empty() => value,
            _ => old.to_string(),
        };

        NewUser {
            username: keep(self.username, &existing.username),
            password: password_hash.unwrap_or_else(|| existing.password.clone()),
            email: keep(self.email, &existing.email),
            name: keep(self.name, &existing.name),
            lastname: keep(self.lastname, &existing.lastname),
            phonenumber: keep(self.phonenumber, &existing.phonenumber),
            role_id: self.role_id.unwrap_or(existing.role_id),
            is_active: self.is_active.unwrap_or(existing.is_active),
        }
    }
}

/// True when a username/email lookup hit belongs to a different row than
/// the one being updated. A user's own current values are not conflicts.
pub fn conflicts_with(taken: Option<&User>, id: i32) -> bool {
    taken.map_or(false, |other| other.id != id)
}

/// Update and delete require an existing, active row; a missing or
/// soft-deleted row is not found.
pub fn require_active(existing: Option<User>, id: i32) -> Result<User, ApiError> {
    match existing {
        Some(user) if user.is_active() => Ok(user),
        _ => Err(ApiError::NotFound(format!("user with ID {id} not found"))),
    }
}

/// Sign-in payload. Both fields required, checked in the handler.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sign-in response: the user row with password and the storage timestamps
/// stripped.
#[derive(Debug, Serialize)]
pub struct SignedInUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub phonenumber: String,
    pub role_id: i32,
    pub is_active: i32,
}

impl From<User> for SignedInUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            lastname: user.lastname,
            phonenumber: user.phonenumber,
            role_id: user.role_id,
            is_active: user.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> CreateUserRequest {
        CreateUserRequest {
            username: Some("jdoe".into()),
            password: Some("hunter2".into()),
            email: Some("jdoe@example.com".into()),
            name: Some("John".into()),
            lastname: Some("Doe".into()),
            phonenumber: Some("555-0100".into()),
            role_id: Some(2),
            is_active: Some(1),
        }
    }

    fn existing_user() -> User {
        User {
            id: 7,
            username: "jdoe".into(),
            password: "$2b$12$stored-hash".into(),
            email: "jdoe@example.com".into(),
            name: "John".into(),
            lastname: "Doe".into(),
            phonenumber: "555-0100".into(),
            role_id: 2,
            is_active: 1,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn validate_accepts_a_complete_request() {
        let new_user = full_request().validate().unwrap();
        assert_eq!(new_user.username, "jdoe");
        assert_eq!(new_user.role_id, 2);
        assert_eq!(new_user.is_active, 1);
    }

    #[test]
    fn validate_rejects_each_missing_required_field() {
        let without = [
            CreateUserRequest { username: None, ..full_request() },
            CreateUserRequest { password: None, ..full_request() },
            CreateUserRequest { email: None, ..full_request() },
            CreateUserRequest { name: None, ..full_request() },
            CreateUserRequest { lastname: None, ..full_request() },
            CreateUserRequest { role_id: None, ..full_request() },
        ];
        for request in without {
            let err = request.validate().unwrap_err();
            assert_eq!(err.to_string(), "Missing information");
        }
    }

    #[test]
    fn validate_treats_empty_strings_as_missing() {
        let request = CreateUserRequest {
            username: Some(String::new()),
            ..full_request()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn validate_fills_defaults() {
        let request = CreateUserRequest {
            phonenumber: None,
            is_active: None,
            ..full_request()
        };
        let new_user = request.validate().unwrap();
        assert_eq!(new_user.phonenumber, "");
        assert_eq!(new_user.is_active, 1);
    }

    #[test]
    fn merge_with_empty_request_keeps_the_row_intact() {
        let existing = existing_user();
        let merged = UpdateUserRequest::default().merge_into(&existing, None);
        assert_eq!(
            merged,
            NewUser {
                username: existing.username.clone(),
                password: existing.password.clone(),
                email: existing.email.clone(),
                name: existing.name.clone(),
                lastname: existing.lastname.clone(),
                phonenumber: existing.phonenumber.clone(),
                role_id: existing.role_id,
                is_active: existing.is_active,
            }
        );
    }

    #[test]
    fn merge_overwrites_only_supplied_fields() {
        let existing = existing_user();
        let request = UpdateUserRequest {
            email: Some("new@example.com".into()),
            is_active: Some(0),
            ..Default::default()
        };
        let merged = request.merge_into(&existing, None);
        assert_eq!(merged.email, "new@example.com");
        assert_eq!(merged.is_active, 0);
        assert_eq!(merged.username, existing.username);
        assert_eq!(merged.password, existing.password);
    }

    #[test]
    fn merge_takes_the_new_password_hash_when_present() {
        let existing = existing_user();
        let request = UpdateUserRequest::default();
        let merged = request.merge_into(&existing, Some("$2b$12$fresh-hash".into()));
        assert_eq!(merged.password, "$2b$12$fresh-hash");
    }

    #[test]
    fn own_row_lookup_hit_is_not_a_conflict() {
        let existing = existing_user();
        assert!(!conflicts_with(Some(&existing), existing.id));
    }

    #[test]
    fn another_rows_lookup_hit_is_a_conflict() {
        let other = User {
            id: 99,
            ..existing_user()
        };
        assert!(conflicts_with(Some(&other), 7));
    }

    #[test]
    fn no_lookup_hit_is_no_conflict() {
        assert!(!conflicts_with(None, 7));
    }

    #[test]
    fn require_active_passes_an_active_row_through() {
        let user = require_active(Some(existing_user()), 7).unwrap();
        assert_eq!(user.id, 7);
    }

    #[test]
    fn require_active_rejects_a_missing_row() {
        let err = require_active(None, 7).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.to_string(), "user with ID 7 not found");
    }

    #[test]
    fn require_active_rejects_a_soft_deleted_row() {
        let deleted = User {
            is_active: 0,
            ..existing_user()
        };
        let err = require_active(Some(deleted), 7).unwrap_err();
        assert_eq!(err.to_string(), "user with ID 7 not found");
    }

    #[test]
    fn signed_in_user_carries_no_secret_or_timestamp_fields() {
        let value = serde_json::to_value(SignedInUser::from(existing_user())).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("password"));
        assert!(!object.contains_key("created_at"));
        assert!(!object.contains_key("updated_at"));
        assert_eq!(object["username"], "jdoe");
    }
}
