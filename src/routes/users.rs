use axum::{
    extract::{Extension, Json, Path},
    response::Json as RespJson,
    routing::{get, post},
    Router,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::error::ApiError;
use crate::model::queries;
use crate::model::user::{
    conflicts_with, require_active, CreateUserRequest, NewUser, SignInRequest, SignedInUser,
    UpdateUserRequest, User,
};

// Same 404 body for unknown username and wrong password, so a caller can't
// tell which one failed.
const WRONG_CREDENTIALS: &str = "Wrong username or password";

pub fn users_router() -> Router {
    Router::new()
        .route("/", get(list_users).put(create_user))
        .route(
            "/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/signin", post(sign_in))
}

fn parse_id(raw: &str) -> Result<i32, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("The ID {raw} is invalid")))
}

/// GET / — every row, active and soft-deleted alike. No pagination.
async fn list_users(
    Extension(pool): Extension<PgPool>,
) -> Result<RespJson<Vec<User>>, ApiError> {
    let mut conn = pool.acquire().await?;

    let users = sqlx::query_as::<_, User>(queries::SELECT_ALL)
        .fetch_all(&mut *conn)
        .await?;

    Ok(RespJson(users))
}

/// GET /:id — point lookup. Soft-deleted rows are still returned here.
async fn get_user(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<String>,
) -> Result<RespJson<User>, ApiError> {
    let id = parse_id(&id)?;
    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(queries::SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User with ID {id} not found")))?;

    Ok(RespJson(user))
}

/// PUT / — create. Username and email are checked for conflicts before the
/// insert; the two lookups and the insert are separate round trips, so
/// concurrent creates with the same username can race past the check.
async fn create_user(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<RespJson<Value>, ApiError> {
    let mut new_user = payload.validate()?;
    let mut conn = pool.acquire().await?;

    let username_taken = sqlx::query_as::<_, User>(queries::SELECT_BY_USERNAME)
        .bind(&new_user.username)
        .fetch_optional(&mut *conn)
        .await?;
    if username_taken.is_some() {
        return Err(ApiError::Conflict(format!(
            "Username {} already exists",
            new_user.username
        )));
    }

    let email_taken = sqlx::query_as::<_, User>(queries::SELECT_BY_EMAIL)
        .bind(&new_user.email)
        .fetch_optional(&mut *conn)
        .await?;
    if email_taken.is_some() {
        return Err(ApiError::Conflict(format!(
            "Email {} already exists",
            new_user.email
        )));
    }

    // Hash at rest, same policy as update.
    new_user.password = hash(&new_user.password, DEFAULT_COST)?;

    let inserted = bind_user_fields(sqlx::query(queries::INSERT), &new_user)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Internal("User not added".to_string()));
    }

    tracing::info!(username = %new_user.username, "user created");
    Ok(RespJson(json!({ "msg": "User added successfully" })))
}

/// PATCH /:id — fallback-merge update. Fields absent from the body keep
/// their stored values; a supplied password is re-hashed.
async fn update_user(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<RespJson<Value>, ApiError> {
    let id = parse_id(&id)?;
    let mut conn = pool.acquire().await?;

    let existing = sqlx::query_as::<_, User>(queries::SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let existing = require_active(existing, id)?;

    if let Some(username) = payload.supplied_username() {
        let taken = sqlx::query_as::<_, User>(queries::SELECT_BY_USERNAME)
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?;
        if conflicts_with(taken.as_ref(), id) {
            return Err(ApiError::Conflict(format!(
                "Username {username} already exists"
            )));
        }
    }

    if let Some(email) = payload.supplied_email() {
        let taken = sqlx::query_as::<_, User>(queries::SELECT_BY_EMAIL)
            .bind(email)
            .fetch_optional(&mut *conn)
            .await?;
        if conflicts_with(taken.as_ref(), id) {
            return Err(ApiError::Conflict(format!("Email {email} already exists")));
        }
    }

    let password_hash = match payload.supplied_password() {
        Some(password) => Some(hash(password, DEFAULT_COST)?),
        None => None,
    };
    let merged = payload.merge_into(&existing, password_hash);

    let updated = bind_user_fields(sqlx::query(queries::UPDATE), &merged)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::Internal("User not updated".to_string()));
    }

    tracing::info!(id, "user updated");
    Ok(RespJson(json!({ "msg": "User updated successfully" })))
}

/// DELETE /:id — flips is_active to 0. An inactive row 404s, so a second
/// delete fails; the row itself is never removed.
async fn delete_user(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<String>,
) -> Result<RespJson<Value>, ApiError> {
    let id = parse_id(&id)?;
    let mut conn = pool.acquire().await?;

    let existing = sqlx::query_as::<_, User>(queries::SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    require_active(existing, id)?;

    let deleted = sqlx::query(queries::SOFT_DELETE)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::Internal("User not deleted".to_string()));
    }

    tracing::info!(id, "user soft-deleted");
    Ok(RespJson(json!({ "msg": "User deleted successfully" })))
}

/// POST /signin — bare credential check; no token is issued.
async fn sign_in(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<SignInRequest>,
) -> Result<RespJson<SignedInUser>, ApiError> {
    let (username, password) = match (payload.username, payload.password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            (username, password)
        }
        _ => {
            return Err(ApiError::Validation(
                "You must send Username and password".to_string(),
            ))
        }
    };

    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(queries::SELECT_BY_USERNAME)
        .bind(&username)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(WRONG_CREDENTIALS.to_string()))?;

    if !verify(&password, &user.password)? {
        return Err(ApiError::NotFound(WRONG_CREDENTIALS.to_string()));
    }

    tracing::info!(username = %user.username, "sign-in ok");
    Ok(RespJson(SignedInUser::from(user)))
}

fn bind_user_fields<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    user: &'q NewUser,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.lastname)
        .bind(&user.phonenumber)
        .bind(user.role_id)
        .bind(user.is_active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse() {
        assert_eq!(parse_id("42").unwrap(), 42);
    }

    #[test]
    fn non_numeric_id_is_a_validation_error() {
        let err = parse_id("abc").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.to_string(), "The ID abc is invalid");
    }

    #[test]
    fn unknown_user_and_bad_password_share_one_message() {
        let unknown = ApiError::NotFound(WRONG_CREDENTIALS.to_string());
        let mismatch = ApiError::NotFound(WRONG_CREDENTIALS.to_string());
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[test]
    fn bcrypt_round_trip() {
        let hashed = hash("hunter2", 4).unwrap();
        assert!(verify("hunter2", &hashed).unwrap());
        assert!(!verify("wrong", &hashed).unwrap());
    }
}
