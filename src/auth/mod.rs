//! Authentication: credential checks, session tokens, tenant bootstrap
//! and user management.

pub mod password;
pub mod session_store;

use std::sync::{LazyLock, Mutex};

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::{Centre, Role, User};
use crate::validation::{ValidationError, Validator};

pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
pub use session_store::{generate_token, hash_token, AuthSession, SessionStore};

/// Verified against when the e-mail is unknown so both failure paths cost the same.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| hash_password("not-a-real-password"));

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid e-mail or password")]
    InvalidCredentials,
    #[error("E-mail address is already registered")]
    EmailTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for AuthError {
    fn from(err: rusqlite::Error) -> Self {
        AuthError::Database(DatabaseError::Sqlite(err))
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    pub expires_in_secs: u64,
}

/// Check credentials without touching the session store.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<User, AuthError> {
    match repository::get_user_by_email(conn, email)? {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        Some(_) => Err(AuthError::InvalidCredentials),
        None => {
            verify_password(password, &DUMMY_HASH);
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Verify credentials and issue a session token.
pub fn login(
    conn: &Connection,
    store: &Mutex<SessionStore>,
    email: &str,
    password: &str,
) -> Result<LoginOutcome, AuthError> {
    let user = match authenticate(conn, email, password) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Rejected login attempt");
            return Err(e);
        }
    };
    let mut sessions = store.lock().map_err(|_| AuthError::LockPoisoned)?;
    let token = sessions.issue(&user);
    tracing::info!(user_id = %user.id, centre_id = %user.centre_id, role = %user.role, "User logged in");
    Ok(LoginOutcome {
        token,
        expires_in_secs: sessions.ttl().as_secs(),
        user,
    })
}

pub fn logout(store: &Mutex<SessionStore>, token: &str) -> Result<bool, AuthError> {
    let mut sessions = store.lock().map_err(|_| AuthError::LockPoisoned)?;
    Ok(sessions.revoke(token))
}

// ═══════════════════════════════════════════════════════════
// Tenant bootstrap
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapRequest {
    pub centre_name: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// Create a centre together with its first admin, atomically.
pub fn bootstrap_centre(
    conn: &Connection,
    req: &BootstrapRequest,
) -> Result<(Centre, User), AuthError> {
    Validator::new()
        .required("centre_name", &req.centre_name)
        .required("admin_name", &req.admin_name)
        .email("admin_email", &req.admin_email)
        .check(
            "admin_password",
            req.admin_password.chars().count() >= MIN_PASSWORD_LEN,
            "must be at least 8 characters",
        )
        .finish()?;

    if repository::get_user_by_email(conn, &req.admin_email)?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let now = now_timestamp();
    let centre = Centre {
        id: Uuid::new_v4(),
        name: req.centre_name.trim().to_string(),
        created_at: now,
    };
    let admin = User {
        id: Uuid::new_v4(),
        centre_id: centre.id,
        name: req.admin_name.trim().to_string(),
        email: req.admin_email.trim().to_string(),
        role: Role::Admin,
        password_hash: hash_password(&req.admin_password),
        created_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    repository::insert_centre(&tx, &centre)?;
    repository::insert_user(&tx, &admin).map_err(email_taken)?;
    tx.commit()?;

    tracing::info!(centre_id = %centre.id, "Centre bootstrapped");
    Ok((centre, admin))
}

// ═══════════════════════════════════════════════════════════
// User management
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

pub fn create_user(conn: &Connection, centre_id: &Uuid, input: NewUser) -> Result<User, AuthError> {
    Validator::new()
        .required("name", &input.name)
        .email("email", &input.email)
        .check(
            "password",
            input.password.chars().count() >= MIN_PASSWORD_LEN,
            "must be at least 8 characters",
        )
        .finish()?;

    let user = User {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: input.name.trim().to_string(),
        email: input.email.trim().to_string(),
        role: input.role,
        password_hash: hash_password(&input.password),
        created_at: now_timestamp(),
    };
    repository::insert_user(conn, &user).map_err(email_taken)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User created");
    Ok(user)
}

/// Demoting the last admin of a centre is refused.
pub fn update_user(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    update: UserUpdate,
) -> Result<User, AuthError> {
    let mut user = repository::get_user(conn, centre_id, id)?.ok_or(AuthError::UserNotFound)?;

    if let Some(name) = update.name {
        user.name = name.trim().to_string();
    }
    if let Some(email) = update.email {
        user.email = email.trim().to_string();
    }
    if let Some(role) = update.role {
        if user.role == Role::Admin
            && role != Role::Admin
            && repository::count_users_with_role(conn, centre_id, Role::Admin)? <= 1
        {
            return Err(AuthError::Forbidden("A centre must keep at least one admin".into()));
        }
        user.role = role;
    }

    Validator::new()
        .required("name", &user.name)
        .email("email", &user.email)
        .finish()?;

    repository::update_user(conn, &user).map_err(email_taken)?;
    Ok(user)
}

/// Self-service password change; the current password must match.
pub fn change_password(
    conn: &Connection,
    centre_id: &Uuid,
    user_id: &Uuid,
    current: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let user = repository::get_user(conn, centre_id, user_id)?.ok_or(AuthError::UserNotFound)?;
    if !verify_password(current, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }
    set_password(conn, centre_id, user_id, new_password)
}

/// Admin reset, no current password needed.
pub fn set_password(
    conn: &Connection,
    centre_id: &Uuid,
    user_id: &Uuid,
    new_password: &str,
) -> Result<(), AuthError> {
    Validator::new()
        .check(
            "password",
            new_password.chars().count() >= MIN_PASSWORD_LEN,
            "must be at least 8 characters",
        )
        .finish()?;
    repository::set_user_password(conn, centre_id, user_id, &hash_password(new_password))
        .map_err(not_found_as_user)?;
    Ok(())
}

/// Users cannot delete themselves and the last admin cannot be removed.
pub fn delete_user(
    conn: &Connection,
    centre_id: &Uuid,
    acting_user: &Uuid,
    id: &Uuid,
) -> Result<(), AuthError> {
    if acting_user == id {
        return Err(AuthError::Forbidden("You cannot delete your own account".into()));
    }
    let user = repository::get_user(conn, centre_id, id)?.ok_or(AuthError::UserNotFound)?;
    if user.role == Role::Admin && repository::count_users_with_role(conn, centre_id, Role::Admin)? <= 1 {
        return Err(AuthError::Forbidden("A centre must keep at least one admin".into()));
    }
    repository::delete_user(conn, centre_id, id).map_err(not_found_as_user)?;
    Ok(())
}

fn email_taken(err: DatabaseError) -> AuthError {
    match err {
        DatabaseError::ConstraintViolation(_) => AuthError::EmailTaken,
        other => AuthError::Database(other),
    }
}

fn not_found_as_user(err: DatabaseError) -> AuthError {
    match err {
        DatabaseError::NotFound { .. } => AuthError::UserNotFound,
        other => AuthError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::db::repository::test_support::seed_centre;
    use crate::db::sqlite::open_memory_database;

    fn bootstrap(conn: &Connection) -> (Centre, User) {
        bootstrap_centre(
            conn,
            &BootstrapRequest {
                centre_name: "Harbour Physio".into(),
                admin_name: "Anna Admin".into(),
                admin_email: "anna@clinic.test".into(),
                admin_password: "harbour-2026".into(),
            },
        )
        .unwrap()
    }

    fn store() -> Mutex<SessionStore> {
        Mutex::new(SessionStore::new(Duration::from_secs(3600)))
    }

    #[test]
    fn bootstrap_then_login() {
        let conn = open_memory_database().unwrap();
        let (centre, admin) = bootstrap(&conn);
        assert_eq!(admin.role, Role::Admin);

        let store = store();
        let outcome = login(&conn, &store, "ANNA@clinic.test", "harbour-2026").unwrap();
        assert_eq!(outcome.user.centre_id, centre.id);
        assert_eq!(outcome.expires_in_secs, 3600);

        let session = store.lock().unwrap().validate(&outcome.token).unwrap();
        assert_eq!(session.user_id, admin.id);
        assert!(logout(&store, &outcome.token).unwrap());
        assert!(store.lock().unwrap().validate(&outcome.token).is_none());
    }

    #[test]
    fn unknown_email_and_wrong_password_look_the_same() {
        let conn = open_memory_database().unwrap();
        bootstrap(&conn);
        let store = store();

        let a = login(&conn, &store, "nobody@clinic.test", "harbour-2026").unwrap_err();
        let b = login(&conn, &store, "anna@clinic.test", "wrong-password").unwrap_err();
        assert!(matches!(a, AuthError::InvalidCredentials));
        assert!(matches!(b, AuthError::InvalidCredentials));
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn bootstrap_rejects_taken_email_and_weak_password() {
        let conn = open_memory_database().unwrap();
        bootstrap(&conn);

        let taken = bootstrap_centre(
            &conn,
            &BootstrapRequest {
                centre_name: "Other".into(),
                admin_name: "Other".into(),
                admin_email: "anna@clinic.test".into(),
                admin_password: "long-enough".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(taken, AuthError::EmailTaken));

        let weak = bootstrap_centre(
            &conn,
            &BootstrapRequest {
                centre_name: "".into(),
                admin_name: "Bo".into(),
                admin_email: "bo@clinic.test".into(),
                admin_password: "short".into(),
            },
        )
        .unwrap_err();
        match weak {
            AuthError::Validation(v) => {
                assert!(v.has_field("centre_name"));
                assert!(v.has_field("admin_password"));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn last_admin_is_protected() {
        let conn = open_memory_database().unwrap();
        let (centre, admin) = bootstrap(&conn);
        let other = create_user(
            &conn,
            &centre.id,
            NewUser {
                name: "Rita Reception".into(),
                email: "rita@clinic.test".into(),
                role: Role::Receptionist,
                password: "front-desk-1".into(),
            },
        )
        .unwrap();

        let demote = update_user(
            &conn,
            &centre.id,
            &admin.id,
            UserUpdate { role: Some(Role::Therapist), ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(demote, AuthError::Forbidden(_)));

        let remove = delete_user(&conn, &centre.id, &other.id, &admin.id).unwrap_err();
        assert!(matches!(remove, AuthError::Forbidden(_)));

        let own = delete_user(&conn, &centre.id, &admin.id, &admin.id).unwrap_err();
        assert!(matches!(own, AuthError::Forbidden(_)));

        delete_user(&conn, &centre.id, &admin.id, &other.id).unwrap();
    }

    #[test]
    fn change_password_requires_current() {
        let conn = open_memory_database().unwrap();
        let (centre, admin) = bootstrap(&conn);

        let err = change_password(&conn, &centre.id, &admin.id, "nope", "new-password-1").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        change_password(&conn, &centre.id, &admin.id, "harbour-2026", "new-password-1").unwrap();
        authenticate(&conn, "anna@clinic.test", "new-password-1").unwrap();
    }

    #[test]
    fn users_are_scoped_to_centre() {
        let conn = open_memory_database().unwrap();
        let (_centre, admin) = bootstrap(&conn);
        let elsewhere = seed_centre(&conn, "Elsewhere");
        let err = update_user(&conn, &elsewhere, &admin.id, UserUpdate::default()).unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
