use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::BootstrapConfig;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{
    DeleteUser, EditUser, LoginRequest, RefreshTokenRecord, RegisterUser, TokenPair, User,
    UserRole,
};
use crate::security::{PasswordHasher, TokenKind, TokenService};
use crate::validation::Validate;

/// Shared by every login failure so callers cannot tell which check rejected them.
pub const WRONG_CREDENTIALS: &str = "Wrong username or password";
const INVALID_TOKEN: &str = "Invalid or expired token.";

const USER_COLUMNS: &str = "id, name, username, email, password_hash, role, active";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        role: row.get(5)?,
        active: row.get(6)?,
    })
}

pub fn find_user(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn find_refresh_record(conn: &Connection, user_id: i64) -> AppResult<Option<RefreshTokenRecord>> {
    let record = conn
        .query_row(
            "SELECT user_id, jti, expires_at FROM refresh_tokens WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok(RefreshTokenRecord {
                    user_id: row.get(0)?,
                    jti: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

fn username_taken(conn: &Connection, username: &str, except_id: i64) -> AppResult<bool> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?1 AND id != ?2",
            params![username, except_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

fn email_taken(conn: &Connection, email: &str, except_id: i64) -> AppResult<bool> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM users WHERE email = ?1 AND id != ?2",
            params![email, except_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

pub fn login(
    db: &Database,
    hasher: &PasswordHasher,
    tokens: &TokenService,
    req: &LoginRequest,
) -> AppResult<TokenPair> {
    let wrong = || AppError::Unauthorized(WRONG_CREDENTIALS.to_string());

    // Looked up without holding the lock across password verification
    let user = {
        let conn = db.conn()?;
        find_user(&conn, &req.username)?
    };
    let Some(user) = user else {
        tracing::debug!(username = %req.username, "login for unknown user");
        return Err(wrong());
    };
    if !user.active {
        tracing::debug!(username = %user.username, "login for inactive user");
        return Err(wrong());
    }
    if !hasher.verify(&req.password, &user.password_hash) {
        tracing::debug!(username = %user.username, "login with wrong password");
        return Err(wrong());
    }

    let access_token = tokens.issue_access(&user.username)?;
    let refresh = tokens.issue_refresh(&user.username)?;

    let mut conn = db.conn()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", [user.id])?;
    tx.execute(
        "INSERT INTO refresh_tokens (user_id, jti, expires_at) VALUES (?1, ?2, ?3)",
        params![user.id, refresh.jti, refresh.expires_at.naive_utc()],
    )?;
    tx.commit()?;

    tracing::info!(username = %user.username, "user logged in");
    Ok(TokenPair {
        access_token,
        refresh_token: refresh.token,
    })
}

/// Mints a new access token for a refresh token that is still on the allow-list.
pub fn refresh(db: &Database, tokens: &TokenService, token: &str) -> AppResult<String> {
    let rejected = || AppError::Unauthorized(INVALID_TOKEN.to_string());
    let claims = tokens.decode(token, TokenKind::Refresh)?;

    let conn = db.conn()?;
    let user = match find_user(&conn, &claims.sub)? {
        Some(user) if user.active => user,
        _ => {
            tracing::debug!(username = %claims.sub, "refresh for missing or inactive user");
            return Err(rejected());
        }
    };

    match find_refresh_record(&conn, user.id)? {
        Some(record)
            if record.jti == claims.jti && record.expires_at > Utc::now().naive_utc() => {}
        _ => {
            tracing::debug!(username = %user.username, "refresh token not on allow-list");
            return Err(rejected());
        }
    }

    tokens.issue_access(&user.username)
}

/// Resolves the bearer of an access token and checks their role.
pub fn authorize(
    db: &Database,
    tokens: &TokenService,
    token: &str,
    allowed: &[UserRole],
) -> AppResult<User> {
    let claims = tokens.decode(token, TokenKind::Access)?;

    let conn = db.conn()?;
    let user = find_user(&conn, &claims.sub)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !user.active {
        tracing::debug!(username = %user.username, "inactive user presented a token");
        return Err(AppError::Unauthorized(INVALID_TOKEN.to_string()));
    }
    if !allowed.contains(&user.role) {
        tracing::debug!(username = %user.username, role = %user.role, "role not allowed");
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(user)
}

pub fn register(db: &Database, hasher: &PasswordHasher, req: &RegisterUser) -> AppResult<User> {
    let password_hash = hasher.hash(&req.password)?;

    let conn = db.conn()?;
    if username_taken(&conn, &req.username, 0)? {
        return Err(AppError::Conflict("Username already exists.".to_string()));
    }
    if email_taken(&conn, &req.email, 0)? {
        return Err(AppError::Conflict("Email already exists.".to_string()));
    }

    conn.execute(
        "INSERT INTO users (name, username, email, password_hash, role, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            req.name,
            req.username,
            req.email,
            password_hash,
            req.user_role,
            req.active
        ],
    )
    .map_err(|e| AppError::unique_or(e, "Username or email already exists."))?;

    tracing::info!(username = %req.username, role = %req.user_role, "user registered");
    Ok(User {
        id: conn.last_insert_rowid(),
        name: req.name.clone(),
        username: req.username.clone(),
        email: req.email.clone(),
        password_hash,
        role: req.user_role,
        active: req.active,
    })
}

/// Partial update. Changing the username or the password revokes the refresh token.
pub fn edit(db: &Database, hasher: &PasswordHasher, req: &EditUser) -> AppResult<User> {
    let new_hash = req
        .password
        .as_deref()
        .map(|password| hasher.hash(password))
        .transpose()?;

    let mut conn = db.conn()?;
    let tx = conn.transaction()?;

    let current = find_user(&tx, &req.username)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(new_username) = &req.new_username {
        if username_taken(&tx, new_username, current.id)? {
            return Err(AppError::Conflict("Username already exists.".to_string()));
        }
    }
    if let Some(email) = &req.email {
        if email_taken(&tx, email, current.id)? {
            return Err(AppError::Conflict("Email already exists.".to_string()));
        }
    }

    let username_changed = req
        .new_username
        .as_ref()
        .is_some_and(|name| *name != current.username);

    let updated = User {
        id: current.id,
        name: req.name.clone().unwrap_or(current.name),
        username: req.new_username.clone().unwrap_or(current.username),
        email: req.email.clone().unwrap_or(current.email),
        password_hash: new_hash.clone().unwrap_or(current.password_hash),
        role: req.user_role.unwrap_or(current.role),
        active: req.active.unwrap_or(current.active),
    };

    tx.execute(
        "UPDATE users SET name = ?1, username = ?2, email = ?3, password_hash = ?4, role = ?5, active = ?6
         WHERE id = ?7",
        params![
            updated.name,
            updated.username,
            updated.email,
            updated.password_hash,
            updated.role,
            updated.active,
            updated.id
        ],
    )
    .map_err(|e| AppError::unique_or(e, "Username or email already exists."))?;

    if username_changed || new_hash.is_some() {
        tx.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", [updated.id])?;
    }
    tx.commit()?;

    tracing::info!(username = %updated.username, "user updated");
    Ok(updated)
}

pub fn delete(db: &Database, req: &DeleteUser) -> AppResult<()> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;

    let user = find_user(&tx, &req.username)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tx.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", [user.id])?;
    tx.execute("DELETE FROM users WHERE id = ?1", [user.id])?;
    tx.commit()?;

    tracing::info!(username = %user.username, "user deleted");
    Ok(())
}

pub fn list(db: &Database) -> AppResult<Vec<User>> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Creates the first admin when the user table is empty and a bootstrap password is configured.
pub fn bootstrap_admin(
    db: &Database,
    hasher: &PasswordHasher,
    cfg: &BootstrapConfig,
) -> AppResult<Option<User>> {
    let count: i64 = db
        .conn()?
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(None);
    }

    let Some(password) = cfg.password.as_deref() else {
        tracing::warn!("no users exist and bootstrap.password is unset; nobody can log in");
        return Ok(None);
    };

    let request = RegisterUser {
        name: "Administrator".to_string(),
        email: cfg.email.clone(),
        username: cfg.username.clone(),
        password: password.to_string(),
        active: true,
        user_role: UserRole::Admin,
    };
    // The account must be able to pass the login checks it will face.
    request.validate()?;
    let admin = register(db, hasher, &request)?;

    tracing::warn!(
        username = %admin.username,
        "created bootstrap admin account, replace its password after first login"
    );
    Ok(Some(admin))
}
