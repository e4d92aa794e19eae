//! The query catalog: every SQL statement the user handlers run. All
//! statements are parameterized; the insert/update bind order follows the
//! `NewUser` field order.

pub const SELECT_ALL: &str = "SELECT * FROM users";

pub const SELECT_BY_ID: &str = "SELECT * FROM users WHERE id = $1";

pub const SELECT_BY_USERNAME: &str = "SELECT * FROM users WHERE username = $1";

pub const SELECT_BY_EMAIL: &str = "SELECT * FROM users WHERE email = $1";

pub const INSERT: &str = "INSERT INTO users \
    (username, password, email, name, lastname, phonenumber, role_id, is_active) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

pub const UPDATE: &str = "UPDATE users SET \
    username = $1, password = $2, email = $3, name = $4, lastname = $5, \
    phonenumber = $6, role_id = $7, is_active = $8 \
    WHERE id = $9";

// Soft delete: the row is never removed, only flagged inactive.
pub const SOFT_DELETE: &str = "UPDATE users SET is_active = 0 WHERE id = $1";
