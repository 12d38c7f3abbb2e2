//! DuckDB repository implementation
//!
//! This adapter is the encryption boundary: designated fields are encrypted
//! on save and decrypted on load, so nothing above this layer ever sees
//! ciphertext. Decrypt failures on stored ciphertext propagate - a financial
//! field that cannot be recovered fails the request rather than reading as
//! garbage.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{AuthProvider, Budget, Goal, Transaction, User};
use crate::migrations::MIGRATIONS;
use crate::ports::Repository;
use crate::services::cipher::FieldCipher;
use crate::services::migration::MigrationService;

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

fn db_err(e: duckdb::Error) -> Error {
    Error::database(e.to_string())
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    cipher: FieldCipher,
}

impl DuckDbRepository {
    /// Open (or create) the entity database.
    ///
    /// Includes retry logic with exponential backoff for file locking
    /// errors, which can occur when another process still holds the file.
    pub fn new(db_path: &Path, cipher: FieldCipher) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        cipher,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Disable extension autoloading; everything needed is statically linked
        let config = duckdb::Config::default()
            .enable_autoload_extension(false)
            .map_err(db_err)?;
        Connection::open_with_flags(db_path, config).map_err(db_err)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("connection lock poisoned: {}", e)))
    }

    // === Row codecs (the one place ciphertext exists) ===

    fn encode_user(&self, user: &User) -> Result<EncodedUser> {
        Ok(EncodedUser {
            name_enc: self.cipher.encrypt(&user.name)?,
            email_enc: self.cipher.encrypt(&user.email)?,
            refresh_tokens: serde_json::to_string(&user.refresh_tokens)?,
        })
    }

    fn decode_user(&self, row: &duckdb::Row) -> Result<User> {
        // Columns: 0 user_id, 1 name_enc, 2 email_enc, 3 password_hash,
        // 4 provider, 5 refresh_tokens, 6 reset_token_hash,
        // 7 reset_token_expires_at, 8 created_at, 9 updated_at
        let id_str: String = row.get(0).map_err(db_err)?;
        let name_enc: String = row.get(1).map_err(db_err)?;
        let email_enc: String = row.get(2).map_err(db_err)?;
        let tokens_json: String = row.get(5).map_err(db_err)?;

        Ok(User {
            id: Uuid::parse_str(&id_str)
                .map_err(|_| Error::database(format!("invalid user id: {}", id_str)))?,
            name: self.cipher.decrypt(&name_enc)?,
            email: self.cipher.decrypt(&email_enc)?,
            password_hash: row.get(3).ok(),
            provider: AuthProvider::parse(&row.get::<_, String>(4).unwrap_or_default()),
            refresh_tokens: serde_json::from_str(&tokens_json).unwrap_or_default(),
            reset_token_hash: row.get(6).ok(),
            reset_token_expires_at: row
                .get::<_, Option<String>>(7)
                .ok()
                .flatten()
                .and_then(|s| parse_datetime(&s)),
            created_at: parse_datetime(&row.get::<_, String>(8).unwrap_or_default())
                .unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.get::<_, String>(9).unwrap_or_default())
                .unwrap_or_else(Utc::now),
        })
    }

    fn decode_transaction(&self, row: &duckdb::Row) -> Result<Transaction> {
        // Columns: 0 transaction_id, 1 user_id, 2 amount_enc,
        // 3 description_enc, 4 transaction_date, 5 created_at, 6 updated_at
        let id_str: String = row.get(0).map_err(db_err)?;
        let user_str: String = row.get(1).map_err(db_err)?;
        let amount_enc: String = row.get(2).map_err(db_err)?;
        let description_enc: Option<String> = row.get(3).ok();

        Ok(Transaction {
            id: parse_uuid(&id_str)?,
            user_id: parse_uuid(&user_str)?,
            amount: self.cipher.decrypt_amount(&amount_enc)?,
            description: match description_enc {
                Some(enc) => Some(self.cipher.decrypt(&enc)?),
                None => None,
            },
            transaction_date: parse_date(&row.get::<_, String>(4).unwrap_or_default()),
            created_at: parse_datetime(&row.get::<_, String>(5).unwrap_or_default())
                .unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.get::<_, String>(6).unwrap_or_default())
                .unwrap_or_else(Utc::now),
        })
    }

    fn decode_budget(&self, row: &duckdb::Row) -> Result<Budget> {
        // Columns: 0 budget_id, 1 user_id, 2 category_enc, 3 limit_amount_enc,
        // 4 spent_amount_enc, 5 month, 6 created_at, 7 updated_at
        let id_str: String = row.get(0).map_err(db_err)?;
        let user_str: String = row.get(1).map_err(db_err)?;
        let category_enc: String = row.get(2).map_err(db_err)?;
        let limit_enc: String = row.get(3).map_err(db_err)?;
        let spent_enc: String = row.get(4).map_err(db_err)?;

        Ok(Budget {
            id: parse_uuid(&id_str)?,
            user_id: parse_uuid(&user_str)?,
            category: self.cipher.decrypt(&category_enc)?,
            limit_amount: self.cipher.decrypt_amount(&limit_enc)?,
            spent_amount: self.cipher.decrypt_amount(&spent_enc)?,
            month: row.get(5).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<_, String>(6).unwrap_or_default())
                .unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.get::<_, String>(7).unwrap_or_default())
                .unwrap_or_else(Utc::now),
        })
    }

    fn decode_goal(&self, row: &duckdb::Row) -> Result<Goal> {
        // Columns: 0 goal_id, 1 user_id, 2 name_enc, 3 target_amount_enc,
        // 4 current_amount_enc, 5 target_date, 6 created_at, 7 updated_at
        let id_str: String = row.get(0).map_err(db_err)?;
        let user_str: String = row.get(1).map_err(db_err)?;
        let name_enc: String = row.get(2).map_err(db_err)?;
        let target_enc: String = row.get(3).map_err(db_err)?;
        let current_enc: String = row.get(4).map_err(db_err)?;

        Ok(Goal {
            id: parse_uuid(&id_str)?,
            user_id: parse_uuid(&user_str)?,
            name: self.cipher.decrypt(&name_enc)?,
            target_amount: self.cipher.decrypt_amount(&target_enc)?,
            current_amount: self.cipher.decrypt_amount(&current_enc)?,
            target_date: row
                .get::<_, Option<String>>(5)
                .ok()
                .flatten()
                .map(|s| parse_date(&s)),
            created_at: parse_datetime(&row.get::<_, String>(6).unwrap_or_default())
                .unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.get::<_, String>(7).unwrap_or_default())
                .unwrap_or_else(Utc::now),
        })
    }
}

struct EncodedUser {
    name_enc: String,
    email_enc: String,
    refresh_tokens: String,
}

const USER_COLUMNS: &str = "user_id, name_enc, email_enc, password_hash, provider, \
     refresh_tokens, reset_token_hash, reset_token_expires_at, created_at, updated_at";

#[async_trait]
impl Repository for DuckDbRepository {
    // === Schema ===

    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()?;
        Ok(())
    }

    // === Users ===

    async fn add_user(&self, user: &User) -> Result<()> {
        let encoded = self.encode_user(user)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_users (user_id, name_enc, email_enc, password_hash, provider, \
             refresh_tokens, reset_token_hash, reset_token_expires_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id.to_string(),
                encoded.name_enc,
                encoded.email_enc,
                user.password_hash,
                user.provider.as_str(),
                encoded.refresh_tokens,
                user.reset_token_hash,
                user.reset_token_expires_at.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let encoded = self.encode_user(user)?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE sys_users SET name_enc = ?, email_enc = ?, password_hash = ?, \
                 provider = ?, refresh_tokens = ?, reset_token_hash = ?, \
                 reset_token_expires_at = ?, updated_at = ? WHERE user_id = ?",
                params![
                    encoded.name_enc,
                    encoded.email_enc,
                    user.password_hash,
                    user.provider.as_str(),
                    encoded.refresh_tokens,
                    user.reset_token_hash,
                    user.reset_token_expires_at.map(|t| t.to_rfc3339()),
                    user.updated_at.to_rfc3339(),
                    user.id.to_string(),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::not_found(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sys_users WHERE user_id = ?",
                USER_COLUMNS
            ))
            .map_err(db_err)?;

        let mut rows = stmt
            .query_map([id.to_string()], |row| Ok(self.decode_user(row)))
            .map_err(db_err)?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(db_err)??)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        // Email ciphertext carries a random nonce, so equality search in SQL
        // is impossible by construction. Load candidates and decrypt each
        // until a case-insensitive match is found. This scans the full user
        // table; a known scalability ceiling of encrypted-email lookup.
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM sys_users", USER_COLUMNS))
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| Ok(self.decode_user(row)))
            .map_err(db_err)?;

        for row in rows {
            let user = row.map_err(db_err)??;
            if user.email.eq_ignore_ascii_case(email) {
                return Ok(user);
            }
        }
        Err(Error::not_found(format!("no user with email {}", email)))
    }

    async fn find_by_reset_hash(&self, token_hash: &str) -> Result<Option<User>> {
        // The reset digest is a deterministic sha256, so this one CAN be an
        // indexed equality lookup.
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sys_users WHERE reset_token_hash = ?",
                USER_COLUMNS
            ))
            .map_err(db_err)?;

        let mut rows = stmt
            .query_map([token_hash], |row| Ok(self.decode_user(row)))
            .map_err(db_err)?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(db_err)??)),
            None => Ok(None),
        }
    }

    // === Transactions ===

    async fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        tx.validate()?;
        let amount_enc = self.cipher.encrypt_amount(tx.amount)?;
        let description_enc = match &tx.description {
            Some(desc) => Some(self.cipher.encrypt(desc)?),
            None => None,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_transactions (transaction_id, user_id, amount_enc, \
             description_enc, transaction_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                tx.id.to_string(),
                tx.user_id.to_string(),
                amount_enc,
                description_enc,
                tx.transaction_date.format("%Y-%m-%d").to_string(),
                tx.created_at.to_rfc3339(),
                tx.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_transactions_by_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT transaction_id, user_id, amount_enc, description_enc, \
                 transaction_date, created_at, updated_at \
                 FROM sys_transactions WHERE user_id = ? \
                 ORDER BY transaction_date DESC, created_at DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([user_id.to_string()], |row| Ok(self.decode_transaction(row)))
            .map_err(db_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(db_err)??);
        }
        Ok(transactions)
    }

    // === Budgets ===

    async fn add_budget(&self, budget: &Budget) -> Result<()> {
        budget.validate()?;
        let category_enc = self.cipher.encrypt(&budget.category)?;
        let limit_enc = self.cipher.encrypt_amount(budget.limit_amount)?;
        let spent_enc = self.cipher.encrypt_amount(budget.spent_amount)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_budgets (budget_id, user_id, category_enc, limit_amount_enc, \
             spent_amount_enc, month, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                budget.id.to_string(),
                budget.user_id.to_string(),
                category_enc,
                limit_enc,
                spent_enc,
                budget.month,
                budget.created_at.to_rfc3339(),
                budget.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_budget(&self, budget: &Budget) -> Result<()> {
        budget.validate()?;
        let category_enc = self.cipher.encrypt(&budget.category)?;
        let limit_enc = self.cipher.encrypt_amount(budget.limit_amount)?;
        let spent_enc = self.cipher.encrypt_amount(budget.spent_amount)?;

        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE sys_budgets SET category_enc = ?, limit_amount_enc = ?, \
                 spent_amount_enc = ?, month = ?, updated_at = ? WHERE budget_id = ?",
                params![
                    category_enc,
                    limit_enc,
                    spent_enc,
                    budget.month,
                    budget.updated_at.to_rfc3339(),
                    budget.id.to_string(),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::not_found(format!("budget {}", budget.id)));
        }
        Ok(())
    }

    async fn get_budgets_by_user(&self, user_id: Uuid) -> Result<Vec<Budget>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT budget_id, user_id, category_enc, limit_amount_enc, spent_amount_enc, \
                 month, created_at, updated_at FROM sys_budgets WHERE user_id = ? \
                 ORDER BY month DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([user_id.to_string()], |row| Ok(self.decode_budget(row)))
            .map_err(db_err)?;

        let mut budgets = Vec::new();
        for row in rows {
            budgets.push(row.map_err(db_err)??);
        }
        Ok(budgets)
    }

    // === Goals ===

    async fn add_goal(&self, goal: &Goal) -> Result<()> {
        goal.validate()?;
        let name_enc = self.cipher.encrypt(&goal.name)?;
        let target_enc = self.cipher.encrypt_amount(goal.target_amount)?;
        let current_enc = self.cipher.encrypt_amount(goal.current_amount)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_goals (goal_id, user_id, name_enc, target_amount_enc, \
             current_amount_enc, target_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                goal.id.to_string(),
                goal.user_id.to_string(),
                name_enc,
                target_enc,
                current_enc,
                goal.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                goal.created_at.to_rfc3339(),
                goal.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_goal(&self, goal: &Goal) -> Result<()> {
        goal.validate()?;
        let name_enc = self.cipher.encrypt(&goal.name)?;
        let target_enc = self.cipher.encrypt_amount(goal.target_amount)?;
        let current_enc = self.cipher.encrypt_amount(goal.current_amount)?;

        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE sys_goals SET name_enc = ?, target_amount_enc = ?, \
                 current_amount_enc = ?, target_date = ?, updated_at = ? WHERE goal_id = ?",
                params![
                    name_enc,
                    target_enc,
                    current_enc,
                    goal.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    goal.updated_at.to_rfc3339(),
                    goal.id.to_string(),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::not_found(format!("goal {}", goal.id)));
        }
        Ok(())
    }

    async fn get_goals_by_user(&self, user_id: Uuid) -> Result<Vec<Goal>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT goal_id, user_id, name_enc, target_amount_enc, current_amount_enc, \
                 target_date, created_at, updated_at FROM sys_goals WHERE user_id = ? \
                 ORDER BY created_at DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([user_id.to_string()], |row| Ok(self.decode_goal(row)))
            .map_err(db_err)?;

        let mut goals = Vec::new();
        for row in rows {
            goals.push(row.map_err(db_err)??);
        }
        Ok(goals)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| Error::database(format!("invalid uuid: {}", s)))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}
