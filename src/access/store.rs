//! 用户访问记录存储
//!
//! 所有写操作都是带前置条件的单语句更新，避免并发请求下的读改写丢失

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::types::{AccessTier, UserAccessRecord};

/// 访问控制存储
///
/// 管理员身份在本层判定：管理员永远放行且不消耗配额
pub struct AccessStore {
    /// SQLite 连接池
    pool: Pool<SqliteConnectionManager>,
    /// 管理员用户ID
    admin_id: i64,
    /// 新用户初始配额
    initial_credits: i64,
}

impl AccessStore {
    /// 打开（或创建）用户数据库
    pub fn open(db_path: &Path, admin_id: i64, initial_credits: i64) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建数据库目录失败: {:?}", parent))?;
        }

        // WAL + busy_timeout：多连接并发写时等待而不是直接报错
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .context("创建数据库连接池失败")?;

        let store = Self {
            pool,
            admin_id,
            initial_credits,
        };
        store.init_tables()?;

        info!("用户数据库就绪: {:?}", db_path);
        Ok(store)
    }

    /// 初始化表结构
    fn init_tables(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                credits INTEGER NOT NULL,
                expiry_date INTEGER NOT NULL DEFAULT 0,
                is_banned INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )?;
        Ok(())
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// 获取用户记录，不存在时懒创建
    pub fn get_or_create(&self, user_id: i64) -> Result<UserAccessRecord> {
        let conn = self.pool.get()?;

        // INSERT OR IGNORE 保证并发首次引用也只建一条
        conn.execute(
            "INSERT OR IGNORE INTO users (id, credits, expiry_date, is_banned) VALUES (?1, ?2, 0, 0)",
            params![user_id, self.initial_credits],
        )?;

        let record = conn.query_row(
            "SELECT id, credits, expiry_date, is_banned FROM users WHERE id = ?1",
            params![user_id],
            Self::map_record,
        )?;
        Ok(record)
    }

    /// 查询用户记录（不创建）
    pub fn get(&self, user_id: i64) -> Result<Option<UserAccessRecord>> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                "SELECT id, credits, expiry_date, is_banned FROM users WHERE id = ?1",
                params![user_id],
                Self::map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// 评估用户访问等级
    ///
    /// 优先级：管理员 > 封禁 > 会员 > 免费配额 > 过期
    pub fn evaluate(&self, user_id: i64) -> Result<(bool, AccessTier)> {
        if user_id == self.admin_id {
            return Ok((true, AccessTier::Admin));
        }

        let record = self.get_or_create(user_id)?;
        if record.is_banned {
            return Ok((false, AccessTier::Banned));
        }
        if record.expiry_date > Self::now() {
            return Ok((true, AccessTier::Premium));
        }
        if record.credits > 0 {
            return Ok((true, AccessTier::Free));
        }
        Ok((false, AccessTier::Expired))
    }

    /// 消耗一点配额
    ///
    /// 管理员永远成功且不扣减。其余用户以 `credits > 0` 为前置条件原子扣减，
    /// 返回是否扣减成功；并发竞争下配额永不为负
    pub fn consume_credit(&self, user_id: i64) -> Result<bool> {
        if user_id == self.admin_id {
            return Ok(true);
        }

        self.get_or_create(user_id)?;
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET credits = credits - 1 WHERE id = ?1 AND credits > 0",
            params![user_id],
        )?;

        debug!("消耗配额: user={}, success={}", user_id, changed == 1);
        Ok(changed == 1)
    }

    /// 授予会员时长（秒），返回新的到期时间
    ///
    /// 会员期内为叠加延长，否则从当前时间起算；同时解除封禁
    pub fn grant(&self, user_id: i64, duration_secs: i64) -> Result<i64> {
        self.get_or_create(user_id)?;

        let now = Self::now();
        let conn = self.pool.get()?;
        let new_expiry: i64 = conn.query_row(
            r#"
            UPDATE users
            SET expiry_date = CASE WHEN expiry_date > ?2 THEN expiry_date + ?3 ELSE ?2 + ?3 END,
                is_banned = 0
            WHERE id = ?1
            RETURNING expiry_date
            "#,
            params![user_id, now, duration_secs],
            |row| row.get(0),
        )?;

        info!("授予会员: user={}, 到期时间={}", user_id, new_expiry);
        Ok(new_expiry)
    }

    /// 撤销全部权限：封禁 + 清零配额 + 清零会员
    ///
    /// 比单纯封禁更强，之后解封也是从零开始
    pub fn revoke(&self, user_id: i64) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET is_banned = 1, credits = 0, expiry_date = 0 WHERE id = ?1",
            params![user_id],
        )?;

        info!("撤销权限: user={}", user_id);
        Ok(())
    }

    /// 设置封禁标记，不影响配额和会员时间
    pub fn set_banned(&self, user_id: i64, banned: bool) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET is_banned = ?2 WHERE id = ?1",
            params![user_id, banned as i64],
        )?;
        Ok(())
    }

    /// 列出用户（按ID升序，限制条数）
    pub fn list_users(&self, limit: usize) -> Result<Vec<UserAccessRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, credits, expiry_date, is_banned FROM users ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::map_record)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// 用户总数
    pub fn count_users(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccessRecord> {
        Ok(UserAccessRecord {
            id: row.get(0)?,
            credits: row.get(1)?,
            expiry_date: row.get(2)?,
            is_banned: row.get::<_, i64>(3)? != 0,
        })
    }
}
