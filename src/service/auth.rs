use std::sync::Arc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use crate::core::config::StoreConfig;
use crate::core::error::ServiceError;
use crate::core::models::{TableRecord, User, UserType};
use crate::core::schema::{Table, DEFAULT_ID_FIELD};
use crate::core::storage::FlatRecordStore;
use crate::core::types::{format_flag, now_timestamp, Record};

const DIGEST_SCHEME: &str = "sha256";

/// 注册请求
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub full_name: String,
    pub user_type: UserType,
}

/// 口令比对结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Match,
    Mismatch,
    /// 存的不是摘要（历史遗留的明文口令），一律拒绝
    Legacy,
}

/// 生成 `sha256$<盐>$<摘要>` 形式的口令摘要
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    format!("{}${}${}", DIGEST_SCHEME, salt, digest(&salt, password))
}

pub fn verify_password(stored: &str, candidate: &str) -> PasswordCheck {
    let mut parts = stored.trim().splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(DIGEST_SCHEME), Some(salt), Some(expected)) => {
            if digest(salt, candidate) == expected {
                PasswordCheck::Match
            } else {
                PasswordCheck::Mismatch
            }
        }
        _ => PasswordCheck::Legacy,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// 注册与登录
///
/// 存储层不理解 password 列的含义，摘要与比对都在这里完成。
pub struct AuthService {
    store: Arc<FlatRecordStore>,
    config: Arc<StoreConfig>,
}

impl AuthService {
    pub fn new(store: Arc<FlatRecordStore>, config: Arc<StoreConfig>) -> Self {
        AuthService { store, config }
    }

    pub fn register(&self, registration: &Registration) -> Result<User, ServiceError> {
        let username = registration.username.trim();
        let email = registration.email.trim().to_ascii_lowercase();

        if username.chars().count() < self.config.username_min_length {
            return Err(ServiceError::Validation(format!(
                "用户名至少 {} 个字符",
                self.config.username_min_length
            )));
        }
        if registration.password.chars().count() < self.config.password_min_length {
            return Err(ServiceError::Validation(format!(
                "密码至少 {} 个字符",
                self.config.password_min_length
            )));
        }
        if !is_plausible_email(&email) {
            return Err(ServiceError::Validation(format!("邮箱格式错误: {}", email)));
        }

        let now = now_timestamp();
        let record = Record::new()
            .with("username", username)
            .with("password", hash_password(&registration.password))
            .with("email", email.as_str())
            .with("phone", registration.phone.trim())
            .with("user_type", registration.user_type.as_str())
            .with("full_name", registration.full_name.trim())
            .with("created_at", now.as_str())
            .with("updated_at", now.as_str())
            .with("is_active", format_flag(true));

        let table = Table::Users.name();
        let id = self.store.insert_checked(table, DEFAULT_ID_FIELD, &record, |existing| {
            if existing.iter().any(|r| email_matches(r, &email)) {
                return Err(ServiceError::Duplicate(format!("邮箱 {} 已注册", email)));
            }
            Ok(())
        })?;
        info!(user_id = %id, user_type = %registration.user_type, "用户已注册");

        self.store
            .find_typed::<User>(DEFAULT_ID_FIELD, &id)?
            .ok_or_else(|| ServiceError::not_found("user", &id))
    }

    /// 按邮箱和角色登录
    ///
    /// 邮箱不区分大小写，早于邮箱规范化写入的混合大小写账号也能登录。
    /// 账号不存在、角色不符、已停用、口令错误都返回同一个错误。
    pub fn login(&self, email: &str, password: &str, role: UserType) -> Result<User, ServiceError> {
        let email = email.trim();
        let Some(row) = self
            .store
            .read_all(User::TABLE.name())?
            .into_iter()
            .find(|r| email_matches(r, email))
        else {
            return Err(ServiceError::InvalidCredentials);
        };
        let user = User::from_record(&row)?;
        if user.user_type != role || !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }
        match verify_password(&user.password, password) {
            PasswordCheck::Match => Ok(user),
            PasswordCheck::Mismatch => Err(ServiceError::InvalidCredentials),
            PasswordCheck::Legacy => {
                warn!(user_id = %user.id, "账号仍保存明文口令，已拒绝登录，需要重置口令");
                Err(ServiceError::InvalidCredentials)
            }
        }
    }

    /// 重设口令，同时修复遗留的明文口令
    pub fn reset_password(&self, user_id: &str, new_password: &str) -> Result<(), ServiceError> {
        if new_password.chars().count() < self.config.password_min_length {
            return Err(ServiceError::Validation(format!(
                "密码至少 {} 个字符",
                self.config.password_min_length
            )));
        }
        let patch = Record::new().with("password", hash_password(new_password));
        if !self.store.update(User::TABLE.name(), DEFAULT_ID_FIELD, user_id, &patch)? {
            return Err(ServiceError::not_found("user", user_id));
        }
        Ok(())
    }

    pub fn set_active(&self, user_id: &str, active: bool) -> Result<(), ServiceError> {
        let patch = Record::new().with("is_active", format_flag(active));
        if !self.store.update(User::TABLE.name(), DEFAULT_ID_FIELD, user_id, &patch)? {
            return Err(ServiceError::not_found("user", user_id));
        }
        Ok(())
    }
}

fn email_matches(record: &Record, email: &str) -> bool {
    record
        .get("email")
        .map_or(false, |e| e.trim().eq_ignore_ascii_case(email.trim()))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}
