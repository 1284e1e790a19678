use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use crate::core::error::StoreError;
use crate::core::models::TableRecord;
use crate::core::schema::{canonical_fields, validate_table_name, UPDATED_AT_FIELD};
use crate::core::types::{next_timestamp, now_timestamp, Record};
use super::codec::{self, Decoded};

/// 以一表一文件的形式保存记录的存储
///
/// 读操作不加锁：整表重写通过临时文件加原子重命名完成，
/// 读者看到的要么是旧文件要么是新文件。
/// 写操作（追加、更新、删除、分配ID）按表串行化，避免丢失更新和重复ID。
///
/// 已知限制：追加过程中进程崩溃可能留下残缺的最后一行，
/// 下次读取时该行会因列数不匹配被跳过；之后的追加会先补齐换行符。
pub struct FlatRecordStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FlatRecordStore {
    /// 打开数据目录，不存在则创建
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .map_err(|e| StoreError::io(&base_dir.display().to_string(), "open", e))?;
        info!(data_dir = %base_dir.display(), "记录存储已打开");
        Ok(FlatRecordStore {
            base_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // 获取表文件路径
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.base_dir.join(format!("{}.csv", table))
    }

    // 获取表的写锁，首次访问时创建
    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // 加载整张表；文件不存在时返回 None
    fn load(&self, table: &str) -> Result<Option<Decoded>, StoreError> {
        validate_table_name(table)?;
        let path = self.table_path(table);
        match fs::read(&path) {
            Ok(bytes) => codec::decode(table, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(table, "read", e)),
        }
    }

    // 只读取文件首行作为表头；文件不存在或为空时返回 None
    fn load_header(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
        let file = match fs::File::open(self.table_path(table)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(table, "read", e)),
        };
        let mut first_line = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut first_line)
            .map_err(|e| StoreError::io(table, "read", e))?;
        let header = codec::decode_header(table, &first_line)?;
        Ok(if header.is_empty() { None } else { Some(header) })
    }

    /// 按文件顺序返回所有记录；文件不存在时返回空
    pub fn read_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        debug!(table, "read_all");
        Ok(self.load(table)?.map(|d| d.records).unwrap_or_default())
    }

    /// 第一条匹配的记录（按文件顺序），值去除首尾空白后比较
    pub fn find_one(&self, table: &str, field: &str, value: &str) -> Result<Option<Record>, StoreError> {
        debug!(table, field, value, "find_one");
        Ok(self
            .read_all(table)?
            .into_iter()
            .find(|r| r.matches(field, value)))
    }

    /// 所有匹配的记录，保持文件顺序
    pub fn find_all(&self, table: &str, field: &str, value: &str) -> Result<Vec<Record>, StoreError> {
        debug!(table, field, value, "find_all");
        Ok(self
            .read_all(table)?
            .into_iter()
            .filter(|r| r.matches(field, value))
            .collect())
    }

    /// 当前表头：文件中的表头，否则为规范列
    pub fn header(&self, table: &str) -> Result<Vec<String>, StoreError> {
        validate_table_name(table)?;
        Ok(match self.load_header(table)? {
            Some(header) => header,
            None => canonical_fields(table)
                .map(|fields| fields.iter().map(|f| f.to_string()).collect())
                .unwrap_or_default(),
        })
    }

    /// 追加一条记录，不改动已有行
    ///
    /// 新文件先写表头：已知表用规范列，其他表用记录自身的列顺序。
    pub fn append(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let lock = self.table_lock(table);
        let _guard = lock.lock();
        self.append_locked(table, record)
    }

    fn append_locked(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        if record.is_empty() {
            return Err(StoreError::Validation(format!("不能向表 {} 追加空记录", table)));
        }

        let (header, is_new) = match self.load_header(table)? {
            Some(header) => (header, false),
            None => {
                let header = match canonical_fields(table) {
                    Some(fields) => fields.iter().map(|f| f.to_string()).collect(),
                    None => record.keys().map(str::to_string).collect(),
                };
                (header, true)
            }
        };
        ensure_columns(table, &header, record)?;

        let values = record.values_in(&header);
        let mut bytes = if is_new {
            codec::encode_rows(table, "append", [header.clone(), values])?
        } else {
            codec::encode_rows(table, "append", [values])?
        };

        let path = self.table_path(table);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(table, "append", e))?;
        if is_new {
            // 可能是残留的空文件
            file.set_len(0).map_err(|e| StoreError::io(table, "append", e))?;
        } else if !ends_with_newline(&mut file).map_err(|e| StoreError::io(table, "append", e))? {
            // 手工编辑或上次追加中断留下的最后一行没有换行符
            warn!(table, "表文件末尾缺少换行符，追加前补齐");
            bytes.insert(0, b'\n');
        }
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| StoreError::io(table, "append", e))?;

        debug!(table, new_file = is_new, "append");
        Ok(())
    }

    /// 分配ID并追加，两步在同一把表锁内完成，返回分配的ID
    pub fn insert(&self, table: &str, id_field: &str, record: &Record) -> Result<String, StoreError> {
        self.insert_checked(table, id_field, record, |_| Ok::<(), StoreError>(()))
    }

    /// 与 [`FlatRecordStore::insert`] 相同，但先在表锁内用现有记录执行检查
    ///
    /// 检查失败时不写入任何内容。调用方借此实现"不存在才插入"的约束，
    /// 检查与写入之间不会插进其他写者。
    pub fn insert_checked<F, E>(&self, table: &str, id_field: &str, record: &Record, check: F) -> Result<String, E>
    where
        F: FnOnce(&[Record]) -> Result<(), E>,
        E: From<StoreError>,
    {
        validate_table_name(table)?;
        require_field_name(id_field)?;
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let existing = self.read_all(table)?;
        check(&existing)?;
        let id = next_unused_id(&existing, id_field)?;

        let mut row = Record::new().with(id_field, id.clone());
        for (key, value) in record.iter().filter(|(k, _)| *k != id_field) {
            row.set(key, value);
        }
        self.append_locked(table, &row)?;
        debug!(table, id = %id, "insert");
        Ok(id)
    }

    /// 字段级合并更新第一条匹配的记录，并刷新 updated_at
    ///
    /// 没有匹配记录时什么也不做，返回 false。
    /// 补丁修改标识列时，新值不能为空，也不能与其他记录重复。
    pub fn update(&self, table: &str, id_field: &str, id_value: &str, patch: &Record) -> Result<bool, StoreError> {
        self.update_with(table, id_field, id_value, |_| Ok::<_, StoreError>(Some(patch.clone())))
    }

    /// 与 [`FlatRecordStore::update`] 相同，但补丁在表锁内根据当前行计算
    ///
    /// `patch_for` 返回 None 表示无需修改，此时不重写文件并返回 false。
    /// 读取当前值再决定是否写入的调用方借此避免与并发写者交错。
    pub fn update_with<F, E>(&self, table: &str, id_field: &str, id_value: &str, patch_for: F) -> Result<bool, E>
    where
        F: FnOnce(&Record) -> Result<Option<Record>, E>,
        E: From<StoreError>,
    {
        validate_table_name(table)?;
        require_field_name(id_field)?;
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let Some(Decoded { header, mut records }) = self.load(table)? else {
            debug!(table, id_field, id_value, "update: 表不存在");
            return Ok(false);
        };
        let Some(index) = records.iter().position(|r| r.matches(id_field, id_value)) else {
            debug!(table, id_field, id_value, "update: 没有匹配记录");
            return Ok(false);
        };
        let Some(patch) = patch_for(&records[index])? else {
            debug!(table, id_field, id_value, "update: 无需修改");
            return Ok(false);
        };
        ensure_columns(table, &header, &patch)?;
        ensure_unique_id(table, id_field, &records, index, &patch)?;

        let target = &mut records[index];
        let previous_stamp = target.get(UPDATED_AT_FIELD).map(str::to_string);
        target.merge(&patch);
        if header.iter().any(|h| h == UPDATED_AT_FIELD) {
            target.set(UPDATED_AT_FIELD, next_timestamp(previous_stamp.as_deref()));
        }

        self.rewrite(table, &header, &records)?;
        debug!(table, id_field, id_value, "update");
        Ok(true)
    }

    /// 删除所有匹配的记录，返回删除条数
    pub fn delete(&self, table: &str, id_field: &str, id_value: &str) -> Result<usize, StoreError> {
        validate_table_name(table)?;
        require_field_name(id_field)?;
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let Some(Decoded { header, records }) = self.load(table)? else {
            return Ok(0);
        };
        let before = records.len();
        let kept: Vec<Record> = records
            .into_iter()
            .filter(|r| !r.matches(id_field, id_value))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite(table, &header, &kept)?;
        }
        debug!(table, id_field, id_value, removed, "delete");
        Ok(removed)
    }

    /// 只保留满足条件的记录，返回删除条数
    pub fn retain<F>(&self, table: &str, mut keep: F) -> Result<usize, StoreError>
    where
        F: FnMut(&Record) -> bool,
    {
        validate_table_name(table)?;
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let Some(Decoded { header, records }) = self.load(table)? else {
            return Ok(0);
        };
        let before = records.len();
        let kept: Vec<Record> = records.into_iter().filter(|r| keep(r)).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite(table, &header, &kept)?;
        }
        Ok(removed)
    }

    /// 下一个可用ID，规则见 [`compute_next_id`]
    ///
    /// 只读，不占用ID；需要与追加原子地配合时请使用 [`FlatRecordStore::insert`]。
    pub fn next_id(&self, table: &str, id_field: &str) -> Result<String, StoreError> {
        require_field_name(id_field)?;
        compute_next_id(&self.read_all(table)?, id_field)
    }

    // 先写同目录下的临时文件，再原子替换原文件
    fn rewrite(&self, table: &str, header: &[String], records: &[Record]) -> Result<(), StoreError> {
        let bytes = codec::encode_table(table, header, records)?;
        let mut tmp = NamedTempFile::new_in(&self.base_dir)
            .map_err(|e| StoreError::io(table, "rewrite", e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(table, "rewrite", e))?;
        tmp.persist(self.table_path(table))
            .map_err(|e| StoreError::io(table, "rewrite", e.error))?;
        Ok(())
    }

    /// 把表文件复制到备份目录，表不存在时返回 None
    pub fn backup(&self, table: &str, backup_dir: &Path) -> Result<Option<PathBuf>, StoreError> {
        validate_table_name(table)?;
        let source = self.table_path(table);
        if !source.exists() {
            return Ok(None);
        }
        fs::create_dir_all(backup_dir).map_err(|e| StoreError::io(table, "backup", e))?;
        let stamp = now_timestamp().replace([':', '.'], "-");
        let target = backup_dir.join(format!("{}-{}.csv", table, stamp));

        // 持有写锁，避免复制到一半的重写
        let lock = self.table_lock(table);
        let _guard = lock.lock();
        fs::copy(&source, &target).map_err(|e| StoreError::io(table, "backup", e))?;
        info!(table, target = %target.display(), "备份完成");
        Ok(Some(target))
    }

    /// 读取整张表并转换为类型化记录
    pub fn read_typed<T: TableRecord>(&self) -> Result<Vec<T>, StoreError> {
        self.read_all(T::TABLE.name())?
            .iter()
            .map(T::from_record)
            .collect()
    }

    pub fn find_typed<T: TableRecord>(&self, field: &str, value: &str) -> Result<Option<T>, StoreError> {
        self.find_one(T::TABLE.name(), field, value)?
            .as_ref()
            .map(T::from_record)
            .transpose()
    }

    pub fn find_all_typed<T: TableRecord>(&self, field: &str, value: &str) -> Result<Vec<T>, StoreError> {
        self.find_all(T::TABLE.name(), field, value)?
            .iter()
            .map(T::from_record)
            .collect()
    }
}

/// 计算下一个ID
///
/// 空表为 "1"；所有ID都是数字时为最大值加一；
/// 存在非数字ID时退化为记录数加一。数字ID已到 u64 上限时报错。
pub fn compute_next_id(records: &[Record], id_field: &str) -> Result<String, StoreError> {
    let ids: Vec<&str> = records
        .iter()
        .filter_map(|r| r.get(id_field))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Ok("1".to_string());
    }
    let numeric: Option<Vec<u64>> = ids.iter().map(|id| id.parse::<u64>().ok()).collect();
    match numeric {
        Some(numbers) => successor(numbers.into_iter().max().unwrap_or(0)),
        None => Ok((records.len() + 1).to_string()),
    }
}

// 在 compute_next_id 的基础上跳过已被占用的值，保证ID唯一
fn next_unused_id(records: &[Record], id_field: &str) -> Result<String, StoreError> {
    let mut candidate = compute_next_id(records, id_field)?;
    while records.iter().any(|r| r.matches(id_field, &candidate)) {
        candidate = match candidate.parse::<u64>() {
            Ok(n) => successor(n)?,
            Err(_) => format!("{}_", candidate),
        };
    }
    Ok(candidate)
}

fn successor(id: u64) -> Result<String, StoreError> {
    id.checked_add(1)
        .map(|n| n.to_string())
        .ok_or_else(|| StoreError::Validation(format!("ID {} 已达上限，无法分配下一个ID", id)))
}

fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn require_field_name(field: &str) -> Result<(), StoreError> {
    if field.trim().is_empty() {
        return Err(StoreError::Validation("标识列不能为空".to_string()));
    }
    Ok(())
}

// 补丁改动标识列时，新值必须非空且不与其他行重复
fn ensure_unique_id(
    table: &str,
    id_field: &str,
    records: &[Record],
    index: usize,
    patch: &Record,
) -> Result<(), StoreError> {
    let Some(new_id) = patch.get(id_field) else {
        return Ok(());
    };
    if new_id.trim().is_empty() {
        return Err(StoreError::Validation(format!("表 {} 的 {} 不能改为空", table, id_field)));
    }
    let taken = records
        .iter()
        .enumerate()
        .any(|(i, r)| i != index && r.matches(id_field, new_id));
    if taken {
        return Err(StoreError::Validation(format!(
            "表 {} 中 {}={} 已被其他记录使用",
            table,
            id_field,
            new_id.trim()
        )));
    }
    Ok(())
}

// 表头一旦确定就不再扩展，记录中的每一列都必须在表头里
fn ensure_columns(table: &str, header: &[String], record: &Record) -> Result<(), StoreError> {
    match record.keys().find(|k| !header.iter().any(|h| h == k)) {
        Some(column) => Err(StoreError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}
